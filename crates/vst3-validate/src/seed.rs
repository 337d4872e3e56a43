use rand::rngs::StdRng;
use rand::SeedableRng;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a-64 over the driver seed (little-endian) followed by the case name.
pub fn case_seed(driver_seed: u64, case_name: &str) -> u64 {
    driver_seed
        .to_le_bytes()
        .iter()
        .chain(case_name.as_bytes())
        .fold(FNV_OFFSET, |hash, byte| (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME))
}

/// The only randomness source a case may draw from.
pub fn case_rng(driver_seed: u64, case_name: &str) -> StdRng {
    StdRng::seed_from_u64(case_seed(driver_seed, case_name))
}
