use std::collections::HashSet;
use std::sync::Arc;

use rand::Rng;
use vst3_host::{Controller, ParameterInfo};

use super::{must_succeed, summarize};
use crate::context::{CaseContext, CaseResult};
use crate::error::{ensure, Failure};
use crate::registry::{all_classes, Stage, Suite, TestCase};

const TOLERANCE: f64 = 1e-6;
const RANDOM_VALUES: usize = 8;

pub fn cases() -> Vec<TestCase> {
    vec![
        TestCase::new(
            "parameters.count-stable",
            Suite::Parameters,
            Stage::Initialized,
            all_classes,
            count_stable,
        ),
        TestCase::new("parameters.info", Suite::Parameters, Stage::Initialized, all_classes, info),
        TestCase::new(
            "parameters.normalization",
            Suite::Parameters,
            Stage::Initialized,
            all_classes,
            normalization,
        ),
        TestCase::new(
            "parameters.string-conversion",
            Suite::Parameters,
            Stage::Initialized,
            all_classes,
            string_conversion,
        ),
    ]
}

/// The controller of an initialized instance, or `None` after marking the case skipped.
fn controller(ctx: &mut CaseContext) -> Result<Option<Arc<dyn Controller>>, Failure> {
    match ctx.controller()? {
        Some(controller) => Ok(Some(controller)),
        None => {
            ctx.skip("class has no edit controller")?;
            Ok(None)
        }
    }
}

pub(crate) fn parameter_infos(controller: &dyn Controller) -> Result<Vec<ParameterInfo>, Failure> {
    let count = controller.parameter_count();
    ensure(count >= 0, || format!("parameter count is {count}"))?;
    (0..count)
        .map(|index| {
            controller
                .parameter_info(index)
                .map_err(|code| {
                    Failure::contract(format!("getParameterInfo({index}) returned {code}"))
                })
        })
        .collect()
}

/// Seeded trial values including both ends of the range and the default.
fn trial_values(ctx: &mut CaseContext, info: &ParameterInfo) -> Vec<f64> {
    let mut values = vec![0.0, 1.0, info.default_normalized.clamp(0.0, 1.0)];
    values.extend((0..RANDOM_VALUES).map(|_| ctx.rng().gen_range(0.0..=1.0)));
    values
}

fn count_stable(ctx: &mut CaseContext) -> CaseResult {
    let Some(controller) = controller(ctx)? else {
        return Ok(());
    };
    let first = controller.parameter_count();
    ensure(first >= 0, || format!("parameter count is {first}"))?;
    for _ in 0..3 {
        let again = controller.parameter_count();
        ensure(again == first, || format!("parameter count changed from {first} to {again}"))?;
    }
    if first == 0 {
        ctx.note("class exposes no parameters");
    }
    Ok(())
}

fn info(ctx: &mut CaseContext) -> CaseResult {
    let Some(controller) = controller(ctx)? else {
        return Ok(());
    };
    let infos = parameter_infos(controller.as_ref())?;
    let mut ids = HashSet::new();
    let mut bypass = Vec::new();
    let mut advice = Vec::new();
    for info in &infos {
        ensure(ids.insert(info.id), || format!("parameter id {} is used twice", info.id))?;
        ensure(!info.title.trim().is_empty(), || {
            format!("parameter {} has an empty title", info.id)
        })?;
        ensure((0.0..=1.0).contains(&info.default_normalized), || {
            format!(
                "parameter {} default {} is outside [0, 1]",
                info.id, info.default_normalized
            )
        })?;
        ensure(info.step_count >= 0, || {
            format!("parameter {} has step count {}", info.id, info.step_count)
        })?;
        ensure(!(info.is_read_only() && info.can_automate()), || {
            format!("parameter {} is read-only but automatable", info.id)
        })?;
        ensure(!info.is_list() || info.step_count > 0, || {
            format!("list parameter {} has no steps", info.id)
        })?;
        if info.is_bypass() {
            bypass.push(info.id);
            if info.step_count != 1 {
                advice.push(format!("bypass parameter {} has {} steps", info.id, info.step_count));
            }
        }
    }
    ensure(bypass.len() <= 1, || {
        format!("{} parameters are flagged as bypass: {bypass:?}", bypass.len())
    })?;
    if controller.parameter_info(infos.len() as i32).is_ok() {
        advice.push(format!("getParameterInfo({}) succeeded past the end", infos.len()));
    }
    if !advice.is_empty() {
        ctx.warn(summarize(&advice));
    }
    Ok(())
}

/// Whether `actual` is what a parameter with `steps` steps makes of `requested`.
fn matches_quantized(requested: f64, actual: f64, steps: i32) -> bool {
    if steps > 0 {
        (requested - actual).abs() <= 0.5 / f64::from(steps) + TOLERANCE
    } else {
        (requested - actual).abs() <= TOLERANCE
    }
}

fn normalization(ctx: &mut CaseContext) -> CaseResult {
    let Some(controller) = controller(ctx)? else {
        return Ok(());
    };
    let infos = parameter_infos(controller.as_ref())?;
    let mut advice = Vec::new();
    for info in &infos {
        let id = info.id;
        let current = controller.param_normalized(id);
        ensure((0.0..=1.0).contains(&current), || {
            format!("parameter {id} reports normalized value {current}")
        })?;
        for value in trial_values(ctx, info) {
            let plain = controller.normalized_to_plain(id, value);
            let back = controller.plain_to_normalized(id, plain);
            ensure((0.0..=1.0).contains(&back), || {
                format!("parameter {id}: plain {plain} normalizes to {back}")
            })?;
            let consistent = if info.step_count > 0 {
                let replain = controller.normalized_to_plain(id, back);
                (replain - plain).abs() <= TOLERANCE * plain.abs().max(1.0)
            } else {
                (back - value).abs() <= TOLERANCE
            };
            ensure(consistent, || {
                format!("parameter {id}: {value} -> plain {plain} -> {back} does not round-trip")
            })?;

            if info.is_read_only() {
                continue;
            }
            must_succeed(
                controller.set_param_normalized(id, value),
                &format!("setParamNormalized({id}, {value})"),
            )?;
            let stored = controller.param_normalized(id);
            if !matches_quantized(value, stored, info.step_count) {
                advice.push(format!("parameter {id}: set {value} but reads back {stored}"));
            }
        }
        if !info.is_read_only() {
            controller.set_param_normalized(id, current);
        }
    }
    if !advice.is_empty() {
        ctx.warn(summarize(&advice));
    }
    Ok(())
}

fn string_conversion(ctx: &mut CaseContext) -> CaseResult {
    let Some(controller) = controller(ctx)? else {
        return Ok(());
    };
    let infos = parameter_infos(controller.as_ref())?;
    let mut advice = Vec::new();
    for info in &infos {
        let id = info.id;
        for value in trial_values(ctx, info) {
            let text = match controller.param_string_by_value(id, value) {
                Ok(text) => text,
                Err(code) => {
                    advice.push(format!(
                        "parameter {id}: getParamStringByValue({value}) returned {code}"
                    ));
                    break;
                }
            };
            let parsed = match controller.param_value_by_string(id, &text) {
                Ok(parsed) => parsed,
                Err(code) => {
                    advice.push(format!(
                        "parameter {id}: getParamValueByString(`{text}`) returned {code}"
                    ));
                    break;
                }
            };
            match controller.param_string_by_value(id, parsed) {
                Ok(again) if again == text => {}
                Ok(again) => {
                    advice.push(format!(
                        "parameter {id}: `{text}` parses to {parsed}, shown as `{again}`"
                    ));
                    break;
                }
                Err(code) => {
                    advice.push(format!(
                        "parameter {id}: getParamStringByValue({parsed}) returned {code}"
                    ));
                    break;
                }
            }
        }
    }
    if !advice.is_empty() {
        ctx.warn(summarize(&advice));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stepped_parameters_allow_quantization() {
        assert!(matches_quantized(0.37, 0.0, 1));
        assert!(!matches_quantized(0.37, 1.0, 1));
        assert!(matches_quantized(0.25, 0.25, 0));
        assert!(!matches_quantized(0.25, 0.26, 0));
    }
}
