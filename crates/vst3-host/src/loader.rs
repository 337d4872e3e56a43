use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::com::ComPtr;
use crate::error::LoadError;
use crate::factory::Vst3Factory;
use crate::ffi::{GetPluginFactoryFn, IPluginFactoryVtbl, ModuleEntryFn, ModuleHookFn};
use crate::plugin::{ModuleLoader, PluginFactory, PluginModule};

/// Serialises module entry and exit calls across the whole process.
static ENTRY_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[cfg(all(unix, not(target_os = "macos")))]
const PLATFORM_HOOKS: (&[u8], &[u8], bool) = (b"ModuleEntry\0", b"ModuleExit\0", true);
#[cfg(target_os = "macos")]
const PLATFORM_HOOKS: (&[u8], &[u8], bool) = (b"bundleEntry\0", b"bundleExit\0", true);
#[cfg(windows)]
const PLATFORM_HOOKS: (&[u8], &[u8], bool) = (b"InitDll\0", b"ExitDll\0", false);

/// Whether a module without the platform entry pair is rejected.
#[cfg(unix)]
const PLATFORM_HOOKS_REQUIRED: bool = true;
#[cfg(windows)]
const PLATFORM_HOOKS_REQUIRED: bool = false;

/// Loads real VST3 bundles through `libloading`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Vst3Loader;

impl ModuleLoader for Vst3Loader {
    fn load(&self, path: &Path) -> Result<Box<dyn PluginModule>, LoadError> {
        Ok(Box::new(Vst3Module::load(path)?))
    }
}

/// Resolves a `.vst3` bundle directory to the binary for this platform.
pub fn resolve_binary(path: &Path) -> Result<PathBuf, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound(path.to_path_buf()));
    }
    if !path.is_dir() {
        return Ok(path.to_path_buf());
    }
    let stem = path
        .file_stem()
        .ok_or_else(|| LoadError::FormatInvalid {
            path: path.to_path_buf(),
            reason: "bundle directory has no name".into(),
        })?
        .to_string_lossy()
        .into_owned();
    let binary = path.join("Contents").join(bundle_binary(&stem));
    if binary.is_file() {
        Ok(binary)
    } else {
        Err(LoadError::FormatInvalid {
            path: path.to_path_buf(),
            reason: format!("bundle has no binary at {}", binary.display()),
        })
    }
}

#[cfg(all(unix, not(target_os = "macos")))]
fn bundle_binary(stem: &str) -> PathBuf {
    let arch = match std::env::consts::ARCH {
        "x86" => "i386",
        other => other,
    };
    PathBuf::from(format!("{arch}-linux")).join(format!("{stem}.so"))
}

#[cfg(target_os = "macos")]
fn bundle_binary(stem: &str) -> PathBuf {
    PathBuf::from("MacOS").join(stem)
}

#[cfg(windows)]
fn bundle_binary(stem: &str) -> PathBuf {
    let arch = match std::env::consts::ARCH {
        "aarch64" => "arm64",
        other => other,
    };
    PathBuf::from(format!("{arch}-win")).join(format!("{stem}.vst3"))
}

/// The mapped binary. Components keep it alive through an `Arc`, so the
/// library is unmapped only after the last plug-in object is gone.
pub(crate) struct ModuleLibrary {
    binary: PathBuf,
    _library: Library,
}

impl Drop for ModuleLibrary {
    fn drop(&mut self) {
        debug!(binary = %self.binary.display(), "unmapping module");
    }
}

#[derive(Clone, Copy)]
enum ExitHook {
    None,
    Hook(ModuleHookFn),
}

/// A VST3 module whose entry point has run.
pub struct Vst3Module {
    path: PathBuf,
    library: Option<Arc<ModuleLibrary>>,
    get_factory: GetPluginFactoryFn,
    exit: ExitHook,
}

impl Vst3Module {
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let binary = resolve_binary(path)?;
        let (library, handle) = open_library(&binary).map_err(|err| LoadError::FormatInvalid {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;

        let get_factory: GetPluginFactoryFn = unsafe {
            *library
                .get::<GetPluginFactoryFn>(b"GetPluginFactory\0")
                .map_err(|_| LoadError::EntryPointMissing {
                    path: path.to_path_buf(),
                    symbol: "GetPluginFactory".into(),
                })?
        };

        let exit = enter_module(&library, handle, path)?;
        info!(module = %path.display(), binary = %binary.display(), "module loaded");

        Ok(Self {
            path: path.to_path_buf(),
            library: Some(Arc::new(ModuleLibrary {
                binary,
                _library: library,
            })),
            get_factory,
            exit,
        })
    }
}

#[cfg(unix)]
fn open_library(binary: &Path) -> Result<(Library, *mut c_void), libloading::Error> {
    use libloading::os::unix::Library as UnixLibrary;

    let unix = unsafe { UnixLibrary::new(binary)? };
    let handle = unix.into_raw();
    let unix = unsafe { UnixLibrary::from_raw(handle) };
    Ok((Library::from(unix), handle))
}

#[cfg(not(unix))]
fn open_library(binary: &Path) -> Result<(Library, *mut c_void), libloading::Error> {
    let library = unsafe { Library::new(binary)? };
    Ok((library, std::ptr::null_mut()))
}

fn hook<T: Copy>(library: &Library, symbol: &[u8]) -> Option<T> {
    unsafe { library.get::<T>(symbol).ok().map(|symbol| *symbol) }
}

/// Runs the module entry point, preferring the platform pair and falling back
/// to `InitModule`/`DeinitModule`.
fn enter_module(
    library: &Library,
    handle: *mut c_void,
    path: &Path,
) -> Result<ExitHook, LoadError> {
    let (entry_name, exit_name, takes_handle) = PLATFORM_HOOKS;
    let _guard = ENTRY_LOCK.lock();

    if takes_handle {
        let entry = hook::<ModuleEntryFn>(library, entry_name);
        let exit = hook::<ModuleHookFn>(library, exit_name);
        if let (Some(entry), Some(exit)) = (entry, exit) {
            // macOS expects a CFBundleRef; the validator does not create one.
            let argument = if cfg!(target_os = "macos") {
                std::ptr::null_mut()
            } else {
                handle
            };
            if !unsafe { entry(argument) } {
                return Err(LoadError::InitFailed(path.to_path_buf()));
            }
            return Ok(ExitHook::Hook(exit));
        }
    } else {
        let entry = hook::<ModuleHookFn>(library, entry_name);
        let exit = hook::<ModuleHookFn>(library, exit_name);
        if let (Some(entry), Some(exit)) = (entry, exit) {
            if !unsafe { entry() } {
                return Err(LoadError::InitFailed(path.to_path_buf()));
            }
            return Ok(ExitHook::Hook(exit));
        }
    }

    let init = hook::<ModuleHookFn>(library, b"InitModule\0");
    let deinit = hook::<ModuleHookFn>(library, b"DeinitModule\0");
    if let (Some(init), Some(deinit)) = (init, deinit) {
        if !unsafe { init() } {
            return Err(LoadError::InitFailed(path.to_path_buf()));
        }
        return Ok(ExitHook::Hook(deinit));
    }

    if PLATFORM_HOOKS_REQUIRED {
        return Err(LoadError::EntryPointMissing {
            path: path.to_path_buf(),
            symbol: String::from_utf8_lossy(&entry_name[..entry_name.len() - 1]).into_owned(),
        });
    }
    Ok(ExitHook::None)
}

impl PluginModule for Vst3Module {
    fn path(&self) -> &Path {
        &self.path
    }

    fn factory(&self) -> Result<Arc<dyn PluginFactory>, LoadError> {
        let library = self.library.clone().ok_or_else(|| LoadError::FormatInvalid {
            path: self.path.clone(),
            reason: "module has been unloaded".into(),
        })?;
        let raw = unsafe { (self.get_factory)() };
        let factory = unsafe { ComPtr::<IPluginFactoryVtbl>::from_raw(raw) }.ok_or_else(|| {
            LoadError::FormatInvalid {
                path: self.path.clone(),
                reason: "GetPluginFactory returned null".into(),
            }
        })?;
        Ok(Arc::new(Vst3Factory::new(factory, library)))
    }

    fn unload(&mut self) {
        let Some(library) = self.library.take() else {
            return;
        };
        {
            let _guard = ENTRY_LOCK.lock();
            if let ExitHook::Hook(exit) = self.exit {
                if !unsafe { exit() } {
                    warn!(module = %self.path.display(), "module exit reported failure");
                }
            }
        }
        let holders = Arc::strong_count(&library) - 1;
        if holders > 0 {
            warn!(
                module = %self.path.display(),
                holders,
                "module stays mapped until abandoned plug-in objects are released"
            );
        }
        drop(library);
        info!(module = %self.path.display(), "module released");
    }
}

impl Drop for Vst3Module {
    fn drop(&mut self) {
        self.unload();
    }
}

impl std::fmt::Debug for Vst3Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vst3Module")
            .field("path", &self.path)
            .field("loaded", &self.library.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn missing_path_is_file_not_found() {
        let err = resolve_binary(Path::new("/definitely/not/here.vst3")).unwrap_err();
        assert_eq!(err.kind(), "file-not-found");
    }

    #[test]
    fn bundle_without_binary_is_format_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("Empty.vst3");
        fs::create_dir_all(bundle.join("Contents")).unwrap();
        let err = resolve_binary(&bundle).unwrap_err();
        assert_eq!(err.kind(), "format-invalid");
    }

    #[test]
    fn bundle_resolves_to_platform_binary() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("Gain.vst3");
        let binary = bundle.join("Contents").join(bundle_binary("Gain"));
        fs::create_dir_all(binary.parent().unwrap()).unwrap();
        fs::write(&binary, b"").unwrap();
        assert_eq!(resolve_binary(&bundle).unwrap(), binary);
    }

    #[test]
    fn garbage_file_is_format_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("garbage.so");
        fs::write(&file, b"not a shared object").unwrap();
        let err = Vst3Module::load(&file).unwrap_err();
        assert_eq!(err.kind(), "format-invalid");
    }
}
