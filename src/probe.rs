//! The narrow seam to the host loader: resolve one name, return one path
//!
//! Everything above this interface is platform-agnostic; tests substitute
//! their own implementation.

use std::path::{Path, PathBuf};

#[cfg(not(windows))]
use crate::system::{find_file_case_insensitive, SystemPaths};
#[cfg(not(windows))]
use fs_err as fs;

/// Windows loader error: the module could not be found on the search path
pub const ERROR_MOD_NOT_FOUND: u32 = 126;
/// Windows loader error: a file was found but cannot be mapped as an image
pub const ERROR_BAD_EXE_FORMAT: u32 = 193;

/// The loader's error code at the point a probe failed
///
/// Definitive for that name in that context; a failed probe is never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeFailure {
    pub code: u32,
}

/// Asks a loader whether `name` resolves, and to which file, without running
/// any code from the candidate library
///
/// `context_dir` is the directory the loader searches first: the directory
/// containing the image whose import table declared `name`.
pub trait LoaderProbe {
    fn probe(&self, name: &str, context_dir: &Path) -> Result<PathBuf, ProbeFailure>;
}

/// Probes the live Windows loader
///
/// Each probe maps the candidate with `DONT_RESOLVE_DLL_REFERENCES`, captures
/// the path the loader picked and releases the mapping immediately; the probe
/// exists for path discovery only.
#[cfg(windows)]
pub struct SystemLoader;

#[cfg(windows)]
impl LoaderProbe for SystemLoader {
    fn probe(&self, name: &str, context_dir: &Path) -> Result<PathBuf, ProbeFailure> {
        use std::ffi::OsString;
        use std::os::windows::ffi::{OsStrExt, OsStringExt};
        use winapi::um::libloaderapi::{
            FreeLibrary, GetModuleFileNameW, LoadLibraryExW, DONT_RESOLVE_DLL_REFERENCES,
        };

        // LoadLibraryEx takes no explicit search context for a bare module
        // name; reproduce it through the working directory, scoped and
        // serialized so nothing leaks past this probe.
        let _cwd = ScopedWorkingDir::enter(context_dir).map_err(|e| ProbeFailure {
            code: e.raw_os_error().unwrap_or(ERROR_MOD_NOT_FOUND as i32) as u32,
        })?;

        let wide: Vec<u16> = OsString::from(name)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();
        let module = unsafe {
            LoadLibraryExW(wide.as_ptr(), std::ptr::null_mut(), DONT_RESOLVE_DLL_REFERENCES)
        };
        if module.is_null() {
            return Err(ProbeFailure {
                code: last_error_code(),
            });
        }

        let mut bfr = [0u16; 1024];
        let len = unsafe { GetModuleFileNameW(module, bfr.as_mut_ptr(), bfr.len() as u32) };
        // capture the error before FreeLibrary can overwrite it
        let path_error = (len == 0).then(last_error_code);
        unsafe {
            FreeLibrary(module);
        }
        match path_error {
            Some(code) => Err(ProbeFailure { code }),
            None => Ok(PathBuf::from(OsString::from_wide(&bfr[..len as usize]))),
        }
    }
}

#[cfg(windows)]
fn last_error_code() -> u32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0) as u32
}

/// Changes the process working directory, restoring the previous one on drop
///
/// The working directory is process-global; the guard holds a process-wide
/// lock so concurrent probes cannot race on it.
#[cfg(windows)]
struct ScopedWorkingDir {
    saved: PathBuf,
    _lock: std::sync::MutexGuard<'static, ()>,
}

#[cfg(windows)]
static WORKING_DIR_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(windows)]
impl ScopedWorkingDir {
    fn enter(dir: &Path) -> Result<Self, std::io::Error> {
        let lock = WORKING_DIR_LOCK
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let saved = std::env::current_dir()?;
        std::env::set_current_dir(dir)?;
        Ok(Self { saved, _lock: lock })
    }
}

#[cfg(windows)]
impl Drop for ScopedWorkingDir {
    fn drop(&mut self) {
        let _ = std::env::set_current_dir(&self.saved);
    }
}

/// Approximates the Windows loader's standard search order on a foreign host
///
/// Probes the context directory, then the system directories of a mounted
/// Windows partition, then any extra directories the caller supplied, with
/// case-insensitive name matching. The working directory is never touched;
/// the context is threaded explicitly.
#[cfg(not(windows))]
pub struct EmulatedLoader {
    system: Option<SystemPaths>,
    extra_path: Vec<PathBuf>,
}

#[cfg(not(windows))]
impl EmulatedLoader {
    pub fn new(system: Option<SystemPaths>, extra_path: Vec<PathBuf>) -> Self {
        Self { system, extra_path }
    }

    fn search_dirs(&self, context_dir: &Path) -> Vec<PathBuf> {
        let mut dirs = vec![context_dir.to_owned()];
        if let Some(system) = &self.system {
            dirs.extend(system.search_dirs());
        }
        dirs.extend(self.extra_path.iter().cloned());
        dirs
    }
}

#[cfg(not(windows))]
impl LoaderProbe for EmulatedLoader {
    fn probe(&self, name: &str, context_dir: &Path) -> Result<PathBuf, ProbeFailure> {
        for dir in self.search_dirs(context_dir) {
            let candidate = match find_file_case_insensitive(&dir, name) {
                Ok(Some(candidate)) => candidate,
                // missing or unreadable directories are skipped, as the
                // loader skips search path entries it cannot enumerate
                Ok(None) | Err(_) => continue,
            };
            // the real loader stops at the first name match; a file it
            // cannot map as an image ends the search with an error
            let Ok(bytes) = fs::read(&candidate) else {
                return Err(ProbeFailure {
                    code: ERROR_BAD_EXE_FORMAT,
                });
            };
            return match goblin::Object::parse(&bytes) {
                Ok(goblin::Object::PE(_)) => {
                    Ok(fs::canonicalize(&candidate).unwrap_or(candidate))
                }
                _ => Err(ProbeFailure {
                    code: ERROR_BAD_EXE_FORMAT,
                }),
            };
        }
        Err(ProbeFailure {
            code: ERROR_MOD_NOT_FOUND,
        })
    }
}

#[cfg(all(test, not(windows)))]
mod tests {
    use super::{EmulatedLoader, LoaderProbe, ERROR_BAD_EXE_FORMAT, ERROR_MOD_NOT_FOUND};
    use crate::system::SystemPaths;
    use fs_err as fs;
    use std::path::PathBuf;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("depwalk-probe-{}-{}", tag, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn unknown_name_reports_module_not_found() {
        let dir = scratch_dir("missing");
        let probe = EmulatedLoader::new(None, Vec::new());
        let failure = probe.probe("missing123.dll", &dir).unwrap_err();
        assert_eq!(failure.code, ERROR_MOD_NOT_FOUND);
    }

    #[test]
    fn non_image_file_ends_the_search_with_bad_format() {
        let dir = scratch_dir("badformat");
        fs::write(dir.join("broken.dll"), b"this is not an image").unwrap();
        let probe = EmulatedLoader::new(None, Vec::new());
        let failure = probe.probe("broken.dll", &dir).unwrap_err();
        assert_eq!(failure.code, ERROR_BAD_EXE_FORMAT);
    }

    #[test]
    fn system_directories_are_searched_after_the_context() {
        let root = scratch_dir("sysroot");
        fs::create_dir_all(root.join("Windows").join("System32")).unwrap();
        let context = scratch_dir("sysctx");
        let probe = EmulatedLoader::new(SystemPaths::from_root(&root), Vec::new());
        // nothing anywhere: the whole chain was walked without errors
        let failure = probe.probe("nowhere.dll", &context).unwrap_err();
        assert_eq!(failure.code, ERROR_MOD_NOT_FOUND);
    }
}
