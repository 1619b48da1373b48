//! Discovery of the Windows directories that take part in the loader's search

use fs_err as fs;
use serde::Serialize;
#[cfg(windows)]
use std::ffi::OsString;
#[cfg(windows)]
use std::os::windows::ffi::OsStringExt;
use std::path::{Path, PathBuf};

/// Location of the system directories consulted by the loader
///
/// When running on Windows these come straight from the Windows API. On any
/// other host they can only be deduced from a mounted Windows partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemPaths {
    /// Windows directory (typically C:\Windows)
    pub win_dir: PathBuf,
    /// System directory (typically C:\Windows\System32)
    pub sys_dir: PathBuf,
}

impl SystemPaths {
    /// System directories of the host, through the Windows API
    #[cfg(windows)]
    pub fn current() -> Result<Self, std::io::Error> {
        Ok(Self {
            win_dir: get_winapi_directory(winapi::um::sysinfoapi::GetWindowsDirectoryW)?,
            sys_dir: get_winapi_directory(winapi::um::sysinfoapi::GetSystemDirectoryW)?,
        })
    }

    /// Look for a Windows installation along the ancestors of the image
    /// location; the user may have a partition mounted at any depth
    #[cfg(not(windows))]
    pub fn from_image_location<P: AsRef<Path>>(p: P) -> Option<Self> {
        p.as_ref().ancestors().skip(1).find_map(Self::from_root)
    }

    /// System directories of the Windows installation rooted at the given
    /// path (the path should point at the C:\ partition)
    pub fn from_root<P: AsRef<Path>>(root: P) -> Option<Self> {
        let win_dir = root.as_ref().join("Windows");
        let sys_dir = win_dir.join("System32");
        sys_dir.is_dir().then(|| Self { win_dir, sys_dir })
    }

    /// Directories probed after the image directory, most specific first
    pub fn search_dirs(&self) -> Vec<PathBuf> {
        vec![self.sys_dir.clone(), self.win_dir.clone()]
    }
}

/// Fetch the path to a system directory through the Windows API
#[cfg(windows)]
fn get_winapi_directory(
    f: unsafe extern "system" fn(
        winapi::um::winnt::LPWSTR,
        winapi::shared::minwindef::UINT,
    ) -> winapi::shared::minwindef::UINT,
) -> Result<PathBuf, std::io::Error> {
    const BFR_SIZE: usize = 512;
    let mut bfr: [u16; BFR_SIZE] = [0; BFR_SIZE];

    let ret = unsafe { f(bfr.as_mut_ptr(), BFR_SIZE as u32) } as usize;
    if ret == 0 || ret > BFR_SIZE {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(PathBuf::from(OsString::from_wide(&bfr[..ret])))
    }
}

/// Case-insensitive lookup of `filename` within `dir`, the way the Windows
/// filesystem matches names
///
/// Returns the entry's actual on-disk path, so the report shows real casing.
pub(crate) fn find_file_case_insensitive(
    dir: &Path,
    filename: &str,
) -> Result<Option<PathBuf>, std::io::Error> {
    let wanted = filename.to_lowercase();
    Ok(fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.metadata().map_or(false, |m| m.is_file()))
        .find(|entry| {
            entry
                .file_name()
                .to_str()
                .map_or(false, |s| s.to_lowercase() == wanted)
        })
        .map(|entry| entry.path()))
}
