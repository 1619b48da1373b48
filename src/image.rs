//! Mapping a target image for inspection, and reading its import table
//!
//! On Windows the image is mapped by the loader itself, with
//! `DONT_RESOLVE_DLL_REFERENCES` so neither the target's initializers nor its
//! dependency binding run. On other hosts the file is mapped read-only and
//! parsed in place; no code could run in any case. Header and import-table
//! access goes through pelite, which bounds-checks every offset against the
//! mapped extent.

use crate::common::WalkError;
use fs_err as fs;
use std::path::{Path, PathBuf};

#[cfg(all(windows, target_pointer_width = "32"))]
use pelite::pe32::{Pe, PeView};
#[cfg(all(windows, target_pointer_width = "64"))]
use pelite::pe64::{Pe, PeView};

/// One entry of the target's import descriptor table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyDescriptor {
    /// Dependency name as declared, e.g. `KERNEL32.dll`
    pub name: String,
    /// Position in the table; defines the report order
    pub index: usize,
}

/// A target image mapped for inspection, unmapped on drop
pub struct LoadedImage {
    path: PathBuf,
    image_dir: PathBuf,
    #[cfg(windows)]
    module: winapi::shared::minwindef::HMODULE,
    #[cfg(not(windows))]
    map: pelite::FileMap,
}

impl LoadedImage {
    /// Map the image at `path` without executing it
    ///
    /// Fails with [`WalkError::LoadFailure`] carrying the host-reported error
    /// if the file is missing, unreadable or not a loadable image.
    #[cfg(windows)]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, WalkError> {
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::libloaderapi::{LoadLibraryExW, DONT_RESOLVE_DLL_REFERENCES};

        let path = fs::canonicalize(path.as_ref()).map_err(|source| WalkError::LoadFailure {
            path: path.as_ref().to_owned(),
            source,
        })?;
        let image_dir = parent_dir(&path)?;

        let wide: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();
        let module = unsafe {
            LoadLibraryExW(wide.as_ptr(), std::ptr::null_mut(), DONT_RESOLVE_DLL_REFERENCES)
        };
        if module.is_null() {
            return Err(WalkError::LoadFailure {
                path,
                source: std::io::Error::last_os_error(),
            });
        }

        Ok(Self {
            path,
            image_dir,
            module,
        })
    }

    /// Map the image at `path` without executing it
    ///
    /// Fails with [`WalkError::LoadFailure`] carrying the host-reported error
    /// if the file is missing or unreadable, and with
    /// [`WalkError::MalformedImage`] if it is not a PE image.
    #[cfg(not(windows))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, WalkError> {
        let path = fs::canonicalize(path.as_ref()).map_err(|source| WalkError::LoadFailure {
            path: path.as_ref().to_owned(),
            source,
        })?;
        let image_dir = parent_dir(&path)?;

        let map = pelite::FileMap::open(&path).map_err(|source| WalkError::LoadFailure {
            path: path.clone(),
            source,
        })?;
        // validate the headers up front, so a non-image fails at open time
        // just as it would under the real loader
        if let Err(source) = pelite::PeFile::from_bytes(&map) {
            return Err(WalkError::MalformedImage { path, source });
        }

        Ok(Self {
            path,
            image_dir,
            map,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory containing the image; the loader searches it first when
    /// resolving the image's own dependencies
    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    /// Walk the import descriptor table, one descriptor per entry in
    /// declaration order, stopping at the table's null terminator
    ///
    /// An image with no import directory yields an empty list.
    #[cfg(windows)]
    pub fn dependencies(&self) -> Result<Vec<DependencyDescriptor>, WalkError> {
        let view = unsafe { PeView::module(self.module as *const u8) };
        let imports = match view.imports() {
            Ok(imports) => imports,
            // no import directory, e.g. in case of a leaf DLL
            Err(pelite::Error::Null) => return Ok(Vec::new()),
            Err(source) => return Err(self.malformed(source)),
        };
        let mut deps = Vec::new();
        for (index, desc) in imports.iter().enumerate() {
            let name = desc.dll_name().map_err(|e| self.malformed(e))?.to_string();
            deps.push(DependencyDescriptor { name, index });
        }
        Ok(deps)
    }

    /// Walk the import descriptor table, one descriptor per entry in
    /// declaration order, stopping at the table's null terminator
    ///
    /// An image with no import directory yields an empty list.
    #[cfg(not(windows))]
    pub fn dependencies(&self) -> Result<Vec<DependencyDescriptor>, WalkError> {
        let file = pelite::PeFile::from_bytes(&self.map)
            .map_err(|source| self.malformed(source))?;
        let imports = match file.imports() {
            Ok(imports) => imports,
            // no import directory, e.g. in case of a leaf DLL
            Err(pelite::Error::Null) => return Ok(Vec::new()),
            Err(source) => return Err(self.malformed(source)),
        };
        let mut deps = Vec::new();
        for (index, desc) in imports.iter().enumerate() {
            let name = desc.dll_name().map_err(|e| self.malformed(e))?.to_string();
            deps.push(DependencyDescriptor { name, index });
        }
        Ok(deps)
    }

    fn malformed(&self, source: pelite::Error) -> WalkError {
        WalkError::MalformedImage {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(windows)]
impl Drop for LoadedImage {
    fn drop(&mut self) {
        unsafe {
            winapi::um::libloaderapi::FreeLibrary(self.module);
        }
    }
}

fn parent_dir(path: &Path) -> Result<PathBuf, WalkError> {
    path.parent()
        .map(Path::to_owned)
        .ok_or_else(|| {
            WalkError::ContextError(format!("no parent directory for {}", path.display()))
        })
}
