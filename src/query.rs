//! Input parameters of a dependency walk

use crate::common::WalkError;
use crate::system::SystemPaths;
use fs_err as fs;
use std::path::{Path, PathBuf};

/// Complete specification of a dependency walk
#[derive(Clone, Debug)]
pub struct WalkQuery {
    /// Path to the target executable or DLL, canonicalized
    pub target_image: PathBuf,
    /// Directory the loader searches first when resolving the target's
    /// dependencies; `None` means the directory containing the image, which
    /// is what the real loader uses
    pub context_dir: Option<PathBuf>,
    /// System directories of the host (or of a mounted Windows partition)
    pub system: Option<SystemPaths>,
    /// Additional directories consulted after the system ones, in order
    ///
    /// Only honored by the emulated loader; the live Windows loader walks its
    /// own PATH.
    pub user_path: Vec<PathBuf>,
}

impl WalkQuery {
    /// Build a query with sensible defaults for the given image
    ///
    /// A missing or unreadable target fails here, with the host-reported
    /// error, before anything is mapped.
    pub fn from_image_path<P: AsRef<Path>>(target: P) -> Result<Self, WalkError> {
        let target_image =
            fs::canonicalize(target.as_ref()).map_err(|source| WalkError::LoadFailure {
                path: target.as_ref().to_owned(),
                source,
            })?;

        #[cfg(windows)]
        let system = Some(SystemPaths::current().map_err(|e| {
            WalkError::ContextError(format!("could not determine the system directories: {e}"))
        })?);
        #[cfg(not(windows))]
        let system = SystemPaths::from_image_location(&target_image);

        Ok(Self {
            target_image,
            context_dir: None,
            system,
            user_path: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::WalkQuery;
    use crate::common::WalkError;

    #[test]
    fn defaults_leave_the_context_to_the_image_directory() -> Result<(), WalkError> {
        let manifest = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml");
        let query = WalkQuery::from_image_path(&manifest)?;
        assert!(query.target_image.ends_with("Cargo.toml"));
        assert!(query.context_dir.is_none());
        assert!(query.user_path.is_empty());
        Ok(())
    }

    #[test]
    fn missing_target_fails_with_the_supplied_path() {
        let err = WalkQuery::from_image_path("no/such/image.exe").unwrap_err();
        assert!(err.to_string().contains("no/such/image.exe"));
    }
}
