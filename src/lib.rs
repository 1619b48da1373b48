//! Report, for each external dependency a PE binary declares, whether the
//! loader can resolve it and to which file path, without running any of the
//! binary's code.
//!
//! The walk maps the target with a non-executing load, reads its import
//! descriptor table in declaration order and probes the platform loader once
//! per entry under the resolution context the real loader would use (the
//! image's own directory). Probing the live Windows loader requires running
//! on Windows; on other hosts the standard search order is emulated against
//! the filesystem, optionally using a mounted Windows partition for the
//! system directories.

pub mod common;
pub mod image;
pub mod probe;
pub mod query;
pub mod record;
pub mod resolver;
pub mod system;

pub use common::{decanonicalize, is_beneath, path_to_string, readable_canonical_path, WalkError};
pub use image::{DependencyDescriptor, LoadedImage};
pub use probe::{LoaderProbe, ProbeFailure};
pub use query::WalkQuery;
pub use record::{Resolution, ResolutionRecord, WalkReport};
pub use system::SystemPaths;

/// Walk the target's import table and probe the platform loader for every
/// declared dependency, in declaration order
pub fn walk(query: &WalkQuery) -> Result<WalkReport, WalkError> {
    #[cfg(windows)]
    let probe = probe::SystemLoader;
    #[cfg(not(windows))]
    let probe = probe::EmulatedLoader::new(query.system.clone(), query.user_path.clone());
    walk_with(query, &probe)
}

/// Same as [`walk`], with a caller-supplied loader probe
pub fn walk_with(query: &WalkQuery, probe: &dyn LoaderProbe) -> Result<WalkReport, WalkError> {
    let image = LoadedImage::open(&query.target_image)?;
    let context_dir = query
        .context_dir
        .as_deref()
        .unwrap_or_else(|| image.image_dir());
    let dependencies = image.dependencies()?;
    Ok(resolver::resolve_all(&dependencies, probe, context_dir))
}
