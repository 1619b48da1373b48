use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WalkError {
    /// The target image could not be opened or mapped at all.
    ///
    /// Fatal to the whole walk; no partial results exist when this is raised.
    #[error("cannot open {}: {source}", path.display())]
    LoadFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The mapped image's headers or import directory are not parseable, or a
    /// directory offset lands outside the mapped bounds.
    #[error("malformed image {}: {source}", path.display())]
    MalformedImage {
        path: PathBuf,
        #[source]
        source: pelite::Error,
    },

    /// The resolution context (image directory, system directories) could not
    /// be established.
    #[error("could not establish search context: {0}")]
    ContextError(String),
}

/// Lossy path-to-string conversion for display purposes
pub fn path_to_string<P: AsRef<Path>>(p: P) -> String {
    p.as_ref().to_string_lossy().into_owned()
}

/// Strip the verbatim prefix that canonicalization adds on Windows, so that
/// paths print the way users write them
pub fn decanonicalize(s: &str) -> String {
    s.replacen(r"\\?\", "", 1)
}

/// Canonical path in displayable form
pub fn readable_canonical_path<P: AsRef<Path>>(p: P) -> Result<String, std::io::Error> {
    Ok(decanonicalize(&path_to_string(fs_err::canonicalize(p)?)))
}

/// Whether `path` lies beneath `root`, comparing whole components
/// case-insensitively as the Windows filesystem does
///
/// Verbatim (`\\?\`) prefixes are ignored and both separator styles are
/// understood on either host, so canonicalized and loader-reported paths
/// compare consistently.
pub fn is_beneath<P: AsRef<Path>, Q: AsRef<Path>>(path: P, root: Q) -> bool {
    fn components(p: &Path) -> Vec<String> {
        let normalized = decanonicalize(&path_to_string(p)).replace('\\', "/");
        Path::new(&normalized)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_lowercase())
            .collect()
    }
    let path = components(path.as_ref());
    let root = components(root.as_ref());
    !root.is_empty() && path.len() > root.len() && path[..root.len()] == root[..]
}

#[cfg(test)]
mod tests {
    use super::{decanonicalize, is_beneath};

    #[test]
    fn beneath_is_case_insensitive() {
        assert!(is_beneath(
            r"C:\Windows\System32\KERNEL32.dll",
            r"c:\windows\system32"
        ));
        assert!(is_beneath("/opt/win/Windows/System32/foo.dll", "/opt/win/Windows"));
        assert!(!is_beneath(r"C:\Tools\app.dll", r"C:\Windows\System32"));
    }

    #[test]
    fn beneath_requires_whole_components() {
        assert!(!is_beneath(r"C:\Windows2\foo.dll", r"C:\Windows"));
        // a directory is not beneath itself
        assert!(!is_beneath(r"C:\Windows\System32", r"C:\Windows\System32"));
    }

    #[test]
    fn beneath_handles_empty_and_verbatim_paths() {
        // unresolved records carry an empty path; they never match the filter
        assert!(!is_beneath("", r"C:\Windows\System32"));
        assert!(is_beneath(
            r"\\?\C:\Windows\System32\ntdll.dll",
            r"C:\Windows\System32"
        ));
    }

    #[test]
    fn decanonicalize_strips_the_verbatim_prefix_once() {
        assert_eq!(decanonicalize(r"\\?\C:\Windows"), r"C:\Windows");
        assert_eq!(decanonicalize(r"C:\Windows"), r"C:\Windows");
    }
}
