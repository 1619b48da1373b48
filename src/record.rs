//! Result records handed to the presentation layer

use serde::Serialize;
use std::path::{Path, PathBuf};

/// Terminal outcome of one dependency probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Resolution {
    /// The loader resolved the name; the path is absolute and names the file
    /// the loader would actually map
    Resolved(PathBuf),
    /// The loader gave up, with its error code at the point of failure
    Unresolved(u32),
}

/// One output unit: a declared dependency and where (or whether) it resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionRecord {
    /// Name as it appears in the import table
    pub dependency_name: String,
    pub resolution: Resolution,
}

impl ResolutionRecord {
    pub fn is_resolved(&self) -> bool {
        matches!(self.resolution, Resolution::Resolved(_))
    }

    pub fn resolved_path(&self) -> Option<&Path> {
        match &self.resolution {
            Resolution::Resolved(path) => Some(path),
            Resolution::Unresolved(_) => None,
        }
    }

    /// Sort key used by the presentation layer; unresolved entries carry an
    /// empty path and therefore group first
    fn sort_key(&self) -> String {
        self.resolved_path()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Records of one complete walk, in import-table order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalkReport {
    pub records: Vec<ResolutionRecord>,
}

impl WalkReport {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records sorted by resolved path, unresolved entries first
    ///
    /// The sort is stable, so entries with equal keys keep their import-table
    /// order and repeated walks print identically.
    pub fn sorted_by_resolved_path(&self) -> Vec<&ResolutionRecord> {
        let mut sorted: Vec<&ResolutionRecord> = self.records.iter().collect();
        sorted.sort_by_key(|r| r.sort_key());
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::{Resolution, ResolutionRecord, WalkReport};
    use std::path::PathBuf;

    fn resolved(name: &str, path: &str) -> ResolutionRecord {
        ResolutionRecord {
            dependency_name: name.to_owned(),
            resolution: Resolution::Resolved(PathBuf::from(path)),
        }
    }

    fn unresolved(name: &str, code: u32) -> ResolutionRecord {
        ResolutionRecord {
            dependency_name: name.to_owned(),
            resolution: Resolution::Unresolved(code),
        }
    }

    #[test]
    fn path_accessor_matches_resolution() {
        assert_eq!(
            resolved("a.dll", "/x/a.dll").resolved_path(),
            Some(PathBuf::from("/x/a.dll").as_path())
        );
        assert!(resolved("a.dll", "/x/a.dll").is_resolved());
        assert_eq!(unresolved("b.dll", 126).resolved_path(), None);
        assert!(!unresolved("b.dll", 126).is_resolved());
    }

    #[test]
    fn unresolved_entries_group_first_and_keep_their_order() {
        let report = WalkReport {
            records: vec![
                resolved("z.dll", "/lib/z.dll"),
                unresolved("second.dll", 126),
                resolved("a.dll", "/lib/a.dll"),
                unresolved("first.dll", 193),
            ],
        };
        let names: Vec<&str> = report
            .sorted_by_resolved_path()
            .iter()
            .map(|r| r.dependency_name.as_str())
            .collect();
        assert_eq!(names, vec!["second.dll", "first.dll", "a.dll", "z.dll"]);
    }
}
