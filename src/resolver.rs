//! One-shot probing of every declared dependency against the loader

use crate::image::DependencyDescriptor;
use crate::probe::LoaderProbe;
use crate::record::{Resolution, ResolutionRecord, WalkReport};
use std::path::Path;

/// Probe every descriptor, strictly sequentially, in table order
///
/// Exactly one record per descriptor. A failed probe is recorded as data and
/// does not abort the walk; there are no retries and no memoization, so a
/// name appearing twice is probed twice, independently.
pub fn resolve_all(
    dependencies: &[DependencyDescriptor],
    probe: &dyn LoaderProbe,
    context_dir: &Path,
) -> WalkReport {
    let records = dependencies
        .iter()
        .map(|dep| {
            let resolution = match probe.probe(&dep.name, context_dir) {
                Ok(path) => Resolution::Resolved(path),
                Err(failure) => Resolution::Unresolved(failure.code),
            };
            ResolutionRecord {
                dependency_name: dep.name.clone(),
                resolution,
            }
        })
        .collect();
    WalkReport { records }
}

#[cfg(test)]
mod tests {
    use super::resolve_all;
    use crate::image::DependencyDescriptor;
    use crate::probe::{LoaderProbe, ProbeFailure, ERROR_MOD_NOT_FOUND};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    struct FakeLoader {
        known: HashMap<String, PathBuf>,
        probed: RefCell<Vec<String>>,
    }

    impl FakeLoader {
        fn new(known: &[(&str, &str)]) -> Self {
            Self {
                known: known
                    .iter()
                    .map(|(name, path)| (name.to_string(), PathBuf::from(path)))
                    .collect(),
                probed: RefCell::new(Vec::new()),
            }
        }
    }

    impl LoaderProbe for FakeLoader {
        fn probe(&self, name: &str, _context_dir: &Path) -> Result<PathBuf, ProbeFailure> {
            self.probed.borrow_mut().push(name.to_owned());
            self.known.get(name).cloned().ok_or(ProbeFailure {
                code: ERROR_MOD_NOT_FOUND,
            })
        }
    }

    fn descriptors(names: &[&str]) -> Vec<DependencyDescriptor> {
        names
            .iter()
            .enumerate()
            .map(|(index, name)| DependencyDescriptor {
                name: name.to_string(),
                index,
            })
            .collect()
    }

    #[test]
    fn one_record_per_descriptor_in_table_order() {
        let probe = FakeLoader::new(&[("b.dll", "/lib/b.dll")]);
        let deps = descriptors(&["b.dll", "a.dll", "c.dll"]);
        let report = resolve_all(&deps, &probe, Path::new("/ctx"));

        assert_eq!(report.len(), 3);
        let names: Vec<&str> = report
            .records
            .iter()
            .map(|r| r.dependency_name.as_str())
            .collect();
        assert_eq!(names, vec!["b.dll", "a.dll", "c.dll"]);
        assert!(report.records[0].is_resolved());
        assert!(!report.records[1].is_resolved());
    }

    #[test]
    fn failures_are_data_and_do_not_abort_the_walk() {
        let probe = FakeLoader::new(&[("last.dll", "/lib/last.dll")]);
        let deps = descriptors(&["gone.dll", "last.dll"]);
        let report = resolve_all(&deps, &probe, Path::new("/ctx"));

        assert_eq!(
            report.records[0].resolution,
            crate::record::Resolution::Unresolved(ERROR_MOD_NOT_FOUND)
        );
        assert!(report.records[1].is_resolved());
    }

    #[test]
    fn repeated_names_are_probed_independently() {
        let probe = FakeLoader::new(&[("dup.dll", "/lib/dup.dll")]);
        let deps = descriptors(&["dup.dll", "dup.dll"]);
        let report = resolve_all(&deps, &probe, Path::new("/ctx"));

        assert_eq!(report.len(), 2);
        assert_eq!(*probe.probed.borrow(), vec!["dup.dll", "dup.dll"]);
    }
}
