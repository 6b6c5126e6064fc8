//! Chained candidate ordering over a closed set of sortable fields.

use std::cmp::Ordering;

use sluice_config::{SortKey, SortOrder, SortSpec};

use crate::scan::ScanEntry;

/// Sort candidates by the chained specs; earlier specs win, later specs break
/// ties. An empty chain leaves directory-listing order untouched.
pub(crate) fn sort_entries(entries: &mut [ScanEntry], specs: &[SortSpec]) {
    if specs.is_empty() {
        return;
    }
    entries.sort_by(|a, b| compare(a, b, specs));
}

fn compare(a: &ScanEntry, b: &ScanEntry, specs: &[SortSpec]) -> Ordering {
    for spec in specs {
        let ordering = match spec.key {
            SortKey::Name => a.name.cmp(&b.name),
            SortKey::Size => a.len.cmp(&b.len),
            SortKey::Modified => a.modified_ms.cmp(&b.modified_ms),
        };
        let ordering = match spec.order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn entry(name: &str, len: u64, modified_ms: i64) -> ScanEntry {
        ScanEntry {
            path: PathBuf::from(name),
            name: name.to_string(),
            len,
            modified_ms,
            is_dir: false,
        }
    }

    #[test]
    fn sorts_by_modification_time_descending() {
        let mut entries = vec![entry("a", 1, 100), entry("b", 1, 300), entry("c", 1, 200)];
        sort_entries(
            &mut entries,
            &[SortSpec {
                key: SortKey::Modified,
                order: SortOrder::Descending,
            }],
        );
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["b", "c", "a"]);
    }

    #[test]
    fn later_specs_break_ties() {
        let mut entries = vec![entry("b", 10, 0), entry("a", 10, 0), entry("c", 5, 0)];
        sort_entries(
            &mut entries,
            &[
                SortSpec {
                    key: SortKey::Size,
                    order: SortOrder::Ascending,
                },
                SortSpec {
                    key: SortKey::Name,
                    order: SortOrder::Ascending,
                },
            ],
        );
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["c", "a", "b"]);
    }

    #[test]
    fn empty_spec_preserves_listing_order() {
        let mut entries = vec![entry("z", 1, 1), entry("a", 2, 2)];
        sort_entries(&mut entries, &[]);
        assert_eq!(entries[0].name, "z");
    }
}
