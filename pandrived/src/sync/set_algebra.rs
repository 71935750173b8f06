use std::collections::{HashMap, HashSet};

use super::item::{LocalFileItem, PanFileItem};
use super::paths::relative_of;

/// Result of comparing the children of one local folder against the children
/// of its mapped remote folder, keyed by path relative to the sync roots.
#[derive(Debug, Default)]
pub struct FolderDiff {
    /// Entries whose relative path appears only under the local root.
    pub local_only: Vec<LocalFileItem>,
    /// Entries whose relative path appears only under the remote root.
    pub pan_only: Vec<PanFileItem>,
    /// Pairs sharing a relative path, candidates for per-file comparison.
    pub matched: Vec<(LocalFileItem, PanFileItem)>,
}

pub fn diff_children(
    local: &[LocalFileItem],
    pan: &[PanFileItem],
    local_root: &str,
    pan_root: &str,
) -> FolderDiff {
    let pan_by_rel: HashMap<String, &PanFileItem> = pan
        .iter()
        .map(|item| (relative_of(&item.path, pan_root), item))
        .collect();
    let local_rels: HashSet<String> = local
        .iter()
        .map(|item| relative_of(&item.path, local_root))
        .collect();

    let mut diff = FolderDiff::default();
    for item in local {
        let rel = relative_of(&item.path, local_root);
        match pan_by_rel.get(&rel) {
            Some(peer) => diff.matched.push((item.clone(), (*peer).clone())),
            None => diff.local_only.push(item.clone()),
        }
    }
    for item in pan {
        let rel = relative_of(&item.path, pan_root);
        if !local_rels.contains(&rel) {
            diff.pan_only.push(item.clone());
        }
    }
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::item::ScanStatus;

    fn local(path: &str) -> LocalFileItem {
        LocalFileItem {
            path: path.to_string(),
            is_folder: false,
            size: 1,
            modified: 100,
            sha1: String::new(),
            scan_status: ScanStatus::Normal,
            updated_at: String::new(),
        }
    }

    fn pan(path: &str) -> PanFileItem {
        PanFileItem {
            path: path.to_string(),
            file_id: String::new(),
            is_folder: false,
            size: 1,
            modified: 100,
            sha1: String::new(),
            scan_status: ScanStatus::Normal,
            updated_at: String::new(),
        }
    }

    #[test]
    fn splits_children_into_three_classes() {
        let local_children = [local("/L/a.txt"), local("/L/b.txt")];
        let pan_children = [pan("/R/b.txt"), pan("/R/c.txt")];

        let diff = diff_children(&local_children, &pan_children, "/L", "/R");

        assert_eq!(diff.local_only.len(), 1);
        assert_eq!(diff.local_only[0].path, "/L/a.txt");
        assert_eq!(diff.pan_only.len(), 1);
        assert_eq!(diff.pan_only[0].path, "/R/c.txt");
        assert_eq!(diff.matched.len(), 1);
        assert_eq!(diff.matched[0].0.path, "/L/b.txt");
        assert_eq!(diff.matched[0].1.path, "/R/b.txt");
    }

    #[test]
    fn differences_are_disjoint_and_cover_both_lists() {
        let local_children = [local("/L/a"), local("/L/b"), local("/L/c")];
        let pan_children = [pan("/R/b"), pan("/R/d")];

        let diff = diff_children(&local_children, &pan_children, "/L", "/R");

        let local_only: HashSet<String> = diff
            .local_only
            .iter()
            .map(|item| relative_of(&item.path, "/L"))
            .collect();
        let pan_only: HashSet<String> = diff
            .pan_only
            .iter()
            .map(|item| relative_of(&item.path, "/R"))
            .collect();
        let matched: HashSet<String> = diff
            .matched
            .iter()
            .map(|(item, _)| relative_of(&item.path, "/L"))
            .collect();

        assert!(local_only.is_disjoint(&pan_only));
        assert!(local_only.is_disjoint(&matched));
        assert!(pan_only.is_disjoint(&matched));

        let mut union: HashSet<String> = HashSet::new();
        union.extend(local_only);
        union.extend(pan_only);
        union.extend(matched);
        let mut expected: HashSet<String> = HashSet::new();
        expected.extend(
            local_children
                .iter()
                .map(|item| relative_of(&item.path, "/L")),
        );
        expected.extend(pan_children.iter().map(|item| relative_of(&item.path, "/R")));
        assert_eq!(union, expected);
    }

    #[test]
    fn empty_sides_yield_one_sided_diffs() {
        let diff = diff_children(&[local("/L/a")], &[], "/L", "/R");
        assert_eq!(diff.local_only.len(), 1);
        assert!(diff.pan_only.is_empty());
        assert!(diff.matched.is_empty());

        let diff = diff_children(&[], &[pan("/R/a")], "/L", "/R");
        assert_eq!(diff.pan_only.len(), 1);
    }
}
