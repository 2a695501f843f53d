//! Three-way tree reconciliation (spec §4.3).
//!
//! `diff(local, saved, remote)` walks the three trees in lock-step and
//! aggregates every file-level decision into a single [`DiffResult`] in
//! one pass, per the redesign flag that replaces the original's
//! recursive small-result-merged-by-`+=` pattern with a single
//! accumulator threaded through the recursion.

use std::fmt;
use std::path::PathBuf;

use indexmap::IndexMap;

use super::error::{Error, Result};
use super::interrupt;
use super::tree::{Directory, FileEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    LocalAdded,
    LocalDelete,
    LocalNewer,
    LocalRevert,
    RemoteAdded,
    RemoteDelete,
    RemoteNewer,
    RemoteRevert,
}

impl Operation {
    pub fn is_local(self) -> bool {
        matches!(
            self,
            Operation::LocalAdded | Operation::LocalDelete | Operation::LocalNewer | Operation::LocalRevert
        )
    }

    pub fn is_remote(self) -> bool {
        !self.is_local()
    }

    /// Short marker matching the original CLI's `+|`, ` |-`, etc.
    pub fn marker(self) -> &'static str {
        match self {
            Operation::LocalDelete => "-| ",
            Operation::LocalRevert => "<| ",
            Operation::LocalNewer => ">| ",
            Operation::LocalAdded => "+| ",
            Operation::RemoteDelete => " |-",
            Operation::RemoteRevert => " |>",
            Operation::RemoteNewer => " |<",
            Operation::RemoteAdded => " |+",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.marker())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
    pub file: FileEntry,
    pub operation: Operation,
}

impl Diff {
    pub fn new(file: FileEntry, operation: Operation) -> Self {
        Diff { file, operation }
    }
}

/// The outcome of a three-way diff: agreed changes keyed by path, plus
/// an ordered list of conflicting pairs.
///
/// Invariant: every path touched by the walk appears in exactly one of
/// `changes` or `conflicts`, never both, never twice.
#[derive(Debug, Default, Clone)]
pub struct DiffResult {
    changes: IndexMap<PathBuf, Diff>,
    conflicts: Vec<(Diff, Diff)>,
    baseline_only: Vec<FileEntry>,
}

impl DiffResult {
    pub fn changes(&self) -> impl Iterator<Item = &Diff> {
        self.changes.values()
    }

    pub fn conflicts(&self) -> &[(Diff, Diff)] {
        &self.conflicts
    }

    /// Files a conflict resolution decided need no transfer, only a
    /// baseline update (spec §4.4: identical simultaneous add).
    pub fn baseline_only(&self) -> &[FileEntry] {
        &self.baseline_only
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.conflicts.is_empty()
    }

    pub fn change_count(&self) -> usize {
        self.changes.len()
    }

    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }

    pub fn take_conflicts(&mut self) -> Vec<(Diff, Diff)> {
        std::mem::take(&mut self.conflicts)
    }

    /// Push a conflict pair back, e.g. one the conflict resolver deferred.
    pub fn push_conflict(&mut self, pair: (Diff, Diff)) {
        self.conflicts.push(pair);
    }

    /// Insert a pending conflict resolution directly, bypassing the
    /// aggregation rule below. Used by the conflict resolver to push an
    /// "accept local"/"accept remote" decision into `changes`.
    pub fn record_resolved(&mut self, diff: Diff) {
        self.changes.insert(diff.file.path().to_path_buf(), diff);
    }

    /// Record a resolution that only updates the saved baseline — no
    /// upload or download (spec §4.4: identical simultaneous add).
    pub fn record_baseline_only(&mut self, file: FileEntry) {
        self.baseline_only.push(file);
    }

    /// Merge one freshly observed diff into this result, applying the
    /// conflict-aggregation rule in spec §4.3.
    fn push(&mut self, diff: Diff) -> Result<()> {
        let path = diff.file.path().to_path_buf();
        let Some(existing) = self.changes.shift_remove(&path) else {
            self.changes.insert(path, diff);
            return Ok(());
        };

        let (local, remote) = match (diff.operation.is_local(), existing.operation.is_local()) {
            (true, false) => (diff, existing),
            (false, true) => (existing, diff),
            _ => {
                return Err(Error::Protocol(format!(
                    "duplicate same-side diff for {}: {:?} and {:?}",
                    path.display(),
                    diff.operation,
                    existing.operation
                )));
            }
        };

        if local.operation == Operation::LocalAdded && remote.operation == Operation::RemoteAdded {
            if local.file.last_write_time() == remote.file.last_write_time() {
                self.conflicts.push((local, remote));
            } else if local.file.last_write_time() > remote.file.last_write_time() {
                let reclassified = Diff::new(local.file.clone(), Operation::LocalNewer);
                self.conflicts.push((reclassified, remote));
            } else {
                let reclassified = Diff::new(remote.file.clone(), Operation::RemoteNewer);
                self.conflicts.push((local, reclassified));
            }
            return Ok(());
        }

        if local.operation == Operation::LocalDelete && remote.operation == Operation::RemoteDelete {
            // Both sides agree the file is gone: drop silently.
            return Ok(());
        }

        self.conflicts.push((local, remote));
        Ok(())
    }

    fn extend(&mut self, other: DiffResult) -> Result<()> {
        for (path, diff) in other.changes {
            if self.changes.contains_key(&path) {
                return Err(Error::Protocol(format!(
                    "concatenation of duplicate path {} in DiffResult",
                    path.display()
                )));
            }
            self.changes.insert(path, diff);
        }
        self.conflicts.extend(other.conflicts);
        Ok(())
    }
}

/// Compute the three-way diff of `local` vs `saved` vs `remote`.
pub fn diff(local: &Directory, saved: &Directory, remote: &Directory) -> Result<DiffResult> {
    let mut result = DiffResult::default();
    diff_level(local, saved, remote, &mut result)?;
    Ok(result)
}

fn diff_level(
    local: &Directory,
    saved: &Directory,
    remote: &Directory,
    result: &mut DiffResult,
) -> Result<()> {
    interrupt::check()?;

    // Files present in local: compare against saved.
    for local_file in local.files() {
        match saved.find_file(local_file.name()) {
            Some(saved_file) if saved_file.last_write_time() > local_file.last_write_time() => {
                result.push(Diff::new(local_file.clone(), Operation::LocalRevert))?;
            }
            Some(saved_file) if saved_file.last_write_time() < local_file.last_write_time() => {
                result.push(Diff::new(local_file.clone(), Operation::LocalNewer))?;
            }
            Some(_) => {}
            None => {
                result.push(Diff::new(local_file.clone(), Operation::LocalAdded))?;
            }
        }
    }

    // Files removed locally (present in saved, absent in local).
    for saved_file in saved.files() {
        if local.find_file(saved_file.name()).is_none() {
            result.push(Diff::new(saved_file.clone(), Operation::LocalDelete))?;
        }
    }

    // Files present in remote: compare against saved.
    for remote_file in remote.files() {
        match saved.find_file(remote_file.name()) {
            Some(saved_file) if saved_file.last_write_time() > remote_file.last_write_time() => {
                result.push(Diff::new(remote_file.clone(), Operation::RemoteRevert))?;
            }
            Some(saved_file) if saved_file.last_write_time() < remote_file.last_write_time() => {
                result.push(Diff::new(remote_file.clone(), Operation::RemoteNewer))?;
            }
            Some(_) => {}
            None => {
                result.push(Diff::new(remote_file.clone(), Operation::RemoteAdded))?;
            }
        }
    }

    // Files removed on remote (present in saved, absent in remote).
    for saved_file in saved.files() {
        if remote.find_file(saved_file.name()).is_none() {
            result.push(Diff::new(saved_file.clone(), Operation::RemoteDelete))?;
        }
    }

    // Recurse into directories present in saved.
    for saved_dir in saved.directories() {
        let found_local = local.find_directory(saved_dir.name());
        let found_remote = remote.find_directory(saved_dir.name());

        match (found_local, found_remote) {
            (Some(local_dir), Some(remote_dir)) => {
                diff_level(local_dir, saved_dir, remote_dir, result)?;
            }
            (None, Some(remote_dir)) => {
                for removed in remote_dir.files_recursive() {
                    result.push(Diff::new(removed, Operation::LocalDelete))?;
                }
            }
            (Some(local_dir), None) => {
                for removed in local_dir.files_recursive() {
                    result.push(Diff::new(removed, Operation::RemoteDelete))?;
                }
            }
            (None, None) => {
                // Deleted on both sides: collapse, matching saved_dir's
                // own files under both LocalDelete and RemoteDelete so
                // they cancel per the aggregation rule.
                for removed in saved_dir.files_recursive() {
                    result.push(Diff::new(removed.clone(), Operation::LocalDelete))?;
                    result.push(Diff::new(removed, Operation::RemoteDelete))?;
                }
            }
        }
    }

    // New directories added locally (absent from saved).
    for local_dir in local.directories() {
        if saved.find_directory(local_dir.name()).is_none() {
            if let Some(remote_dir) = remote.find_directory(local_dir.name()) {
                // Present on both local and remote but not saved: recurse
                // as if saved had an empty directory of that name. Its
                // path is never consulted, only its absence of entries.
                let empty_saved = Directory::named(local_dir.name(), PathBuf::new());
                diff_level(local_dir, &empty_saved, remote_dir, result)?;
            } else {
                for added in local_dir.files_recursive() {
                    result.push(Diff::new(added, Operation::LocalAdded))?;
                }
            }
        }
    }

    // New directories added on remote (absent from saved, and not
    // already handled above as a both-sides-new directory).
    for remote_dir in remote.directories() {
        if saved.find_directory(remote_dir.name()).is_none()
            && local.find_directory(remote_dir.name()).is_none()
        {
            for added in remote_dir.files_recursive() {
                result.push(Diff::new(added, Operation::RemoteAdded))?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn file(name: &str, mtime: i64) -> FileEntry {
        FileEntry::new(Path::new(""), name, 1, mtime)
    }

    fn dir_with_files(files: Vec<FileEntry>) -> Directory {
        let mut d = Directory::root();
        for f in files {
            d.replace_insert_file(f);
        }
        d
    }

    /// S1 — two-way add.
    #[test]
    fn scenario_two_way_add() {
        let local = dir_with_files(vec![file("a", 10)]);
        let saved = Directory::root();
        let remote = Directory::root();

        let result = diff(&local, &saved, &remote).unwrap();
        assert_eq!(result.change_count(), 1);
        assert_eq!(result.conflict_count(), 0);
        let change = result.changes().next().unwrap();
        assert_eq!(change.operation, Operation::LocalAdded);
    }

    /// S2 — both-sides delete.
    #[test]
    fn scenario_both_sides_delete() {
        let local = Directory::root();
        let saved = dir_with_files(vec![file("a", 10)]);
        let remote = Directory::root();

        let result = diff(&local, &saved, &remote).unwrap();
        assert!(result.is_empty());
    }

    /// S3 — simultaneous add, same mtime.
    #[test]
    fn scenario_simultaneous_add_same_mtime() {
        let local = dir_with_files(vec![file("a", 42)]);
        let remote = dir_with_files(vec![file("a", 42)]);
        let saved = Directory::root();

        let result = diff(&local, &saved, &remote).unwrap();
        assert_eq!(result.change_count(), 0);
        assert_eq!(result.conflict_count(), 1);
        let (l, r) = &result.conflicts()[0];
        assert_eq!(l.operation, Operation::LocalAdded);
        assert_eq!(r.operation, Operation::RemoteAdded);
    }

    /// S4 — simultaneous add, different mtime: auto-merges to newer.
    #[test]
    fn scenario_simultaneous_add_different_mtime() {
        let local = dir_with_files(vec![file("a", 10)]);
        let remote = dir_with_files(vec![file("a", 20)]);
        let saved = Directory::root();

        let result = diff(&local, &saved, &remote).unwrap();
        assert_eq!(result.change_count(), 0);
        assert_eq!(result.conflict_count(), 1);
        let (l, r) = &result.conflicts()[0];
        assert_eq!(l.operation, Operation::LocalAdded);
        assert_eq!(r.operation, Operation::RemoteNewer);
    }

    /// S5 — local edit vs remote delete.
    #[test]
    fn scenario_local_edit_vs_remote_delete() {
        let local = dir_with_files(vec![file("a", 20)]);
        let saved = dir_with_files(vec![file("a", 10)]);
        let remote = Directory::root();

        let result = diff(&local, &saved, &remote).unwrap();
        assert_eq!(result.change_count(), 0);
        assert_eq!(result.conflict_count(), 1);
        let (l, r) = &result.conflicts()[0];
        assert_eq!(l.operation, Operation::LocalNewer);
        assert_eq!(r.operation, Operation::RemoteDelete);
    }

    #[test]
    fn every_path_in_exactly_one_bucket() {
        let local = dir_with_files(vec![file("added", 1), file("same", 5)]);
        let saved = dir_with_files(vec![file("same", 5), file("removed", 5)]);
        let remote = dir_with_files(vec![file("same", 5), file("conflict", 1)]);

        let result = diff(&local, &saved, &remote).unwrap();
        let mut seen = std::collections::HashSet::new();
        for c in result.changes() {
            assert!(seen.insert(c.file.path().to_path_buf()));
        }
        for (l, r) in result.conflicts() {
            assert_eq!(l.file.path(), r.file.path());
        }
    }

    #[test]
    fn directory_deleted_on_both_sides_collapses() {
        let mut saved = Directory::root();
        let mut sub = Directory::named("sub", PathBuf::from("sub"));
        sub.replace_insert_file(FileEntry::new(Path::new("sub"), "x", 1, 1));
        saved.push_directory(sub);

        let local = Directory::root();
        let remote = Directory::root();

        let result = diff(&local, &saved, &remote).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn duplicate_same_side_diff_is_protocol_error() {
        let mut result = DiffResult::default();
        let f = file("a", 1);
        result.push(Diff::new(f.clone(), Operation::LocalAdded)).unwrap();
        let err = result.push(Diff::new(f, Operation::LocalNewer));
        assert!(err.is_err());
    }
}
