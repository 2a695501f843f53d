//! Sync workflows: `status`, `pull`, `push`, `clone`, `sync` (spec §4.5).
//!
//! Each workflow computes a diff, optionally resolves conflicts, then
//! applies the agreed changes one file at a time, continuing past a
//! per-file failure rather than aborting the whole run — matching the
//! original CLI's behavior of reporting failures inline instead of
//! unwinding the whole command.

use std::path::PathBuf;

use log::warn;

use super::config::RepositoryConfig;
use super::diff::{Diff, DiffResult, Operation};
use super::error::{Error, Result};
use super::interrupt;
use super::resolve::{self, ConflictPrompt};
use super::tree::Directory;
use crate::transport::Remote;

/// Direction a diff's changes should be pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Apply local-side operations only (pull remote changes down).
    PullOnly,
    /// Apply remote-side operations only (push local changes up).
    PushOnly,
    /// Apply both sides (full two-way sync).
    Both,
}

/// One file-level outcome of a sync run, success or failure.
pub struct Outcome {
    pub path: PathBuf,
    pub operation: Operation,
    pub result: Result<()>,
}

/// Compute the three-way diff against the remote without applying
/// anything (`fileshare status`).
pub fn status(config: &RepositoryConfig, remote: &dyn Remote) -> Result<DiffResult> {
    config.diff_against_remote(remote)
}

/// Run a full sync workflow: diff, resolve conflicts via `prompt`, apply
/// every change in `direction`, and persist the updated baseline after
/// each successful step so an interruption loses no already-applied work.
pub fn run(
    config: &mut RepositoryConfig,
    remote: &dyn Remote,
    direction: Direction,
    prompt: &mut dyn ConflictPrompt,
) -> Result<Vec<Outcome>> {
    interrupt::reset();
    let mut result = config.diff_against_remote(remote)?;
    resolve::resolve_conflicts(&mut result, prompt)?;

    if !result.baseline_only().is_empty() {
        for file in result.baseline_only() {
            config.update_saved_state(file);
        }
        config.save()?;
    }

    let mut outcomes = Vec::new();
    for diff in result.changes() {
        // pull applies Remote* operations, push applies Local* ones.
        if direction == Direction::PullOnly && diff.operation.is_local() {
            continue;
        }
        if direction == Direction::PushOnly && !diff.operation.is_local() {
            continue;
        }

        if let Err(Error::Interrupted) = interrupt::check() {
            outcomes.push(Outcome {
                path: diff.file.path().to_path_buf(),
                operation: diff.operation,
                result: Err(super::error::Error::Interrupted),
            });
            break;
        }

        let outcome_result = apply_one(config, remote, diff);
        outcomes.push(Outcome {
            path: diff.file.path().to_path_buf(),
            operation: diff.operation,
            result: outcome_result,
        });
        config.save()?;
    }

    Ok(outcomes)
}

fn apply_one(config: &mut RepositoryConfig, remote: &dyn Remote, diff: &Diff) -> Result<()> {
    match diff.operation {
        // Remote state wins: download locally.
        Operation::RemoteAdded | Operation::RemoteNewer => {
            config.download_replace_file(remote, &diff.file)
        }
        Operation::RemoteDelete => config.receive_delete_file(&diff.file),
        // Local state wins: upload, or tell the server the file is gone.
        Operation::LocalAdded | Operation::LocalNewer => config.upload_file(remote, &diff.file),
        Operation::LocalDelete => config.send_delete_file(remote, &diff.file),
        // A revert to the saved state on one side, while the other side
        // changed: warn instead of transferring over the real edit.
        Operation::LocalRevert | Operation::RemoteRevert => {
            warn!(
                "{} was reverted to its saved state while the other side changed it; \
                 skipping transfer, resolve manually",
                diff.file.path().display()
            );
            Ok(())
        }
    }
}

/// Clone a repository into an empty local directory: fetch the remote
/// tree, download every file, and seed the baseline as that same tree
/// (spec §4.5 clone workflow; there is no local state to reconcile yet).
pub fn clone(config: &mut RepositoryConfig, remote: &dyn Remote) -> Result<Vec<Outcome>> {
    interrupt::reset();
    config.check_clock_sync(remote)?;
    let remote_tree = config.fetch_remote_tree(remote)?;

    let mut outcomes = Vec::new();
    for file in remote_tree.files_recursive() {
        interrupt::check()?;
        let outcome_result = config.download_replace_file(remote, &file);
        outcomes.push(Outcome {
            path: file.path().to_path_buf(),
            operation: Operation::RemoteAdded,
            result: outcome_result,
        });
        config.save()?;
    }

    let local_tree = Directory::from_filesystem(config.repo_root())?;
    config.init_saved_state(&local_tree, &remote_tree);
    config.save()?;
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tree::{FileEntry, Tree};
    use crate::transport::{UploadProgress, UploadRequest};
    use std::io::Write;
    use std::path::Path;
    use std::sync::Mutex;

    struct FakeRemote {
        tree: Tree,
        time_offset_ms: Mutex<i64>,
        delete_calls: Mutex<usize>,
    }

    impl Remote for FakeRemote {
        fn login(&self, _username: &str, _password: &str) -> Result<(String, i64)> {
            Ok(("token".to_string(), 0))
        }

        fn tree(&self, _auth_token: &str, _repository: &str, _directory: &str) -> Result<Tree> {
            Ok(self.tree.clone())
        }

        fn fetch_file(
            &self,
            _auth_token: &str,
            _repository: &str,
            _remote_path: &Path,
            writer: &mut dyn Write,
        ) -> Result<i64> {
            writer.write_all(b"content").unwrap();
            Ok(1)
        }

        fn upload_part(
            &self,
            _auth_token: &str,
            _repository: &str,
            _upload: &UploadRequest,
            _content_token: Option<&str>,
            _chunk: &[u8],
        ) -> Result<UploadProgress> {
            Ok(UploadProgress::Finished)
        }

        fn delete_file(&self, _auth_token: &str, _repository: &str, _remote_path: &Path) -> Result<()> {
            *self.delete_calls.lock().unwrap() += 1;
            Ok(())
        }

        fn time_epoch(&self) -> Result<i64> {
            use std::time::{SystemTime, UNIX_EPOCH};
            let now_ms = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_millis() as i64;
            let offset = *self.time_offset_ms.lock().unwrap();
            Ok(now_ms - offset)
        }
    }

    fn in_sync_remote(tree: Tree) -> FakeRemote {
        FakeRemote {
            tree,
            time_offset_ms: Mutex::new(0),
            delete_calls: Mutex::new(0),
        }
    }

    #[test]
    fn status_with_identical_trees_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = RepositoryConfig::open(dir.path()).unwrap();
        let remote = in_sync_remote(Directory::root());

        let result = status(&config, &remote).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn pull_downloads_remote_added_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RepositoryConfig::open(dir.path()).unwrap();

        let mut remote_tree = Directory::root();
        remote_tree.replace_insert_file(FileEntry::new(Path::new(""), "a.txt", 7, 100));
        let remote = in_sync_remote(remote_tree);

        let mut prompt = super::super::resolve::NoPrompt;
        let outcomes = run(&mut config, &remote, Direction::PullOnly, &mut prompt).unwrap();

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].result.is_ok());
        assert!(dir.path().join("a.txt").exists());
    }

    #[test]
    fn pull_skips_local_side_operations() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RepositoryConfig::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        let remote = in_sync_remote(Directory::root());

        let mut prompt = super::super::resolve::NoPrompt;
        let outcomes = run(&mut config, &remote, Direction::PullOnly, &mut prompt).unwrap();
        assert_eq!(outcomes.len(), 0);
    }

    #[test]
    fn push_uploads_local_added_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RepositoryConfig::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        let remote = in_sync_remote(Directory::root());

        let mut prompt = super::super::resolve::NoPrompt;
        let outcomes = run(&mut config, &remote, Direction::PushOnly, &mut prompt).unwrap();

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].result.is_ok());
        assert_eq!(outcomes[0].operation, Operation::LocalAdded);
    }

    #[test]
    fn local_delete_sends_remote_delete_not_local_unlink() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RepositoryConfig::open(dir.path()).unwrap();

        let mut remote_tree = Directory::root();
        remote_tree.replace_insert_file(FileEntry::new(Path::new(""), "a.txt", 7, 100));
        config.update_saved_state(&FileEntry::new(Path::new(""), "a.txt", 7, 100));
        let remote = in_sync_remote(remote_tree);

        let mut prompt = super::super::resolve::NoPrompt;
        let outcomes = run(&mut config, &remote, Direction::PushOnly, &mut prompt).unwrap();

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].result.is_ok());
        assert_eq!(outcomes[0].operation, Operation::LocalDelete);
        assert_eq!(*remote.delete_calls.lock().unwrap(), 1);
    }

    #[test]
    fn revert_warns_without_transferring() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RepositoryConfig::open(dir.path()).unwrap();
        let remote = in_sync_remote(Directory::root());

        let file = FileEntry::new(Path::new(""), "a.txt", 7, 50);
        let diff = Diff::new(file, Operation::LocalRevert);
        let result = apply_one(&mut config, &remote, &diff);

        assert!(result.is_ok());
        assert!(!dir.path().join("a.txt").exists());
    }
}
