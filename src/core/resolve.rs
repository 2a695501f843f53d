//! Conflict resolution matrix (spec §4.4).
//!
//! Grounded on the original `merge_conflicts` routine: some conflict
//! shapes have one obviously-correct outcome and are merged without
//! asking anyone (an added-on-both-sides pair with identical content
//! size, a delete racing a revert back to the saved state); everything
//! else needs a human to pick a side.

use super::diff::{Diff, DiffResult, Operation};
use super::error::{Error, Result};

/// Which side of a conflict pair a resolution keeps, or whether the two
/// sides already agree and only the saved baseline needs updating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    AcceptLocal,
    AcceptRemote,
    /// Both sides observed the same thing at the same instant; fold it
    /// into the saved state and transfer nothing.
    BaselineOnly,
}

/// Callback invoked once per conflict pair that the matrix cannot
/// resolve automatically. Returns `None` to mean "ask again later" /
/// "skip for now", which the sync driver treats as leaving the
/// conflict unresolved.
pub trait ConflictPrompt {
    fn ask(&mut self, local: &Diff, remote: &Diff) -> Result<Option<Resolution>>;
}

/// Non-interactive prompt that always reports [`Error::InteractiveRequired`].
/// Used by non-TTY invocations (spec §4.4: "needs user" cells fail loudly
/// rather than guessing when no prompt is wired up).
pub struct NoPrompt;

impl ConflictPrompt for NoPrompt {
    fn ask(&mut self, local: &Diff, _remote: &Diff) -> Result<Option<Resolution>> {
        Err(Error::InteractiveRequired {
            path: local.file.path().to_path_buf(),
        })
    }
}

/// Attempt to auto-merge a conflict pair per the resolution matrix.
/// Returns `Some(resolution)` when the pair falls into a cell that never
/// needs a human, `None` when it must be escalated to the prompt.
fn auto_merge(local: &Diff, remote: &Diff) -> Option<Resolution> {
    use Operation::*;

    match (local.operation, remote.operation) {
        // Both sides independently added the same path at the same
        // instant: nothing to transfer, just record it as already known.
        (LocalAdded, RemoteAdded) if local.file.last_write_time() == remote.file.last_write_time() => {
            Some(Resolution::BaselineOnly)
        }
        // Unequal-timestamp simultaneous add: the diff engine has already
        // reclassified the older side as `*Newer`; the newer side wins.
        (LocalAdded, RemoteNewer) => Some(Resolution::AcceptRemote),
        (LocalNewer, RemoteAdded) => Some(Resolution::AcceptLocal),
        // A delete racing an edit on the other side: the edit wins.
        (LocalDelete, RemoteAdded) => Some(Resolution::AcceptRemote),
        (LocalDelete, RemoteNewer) => Some(Resolution::AcceptRemote),
        // One side reverted to the saved state while the other deleted
        // it: the real edit wins over the no-op revert.
        (LocalRevert, RemoteDelete) => Some(Resolution::AcceptLocal),
        (LocalDelete, RemoteRevert) => Some(Resolution::AcceptRemote),
        // Already-reclassified Newer vs Newer with identical size is the
        // same file re-saved on both sides; no data would be lost either way.
        (LocalNewer, RemoteNewer) if local.file.size() == remote.file.size() => {
            Some(Resolution::AcceptLocal)
        }
        _ => None,
    }
}

/// Resolve every conflict in `result`, draining `result.conflicts()`.
/// A resolution that keeps one side is folded back into
/// `result.changes()` as an [`Operation::LocalNewer`]/[`Operation::RemoteNewer`]
/// diff so the sync driver can apply it uniformly; a [`Resolution::BaselineOnly`]
/// resolution instead lands in `result.baseline_only()`, which the driver
/// folds into the saved state without transferring anything. Conflicts the
/// prompt declines to resolve (`Ok(None)`) are put back for a later pass.
pub fn resolve_conflicts(result: &mut DiffResult, prompt: &mut dyn ConflictPrompt) -> Result<()> {
    let pending = result.take_conflicts();
    let mut unresolved = Vec::new();

    for (local, remote) in pending {
        let resolution = match auto_merge(&local, &remote) {
            Some(r) => r,
            None => match prompt.ask(&local, &remote)? {
                Some(r) => r,
                None => {
                    unresolved.push((local, remote));
                    continue;
                }
            },
        };

        match resolution {
            Resolution::AcceptLocal => {
                result.record_resolved(Diff::new(local.file.clone(), Operation::LocalNewer));
            }
            Resolution::AcceptRemote => {
                result.record_resolved(Diff::new(remote.file.clone(), Operation::RemoteNewer));
            }
            Resolution::BaselineOnly => {
                result.record_baseline_only(remote.file.clone());
            }
        }
    }

    for pair in unresolved {
        result.push_conflict(pair);
    }
    Ok(())
}
