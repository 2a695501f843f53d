//! Mutators for the saved-state tree (spec §4.2).
//!
//! Both operations consume the file's path as a sequence of components
//! and walk one directory level per step, creating empty intermediate
//! directories as needed. Neither retains a reference to the caller's
//! [`FileEntry`] — a copy is taken by `Directory::replace_insert_file`.

use std::path::Path;

use super::tree::{Directory, FileEntry, Tree};

/// Insert or replace `file` in the baseline tree, creating any missing
/// intermediate directories along its path.
pub fn upsert(baseline: &mut Tree, file: &FileEntry) {
    let components: Vec<&str> = path_components(file.path());
    walk_insert(baseline, &components, file);
}

/// Remove `file` from the baseline tree. A delete of something already
/// absent — including a missing intermediate directory — is a silent
/// no-op.
pub fn erase(baseline: &mut Tree, file: &FileEntry) {
    let components: Vec<&str> = path_components(file.path());
    walk_erase(baseline, &components);
}

fn path_components(path: &Path) -> Vec<&str> {
    path.components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect()
}

fn walk_insert(dir: &mut Directory, components: &[&str], file: &FileEntry) {
    match components {
        [] => {}
        [_name] => dir.replace_insert_file(file.with_parent_path(dir.path())),
        [head, rest @ ..] => {
            let child = dir.directory_or_create(head);
            walk_insert(child, rest, file);
        }
    }
}

fn walk_erase(dir: &mut Directory, components: &[&str]) {
    match components {
        [] => {}
        [name] => dir.delete_file(name),
        [head, rest @ ..] => {
            if let Some(child) = dir.find_directory_mut(head) {
                walk_erase(child, rest);
            }
            // Missing intermediate directory: nothing to erase, no-op.
        }
    }
}

/// Synthesize the initial baseline as the intersection of `local` and
/// `remote`, keeping the older timestamp for each commonly-present file
/// (spec §4.2, §8 property 6). Files present on only one side are
/// omitted so they surface as adds on the next diff.
pub fn init_saved_state(local: &Directory, remote: &Directory) -> Tree {
    build(local, remote, local.name(), local.path().to_path_buf())
}

fn build(local: &Directory, remote: &Directory, name: &str, path: std::path::PathBuf) -> Tree {
    let mut result = Directory::named(name, path);

    for local_file in local.files() {
        if let Some(remote_file) = remote.find_file(local_file.name()) {
            let older = if remote_file.last_write_time() < local_file.last_write_time() {
                remote_file
            } else {
                local_file
            };
            result.replace_insert_file(older.clone());
        }
    }

    for local_dir in local.directories() {
        if let Some(remote_dir) = remote.find_directory(local_dir.name()) {
            let child_path = result.path().join(local_dir.name());
            result.push_directory(build(local_dir, remote_dir, local_dir.name(), child_path));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn file(parent: &Path, name: &str, mtime: i64) -> FileEntry {
        FileEntry::new(parent, name, 10, mtime)
    }

    #[test]
    fn upsert_creates_intermediate_directories() {
        let mut baseline = Directory::root();
        let f = FileEntry::new(Path::new("a/b"), "c.txt", 5, 100);
        upsert(&mut baseline, &f);

        let a = baseline.find_directory("a").expect("a created");
        let b = a.find_directory("b").expect("b created");
        assert!(b.find_file("c.txt").is_some());
    }

    #[test]
    fn upsert_replaces_existing_file() {
        let mut baseline = Directory::root();
        let f1 = file(Path::new(""), "x.txt", 1);
        let f2 = file(Path::new(""), "x.txt", 2);
        upsert(&mut baseline, &f1);
        upsert(&mut baseline, &f2);
        assert_eq!(baseline.find_file("x.txt").unwrap().last_write_time(), 2);
    }

    #[test]
    fn erase_missing_directory_is_noop() {
        let mut baseline = Directory::root();
        let f = FileEntry::new(Path::new("missing/dir"), "x.txt", 1, 1);
        erase(&mut baseline, &f); // must not panic
        assert!(baseline.find_directory("missing").is_none());
    }

    #[test]
    fn erase_removes_file() {
        let mut baseline = Directory::root();
        let f = file(Path::new(""), "x.txt", 1);
        upsert(&mut baseline, &f);
        erase(&mut baseline, &f);
        assert!(baseline.find_file("x.txt").is_none());
        // Idempotent: erasing again is still a no-op.
        erase(&mut baseline, &f);
    }

    #[test]
    fn init_saved_state_keeps_older_timestamp_for_shared_files() {
        let mut local = Directory::root();
        local.replace_insert_file(file(&PathBuf::new(), "a.txt", 20));
        local.replace_insert_file(file(&PathBuf::new(), "only_local.txt", 5));

        let mut remote = Directory::root();
        remote.replace_insert_file(file(&PathBuf::new(), "a.txt", 10));
        remote.replace_insert_file(file(&PathBuf::new(), "only_remote.txt", 5));

        let baseline = init_saved_state(&local, &remote);
        assert_eq!(baseline.find_file("a.txt").unwrap().last_write_time(), 10);
        assert!(baseline.find_file("only_local.txt").is_none());
        assert!(baseline.find_file("only_remote.txt").is_none());
    }
}
