//! Immutable snapshot of a directory hierarchy.
//!
//! A [`Directory`] owns its children exclusively; there is no sharing
//! between trees and no back-reference from a [`FileEntry`] to its
//! parent. Per the redesign flags in spec §9, each file and directory
//! stores its own fully-qualified path computed at construction time
//! instead of deriving it through a parent pointer at read time.

use std::path::{Path, PathBuf};

use serde_json::Value;

use super::error::{Error, Result};
use super::percent;

/// A single file's identity and change-detection metadata.
///
/// Semantic identity is `(parent path, name)`; `path` is derived once at
/// construction and never recomputed from the outside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    name: String,
    size: u64,
    last_write_time: i64,
    path: PathBuf,
}

impl FileEntry {
    pub fn new(parent_path: &Path, name: impl Into<String>, size: u64, last_write_time: i64) -> Self {
        let name = name.into();
        let path = child_path(parent_path, &name);
        FileEntry {
            name,
            size,
            last_write_time,
            path,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn last_write_time(&self) -> i64 {
        self.last_write_time
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-home this entry under a new parent path, recomputing `path`.
    pub fn with_parent_path(&self, parent_path: &Path) -> Self {
        FileEntry {
            path: child_path(parent_path, &self.name),
            ..self.clone()
        }
    }

    fn to_wire(&self) -> Value {
        serde_json::json!({
            "name": percent::encode(&self.name),
            "timestamp": self.last_write_time,
            "size": self.size,
        })
    }

    fn from_wire(value: &Value, parent_path: &Path) -> Result<Self> {
        let raw_name = value
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Parse("missing file name in retrieved data".to_string()))?;
        let name = percent::decode(raw_name).map_err(Error::Parse)?;
        let last_write_time = value.get("timestamp").and_then(Value::as_i64).unwrap_or(0);
        let size = value
            .get("size")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        Ok(FileEntry::new(parent_path, name, size, last_write_time))
    }
}

fn child_path(parent_path: &Path, name: &str) -> PathBuf {
    if parent_path.as_os_str().is_empty() {
        PathBuf::from(name)
    } else {
        parent_path.join(name)
    }
}

/// A rooted directory; a [`Tree`] is simply the root `Directory`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    name: String,
    path: PathBuf,
    files: Vec<FileEntry>,
    directories: Vec<Directory>,
}

pub type Tree = Directory;

/// Filenames always excluded from a filesystem walk, regardless of
/// `.fileshareignore` contents.
const ALWAYS_EXCLUDED: &str = ".fileshare";

impl Directory {
    /// Construct an empty root directory.
    pub fn root() -> Self {
        Directory {
            name: String::new(),
            path: PathBuf::new(),
            files: Vec::new(),
            directories: Vec::new(),
        }
    }

    /// Construct a directory with an explicit name and path. Used by
    /// components (baseline synthesis, diff recursion) that build trees
    /// programmatically rather than from a filesystem or wire payload.
    pub(crate) fn named(name: impl Into<String>, path: PathBuf) -> Self {
        Directory {
            name: name.into(),
            path,
            files: Vec::new(),
            directories: Vec::new(),
        }
    }

    /// Append an already-constructed child directory.
    pub(crate) fn push_directory(&mut self, child: Directory) {
        self.directories.push(child);
    }

    fn child(parent_path: &Path, name: impl Into<String>) -> Self {
        let name = name.into();
        let path = child_path(parent_path, &name);
        Directory {
            name,
            path,
            files: Vec::new(),
            directories: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_root(&self) -> bool {
        self.name.is_empty()
    }

    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    pub fn directories(&self) -> &[Directory] {
        &self.directories
    }

    pub fn find_file(&self, name: &str) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.name() == name)
    }

    pub fn find_directory(&self, name: &str) -> Option<&Directory> {
        self.directories.iter().find(|d| d.name() == name)
    }

    pub fn find_directory_mut(&mut self, name: &str) -> Option<&mut Directory> {
        self.directories.iter_mut().find(|d| d.name() == name)
    }

    /// Insert an empty child directory (or return the existing one) and
    /// return a mutable handle to it. Used by the baseline store to walk
    /// implicit intermediate directories.
    pub fn directory_or_create(&mut self, name: &str) -> &mut Directory {
        if self.find_directory(name).is_none() {
            let dir = Directory::child(&self.path, name);
            self.directories.push(dir);
        }
        self.find_directory_mut(name).expect("just inserted")
    }

    /// Insert a file, replacing any existing file with the same name.
    pub fn replace_insert_file(&mut self, file: FileEntry) {
        let file = file.with_parent_path(&self.path);
        if let Some(existing) = self.files.iter_mut().find(|f| f.name() == file.name()) {
            *existing = file;
        } else {
            self.files.push(file);
        }
    }

    /// Remove a file by name; a no-op if absent.
    pub fn delete_file(&mut self, name: &str) {
        self.files.retain(|f| f.name() != name);
    }

    /// Every file under this directory, depth-first, files-before-subdirs.
    pub fn files_recursive(&self) -> Vec<FileEntry> {
        let mut out = self.files.clone();
        for dir in &self.directories {
            out.extend(dir.files_recursive());
        }
        out
    }

    /// Recursively walk a filesystem path into a [`Tree`].
    ///
    /// Excludes the literal `.fileshare` entry and every line of a
    /// root-level `.fileshareignore` file (spec §3; treated as literal
    /// names, an Open Question spec.md leaves unresolved but the
    /// original source only ever demonstrates literal matches). Regular
    /// files of zero size are treated as absent.
    pub fn from_filesystem(path: &Path) -> Result<Tree> {
        Self::walk(path, PathBuf::new(), String::new())
    }

    /// `fs_path` is the real filesystem location of this directory;
    /// `own_path`/`own_name` are the tree-relative identity it should
    /// carry (empty for the root).
    fn walk(fs_path: &Path, own_path: PathBuf, own_name: String) -> Result<Tree> {
        super::interrupt::check()?;

        let mut dir = Directory {
            name: own_name,
            path: own_path,
            files: Vec::new(),
            directories: Vec::new(),
        };

        let mut excluded: Vec<String> = vec![ALWAYS_EXCLUDED.to_string()];
        let ignore_file = fs_path.join(".fileshareignore");
        if ignore_file.exists() {
            let contents =
                std::fs::read_to_string(&ignore_file).map_err(|e| Error::io(&ignore_file, e))?;
            for line in contents.lines() {
                if !line.is_empty() {
                    excluded.push(line.to_string());
                }
            }
        }

        let entries = std::fs::read_dir(fs_path).map_err(|e| Error::io(fs_path, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(fs_path, e))?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if excluded.iter().any(|ex| ex == &file_name) {
                continue;
            }
            let entry_path = entry.path();
            let file_type = entry.file_type().map_err(|e| Error::io(&entry_path, e))?;

            if file_type.is_file() {
                let metadata = entry.metadata().map_err(|e| Error::io(&entry_path, e))?;
                let size = metadata.len();
                if size == 0 {
                    continue;
                }
                let mtime_ms = filesystem_mtime_ms(&metadata, &entry_path)?;
                dir.files
                    .push(FileEntry::new(&dir.path, file_name, size, mtime_ms));
            } else if file_type.is_dir() {
                let child_path = child_path(&dir.path, &file_name);
                dir.directories
                    .push(Self::walk(&entry_path, child_path, file_name)?);
            }
        }

        Ok(dir)
    }

    /// Parse a nested `{name, files, directories}` wire payload.
    pub fn from_wire(value: &Value) -> Result<Tree> {
        Self::from_wire_internal(value, &PathBuf::new())
    }

    fn from_wire_internal(value: &Value, parent_path: &Path) -> Result<Tree> {
        super::interrupt::check()?;

        let raw_name = value
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Parse("missing directory name in retrieved data".to_string()))?;
        let name = percent::decode(raw_name).map_err(Error::Parse)?;
        let path = child_path(parent_path, &name);

        let mut dir = Directory {
            name,
            path,
            files: Vec::new(),
            directories: Vec::new(),
        };

        if let Some(files) = value.get("files").and_then(Value::as_array) {
            for entry in files {
                dir.files.push(FileEntry::from_wire(entry, &dir.path)?);
            }
        }
        if let Some(dirs) = value.get("directories").and_then(Value::as_array) {
            for entry in dirs {
                dir.directories
                    .push(Self::from_wire_internal(entry, &dir.path)?);
            }
        }

        Ok(dir)
    }

    /// Serialize to the wire format consumed by [`Directory::from_wire`].
    pub fn to_wire(&self) -> Value {
        serde_json::json!({
            "name": percent::encode(&self.name),
            "files": self.files.iter().map(FileEntry::to_wire).collect::<Vec<_>>(),
            "directories": self.directories.iter().map(Directory::to_wire).collect::<Vec<_>>(),
        })
    }
}

#[cfg(unix)]
fn filesystem_mtime_ms(metadata: &std::fs::Metadata, path: &Path) -> Result<i64> {
    use std::os::unix::fs::MetadataExt;
    let _ = path;
    Ok(metadata.mtime() * 1000 + metadata.mtime_nsec() / 1_000_000)
}

#[cfg(not(unix))]
fn filesystem_mtime_ms(metadata: &std::fs::Metadata, path: &Path) -> Result<i64> {
    let modified = metadata.modified().map_err(|e| Error::io(path, e))?;
    let since_epoch = modified
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    Ok(since_epoch.as_millis() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(parent: &Path, name: &str, mtime: i64, size: u64) -> FileEntry {
        FileEntry::new(parent, name, size, mtime)
    }

    #[test]
    fn find_file_and_directory() {
        let mut root = Directory::root();
        root.files.push(file(&root.path.clone(), "a.txt", 10, 5));
        root.directories.push(Directory::child(&root.path.clone(), "sub"));

        assert!(root.find_file("a.txt").is_some());
        assert!(root.find_file("missing").is_none());
        assert!(root.find_directory("sub").is_some());
    }

    #[test]
    fn files_recursive_collects_nested() {
        let mut root = Directory::root();
        root.files.push(file(&root.path.clone(), "top.txt", 1, 1));
        let mut sub = Directory::child(&root.path.clone(), "sub");
        sub.files.push(file(&sub.path.clone(), "nested.txt", 2, 2));
        root.directories.push(sub);

        let mut names: Vec<_> = root
            .files_recursive()
            .into_iter()
            .map(|f| f.name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["nested.txt", "top.txt"]);
    }

    #[test]
    fn wire_round_trip_preserves_shape() {
        let mut root = Directory::root();
        root.files.push(file(&root.path.clone(), "readme.txt", 42, 100));
        let mut sub = Directory::child(&root.path.clone(), "docs and stuff");
        sub.files.push(file(&sub.path.clone(), "naïve.md", 7, 3));
        root.directories.push(sub);

        let wire = root.to_wire();
        let parsed = Directory::from_wire(&wire).unwrap();
        assert_eq!(parsed, root);
    }

    #[test]
    fn from_wire_defaults_missing_fields() {
        let value = serde_json::json!({
            "name": "",
            "files": [{"name": "a.txt"}],
        });
        let tree = Directory::from_wire(&value).unwrap();
        let f = tree.find_file("a.txt").unwrap();
        assert_eq!(f.size(), 0);
        assert_eq!(f.last_write_time(), 0);
    }

    #[test]
    fn from_wire_missing_name_is_parse_error() {
        let value = serde_json::json!({"files": []});
        assert!(Directory::from_wire(&value).is_err());
    }

    #[test]
    fn directory_or_create_reuses_existing() {
        let mut root = Directory::root();
        {
            let d = root.directory_or_create("a");
            d.files.push(file(&d.path.clone(), "x.txt", 1, 1));
        }
        {
            let d = root.directory_or_create("a");
            assert_eq!(d.files.len(), 1);
        }
        assert_eq!(root.directories.len(), 1);
    }

    #[test]
    fn replace_insert_and_delete_file() {
        let mut root = Directory::root();
        root.replace_insert_file(FileEntry::new(Path::new(""), "a.txt", 1, 1));
        root.replace_insert_file(FileEntry::new(Path::new(""), "a.txt", 2, 2));
        assert_eq!(root.files.len(), 1);
        assert_eq!(root.find_file("a.txt").unwrap().size(), 2);

        root.delete_file("a.txt");
        assert!(root.find_file("a.txt").is_none());
        // Deleting again is a no-op.
        root.delete_file("a.txt");
    }
}
