//! Repository configuration and remote-facing workflows (spec §4.6, §6.2).
//!
//! Grounded on the original `RepositoryConfig`: a `.fileshare/` marker
//! directory holding `config.fileshare`, loaded eagerly and saved via a
//! write-to-`tmp.fileshare`-then-rename protocol so a crash mid-write
//! never corrupts the previous config.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::error::{Error, Result};
use super::interrupt;
use super::percent;
use super::tree::{Directory, FileEntry, Tree};
use super::{baseline, diff as diff_mod};
use crate::transport::url::RepositoryUrl;
use crate::transport::{Remote, UploadProgress, UploadRequest, UPLOAD_PACKET_SIZE};

const MARKER_DIR: &str = ".fileshare";
const CONFIG_FILE: &str = "config.fileshare";
const TMP_FILE: &str = "tmp.fileshare";

/// The maximum tolerated drift between local and server clocks before
/// a sync operation refuses to run (spec §4.6).
const MAX_CLOCK_SKEW_MS: i64 = 1000;

pub struct RepositoryConfig {
    repo_root: PathBuf,
    config_dir: PathBuf,
    remote_domain: String,
    remote_repository: String,
    remote_directory: String,
    auth_token: String,
    auth_token_exp: i64,
    editor: String,
    saved_state: Tree,
}

impl RepositoryConfig {
    /// Load an existing repository rooted at `repo_root`, or create a
    /// fresh marker directory and return a blank config if none exists.
    pub fn open(repo_root: &Path) -> Result<Self> {
        let repo_root = fs::canonicalize(repo_root).map_err(|e| Error::io(repo_root, e))?;
        let config_dir = repo_root.join(MARKER_DIR);

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).map_err(|e| Error::io(&config_dir, e))?;
        }

        let tmp_path = config_dir.join(TMP_FILE);
        if tmp_path.exists() {
            fs::remove_file(&tmp_path).map_err(|e| Error::io(&tmp_path, e))?;
        }

        let config_path = config_dir.join(CONFIG_FILE);
        let mut config = RepositoryConfig {
            repo_root,
            config_dir,
            remote_domain: String::new(),
            remote_repository: String::new(),
            remote_directory: String::new(),
            auth_token: String::new(),
            auth_token_exp: 0,
            editor: String::new(),
            saved_state: Directory::root(),
        };

        if !config_path.exists() {
            return Ok(config);
        }

        let raw = fs::read_to_string(&config_path).map_err(|e| Error::io(&config_path, e))?;
        let data: Value =
            serde_json::from_str(&raw).map_err(|e| Error::Parse(format!("malformed config: {e}")))?;

        if let Some(saved) = data.get("saved_state") {
            config.saved_state = Directory::from_wire(saved)?;
        }
        if let Some(v) = data.get("remote_domain").and_then(Value::as_str) {
            config.remote_domain = v.to_string();
        }
        if let Some(v) = data.get("remote_repository").and_then(Value::as_str) {
            config.remote_repository = percent::decode(v).map_err(Error::Parse)?;
        }
        if let Some(v) = data.get("remote_directory").and_then(Value::as_str) {
            config.remote_directory = percent::decode(v).map_err(Error::Parse)?;
        }
        if let Some(v) = data.get("auth_token").and_then(Value::as_str) {
            config.auth_token = v.to_string();
        }
        if let Some(v) = data.get("auth_token_exp").and_then(Value::as_i64) {
            config.auth_token_exp = v;
        }
        if let Some(v) = data.get("editor").and_then(Value::as_str) {
            config.editor = percent::decode(v).map_err(Error::Parse)?;
        }

        Ok(config)
    }

    /// Walk up from `start` looking for a `.fileshare` marker directory.
    pub fn search_repos_root(start: &Path) -> Result<Option<PathBuf>> {
        let mut current = fs::canonicalize(start).map_err(|e| Error::io(start, e))?;
        loop {
            if current.join(MARKER_DIR).is_dir() {
                return Ok(Some(current));
            }
            match current.parent() {
                Some(parent) if parent != current => current = parent.to_path_buf(),
                _ => return Ok(None),
            }
        }
    }

    pub fn search_repos_root_or_error(start: &Path) -> Result<PathBuf> {
        Self::search_repos_root(start)?
            .ok_or_else(|| Error::NotFound("not a fileshare repository".to_string()))
    }

    /// Persist the config via write-tmp-then-rename.
    pub fn save(&self) -> Result<()> {
        let json = serde_json::json!({
            "remote_domain": self.remote_domain,
            "remote_repository": percent::encode(&self.remote_repository),
            "remote_directory": percent::encode(&self.remote_directory),
            "auth_token": self.auth_token,
            "auth_token_exp": self.auth_token_exp,
            "editor": percent::encode(&self.editor),
            "saved_state": self.saved_state.to_wire(),
        });

        let tmp_path = self.config_dir.join(TMP_FILE);
        if tmp_path.exists() {
            fs::remove_file(&tmp_path).map_err(|e| Error::io(&tmp_path, e))?;
        }

        let mut tmp_file = fs::File::create(&tmp_path).map_err(|e| Error::io(&tmp_path, e))?;
        tmp_file
            .write_all(serde_json::to_string_pretty(&json).unwrap().as_bytes())
            .map_err(|e| Error::io(&tmp_path, e))?;
        tmp_file.sync_all().map_err(|e| Error::io(&tmp_path, e))?;
        drop(tmp_file);

        let config_path = self.config_dir.join(CONFIG_FILE);
        fs::rename(&tmp_path, &config_path).map_err(|e| Error::io(&config_path, e))?;
        Ok(())
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn saved_state(&self) -> &Tree {
        &self.saved_state
    }

    pub fn is_connected(&self) -> bool {
        !self.auth_token.is_empty()
    }

    pub fn remote_domain(&self) -> &str {
        &self.remote_domain
    }

    pub fn editor(&self) -> Option<&str> {
        if self.editor.is_empty() {
            None
        } else {
            Some(&self.editor)
        }
    }

    pub fn set_editor(&mut self, editor: impl Into<String>) {
        self.editor = editor.into();
    }

    /// Parse and apply a repository URL (`fileshare remote set <url>`),
    /// resetting auth and the saved baseline since the remote identity
    /// has changed.
    pub fn set_remote_url(&mut self, raw: &str) -> Result<()> {
        let url = RepositoryUrl::parse(raw)?;
        self.remote_domain = url.scheme_domain();
        self.remote_repository = url.option("repos").unwrap_or("").to_string();
        self.remote_directory = url.option("directory").unwrap_or("").to_string();
        self.auth_token.clear();
        self.auth_token_exp = 0;
        self.saved_state = Directory::root();
        Ok(())
    }

    pub fn remote_url(&self) -> Result<String> {
        if self.remote_repository.is_empty() {
            return Err(Error::NotFound("remote repository has not been set".to_string()));
        }
        let mut url = format!(
            "{}/repos?repos={}",
            self.remote_domain,
            percent::encode(&self.remote_repository)
        );
        if !self.remote_directory.is_empty() {
            url.push_str(&format!("&directory={}", percent::encode(&self.remote_directory)));
        }
        Ok(url)
    }

    pub fn logout(&mut self) {
        self.auth_token.clear();
        self.auth_token_exp = 0;
    }

    pub fn connect(&mut self, remote: &dyn Remote, username: &str, password: &str) -> Result<()> {
        let (token, exp) = remote.login(username, password)?;
        self.auth_token = token;
        self.auth_token_exp = exp;
        Ok(())
    }

    /// Refuse to proceed if the local and server clocks disagree by more
    /// than [`MAX_CLOCK_SKEW_MS`] (spec §4.6).
    pub fn check_clock_sync(&self, remote: &dyn Remote) -> Result<()> {
        let server_ms = remote.time_epoch()?;
        let local_ms = now_epoch_ms();
        let offset = local_ms - server_ms;
        if offset.abs() >= MAX_CLOCK_SKEW_MS {
            return Err(Error::ClockSkew { offset_ms: offset });
        }
        Ok(())
    }

    pub fn fetch_remote_tree(&self, remote: &dyn Remote) -> Result<Tree> {
        self.check_clock_sync(remote)?;
        remote.tree(&self.auth_token, &self.remote_repository, &self.remote_directory)
    }

    pub fn local_tree(&self) -> Result<Tree> {
        Directory::from_filesystem(&self.repo_root)
    }

    /// Synthesize the initial baseline from the current local and
    /// remote trees (spec §4.2, used by `fileshare init`/`clone`).
    pub fn init_saved_state(&mut self, local: &Directory, remote_tree: &Directory) {
        self.saved_state = baseline::init_saved_state(local, remote_tree);
    }

    pub fn update_saved_state(&mut self, file: &FileEntry) {
        baseline::upsert(&mut self.saved_state, file);
    }

    pub fn remove_saved_state(&mut self, file: &FileEntry) {
        baseline::erase(&mut self.saved_state, file);
    }

    fn local_path(&self, relative: &Path) -> PathBuf {
        self.repo_root.join(relative)
    }

    /// Download `file` from the remote, replacing the local copy.
    /// Moves any existing local file aside as `<name>.fileshare_outdated`
    /// first and restores it if the download fails partway through.
    pub fn download_replace_file(&mut self, remote: &dyn Remote, file: &FileEntry) -> Result<()> {
        self.check_clock_sync(remote)?;
        let path = self.local_path(file.path());

        let mut moved_aside: Option<PathBuf> = None;
        if path.exists() {
            let outdated = outdated_path(&path);
            fs::rename(&path, &outdated).map_err(|e| Error::io(&path, e))?;
            moved_aside = Some(outdated);
        } else if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
            }
        }

        let outcome = (|| -> Result<i64> {
            let mut out = fs::File::create(&path).map_err(|e| Error::io(&path, e))?;
            let timestamp =
                remote.fetch_file(&self.auth_token, &self.remote_repository, file.path(), &mut out)?;
            out.sync_all().map_err(|e| Error::io(&path, e))?;
            Ok(timestamp)
        })();

        match outcome {
            Ok(timestamp) => {
                let fetched = FileEntry::new(
                    file.path().parent().unwrap_or(Path::new("")),
                    file.name(),
                    file.size(),
                    timestamp,
                );
                self.update_saved_state(&fetched);
                if let Some(outdated) = moved_aside {
                    let _ = fs::remove_file(&outdated);
                }
                Ok(())
            }
            Err(e) => {
                if path.exists() {
                    let _ = fs::remove_file(&path);
                }
                if let Some(outdated) = moved_aside {
                    let _ = fs::rename(&outdated, &path);
                }
                Err(e)
            }
        }
    }

    /// Upload `file` to the remote in [`UPLOAD_PACKET_SIZE`] chunks,
    /// threading the server's `content-token` through the whole transfer.
    pub fn upload_file(&mut self, remote: &dyn Remote, file: &FileEntry) -> Result<()> {
        self.check_clock_sync(remote)?;
        let path = self.local_path(file.path());
        if !path.exists() {
            return Err(Error::NotFound(format!(
                "the uploaded file does not exist: {}",
                path.display()
            )));
        }

        let total_size = file.size();
        let mime_type = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        let request = UploadRequest {
            name: file.name().to_string(),
            total_size,
            mime_type,
            parent_path: file
                .path()
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            last_write_time: file.last_write_time(),
        };

        let mut reader = fs::File::open(&path).map_err(|e| Error::io(&path, e))?;
        let mut content_token: Option<String> = None;
        let mut uploaded: u64 = 0;

        loop {
            interrupt::check()?;
            let remaining = total_size - uploaded;
            let packet_size = remaining.min(UPLOAD_PACKET_SIZE);

            let mut chunk = vec![0u8; packet_size as usize];
            std::io::Read::read_exact(&mut reader, &mut chunk).map_err(|e| Error::io(&path, e))?;

            let progress = remote.upload_part(
                &self.auth_token,
                &self.remote_repository,
                &request,
                content_token.as_deref(),
                &chunk,
            )?;

            match progress {
                UploadProgress::ContinueWithToken(token) => {
                    content_token = Some(token);
                    uploaded += packet_size;
                }
                UploadProgress::Continue => {
                    uploaded += packet_size;
                }
                UploadProgress::Finished => {
                    self.update_saved_state(file);
                    return Ok(());
                }
            }
        }
    }

    pub fn send_delete_file(&mut self, remote: &dyn Remote, file: &FileEntry) -> Result<()> {
        remote.delete_file(&self.auth_token, &self.remote_repository, file.path())?;
        self.remove_saved_state(file);
        Ok(())
    }

    /// Delete a locally-confirmed-removed file and drop it from the
    /// baseline without talking to the remote.
    pub fn receive_delete_file(&mut self, file: &FileEntry) -> Result<()> {
        let path = self.local_path(file.path());
        if path.exists() {
            fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
        }
        self.remove_saved_state(file);
        Ok(())
    }

    pub fn diff_against_remote(&self, remote: &dyn Remote) -> Result<diff_mod::DiffResult> {
        let local = self.local_tree()?;
        let remote_tree = self.fetch_remote_tree(remote)?;
        diff_mod::diff(&local, &self.saved_state, &remote_tree)
    }
}

fn outdated_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".fileshare_outdated");
    path.with_file_name(name)
}

fn now_epoch_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn search_repos_root_finds_marker_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        fs::create_dir_all(dir.path().join(MARKER_DIR)).unwrap();

        let found = RepositoryConfig::search_repos_root(&nested).unwrap();
        assert_eq!(found.unwrap(), fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn search_repos_root_returns_none_outside_any_repo() {
        let dir = tempfile::tempdir().unwrap();
        let found = RepositoryConfig::search_repos_root(dir.path()).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn open_creates_marker_directory_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let config = RepositoryConfig::open(dir.path()).unwrap();
        assert!(dir.path().join(MARKER_DIR).is_dir());
        assert!(!config.is_connected());
    }

    #[test]
    fn save_then_open_round_trips_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RepositoryConfig::open(dir.path()).unwrap();
        config.set_remote_url("https://example.com/repos?repos=myrepo").unwrap();
        config.save().unwrap();

        let reloaded = RepositoryConfig::open(dir.path()).unwrap();
        assert_eq!(reloaded.remote_url().unwrap(), config.remote_url().unwrap());
    }

    #[test]
    fn stale_tmp_file_is_cleared_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let config_dir = dir.path().join(MARKER_DIR);
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join(TMP_FILE), b"stale").unwrap();

        RepositoryConfig::open(dir.path()).unwrap();
        assert!(!config_dir.join(TMP_FILE).exists());
    }

    #[test]
    fn outdated_path_appends_suffix() {
        let p = Path::new("a/b/file.txt");
        assert_eq!(outdated_path(p), PathBuf::from("a/b/file.txt.fileshare_outdated"));
    }
}
