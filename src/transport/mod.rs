//! Remote repository transport (spec §6.1).
//!
//! [`Remote`] is the seam between the sync driver and whatever speaks to
//! the server; [`http::HttpRemote`] is the only implementation, but
//! keeping it behind a trait lets tests substitute a fake.

pub mod http;
pub mod url;

use std::io::Write;
use std::path::Path;

use crate::core::error::Result;
use crate::core::tree::Tree;

/// Size of one upload chunk (spec §6.3): 20 MiB.
pub const UPLOAD_PACKET_SIZE: u64 = 20 * 1024 * 1024;

/// Outcome of one `upload_part` call.
pub enum UploadProgress {
    /// Server accepted the chunk and issued a token to thread through the
    /// rest of the upload.
    ContinueWithToken(String),
    /// Server accepted an intermediate chunk of an already-tokened upload.
    Continue,
    /// Upload complete.
    Finished,
}

/// Everything the sync driver needs from the far end of a repository.
pub trait Remote {
    /// Authenticate and return `(token, expiration_epoch_ms)`.
    fn login(&self, username: &str, password: &str) -> Result<(String, i64)>;

    /// Fetch the full remote tree under `directory` (empty for repo root).
    fn tree(&self, auth_token: &str, repository: &str, directory: &str) -> Result<Tree>;

    /// Download `remote_path` into `writer`, returning its remote mtime
    /// in epoch milliseconds.
    fn fetch_file(
        &self,
        auth_token: &str,
        repository: &str,
        remote_path: &Path,
        writer: &mut dyn Write,
    ) -> Result<i64>;

    /// Upload one packet of a file. `content_token` is `None` for the
    /// first packet of a multi-packet upload.
    fn upload_part(
        &self,
        auth_token: &str,
        repository: &str,
        upload: &UploadRequest,
        content_token: Option<&str>,
        chunk: &[u8],
    ) -> Result<UploadProgress>;

    fn delete_file(&self, auth_token: &str, repository: &str, remote_path: &Path) -> Result<()>;

    /// Server wall-clock time in epoch milliseconds (spec §4.6 clock-skew check).
    fn time_epoch(&self) -> Result<i64>;
}

/// Metadata describing the file being uploaded, sent as headers on the
/// first packet only.
pub struct UploadRequest {
    pub name: String,
    pub total_size: u64,
    pub mime_type: String,
    pub parent_path: String,
    pub last_write_time: i64,
}
