//! `reqwest`-backed [`Remote`] implementation (spec §6.1, §6.3).
//!
//! Grounded on the original `Http` wrapper: auth token goes in a bearer
//! header, the first packet of an upload carries `content-*` metadata
//! headers and later packets carry only `content-token`, and response
//! status codes 200/201/202 are the only ones with defined meaning.

use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde_json::Value;

use crate::core::error::{Error, Result};
use crate::core::percent;
use crate::core::tree::Tree;

use super::{Remote, UploadProgress, UploadRequest};

pub struct HttpRemote {
    base_url: String,
    client: Client,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(HttpRemote {
            base_url: base_url.into(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_auth(&self, builder: reqwest::blocking::RequestBuilder, auth_token: &str) -> reqwest::blocking::RequestBuilder {
        if auth_token.is_empty() {
            builder
        } else {
            builder.bearer_auth(auth_token)
        }
    }

    fn fetch_json(&self, url: &str, auth_token: &str) -> Result<Value> {
        let response = self
            .with_auth(self.client.get(url), auth_token)
            .send()
            .map_err(|e| Error::Transport(e.to_string()))?;
        status_to_error(response.status())?;
        response
            .json::<Value>()
            .map_err(|e| Error::Parse(format!("invalid json response: {e}")))
    }
}

fn status_to_error(status: StatusCode) -> Result<()> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::UNAUTHORIZED => Err(Error::WrongCredentials),
        StatusCode::FORBIDDEN => Err(Error::AccessDenied),
        StatusCode::NOT_FOUND => Err(Error::NotFound("remote resource not found".to_string())),
        s => Err(Error::Transport(format!("unexpected status {s}"))),
    }
}

impl Remote for HttpRemote {
    fn login(&self, username: &str, password: &str) -> Result<(String, i64)> {
        let payload = serde_json::json!({
            "username": percent::encode(username),
            "password": percent::encode(password),
        });

        let response = self
            .client
            .post(self.endpoint("/auth/gen-token"))
            .json(&payload)
            .send()
            .map_err(|e| Error::Transport(e.to_string()))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(Error::WrongCredentials);
        }
        status_to_error(response.status())?;

        let json: Value = response
            .json()
            .map_err(|e| Error::Parse(format!("invalid login response: {e}")))?;
        let token = json
            .get("token")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Parse("missing token in login response".to_string()))?
            .to_string();
        let expiration = json
            .get("expiration_date")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::Parse("missing expiration_date in login response".to_string()))?;

        if token.is_empty() {
            return Err(Error::WrongCredentials);
        }
        Ok((token, expiration))
    }

    fn tree(&self, auth_token: &str, repository: &str, directory: &str) -> Result<Tree> {
        let mut url = format!(
            "{}/repos/tree?repos={}",
            self.base_url,
            percent::encode(repository)
        );
        if !directory.is_empty() {
            url.push_str(&format!("&directory={}", percent::encode(directory)));
        }
        let json = self.fetch_json(&url, auth_token)?;
        Tree::from_wire(&json)
    }

    fn fetch_file(
        &self,
        auth_token: &str,
        repository: &str,
        remote_path: &Path,
        writer: &mut dyn Write,
    ) -> Result<i64> {
        let url = format!(
            "{}/repos/file?path={}&repos={}",
            self.base_url,
            percent::encode(&remote_path.to_string_lossy()),
            percent::encode(repository)
        );
        let mut response = self
            .with_auth(self.client.get(&url), auth_token)
            .send()
            .map_err(|e| Error::Transport(e.to_string()))?;
        status_to_error(response.status())?;

        let timestamp = response
            .headers()
            .get("content-timestamp")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);

        let mut buf = [0u8; 64 * 1024];
        loop {
            let read = response.read(&mut buf).map_err(|e| Error::Transport(e.to_string()))?;
            if read == 0 {
                break;
            }
            writer
                .write_all(&buf[..read])
                .map_err(|e| Error::io(remote_path, e))?;
        }
        Ok(timestamp)
    }

    fn upload_part(
        &self,
        auth_token: &str,
        repository: &str,
        upload: &UploadRequest,
        content_token: Option<&str>,
        chunk: &[u8],
    ) -> Result<UploadProgress> {
        let url = format!(
            "{}/repos/upload/file?repos={}",
            self.base_url,
            percent::encode(repository)
        );

        let mut builder = self.with_auth(self.client.post(&url), auth_token);
        builder = match content_token {
            Some(token) => builder.header("content-token", token),
            None => builder
                .header("content-name", percent::encode(&upload.name))
                .header("content-size", upload.total_size.to_string())
                .header("content-mimetype", upload.mime_type.clone())
                .header("content-path", percent::encode(&upload.parent_path))
                .header("content-description", "")
                .header("content-timestamp", upload.last_write_time.to_string()),
        };

        let response = builder
            .body(chunk.to_vec())
            .send()
            .map_err(|e| Error::Transport(e.to_string()))?;
        let status = response.status();
        let json: Value = response
            .json()
            .unwrap_or(Value::Null);

        match status.as_u16() {
            201 => {
                let token = json
                    .get("content-token")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        Error::Protocol(format!("missing content-token in response: {json}"))
                    })?;
                Ok(UploadProgress::ContinueWithToken(token.to_string()))
            }
            200 => Ok(UploadProgress::Continue),
            202 => {
                let finished = json.get("status").and_then(Value::as_str) == Some("Finished")
                    && json.get("file_id").is_some();
                if !finished {
                    return Err(Error::Protocol(format!(
                        "upload did not report completion: {json}"
                    )));
                }
                Ok(UploadProgress::Finished)
            }
            code => Err(Error::Transport(format!("unhandled upload response: {code}"))),
        }
    }

    fn delete_file(&self, auth_token: &str, repository: &str, remote_path: &Path) -> Result<()> {
        let url = format!(
            "{}/repos/delete-file?repos={}&path={}",
            self.base_url,
            percent::encode(repository),
            percent::encode(&remote_path.to_string_lossy())
        );
        let response = self
            .with_auth(self.client.post(&url), auth_token)
            .send()
            .map_err(|e| Error::Transport(e.to_string()))?;
        status_to_error(response.status())
    }

    fn time_epoch(&self) -> Result<i64> {
        let json = self.fetch_json(&self.endpoint("/time-epoch"), "")?;
        json.get("time_since_epoch")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::Parse("missing time_since_epoch in response".to_string()))
    }
}
