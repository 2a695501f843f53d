//! Minimal parser for the `fileshare remote set` URL grammar (spec §6.4).
//!
//! `[https://]domain[/path][?key=value&key=value...]`. Grounded on the
//! original `Url` class; reimplemented on top of the `url` crate's query
//! parsing rather than hand-rolling the `&`/`=` split, since this corpus
//! reaches for `url` wherever URL grammar shows up.

use std::collections::HashMap;

use crate::core::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryUrl {
    pub https: bool,
    pub domain: String,
    pub options: HashMap<String, String>,
}

impl RepositoryUrl {
    pub fn parse(raw: &str) -> Result<Self> {
        let (https, rest) = if let Some(stripped) = raw.strip_prefix("https://") {
            (true, stripped)
        } else if let Some(stripped) = raw.strip_prefix("http://") {
            (false, stripped)
        } else {
            (true, raw)
        };

        let full = format!("{}://{}", if https { "https" } else { "http" }, rest);
        let parsed = url::Url::parse(&full).map_err(|e| Error::Parse(format!("invalid repository url: {e}")))?;

        let domain = parsed
            .host_str()
            .ok_or_else(|| Error::Parse("repository url is missing a domain".to_string()))?
            .to_string();
        let domain = match parsed.port() {
            Some(port) => format!("{domain}:{port}"),
            None => domain,
        };

        let mut options = HashMap::new();
        for (key, value) in parsed.query_pairs() {
            options.insert(key.into_owned(), value.into_owned());
        }

        Ok(RepositoryUrl {
            https,
            domain,
            options,
        })
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    pub fn scheme_domain(&self) -> String {
        format!("{}://{}", if self.https { "https" } else { "http" }, self.domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scheme_domain_and_options() {
        let url = RepositoryUrl::parse("https://fileshare.example.com/repos?repos=myrepo&directory=docs").unwrap();
        assert!(url.https);
        assert_eq!(url.domain, "fileshare.example.com");
        assert_eq!(url.option("repos"), Some("myrepo"));
        assert_eq!(url.option("directory"), Some("docs"));
    }

    #[test]
    fn defaults_to_https_without_scheme() {
        let url = RepositoryUrl::parse("fileshare.example.com/repos?repos=myrepo").unwrap();
        assert!(url.https);
        assert_eq!(url.scheme_domain(), "https://fileshare.example.com");
    }

    #[test]
    fn missing_option_is_none() {
        let url = RepositoryUrl::parse("https://fileshare.example.com/repos?repos=myrepo").unwrap();
        assert_eq!(url.option("directory"), None);
    }
}
