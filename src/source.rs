use crate::error::LoadError;
use std::fs;
use std::time::Duration;
use tracing::info;

/// Where a dataset lives: a local file or a remote http(s) endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Local(String),
    Remote(String),
}

impl Source {
    pub fn parse(location: &str) -> Self {
        let lower = location.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Source::Remote(location.to_string())
        } else {
            Source::Local(location.to_string())
        }
    }

    pub fn location(&self) -> &str {
        match self {
            Source::Local(path) | Source::Remote(path) => path,
        }
    }

    /// Lower-cased file extension of a local path, if any.
    pub fn extension(&self) -> Option<String> {
        match self {
            Source::Local(path) => std::path::Path::new(path)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_lowercase()),
            Source::Remote(_) => None,
        }
    }

    /// Reads the whole source. Remote sources are fetched once with no retry.
    pub fn fetch(&self, accept_invalid_certs: bool) -> Result<Vec<u8>, LoadError> {
        match self {
            Source::Local(path) => {
                info!("Reading {}", path);
                fs::read(path).map_err(|e| LoadError::unreachable(path.as_str(), e))
            }
            Source::Remote(url) => {
                info!("Fetching {}", url);
                let client = reqwest::blocking::Client::builder()
                    .danger_accept_invalid_certs(accept_invalid_certs)
                    .timeout(Duration::from_secs(120))
                    .build()
                    .map_err(|e| LoadError::unreachable(url.as_str(), e))?;
                let response = client
                    .get(url)
                    .send()
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| LoadError::unreachable(url.as_str(), e))?;
                let bytes = response
                    .bytes()
                    .map_err(|e| LoadError::unreachable(url.as_str(), e))?;
                Ok(bytes.to_vec())
            }
        }
    }
}
