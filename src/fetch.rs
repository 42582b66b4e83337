use crate::error::SoundtrackError;
use crate::model::config::DEFAULT_MAX_FETCH_BYTES;
use anyhow::{Result, bail};
use log::debug;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Retrieves the raw bytes behind a URL.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Fetches `http(s)://` URLs over the network and `file://` URLs or bare paths from disk.
#[derive(Debug, Clone)]
pub struct DefaultFetcher {
    max_bytes: u64,
}

impl Default for DefaultFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FETCH_BYTES)
    }
}

fn fetch_error(url: &str, reason: impl ToString) -> anyhow::Error {
    SoundtrackError::Fetch {
        url: url.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

impl DefaultFetcher {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    fn read_limited(&self, url: &str, reader: impl Read) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        reader
            .take(self.max_bytes.saturating_add(1))
            .read_to_end(&mut bytes)
            .map_err(|e| fetch_error(url, e))?;

        if bytes.len() as u64 > self.max_bytes {
            return Err(fetch_error(
                url,
                format!("payload exceeds {} bytes", self.max_bytes),
            ));
        }

        debug!("Fetched {} bytes from '{}'", bytes.len(), url);
        Ok(bytes)
    }

    fn fetch_file(&self, url: &str, path: &Path) -> Result<Vec<u8>> {
        let file = File::open(path).map_err(|e| fetch_error(url, e))?;
        self.read_limited(url, file)
    }

    #[cfg(feature = "http")]
    fn fetch_http(&self, url: &str) -> Result<Vec<u8>> {
        let response = ureq::get(url).call().map_err(|e| fetch_error(url, e))?;
        self.read_limited(url, response.into_reader())
    }

    #[cfg(not(feature = "http"))]
    fn fetch_http(&self, url: &str) -> Result<Vec<u8>> {
        Err(fetch_error(url, "built without the `http` feature"))
    }
}

impl Fetcher for DefaultFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let url = url.trim();
        if url.is_empty() {
            bail!(SoundtrackError::Fetch {
                url: String::new(),
                reason: String::from("empty URL"),
            });
        }

        let lower = url.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return self.fetch_http(url);
        }

        let path = if lower.starts_with("file://") {
            &url["file://".len()..]
        } else {
            url
        };
        self.fetch_file(url, Path::new(path))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::path::PathBuf;

    fn temp_file(name: &str, contents: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "midi_soundtrack_{}_{}",
            std::process::id(),
            name
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn is_fetch_error(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<SoundtrackError>(),
            Some(SoundtrackError::Fetch { .. })
        )
    }

    #[test]
    fn reads_plain_paths_and_file_urls() {
        let path = temp_file("plain.mid", b"MThd");
        let fetcher = DefaultFetcher::default();

        assert_eq!(fetcher.fetch(path.to_str().unwrap()).unwrap(), b"MThd");
        let url = format!("file://{}", path.display());
        assert_eq!(fetcher.fetch(&url).unwrap(), b"MThd");
        let url = format!("FILE://{}", path.display());
        assert_eq!(fetcher.fetch(&url).unwrap(), b"MThd");

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn missing_file_is_a_fetch_error() {
        let err = DefaultFetcher::default()
            .fetch("/definitely/not/here.mid")
            .unwrap_err();
        assert!(is_fetch_error(&err));
    }

    #[test]
    fn empty_url_is_a_fetch_error() {
        let err = DefaultFetcher::default().fetch("   ").unwrap_err();
        assert!(is_fetch_error(&err));
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let path = temp_file("big.mid", &[0u8; 64]);

        let err = DefaultFetcher::new(16)
            .fetch(path.to_str().unwrap())
            .unwrap_err();
        assert!(is_fetch_error(&err));
        assert!(DefaultFetcher::new(64).fetch(path.to_str().unwrap()).is_ok());

        std::fs::remove_file(path).unwrap();
    }
}
