//! Rules downloader (§4.6): conditional GET against a remote rules archive,
//! cached by `base64(url)` in the Named Collection Store.
//!
//! The HTTP client and the archive reader are trait seams so tests can swap
//! in canned transports without touching the network or the filesystem; the
//! default implementations use `reqwest` (rustls backend) and `zip`.

use std::io::Read;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hub_store::NamedCollectionStore;

use crate::rule::{parse_rule_document, Rule, RuleParseError};

const CACHE_COLLECTION: &str = "rulesCache";
const RULES_ENTRY_NAME: &str = "rules.json";

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("network error fetching rules: {0}")]
    Network(String),
    #[error("failed to unzip rules archive: {0}")]
    Unzip(String),
    #[error(transparent)]
    Parse(#[from] RuleParseError),
}

/// What a conditional GET against a rules archive URL produced.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    NotModified,
    Fetched { body: Vec<u8>, etag: Option<String>, last_modified: Option<String> },
}

/// A conditional GET's preconditions, built from the previous response's
/// validators.
#[derive(Debug, Clone, Copy, Default)]
pub struct Validators<'a> {
    pub etag: Option<&'a str>,
    pub last_modified: Option<&'a str>,
}

#[async_trait]
pub trait RulesTransport: Send + Sync {
    async fn fetch(&self, url: &str, validators: Validators<'_>) -> Result<FetchOutcome, DownloadError>;
}

/// Unpacks a rules archive into the raw bytes of its `rules.json` entry.
pub trait ArchiveReader: Send + Sync {
    fn extract_rules_json(&self, archive_bytes: &[u8]) -> Result<Vec<u8>, DownloadError>;
}

/// Default transport: a plain `reqwest::Client` doing an `If-None-Match` /
/// `If-Modified-Since` conditional GET.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    #[must_use]
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RulesTransport for ReqwestTransport {
    async fn fetch(&self, url: &str, validators: Validators<'_>) -> Result<FetchOutcome, DownloadError> {
        let mut request = self.client.get(url);
        if let Some(etag) = validators.etag {
            request = request.header(reqwest::header::IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = validators.last_modified {
            request = request.header(reqwest::header::IF_MODIFIED_SINCE, last_modified);
        }

        let response = request.send().await.map_err(|err| DownloadError::Network(err.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_MODIFIED {
            return Ok(FetchOutcome::NotModified);
        }

        let response = response
            .error_for_status()
            .map_err(|err| DownloadError::Network(err.to_string()))?;
        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let last_modified = response
            .headers()
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(|err| DownloadError::Network(err.to_string()))?;
        Ok(FetchOutcome::Fetched { body: body.to_vec(), etag, last_modified })
    }
}

/// Default archive reader: a deflate-only `.zip` containing a top-level
/// `rules.json`.
pub struct ZipArchiveReader;

impl ArchiveReader for ZipArchiveReader {
    fn extract_rules_json(&self, archive_bytes: &[u8]) -> Result<Vec<u8>, DownloadError> {
        let cursor = std::io::Cursor::new(archive_bytes);
        let mut archive =
            zip::ZipArchive::new(cursor).map_err(|err| DownloadError::Unzip(err.to_string()))?;
        let mut file = archive
            .by_name(RULES_ENTRY_NAME)
            .map_err(|err| DownloadError::Unzip(err.to_string()))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).map_err(|err| DownloadError::Unzip(err.to_string()))?;
        Ok(buf)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    etag: Option<String>,
    last_modified: Option<String>,
    rules_json: Vec<u8>,
}

/// Downloads, caches, and re-parses remote rule archives.
pub struct RulesDownloader<T: RulesTransport, A: ArchiveReader> {
    transport: T,
    archive: A,
    cache: Arc<NamedCollectionStore>,
}

impl<T: RulesTransport, A: ArchiveReader> RulesDownloader<T, A> {
    #[must_use]
    pub fn new(transport: T, archive: A, cache: Arc<NamedCollectionStore>) -> Self {
        Self { transport, archive, cache }
    }

    fn cache_key(url: &str) -> String {
        BASE64.encode(url)
    }

    fn read_cache(&self, url: &str) -> Option<CacheEntry> {
        let bytes = self.cache.get(CACHE_COLLECTION, &Self::cache_key(url)).ok().flatten()?;
        serde_json::from_slice(&bytes).ok()
    }

    fn write_cache(&self, url: &str, entry: &CacheEntry) {
        match serde_json::to_vec(entry) {
            Ok(bytes) => {
                if let Err(err) = self.cache.put(CACHE_COLLECTION, &Self::cache_key(url), &bytes) {
                    tracing::error!(%err, "failed to persist rules cache entry");
                }
            }
            Err(err) => tracing::error!(%err, "failed to serialize rules cache entry"),
        }
    }

    /// Fetches `url`, handling `304`/`200`/network-error/unzip-failure per
    /// §4.6. Network and parse failures leave the cache untouched and return
    /// `None`; the caller decides whether to retry.
    pub async fn load_remote_rules(&self, url: &str) -> Option<Vec<Rule>> {
        let cached = self.read_cache(url);
        let validators = Validators {
            etag: cached.as_ref().and_then(|entry| entry.etag.as_deref()),
            last_modified: cached.as_ref().and_then(|entry| entry.last_modified.as_deref()),
        };

        match self.transport.fetch(url, validators).await {
            Ok(FetchOutcome::NotModified) => {
                let entry = cached?;
                match parse_rule_document(&entry.rules_json) {
                    Ok(rules) => Some(rules),
                    Err(err) => {
                        tracing::warn!(%err, "cached rules failed to parse after 304");
                        None
                    }
                }
            }
            Ok(FetchOutcome::Fetched { body, etag, last_modified }) => {
                match self.archive.extract_rules_json(&body) {
                    Ok(rules_json) => match parse_rule_document(&rules_json) {
                        Ok(rules) => {
                            self.write_cache(url, &CacheEntry { etag, last_modified, rules_json });
                            Some(rules)
                        }
                        Err(err) => {
                            tracing::warn!(%err, "downloaded rules failed to parse, cache untouched");
                            None
                        }
                    },
                    Err(err) => {
                        tracing::warn!(%err, "rules archive failed to unzip, cache untouched");
                        None
                    }
                }
            }
            Err(err) => {
                tracing::warn!(%err, "rules download failed, cache untouched");
                None
            }
        }
    }

    /// Reads whatever was last cached for `url` without touching the
    /// network, for startup before the first successful download completes.
    #[must_use]
    pub fn load_cached_rules(&self, url: &str) -> Option<Vec<Rule>> {
        let entry = self.read_cache(url)?;
        parse_rule_document(&entry.rules_json).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedTransport {
        responses: Mutex<Vec<Result<FetchOutcome, String>>>,
        seen_validators: Mutex<Vec<(Option<String>, Option<String>)>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<FetchOutcome, String>>) -> Self {
            Self { responses: Mutex::new(responses), seen_validators: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl RulesTransport for ScriptedTransport {
        async fn fetch(&self, _url: &str, validators: Validators<'_>) -> Result<FetchOutcome, DownloadError> {
            self.seen_validators
                .lock()
                .unwrap()
                .push((validators.etag.map(str::to_string), validators.last_modified.map(str::to_string)));
            let mut responses = self.responses.lock().unwrap();
            match responses.remove(0) {
                Ok(outcome) => Ok(outcome),
                Err(msg) => Err(DownloadError::Network(msg)),
            }
        }
    }

    struct PassthroughArchive;
    impl ArchiveReader for PassthroughArchive {
        fn extract_rules_json(&self, archive_bytes: &[u8]) -> Result<Vec<u8>, DownloadError> {
            Ok(archive_bytes.to_vec())
        }
    }

    struct FailingArchive;
    impl ArchiveReader for FailingArchive {
        fn extract_rules_json(&self, _archive_bytes: &[u8]) -> Result<Vec<u8>, DownloadError> {
            Err(DownloadError::Unzip("bad central directory".to_string()))
        }
    }

    fn empty_rule_doc() -> Vec<u8> {
        br#"{"version":1,"rules":[]}"#.to_vec()
    }

    #[tokio::test]
    async fn fetched_rules_are_cached_and_parsed() {
        let transport = ScriptedTransport::new(vec![Ok(FetchOutcome::Fetched {
            body: empty_rule_doc(),
            etag: Some("v1".to_string()),
            last_modified: Some("Tue, 15 Nov 1994 12:45:26 GMT".to_string()),
        })]);
        let cache = Arc::new(NamedCollectionStore::open_in_memory().unwrap());
        let downloader = RulesDownloader::new(transport, PassthroughArchive, cache.clone());

        let rules = downloader.load_remote_rules("https://example.com/rules.zip").await;
        assert!(rules.is_some());
        assert!(cache.get(CACHE_COLLECTION, &RulesDownloader::<ScriptedTransport, PassthroughArchive>::cache_key("https://example.com/rules.zip")).unwrap().is_some());
    }

    #[tokio::test]
    async fn not_modified_falls_back_to_cache() {
        let cache = Arc::new(NamedCollectionStore::open_in_memory().unwrap());
        let key = BASE64.encode("https://example.com/rules.zip");
        let entry = CacheEntry {
            etag: Some("v1".to_string()),
            last_modified: Some("Tue, 15 Nov 1994 12:45:26 GMT".to_string()),
            rules_json: empty_rule_doc(),
        };
        cache.put(CACHE_COLLECTION, &key, &serde_json::to_vec(&entry).unwrap()).unwrap();

        let transport = ScriptedTransport::new(vec![Ok(FetchOutcome::NotModified)]);
        let downloader = RulesDownloader::new(transport, PassthroughArchive, cache);
        let rules = downloader.load_remote_rules("https://example.com/rules.zip").await;
        assert!(rules.is_some());
    }

    #[tokio::test]
    async fn network_error_leaves_cache_untouched_and_returns_none() {
        let cache = Arc::new(NamedCollectionStore::open_in_memory().unwrap());
        let transport = ScriptedTransport::new(vec![Err("connection refused".to_string())]);
        let downloader = RulesDownloader::new(transport, PassthroughArchive, cache.clone());
        let rules = downloader.load_remote_rules("https://example.com/rules.zip").await;
        assert!(rules.is_none());
        assert!(cache.keys(CACHE_COLLECTION).unwrap().is_empty());
    }

    #[tokio::test]
    async fn unzip_failure_returns_none_without_caching() {
        let transport = ScriptedTransport::new(vec![Ok(FetchOutcome::Fetched {
            body: vec![1, 2, 3],
            etag: None,
            last_modified: None,
        })]);
        let cache = Arc::new(NamedCollectionStore::open_in_memory().unwrap());
        let downloader = RulesDownloader::new(transport, FailingArchive, cache.clone());
        let rules = downloader.load_remote_rules("https://example.com/rules.zip").await;
        assert!(rules.is_none());
        assert!(cache.keys(CACHE_COLLECTION).unwrap().is_empty());
    }

    #[tokio::test]
    async fn cached_last_modified_is_sent_as_if_modified_since_without_an_etag() {
        let cache = Arc::new(NamedCollectionStore::open_in_memory().unwrap());
        let key = BASE64.encode("https://example.com/rules.zip");
        let entry = CacheEntry {
            etag: None,
            last_modified: Some("Tue, 15 Nov 1994 12:45:26 GMT".to_string()),
            rules_json: empty_rule_doc(),
        };
        cache.put(CACHE_COLLECTION, &key, &serde_json::to_vec(&entry).unwrap()).unwrap();

        let transport = ScriptedTransport::new(vec![Ok(FetchOutcome::NotModified)]);
        let downloader = RulesDownloader::new(transport, PassthroughArchive, cache);
        downloader.load_remote_rules("https://example.com/rules.zip").await;

        let seen = downloader.transport.seen_validators.lock().unwrap();
        assert_eq!(seen[0], (None, Some("Tue, 15 Nov 1994 12:45:26 GMT".to_string())));
    }
}
