use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use futures_util::StreamExt;
use log::Level;
use migrator_core::{source_id_for_url, UrlEntry};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::decode::decode_html;
use crate::persist::ContentStore;
use crate::progress::{complete, report, ProgressSink};
use crate::{FetchError, FetchFailureKind, RawDocument, Stage, StageSummary};

pub(crate) const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36";

/// Body fragments served by bot-protection interstitials instead of the page.
const CHALLENGE_MARKERS: &[&str] = &[
    "cf-browser-verification",
    "challenge-platform",
    "cf-chl-",
    "<title>just a moment...</title>",
    "attention required! | cloudflare",
    "g-recaptcha",
    "h-captcha",
    "captcha-delivery",
    "are you a robot",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub connect_timeout_ms: u64,
    /// Whole-request timeout for one attempt.
    pub timeout_ms: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Politeness pause between consecutive URLs.
    pub delay_between_ms: u64,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    pub user_agent: String,
    pub allowed_content_types: Vec<String>,
    /// Load documents already present in the raw store instead of refetching.
    pub reuse_cached: bool,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            timeout_ms: 30_000,
            max_retries: 3,
            backoff_base_ms: 1_000,
            backoff_max_ms: 30_000,
            delay_between_ms: 1_500,
            redirect_limit: 5,
            max_bytes: 10 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            allowed_content_types: vec![
                "text/html".to_string(),
                "application/xhtml+xml".to_string(),
            ],
            reuse_cached: false,
        }
    }
}

impl FetchSettings {
    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`, capped.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let millis = self
            .backoff_base_ms
            .saturating_mul(1u64 << exp)
            .min(self.backoff_max_ms);
        Duration::from_millis(millis)
    }
}

/// Markup of one page as delivered by a fetch backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub final_url: String,
    pub html: String,
    pub content_type: Option<String>,
}

/// Seam for the page retrieval backend.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// HTTP backend. One client for the whole run, so cookies set by the site
/// (consent, session, challenge clearance) carry over between pages.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    settings: FetchSettings,
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(settings.connect_timeout_ms))
            .timeout(Duration::from_millis(settings.timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(settings.redirect_limit))
            .user_agent(settings.user_agent.clone())
            .default_headers(headers)
            .cookie_store(true)
            .build()
            .map_err(|err| FetchError::new(FetchFailureKind::NavigationFailed, err.to_string()))?;

        Ok(Self { settings, client })
    }

    fn is_content_type_allowed(&self, content_type: &str) -> bool {
        let ct = content_type.split(';').next().unwrap_or(content_type).trim();
        self.settings
            .allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ct))
    }
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|err| FetchError::new(FetchFailureKind::NavigationFailed, err.to_string()))?;

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if is_block_status(status) {
            return Err(FetchError::new(
                FetchFailureKind::Blocked,
                format!("http status {status}"),
            ));
        }
        if !status.is_success() {
            return Err(FetchError::new(
                FetchFailureKind::NavigationFailed,
                format!("http status {status}"),
            ));
        }

        if let Some(content_len) = response.content_length() {
            if content_len > self.settings.max_bytes {
                return Err(FetchError::new(
                    FetchFailureKind::NavigationFailed,
                    format!(
                        "response too large (max {}, actual {content_len})",
                        self.settings.max_bytes
                    ),
                ));
            }
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        if let Some(ct) = content_type.as_deref() {
            if !self.is_content_type_allowed(ct) {
                return Err(FetchError::new(
                    FetchFailureKind::NavigationFailed,
                    format!("unsupported content type {ct}"),
                ));
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > self.settings.max_bytes {
                return Err(FetchError::new(
                    FetchFailureKind::NavigationFailed,
                    format!("response too large (max {})", self.settings.max_bytes),
                ));
            }
            bytes.extend_from_slice(&chunk);
        }

        let decoded = decode_html(&bytes, content_type.as_deref());
        if let Some(marker) = find_challenge_marker(&decoded.html) {
            return Err(FetchError::new(
                FetchFailureKind::Blocked,
                format!("challenge page detected ({marker})"),
            ));
        }

        Ok(FetchedPage {
            final_url,
            html: decoded.html,
            content_type,
        })
    }
}

fn is_block_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE
    )
}

/// Returns the first bot-challenge marker found in the page, if any.
pub fn find_challenge_marker(html: &str) -> Option<&'static str> {
    // Real articles can mention captchas; only inspect the head of the page.
    let mut end = html.len().min(16 * 1024);
    while end > 0 && !html.is_char_boundary(end) {
        end -= 1;
    }
    let head = html[..end].to_ascii_lowercase();
    CHALLENGE_MARKERS
        .iter()
        .copied()
        .find(|marker| head.contains(marker))
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FetchFailureKind::Timeout, err.to_string());
    }
    FetchError::new(FetchFailureKind::NavigationFailed, err.to_string())
}

/// Fetch one URL, retrying every failure kind with exponential backoff until
/// `max_retries` is exhausted.
pub async fn fetch_with_retry(
    fetcher: &dyn Fetcher,
    url: &str,
    settings: &FetchSettings,
    sink: &dyn ProgressSink,
) -> Result<FetchedPage, FetchError> {
    let mut attempt: u32 = 0;
    loop {
        match fetcher.fetch(url).await {
            Ok(page) => return Ok(page),
            Err(err) if attempt < settings.max_retries => {
                attempt += 1;
                let delay = settings.backoff_delay(attempt);
                report(
                    sink,
                    Level::Warn,
                    Stage::Fetch,
                    format!(
                        "{url}: {err}; retry {attempt}/{} in {}ms",
                        settings.max_retries,
                        delay.as_millis()
                    ),
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub url: String,
    pub error: FetchError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReport {
    pub documents: Vec<RawDocument>,
    pub failures: Vec<FetchFailure>,
    pub summary: StageSummary,
}

/// Fetch the URL list sequentially, one page at a time.
///
/// Failed URLs are recorded and the run moves on. Successful pages are written
/// to `store` when given.
pub async fn fetch_all(
    entries: &[UrlEntry],
    fetcher: &dyn Fetcher,
    settings: &FetchSettings,
    store: Option<&ContentStore>,
    sink: &dyn ProgressSink,
) -> FetchReport {
    let mut summary = StageSummary::new(Stage::Fetch);
    let mut documents = Vec::with_capacity(entries.len());
    let mut failures = Vec::new();
    let mut network_used = false;

    for (index, entry) in entries.iter().enumerate() {
        let Some(source_id) = source_id_for_url(&entry.url) else {
            report(sink, Level::Error, Stage::Fetch, format!("{}: not a valid URL", entry.url));
            failures.push(FetchFailure {
                url: entry.url.clone(),
                error: FetchError::new(FetchFailureKind::NavigationFailed, "invalid url"),
            });
            summary.failed += 1;
            continue;
        };

        if settings.reuse_cached {
            if let Some(doc) = load_cached(store, &source_id, sink) {
                documents.push(doc);
                summary.skipped += 1;
                continue;
            }
        }

        if network_used && settings.delay_between_ms > 0 {
            tokio::time::sleep(Duration::from_millis(settings.delay_between_ms)).await;
        }
        network_used = true;

        report(
            sink,
            Level::Info,
            Stage::Fetch,
            format!("[{}/{}] fetching {}", index + 1, entries.len(), entry.url),
        );

        match fetch_with_retry(fetcher, &entry.url, settings, sink).await {
            Ok(page) => {
                let url = if page.final_url.is_empty() {
                    entry.url.clone()
                } else {
                    page.final_url
                };
                let doc = RawDocument {
                    source_id,
                    url,
                    html: page.html,
                    fetched_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                };
                if let Some(store) = store {
                    if let Err(err) = store.write_raw(&doc) {
                        report(
                            sink,
                            Level::Warn,
                            Stage::Fetch,
                            format!("{}: could not store raw document: {err}", doc.source_id),
                        );
                    }
                }
                documents.push(doc);
                summary.succeeded += 1;
            }
            Err(error) => {
                report(
                    sink,
                    Level::Error,
                    Stage::Fetch,
                    format!("{}: giving up: {error}", entry.url),
                );
                failures.push(FetchFailure {
                    url: entry.url.clone(),
                    error,
                });
                summary.failed += 1;
            }
        }
    }

    complete(sink, summary);
    FetchReport {
        documents,
        failures,
        summary,
    }
}

fn load_cached(
    store: Option<&ContentStore>,
    source_id: &str,
    sink: &dyn ProgressSink,
) -> Option<RawDocument> {
    let store = store?;
    if !store.contains(source_id) {
        return None;
    }
    match store.read_raw(source_id) {
        Ok(doc) => {
            report(
                sink,
                Level::Debug,
                Stage::Fetch,
                format!("{source_id}: reusing stored raw document"),
            );
            Some(doc)
        }
        Err(err) => {
            report(
                sink,
                Level::Warn,
                Stage::Fetch,
                format!("{source_id}: stored raw document unusable, refetching: {err}"),
            );
            None
        }
    }
}
