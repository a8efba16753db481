//! Page fetching over HTTP with an ordered chain of request strategies.
//!
//! Each [`FetchStrategy`] is one attempt with its own identifying headers and
//! timeout. [`Fetcher`] walks the chain in order and stops at the first
//! success; if every attempt fails the last error is returned.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{redirect, Client, Url};
use thiserror::Error;
use tracing::{debug, warn};

pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
pub const POLITE_USER_AGENT: &str = "keyword-monitor/1.0";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const POLITE_TIMEOUT: Duration = Duration::from_secs(20);
const MAX_REDIRECTS: usize = 10;

/// Headers and timeout used for one fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchStrategy {
    pub name: String,
    pub user_agent: String,
    pub accept: Option<String>,
    pub timeout: Duration,
}

impl FetchStrategy {
    /// Fast first attempt that looks like an ordinary browser.
    pub fn browser(timeout: Duration) -> Self {
        Self {
            name: "default".into(),
            user_agent: BROWSER_USER_AGENT.into(),
            accept: None,
            timeout,
        }
    }

    /// Slower fallback that identifies itself honestly and asks only for HTML.
    pub fn polite(timeout: Duration) -> Self {
        Self {
            name: "polite".into(),
            user_agent: POLITE_USER_AGENT.into(),
            accept: Some("text/html,application/xhtml+xml;q=0.9,*/*;q=0.5".into()),
            timeout,
        }
    }

    /// The standard two-step chain: browser first, polite second.
    pub fn default_chain(default_timeout: Duration, polite_timeout: Duration) -> Vec<Self> {
        vec![Self::browser(default_timeout), Self::polite(polite_timeout)]
    }
}

/// Why a single URL could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("empty url")]
    EmptyUrl,
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("timed out after {timeout_ms} ms fetching {url} ({strategy})")]
    Timeout {
        url: String,
        strategy: String,
        timeout_ms: u128,
    },
    #[error("request to {url} failed ({strategy}): {message}")]
    Transport {
        url: String,
        strategy: String,
        message: String,
    },
    #[error("HTTP {status} from {url} ({strategy})")]
    Status {
        url: String,
        strategy: String,
        status: u16,
    },
    #[error("failed reading body of {url} ({strategy}): {message}")]
    Body {
        url: String,
        strategy: String,
        message: String,
    },
    #[error("no fetch strategies configured")]
    NoStrategies,
}

/// Source of raw page markup for a URL. The scan worker only sees this seam.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError>;
}

/// Resolve user input into an absolute URL, defaulting to `http://` when no scheme is given.
pub fn normalize_url(raw: &str) -> Result<Url, FetchError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(FetchError::EmptyUrl);
    }
    let lower = trimmed.to_ascii_lowercase();
    let candidate = if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    Url::parse(&candidate).map_err(|e| FetchError::InvalidUrl {
        url: trimmed.to_string(),
        reason: e.to_string(),
    })
}

#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    strategies: Vec<FetchStrategy>,
}

impl Fetcher {
    pub fn new(strategies: Vec<FetchStrategy>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Self { client, strategies })
    }

    pub fn strategies(&self) -> &[FetchStrategy] {
        &self.strategies
    }

    /// One GET under one strategy. Non-2xx after redirects is a failure.
    pub async fn fetch(&self, url: &str, strategy: &FetchStrategy) -> Result<String, FetchError> {
        let target = normalize_url(url)?;
        debug!(url = %target, strategy = %strategy.name, "fetching");

        let mut request = self
            .client
            .get(target.clone())
            .timeout(strategy.timeout)
            .header(USER_AGENT, strategy.user_agent.as_str());
        if let Some(accept) = strategy.accept.as_deref() {
            request = request
                .header(ACCEPT, accept)
                .header(ACCEPT_LANGUAGE, "en-US,en;q=0.8");
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify(e, &target, strategy))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: target.to_string(),
                strategy: strategy.name.clone(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| {
            if e.is_timeout() {
                classify(e, &target, strategy)
            } else {
                FetchError::Body {
                    url: target.to_string(),
                    strategy: strategy.name.clone(),
                    message: e.to_string(),
                }
            }
        })
    }

    /// Try every configured strategy in order, returning the first page body.
    pub async fn fetch_with_fallback(&self, url: &str) -> Result<String, FetchError> {
        let mut last_err = FetchError::NoStrategies;
        for strategy in &self.strategies {
            match self.fetch(url, strategy).await {
                Ok(body) => return Ok(body),
                Err(e @ (FetchError::EmptyUrl | FetchError::InvalidUrl { .. })) => return Err(e),
                Err(e) => {
                    warn!(url, strategy = %strategy.name, error = %e, "fetch attempt failed");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }
}

#[async_trait]
impl PageSource for Fetcher {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        self.fetch_with_fallback(url).await
    }
}

fn classify(err: reqwest::Error, url: &Url, strategy: &FetchStrategy) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
            strategy: strategy.name.clone(),
            timeout_ms: strategy.timeout.as_millis(),
        }
    } else {
        FetchError::Transport {
            url: url.to_string(),
            strategy: strategy.name.clone(),
            message: err.to_string(),
        }
    }
}
