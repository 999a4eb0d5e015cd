//! Authenticated HTTP client for the GitHub REST API.

use backoff::ExponentialBackoffBuilder;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, RETRY_AFTER};
use reqwest::{Client as ReqwestClient, Method, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::errors::TransportError;
use crate::domain::models::{HttpRetryConfig, TrackerConfig};
use crate::infrastructure::rate_limiter::RequestBudget;

const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("issue-lifecycle/", env!("CARGO_PKG_VERSION"));
const PER_PAGE: &str = "100";

/// A failed attempt plus the server's requested wait, if any.
struct Failure {
    error: TransportError,
    retry_after: Option<Duration>,
}

impl From<TransportError> for Failure {
    fn from(error: TransportError) -> Self {
        Self {
            error,
            retry_after: None,
        }
    }
}

/// Every request carries its own timeout, which starts once a budget
/// token has been taken.
pub struct GitHubClient {
    http: ReqwestClient,
    api_base: Url,
    retry: HttpRetryConfig,
    request_timeout: Duration,
    budget: Option<Arc<RequestBudget>>,
}

impl GitHubClient {
    /// Client for `config.api_base` with `request_timeout` per HTTP request.
    pub fn new(config: &TrackerConfig, request_timeout: Duration) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));
        if !config.token.is_empty() {
            let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token))
                .map_err(|_| TransportError::Network("tracker token is not a valid header value".to_string()))?;
            auth.set_sensitive(true);
            headers.insert(AUTHORIZATION, auth);
        }

        let http = ReqwestClient::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let api_base = Url::parse(&config.api_base)
            .map_err(|e| TransportError::Network(format!("invalid api base {}: {e}", config.api_base)))?;

        Ok(Self {
            http,
            api_base,
            retry: config.http_retry.clone(),
            request_timeout,
            budget: None,
        })
    }

    /// Spend one token of `budget` before every HTTP attempt.
    #[must_use]
    pub fn with_budget(mut self, budget: Arc<RequestBudget>) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Absolute URL for the given path segments; each segment is percent-encoded.
    pub fn url(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| TransportError::Network(format!("api base {} cannot hold a path", self.api_base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET `url` with retries and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, TransportError> {
        let response = self.send(Method::GET, url, None::<&()>, true).await?;
        decode(response).await
    }

    /// Follow `rel="next"` links and concatenate every page.
    pub async fn get_pages<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>, TransportError> {
        let mut items = Vec::new();
        let mut next = Some(paged(url));
        let mut pages = 0usize;

        while let Some(page_url) = next.take() {
            let (mut page, links) = self.get_page::<T>(page_url).await?;
            next = links.next;
            items.append(&mut page);
            pages += 1;
        }

        debug!(pages, items = items.len(), "paginated fetch complete");
        Ok(items)
    }

    /// Fetch the newest pages of an ascending listing.
    ///
    /// Reads the first page, then walks back from `rel="last"` along
    /// `rel="prev"` until `reached` accepts a page; older pages are
    /// skipped. Pages are returned in listing order and the first page is
    /// never fetched twice.
    pub async fn get_tail_pages<T, F>(&self, url: Url, reached: F) -> Result<Vec<T>, TransportError>
    where
        T: DeserializeOwned,
        F: Fn(&[T]) -> bool,
    {
        let (first, links) = self.get_page::<T>(paged(url)).await?;
        let Some(mut cursor) = links.last.filter(|_| links.next.is_some()) else {
            let mut items = first;
            items.extend(self.get_pages_from(links.next).await?);
            return Ok(items);
        };

        let mut tail: Vec<Vec<T>> = Vec::new();
        loop {
            let (page, links) = self.get_page::<T>(cursor).await?;
            let done = reached(&page);
            tail.push(page);
            match links.prev {
                Some(prev) if !done && page_number(&prev) != Some(1) => cursor = prev,
                Some(_) if !done => {
                    tail.push(first);
                    break;
                }
                _ => break,
            }
        }

        debug!(pages = tail.len(), "tail pages fetched");
        Ok(tail.into_iter().rev().flatten().collect())
    }

    async fn get_pages_from<T: DeserializeOwned>(&self, mut next: Option<Url>) -> Result<Vec<T>, TransportError> {
        let mut items = Vec::new();
        while let Some(page_url) = next.take() {
            let (mut page, links) = self.get_page::<T>(page_url).await?;
            next = links.next;
            items.append(&mut page);
        }
        Ok(items)
    }

    async fn get_page<T: DeserializeOwned>(&self, url: Url) -> Result<(Vec<T>, PageLinks), TransportError> {
        let response = self.send(Method::GET, url, None::<&()>, true).await?;
        let links = response
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .map(PageLinks::parse)
            .transpose()?
            .unwrap_or_default();
        Ok((decode(response).await?, links))
    }

    /// Send a request with a JSON body.
    ///
    /// `idempotent` requests are retried on transient failures with
    /// exponential backoff. Others are sent exactly once.
    pub async fn send<B: Serialize + Sync>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
        idempotent: bool,
    ) -> Result<Response, TransportError> {
        if !idempotent {
            return self.attempt(&method, &url, body).await.map_err(|f| f.error);
        }

        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.retry.initial_interval_ms))
            .with_max_interval(Duration::from_millis(self.retry.max_interval_ms))
            .with_max_elapsed_time(Some(Duration::from_millis(self.retry.max_elapsed_ms)))
            .build();

        let method = &method;
        let url = &url;
        backoff::future::retry(policy, || async move {
            self.attempt(method, url, body).await.map_err(|failure| {
                if !failure.error.is_transient() {
                    return backoff::Error::permanent(failure.error);
                }
                warn!(method = %method, url = %url, error = %failure.error, "transient tracker failure, retrying");
                match failure.retry_after {
                    Some(wait) => backoff::Error::retry_after(failure.error, wait),
                    None => backoff::Error::transient(failure.error),
                }
            })
        })
        .await
    }

    async fn attempt<B: Serialize + Sync>(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&B>,
    ) -> Result<Response, Failure> {
        if let Some(budget) = &self.budget {
            budget.acquire().await;
        }
        let mut request = self.http.request(method.clone(), url.clone());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| self.network_error(&e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let exhausted_quota = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim() == "0");
        let message = error_message(response).await;

        let error = match status {
            StatusCode::NOT_FOUND => TransportError::NotFound(url.path().to_string()),
            StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => TransportError::Conflict(message),
            StatusCode::TOO_MANY_REQUESTS => TransportError::RateLimited,
            StatusCode::FORBIDDEN if exhausted_quota || retry_after.is_some() => TransportError::RateLimited,
            _ => TransportError::Status {
                status: status.as_u16(),
                message,
            },
        };
        Err(Failure { error, retry_after })
    }

    fn network_error(&self, err: &reqwest::Error) -> Failure {
        let error = if err.is_timeout() {
            TransportError::Timeout(u64::try_from(self.request_timeout.as_millis()).unwrap_or(u64::MAX))
        } else {
            TransportError::Network(err.to_string())
        };
        error.into()
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, TransportError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| TransportError::Network(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))
}

async fn error_message(response: Response) -> String {
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| text.chars().take(200).collect())
}

/// Target of the `rel="next"` entry of a `Link` header.
pub fn next_link(header: &str) -> Option<String> {
    link_target(header, "next")
}

fn link_target(header: &str, rel: &str) -> Option<String> {
    let wanted = format!(r#"rel="{rel}""#);
    header.split(',').find_map(|entry| {
        let (target, params) = entry.split_once(';')?;
        params
            .split(';')
            .any(|p| p.trim() == wanted)
            .then(|| target.trim().trim_start_matches('<').trim_end_matches('>').to_string())
    })
}

/// Pagination links of one response.
#[derive(Debug, Default)]
struct PageLinks {
    next: Option<Url>,
    prev: Option<Url>,
    last: Option<Url>,
}

impl PageLinks {
    fn parse(header: &str) -> Result<Self, TransportError> {
        let parse = |rel: &str| {
            link_target(header, rel)
                .map(|link| Url::parse(&link))
                .transpose()
                .map_err(|e| TransportError::Decode(format!("bad pagination link: {e}")))
        };
        Ok(Self {
            next: parse("next")?,
            prev: parse("prev")?,
            last: parse("last")?,
        })
    }
}

fn paged(mut url: Url) -> Url {
    url.query_pairs_mut().append_pair("per_page", PER_PAGE);
    url
}

fn page_number(url: &Url) -> Option<u64> {
    url.query_pairs()
        .find(|(key, _)| key == "page")
        .and_then(|(_, value)| value.parse().ok())
}
