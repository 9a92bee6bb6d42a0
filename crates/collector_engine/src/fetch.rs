use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use chrono::Utc;
use collector_core::PageIndex;
use collector_logging::collector_trace;
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;

use crate::{FetchError, FetchFailureKind, RawPage};

const PAGE_PLACEHOLDER: &str = "{page}";
const OFFSET_PLACEHOLDER: &str = "{offset}";

/// Retrieves the raw content of one result page.
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, page: PageIndex) -> Result<RawPage, FetchError>;
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Search URL with a `{page}` and/or `{offset}` placeholder.
    pub url_template: String,
    /// Results per page, used to compute `{offset}` as `(page - 1) * page_size`.
    pub page_size: u32,
    pub user_agent: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    pub allowed_content_types: Vec<String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            url_template: String::new(),
            page_size: 10,
            user_agent: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            redirect_limit: 5,
            max_bytes: 5 * 1024 * 1024,
            allowed_content_types: vec![
                "application/json".to_string(),
                "text/html".to_string(),
                "application/xhtml+xml".to_string(),
            ],
        }
    }
}

impl FetchSettings {
    pub fn for_template(url_template: impl Into<String>) -> Self {
        Self {
            url_template: url_template.into(),
            ..Self::default()
        }
    }

    pub fn page_url(&self, page: PageIndex) -> String {
        let offset = u64::from(page.get() - 1) * u64::from(self.page_size);
        self.url_template
            .replace(PAGE_PLACEHOLDER, &page.get().to_string())
            .replace(OFFSET_PLACEHOLDER, &offset.to_string())
    }
}

/// HTTP fetcher for URL-addressable result pages.
///
/// A fresh client is built for every attempt and dropped when the attempt
/// ends, on success and on every error path alike.
#[derive(Debug, Clone)]
pub struct ReqwestPageFetcher {
    settings: FetchSettings,
}

impl ReqwestPageFetcher {
    pub fn new(settings: FetchSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    fn build_client(
        &self,
        redirect_counter: Arc<AtomicUsize>,
    ) -> Result<reqwest::Client, FetchError> {
        let redirect_limit = self.settings.redirect_limit;
        let policy = reqwest::redirect::Policy::custom(move |attempt| {
            let count = attempt.previous().len();
            redirect_counter.store(count, Ordering::Relaxed);
            if count >= redirect_limit {
                attempt.error("redirect limit exceeded")
            } else {
                attempt.follow()
            }
        });

        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .timeout(self.settings.request_timeout)
            .redirect(policy);
        if let Some(agent) = &self.settings.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        builder
            .build()
            .map_err(|err| FetchError::new(FetchFailureKind::Resource, err.to_string()))
    }

    fn too_large(&self, actual: u64) -> FetchError {
        FetchError::new(
            FetchFailureKind::TooLarge {
                max_bytes: self.settings.max_bytes,
                actual: Some(actual),
            },
            "response too large",
        )
    }

    /// Rejects a response on its status line and headers, before any body
    /// is read. Returns the declared content type.
    fn screen(&self, response: &reqwest::Response) -> Result<Option<String>, FetchError> {
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FetchFailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }
        if let Some(declared) = response.content_length() {
            if declared > self.settings.max_bytes {
                return Err(self.too_large(declared));
            }
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        if let Some(ct) = content_type.as_deref() {
            let mime = ct.split(';').next().unwrap_or(ct).trim();
            let allowed = self
                .settings
                .allowed_content_types
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(mime));
            if !allowed {
                return Err(FetchError::new(
                    FetchFailureKind::UnsupportedContentType {
                        content_type: ct.to_string(),
                    },
                    "unsupported content type",
                ));
            }
        }
        Ok(content_type)
    }

    /// Streams the body, giving up as soon as it exceeds `max_bytes`.
    async fn read_capped(&self, response: reqwest::Response) -> Result<Vec<u8>, FetchError> {
        let mut body = Vec::new();
        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let total = (body.len() + chunk.len()) as u64;
            if total > self.settings.max_bytes {
                return Err(self.too_large(total));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[async_trait::async_trait]
impl PageFetcher for ReqwestPageFetcher {
    async fn fetch(&self, page: PageIndex) -> Result<RawPage, FetchError> {
        let url = self.settings.page_url(page);
        let parsed = reqwest::Url::parse(&url)
            .map_err(|err| FetchError::new(FetchFailureKind::InvalidUrl, err.to_string()))?;
        let redirects = Arc::new(AtomicUsize::new(0));
        let client = self.build_client(redirects.clone())?;

        let response = client.get(parsed).send().await.map_err(map_reqwest_error)?;
        let content_type = self.screen(&response)?;
        let final_url = response.url().to_string();
        let body = self.read_capped(response).await?;

        collector_trace!(
            "page {} fetched from {} ({} bytes, {} redirects)",
            page,
            final_url,
            body.len(),
            redirects.load(Ordering::Relaxed)
        );

        Ok(RawPage {
            page,
            body: body.into(),
            content_type,
            final_url: Some(final_url),
            fetched_at: Utc::now(),
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FetchFailureKind::Timeout, err.to_string());
    }
    if err.is_redirect() {
        return FetchError::new(FetchFailureKind::RedirectLimitExceeded, err.to_string());
    }
    FetchError::new(FetchFailureKind::Network, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_and_offset_placeholders_are_filled() {
        let settings = FetchSettings {
            page_size: 100,
            ..FetchSettings::for_template("https://example.com/?q=x&page={page}&start={offset}")
        };
        let url = settings.page_url(PageIndex::new(3).unwrap());
        assert_eq!(url, "https://example.com/?q=x&page=3&start=200");
    }
}
