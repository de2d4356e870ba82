//! REST client for the remote check-in authority.
//!
//! Every endpoint lives below `/api/v1/organizers/{org}/events/{event}/`,
//! except device info and the server version.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, IF_MODIFIED_SINCE, LAST_MODIFIED, RETRY_AFTER,
};
use reqwest::StatusCode;

use checkin_core::catalog::{CheckInListStatus, OrderPosition, SearchResult};
use checkin_core::sync::{
    DeviceInfo, PageFetch, PageRequest, RemoteAuthority, RemoteError, RemotePage,
    RemoteRedeemResponse, ResourceKind, VersionInfo,
};
use checkin_core::uploads::{FailedCheckInUpload, RedeemRequestBody};

use crate::error::{RemoteApiError, Result};
use crate::types::{search_result, ApiErrorResponse, ListStatusResponse, PagedResponse};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;
const PAGE_GENERATED_HEADER: &str = "x-page-generated";

/// Where and as whom the client talks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEndpoint {
    /// e.g. `https://tickets.example.org`
    pub base_url: String,
    pub device_token: String,
    pub organizer: String,
    pub event: String,
}

#[derive(Debug, Clone)]
pub struct RemoteApiClient {
    client: reqwest::Client,
    endpoint: RemoteEndpoint,
}

impl RemoteApiClient {
    pub fn new(endpoint: RemoteEndpoint) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            endpoint: RemoteEndpoint {
                base_url: endpoint.base_url.trim_end_matches('/').to_string(),
                ..endpoint
            },
        })
    }

    fn log_response(status: StatusCode, body: &str) {
        if status.is_success() {
            debug!("[Remote] Response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("[Remote] Response error ({}): {}", status, preview);
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let auth_value = HeaderValue::from_str(&format!("Device {}", self.endpoint.device_token))
            .map_err(|_| RemoteApiError::auth("Invalid device token format"))?;
        headers.insert(AUTHORIZATION, auth_value);
        Ok(headers)
    }

    fn event_url(&self, suffix: &str) -> String {
        format!(
            "{}/api/v1/organizers/{}/events/{}/{}",
            self.endpoint.base_url,
            urlencoding::encode(&self.endpoint.organizer),
            urlencoding::encode(&self.endpoint.event),
            suffix
        )
    }

    fn list_url(&self, list_id: i64, suffix: &str) -> String {
        self.event_url(&format!("checkinlists/{}/{}", list_id, suffix))
    }

    /// Builds `?a=b&c=d` by hand. reqwest's form encoding writes a space as
    /// `+`; the remote reads a literal `+` as a space, so `+` must go out as
    /// `%2B` and timezone offsets in watermarks survive.
    fn query_string(params: &[(&str, String)]) -> String {
        if params.is_empty() {
            return String::new();
        }
        let pairs = params
            .iter()
            .map(|(name, value)| format!("{}={}", name, urlencoding::encode(value)))
            .collect::<Vec<_>>();
        format!("?{}", pairs.join("&"))
    }

    fn retry_after(headers: &HeaderMap) -> Option<Duration> {
        headers
            .get(RETRY_AFTER)?
            .to_str()
            .ok()?
            .trim()
            .parse::<u64>()
            .ok()
            .map(Duration::from_secs)
    }

    fn header_string(headers: &HeaderMap, name: impl reqwest::header::AsHeaderName) -> Option<String> {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }

    /// Turns a non-success response into the matching error.
    async fn error_from(response: reqwest::Response) -> RemoteApiError {
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return RemoteApiError::RateLimited {
                retry_after: Self::retry_after(response.headers()),
            };
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => return RemoteApiError::Http(err),
        };
        Self::log_response(status, &body);
        if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(&body) {
            return RemoteApiError::api(status.as_u16(), error.detail);
        }
        let preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        RemoteApiError::api(status.as_u16(), format!("Request failed: {}", preview))
    }

    /// Parse a JSON response body.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);
        Ok(serde_json::from_str(&body)?)
    }

    async fn expect_success(response: reqwest::Response) -> Result<()> {
        if response.status().is_success() {
            return Ok(());
        }
        Err(Self::error_from(response).await)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Catalog download
    // ─────────────────────────────────────────────────────────────────────────

    /// GET one page of a catalog resource.
    ///
    /// GET /api/v1/organizers/{org}/events/{event}/{resource}/?page=..
    /// GET /api/v1/organizers/{org}/events/{event}/ for the event itself
    pub async fn fetch_resource_page(&self, request: &PageRequest) -> Result<PageFetch> {
        let url = match request.resource.path_segment() {
            Some(segment) => {
                let mut params = vec![
                    ("page", request.page.to_string()),
                    ("page_size", request.page_size.to_string()),
                ];
                if let Some(ordering) = request.ordering {
                    params.push(("ordering", ordering.to_string()));
                }
                if let (Some(name), Some(since)) =
                    (request.resource.since_param(), request.since.as_ref())
                {
                    params.push((name, since.clone()));
                }
                format!(
                    "{}{}",
                    self.event_url(&format!("{}/", segment)),
                    Self::query_string(&params)
                )
            }
            None => self.event_url(""),
        };
        debug!("[Remote] GET {}", url);

        let mut headers = self.headers()?;
        if let Some(since) = &request.if_modified_since {
            let value = HeaderValue::from_str(since)
                .map_err(|_| RemoteApiError::invalid_request("Invalid If-Modified-Since value"))?;
            headers.insert(IF_MODIFIED_SINCE, value);
        }

        let response = self.client.get(&url).headers(headers).send().await?;
        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(PageFetch::NotModified);
        }
        let generated_at = Self::header_string(response.headers(), PAGE_GENERATED_HEADER);
        let last_modified = Self::header_string(response.headers(), LAST_MODIFIED);

        let page = if request.resource == ResourceKind::Event {
            let event: serde_json::Value = Self::parse_response(response).await?;
            RemotePage {
                results: vec![event],
                has_next: false,
                generated_at,
                last_modified,
            }
        } else {
            let paged: PagedResponse<serde_json::Value> = Self::parse_response(response).await?;
            RemotePage {
                results: paged.results,
                has_next: paged.next.is_some(),
                generated_at,
                last_modified,
            }
        };
        Ok(PageFetch::Page(page))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Check-in
    // ─────────────────────────────────────────────────────────────────────────

    /// Redeem a secret on a list.
    ///
    /// POST /api/v1/organizers/{org}/events/{event}/checkinlists/{list}/positions/{secret}/redeem/
    ///
    /// A 400 carries a regular redeem result (`status: error`) and is not an
    /// error of the call.
    pub async fn redeem_secret(
        &self,
        list_id: i64,
        secret: &str,
        body: &RedeemRequestBody,
    ) -> Result<RemoteRedeemResponse> {
        let url = self.list_url(
            list_id,
            &format!("positions/{}/redeem/", urlencoding::encode(secret)),
        );

        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::BAD_REQUEST {
            return Self::parse_response(response).await;
        }
        let text = response.text().await?;
        Self::log_response(status, &text);
        serde_json::from_str::<RemoteRedeemResponse>(&text).map_err(|_| {
            let preview = text.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
            RemoteApiError::api(status.as_u16(), format!("Request failed: {}", preview))
        })
    }

    /// POST /api/v1/organizers/{org}/events/{event}/checkinlists/{list}/failed_checkins/
    pub async fn post_failed_checkin(
        &self,
        list_id: i64,
        upload: &FailedCheckInUpload,
    ) -> Result<()> {
        let url = self.list_url(list_id, "failed_checkins/");
        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(upload)
            .send()
            .await?;
        Self::expect_success(response).await
    }

    /// GET /api/v1/organizers/{org}/events/{event}/checkinlists/{list}/positions/?search={query}
    pub async fn search_positions(&self, list_id: i64, query: &str) -> Result<Vec<SearchResult>> {
        let url = format!(
            "{}{}",
            self.list_url(list_id, "positions/"),
            Self::query_string(&[("search", query.to_string())])
        );
        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await?;
        let paged: PagedResponse<OrderPosition> = Self::parse_response(response).await?;
        Ok(paged
            .results
            .into_iter()
            .map(|position| search_result(position, list_id))
            .collect())
    }

    /// GET /api/v1/organizers/{org}/events/{event}/checkinlists/{list}/status/
    pub async fn list_status(&self, list_id: i64) -> Result<CheckInListStatus> {
        let url = self.list_url(list_id, "status/");
        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await?;
        let status: ListStatusResponse = Self::parse_response(response).await?;
        Ok(status.into_status(list_id))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Device
    // ─────────────────────────────────────────────────────────────────────────

    /// POST /api/v1/device/update
    pub async fn update_device(&self, info: &DeviceInfo) -> Result<()> {
        let url = format!("{}/api/v1/device/update", self.endpoint.base_url);
        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(info)
            .send()
            .await?;
        Self::expect_success(response).await
    }

    /// GET /api/v1/version
    pub async fn version(&self) -> Result<VersionInfo> {
        let url = format!("{}/api/v1/version", self.endpoint.base_url);
        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await?;
        Self::parse_response(response).await
    }
}

#[async_trait]
impl RemoteAuthority for RemoteApiClient {
    async fn fetch_page(&self, request: &PageRequest) -> std::result::Result<PageFetch, RemoteError> {
        Ok(self.fetch_resource_page(request).await?)
    }

    async fn redeem(
        &self,
        list_id: i64,
        secret: &str,
        body: &RedeemRequestBody,
    ) -> std::result::Result<RemoteRedeemResponse, RemoteError> {
        Ok(self.redeem_secret(list_id, secret, body).await?)
    }

    async fn upload_failed_checkin(
        &self,
        list_id: i64,
        upload: &FailedCheckInUpload,
    ) -> std::result::Result<(), RemoteError> {
        Ok(self.post_failed_checkin(list_id, upload).await?)
    }

    async fn search(
        &self,
        list_id: i64,
        query: &str,
    ) -> std::result::Result<Vec<SearchResult>, RemoteError> {
        Ok(self.search_positions(list_id, query).await?)
    }

    async fn checkin_list_status(
        &self,
        list_id: i64,
    ) -> std::result::Result<CheckInListStatus, RemoteError> {
        Ok(self.list_status(list_id).await?)
    }

    async fn update_device_info(&self, info: &DeviceInfo) -> std::result::Result<(), RemoteError> {
        Ok(self.update_device(info).await?)
    }

    async fn fetch_version_info(&self) -> std::result::Result<VersionInfo, RemoteError> {
        Ok(self.version().await?)
    }
}
