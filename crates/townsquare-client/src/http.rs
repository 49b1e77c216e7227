use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use townsquare_models::poll::{CastVoteRequest, CreatePollRequest, PollSummary, PollView, VoteReceipt};
use url::Url;

use crate::error::TransportError;
use crate::transport::VoteTransport;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Error body returned by the ledger API. Only the fields the client
/// classifies on are read.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// [`VoteTransport`] over the ledger's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
    base: Url,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, TransportError> {
        Self::with_timeout(base_url, token, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| TransportError::Network(format!("invalid base url: {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("townsquare-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self { http, base, token })
    }

    fn url(&self, path: &str) -> Result<Url, TransportError> {
        self.base
            .join(path)
            .map_err(|e| TransportError::Network(format!("invalid request path {path}: {e}")))
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, TransportError> {
        let resp = self.authorize(req).send().await.map_err(map_reqwest)?;
        let resp = check_status(resp).await?;
        resp.json::<T>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }

    pub async fn list_polls(
        &self,
        neighborhood: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<PollSummary>, TransportError> {
        let mut url = self.url("api/v1/polls")?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(neighborhood) = neighborhood {
                query.append_pair("neighborhood", neighborhood);
            }
            if let Some(limit) = limit {
                query.append_pair("limit", &limit.to_string());
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        self.send(self.http.get(url)).await
    }

    pub async fn create_poll(&self, req: &CreatePollRequest) -> Result<PollView, TransportError> {
        let url = self.url("api/v1/polls")?;
        self.send(self.http.post(url).json(req)).await
    }
}

#[async_trait]
impl VoteTransport for HttpTransport {
    async fn cast_vote(&self, poll_id: &str, option: &str) -> Result<VoteReceipt, TransportError> {
        let url = self.url(&format!("api/v1/polls/{poll_id}/vote"))?;
        let body = CastVoteRequest {
            option: Some(option.to_string()),
        };
        self.send(self.http.post(url).json(&body)).await
    }

    async fn fetch_poll(&self, poll_id: &str) -> Result<PollView, TransportError> {
        let url = self.url(&format!("api/v1/polls/{poll_id}"))?;
        self.send(self.http.get(url)).await
    }
}

fn map_reqwest(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_decode() {
        TransportError::Decode(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}

async fn check_status(resp: Response) -> Result<Response, TransportError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let raw = resp.text().await.map_err(map_reqwest)?;
    let body: ErrorBody = serde_json::from_str(&raw).unwrap_or_default();
    tracing::debug!(status = status.as_u16(), code = %body.code, "ledger rejected request");
    Err(TransportError::Rejected {
        status: status.as_u16(),
        code: body.code,
        message: if body.message.is_empty() {
            raw
        } else {
            body.message
        },
    })
}
