//! HTTP client for the session service API

use std::time::Duration;

use async_trait::async_trait;
use atm_common::api::{EnsureSessionRequest, ErrorResponse};
use atm_common::{ParticipantId, ProgressUpdate, SessionState};
use reqwest::{Response, StatusCode};
use tracing::debug;

use super::{RemoteError, SessionRemote};

const USER_AGENT: &str = concat!("atm-sr/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Session service reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpSessionRemote {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpSessionRemote {
    /// Client for the service at `base_url` (e.g. `http://127.0.0.1:8000`)
    pub fn new(base_url: &str) -> Result<Self, RemoteError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Pass successful responses through, map the rest to errors
    async fn check(response: Response) -> Result<Response, RemoteError> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RemoteError::NotFound);
        }
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&text)
            .map(|body| body.error.message)
            .unwrap_or(text);
        Err(RemoteError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl SessionRemote for HttpSessionRemote {
    async fn ensure_session(&self, participant_id: &ParticipantId) -> Result<(), RemoteError> {
        let request = EnsureSessionRequest {
            participant_id: participant_id.clone(),
        };
        let response = self
            .http_client
            .post(self.url("/api/session"))
            .json(&request)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }

    async fn get_session(
        &self,
        participant_id: &ParticipantId,
    ) -> Result<Option<SessionState>, RemoteError> {
        let url = self.url(&format!("/api/session/{}", participant_id));
        debug!(url = %url, "Loading remote session");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let response = match Self::check(response).await {
            Ok(response) => response,
            Err(RemoteError::NotFound) => return Ok(None),
            Err(e) => return Err(e),
        };

        response
            .json()
            .await
            .map(Some)
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }

    async fn save_progress(&self, update: &ProgressUpdate) -> Result<(), RemoteError> {
        let response = self
            .http_client
            .post(self.url("/api/progress"))
            .json(update)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }
}
