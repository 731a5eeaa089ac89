use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use opn_shared::{LoginRequest, LoginResponse, RankingEntry, Task};
use parking_lot::RwLock;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

/// Any failed call against the task API. Callers are not expected to branch
/// on the cause; it is kept for logs and messages.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("invalid request URL for {operation}: {detail}")]
    Url {
        operation: &'static str,
        detail: String,
    },

    #[error("{operation} request failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation} returned HTTP {status}")]
    Status {
        operation: &'static str,
        status: u16,
    },

    #[error("failed decoding {operation} response: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{operation} failed: {detail}")]
    Other {
        operation: &'static str,
        detail: String,
    },
}

impl NetworkError {
    pub fn other(operation: &'static str, detail: impl Into<String>) -> Self {
        NetworkError::Other {
            operation,
            detail: detail.into(),
        }
    }
}

#[async_trait]
pub trait TaskApi: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, NetworkError>;

    async fn fetch_task(&self, session_marker: &str, user_id: &str) -> Result<Task, NetworkError>;

    async fn complete_task(&self, user_id: &str) -> Result<(), NetworkError>;

    async fn cancel_task(&self, user_id: &str) -> Result<(), NetworkError>;

    async fn list_completed_tasks(&self, user_id: &str) -> Result<Vec<Task>, NetworkError>;

    async fn get_ranking(&self) -> Result<Vec<RankingEntry>, NetworkError>;
}

/// `TaskApi` over HTTP. Every `/api/Tasks` request carries the session
/// marker as a bearer credential once one is known.
pub struct HttpTaskApi {
    base_url: Url,
    client: reqwest::Client,
    session_marker: RwLock<Option<String>>,
}

impl HttpTaskApi {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let normalized = format!("{}/", base_url.trim().trim_end_matches('/'));
        let base_url = Url::parse(&normalized)
            .with_context(|| format!("invalid API base URL: {base_url}"))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed building HTTP client for the task API")?;

        Ok(Self {
            base_url,
            client,
            session_marker: RwLock::new(None),
        })
    }

    pub fn with_session_marker(self, marker: Option<String>) -> Self {
        *self.session_marker.write() = marker;
        self
    }

    pub fn set_session_marker(&self, marker: Option<String>) {
        *self.session_marker.write() = marker;
    }

    fn endpoint(
        &self,
        operation: &'static str,
        path: &str,
        idn: Option<&str>,
    ) -> Result<Url, NetworkError> {
        let mut url = self.base_url.join(path).map_err(|err| NetworkError::Url {
            operation,
            detail: err.to_string(),
        })?;
        if let Some(idn) = idn {
            url.query_pairs_mut().append_pair("idn", idn);
        }
        Ok(url)
    }

    async fn send(
        &self,
        operation: &'static str,
        method: Method,
        url: Url,
        bearer: Option<&str>,
        body: Option<Vec<u8>>,
    ) -> Result<String, NetworkError> {
        debug!(operation, method = %method, url = %url, "sending task API request");

        let mut request = self
            .client
            .request(method, url)
            .header(ACCEPT, "application/json");
        if let Some(token) = bearer {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(payload) = body {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(payload);
        }

        let response = request
            .send()
            .await
            .map_err(|source| NetworkError::Transport { operation, source })?;

        let status = response.status();
        if !status.is_success() {
            warn!(operation, status = %status, "task API returned non-success status");
            return Err(NetworkError::Status {
                operation,
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|source| NetworkError::Transport { operation, source })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        url: Url,
        bearer: Option<&str>,
    ) -> Result<T, NetworkError> {
        let body = self.send(operation, Method::GET, url, bearer, None).await?;
        decode(operation, &body)
    }

    fn current_marker(&self) -> Option<String> {
        self.session_marker.read().clone()
    }
}

fn decode<T: DeserializeOwned>(operation: &'static str, body: &str) -> Result<T, NetworkError> {
    serde_json::from_str(body).map_err(|source| NetworkError::Decode { operation, source })
}

#[async_trait]
impl TaskApi for HttpTaskApi {
    #[instrument(skip(self, request), fields(idn = %request.idn))]
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, NetworkError> {
        let operation = "login";
        let url = self.endpoint(operation, "api/Login", None)?;
        let payload = serde_json::to_vec(request)
            .map_err(|err| NetworkError::other(operation, err.to_string()))?;
        let body = self
            .send(operation, Method::POST, url, None, Some(payload))
            .await?;
        decode(operation, &body)
    }

    #[instrument(skip(self, session_marker))]
    async fn fetch_task(&self, session_marker: &str, user_id: &str) -> Result<Task, NetworkError> {
        let operation = "fetch task";
        let url = self.endpoint(operation, "api/Tasks/CreateRandomTask", Some(user_id))?;
        self.get_json(operation, url, Some(session_marker)).await
    }

    #[instrument(skip(self))]
    async fn complete_task(&self, user_id: &str) -> Result<(), NetworkError> {
        let operation = "complete task";
        let url = self.endpoint(operation, "api/Tasks/CompleteTask", Some(user_id))?;
        let marker = self.current_marker();
        self.send(operation, Method::POST, url, marker.as_deref(), None)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn cancel_task(&self, user_id: &str) -> Result<(), NetworkError> {
        let operation = "cancel task";
        let url = self.endpoint(operation, "api/Tasks/CancelTask", Some(user_id))?;
        let marker = self.current_marker();
        self.send(operation, Method::PUT, url, marker.as_deref(), None)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_completed_tasks(&self, user_id: &str) -> Result<Vec<Task>, NetworkError> {
        let operation = "list completed tasks";
        let url = self.endpoint(operation, "api/Tasks/GetUserCompletedTasks", Some(user_id))?;
        let marker = self.current_marker();
        self.get_json(operation, url, marker.as_deref()).await
    }

    #[instrument(skip(self))]
    async fn get_ranking(&self) -> Result<Vec<RankingEntry>, NetworkError> {
        let operation = "get ranking";
        let url = self.endpoint(operation, "api/Tasks/GetRanking", None)?;
        let marker = self.current_marker();
        self.get_json(operation, url, marker.as_deref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(base: &str) -> HttpTaskApi {
        HttpTaskApi::new(base, Duration::from_secs(5)).expect("build api")
    }

    #[test]
    fn endpoints_keep_base_path_and_encode_idn() {
        let api = api("http://localhost:5000/opn/");
        let url = api
            .endpoint("fetch task", "api/Tasks/CreateRandomTask", Some("12 3"))
            .expect("endpoint");
        assert_eq!(
            url.as_str(),
            "http://localhost:5000/opn/api/Tasks/CreateRandomTask?idn=12+3"
        );

        let ranking = api
            .endpoint("get ranking", "api/Tasks/GetRanking", None)
            .expect("endpoint");
        assert_eq!(ranking.as_str(), "http://localhost:5000/opn/api/Tasks/GetRanking");
    }

    #[test]
    fn rejects_unparseable_base_url() {
        assert!(HttpTaskApi::new("not a url", Duration::from_secs(5)).is_err());
    }

    #[test]
    fn decode_errors_name_the_operation() {
        let err = decode::<Vec<RankingEntry>>("get ranking", "{").expect_err("bad json");
        assert!(err.to_string().starts_with("failed decoding get ranking response"));
    }
}
