//! HTTP transport to the game server
//!
//! Everything that talks to the server goes through the [`GameApi`] trait so the
//! synchronizer, reconciler and gateway can be driven by test doubles.

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use shared::{ConfigMode, GameConfig, PlayerId, StateHash, StateSnapshot};
use std::time::Duration;
use thiserror::Error;

/// Upper bound on any single request, connection included
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// The server does not know this session (expired or never joined)
    #[error("session not found")]
    NotFound,

    #[error("request rejected with status {status}: {}", .detail.as_deref().unwrap_or("no detail"))]
    Rejected { status: u16, detail: Option<String> },

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Human-readable reason suitable for a short-lived error indicator
    pub fn reason(&self) -> String {
        match self {
            ApiError::Rejected {
                detail: Some(detail),
                ..
            } => detail.clone(),
            other => other.to_string(),
        }
    }

    /// Validation errors are the caller's fault and are not worth retrying
    pub fn is_validation(&self) -> bool {
        matches!(self, ApiError::Rejected { status, .. } if (400..500).contains(status))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Decode(e.to_string())
    }
}

/// A gameplay command: the endpoint named by the controls plus an optional target
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub action: String,
    pub selected_id: Option<PlayerId>,
}

impl ActionRequest {
    pub fn new(action: &str, selected_id: Option<PlayerId>) -> Self {
        Self {
            action: action.to_string(),
            selected_id,
        }
    }
}

#[async_trait]
pub trait GameApi: Send + Sync {
    /// Cheap change detection. `Err(ApiError::NotFound)` means the session is gone.
    async fn state_hash(&self, known_hash: StateHash) -> Result<StateHash, ApiError>;

    /// Registers (or re-registers) this client in the game
    async fn join(&self) -> Result<(), ApiError>;

    async fn state(&self) -> Result<StateSnapshot, ApiError>;

    async fn game_config(&self) -> Result<Option<GameConfig>, ApiError>;

    /// `None` asks the server to go back to its defaults
    async fn set_game_config(&self, config: Option<&GameConfig>) -> Result<(), ApiError>;

    async fn game_config_mode(&self) -> Result<ConfigMode, ApiError>;

    async fn set_game_config_mode(&self, mode: ConfigMode) -> Result<(), ApiError>;

    async fn submit_action(&self, request: &ActionRequest) -> Result<(), ApiError>;

    /// Asks the server for a fresh, unused game tag
    async fn new_game_tag(&self) -> Result<String, ApiError>;
}

/// Pulls the `detail` field out of an error body. FastAPI-style validation
/// errors carry a structured detail, which is passed through as JSON text.
pub fn extract_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// [`GameApi`] over HTTP
pub struct HttpApi {
    http: Client,
    base_url: Url,
    game_tag: String,
    /// Identifies this client until the server hands out a session cookie
    temporary_id: String,
}

impl HttpApi {
    pub fn new(base_url: &str, game_tag: &str) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, game_tag, REQUEST_TIMEOUT)
    }

    /// A stalled request fails with [`ApiError::Network`] once `timeout` passes
    pub fn with_timeout(
        base_url: &str,
        game_tag: &str,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ApiError::Network(format!("bad base url: {}", e)))?;
        let http = Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()
            .map_err(ApiError::from)?;

        Ok(Self {
            http,
            base_url,
            game_tag: game_tag.to_string(),
            temporary_id: rand::random::<f64>().to_string(),
        })
    }

    pub fn temporary_id(&self) -> &str {
        &self.temporary_id
    }

    pub fn game_tag(&self) -> &str {
        &self.game_tag
    }

    fn url(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Url, ApiError> {
        self.url_for(Some(&self.game_tag), endpoint, params)
    }

    fn url_for(
        &self,
        game_tag: Option<&str>,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<Url, ApiError> {
        let path = match game_tag {
            Some(tag) => format!("/api/{}/{}", tag, endpoint),
            None => format!("/api/{}", endpoint),
        };
        let mut url = self
            .base_url
            .join(&path)
            .map_err(|e| ApiError::Network(format!("bad endpoint {}: {}", endpoint, e)))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("temporary_id", &self.temporary_id);
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn send(&self, method: Method, url: Url) -> Result<String, ApiError> {
        debug!("{} {}", method, url.path());
        let response = self.http.request(method, url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound);
        }
        if !status.is_success() {
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                detail: extract_detail(&body),
            });
        }
        Ok(body)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        let body = self.send(Method::GET, url).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn post(&self, url: Url) -> Result<(), ApiError> {
        self.send(Method::POST, url).await.map(|_| ())
    }
}

#[async_trait]
impl GameApi for HttpApi {
    async fn state_hash(&self, known_hash: StateHash) -> Result<StateHash, ApiError> {
        let url = self.url("state_hash", &[("known_hash", known_hash.to_string())])?;
        self.get_json(url).await
    }

    async fn join(&self) -> Result<(), ApiError> {
        let url = self.url("join", &[])?;
        self.post(url).await
    }

    async fn state(&self) -> Result<StateSnapshot, ApiError> {
        let url = self.url("state", &[])?;
        self.get_json(url).await
    }

    async fn game_config(&self) -> Result<Option<GameConfig>, ApiError> {
        let url = self.url("game_config", &[])?;
        self.get_json(url).await
    }

    async fn set_game_config(&self, config: Option<&GameConfig>) -> Result<(), ApiError> {
        let encoded = serde_json::to_string(&config)?;
        let url = self.url("game_config", &[("new_config", encoded)])?;
        self.post(url).await
    }

    async fn game_config_mode(&self) -> Result<ConfigMode, ApiError> {
        let url = self.url("game_config_mode", &[])?;
        let mode: Option<ConfigMode> = self.get_json(url).await?;
        mode.ok_or_else(|| ApiError::Decode("no game mode returned".to_string()))
    }

    async fn set_game_config_mode(&self, mode: ConfigMode) -> Result<(), ApiError> {
        let url = self.url("game_config_mode", &[("new_mode", mode.as_str().to_string())])?;
        self.post(url).await
    }

    async fn submit_action(&self, request: &ActionRequest) -> Result<(), ApiError> {
        let mut params = Vec::new();
        if let Some(id) = request.selected_id {
            params.push(("selected_id", id.to_string()));
        }
        let url = self.url(&request.action, &params)?;
        self.post(url).await
    }

    async fn new_game_tag(&self) -> Result<String, ApiError> {
        let url = self.url_for(None, "get_game", &[])?;
        self.get_json(url).await
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_string_detail() {
        let body = r#"{"detail": "You can't vote for yourself"}"#;
        assert_eq!(
            extract_detail(body),
            Some("You can't vote for yourself".to_string())
        );
    }

    #[test]
    fn test_extract_structured_detail() {
        let body = r#"{"detail": [{"loc": ["query", "selected_id"], "msg": "field required"}]}"#;
        let detail = extract_detail(body).unwrap();
        assert!(detail.contains("field required"));
    }

    #[test]
    fn test_extract_detail_from_garbage() {
        assert_eq!(extract_detail("Internal Server Error"), None);
        assert_eq!(extract_detail(r#"{"message": "nope"}"#), None);
        assert_eq!(extract_detail(r#"{"detail": null}"#), None);
    }

    #[test]
    fn test_error_reason_prefers_detail() {
        let rejected = ApiError::Rejected {
            status: 400,
            detail: Some("Not your turn".to_string()),
        };
        assert_eq!(rejected.reason(), "Not your turn");
        assert!(rejected.is_validation());

        let bare = ApiError::Rejected {
            status: 503,
            detail: None,
        };
        assert_eq!(bare.reason(), "request rejected with status 503: no detail");
        assert!(!bare.is_validation());
    }

    #[test]
    fn test_urls_carry_temporary_id() {
        let api = HttpApi::new("http://127.0.0.1:8000", "brave-lunar-wolf").unwrap();
        let url = api
            .url("state_hash", &[("known_hash", "5".to_string())])
            .unwrap();

        assert_eq!(url.path(), "/api/brave-lunar-wolf/state_hash");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs[0].0, "temporary_id");
        assert_eq!(pairs[0].1, api.temporary_id());
        assert_eq!(pairs[1], ("known_hash".to_string(), "5".to_string()));
    }

    #[test]
    fn test_tagless_url() {
        let api = HttpApi::new("http://127.0.0.1:8000", "brave-lunar-wolf").unwrap();
        let url = api.url_for(None, "get_game", &[]).unwrap();
        assert_eq!(url.path(), "/api/get_game");
    }

    #[tokio::test]
    async fn test_stalled_server_times_out() {
        // Accepts connections but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let api = HttpApi::with_timeout(
            &format!("http://{}", addr),
            "brave-lunar-wolf",
            Duration::from_millis(200),
        )
        .unwrap();

        let started = std::time::Instant::now();
        let result = api.state_hash(StateHash(0)).await;
        assert!(matches!(result, Err(ApiError::Network(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_bad_base_url() {
        assert!(matches!(
            HttpApi::new("not a url", "tag"),
            Err(ApiError::Network(_))
        ));
    }
}
