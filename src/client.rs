use crate::error::app_error::AppError;
use crate::models::session::{Session, SessionResponse};
use crate::polling::extension::QueueSource;
use reqwest::Client;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin HTTP client over the public session endpoints.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let client = Client::builder()
            .use_rustls_tls()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::http("failed to build http client", e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn queue_url(&self) -> String {
        format!("{}/sessions/queue", self.base_url)
    }

    pub async fn waiting_sessions(&self) -> Result<Vec<Session>, AppError> {
        let url = self.queue_url();
        let responses: Vec<SessionResponse> = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| AppError::http(format!("GET {}", url), e))?
            .json()
            .await
            .map_err(|e| AppError::http(format!("decoding {}", url), e))?;

        responses.into_iter().map(Session::try_from).collect()
    }
}

#[async_trait::async_trait]
impl QueueSource for ApiClient {
    async fn waiting(&self) -> Result<Vec<Session>, AppError> {
        self.waiting_sessions().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_url_ignores_trailing_slash() {
        let client = ApiClient::new("http://127.0.0.1:8000/api/").unwrap();
        assert_eq!(client.queue_url(), "http://127.0.0.1:8000/api/sessions/queue");
    }

    #[tokio::test]
    async fn unreachable_api_is_a_transient_error() {
        let client = ApiClient::new("http://127.0.0.1:9").unwrap();
        let err = client.waiting_sessions().await.unwrap_err();
        assert!(matches!(err, AppError::Http { .. }));
        assert!(err.is_transient());
    }
}
