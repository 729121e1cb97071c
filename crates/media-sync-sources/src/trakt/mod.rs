pub mod api;
pub mod auth;
pub mod browser;
pub mod client;
pub mod retry;
pub mod transport;

pub use auth::{AuthTransport, DeviceActivator, DeviceCode, TokenState};
pub use browser::BrowserActivator;
pub use client::TraktClient;
pub use retry::{RetryPolicy, RetryTransport, Sleeper, TokioSleeper};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, RewindableBody, Transport, TRAKT_API_URL};

use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything needed to assemble the Trakt transport stack.
pub struct TransportSettings {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Where the token pair is persisted between runs
    pub credentials_file: Option<PathBuf>,
    pub cancel: CancellationToken,
}

/// Build `AuthTransport -> RetryTransport -> HttpTransport`.
pub fn build_transport(settings: TransportSettings, activator: Arc<dyn DeviceActivator>) -> Arc<dyn Transport> {
    let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper::new(settings.cancel.clone()));
    let http: Arc<dyn Transport> = Arc::new(HttpTransport::new(settings.base_url, settings.cancel));
    let retry: Arc<dyn Transport> = Arc::new(RetryTransport::new(http, sleeper.clone()));

    let mut auth = AuthTransport::new(
        retry,
        activator,
        sleeper,
        settings.client_id,
        settings.client_secret,
    );
    if let Some(path) = settings.credentials_file {
        auth = auth.with_credentials_file(path);
    }
    Arc::new(auth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TraktError;
    use crate::traits::TargetProvider;
    use async_trait::async_trait;
    use chrono::Utc;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct NoActivation;

    #[async_trait]
    impl DeviceActivator for NoActivation {
        async fn activate(&self, _code: &DeviceCode) -> Result<(), TraktError> {
            Err(TraktError::Auth("activation not expected".to_string()))
        }
    }

    #[tokio::test]
    async fn test_assembled_stack_uses_stored_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sync/ratings"))
            .and(header("authorization", "Bearer stored-token"))
            .and(header("trakt-api-key", "client-id"))
            .and(header("trakt-api-version", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let credentials_file = dir.path().join("credentials.toml");
        let mut store = media_sync_config::CredentialStore::new(credentials_file.clone());
        store.set_trakt_access_token("stored-token".to_string());
        store.set_trakt_refresh_token("stored-refresh".to_string());
        store.set_trakt_token_expires(Utc::now() + chrono::Duration::days(7));
        store.save().unwrap();

        let transport = build_transport(
            TransportSettings {
                base_url: server.uri(),
                client_id: "client-id".to_string(),
                client_secret: "client-secret".to_string(),
                credentials_file: Some(credentials_file),
                cancel: CancellationToken::new(),
            },
            Arc::new(NoActivation),
        );

        let ratings = TraktClient::new(transport).ratings_get().await.unwrap();
        assert!(ratings.is_empty());
    }
}
