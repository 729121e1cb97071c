use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use media_sync_config::CredentialStore;
use reqwest::header::{HeaderName, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::TraktError;
use crate::trakt::retry::Sleeper;
use crate::trakt::transport::{ApiRequest, ApiResponse, Transport};

const REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";
const API_VERSION: &str = "2";

/// Answer to `POST /oauth/device/code`.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCode {
    pub device_code: String,
    pub user_code: String,
    pub verification_url: String,
    /// Seconds until `device_code` stops being accepted
    pub expires_in: u64,
    /// Seconds to wait between token polls
    pub interval: u64,
}

/// Confirms a device code out of band, the way a user would in a browser.
#[async_trait]
pub trait DeviceActivator: Send + Sync {
    async fn activate(&self, code: &DeviceCode) -> Result<(), TraktError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenState {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl TokenState {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

impl TryFrom<TokenResponse> for TokenState {
    type Error = TraktError;

    fn try_from(response: TokenResponse) -> Result<Self, Self::Error> {
        let expires_at = response
            .created_at
            .checked_add(response.expires_in)
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .ok_or_else(|| TraktError::Auth("token expiry out of range".to_string()))?;
        Ok(Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at,
        })
    }
}

/// Outermost layer: obtains and refreshes the OAuth token, then decorates
/// every request with the headers Trakt requires.
///
/// The token lives behind an async mutex held across acquisition, so
/// concurrent first requests run the device flow once and the others reuse
/// its result.
pub struct AuthTransport {
    inner: Arc<dyn Transport>,
    activator: Arc<dyn DeviceActivator>,
    sleeper: Arc<dyn Sleeper>,
    client_id: String,
    client_secret: String,
    credentials_file: Option<PathBuf>,
    token: Mutex<Option<TokenState>>,
}

impl AuthTransport {
    pub fn new(
        inner: Arc<dyn Transport>,
        activator: Arc<dyn DeviceActivator>,
        sleeper: Arc<dyn Sleeper>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            inner,
            activator,
            sleeper,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            credentials_file: None,
            token: Mutex::new(None),
        }
    }

    /// Load the token pair from, and save new pairs to, a credentials file
    pub fn with_credentials_file(mut self, path: PathBuf) -> Self {
        self.credentials_file = Some(path);
        self
    }

    /// Start from a known token instead of running the device flow
    pub fn with_token(self, token: TokenState) -> Self {
        Self {
            token: Mutex::new(Some(token)),
            ..self
        }
    }

    async fn access_token(&self) -> Result<String, TraktError> {
        let mut guard = self.token.lock().await;
        let now = Utc::now();

        let state = match guard.as_ref() {
            Some(state) if !state.is_expired(now) => return Ok(state.access_token.clone()),
            Some(state) => {
                info!(expires_at = %state.expires_at, "Trakt access token expired, refreshing");
                let refresh_token = state.refresh_token.clone();
                self.refresh(&refresh_token).await?
            }
            None => self.initial_token(now).await?,
        };

        self.persist(&state);
        let access_token = state.access_token.clone();
        *guard = Some(state);
        Ok(access_token)
    }

    async fn initial_token(&self, now: DateTime<Utc>) -> Result<TokenState, TraktError> {
        let Some(stored) = self.load_stored() else {
            return self.device_flow().await;
        };

        if !stored.is_expired(now) {
            debug!(expires_at = %stored.expires_at, "Using stored Trakt access token");
            return Ok(stored);
        }

        info!(expires_at = %stored.expires_at, "Stored Trakt access token expired, refreshing");
        match self.refresh(&stored.refresh_token).await {
            Ok(state) => Ok(state),
            Err(e) => {
                warn!(error = %e, "Refreshing stored Trakt token failed, starting device flow");
                self.device_flow().await
            }
        }
    }

    async fn device_flow(&self) -> Result<TokenState, TraktError> {
        let mut request = ApiRequest::post("/oauth/device/code")
            .json(&serde_json::json!({ "client_id": self.client_id }))?;
        let code: DeviceCode = self
            .inner
            .send(&mut request)
            .await?
            .expect(&[StatusCode::OK])?
            .json()?;

        info!(
            verification_url = %code.verification_url,
            expires_in = code.expires_in,
            "Activating Trakt device code"
        );
        self.activator.activate(&code).await?;

        let interval = Duration::from_secs(code.interval.max(1));
        let mut waited = Duration::ZERO;
        loop {
            let mut request = ApiRequest::post("/oauth/device/token").json(&serde_json::json!({
                "code": code.device_code,
                "client_id": self.client_id,
                "client_secret": self.client_secret,
            }))?;
            let response = self.inner.send(&mut request).await?;

            match response.status.as_u16() {
                200 => {
                    info!("Authenticated to Trakt");
                    return token_from(response);
                }
                400 => {
                    if waited >= Duration::from_secs(code.expires_in) {
                        return Err(TraktError::Auth(
                            "device code expired before it was authorized".to_string(),
                        ));
                    }
                    debug!("Device authorization pending");
                    self.sleeper.sleep(interval).await?;
                    waited += interval;
                }
                404 => return Err(TraktError::Auth("invalid device code".to_string())),
                409 => return Err(TraktError::Auth("device code already used".to_string())),
                410 => return Err(TraktError::Auth("device code expired".to_string())),
                418 => return Err(TraktError::Auth("device authorization denied".to_string())),
                _ => {
                    return Err(TraktError::UnexpectedStatusCode {
                        got: response.status,
                        want: vec![StatusCode::OK],
                    })
                }
            }
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenState, TraktError> {
        let mut request = ApiRequest::post("/oauth/device/token").json(&serde_json::json!({
            "refresh_token": refresh_token,
            "client_id": self.client_id,
            "client_secret": self.client_secret,
            "redirect_uri": REDIRECT_URI,
            "grant_type": "refresh_token",
        }))?;
        let response = self.inner.send(&mut request).await?.expect(&[StatusCode::OK])?;
        token_from(response)
    }

    fn load_stored(&self) -> Option<TokenState> {
        let path = self.credentials_file.as_ref()?;
        let mut store = CredentialStore::new(path.clone());
        if let Err(e) = store.load() {
            warn!(error = %e, path = %path.display(), "Failed to read credentials file");
            return None;
        }
        Some(TokenState {
            access_token: store.get_trakt_access_token()?.clone(),
            refresh_token: store.get_trakt_refresh_token()?.clone(),
            expires_at: store.get_trakt_token_expires()?,
        })
    }

    fn persist(&self, state: &TokenState) {
        let Some(path) = self.credentials_file.as_ref() else {
            return;
        };
        let mut store = CredentialStore::new(path.clone());
        let result = store.load().and_then(|_| {
            store.set_trakt_access_token(state.access_token.clone());
            store.set_trakt_refresh_token(state.refresh_token.clone());
            store.set_trakt_token_expires(state.expires_at);
            store.save()
        });
        // Losing the token only costs a device flow on the next run
        if let Err(e) = result {
            warn!(error = %e, path = %path.display(), "Failed to save Trakt token");
        }
    }
}

fn token_from(response: ApiResponse) -> Result<TokenState, TraktError> {
    response.json::<TokenResponse>()?.try_into()
}

#[async_trait]
impl Transport for AuthTransport {
    async fn send(&self, request: &mut ApiRequest) -> Result<ApiResponse, TraktError> {
        let access_token = self.access_token().await?;

        request.set_header(AUTHORIZATION, &format!("Bearer {}", access_token))?;
        request.set_header(HeaderName::from_static("trakt-api-key"), &self.client_id)?;
        request.set_header(HeaderName::from_static("trakt-api-version"), API_VERSION)?;
        request.set_header(CONTENT_TYPE, "application/json")?;

        self.inner.send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::io::Read;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    /// Routes by path: answers the OAuth endpoints from a script and records
    /// every other request.
    struct FakeTrakt {
        token_responses: StdMutex<Vec<(u16, serde_json::Value)>>,
        device_code_calls: AtomicUsize,
        token_bodies: StdMutex<Vec<serde_json::Value>>,
        forwarded: StdMutex<Vec<ApiRequest>>,
    }

    impl FakeTrakt {
        fn new(token_responses: Vec<(u16, serde_json::Value)>) -> Arc<Self> {
            Arc::new(Self {
                token_responses: StdMutex::new(token_responses),
                device_code_calls: AtomicUsize::new(0),
                token_bodies: StdMutex::new(Vec::new()),
                forwarded: StdMutex::new(Vec::new()),
            })
        }
    }

    fn body_json(request: &mut ApiRequest) -> serde_json::Value {
        let mut buf = Vec::new();
        if let Some(body) = request.body.as_mut() {
            body.read_to_end(&mut buf).unwrap();
        }
        serde_json::from_slice(&buf).unwrap()
    }

    fn json_response(status: u16, value: serde_json::Value) -> ApiResponse {
        ApiResponse::new(
            StatusCode::from_u16(status).unwrap(),
            Bytes::from(serde_json::to_vec(&value).unwrap()),
        )
    }

    fn token_json(access: &str) -> serde_json::Value {
        serde_json::json!({
            "access_token": access,
            "refresh_token": format!("{}-refresh", access),
            "expires_in": 7776000,
            "created_at": Utc::now().timestamp(),
            "token_type": "bearer",
            "scope": "public",
        })
    }

    #[async_trait]
    impl Transport for FakeTrakt {
        async fn send(&self, request: &mut ApiRequest) -> Result<ApiResponse, TraktError> {
            match request.path.as_str() {
                "/oauth/device/code" => {
                    self.device_code_calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json_response(
                        200,
                        serde_json::json!({
                            "device_code": "device-123",
                            "user_code": "ABCD1234",
                            "verification_url": "https://trakt.tv/activate",
                            "expires_in": 600,
                            "interval": 5,
                        }),
                    ))
                }
                "/oauth/device/token" => {
                    self.token_bodies.lock().unwrap().push(body_json(request));
                    let (status, value) = self.token_responses.lock().unwrap().remove(0);
                    Ok(json_response(status, value))
                }
                _ => {
                    self.forwarded.lock().unwrap().push(request.clone());
                    Ok(json_response(200, serde_json::json!([])))
                }
            }
        }
    }

    #[derive(Default)]
    struct CountingActivator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DeviceActivator for CountingActivator {
        async fn activate(&self, code: &DeviceCode) -> Result<(), TraktError> {
            assert_eq!(code.user_code, "ABCD1234");
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSleeper {
        sleeps: StdMutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) -> Result<(), TraktError> {
            self.sleeps.lock().unwrap().push(duration);
            Ok(())
        }
    }

    fn auth_transport(
        inner: Arc<FakeTrakt>,
        activator: Arc<CountingActivator>,
        sleeper: Arc<RecordingSleeper>,
    ) -> AuthTransport {
        AuthTransport::new(inner, activator, sleeper, "client-id", "client-secret")
    }

    #[test]
    fn test_token_expiry_overflow_is_an_auth_error() {
        let response = TokenResponse {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_in: i64::MAX,
            created_at: 1_700_000_000,
        };
        assert!(matches!(TokenState::try_from(response), Err(TraktError::Auth(_))));

        let response = TokenResponse {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_in: 7_776_000,
            created_at: 1_700_000_000,
        };
        let state = TokenState::try_from(response).unwrap();
        assert_eq!(state.expires_at.timestamp(), 1_707_776_000);
    }

    #[tokio::test]
    async fn test_device_flow_polls_until_authorized() {
        let inner = FakeTrakt::new(vec![
            (400, serde_json::json!({})),
            (400, serde_json::json!({})),
            (200, token_json("access-1")),
        ]);
        let activator = Arc::new(CountingActivator::default());
        let sleeper = Arc::new(RecordingSleeper::default());
        let transport = auth_transport(inner.clone(), activator.clone(), sleeper.clone());

        let mut request = ApiRequest::get("/sync/watchlist");
        transport.send(&mut request).await.unwrap();

        assert_eq!(activator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*sleeper.sleeps.lock().unwrap(), vec![Duration::from_secs(5); 2]);
        let bodies = inner.token_bodies.lock().unwrap();
        assert_eq!(bodies[0]["code"], "device-123");
        assert_eq!(bodies[0]["client_secret"], "client-secret");
    }

    #[tokio::test]
    async fn test_forwarded_requests_carry_trakt_headers() {
        let inner = FakeTrakt::new(vec![(200, token_json("access-1"))]);
        let transport = auth_transport(
            inner.clone(),
            Arc::new(CountingActivator::default()),
            Arc::new(RecordingSleeper::default()),
        );

        let mut request = ApiRequest::get("/sync/ratings");
        transport.send(&mut request).await.unwrap();

        let forwarded = inner.forwarded.lock().unwrap();
        let headers = &forwarded[0].headers;
        assert_eq!(headers.get("authorization").unwrap(), "Bearer access-1");
        assert_eq!(headers.get("trakt-api-key").unwrap(), "client-id");
        assert_eq!(headers.get("trakt-api-version").unwrap(), "2");
        assert_eq!(headers.get("content-type").unwrap(), "application/json");
    }

    #[tokio::test]
    async fn test_concurrent_first_requests_run_one_device_flow() {
        let inner = FakeTrakt::new(vec![(200, token_json("access-1"))]);
        let activator = Arc::new(CountingActivator::default());
        let transport = Arc::new(auth_transport(
            inner.clone(),
            activator.clone(),
            Arc::new(RecordingSleeper::default()),
        ));

        let calls = (0..4).map(|_| {
            let transport = transport.clone();
            async move {
                let mut request = ApiRequest::get("/sync/watchlist");
                transport.send(&mut request).await
            }
        });
        let results = futures::future::join_all(calls).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(activator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(inner.device_code_calls.load(Ordering::SeqCst), 1);
        assert_eq!(inner.forwarded.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_once() {
        let inner = FakeTrakt::new(vec![(200, token_json("access-2"))]);
        let activator = Arc::new(CountingActivator::default());
        let transport = auth_transport(
            inner.clone(),
            activator.clone(),
            Arc::new(RecordingSleeper::default()),
        )
        .with_token(TokenState {
            access_token: "access-1".to_string(),
            refresh_token: "refresh-1".to_string(),
            expires_at: Utc::now() - chrono::Duration::hours(1),
        });

        for _ in 0..2 {
            let mut request = ApiRequest::get("/sync/ratings");
            transport.send(&mut request).await.unwrap();
        }

        assert_eq!(activator.calls.load(Ordering::SeqCst), 0);
        let bodies = inner.token_bodies.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["grant_type"], "refresh_token");
        assert_eq!(bodies[0]["refresh_token"], "refresh-1");
        assert_eq!(bodies[0]["redirect_uri"], REDIRECT_URI);

        let forwarded = inner.forwarded.lock().unwrap();
        assert!(forwarded
            .iter()
            .all(|r| r.headers.get("authorization").unwrap() == "Bearer access-2"));
    }

    #[tokio::test]
    async fn test_terminal_poll_status_fails() {
        let inner = FakeTrakt::new(vec![(418, serde_json::json!({}))]);
        let transport = auth_transport(
            inner.clone(),
            Arc::new(CountingActivator::default()),
            Arc::new(RecordingSleeper::default()),
        );

        let mut request = ApiRequest::get("/sync/watchlist");
        let result = transport.send(&mut request).await;
        assert!(matches!(result, Err(TraktError::Auth(_))));
        assert!(inner.forwarded.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stored_token_refresh_failure_falls_back_to_device_flow() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.toml");
        let mut store = CredentialStore::new(path.clone());
        store.set_trakt_access_token("old-access".to_string());
        store.set_trakt_refresh_token("old-refresh".to_string());
        store.set_trakt_token_expires(Utc::now() - chrono::Duration::days(1));
        store.save().unwrap();

        let inner = FakeTrakt::new(vec![
            (401, serde_json::json!({})),
            (200, token_json("fresh")),
        ]);
        let activator = Arc::new(CountingActivator::default());
        let transport = auth_transport(
            inner.clone(),
            activator.clone(),
            Arc::new(RecordingSleeper::default()),
        )
        .with_credentials_file(path.clone());

        let mut request = ApiRequest::get("/sync/watchlist");
        transport.send(&mut request).await.unwrap();

        assert_eq!(activator.calls.load(Ordering::SeqCst), 1);
        let mut reloaded = CredentialStore::new(path);
        reloaded.load().unwrap();
        assert_eq!(reloaded.get_trakt_access_token(), Some(&"fresh".to_string()));
        assert_eq!(reloaded.get_trakt_refresh_token(), Some(&"fresh-refresh".to_string()));
    }

    #[tokio::test]
    async fn test_valid_stored_token_skips_device_flow() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.toml");
        let mut store = CredentialStore::new(path.clone());
        store.set_trakt_access_token("stored".to_string());
        store.set_trakt_refresh_token("stored-refresh".to_string());
        store.set_trakt_token_expires(Utc::now() + chrono::Duration::days(30));
        store.save().unwrap();

        let inner = FakeTrakt::new(vec![]);
        let activator = Arc::new(CountingActivator::default());
        let transport = auth_transport(
            inner.clone(),
            activator.clone(),
            Arc::new(RecordingSleeper::default()),
        )
        .with_credentials_file(path);

        let mut request = ApiRequest::get("/sync/ratings");
        transport.send(&mut request).await.unwrap();

        assert_eq!(activator.calls.load(Ordering::SeqCst), 0);
        assert_eq!(inner.device_code_calls.load(Ordering::SeqCst), 0);
        let forwarded = inner.forwarded.lock().unwrap();
        assert_eq!(forwarded[0].headers.get("authorization").unwrap(), "Bearer stored");
    }
}
