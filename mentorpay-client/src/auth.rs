//! Auth session state and the bounded refresh policy.
//!
//! The token + profile snapshot mirrors what the browser client keeps in
//! local storage: set on sign-in, replaced on refresh, cleared on logout or
//! unrecoverable auth failure. On a 401 the policy is exactly one
//! refresh-and-replay — never a loop.

use serde::Deserialize;
use std::future::Future;
use std::sync::{Arc, RwLock};

use mentorpay_core::models::{Role, User};

use crate::gateway::{ApiClient, GatewayError};

// ============================================================================
// TokenStore
// ============================================================================

#[derive(Debug, Clone, Default)]
struct AuthSnapshot {
    token: Option<String>,
    profile: Option<User>,
}

/// Shared snapshot of the bearer token and signed-in user profile.
#[derive(Debug, Default)]
pub struct TokenStore {
    inner: RwLock<AuthSnapshot>,
}

impl TokenStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn bearer(&self) -> Option<String> {
        self.read().token.clone()
    }

    pub fn profile(&self) -> Option<User> {
        self.read().profile.clone()
    }

    pub fn set_token(&self, token: String) {
        self.write().token = Some(token);
    }

    pub fn set_profile(&self, profile: User) {
        self.write().profile = Some(profile);
    }

    /// Cleared on logout and on unrecoverable auth failure.
    pub fn clear(&self) {
        let mut inner = self.write();
        inner.token = None;
        inner.profile = None;
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, AuthSnapshot> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, AuthSnapshot> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

// ============================================================================
// AuthSession
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JwtResponse {
    #[serde(alias = "accessToken")]
    token: String,
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AuthSession {
    client: Arc<ApiClient>,
}

impl AuthSession {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    fn tokens(&self) -> &Arc<TokenStore> {
        self.client.tokens()
    }

    /// `POST /api/auth/signin` — stores the token and a profile snapshot.
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<User, GatewayError> {
        let body = serde_json::json!({ "username": username, "password": password });
        let value = self.client.post("/api/auth/signin", Some(&body)).await?;
        let jwt: JwtResponse =
            serde_json::from_value(value).map_err(|e| GatewayError::Api {
                status: 200,
                message: format!("unexpected sign-in response: {}", e),
            })?;

        let profile = User {
            id: jwt.id.unwrap_or_default(),
            username: jwt.username.clone(),
            email: jwt.email.clone(),
            roles: jwt.roles.iter().cloned().map(Role::Name).collect(),
            ..User::default()
        };

        self.tokens().set_token(jwt.token);
        self.tokens().set_profile(profile.clone());
        tracing::info!(username = username, "signed in");
        Ok(profile)
    }

    /// `GET /api/auth/refresh-token` — replaces the stored token.
    pub async fn refresh_token(&self) -> Result<(), GatewayError> {
        let value = self.client.get("/api/auth/refresh-token").await?;
        let token = value
            .get("token")
            .or_else(|| value.get("accessToken"))
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| GatewayError::Api {
                status: 200,
                message: "refresh response carried no token".to_string(),
            })?;
        self.tokens().set_token(token.to_string());
        tracing::debug!("auth token refreshed");
        Ok(())
    }

    pub fn sign_out(&self) {
        self.tokens().clear();
        tracing::info!("signed out");
    }

    /// Run a gateway call with the bounded auth-retry policy: on
    /// `Unauthorized`, attempt exactly one token refresh and replay the
    /// call once. A failed refresh, or a second 401, clears the stored
    /// session and surfaces `Unauthorized` — no further retry.
    pub async fn with_auth_retry<T, F, Fut>(&self, op: F) -> Result<T, GatewayError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        match op().await {
            Err(GatewayError::Unauthorized { .. }) => {
                tracing::info!("401 received, attempting one token refresh");
                if self.refresh_token().await.is_err() {
                    self.tokens().clear();
                    return Err(GatewayError::Unauthorized {
                        message: "session expired — please sign in again".to_string(),
                    });
                }
                match op().await {
                    Err(GatewayError::Unauthorized { message }) => {
                        self.tokens().clear();
                        Err(GatewayError::Unauthorized { message })
                    }
                    other => other,
                }
            }
            other => other,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn session_for(server: &MockServer) -> AuthSession {
        let client =
            ApiClient::with_base_url(server.uri(), TokenStore::new()).expect("client builds");
        AuthSession::new(Arc::new(client))
    }

    #[tokio::test]
    async fn test_sign_in_stores_token_and_profile() {
        let server = MockServer::start().await;
        let auth = session_for(&server).await;

        Mock::given(method("POST"))
            .and(path("/api/auth/signin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "jwt-abc",
                "id": 1,
                "username": "admin",
                "email": "admin@edtech.example",
                "roles": ["ROLE_ADMIN"]
            })))
            .mount(&server)
            .await;

        let profile = auth.sign_in("admin", "secret").await.expect("sign-in works");
        assert_eq!(profile.username.as_deref(), Some("admin"));
        assert_eq!(auth.client().tokens().bearer().as_deref(), Some("jwt-abc"));
        assert!(!profile.is_mentor());
    }

    #[tokio::test]
    async fn test_refresh_then_replay_exactly_once() {
        let server = MockServer::start().await;
        let auth = session_for(&server).await;
        auth.client().tokens().set_token("stale".to_string());

        // First sessions call 401s, then refresh succeeds, replay succeeds.
        Mock::given(method("GET"))
            .and(path("/api/sessions"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/auth/refresh-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "fresh"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"ok": true}])))
            .mount(&server)
            .await;

        let calls = AtomicUsize::new(0);
        let client = auth.client().clone();
        let result = auth
            .with_auth_retry(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                let client = client.clone();
                async move { client.get("/api/sessions").await }
            })
            .await
            .expect("replay should succeed");

        assert_eq!(calls.load(Ordering::SeqCst), 2, "original + one replay");
        assert!(result.is_array());
        assert_eq!(auth.client().tokens().bearer().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_second_401_surfaces_without_further_retry() {
        let server = MockServer::start().await;
        let auth = session_for(&server).await;
        auth.client().tokens().set_token("stale".to_string());

        Mock::given(method("GET"))
            .and(path("/api/payments"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "nope"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/auth/refresh-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "fresh"})))
            .mount(&server)
            .await;

        let calls = AtomicUsize::new(0);
        let client = auth.client().clone();
        let err = auth
            .with_auth_retry(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                let client = client.clone();
                async move { client.get("/api/payments").await }
            })
            .await
            .expect_err("second 401 must surface");

        assert_eq!(calls.load(Ordering::SeqCst), 2, "no third attempt");
        assert!(err.is_unauthorized());
        assert!(auth.client().tokens().bearer().is_none(), "session cleared");
    }

    #[tokio::test]
    async fn test_failed_refresh_surfaces_session_expired() {
        let server = MockServer::start().await;
        let auth = session_for(&server).await;
        auth.client().tokens().set_token("stale".to_string());

        Mock::given(method("GET"))
            .and(path("/api/sessions"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/auth/refresh-token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = auth.client().clone();
        let err = auth
            .with_auth_retry(|| {
                let client = client.clone();
                async move { client.get("/api/sessions").await }
            })
            .await
            .expect_err("must fail");

        match err {
            GatewayError::Unauthorized { message } => {
                assert!(message.contains("session expired"), "got: {}", message)
            }
            other => panic!("expected Unauthorized, got {:?}", other),
        }
        assert!(auth.client().tokens().bearer().is_none());
    }

    #[tokio::test]
    async fn test_non_auth_errors_pass_through_untouched() {
        let server = MockServer::start().await;
        let auth = session_for(&server).await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "boom"})))
            .mount(&server)
            .await;

        let calls = AtomicUsize::new(0);
        let client = auth.client().clone();
        let err = auth
            .with_auth_retry(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                let client = client.clone();
                async move { client.get("/api/sessions").await }
            })
            .await
            .expect_err("must fail");

        assert_eq!(calls.load(Ordering::SeqCst), 1, "no retry for non-auth errors");
        assert!(matches!(err, GatewayError::Api { status: 500, .. }));
    }
}
