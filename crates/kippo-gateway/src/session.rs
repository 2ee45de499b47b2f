//! Session lifecycle on top of the gateway
//!
//! Login exchanges a username/password for a token pair. Bootstrap recovers a
//! signed-in user at startup, preferring a server-side session cookie and
//! falling back to stored tokens. All calls go through `Gateway::execute`, so
//! they share its header handling and refresh behavior.

use common::Secret;
use kippo_auth::{
    CURRENT_USER_PATH, CurrentUser, TOKEN_FROM_SESSION_PATH, TOKEN_OBTAIN_PATH,
    TokenObtainRequest, TokenPair,
};
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::gateway::{Gateway, OutboundRequest};

/// Who is signed in and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub username: String,
    /// A bearer token is stored for API calls
    pub has_token: bool,
    /// Identity came from the server-side session cookie
    pub session_auth: bool,
}

impl Gateway {
    /// Exchange credentials for a token pair and store it with the username.
    pub async fn login(&self, username: &str, password: &Secret<String>) -> Result<SessionUser> {
        let request = OutboundRequest::post(TOKEN_OBTAIN_PATH).json(&TokenObtainRequest {
            username,
            password: password.expose(),
        })?;

        let response = match self.execute(request).await {
            Ok(response) => response,
            Err(Error::Decode(e)) => return Err(Error::LoginFailed(e)),
            Err(e) => return Err(e),
        };
        if response.status != StatusCode::OK {
            return Err(Error::LoginFailed(format!(
                "token endpoint returned {}",
                response.status
            )));
        }

        let pair = response
            .data
            .as_json()
            .and_then(TokenPair::from_json)
            .ok_or_else(|| Error::LoginFailed("token endpoint returned no access token".into()))?;

        self.store_session(&pair, Some(username)).await?;
        info!(username, "signed in");
        Ok(SessionUser {
            username: username.to_owned(),
            has_token: true,
            session_auth: false,
        })
    }

    /// Forget stored credentials. Does not navigate.
    pub async fn logout(&self) -> Result<()> {
        self.credentials().clear().await?;
        info!("signed out");
        Ok(())
    }

    /// Work out who is signed in, if anyone.
    ///
    /// Order of preference:
    /// 1. Session cookie identifies the user and can be exchanged for tokens
    /// 2. Session cookie identifies the user and tokens are already stored
    /// 3. Session cookie only (no bearer token)
    /// 4. Stored token and username from an earlier login
    pub async fn bootstrap(&self) -> Option<SessionUser> {
        if let Some(username) = self.probe_session().await {
            if let Some(pair) = self.exchange_session().await {
                match self.store_session(&pair, Some(&username)).await {
                    Ok(()) => {
                        info!(username = %username, "session exchanged for tokens");
                        return Some(SessionUser {
                            username,
                            has_token: true,
                            session_auth: true,
                        });
                    }
                    Err(e) => warn!(error = %e, "failed to store session tokens"),
                }
            }

            let has_token = self.stored(self.credentials().access_token()).await.is_some();
            debug!(username = %username, has_token, "using session identity");
            return Some(SessionUser {
                username,
                has_token,
                session_auth: true,
            });
        }

        let token = self.stored(self.credentials().access_token()).await;
        let username = self.stored(self.credentials().username()).await;
        match (token, username) {
            (Some(_), Some(username)) => Some(SessionUser {
                username,
                has_token: true,
                session_auth: false,
            }),
            _ => {
                debug!("no session");
                None
            }
        }
    }

    /// Read and clear the session-expired flag left by a redirect.
    pub async fn take_session_expired_notice(&self) -> Result<bool> {
        Ok(self.credentials().take_session_expired().await?)
    }

    async fn probe_session(&self) -> Option<String> {
        match self.execute(OutboundRequest::get(CURRENT_USER_PATH)).await {
            Ok(response) if response.status == StatusCode::OK => response
                .data
                .as_json()
                .map(CurrentUser::from_json)
                .and_then(|user| user.name().map(str::to_owned)),
            Ok(response) => {
                debug!(status = %response.status, "no server session");
                None
            }
            Err(e) => {
                debug!(error = %e, "session probe failed");
                None
            }
        }
    }

    /// Both tokens are required here, unlike login.
    async fn exchange_session(&self) -> Option<TokenPair> {
        let response = match self.execute(OutboundRequest::get(TOKEN_FROM_SESSION_PATH)).await {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, "session token exchange failed");
                return None;
            }
        };
        if response.status != StatusCode::OK {
            debug!(status = %response.status, "session token exchange refused");
            return None;
        }
        response
            .data
            .as_json()
            .and_then(TokenPair::from_json)
            .filter(|pair| pair.refresh.is_some())
    }

    async fn stored<T>(
        &self,
        read: impl std::future::Future<Output = kippo_auth::Result<Option<T>>>,
    ) -> Option<T> {
        match read.await {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "credential store unavailable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Endpoint;
    use crate::gateway::GatewayConfig;
    use crate::navigation::RecordingNavigator;
    use crate::testing::{FakeTransport, bearer, json_response, text_response};
    use kippo_auth::{
        ACCESS_TOKEN_KEY, MemoryStore, REFRESH_TOKEN_KEY, SESSION_EXPIRED_KEY, USERNAME_KEY,
    };
    use serde_json::json;
    use std::sync::Arc;

    fn gateway(
        entries: &[(&str, &str)],
        transport: FakeTransport,
    ) -> (Gateway, Arc<FakeTransport>, Arc<MemoryStore>, Arc<RecordingNavigator>) {
        let store = Arc::new(MemoryStore::with_entries(entries.iter().copied()));
        let transport = Arc::new(transport);
        let navigator = Arc::new(RecordingNavigator::new());
        let gateway = Gateway::new(
            GatewayConfig::new(Endpoint::absolute("http://api.test").unwrap()),
            transport.clone(),
            store.clone(),
            navigator.clone(),
        )
        .unwrap();
        (gateway, transport, store, navigator)
    }

    #[tokio::test]
    async fn login_stores_pair_and_username() {
        let transport = FakeTransport::new(|req| {
            let body: serde_json::Value = serde_json::from_slice(req.body.as_deref().unwrap()).unwrap();
            if body["password"] == "hunter2" {
                json_response(200, json!({"access": "A1", "refresh": "R1"}))
            } else {
                json_response(401, json!({"detail": "No active account"}))
            }
        });
        let (gateway, transport, store, _) = gateway(&[], transport);

        let user = gateway
            .login("tanaka", &Secret::from("hunter2"))
            .await
            .unwrap();
        assert_eq!(user.username, "tanaka");

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot[ACCESS_TOKEN_KEY], "A1");
        assert_eq!(snapshot[REFRESH_TOKEN_KEY], "R1");
        assert_eq!(snapshot[USERNAME_KEY], "tanaka");
        assert_eq!(transport.requests()[0].url, "http://api.test/api/token/");
    }

    #[tokio::test]
    async fn rejected_login_is_an_error_without_redirect() {
        let transport = FakeTransport::new(|_| json_response(401, json!({"detail": "No active account"})));
        let (gateway, transport, store, navigator) = gateway(&[], transport);

        let result = gateway.login("tanaka", &Secret::from("wrong")).await;

        assert!(matches!(result, Err(Error::LoginFailed(_))));
        assert!(store.snapshot().await.is_empty());
        assert_eq!(transport.refresh_calls(), 0);
        assert_eq!(navigator.count(), 0);
    }

    #[tokio::test]
    async fn login_without_access_token_fails() {
        let transport = FakeTransport::new(|_| json_response(200, json!({"refresh": "R1"})));
        let (gateway, _, _, _) = gateway(&[], transport);
        assert!(matches!(
            gateway.login("tanaka", &Secret::from("pw")).await,
            Err(Error::LoginFailed(_))
        ));
    }

    #[tokio::test]
    async fn login_rearms_redirect() {
        let transport = FakeTransport::new(|_| json_response(200, json!({"access": "A9"})));
        let (gateway, _, store, navigator) = gateway(&[(REFRESH_TOKEN_KEY, "R1")], transport);

        gateway.redirect_to_login().await;
        gateway.login("tanaka", &Secret::from("pw")).await.unwrap();
        gateway.redirect_to_login().await;

        assert_eq!(navigator.count(), 2);
        assert!(!store.snapshot().await.contains_key(ACCESS_TOKEN_KEY));
    }

    #[tokio::test]
    async fn logout_clears_credentials_without_navigation() {
        let (gateway, _, store, navigator) = gateway(
            &[(ACCESS_TOKEN_KEY, "A1"), (REFRESH_TOKEN_KEY, "R1"), (USERNAME_KEY, "tanaka")],
            FakeTransport::new(|_| text_response(200, "")),
        );

        gateway.logout().await.unwrap();

        assert!(store.snapshot().await.is_empty());
        assert_eq!(navigator.count(), 0);
    }

    #[tokio::test]
    async fn bootstrap_exchanges_session_cookie_for_tokens() {
        let transport = FakeTransport::new(|req| {
            if req.url.ends_with(CURRENT_USER_PATH) {
                json_response(200, json!({"username": "suzuki"}))
            } else if req.url.ends_with(TOKEN_FROM_SESSION_PATH) {
                json_response(200, json!({"access": "SA", "refresh": "SR"}))
            } else {
                text_response(404, "")
            }
        });
        let (gateway, transport, store, _) = gateway(&[], transport);

        let user = gateway.bootstrap().await.unwrap();

        assert_eq!(
            user,
            SessionUser {
                username: "suzuki".into(),
                has_token: true,
                session_auth: true,
            }
        );
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot[ACCESS_TOKEN_KEY], "SA");
        assert_eq!(snapshot[REFRESH_TOKEN_KEY], "SR");
        assert_eq!(snapshot[USERNAME_KEY], "suzuki");
        assert!(bearer(&transport.requests()[0]).is_none());
    }

    #[tokio::test]
    async fn bootstrap_keeps_existing_token_when_exchange_is_incomplete() {
        let transport = FakeTransport::new(|req| {
            if req.url.ends_with(CURRENT_USER_PATH) {
                json_response(200, json!({"username": "suzuki"}))
            } else {
                json_response(200, json!({"access": "SA"}))
            }
        });
        let (gateway, _, store, _) = gateway(&[(ACCESS_TOKEN_KEY, "A1")], transport);

        let user = gateway.bootstrap().await.unwrap();

        assert!(user.has_token);
        assert!(user.session_auth);
        assert_eq!(store.snapshot().await[ACCESS_TOKEN_KEY], "A1");
    }

    #[tokio::test]
    async fn bootstrap_session_only_user() {
        let transport = FakeTransport::new(|req| {
            if req.url.ends_with(CURRENT_USER_PATH) {
                json_response(200, json!({"username": "suzuki"}))
            } else {
                json_response(500, json!({}))
            }
        });
        let (gateway, _, _, _) = gateway(&[], transport);

        let user = gateway.bootstrap().await.unwrap();
        assert_eq!(user.username, "suzuki");
        assert!(!user.has_token);
    }

    #[tokio::test]
    async fn bootstrap_falls_back_to_stored_login() {
        let transport = FakeTransport::new(|_| Err(Error::Transport("offline".into())));
        let (gateway, _, _, _) = gateway(
            &[(ACCESS_TOKEN_KEY, "A1"), (USERNAME_KEY, "tanaka")],
            transport,
        );

        let user = gateway.bootstrap().await.unwrap();
        assert_eq!(
            user,
            SessionUser {
                username: "tanaka".into(),
                has_token: true,
                session_auth: false,
            }
        );
    }

    #[tokio::test]
    async fn bootstrap_without_anything_is_signed_out() {
        let transport = FakeTransport::new(|_| json_response(403, json!({"detail": "not authenticated"})));
        let (gateway, _, _, _) = gateway(&[(ACCESS_TOKEN_KEY, "A1")], transport);

        assert!(gateway.bootstrap().await.is_none());
    }

    #[tokio::test]
    async fn session_expired_notice_is_shown_once() {
        let (gateway, _, store, _) = gateway(
            &[(ACCESS_TOKEN_KEY, "A1")],
            FakeTransport::new(|_| text_response(200, "")),
        );

        gateway.redirect_to_login().await;
        assert_eq!(store.snapshot().await[SESSION_EXPIRED_KEY], "true");

        assert!(gateway.take_session_expired_notice().await.unwrap());
        assert!(!gateway.take_session_expired_notice().await.unwrap());
    }
}
