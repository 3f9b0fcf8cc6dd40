use chrono::{DateTime, Utc};
use serde::Serialize;
use subtle::ConstantTimeEq;

use super::OAuthService;
use super::error::AuthError;
use super::token::RefreshClaims;
use super::traits::{
    ClientRecord, Principal, PrincipalRecord, RefreshTokenRecord, STATUS_CLOSED,
};

/// The three grant kinds the token endpoint accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    ClientCredentials,
    Password,
    RefreshToken,
}

impl GrantType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "client_credentials" => Some(Self::ClientCredentials),
            "password" => Some(Self::Password),
            "refresh_token" => Some(Self::RefreshToken),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientCredentials => "client_credentials",
            Self::Password => "password",
            Self::RefreshToken => "refresh_token",
        }
    }
}

/// Client identity extracted from the Basic authorization header.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Raw token-request fields as the boundary extracted them.
#[derive(Debug, Clone)]
pub struct TokenParams {
    pub grant_type: GrantType,
    pub username: Option<String>,
    pub password: Option<String>,
    pub refresh_token: Option<String>,
}

impl TokenParams {
    /// Runs per-grant required-field validation without dispatching.
    pub fn validate(&self) -> Result<(), AuthError> {
        GrantRequest::from_params(self).map(|_| ())
    }
}

/// A fully validated grant. Constructed before any storage call so missing
/// fields fail fast with their documented codes.
enum GrantRequest {
    ClientCredentials,
    Password { username: String, password: String },
    RefreshToken { refresh_token: String },
}

impl GrantRequest {
    fn from_params(params: &TokenParams) -> Result<Self, AuthError> {
        match params.grant_type {
            GrantType::ClientCredentials => Ok(Self::ClientCredentials),
            GrantType::Password => {
                let username = required(&params.username, "AUTH406", "username is missing.")?;
                let password = required(&params.password, "AUTH407", "password is missing.")?;

                Ok(Self::Password { username, password })
            }
            GrantType::RefreshToken => {
                let refresh_token =
                    required(&params.refresh_token, "AUTH408", "refresh_token is missing.")?;

                Ok(Self::RefreshToken { refresh_token })
            }
        }
    }
}

fn required(
    value: &Option<String>,
    code: &'static str,
    message: &str,
) -> Result<String, AuthError> {
    match value {
        Some(value) if !value.is_empty() => Ok(value.clone()),
        _ => Err(AuthError::invalid_request(code, message)),
    }
}

/// Client summary embedded in every successful token response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClient {
    pub id: String,
    pub redirect_uris: Vec<String>,
    pub grants: Vec<&'static str>,
}

impl TokenClient {
    fn from_record(client: &ClientRecord) -> Self {
        Self {
            id: client.client_id.clone(),
            redirect_uris: client.redirect_uris.clone(),
            grants: vec!["client_credentials", "password", "refresh_token"],
        }
    }
}

/// Successful token-endpoint response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayload {
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    pub token_type: &'static str,
    pub client: TokenClient,
    pub user: Principal,
}

/// Soft result of the app-key exchange. This path never raises: callers need
/// a uniform `{is_successful, error_msg}` shape.
#[derive(Debug, Clone, Serialize)]
pub struct AppKeyExchange {
    #[serde(rename = "isSuccessful")]
    pub is_successful: bool,
    #[serde(rename = "errorMsg", skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenPayload>,
}

impl AppKeyExchange {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            is_successful: false,
            error_msg: Some(message.into()),
            token: None,
        }
    }
}

impl OAuthService {
    /// Executes one grant flow: validation, client auth, principal
    /// resolution, token issuance, refresh-token persistence.
    pub async fn issue_token(
        &self,
        credentials: &ClientCredentials,
        params: &TokenParams,
    ) -> Result<TokenPayload, AuthError> {
        let grant = GrantRequest::from_params(params)?;
        let client = self
            .resolve_client(&credentials.client_id, &credentials.client_secret)
            .await?;

        match grant {
            GrantRequest::ClientCredentials => {
                // no user behind this grant, and no refresh token either
                self.issue_for(&client, Principal::anonymous(), false).await
            }
            GrantRequest::Password { username, password } => {
                let user = self.resolve_password_user(&username, &password).await?;

                self.issue_for(&client, user, true).await
            }
            GrantRequest::RefreshToken { refresh_token } => {
                let claims = self.codec.decode_refresh(&refresh_token)?;
                let user = self.resolve_refresh_user(&claims).await?;

                // new access token only; the presented refresh token and its
                // expiry are echoed back and nothing is re-persisted
                let (access_token, access_token_expires_at) = self.codec.encode_access(
                    &client.client_id,
                    &user.id,
                    user.service_id.as_deref(),
                    user.scope.as_deref(),
                    client.access_token_lifetime,
                )?;

                tracing::info!(
                    client_id = %client.client_id,
                    user_id = %user.id,
                    "refreshed access token"
                );

                Ok(TokenPayload {
                    access_token,
                    access_token_expires_at,
                    refresh_token: Some(refresh_token),
                    refresh_token_expires_at: DateTime::from_timestamp(claims.exp, 0),
                    token_type: "bearer",
                    client: TokenClient::from_record(&client),
                    user,
                })
            }
        }
    }

    /// Exchanges an opaque app key for a token pair by re-entering the
    /// password-grant path with the stored login material.
    pub async fn exchange_app_key(
        &self,
        credentials: &ClientCredentials,
        app_key: &str,
    ) -> AppKeyExchange {
        let client = match self
            .resolve_client(&credentials.client_id, &credentials.client_secret)
            .await
        {
            Ok(client) => client,
            Err(e) => return AppKeyExchange::failure(e.to_string()),
        };

        let auth_info = match self.store.find_app_key(app_key).await {
            Ok(Some(info)) => info,
            Ok(None) => return AppKeyExchange::failure("appKey is not valid."),
            Err(e) => {
                tracing::error!("app key lookup failed: {e:#}");
                return AppKeyExchange::failure("fail to resolve appKey");
            }
        };

        let username = format!("{}/{}", auth_info.user_id, auth_info.service_id);
        let user = match self
            .resolve_password_user(&username, &auth_info.password)
            .await
        {
            Ok(user) => user,
            Err(e) => return AppKeyExchange::failure(e.to_string()),
        };

        match self.issue_for(&client, user, true).await {
            Ok(token) => AppKeyExchange {
                is_successful: true,
                error_msg: None,
                token: Some(token),
            },
            Err(e) => AppKeyExchange::failure(e.to_string()),
        }
    }

    /// Resolves and authenticates the client with a constant-time secret
    /// comparison.
    pub(super) async fn resolve_client(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<ClientRecord, AuthError> {
        let client = self
            .store
            .find_client(client_id)
            .await
            .map_err(storage_failure)?
            .ok_or_else(|| {
                AuthError::UnauthorizedClient(
                    "The client does not match: client is not exist".to_string(),
                )
            })?;

        let secret_matches: bool = client
            .client_secret
            .as_bytes()
            .ct_eq(client_secret.as_bytes())
            .into();

        if !secret_matches {
            tracing::warn!(client_id, "client secret mismatch");
            return Err(AuthError::UnauthorizedClient(
                "The client does not match: client is not match".to_string(),
            ));
        }

        Ok(client)
    }

    /// A username with exactly one `/` is `<userId>/<serviceId>` and resolves
    /// a service user; anything else resolves a platform user.
    async fn resolve_password_user(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Principal, AuthError> {
        let parts: Vec<&str> = username.split('/').collect();

        let (record, service_id) = if parts.len() == 2 {
            let record = self
                .store
                .find_service_user(parts[0], parts[1], password)
                .await
                .map_err(storage_failure)?;

            (record, Some(parts[1].to_string()))
        } else {
            let record = self
                .store
                .find_user(username, password)
                .await
                .map_err(storage_failure)?;

            (record, None)
        };

        principal_from(record, service_id)
    }

    /// Re-resolves the *current* account behind a decoded refresh token, so
    /// since-closed accounts are caught at redemption time.
    async fn resolve_refresh_user(&self, claims: &RefreshClaims) -> Result<Principal, AuthError> {
        let record = match &claims.serviceid {
            Some(service_id) => {
                self.store
                    .find_service_user_by_id(&claims.userid, service_id)
                    .await
            }
            None => self.store.find_user_by_id(&claims.userid).await,
        }
        .map_err(storage_failure)?;

        principal_from(record, claims.serviceid.clone())
    }

    /// Issues the access token (and, when requested, a persisted refresh
    /// token) for an already-resolved principal.
    async fn issue_for(
        &self,
        client: &ClientRecord,
        user: Principal,
        with_refresh: bool,
    ) -> Result<TokenPayload, AuthError> {
        let (access_token, access_token_expires_at) = self.codec.encode_access(
            &client.client_id,
            &user.id,
            user.service_id.as_deref(),
            user.scope.as_deref(),
            client.access_token_lifetime,
        )?;

        let mut refresh_token = None;
        let mut refresh_token_expires_at = None;

        if with_refresh {
            let (token, expires_at) = self.codec.encode_refresh(
                &client.client_id,
                &user.id,
                user.service_id.as_deref(),
                client.refresh_token_lifetime,
            )?;

            let saved = self
                .store
                .save_refresh_token(RefreshTokenRecord {
                    client_id: client.client_id.clone(),
                    user_id: user.id.clone(),
                    service_id: user.service_id.clone(),
                    refresh_token: token.clone(),
                })
                .await
                .map_err(|e| {
                    tracing::error!("refresh token persistence failed: {e:#}");
                    AuthError::Server("fail to save token".to_string())
                })?;

            if !saved {
                return Err(AuthError::Server("fail to save token".to_string()));
            }

            refresh_token = Some(token);
            refresh_token_expires_at = Some(expires_at);
        }

        tracing::info!(
            client_id = %client.client_id,
            user_id = %user.id,
            service_id = user.service_id.as_deref().unwrap_or(""),
            "issued access token"
        );

        Ok(TokenPayload {
            access_token,
            access_token_expires_at,
            refresh_token,
            refresh_token_expires_at,
            token_type: "bearer",
            client: TokenClient::from_record(client),
            user,
        })
    }
}

fn principal_from(
    record: Option<PrincipalRecord>,
    service_id: Option<String>,
) -> Result<Principal, AuthError> {
    let record = record.ok_or_else(AuthError::no_matched_user)?;

    if record.status == STATUS_CLOSED {
        return Err(AuthError::closed_account());
    }

    Ok(Principal {
        id: record.id,
        scope: record.role,
        service_id,
    })
}

fn storage_failure(e: anyhow::Error) -> AuthError {
    tracing::error!("credential store failure: {e:#}");
    AuthError::Server("internal storage failure".to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::Duration;

    use super::super::memory::MemoryCredentialStore;
    use super::super::token::test_clock::FixedClock;
    use super::super::traits::{AppKeyRecord, CredentialStore, PushKeyRecord};
    use super::super::{AuthConfig, OAuthService};
    use super::*;

    fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(1_555_000_000, 0).unwrap()
    }

    fn config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret".to_string(),
        }
    }

    fn client_record() -> ClientRecord {
        ClientRecord {
            client_id: "web".to_string(),
            client_secret: "s3cret".to_string(),
            access_token_lifetime: 3600,
            refresh_token_lifetime: 1_209_600,
            grants: vec![
                "client_credentials".to_string(),
                "password".to_string(),
                "refresh_token".to_string(),
            ],
            redirect_uris: vec![],
        }
    }

    fn credentials() -> ClientCredentials {
        ClientCredentials {
            client_id: "web".to_string(),
            client_secret: "s3cret".to_string(),
        }
    }

    async fn seeded_store() -> MemoryCredentialStore {
        let store = MemoryCredentialStore::new();
        store.add_client(client_record()).await;
        store
            .add_user("alice", "pw", PrincipalRecord {
                id: "alice".to_string(),
                name: "Alice".to_string(),
                role: Some("user".to_string()),
                status: "1".to_string(),
                service_id: None,
            })
            .await;
        store
            .add_service_user("bob", "SVC123", "pw", PrincipalRecord {
                id: "bob".to_string(),
                name: "Bob".to_string(),
                role: Some("member".to_string()),
                status: "1".to_string(),
                service_id: Some("SVC123".to_string()),
            })
            .await;
        store
    }

    fn service_with(store: Arc<dyn CredentialStore>, clock: Arc<FixedClock>) -> OAuthService {
        OAuthService::with_clock(config(), store, clock)
    }

    fn password_params(username: Option<&str>, password: Option<&str>) -> TokenParams {
        TokenParams {
            grant_type: GrantType::Password,
            username: username.map(str::to_string),
            password: password.map(str::to_string),
            refresh_token: None,
        }
    }

    /// Store that records how many calls it received and answers nothing.
    #[derive(Default)]
    struct SpyStore {
        calls: AtomicUsize,
    }

    impl SpyStore {
        fn count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CredentialStore for SpyStore {
        async fn find_client(&self, _client_id: &str) -> Result<Option<ClientRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }

        async fn find_user(
            &self,
            _user_id: &str,
            _password: &str,
        ) -> Result<Option<PrincipalRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }

        async fn find_service_user(
            &self,
            _user_id: &str,
            _service_id: &str,
            _password: &str,
        ) -> Result<Option<PrincipalRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }

        async fn find_user_by_id(&self, _user_id: &str) -> Result<Option<PrincipalRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }

        async fn find_service_user_by_id(
            &self,
            _user_id: &str,
            _service_id: &str,
        ) -> Result<Option<PrincipalRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }

        async fn save_refresh_token(&self, _record: RefreshTokenRecord) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }

        async fn find_app_key(&self, _app_key: &str) -> Result<Option<AppKeyRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }

        async fn save_push_key(&self, _record: PushKeyRecord) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_missing_fields_fail_before_any_store_call() {
        let spy = Arc::new(SpyStore::default());
        let service = service_with(spy.clone(), Arc::new(FixedClock::at(epoch())));

        let cases = [
            (password_params(None, Some("pw")), "AUTH406"),
            (password_params(Some("alice"), None), "AUTH407"),
            (password_params(Some(""), Some("pw")), "AUTH406"),
            (
                TokenParams {
                    grant_type: GrantType::RefreshToken,
                    username: None,
                    password: None,
                    refresh_token: None,
                },
                "AUTH408",
            ),
        ];

        for (params, expected) in cases {
            let err = service
                .issue_token(&credentials(), &params)
                .await
                .unwrap_err();

            match err {
                AuthError::InvalidRequest { code, .. } => assert_eq!(code, expected),
                other => panic!("expected InvalidRequest, got {other:?}"),
            }
        }

        assert_eq!(spy.count(), 0, "validation must precede storage");
    }

    #[tokio::test]
    async fn test_unknown_client_is_unauthorized() {
        let store = Arc::new(seeded_store().await);
        let service = service_with(store, Arc::new(FixedClock::at(epoch())));

        let err = service
            .issue_token(
                &ClientCredentials {
                    client_id: "nope".to_string(),
                    client_secret: "s3cret".to_string(),
                },
                &password_params(Some("alice"), Some("pw")),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::UnauthorizedClient(_)));
    }

    #[tokio::test]
    async fn test_wrong_client_secret_is_unauthorized() {
        let store = Arc::new(seeded_store().await);
        let service = service_with(store, Arc::new(FixedClock::at(epoch())));

        let err = service
            .issue_token(
                &ClientCredentials {
                    client_id: "web".to_string(),
                    client_secret: "wrong".to_string(),
                },
                &password_params(Some("alice"), Some("pw")),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::UnauthorizedClient(_)));
    }

    #[tokio::test]
    async fn test_password_grant_for_platform_user() {
        let store = Arc::new(seeded_store().await);
        let service = service_with(store.clone(), Arc::new(FixedClock::at(epoch())));

        let token = service
            .issue_token(&credentials(), &password_params(Some("alice"), Some("pw")))
            .await
            .unwrap();

        assert_eq!(token.token_type, "bearer");
        assert_eq!(token.user.id, "alice");
        assert_eq!(token.user.scope.as_deref(), Some("user"));
        assert_eq!(token.user.service_id, None);
        assert_eq!(
            token.access_token_expires_at.timestamp(),
            epoch().timestamp() + 3600
        );
        assert!(token.refresh_token.is_some());

        let saved = store.refresh_token_records().await;
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].user_id, "alice");
        assert_eq!(saved[0].service_id, None);

        let claims = service
            .codec()
            .decode_access(&token.access_token)
            .unwrap();
        assert_eq!(claims.userid, "alice");
        assert_eq!(claims.scope.as_deref(), Some("user"));
    }

    #[tokio::test]
    async fn test_password_grant_with_slash_resolves_service_user() {
        let store = Arc::new(seeded_store().await);
        let service = service_with(store.clone(), Arc::new(FixedClock::at(epoch())));

        let token = service
            .issue_token(
                &credentials(),
                &password_params(Some("bob/SVC123"), Some("pw")),
            )
            .await
            .unwrap();

        assert_eq!(token.user.id, "bob");
        assert_eq!(token.user.service_id.as_deref(), Some("SVC123"));

        let saved = store.refresh_token_records().await;
        assert_eq!(saved[0].service_id.as_deref(), Some("SVC123"));
    }

    #[tokio::test]
    async fn test_unknown_user_is_auth101() {
        let store = Arc::new(seeded_store().await);
        let service = service_with(store, Arc::new(FixedClock::at(epoch())));

        let err = service
            .issue_token(&credentials(), &password_params(Some("nobody"), Some("pw")))
            .await
            .unwrap_err();

        assert_eq!(err, AuthError::no_matched_user());
    }

    #[tokio::test]
    async fn test_closed_account_is_auth102_on_password_grant() {
        let store = seeded_store().await;
        store
            .add_user("carol", "pw", PrincipalRecord {
                id: "carol".to_string(),
                name: "Carol".to_string(),
                role: Some("user".to_string()),
                status: STATUS_CLOSED.to_string(),
                service_id: None,
            })
            .await;
        let service = service_with(Arc::new(store), Arc::new(FixedClock::at(epoch())));

        let err = service
            .issue_token(&credentials(), &password_params(Some("carol"), Some("pw")))
            .await
            .unwrap_err();

        assert_eq!(err, AuthError::closed_account());
    }

    #[tokio::test]
    async fn test_client_credentials_grant_has_anonymous_user_and_no_refresh() {
        let store = Arc::new(seeded_store().await);
        let service = service_with(store.clone(), Arc::new(FixedClock::at(epoch())));

        let token = service
            .issue_token(&credentials(), &TokenParams {
                grant_type: GrantType::ClientCredentials,
                username: None,
                password: None,
                refresh_token: None,
            })
            .await
            .unwrap();

        assert_eq!(token.user, Principal::anonymous());
        assert!(token.refresh_token.is_none());
        assert!(token.refresh_token_expires_at.is_none());
        assert!(store.refresh_token_records().await.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_grant_reissues_access_and_echoes_refresh_token() {
        let store = Arc::new(seeded_store().await);
        let clock = Arc::new(FixedClock::at(epoch()));
        let service = service_with(store.clone(), clock.clone());

        let issued = service
            .issue_token(&credentials(), &password_params(Some("alice"), Some("pw")))
            .await
            .unwrap();
        let refresh_token = issued.refresh_token.clone().unwrap();

        clock.advance(Duration::seconds(7200));

        let refreshed = service
            .issue_token(&credentials(), &TokenParams {
                grant_type: GrantType::RefreshToken,
                username: None,
                password: None,
                refresh_token: Some(refresh_token.clone()),
            })
            .await
            .unwrap();

        assert_eq!(refreshed.refresh_token.as_deref(), Some(&*refresh_token));
        assert_eq!(
            refreshed.refresh_token_expires_at,
            issued.refresh_token_expires_at
        );
        assert_ne!(refreshed.access_token, issued.access_token);
        assert_eq!(refreshed.user.id, "alice");

        // no second association row was written
        assert_eq!(store.refresh_token_records().await.len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_grant_rejects_since_closed_account() {
        let store = Arc::new(seeded_store().await);
        let clock = Arc::new(FixedClock::at(epoch()));
        let service = service_with(store.clone(), clock);

        let issued = service
            .issue_token(&credentials(), &password_params(Some("alice"), Some("pw")))
            .await
            .unwrap();

        store.set_user_status("alice", STATUS_CLOSED).await;

        let err = service
            .issue_token(&credentials(), &TokenParams {
                grant_type: GrantType::RefreshToken,
                username: None,
                password: None,
                refresh_token: issued.refresh_token,
            })
            .await
            .unwrap_err();

        assert_eq!(err, AuthError::closed_account());
    }

    #[tokio::test]
    async fn test_refresh_grant_rejects_garbage_token() {
        let store = Arc::new(seeded_store().await);
        let service = service_with(store, Arc::new(FixedClock::at(epoch())));

        let err = service
            .issue_token(&credentials(), &TokenParams {
                grant_type: GrantType::RefreshToken,
                username: None,
                password: None,
                refresh_token: Some("garbage".to_string()),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn test_refresh_token_save_failure_is_server_error() {
        let store = seeded_store().await;
        store.fail_refresh_token_saves().await;
        let service = service_with(Arc::new(store), Arc::new(FixedClock::at(epoch())));

        let err = service
            .issue_token(&credentials(), &password_params(Some("alice"), Some("pw")))
            .await
            .unwrap_err();

        assert_eq!(err, AuthError::Server("fail to save token".to_string()));
    }

    #[tokio::test]
    async fn test_app_key_exchange_success() {
        let store = seeded_store().await;
        store
            .add_app_key("APPKEY-1", AppKeyRecord {
                user_id: "bob".to_string(),
                service_id: "SVC123".to_string(),
                password: "pw".to_string(),
            })
            .await;
        let service = service_with(Arc::new(store), Arc::new(FixedClock::at(epoch())));

        let result = service.exchange_app_key(&credentials(), "APPKEY-1").await;

        assert!(result.is_successful);
        assert!(result.error_msg.is_none());
        let token = result.token.unwrap();
        assert_eq!(token.user.id, "bob");
        assert_eq!(token.user.service_id.as_deref(), Some("SVC123"));
        assert!(token.refresh_token.is_some());
    }

    #[tokio::test]
    async fn test_app_key_exchange_unknown_key_fails_softly() {
        let store = Arc::new(seeded_store().await);
        let service = service_with(store, Arc::new(FixedClock::at(epoch())));

        let result = service.exchange_app_key(&credentials(), "missing").await;

        assert!(!result.is_successful);
        assert_eq!(result.error_msg.as_deref(), Some("appKey is not valid."));
        assert!(result.token.is_none());
    }

    #[tokio::test]
    async fn test_app_key_exchange_closed_account_fails_softly() {
        let store = seeded_store().await;
        store
            .set_service_user_status("bob", "SVC123", STATUS_CLOSED)
            .await;
        store
            .add_app_key("APPKEY-1", AppKeyRecord {
                user_id: "bob".to_string(),
                service_id: "SVC123".to_string(),
                password: "pw".to_string(),
            })
            .await;
        let service = service_with(Arc::new(store), Arc::new(FixedClock::at(epoch())));

        let result = service.exchange_app_key(&credentials(), "APPKEY-1").await;

        assert!(!result.is_successful);
        assert_eq!(
            result.error_msg.as_deref(),
            Some("This is a closed account.")
        );
    }
}
