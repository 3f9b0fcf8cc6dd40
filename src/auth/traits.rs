use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

/// Account status value marking a closed/withdrawn account. Authentication
/// against such an account always fails with `AUTH102`.
pub const STATUS_CLOSED: &str = "4";

/// An API consumer as the credential store knows it. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct ClientRecord {
    pub client_id: String,
    pub client_secret: String,
    /// Access-token lifetime in seconds.
    pub access_token_lifetime: i64,
    /// Refresh-token lifetime in seconds.
    pub refresh_token_lifetime: i64,
    pub grants: Vec<String>,
    pub redirect_uris: Vec<String>,
}

/// A principal as resolved from storage, platform or service-scoped.
/// `status` is the raw stored value; see [`STATUS_CLOSED`].
#[derive(Debug, Clone)]
pub struct PrincipalRecord {
    pub id: String,
    pub name: String,
    /// The stored role, surfaced as the token scope.
    pub role: Option<String>,
    pub status: String,
    pub service_id: Option<String>,
}

/// The authenticated identity embedded in tokens and responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub id: String,
    pub scope: Option<String>,
    #[serde(rename = "serviceId")]
    pub service_id: Option<String>,
}

impl Principal {
    /// The empty identity behind client-credentials grants.
    pub fn anonymous() -> Self {
        Self {
            id: String::new(),
            scope: None,
            service_id: None,
        }
    }
}

/// Refresh-token association written at issuance. Redemption trusts the JWT
/// signature and re-resolves the current principal, not this row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub client_id: String,
    pub user_id: String,
    pub service_id: Option<String>,
    pub refresh_token: String,
}

/// Stored login material behind an opaque app key.
#[derive(Debug, Clone)]
pub struct AppKeyRecord {
    pub user_id: String,
    pub service_id: String,
    pub password: String,
}

/// Push registration captured on service-scoped logins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushKeyRecord {
    pub service_id: String,
    pub user_id: String,
    pub client_id: String,
    pub os: String,
    pub push_key: String,
}

/// Storage seam for everything token issuance needs: client and principal
/// resolution plus refresh-token/push-key persistence. Backed by a relational
/// store in production and by [`super::MemoryCredentialStore`] in the dev
/// binary and tests.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_client(&self, client_id: &str) -> Result<Option<ClientRecord>>;

    /// Login-time platform-user resolution (credentials checked by the store).
    async fn find_user(&self, user_id: &str, password: &str) -> Result<Option<PrincipalRecord>>;

    /// Login-time service-user resolution.
    async fn find_service_user(
        &self,
        user_id: &str,
        service_id: &str,
        password: &str,
    ) -> Result<Option<PrincipalRecord>>;

    /// Refresh-time re-resolution: current account state, no password.
    async fn find_user_by_id(&self, user_id: &str) -> Result<Option<PrincipalRecord>>;

    /// Refresh-time re-resolution for service users.
    async fn find_service_user_by_id(
        &self,
        user_id: &str,
        service_id: &str,
    ) -> Result<Option<PrincipalRecord>>;

    /// Returns whether a row was written (affected-rows semantics).
    async fn save_refresh_token(&self, record: RefreshTokenRecord) -> Result<bool>;

    async fn find_app_key(&self, app_key: &str) -> Result<Option<AppKeyRecord>>;

    async fn save_push_key(&self, record: PushKeyRecord) -> Result<()>;
}
