mod error;
mod grants;
mod handlers;
mod memory;
mod middleware;
mod token;
mod traits;

pub use error::{AuthError, ErrorBody, error_response};
pub use grants::{AppKeyExchange, ClientCredentials, GrantType, TokenParams, TokenPayload};
pub use handlers::{
    app_key_handler, service_token_handler, token_handler, verification_handler,
};
pub use memory::MemoryCredentialStore;
pub use middleware::{
    AuthContext, BasicAuthCheck, bearer_auth_middleware, decompose_basic_header,
};
pub use token::{Clock, SystemClock, TokenCodec};
pub use traits::{
    AppKeyRecord, ClientRecord, CredentialStore, Principal, PrincipalRecord, PushKeyRecord,
    RefreshTokenRecord, STATUS_CLOSED,
};

use std::sync::Arc;

/// Configuration for the token subsystem. Token lifetimes are per-client and
/// live on the [`ClientRecord`], not here.
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

/// The OAuth core: grant dispatch, token encode/decode, and verification,
/// wired to whatever credential store the deployment provides.
pub struct OAuthService {
    codec: TokenCodec,
    store: Arc<dyn CredentialStore>,
}

impl OAuthService {
    pub fn new(config: AuthConfig, store: Arc<dyn CredentialStore>) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    /// Injectable clock so tests can simulate expiry deterministically.
    pub fn with_clock(
        config: AuthConfig,
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            codec: TokenCodec::new(&config.jwt_secret, clock),
            store,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }
}
