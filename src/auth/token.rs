use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use super::error::AuthError;

/// Wall-clock access behind a seam so tests can move time instead of
/// sleeping through token lifetimes.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Access-token claims. Wire names are the legacy lowercase forms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub clientid: String,
    pub userid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serviceid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Refresh-token claims: same identity fields, no scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub clientid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serviceid: Option<String>,
    pub userid: String,
    pub iat: i64,
    pub exp: i64,
}

/// Stateless HS256 encoder/decoder for bearer and refresh tokens.
///
/// Decoding is the single source of truth for expiry: the library's own exp
/// validation is disabled and the check runs against the injected clock.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(secret: &str, clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            clock,
        }
    }

    pub fn encode_access(
        &self,
        client_id: &str,
        user_id: &str,
        service_id: Option<&str>,
        scope: Option<&str>,
        lifetime_secs: i64,
    ) -> Result<(String, DateTime<Utc>), AuthError> {
        let issued_at = self.clock.now();
        let expires_at = issued_at + Duration::seconds(lifetime_secs);

        let claims = AccessClaims {
            clientid: client_id.to_string(),
            userid: user_id.to_string(),
            serviceid: service_id.map(str::to_string),
            scope: scope.map(str::to_string),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Server(format!("failed to encode access token: {e}")))?;

        Ok((token, expires_at))
    }

    pub fn encode_refresh(
        &self,
        client_id: &str,
        user_id: &str,
        service_id: Option<&str>,
        lifetime_secs: i64,
    ) -> Result<(String, DateTime<Utc>), AuthError> {
        let issued_at = self.clock.now();
        let expires_at = issued_at + Duration::seconds(lifetime_secs);

        let claims = RefreshClaims {
            clientid: client_id.to_string(),
            serviceid: service_id.map(str::to_string),
            userid: user_id.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Server(format!("failed to encode refresh token: {e}")))?;

        Ok((token, expires_at))
    }

    pub fn decode_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let data = decode::<AccessClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        self.check_expiry(data.claims.exp)?;
        Ok(data.claims)
    }

    pub fn decode_refresh(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        let data = decode::<RefreshClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        self.check_expiry(data.claims.exp)?;
        Ok(data.claims)
    }

    fn check_expiry(&self, exp: i64) -> Result<(), AuthError> {
        if exp <= self.clock.now().timestamp() {
            return Err(AuthError::InvalidToken("token has expired".to_string()));
        }

        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_clock::FixedClock;
    use super::*;

    fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(1_555_000_000, 0).unwrap()
    }

    fn codec_with_clock() -> (TokenCodec, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::at(epoch()));
        (TokenCodec::new("test-secret", clock.clone()), clock)
    }

    #[test]
    fn test_access_round_trip_preserves_claims() {
        let (codec, _clock) = codec_with_clock();

        let (token, expires_at) = codec
            .encode_access("web", "alice", Some("SVC123"), Some("user"), 3600)
            .unwrap();
        let claims = codec.decode_access(&token).unwrap();

        assert_eq!(claims.clientid, "web");
        assert_eq!(claims.userid, "alice");
        assert_eq!(claims.serviceid.as_deref(), Some("SVC123"));
        assert_eq!(claims.scope.as_deref(), Some("user"));
        assert_eq!(claims.iat, epoch().timestamp());
        assert_eq!(claims.exp, expires_at.timestamp());
        assert_eq!(claims.exp, claims.iat + 3600);
    }

    #[test]
    fn test_refresh_claims_carry_no_scope() {
        let (codec, _clock) = codec_with_clock();

        let (token, _) = codec
            .encode_refresh("web", "alice", Some("SVC123"), 86400)
            .unwrap();
        let claims = codec.decode_refresh(&token).unwrap();

        assert_eq!(claims.clientid, "web");
        assert_eq!(claims.userid, "alice");
        assert_eq!(claims.serviceid.as_deref(), Some("SVC123"));
    }

    #[test]
    fn test_expiry_boundary() {
        let (codec, clock) = codec_with_clock();
        let (token, _) = codec.encode_access("web", "alice", None, None, 60).unwrap();

        clock.advance(Duration::seconds(59));
        assert!(codec.decode_access(&token).is_ok());

        clock.advance(Duration::seconds(2));
        let err = codec.decode_access(&token).unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let (codec, _clock) = codec_with_clock();
        let other = TokenCodec::new("other-secret", Arc::new(FixedClock::at(epoch())));

        let (token, _) = codec
            .encode_access("web", "alice", None, None, 3600)
            .unwrap();

        assert!(matches!(
            other.decode_access(&token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_malformed_token_is_rejected() {
        let (codec, _clock) = codec_with_clock();

        assert!(matches!(
            codec.decode_access("not-a-jwt"),
            Err(AuthError::InvalidToken(_))
        ));
    }
}
