use axum::{
    Form,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;

use crate::server::AppState;

use super::error::error_response;
use super::grants::{ClientCredentials, GrantType, TokenParams};
use super::middleware::decompose_basic_header;
use super::traits::PushKeyRecord;

/// Token request body. One shape serves all three token endpoints; the
/// handlers decide which fields matter per grant.
#[derive(Debug, Deserialize)]
pub struct TokenForm {
    pub grant_type: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub refresh_token: Option<String>,
    pub pushkey: Option<String>,
    pub os: Option<String>,
    #[serde(rename = "appKey")]
    pub app_key: Option<String>,
}

impl TokenForm {
    fn params(&self, grant_type: GrantType) -> TokenParams {
        TokenParams {
            grant_type,
            username: self.username.clone(),
            password: self.password.clone(),
            refresh_token: self.refresh_token.clone(),
        }
    }
}

/// Pulls client identity out of the Basic authorization header. Every
/// failure mode collapses to `AUTH401`: absent header, missing `Basic`
/// marker, undecodable payload, or a blank id/secret.
fn extract_basic_credentials(headers: &HeaderMap) -> Result<ClientCredentials, Response> {
    let no_auth = || error_response(StatusCode::BAD_REQUEST, "AUTH401", "No authentication given.");

    let header_value = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(no_auth)?;

    let (client_id, client_secret) = decompose_basic_header(header_value).ok_or_else(no_auth)?;

    Ok(ClientCredentials {
        client_id,
        client_secret,
    })
}

fn parse_grant_type(raw: &Option<String>, accepted: &[GrantType]) -> Result<GrantType, Response> {
    let raw = match raw.as_deref().filter(|value| !value.is_empty()) {
        Some(raw) => raw,
        None => {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                "AUTH402",
                "grant_type is missing.",
            ));
        }
    };

    match GrantType::parse(raw) {
        Some(grant_type) if accepted.contains(&grant_type) => Ok(grant_type),
        _ => Err(error_response(
            StatusCode::BAD_REQUEST,
            "AUTH403",
            "The grant_type is not acceptable.",
        )),
    }
}

fn internal_error() -> Response {
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "server_error",
        "Internal Server Error",
    )
}

/// POST /oauth/token: the general token endpoint, all three grants.
pub async fn token_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<TokenForm>,
) -> Response {
    let credentials = match extract_basic_credentials(&headers) {
        Ok(credentials) => credentials,
        Err(response) => return response,
    };

    let grant_type = match parse_grant_type(&form.grant_type, &[
        GrantType::ClientCredentials,
        GrantType::Password,
        GrantType::RefreshToken,
    ]) {
        Ok(grant_type) => grant_type,
        Err(response) => return response,
    };

    tracing::info!(grant_type = grant_type.as_str(), "token request");

    match state
        .oauth
        .issue_token(&credentials, &form.params(grant_type))
        .await
    {
        Ok(token) => (StatusCode::OK, Json(token)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /oauth/token/services/{serviceId}: tenant-scoped login. Only the
/// password and refresh_token grants are acceptable here; bare usernames are
/// rewritten to `<username>/<serviceId>` before dispatch.
pub async fn service_token_handler(
    State(state): State<AppState>,
    Path(service_id): Path<String>,
    headers: HeaderMap,
    Form(form): Form<TokenForm>,
) -> Response {
    let credentials = match extract_basic_credentials(&headers) {
        Ok(credentials) => credentials,
        Err(response) => return response,
    };

    let grant_type = match parse_grant_type(&form.grant_type, &[
        GrantType::Password,
        GrantType::RefreshToken,
    ]) {
        Ok(grant_type) => grant_type,
        Err(response) => return response,
    };

    let mut params = form.params(grant_type);

    if let Err(e) = params.validate() {
        return e.into_response();
    }

    match state.directory.service_exists(&service_id).await {
        Ok(true) => {}
        Ok(false) => {
            return error_response(
                StatusCode::NOT_FOUND,
                "not_found",
                "The service does not exist.",
            );
        }
        Err(e) => {
            tracing::error!("service lookup failed: {e:#}");
            return internal_error();
        }
    }

    // the push registration below wants the bare user id, pre-rewrite
    let login_user_id = params.username.clone().unwrap_or_default();

    if grant_type == GrantType::Password {
        params.username = params
            .username
            .map(|username| format!("{username}/{service_id}"));
    }

    let token = match state.oauth.issue_token(&credentials, &params).await {
        Ok(token) => token,
        Err(e) => return e.into_response(),
    };

    if let Some(pushkey) = form.pushkey.as_deref().filter(|value| !value.is_empty()) {
        let Some(os) = form.os.as_deref().filter(|value| !value.is_empty()) else {
            return error_response(StatusCode::BAD_REQUEST, "AUTH410", "os is missing.");
        };

        let record = PushKeyRecord {
            service_id: service_id.clone(),
            user_id: login_user_id,
            client_id: credentials.client_id.clone(),
            os: os.to_string(),
            push_key: pushkey.to_string(),
        };

        if let Err(e) = state.oauth.store().save_push_key(record).await {
            tracing::error!("push key persistence failed: {e:#}");
            return internal_error();
        }
    }

    (StatusCode::OK, Json(token)).into_response()
}

/// POST /oauth/appkey: exchanges an opaque app key for a token pair.
pub async fn app_key_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<TokenForm>,
) -> Response {
    let credentials = match extract_basic_credentials(&headers) {
        Ok(credentials) => credentials,
        Err(response) => return response,
    };

    let app_key = match form.app_key.as_deref().filter(|value| !value.is_empty()) {
        Some(app_key) => app_key,
        None => {
            return error_response(StatusCode::BAD_REQUEST, "AUTH409", "appKey is missing.");
        }
    };

    let result = state.oauth.exchange_app_key(&credentials, app_key).await;

    if result.is_successful {
        match result.token {
            Some(token) => (StatusCode::OK, Json(token)).into_response(),
            None => internal_error(),
        }
    } else {
        let message = result
            .error_msg
            .unwrap_or_else(|| "appKey exchange failed".to_string());

        error_response(StatusCode::UNAUTHORIZED, "invalid_client", &message)
    }
}

/// POST /oauth/verification: explicit bearer-token verification, returning
/// the auth context the middleware would attach.
pub async fn verification_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(header_value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "AUTH401",
            "No authentication given.",
        );
    };

    let Some(token) = header_value.strip_prefix("Bearer ") else {
        return super::error::AuthError::InvalidToken(
            "authorization header is not a bearer token".to_string(),
        )
        .into_response();
    };

    match state.oauth.verify(token) {
        Ok(context) => (StatusCode::OK, Json(context)).into_response(),
        Err(e) => e.into_response(),
    }
}
