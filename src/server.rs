use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tower_http::cors::CorsLayer;

use crate::auth::{
    self, OAuthService, app_key_handler, service_token_handler, token_handler,
    verification_handler,
};
use crate::telemetry::{TelemetryStore, statistics_handler};
use crate::users::{ServiceDirectory, user_statistics_handler};

/// Shared handler state: the OAuth core plus the storage seams the
/// statistics endpoints consume.
#[derive(Clone)]
pub struct AppState {
    pub oauth: Arc<OAuthService>,
    pub telemetry: Arc<dyn TelemetryStore>,
    pub directory: Arc<dyn ServiceDirectory>,
}

/// Token endpoints authenticate via the Basic header, not a bearer token.
fn token_routes(state: AppState) -> Router {
    Router::new()
        .route("/oauth/token", post(token_handler))
        .route(
            "/oauth/token/services/{service_id}",
            post(service_token_handler),
        )
        .route("/oauth/appkey", post(app_key_handler))
        .route("/oauth/verification", post(verification_handler))
        .with_state(state)
}

/// Statistics routes sit behind the bearer middleware (which is fail-open by
/// inheritance; see `auth::middleware`).
fn protected_routes(state: AppState) -> Router {
    Router::new()
        .route("/data/statistics", get(statistics_handler))
        .route(
            "/services/{service_id}/users/statistics",
            get(user_statistics_handler),
        )
        .layer(middleware::from_fn_with_state(
            state.oauth.clone(),
            auth::bearer_auth_middleware,
        ))
        .with_state(state)
}

/// Binds and runs the API server until it is stopped.
pub async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    // we pass this to TcpListener::bind() which accepts ToSocketAddrs,
    // so hostnames like "localhost" get resolved properly
    let bind_addr = format!("{}:{}", host, port);

    // Rate limiting: 10 requests per second per IP, burst of 30.
    // SmartIpKeyExtractor checks x-forwarded-for and friends before falling
    // back to the peer ip, so this works behind a proxy and locally
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(SmartIpKeyExtractor)
            .per_second(10)
            .burst_size(30)
            .finish()
            .expect("Failed to build rate limiter config"),
    );
    let governor_limiter = governor_conf.limiter().clone();
    let rate_limit_layer = GovernorLayer::new(governor_conf);

    // Stricter rate limiting for the token endpoints: 5 per second, burst of 10
    let auth_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(SmartIpKeyExtractor)
            .per_second(5)
            .burst_size(10)
            .finish()
            .expect("Failed to build auth rate limiter config"),
    );
    let auth_rate_limit_layer = GovernorLayer::new(auth_governor_conf);

    let app = token_routes(state.clone())
        .layer(auth_rate_limit_layer)
        .merge(protected_routes(state).layer(rate_limit_layer))
        .layer(CorsLayer::permissive());

    // periodically drop stale rate limiter state
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            governor_limiter.retain_recent();
        }
    });

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server ready at http://{}", bind_addr);

    // into_make_service_with_connect_info gives us the peer ip for the rate
    // limiting fallback
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
