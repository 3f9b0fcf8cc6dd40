mod auth;
mod server;
mod stats;
mod telemetry;
mod users;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use auth::{AuthConfig, ClientRecord, MemoryCredentialStore, OAuthService, PrincipalRecord};
use server::AppState;
use telemetry::MemoryTelemetryStore;
use users::MemoryServiceDirectory;

#[derive(Parser, Debug)]
#[command(name = "stratus")]
#[command(about = "multi-tenant IoT management API core: OAuth2 token service + telemetry statistics")]
struct Args {
    /// Host to bind to
    #[arg(long, env = "STRATUS_HOST", default_value = "localhost")]
    host: String,

    /// Port to bind to
    #[arg(short, long, env = "STRATUS_PORT", default_value = "3000")]
    port: u16,

    /// JWT signing secret for access and refresh tokens
    #[arg(long, env = "STRATUS_JWT_SECRET")]
    jwt_secret: String,

    /// Client id seeded into the credential store
    #[arg(long, env = "STRATUS_CLIENT_ID")]
    client_id: String,

    /// Client secret for the seeded client
    #[arg(long, env = "STRATUS_CLIENT_SECRET")]
    client_secret: String,

    /// Access-token lifetime for the seeded client, in seconds
    #[arg(long, env = "STRATUS_ACCESS_TOKEN_LIFETIME", default_value = "3600")]
    access_token_lifetime: i64,

    /// Refresh-token lifetime for the seeded client, in seconds (14 days)
    #[arg(long, env = "STRATUS_REFRESH_TOKEN_LIFETIME", default_value = "1209600")]
    refresh_token_lifetime: i64,

    /// Optional demo tenant to seed for local testing
    #[arg(long, env = "STRATUS_DEMO_SERVICE")]
    demo_service: Option<String>,

    /// Demo service-user id (requires --demo-service and --demo-password)
    #[arg(long, env = "STRATUS_DEMO_USER")]
    demo_user: Option<String>,

    /// Demo service-user password
    #[arg(long, env = "STRATUS_DEMO_PASSWORD")]
    demo_password: Option<String>,

    /// Optional app key mapped to the demo service-user
    #[arg(long, env = "STRATUS_DEMO_APP_KEY")]
    demo_app_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stratus=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let credentials = MemoryCredentialStore::new();
    credentials
        .add_client(ClientRecord {
            client_id: args.client_id.clone(),
            client_secret: args.client_secret.clone(),
            access_token_lifetime: args.access_token_lifetime,
            refresh_token_lifetime: args.refresh_token_lifetime,
            grants: vec![
                "client_credentials".to_string(),
                "password".to_string(),
                "refresh_token".to_string(),
            ],
            redirect_uris: vec![],
        })
        .await;
    tracing::info!(client_id = %args.client_id, "seeded API client");

    let directory = MemoryServiceDirectory::new();

    if let (Some(service_id), Some(user_id), Some(password)) =
        (&args.demo_service, &args.demo_user, &args.demo_password)
    {
        directory.add_service(service_id).await;
        directory.record_join(service_id, chrono::Utc::now()).await;
        credentials
            .add_service_user(user_id, service_id, password, PrincipalRecord {
                id: user_id.clone(),
                name: user_id.clone(),
                role: Some("user".to_string()),
                status: "1".to_string(),
                service_id: Some(service_id.clone()),
            })
            .await;
        if let Some(app_key) = &args.demo_app_key {
            credentials
                .add_app_key(app_key, auth::AppKeyRecord {
                    user_id: user_id.clone(),
                    service_id: service_id.clone(),
                    password: password.clone(),
                })
                .await;
        }

        tracing::warn!(
            service_id = %service_id,
            user_id = %user_id,
            "seeded demo tenant; not for production use"
        );
    }

    let oauth = Arc::new(OAuthService::new(
        AuthConfig {
            jwt_secret: args.jwt_secret.clone(),
        },
        Arc::new(credentials),
    ));

    let state = AppState {
        oauth,
        telemetry: Arc::new(MemoryTelemetryStore::new()),
        directory: Arc::new(directory),
    };

    tracing::info!("Token endpoint: http://{}:{}/oauth/token", args.host, args.port);
    tracing::info!(
        "Statistics endpoint: http://{}:{}/data/statistics",
        args.host,
        args.port
    );

    server::serve(state, &args.host, args.port).await
}
