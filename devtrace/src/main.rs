use std::sync::Arc;

use axum::http::{header, Method};
use devtrace::actors::coordinator::{CoordinatorActor, CoordinatorArguments};
use devtrace::actors::NoopToolHooks;
use devtrace::api;
use devtrace::app_state::AppState;
use devtrace::browsing_data::ProfileDirPlatform;
use devtrace::config::Config;
use devtrace::interceptor::ReqwestTransport;
use devtrace::settings_store::SettingsStore;
use ractor::Actor;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "devtrace=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting DevTrace coordinator");

    let settings = SettingsStore::open(&config.settings_db_path)?;
    let platform = Arc::new(ProfileDirPlatform::new(&config.profile_dir));
    tracing::info!(profile_dir = %config.profile_dir, "Browsing data platform ready");

    let (coordinator, _handle) = Actor::spawn(
        Some("devtrace.coordinator".to_string()),
        CoordinatorActor,
        CoordinatorArguments {
            settings,
            platform,
            reactivation_retry_delay: config.reactivation_retry_delay,
        },
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to spawn CoordinatorActor: {e}"))?;

    let app_state = Arc::new(AppState::new(
        coordinator,
        Arc::new(ReqwestTransport::default()),
        Arc::new(NoopToolHooks),
        config.pipeline(),
    ));

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(std::time::Duration::from_secs(3600));

    let app = api::router()
        .with_state(api::ApiState { app_state })
        .layer(cors);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting HTTP server on http://{addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
