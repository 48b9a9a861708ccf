use std::sync::Arc;

use anyhow::Context;
use axum::http::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use quiz_backend::{
    config::{Config, CorsOrigins},
    crud::{PgMatchRepository, PgQuestionCatalog},
    route::create_router,
    service::{EngineSettings, MatchService},
    AppState,
};
use sqlx::postgres;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{}=debug,tower_http=debug", env!("CARGO_CRATE_NAME")).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    // set up connection pool
    let pool = postgres::PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(config.db_acquire_timeout)
        .connect(&config.database_url)
        .await
        .context("can't connect to database")?;

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    let matches = MatchService::new(
        Arc::new(PgMatchRepository::new(pool.clone())),
        Arc::new(PgQuestionCatalog::new(pool)),
        EngineSettings {
            catalog_timeout: config.catalog_timeout,
            default_timer_seconds: config.default_timer_seconds,
        },
    );

    let allow_origin = match &config.cors_origins {
        CorsOrigins::Any => AllowOrigin::from(Any),
        CorsOrigins::List(origins) => AllowOrigin::list(
            origins
                .iter()
                .map(|o| o.parse::<HeaderValue>())
                .collect::<Result<Vec<_>, _>>()
                .context("CORS_ORIGINS contains an invalid origin")?,
        ),
    };
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_origin(allow_origin)
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    let trace_layer =
        TraceLayer::new_for_http().on_response(DefaultOnResponse::new().level(Level::INFO));

    let app = create_router(Arc::new(AppState::new(matches)))
        .layer(cors)
        .layer(trace_layer);

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::debug!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
