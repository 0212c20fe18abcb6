//! CaseDesk - Main Entry Point

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use rand::Rng;

use casedesk_backend::{
    api,
    config::Config,
    db,
    error::{AppError, Result},
    models::role::SUPER_ADMIN_ROLE_CODE,
    services::{auth_service::AuthService, metrics_service},
    telemetry,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    telemetry::init_tracing();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Starting CaseDesk backend");

    // Connect to database
    let db_pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("./migrations").run(&db_pool).await?;
    tracing::info!("Database migrations complete");

    // Provision the first-boot administrator account
    provision_admin_user(&db_pool, &config).await?;

    // Initialize Prometheus metrics recorder
    let metrics_handle = metrics_service::init_metrics();
    tracing::info!("Prometheus metrics recorder initialized");

    // Create application state
    let mut app_state = api::AppState::new(config.clone(), db_pool.clone());
    app_state.set_metrics_handle(metrics_handle);
    let state = Arc::new(app_state);

    // Build router
    let app = Router::new()
        .merge(api::routes::create_router(state))
        .layer(axum::middleware::from_fn(
            metrics_service::metrics_middleware,
        ))
        .layer(cors_layer(&config)?)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr: SocketAddr = config.bind_address.parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the CORS layer from configuration.
///
/// `CORS_ALLOWED_ORIGINS` defaults to `*`, which is fine when the frontend is
/// served from the same origin. A comma-separated origin list enables
/// credentials for split-origin development setups.
fn cors_layer(config: &Config) -> Result<CorsLayer> {
    if config.cors_allowed_origins.trim() == "*" {
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any));
    }

    let origins = config
        .cors_allowed_origins
        .split(',')
        .map(|origin| {
            origin
                .trim()
                .parse::<HeaderValue>()
                .map_err(|_| AppError::Config(format!("invalid CORS origin: {origin}")))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true))
}

/// Provision the initial administrator account on first boot.
///
/// The account is attached to the seeded super administrator role, so it
/// passes every grant check without explicit permission rows. When
/// `ADMIN_PASSWORD` is unset a random password is generated and logged once.
async fn provision_admin_user(db: &sqlx::PgPool, config: &Config) -> Result<()> {
    let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE username = $1")
        .bind(&config.admin_username)
        .fetch_optional(db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    if existing.is_some() {
        return Ok(());
    }

    let super_admin_role_id: Uuid = sqlx::query_scalar("SELECT id FROM roles WHERE code = $1")
        .bind(SUPER_ADMIN_ROLE_CODE)
        .fetch_one(db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    let (password, generated) = match &config.admin_password {
        Some(p) if !p.is_empty() => (p.clone(), false),
        _ => {
            const CHARSET: &[u8] =
                b"abcdefghijkmnopqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ23456789!@#$%&*";
            let mut rng = rand::rng();
            let p: String = (0..20)
                .map(|_| {
                    let idx = rng.random_range(0..CHARSET.len());
                    CHARSET[idx] as char
                })
                .collect();
            (p, true)
        }
    };

    let password_hash = AuthService::hash_password(&password)?;

    sqlx::query(
        r#"
        INSERT INTO users (role_id, username, email, password_hash, full_name, is_active, is_approved)
        VALUES ($1, $2, $3, $4, 'System Administrator', true, true)
        ON CONFLICT (username) DO NOTHING
        "#,
    )
    .bind(super_admin_role_id)
    .bind(&config.admin_username)
    .bind(&config.admin_email)
    .bind(&password_hash)
    .execute(db)
    .await
    .map_err(|e| AppError::Database(e.to_string()))?;

    if generated {
        tracing::info!(
            "\n\
            ===========================================================\n\
            \n\
              Initial administrator account created.\n\
            \n\
              Username:  {}\n\
              Password:  {}\n\
            \n\
              Set ADMIN_PASSWORD to control this value on first boot.\n\
              Change the password after logging in.\n\
            \n\
            ===========================================================",
            config.admin_username,
            password,
        );
    } else {
        tracing::info!("Administrator account created with password from ADMIN_PASSWORD");
    }

    Ok(())
}
