//! Telemetry initialization: tracing subscriber with env-driven filtering.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` takes precedence; otherwise a default filter keeps this crate
/// at debug and the noisier dependencies at info.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "casedesk_backend=debug,tower_http=debug,sqlx::query=info".into()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
