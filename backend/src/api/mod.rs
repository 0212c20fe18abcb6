//! API module - HTTP handlers and middleware.

pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod routes;

use crate::authz::{Authorizer, PermissionCache};
use crate::config::Config;
use crate::services::auth_service::AuthService;
use crate::services::permission_service::{PermissionService, PgPermissionSource};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use std::sync::Arc;

use self::middleware::auth::RequestGate;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: PgPool,
    pub auth_service: Arc<AuthService>,
    pub authorizer: Arc<Authorizer>,
    pub permission_cache: Arc<PermissionCache>,
    pub permission_service: Arc<PermissionService>,
    pub metrics_handle: Option<Arc<PrometheusHandle>>,
}

impl AppState {
    pub fn new(config: Config, db: PgPool) -> Self {
        let permission_cache = Arc::new(PermissionCache::new(Arc::new(PgPermissionSource::new(
            db.clone(),
        ))));
        let authorizer = Arc::new(Authorizer::new(permission_cache.clone()));
        let auth_service = Arc::new(AuthService::new(db.clone(), Arc::new(config.clone())));
        let permission_service = Arc::new(PermissionService::new(
            db.clone(),
            permission_cache.clone(),
        ));

        Self {
            config,
            db,
            auth_service,
            authorizer,
            permission_cache,
            permission_service,
            metrics_handle: None,
        }
    }

    /// Set the Prometheus metrics handle for rendering /metrics output.
    pub fn set_metrics_handle(&mut self, handle: PrometheusHandle) {
        self.metrics_handle = Some(Arc::new(handle));
    }

    /// Base request gate. Routes derive their per-route gates from it.
    pub fn gate(&self) -> RequestGate {
        RequestGate::new(self.auth_service.clone(), self.authorizer.clone())
    }
}

pub type SharedState = Arc<AppState>;
