//! fleetpool-api — REST API for FleetPool.
//!
//! Provides axum route handlers over any [`CloudPool`] implementation,
//! whether a single reconciliation engine or a splitter over several.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/pool` | The latest pool observation |
//! | GET | `/api/v1/pool/size` | Desired/allocated/active counts |
//! | POST | `/api/v1/pool/size` | Set the desired pool size |
//! | POST | `/api/v1/pool/machines/:id/terminate` | Terminate a specific machine |
//! | POST | `/api/v1/pool/machines/:id/attach` | Attach a machine to the pool |
//! | POST | `/api/v1/pool/machines/:id/detach` | Detach a machine from the pool |
//! | POST | `/api/v1/pool/machines/:id/service_state` | Record a machine's service state |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use fleet_core::CloudPool;

/// Shared state for API handlers.
pub struct ApiState<P> {
    pub pool: Arc<P>,
}

impl<P> Clone for ApiState<P> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

/// Build the complete API router over the given pool.
pub fn build_router<P: CloudPool + 'static>(pool: Arc<P>) -> Router {
    let state = ApiState { pool };

    let api_routes = Router::new()
        .route("/pool", get(handlers::get_pool::<P>))
        .route(
            "/pool/size",
            get(handlers::get_pool_size::<P>).post(handlers::set_desired_size::<P>),
        )
        .route(
            "/pool/machines/{id}/terminate",
            post(handlers::terminate_machine::<P>),
        )
        .route(
            "/pool/machines/{id}/attach",
            post(handlers::attach_machine::<P>),
        )
        .route(
            "/pool/machines/{id}/detach",
            post(handlers::detach_machine::<P>),
        )
        .route(
            "/pool/machines/{id}/service_state",
            post(handlers::set_service_state::<P>),
        )
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}
