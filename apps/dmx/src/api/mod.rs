//! # DMX HTTP API Module
//!
//! This module implements the HTTP REST API and the websocket push channel.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Object counts
//! - `GET /core/topic/{id}` - A topic (`?children=true` for the composite tree)
//! - `GET /core/topic/uri/{uri}` - A topic by URI
//! - `GET /core/topic/{id}/related_topics` - Related topics (filter query parameters)
//! - `GET /core/topics/type/{type_uri}` - All topics of a type
//! - `POST /core/topic` - Create a topic
//! - `PUT /core/topic/{id}` - Update a topic
//! - `DELETE /core/topic/{id}` - Delete a topic
//! - `GET /core/assoc/{id}` - An association
//! - `GET /core/topic_type/{uri}` - A topic type
//! - `GET /core/assoc_type/{uri}` - An association type
//! - `POST /core/type` - Create a topic type or association type
//! - `GET /websocket` - Push connection receiving the directives of every
//!   committed write
//!
//! A write request may name its own push connection in the `X-DMX-Client-Id`
//! header; that connection is skipped when the directives are pushed.

mod handlers;
mod types;
mod ws;

pub use handlers::{
    assoc_type_handler, create_topic_handler, create_type_handler, delete_topic_handler,
    get_assoc_handler, get_topic_by_uri_handler, get_topic_handler, health_handler,
    related_topics_handler, status_handler, topic_type_handler, topics_by_type_handler,
    update_topic_handler,
};
pub use types::{
    ApiError, ChildrenQuery, ErrorResponse, HealthResponse, RelatedQuery, StatusResponse,
    WsQuery, status_of,
};
pub use ws::{WsConnection, websocket_handler};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    routing::get,
};
use dmx_core::{
    ConnectionRegistry, CoreService, Directive, DmxError, OpContext, StorageBackend, directives,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Header naming the push connection of the requesting client.
pub const CLIENT_ID_HEADER: &str = "x-dmx-client-id";

/// Maximum accepted request body.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// The core service over the runtime-selected storage.
pub type Core = CoreService<StorageBackend>;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state: the core behind a lock, and the push connections
/// beside it. The registry is concurrent on its own.
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<RwLock<Core>>,
    pub connections: Arc<ConnectionRegistry<WsConnection>>,
    next_client: Arc<AtomicU64>,
}

impl AppState {
    #[must_use]
    pub fn new(core: Core) -> Self {
        Self {
            core: Arc::new(RwLock::new(core)),
            connections: Arc::new(ConnectionRegistry::new()),
            next_client: Arc::new(AtomicU64::new(1)),
        }
    }

    /// A fresh id for a websocket client that didn't name itself.
    pub(crate) fn next_client_id(&self) -> String {
        format!("client-{}", self.next_token())
    }

    /// A number no other socket of this server has been given.
    pub(crate) fn next_token(&self) -> u64 {
        self.next_client.fetch_add(1, Ordering::Relaxed)
    }

    /// Run one write operation as a core transaction, then push its
    /// directives to every connection except `origin`'s.
    pub async fn transact<T, F>(&self, operation: &str, origin: Option<&str>, f: F) -> Result<T, DmxError>
    where
        F: FnOnce(&mut Core, &mut OpContext) -> Result<T, DmxError>,
    {
        let (value, batch) = {
            let mut core = self.core.write().await;
            core.transact(operation, f)?
        };
        self.push(&batch, origin);
        Ok(value)
    }

    fn push(&self, batch: &[Directive], origin: Option<&str>) {
        let delivered = match origin {
            None => self.connections.broadcast_directives(batch),
            Some(_) if batch.is_empty() => Ok(0),
            Some(origin) => {
                directives::to_json(batch).map(|message| self.connections.broadcast_except(&message, origin))
            }
        };
        match delivered {
            Ok(count) => tracing::debug!(directives = batch.len(), connections = count, "directives pushed"),
            Err(e) => tracing::warn!(error = %e, "directives could not be serialized"),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build the CORS layer from the configured origins.
///
/// - `["*"]`: allows all origins
/// - empty: localhost only
/// - otherwise: exactly the listed origins
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS: Allowing ALL origins. This is insecure for production!");
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.trim().parse::<HeaderValue>() {
            Ok(hv) => {
                tracing::info!("CORS: Allowing origin: {}", origin);
                Some(hv)
            }
            Err(e) => {
                tracing::warn!("CORS: Invalid origin '{}': {}", origin, e);
                None
            }
        })
        .collect();

    let allowed = if allowed.is_empty() {
        ["http://localhost:3000", "http://localhost:8080", "http://127.0.0.1:3000", "http://127.0.0.1:8080"]
            .into_iter()
            .filter_map(|o| o.parse::<HeaderValue>().ok())
            .collect()
    } else {
        allowed
    };

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::HeaderName::from_static(CLIENT_ID_HEADER)])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner): tracing, CORS, body limit.
pub fn create_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/core/topic", axum::routing::post(handlers::create_topic_handler))
        .route(
            "/core/topic/{id}",
            get(handlers::get_topic_handler)
                .put(handlers::update_topic_handler)
                .delete(handlers::delete_topic_handler),
        )
        .route("/core/topic/uri/{uri}", get(handlers::get_topic_by_uri_handler))
        .route("/core/topic/{id}/related_topics", get(handlers::related_topics_handler))
        .route("/core/topics/type/{type_uri}", get(handlers::topics_by_type_handler))
        .route("/core/assoc/{id}", get(handlers::get_assoc_handler))
        .route("/core/topic_type/{uri}", get(handlers::topic_type_handler))
        .route("/core/assoc_type/{uri}", get(handlers::assoc_type_handler))
        .route("/core/type", axum::routing::post(handlers::create_type_handler))
        .route("/websocket", get(ws::websocket_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer(cors_origins))
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server and serve until Ctrl+C.
pub async fn run_server(addr: &str, core: Core, cors_origins: &[String]) -> Result<(), DmxError> {
    let state = AppState::new(core);
    let router = create_router(state, cors_origins);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| DmxError::InvalidState(format!("bind to {} failed: {}", addr, e)))?;

    tracing::info!("DMX HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| DmxError::InvalidState(format!("server error: {}", e)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
