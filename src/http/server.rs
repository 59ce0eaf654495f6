//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the axum `Router` that sends every request through the bridge
//! - Wire up middleware (request ID, tracing, timeout)
//! - Serve on a bound listener until shutdown

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request, Response},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::BridgeConfig;
use crate::http::bridge::{Dispatcher, EventBridge};
use crate::lifecycle::hooks::ServerHooks;
use crate::lifecycle::shutdown;

/// HTTP front end feeding the event bridge.
pub struct HttpServer {
    router: Router,
    config: BridgeConfig,
    hooks: Arc<dyn ServerHooks>,
}

impl HttpServer {
    pub fn new(
        config: BridgeConfig,
        dispatcher: Arc<dyn Dispatcher>,
        hooks: Arc<dyn ServerHooks>,
    ) -> Self {
        let bridge = EventBridge::new(dispatcher, hooks.clone(), config.server.max_body_size);
        let router = Self::build_router(&config, bridge);
        Self {
            router,
            config,
            hooks,
        }
    }

    /// Every method and path falls through to the bridge.
    #[allow(deprecated)]
    fn build_router(config: &BridgeConfig, bridge: EventBridge) -> Router {
        Router::new()
            .fallback(bridge_handler)
            .with_state(bridge)
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.server.request_timeout_secs,
            )))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The fully layered router, for serving it some other way.
    pub fn into_router(self) -> Router {
        self.router
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Serve connections from `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");
        self.hooks.on_start(addr);

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown::wait_for(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn bridge_handler(State(bridge): State<EventBridge>, request: Request<Body>) -> Response<Body> {
    bridge.handle_request(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::RequestView;
    use crate::http::response::ResponseState;
    use crate::lifecycle::hooks::LoggingHooks;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn server() -> HttpServer {
        HttpServer::new(
            BridgeConfig::default(),
            Arc::new(|req: &RequestView, res: &mut ResponseState| {
                let id = req.request_id().unwrap_or("none").to_string();
                res.set_header("X-Seen-Request-Id", id).unwrap();
                res.write(format!("{} {}", req.method(), req.path())).unwrap();
            }),
            Arc::new(LoggingHooks),
        )
    }

    #[tokio::test]
    async fn test_every_path_reaches_dispatcher() {
        let router = server().into_router();

        let response = router
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/deeply/nested/path?x=1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.as_ref(), b"DELETE /deeply/nested/path");
    }

    #[tokio::test]
    async fn test_request_id_is_assigned_and_propagated() {
        let router = server().into_router();

        let response = router
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let propagated = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .expect("request id header");
        let seen = response
            .headers()
            .get("x-seen-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert_eq!(seen, propagated);
        assert_ne!(seen, "none");
    }

    #[tokio::test]
    async fn test_incoming_request_id_is_kept() {
        let router = server().into_router();

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("x-request-id", "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers().get("x-request-id").unwrap(), "abc-123");
        assert_eq!(response.headers().get("x-seen-request-id").unwrap(), "abc-123");
    }
}
