//! Per-event request/response lifecycle.
//!
//! # Data Flow
//! ```text
//! Created      build RequestView + fresh ResponseState
//!     → Dispatching   dispatcher mutates ResponseState, bridge awaits it
//!     → Draining      status, headers, body copied to the transport
//!     → Done          transport finished, ResponseState ended
//! ```
//!
//! # Design Decisions
//! - The bridge owns both per-event objects; the dispatcher only borrows them,
//!   so neither can outlive the event
//! - A panicking dispatcher is contained: the worker-error hook fires and the
//!   response is replaced with a 500 envelope, unless the dispatcher already
//!   ended it, in which case the frozen response is drained as is
//! - Drain failures are logged and the event still completes; nothing is retried

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::http::{Request, Response, StatusCode};
use futures_util::future::{self, BoxFuture};
use futures_util::FutureExt;
use serde_json::Value;

use crate::http::request::RequestView;
use crate::http::response::ResponseState;
use crate::http::transport::{AxumTransport, TransportError, TransportResponse};
use crate::lifecycle::hooks::{ServerHooks, WorkerError};
use crate::lifecycle::startup::current_worker_id;
use crate::observability::metrics;

/// Application entry point receiving each request.
///
/// Any synchronous `Fn(&RequestView, &mut ResponseState)` closure is a
/// dispatcher.
pub trait Dispatcher: Send + Sync + 'static {
    fn dispatch<'a>(
        &'a self,
        request: &'a RequestView,
        response: &'a mut ResponseState,
    ) -> BoxFuture<'a, ()>;
}

impl<F> Dispatcher for F
where
    F: Fn(&RequestView, &mut ResponseState) + Send + Sync + 'static,
{
    fn dispatch<'a>(
        &'a self,
        request: &'a RequestView,
        response: &'a mut ResponseState,
    ) -> BoxFuture<'a, ()> {
        self(request, response);
        Box::pin(future::ready(()))
    }
}

/// Lifecycle phase of one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPhase {
    Created,
    Dispatching,
    Draining,
    Done,
}

impl EventPhase {
    /// Next phase; `Done` is terminal.
    pub fn next(self) -> Self {
        match self {
            EventPhase::Created => EventPhase::Dispatching,
            EventPhase::Dispatching => EventPhase::Draining,
            EventPhase::Draining | EventPhase::Done => EventPhase::Done,
        }
    }
}

impl fmt::Display for EventPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventPhase::Created => "created",
            EventPhase::Dispatching => "dispatching",
            EventPhase::Draining => "draining",
            EventPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Outcome of a completed event.
#[derive(Debug)]
pub struct EventReport {
    pub phase: EventPhase,
    /// Status handed to the transport.
    pub status: StatusCode,
    /// The dispatcher called `end()` itself before draining.
    pub ended_early: bool,
    /// First transport failure seen while draining.
    pub transport_error: Option<TransportError>,
}

/// Drives events through the dispatcher and into the transport.
#[derive(Clone)]
pub struct EventBridge {
    dispatcher: Arc<dyn Dispatcher>,
    hooks: Arc<dyn ServerHooks>,
    max_body_size: usize,
}

impl EventBridge {
    pub fn new(
        dispatcher: Arc<dyn Dispatcher>,
        hooks: Arc<dyn ServerHooks>,
        max_body_size: usize,
    ) -> Self {
        Self {
            dispatcher,
            hooks,
            max_body_size,
        }
    }

    /// Handle one axum request end to end.
    pub async fn handle_request(&self, request: Request<Body>) -> Response<Body> {
        let start = Instant::now();
        let method = request.method().to_string();
        let mut transport = AxumTransport::new();

        let report = match RequestView::from_request(request, self.max_body_size).await {
            Ok(view) => self.run(view, &mut transport).await,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    status = e.status().as_u16(),
                    "Rejecting request before dispatch"
                );
                let mut response = ResponseState::new();
                // Fresh state; cannot be finalized yet.
                let _ = response.write_json(e.status(), Value::Null, e.client_message());
                finish_event(&mut response, &mut transport, EventPhase::Draining)
            }
        };

        metrics::record_request(&method, report.status.as_u16(), start);
        transport.into_response()
    }

    /// Run one event against an arbitrary transport.
    pub async fn run<T>(&self, request: RequestView, transport: &mut T) -> EventReport
    where
        T: TransportResponse + ?Sized,
    {
        let mut phase = EventPhase::Created;
        let mut response = ResponseState::new();

        phase = advance(phase, &request);
        let dispatched = AssertUnwindSafe(async {
            self.dispatcher.dispatch(&request, &mut response).await;
        })
        .catch_unwind()
        .await;

        if let Err(payload) = dispatched {
            let worker_id = current_worker_id().unwrap_or(0);
            let error = WorkerError::DispatcherPanicked {
                message: panic_message(payload.as_ref()),
            };
            tracing::error!(
                worker_id,
                method = %request.method(),
                path = %request.path(),
                error = %error,
                "Dispatcher panicked"
            );
            metrics::record_worker_error();
            self.hooks.on_worker_error(worker_id, &error);

            if !response.is_finalized() {
                response = ResponseState::new();
                // Fresh state; cannot be finalized yet.
                let _ = response.write_json(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Value::Null,
                    "internal server error",
                );
            }
        }

        phase = advance(phase, &request);
        finish_event(&mut response, transport, phase)
    }
}

fn advance(phase: EventPhase, request: &RequestView) -> EventPhase {
    let next = phase.next();
    tracing::trace!(
        from = %phase,
        to = %next,
        path = %request.path(),
        request_id = request.request_id().unwrap_or("-"),
        "Event phase"
    );
    next
}

fn finish_event<T>(response: &mut ResponseState, transport: &mut T, phase: EventPhase) -> EventReport
where
    T: TransportResponse + ?Sized,
{
    debug_assert_eq!(phase, EventPhase::Draining);
    let status = response.status();
    let ended_early = response.is_finalized();
    let transport_error = drain(response, transport).err();

    EventReport {
        phase: phase.next(),
        status,
        ended_early,
        transport_error,
    }
}

/// Copy `response` into `transport`, finish the transport and end the
/// response.
///
/// Every step is attempted even when an earlier one fails; the first failure
/// is returned. The body buffer is released before returning.
pub fn drain<T>(response: &mut ResponseState, transport: &mut T) -> Result<(), TransportError>
where
    T: TransportResponse + ?Sized,
{
    let mut first_error: Option<TransportError> = None;
    let mut note = |step: &'static str, e: TransportError| {
        tracing::error!(step, error = %e, "Transport write failed");
        metrics::record_transport_failure(step);
        if first_error.is_none() {
            first_error = Some(e);
        }
    };

    if let Err(e) = transport.set_status_code(response.status()) {
        note("status", e);
    }

    for (name, values) in response.headers().iter() {
        for value in values {
            if let Err(e) = transport.add_header(name, value) {
                note("header", e);
            }
        }
    }

    let body = response.take_body();
    if !body.is_empty() {
        if let Err(e) = transport.write_body(Bytes::from(body.into_bytes())) {
            note("body", e);
        }
    }

    if let Err(e) = transport.finish() {
        note("finish", e);
    }

    if !response.end() {
        tracing::debug!("Response was already ended by the dispatcher");
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
