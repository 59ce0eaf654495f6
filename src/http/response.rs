//! Per-event response accumulation.
//!
//! # Responsibilities
//! - Collect status, headers, cookies and body written by application code
//! - Refuse every mutation once the response has been finalized
//! - Hand the accumulated parts to the event bridge for draining
//!
//! # Design Decisions
//! - One `ResponseState` per event, owned by the bridge and lent to the
//!   dispatcher as `&mut`; never stored globally
//! - All mutators pass through a single finalized gate that logs and returns
//!   [`ResponseError::AlreadyFinalized`] instead of panicking
//! - Rendering writes straight into the owned body buffer

use std::io;
use std::time::SystemTime;

use axum::http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::http::cookie::{encode_cookie, Cookie, SET_COOKIE};
use crate::http::headers::HeaderSet;
use crate::observability::metrics;

/// Content type set by [`ResponseState::write_json`].
pub const JSON_CONTENT_TYPE: &str = "application/json;charset=utf-8";

pub const CONTENT_TYPE: &str = "Content-Type";
pub const LOCATION: &str = "Location";

/// Errors reported to application code by response mutators.
#[derive(Debug, Error)]
pub enum ResponseError {
    /// The response was already finalized; the call changed nothing.
    #[error("response has already ended; {operation} rejected")]
    AlreadyFinalized { operation: &'static str },

    /// The JSON envelope could not be serialized.
    #[error("failed to serialize JSON body: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A view failed while rendering into the body.
    #[error("view rendering failed: {0}")]
    Render(#[from] io::Error),
}

/// Renders a template or document into a response body.
pub trait View {
    fn render(&self, params: &Value, out: &mut dyn io::Write) -> io::Result<()>;
}

/// Growable byte accumulator for the pending body.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BodyBuffer {
    bytes: Vec<u8>,
}

impl BodyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Body contents as text, replacing invalid UTF-8 sequences.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl io::Write for BodyBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Serialize)]
struct JsonEnvelope {
    code: u16,
    result: Value,
    msg: Value,
}

/// Status, headers and body accumulated for one event.
#[derive(Debug, Default)]
pub struct ResponseState {
    headers: HeaderSet,
    body: BodyBuffer,
    finalized: bool,
}

impl ResponseState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single gate consulted by every mutator.
    fn ensure_open(&self, operation: &'static str) -> Result<(), ResponseError> {
        if self.finalized {
            tracing::warn!(operation, "response has ended; mutation rejected");
            metrics::record_already_finalized(operation);
            return Err(ResponseError::AlreadyFinalized { operation });
        }
        Ok(())
    }

    pub fn set_status(&mut self, status: StatusCode) -> Result<(), ResponseError> {
        self.ensure_open("set_status")?;
        self.headers.set_status(status);
        Ok(())
    }

    /// Append a header value; repeated names keep every value in order.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) -> Result<(), ResponseError> {
        self.ensure_open("set_header")?;
        self.headers.append(name, value);
        Ok(())
    }

    /// Append a `Set-Cookie` header built from `cookie`.
    pub fn set_cookie(&mut self, cookie: &Cookie) -> Result<(), ResponseError> {
        self.set_cookie_at(cookie, SystemTime::now())
    }

    /// Like [`set_cookie`](Self::set_cookie), with an explicit clock for `Max-age`.
    pub fn set_cookie_at(&mut self, cookie: &Cookie, now: SystemTime) -> Result<(), ResponseError> {
        self.ensure_open("set_cookie")?;
        self.headers.append(SET_COOKIE, encode_cookie(cookie, now));
        Ok(())
    }

    /// Append raw bytes to the body.
    pub fn write(&mut self, bytes: impl AsRef<[u8]>) -> Result<(), ResponseError> {
        self.ensure_open("write")?;
        self.body.append(bytes.as_ref());
        Ok(())
    }

    /// Replace the body with a `{code, result, msg}` JSON envelope and set the
    /// status to `status`.
    ///
    /// Pass `Value::Null` for an absent `result` or `msg`.
    pub fn write_json(
        &mut self,
        status: StatusCode,
        result: impl Into<Value>,
        msg: impl Into<Value>,
    ) -> Result<(), ResponseError> {
        self.ensure_open("write_json")?;
        let envelope = JsonEnvelope {
            code: status.as_u16(),
            result: result.into(),
            msg: msg.into(),
        };
        let encoded = serde_json::to_vec(&envelope)?;

        self.body.clear();
        self.body.append(&encoded);
        self.headers.replace(CONTENT_TYPE, JSON_CONTENT_TYPE);
        self.headers.set_status(status);
        Ok(())
    }

    /// Render `view` with `params` directly into the body.
    ///
    /// On a render error the bytes produced so far stay in the body.
    pub fn view(&mut self, view: &dyn View, params: &Value) -> Result<(), ResponseError> {
        self.ensure_open("view")?;
        view.render(params, &mut self.body)?;
        Ok(())
    }

    /// 301 redirect to `url`.
    pub fn redirect(&mut self, url: &str) -> Result<(), ResponseError> {
        self.ensure_open("redirect")?;
        self.headers.set_status(StatusCode::MOVED_PERMANENTLY);
        self.headers.replace(LOCATION, url);
        Ok(())
    }

    /// Finalize the response. Returns `true` only on the first call.
    pub fn end(&mut self) -> bool {
        if self.finalized {
            return false;
        }
        self.finalized = true;
        true
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn status(&self) -> StatusCode {
        self.headers.status()
    }

    pub fn headers(&self) -> &HeaderSet {
        &self.headers
    }

    pub fn body(&self) -> &BodyBuffer {
        &self.body
    }

    /// Move the body out, leaving an empty buffer behind.
    pub(crate) fn take_body(&mut self) -> BodyBuffer {
        std::mem::take(&mut self.body)
    }
}
