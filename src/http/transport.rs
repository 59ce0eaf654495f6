//! Transport response handle.
//!
//! The event bridge is the only caller. [`AxumTransport`] collects the calls
//! into an `http::Response` that the axum handler returns to hyper.

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode};
use thiserror::Error;

/// Failures delivering a drained response to the transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid header name {0:?}")]
    InvalidHeaderName(String),

    #[error("invalid value for header {name}")]
    InvalidHeaderValue { name: String },

    #[error("transport response already finished")]
    AlreadyFinished,

    #[error("transport write failed: {0}")]
    Write(String),
}

/// Operations the runtime offers for sending a response downstream.
pub trait TransportResponse {
    fn set_status_code(&mut self, status: StatusCode) -> Result<(), TransportError>;

    /// Add one header line. Repeated calls with the same name add more lines.
    fn add_header(&mut self, name: &str, value: &str) -> Result<(), TransportError>;

    fn write_body(&mut self, chunk: Bytes) -> Result<(), TransportError>;

    /// Flush and close. Valid once.
    fn finish(&mut self) -> Result<(), TransportError>;
}

/// Transport backed by an axum response under construction.
#[derive(Debug, Default)]
pub struct AxumTransport {
    status: StatusCode,
    headers: HeaderMap,
    chunks: Vec<Bytes>,
    finished: bool,
}

impl AxumTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Assemble the collected status, headers and body.
    pub fn into_response(self) -> Response<Body> {
        let body = match self.chunks.len() {
            0 => Body::empty(),
            1 => Body::from(self.chunks.into_iter().next().unwrap_or_default()),
            _ => Body::from(self.chunks.concat()),
        };
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.finished {
            return Err(TransportError::AlreadyFinished);
        }
        Ok(())
    }
}

impl TransportResponse for AxumTransport {
    fn set_status_code(&mut self, status: StatusCode) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.status = status;
        Ok(())
    }

    fn add_header(&mut self, name: &str, value: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| TransportError::InvalidHeaderName(name.to_string()))?;
        let header_value = HeaderValue::from_str(value).map_err(|_| {
            TransportError::InvalidHeaderValue {
                name: name.to_string(),
            }
        })?;
        self.headers.append(header_name, header_value);
        Ok(())
    }

    fn write_body(&mut self, chunk: Bytes) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.chunks.push(chunk);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.finished = true;
        Ok(())
    }
}
