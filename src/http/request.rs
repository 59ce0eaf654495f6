//! Read-only request snapshot handed to the dispatcher.
//!
//! # Responsibilities
//! - Capture method, path, headers, query and body of the inbound event
//! - Decode query string and urlencoded form bodies into parameter lists
//! - Parse the `Cookie` header
//!
//! # Design Decisions
//! - Built once per event and never mutated
//! - Parameter lists keep duplicates and order; lookups return the first match
//! - Header values that are not valid UTF-8 are dropped from the snapshot

use axum::body::{Body, Bytes};
use axum::http::{header, request::Parts, Method, Request, StatusCode};
use futures_util::StreamExt;
use thiserror::Error;
use url::form_urlencoded;

use crate::http::headers::HeaderSet;

/// Header carrying the per-request correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Failure while turning a transport event into a [`RequestView`].
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("failed to read request body: {0}")]
    Body(#[from] axum::Error),
}

impl RequestError {
    /// Status answered to the client instead of dispatching.
    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            RequestError::Body(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Short message for the rejection envelope.
    pub fn client_message(&self) -> &'static str {
        match self {
            RequestError::TooLarge { .. } => "request body too large",
            RequestError::Body(_) => "failed to read request body",
        }
    }
}

/// Immutable view of one inbound request.
#[derive(Debug, Clone)]
pub struct RequestView {
    method: Method,
    path: String,
    query_string: Option<String>,
    headers: HeaderSet,
    query: Vec<(String, String)>,
    form: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
    body: Bytes,
}

impl RequestView {
    /// Build a snapshot from request parts and an already collected body.
    pub fn from_parts(parts: &Parts, body: Bytes) -> Self {
        let mut headers = HeaderSet::new();
        for (name, value) in parts.headers.iter() {
            if let Ok(value) = value.to_str() {
                headers.append(name.as_str(), value);
            }
        }

        let query_string = parts.uri.query().map(str::to_string);
        let query = query_string
            .as_deref()
            .map(decode_pairs)
            .unwrap_or_default();

        let form = if is_form(&headers) {
            form_urlencoded::parse(&body).into_owned().collect()
        } else {
            Vec::new()
        };

        let cookies = headers
            .get_all(header::COOKIE.as_str())
            .iter()
            .flat_map(|line| parse_cookie_line(line))
            .collect();

        Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            query_string,
            headers,
            query,
            form,
            cookies,
            body,
        }
    }

    /// Collect the body of `request` (at most `limit` bytes) and snapshot it.
    pub async fn from_request(request: Request<Body>, limit: usize) -> Result<Self, RequestError> {
        let (parts, body) = request.into_parts();
        let mut stream = body.into_data_stream();
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if collected.len() + chunk.len() > limit {
                return Err(RequestError::TooLarge { limit });
            }
            collected.extend_from_slice(&chunk);
        }
        Ok(Self::from_parts(&parts, Bytes::from(collected)))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query string without the leading `?`.
    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    pub fn headers(&self) -> &HeaderSet {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get_all(name).first().map(String::as_str)
    }

    /// Correlation id assigned by the request-id middleware, if any.
    pub fn request_id(&self) -> Option<&str> {
        self.header(X_REQUEST_ID)
    }

    pub fn query(&self, key: &str) -> Option<&str> {
        lookup(&self.query, key)
    }

    pub fn query_params(&self) -> &[(String, String)] {
        &self.query
    }

    /// Urlencoded body parameter.
    pub fn form(&self, key: &str) -> Option<&str> {
        lookup(&self.form, key)
    }

    pub fn form_params(&self) -> &[(String, String)] {
        &self.form
    }

    /// Body parameter first, then query parameter.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.form(key).or_else(|| self.query(key))
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        lookup(&self.cookies, name)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

fn lookup<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn decode_pairs(raw: &str) -> Vec<(String, String)> {
    form_urlencoded::parse(raw.as_bytes()).into_owned().collect()
}

fn is_form(headers: &HeaderSet) -> bool {
    headers
        .get(header::CONTENT_TYPE.as_str())
        .map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or("")
                .trim()
                .eq_ignore_ascii_case("application/x-www-form-urlencoded")
        })
        .unwrap_or(false)
}

fn parse_cookie_line(line: &str) -> Vec<(String, String)> {
    line.split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}
