/// Evaluation input: one reassembled request buffer, tagged with its
/// connection key and direction. Capture, reassembly and HTTP parsing are
/// external collaborators; the URI region (when present) arrives already
/// extracted.
use crate::rules::rule::FlowDirection;
use crate::session::ConnKey;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct RequestBuffer {
    pub conn: ConnKey,
    pub direction: FlowDirection,
    pub timestamp: DateTime<Utc>,
    /// Whole request payload
    pub payload: Vec<u8>,
    /// Extracted URI substring, when the upstream parser produced one
    pub uri: Option<Vec<u8>>,
    /// Request method, when known
    pub method: Option<String>,
}

impl RequestBuffer {
    pub fn new(conn: ConnKey, direction: FlowDirection, payload: Vec<u8>) -> Self {
        Self {
            conn,
            direction,
            timestamp: Utc::now(),
            payload,
            uri: None,
            method: None,
        }
    }

    pub fn with_uri(mut self, uri: impl Into<Vec<u8>>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn uri_slice(&self) -> Option<&[u8]> {
        self.uri.as_deref()
    }

    pub fn uri_string(&self) -> Option<String> {
        self.uri
            .as_deref()
            .map(|u| String::from_utf8_lossy(u).into_owned())
    }
}
