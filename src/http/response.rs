use std::sync::OnceLock;

use serde::Serialize;
use serde_json::{Map, Value};

/// Failure class of an HTTP round-trip that never produced a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    ConnectionRefused,
    ConnectionReset,
    OpenTimeout,
    ReadTimeout,
    Socket,
    UnexpectedEof,
    InvalidUrl,
    Client,
}

impl TransportKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TransportKind::ConnectionRefused => "connection_refused",
            TransportKind::ConnectionReset => "connection_reset",
            TransportKind::OpenTimeout => "open_timeout",
            TransportKind::ReadTimeout => "read_timeout",
            TransportKind::Socket => "socket",
            TransportKind::UnexpectedEof => "unexpected_eof",
            TransportKind::InvalidUrl => "invalid_url",
            TransportKind::Client => "client",
        }
    }
}

#[derive(Debug)]
enum Payload {
    Http { status: u16, body: Vec<u8> },
    Transport { kind: TransportKind },
}

/// Uniform wrapper over an HTTP reply or a transport failure.
///
/// Every context request returns one of these; callers never see a null or
/// an error branch. The JSON view is parsed once on first access and falls
/// back to an empty object for a missing or malformed body.
#[derive(Debug)]
pub struct Response {
    payload: Payload,
    json: OnceLock<Value>,
}

impl Response {
    pub(crate) fn http(status: u16, body: Vec<u8>) -> Self {
        Self {
            payload: Payload::Http { status, body },
            json: OnceLock::new(),
        }
    }

    pub(crate) fn transport(kind: TransportKind) -> Self {
        Self {
            payload: Payload::Transport { kind },
            json: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match &self.payload {
            Payload::Http { status, .. } => Some(*status),
            Payload::Transport { .. } => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<TransportKind> {
        match &self.payload {
            Payload::Http { .. } => None,
            Payload::Transport { kind } => Some(*kind),
        }
    }

    /// True when the reply carried a 2xx status.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self.status(), Some(status) if (200..=299).contains(&status))
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.is_ok()
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        match &self.payload {
            Payload::Http { body, .. } => body,
            Payload::Transport { .. } => &[],
        }
    }

    /// Cached JSON view of the body; `{}` for an empty or malformed body and
    /// for transport failures.
    pub fn json(&self) -> &Value {
        self.json.get_or_init(|| match &self.payload {
            Payload::Http { body, .. } if !body.is_empty() => {
                serde_json::from_slice(body).unwrap_or_else(|_| Value::Object(Map::new()))
            }
            _ => Value::Object(Map::new()),
        })
    }

    /// Key lookup short-circuiting into the cached parse.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.json().get(key)
    }
}
