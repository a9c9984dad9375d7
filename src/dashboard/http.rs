use std::collections::HashMap;

use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::DashboardError;

/// Largest request this surface accepts; start bodies are tiny.
const MAX_REQUEST_BYTES: usize = 64 * 1024;

pub(super) struct HttpRequest {
    pub(super) method: String,
    pub(super) path: String,
    pub(super) body: Vec<u8>,
}

#[derive(Debug)]
pub(super) struct RequestError {
    pub(super) status: u16,
    pub(super) message: String,
}

impl RequestError {
    pub(super) fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

pub(super) async fn read_http_request(socket: &mut TcpStream) -> Result<HttpRequest, RequestError> {
    let mut buffer: Vec<u8> = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    let header_end;

    loop {
        let bytes = socket
            .read(&mut chunk)
            .await
            .map_err(|err| RequestError::new(400, format!("Failed to read request: {}", err)))?;
        if bytes == 0 {
            return Err(RequestError::new(400, "Empty request"));
        }
        let read_slice = chunk
            .get(..bytes)
            .ok_or_else(|| RequestError::new(400, "Invalid read length"))?;
        buffer.extend_from_slice(read_slice);
        if buffer.len() > MAX_REQUEST_BYTES {
            return Err(RequestError::new(413, "Request too large"));
        }
        if let Some(pos) = find_header_end(&buffer) {
            header_end = pos;
            break;
        }
    }

    let header_bytes = buffer
        .get(..header_end)
        .ok_or_else(|| RequestError::new(400, "Malformed request headers"))?;
    let header_text = std::str::from_utf8(header_bytes)
        .map_err(|err| RequestError::new(400, format!("Invalid request encoding: {}", err)))?;
    let mut lines = header_text.split("\r\n");
    let request_line = lines
        .next()
        .ok_or_else(|| RequestError::new(400, "Missing request line"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| RequestError::new(400, "Missing HTTP method"))?;
    let raw_path = parts
        .next()
        .ok_or_else(|| RequestError::new(400, "Missing request path"))?;
    let path = raw_path.split('?').next().unwrap_or(raw_path);

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            return Err(RequestError::new(400, "Malformed header"));
        };
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_owned());
    }

    let content_length = headers
        .get("content-length")
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(0);
    let body_start = header_end
        .checked_add(4)
        .ok_or_else(|| RequestError::new(400, "Malformed request headers"))?;
    let mut body = buffer.get(body_start..).unwrap_or_default().to_vec();
    while body.len() < content_length {
        let bytes = socket
            .read(&mut chunk)
            .await
            .map_err(|err| RequestError::new(400, format!("Failed to read body: {}", err)))?;
        if bytes == 0 {
            break;
        }
        let read_slice = chunk
            .get(..bytes)
            .ok_or_else(|| RequestError::new(400, "Invalid read length"))?;
        body.extend_from_slice(read_slice);
        if body.len() > MAX_REQUEST_BYTES {
            return Err(RequestError::new(413, "Request body too large"));
        }
    }
    body.truncate(content_length);

    Ok(HttpRequest {
        method: method.to_owned(),
        path: path.to_owned(),
        body,
    })
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}

const fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        409 => "Conflict",
        413 => "Payload Too Large",
        _ => "OK",
    }
}

pub(super) async fn write_json_response<T: Serialize>(
    socket: &mut TcpStream,
    status: u16,
    payload: &T,
) -> Result<(), DashboardError> {
    let body = serde_json::to_vec(payload).map_err(|err| DashboardError::Serialize {
        context: "dashboard response",
        source: err,
    })?;
    write_response(socket, status, "application/json", &body).await
}

pub(super) async fn write_error_response(
    socket: &mut TcpStream,
    status: u16,
    message: &str,
) -> Result<(), DashboardError> {
    #[derive(Serialize)]
    struct ErrorResponse<'msg> {
        error: &'msg str,
    }
    write_json_response(socket, status, &ErrorResponse { error: message }).await
}

pub(super) async fn write_html_response(
    socket: &mut TcpStream,
    html: &str,
) -> Result<(), DashboardError> {
    write_response(socket, 200, "text/html; charset=utf-8", html.as_bytes()).await
}

async fn write_response(
    socket: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<(), DashboardError> {
    let header = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        status_text(status),
        content_type,
        body.len()
    );
    socket
        .write_all(header.as_bytes())
        .await
        .map_err(|err| DashboardError::Io {
            context: "write response header",
            source: err,
        })?;
    socket.write_all(body).await.map_err(|err| DashboardError::Io {
        context: "write response body",
        source: err,
    })?;
    Ok(())
}

pub(super) async fn write_sse_headers(socket: &mut TcpStream) -> Result<(), DashboardError> {
    let header = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nConnection: keep-alive\r\n\r\n";
    socket
        .write_all(header.as_bytes())
        .await
        .map_err(|err| DashboardError::Io {
            context: "write stream headers",
            source: err,
        })
}

pub(super) async fn write_sse_frame(
    socket: &mut TcpStream,
    payload: &[u8],
) -> Result<(), DashboardError> {
    socket
        .write_all(b"data: ")
        .await
        .map_err(|err| DashboardError::Io {
            context: "write stream frame",
            source: err,
        })?;
    socket
        .write_all(payload)
        .await
        .map_err(|err| DashboardError::Io {
            context: "write stream frame",
            source: err,
        })?;
    socket
        .write_all(b"\n\n")
        .await
        .map_err(|err| DashboardError::Io {
            context: "write stream frame",
            source: err,
        })
}
