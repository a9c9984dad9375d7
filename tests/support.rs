//! Shared test plumbing: a tiny in-process HTTP server the load screens can
//! point at, plus a helper for an address that refuses connections.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

/// Binds an ephemeral-port HTTP server and returns its base URL plus the
/// shutdown switch keeping it alive.
pub async fn spawn_http_server() -> Result<(String, watch::Sender<bool>), String> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|err| format!("bind failed: {}", err))?;
    let addr = listener
        .local_addr()
        .map_err(|err| format!("local_addr failed: {}", err))?;
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                accepted = listener.accept() => {
                    match accepted {
                        Ok((socket, _)) => {
                            tokio::spawn(handle_http(socket));
                        }
                        Err(_) => break,
                    }
                }
            }
        }
    });

    Ok((format!("http://{}", addr), shutdown_tx))
}

/// An address nothing listens on, for transport-error tests.
pub async fn closed_port_url() -> Result<String, String> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|err| format!("bind failed: {}", err))?;
    let addr = listener
        .local_addr()
        .map_err(|err| format!("local_addr failed: {}", err))?;
    drop(listener);
    Ok(format!("http://{}", addr))
}

async fn handle_http(mut socket: TcpStream) {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        let Ok(bytes) = socket.read(&mut chunk).await else {
            return;
        };
        if bytes == 0 {
            return;
        }
        buffer.extend_from_slice(&chunk[..bytes]);
        if let Some(pos) = buffer.windows(4).position(|window| window == b"\r\n\r\n") {
            break pos;
        }
        if buffer.len() > 64 * 1024 {
            return;
        }
    };

    let header_text = String::from_utf8_lossy(&buffer[..header_end]).into_owned();
    let request_line = header_text.lines().next().unwrap_or_default().to_owned();
    let mut parts = request_line.split_whitespace();
    let _method = parts.next().unwrap_or_default();
    let target = parts.next().unwrap_or_default().to_owned();
    let path = target.split('?').next().unwrap_or_default();

    let content_length = header_text
        .lines()
        .find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())?
        })
        .unwrap_or(0);
    let mut body_seen = buffer.len().saturating_sub(header_end + 4);
    while body_seen < content_length {
        let Ok(bytes) = socket.read(&mut chunk).await else {
            return;
        };
        if bytes == 0 {
            break;
        }
        body_seen += bytes;
    }

    let (status, body) = route(path);
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    drop(socket.write_all(response.as_bytes()).await);
}

fn route(path: &str) -> (&'static str, String) {
    match path {
        "/" => ("200 OK", r#"{"ok":true}"#.to_owned()),
        "/api/items" => (
            "200 OK",
            r#"{"items":[{"id":7,"name":"widget"},{"id":9,"name":"sprocket"}]}"#.to_owned(),
        ),
        "/api/login" => ("200 OK", r#"{"token":"test-token"}"#.to_owned()),
        "/api/orders" => ("201 Created", r#"{"order_id":1}"#.to_owned()),
        "/missing" => ("404 Not Found", r#"{"error":"missing"}"#.to_owned()),
        "/teapot" => ("418 I'm a teapot", r#"{"error":"teapot"}"#.to_owned()),
        path if path.starts_with("/api/items/") => {
            let id = path.rsplit('/').next().unwrap_or("0");
            ("200 OK", format!(r#"{{"id":{},"name":"widget"}}"#, id))
        }
        _ => ("200 OK", "{}".to_owned()),
    }
}
