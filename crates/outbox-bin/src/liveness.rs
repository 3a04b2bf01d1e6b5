//! Liveness probe.
//!
//! Answers `200 ok` to any method on any path. It reports that the process is
//! up and says nothing about the source store or the stream.

use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub struct LivenessServer {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

async fn alive() -> &'static str {
    "ok"
}

fn router() -> Router {
    Router::new().fallback(alive)
}

impl LivenessServer {
    /// Bind `0.0.0.0:port` and start serving in the background.
    pub async fn start(port: u16) -> std::io::Result<Self> {
        let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                error!(error = %e, "Liveness server failed");
            }
        });

        info!(addr = %local_addr, "Liveness probe listening");
        Ok(Self {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            handle,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for the server task.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.handle.await {
            error!(error = %e, "Liveness server task failed");
        }
        info!("Liveness probe stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn request(addr: SocketAddr, method: &str, path: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", addr.port())).await.unwrap();
        let request =
            format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_any_request_is_ok() {
        let server = LivenessServer::start(0).await.unwrap();
        let addr = server.local_addr();
        assert_ne!(addr.port(), 0);

        for (method, path) in [("GET", "/"), ("GET", "/healthz"), ("POST", "/anything/else")] {
            let response = request(addr, method, path).await;
            assert!(response.starts_with("HTTP/1.1 200"), "{method} {path}: {response}");
            assert!(response.ends_with("ok"));
        }

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_releases_port() {
        let server = LivenessServer::start(0).await.unwrap();
        let port = server.local_addr().port();
        server.shutdown().await;

        assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());
    }
}
