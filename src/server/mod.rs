//! Webhook listener.
//!
//! Listens on localhost, relays `POST <URL_Path>` requests to Rainmeter and
//! answers everything else with a short plain-text status.

pub mod http;
mod request_log;

pub use request_log::RequestLog;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::ServerError;
use crate::relay::{Launcher, Relay};
use http::{Request, Response};

/// Time allowed for a client to send its request.
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// The webhook HTTP server.
pub struct WebhookServer {
    port: u16,
    url_path: String,
    debug: bool,
    relay: Relay,
    request_log: Option<RequestLog>,
    cancel: CancellationToken,
}

impl WebhookServer {
    /// Build a server from validated settings. In debug mode every request is
    /// also written to a request log in `log_dir`.
    pub fn new(config: &Config, launcher: Arc<dyn Launcher>, log_dir: Option<&Path>) -> Arc<Self> {
        let debug = config.debug_mode();
        let request_log = log_dir.filter(|_| debug).map(RequestLog::new);
        if let Some(log) = &request_log {
            info!(path = ?log.path(), "Webhook requests will be logged");
        }

        Arc::new(Self {
            port: config.port().unwrap_or_default(),
            url_path: config.url_path(),
            debug,
            relay: Relay::new(config, launcher),
            request_log,
            cancel: CancellationToken::new(),
        })
    }

    pub fn url_path(&self) -> &str {
        &self.url_path
    }

    /// Gracefully shuts down the server.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Bind `127.0.0.1:<Port>`.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr: SocketAddr = ([127, 0, 0, 1], self.port).into();
        TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                port: self.port,
                source,
            })
    }

    /// Bind and serve until [`shutdown`](Self::shutdown).
    pub async fn run(self: &Arc<Self>) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accept connections on `listener` until [`shutdown`](Self::shutdown).
    pub async fn serve(self: &Arc<Self>, listener: TcpListener) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        info!("Webhook listener on http://{local_addr}{}", self.url_path);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Webhook listener shutting down");
                    break Ok(());
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let server = Arc::clone(self);
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream).await {
                                    debug!(%peer_addr, "connection error: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            error!("accept error: {e}");
                        }
                    }
                }
            }
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> Result<(), ServerError> {
        let (read_half, mut write_half) = stream.split();
        let mut reader = BufReader::new(read_half);

        let response = match tokio::time::timeout(READ_TIMEOUT, http::read_request(&mut reader)).await
        {
            Err(_) => {
                debug!("Client did not send a request in time");
                return Ok(());
            }
            Ok(Ok(None)) => return Ok(()),
            Ok(Ok(Some(request))) => self.respond(&request).await,
            Ok(Err(ServerError::MalformedRequest(reason))) => {
                warn!(%reason, "Malformed request");
                Response::bad_request(format!("Malformed request: {reason}"))
            }
            Ok(Err(e)) => return Err(e),
        };

        write_half.write_all(&response.to_bytes()).await?;
        write_half.shutdown().await?;
        Ok(())
    }

    /// Route one request.
    pub async fn respond(&self, request: &Request) -> Response {
        let recognized = self.matches_path(&request.path);
        if let Some(log) = &self.request_log {
            log.record(request, &self.url_path, recognized);
        }

        if !recognized {
            if self.debug {
                let message = format!(
                    "Received request to webhook URL path that does not match that in the config: {}",
                    request.path
                );
                warn!("{message}");
                return Response::not_found(message);
            }
            return Response::not_found("Not Found");
        }

        if !request.method.eq_ignore_ascii_case("POST") {
            debug!(method = %request.method, "Rejected non-POST webhook request");
            return Response::method_not_allowed("POST");
        }

        match self.relay.relay(&request.query).await {
            Ok(message) => {
                info!("{message}");
                Response::ok(message)
            }
            Err(e) => {
                warn!(error = %e, "Webhook request not relayed");
                Response::ok(e.to_string())
            }
        }
    }

    fn matches_path(&self, path: &str) -> bool {
        let trimmed = if path.len() > 1 {
            path.strip_suffix('/').unwrap_or(path)
        } else {
            path
        };
        trimmed.eq_ignore_ascii_case(&self.url_path)
    }
}
