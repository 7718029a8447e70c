//! IPC client for communicating with the sc daemon.
//!
//! This module provides:
//! - Unix Domain Socket client
//! - Request/response handling
//! - Connection retry logic
//! - Timeout handling

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::timeout;

use crate::types::{
    IpcRequest, IpcResponse, ListData, MutateData, ReblockData, StatusData, UnblockData,
};

// ============================================================================
// Constants
// ============================================================================

/// Connection timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Deadline for sending the request and receiving the response
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum connection attempts
const MAX_RETRIES: u32 = 3;

/// Retry delay (base delay, multiplied by attempt number)
const RETRY_DELAY: Duration = Duration::from_millis(200);

// ============================================================================
// ClientError
// ============================================================================

/// Errors seen by the client.
///
/// Everything except [`ClientError::Daemon`] is a transport failure.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Nothing is listening on the socket
    #[error("daemon is not running (no listener on {0}); start it with 'sudo sc install' or 'sudo sc daemon'")]
    NotRunning(PathBuf),

    /// Permission denied on the socket
    #[error("permission denied connecting to {0}")]
    PermissionDenied(PathBuf),

    /// Connect or response deadline exceeded
    #[error("timed out waiting for the daemon")]
    Timeout,

    /// Other IO error
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    /// Unparseable response
    #[error("invalid response from daemon: {0}")]
    Protocol(String),

    /// The daemon answered with `ok: false`
    #[error("{0}")]
    Daemon(String),
}

impl ClientError {
    /// Returns true if the error means no daemon could be reached.
    pub fn is_transport(&self) -> bool {
        !matches!(self, ClientError::Daemon(_))
    }
}

// ============================================================================
// IpcClient
// ============================================================================

/// IPC client for daemon communication.
#[derive(Debug, Clone)]
pub struct IpcClient {
    /// Socket path
    socket_path: PathBuf,
    /// Connection timeout
    connect_timeout: Duration,
    /// Request/response timeout
    response_timeout: Duration,
}

impl IpcClient {
    /// Creates a new IPC client for the given socket.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            connect_timeout: CONNECT_TIMEOUT,
            response_timeout: RESPONSE_TIMEOUT,
        }
    }

    /// Overrides the request/response deadline.
    #[must_use]
    pub fn with_response_timeout(mut self, response_timeout: Duration) -> Self {
        self.response_timeout = response_timeout;
        self
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub async fn status(&self) -> Result<StatusData, ClientError> {
        self.call(&IpcRequest::status()).await
    }

    pub async fn unblock(
        &self,
        domains: &[String],
        duration: Duration,
    ) -> Result<UnblockData, ClientError> {
        self.call(&IpcRequest::unblock(domains, duration)).await
    }

    pub async fn reblock(&self, domains: &[String]) -> Result<ReblockData, ClientError> {
        self.call(&IpcRequest::reblock(domains)).await
    }

    pub async fn add(&self, domains: &[String]) -> Result<MutateData, ClientError> {
        self.call(&IpcRequest::add(domains)).await
    }

    pub async fn remove(&self, domains: &[String]) -> Result<MutateData, ClientError> {
        self.call(&IpcRequest::remove(domains)).await
    }

    pub async fn list(&self) -> Result<ListData, ClientError> {
        self.call(&IpcRequest::list()).await
    }

    /// Sends `request` and decodes the response payload.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Daemon`] for `ok: false` responses and a
    /// transport variant for everything else.
    pub async fn call<T: DeserializeOwned>(&self, request: &IpcRequest) -> Result<T, ClientError> {
        let response = self.send_request(request).await?;
        if !response.ok {
            return Err(ClientError::Daemon(
                response.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        let data = response.data.unwrap_or(serde_json::Value::Null);
        serde_json::from_value(data).map_err(|e| ClientError::Protocol(e.to_string()))
    }

    /// Sends a single request and returns the raw response envelope.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the daemon cannot be reached or answers
    /// with something that is not a response envelope.
    pub async fn send_request(&self, request: &IpcRequest) -> Result<IpcResponse, ClientError> {
        let mut stream = self.connect_with_retry().await?;

        let mut line = serde_json::to_vec(request).map_err(|e| ClientError::Protocol(e.to_string()))?;
        line.push(b'\n');

        let exchange = async {
            stream.write_all(&line).await?;
            stream.flush().await?;

            let mut reader = BufReader::new(&mut stream);
            let mut response = String::new();
            reader.read_line(&mut response).await?;
            Ok::<_, std::io::Error>(response)
        };

        let response = timeout(self.response_timeout, exchange)
            .await
            .map_err(|_| ClientError::Timeout)??;

        if response.trim().is_empty() {
            return Err(ClientError::Protocol("empty response".to_string()));
        }
        serde_json::from_str(response.trim()).map_err(|e| ClientError::Protocol(e.to_string()))
    }

    /// Connects, retrying briefly while the listener refuses connections.
    async fn connect_with_retry(&self) -> Result<UnixStream, ClientError> {
        let mut attempt = 1;
        loop {
            match self.connect().await {
                Err(ClientError::NotRunning(_)) if attempt < MAX_RETRIES && self.socket_path.exists() => {
                    tracing::debug!("Connect attempt {}/{} refused", attempt, MAX_RETRIES);
                    tokio::time::sleep(RETRY_DELAY * attempt).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn connect(&self) -> Result<UnixStream, ClientError> {
        match timeout(self.connect_timeout, UnixStream::connect(&self.socket_path)).await {
            Err(_) => Err(ClientError::Timeout),
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused => {
                    ClientError::NotRunning(self.socket_path.clone())
                }
                std::io::ErrorKind::PermissionDenied => {
                    ClientError::PermissionDenied(self.socket_path.clone())
                }
                _ => ClientError::Io(e),
            }),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
