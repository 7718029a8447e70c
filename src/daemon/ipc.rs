//! IPC server for the sc daemon.
//!
//! This module provides the Unix Domain Socket control channel:
//! - Server that listens on a Unix socket, one request per connection
//! - Newline-delimited JSON request/response framing
//! - Dispatch of decoded requests to the [`BlockEngine`]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{timeout, Duration};

use crate::types::{Command, IpcRequest, IpcResponse, ARG_DURATION};

use super::engine::{run_locked, BlockEngine, RequestError};

// ============================================================================
// Constants
// ============================================================================

/// Maximum request size in bytes (64KB)
const MAX_REQUEST_SIZE: usize = 64 * 1024;

/// Per-connection read timeout
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait for an existing daemon to answer before treating its
/// socket as stale
const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

// ============================================================================
// IpcError
// ============================================================================

/// IPC-specific error types.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    /// Another daemon answered on the socket
    #[error("daemon already running (socket {0} is active)")]
    AlreadyRunning(PathBuf),

    /// Socket binding error
    #[error("Failed to bind socket {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Read or write error
    #[error("Connection error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Request too large
    #[error("Request too large (max {MAX_REQUEST_SIZE} bytes)")]
    RequestTooLarge,
}

// ============================================================================
// IpcServer
// ============================================================================

/// Unix Domain Socket IPC server.
pub struct IpcServer {
    /// Unix socket listener
    listener: UnixListener,
    /// Socket path (for cleanup)
    socket_path: PathBuf,
}

impl IpcServer {
    /// Binds the control socket.
    ///
    /// An existing socket file is probed first: if a daemon answers, binding
    /// fails with [`IpcError::AlreadyRunning`]; otherwise the stale file is
    /// removed. The socket is made world-accessible so unprivileged clients
    /// can reach a root daemon.
    ///
    /// # Errors
    ///
    /// Returns an error if another daemon is live or the socket cannot be
    /// bound.
    pub async fn bind(socket_path: &Path) -> Result<Self, IpcError> {
        let bind_err = |source| IpcError::Bind {
            path: socket_path.to_path_buf(),
            source,
        };

        if socket_path.exists() {
            if let Ok(Ok(_)) = timeout(PROBE_TIMEOUT, UnixStream::connect(socket_path)).await {
                return Err(IpcError::AlreadyRunning(socket_path.to_path_buf()));
            }
            tracing::info!("Removing stale socket {:?}", socket_path);
            std::fs::remove_file(socket_path).map_err(bind_err)?;
        }

        crate::fsutil::ensure_parent(socket_path).map_err(bind_err)?;

        let listener = UnixListener::bind(socket_path).map_err(bind_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o666))
                .map_err(bind_err)?;
        }

        Ok(Self {
            listener,
            socket_path: socket_path.to_path_buf(),
        })
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Accepts connections until `shutdown` flips to `true` (or its sender is
    /// dropped), then waits for in-flight requests and removes the socket.
    pub async fn serve(self, handler: Arc<RequestHandler>, mut shutdown: watch::Receiver<bool>) {
        let mut connections = JoinSet::new();
        tracing::info!("IPC server listening on {:?}", self.socket_path);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        let handler = Arc::clone(&handler);
                        connections.spawn(async move {
                            if let Err(e) = handle_connection(stream, &handler).await {
                                tracing::debug!("Client error: {}", e);
                            }
                        });
                    }
                    Err(e) => tracing::warn!("Failed to accept connection: {}", e),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        while connections.join_next().await.is_some() {}
        tracing::info!("IPC server stopped");
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// Reads one request line, dispatches it and writes one response line.
///
/// # Errors
///
/// Returns an error if the client disconnects early or IO fails.
pub async fn handle_connection(
    mut stream: UnixStream,
    handler: &RequestHandler,
) -> Result<(), IpcError> {
    let (read_half, mut write_half) = stream.split();

    let response = match receive_line(read_half).await {
        Ok(Some(line)) => match serde_json::from_str::<IpcRequest>(line.trim()) {
            Ok(request) => handler.handle(request).await,
            Err(e) => IpcResponse::error(format!("invalid request: {e}")),
        },
        Ok(None) => return Ok(()),
        Err(IpcError::RequestTooLarge) => {
            IpcResponse::error(format!("invalid request: {}", IpcError::RequestTooLarge))
        }
        Err(e) => return Err(e),
    };

    let mut json = serde_json::to_vec(&response)?;
    json.push(b'\n');
    write_half.write_all(&json).await?;
    write_half.flush().await?;
    Ok(())
}

/// Reads a single newline-terminated line, bounded in size and time.
///
/// Returns `None` if the client closed without sending anything.
async fn receive_line<R>(reader: R) -> Result<Option<String>, IpcError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader.take(MAX_REQUEST_SIZE as u64 + 1));
    let mut line = String::new();

    let n = timeout(READ_TIMEOUT, reader.read_line(&mut line))
        .await
        .map_err(|_| IpcError::Timeout)??;

    if n == 0 {
        return Ok(None);
    }
    if line.len() > MAX_REQUEST_SIZE {
        return Err(IpcError::RequestTooLarge);
    }
    Ok(Some(line))
}

// ============================================================================
// RequestHandler
// ============================================================================

/// Handles IPC requests by dispatching to the [`BlockEngine`].
pub struct RequestHandler {
    /// Shared reference to the block engine
    engine: Arc<Mutex<BlockEngine>>,
}

impl RequestHandler {
    /// Creates a new request handler with the given engine.
    pub fn new(engine: Arc<Mutex<BlockEngine>>) -> Self {
        Self { engine }
    }

    /// Handles an IPC request and returns the appropriate response.
    pub async fn handle(&self, request: IpcRequest) -> IpcResponse {
        let command = match request.command.parse::<Command>() {
            Ok(command) => command,
            Err(e) => return IpcResponse::error(e.to_string()),
        };
        tracing::debug!("Handling {} request", command);

        match command {
            Command::Status => self.handle_status().await,
            Command::Unblock => self.handle_unblock(&request).await,
            Command::Reblock => self.handle_reblock(&request).await,
            Command::Add => self.handle_add(&request).await,
            Command::Remove => self.handle_remove(&request).await,
            Command::List => self.handle_list().await,
        }
    }

    /// Handles the unblock command.
    async fn handle_unblock(&self, request: &IpcRequest) -> IpcResponse {
        let duration = match parse_duration(request) {
            Ok(duration) => duration,
            Err(e) => return IpcResponse::error(e.to_string()),
        };
        let domains = request.domains();

        match run_locked(&self.engine, move |engine| engine.unblock(&domains, duration)).await {
            Ok(Ok(data)) => IpcResponse::success(&data),
            Ok(Err(e)) => IpcResponse::error(e.to_string()),
            Err(e) => internal_error(e),
        }
    }

    /// Handles the reblock command.
    async fn handle_reblock(&self, request: &IpcRequest) -> IpcResponse {
        let domains = request.domains();
        respond(run_locked(&self.engine, move |engine| engine.reblock(&domains)).await)
    }

    /// Handles the add command.
    async fn handle_add(&self, request: &IpcRequest) -> IpcResponse {
        let domains = match required_domains(request) {
            Ok(domains) => domains,
            Err(e) => return IpcResponse::error(e.to_string()),
        };
        respond(run_locked(&self.engine, move |engine| engine.add_domains(&domains)).await)
    }

    /// Handles the remove command.
    async fn handle_remove(&self, request: &IpcRequest) -> IpcResponse {
        let domains = match required_domains(request) {
            Ok(domains) => domains,
            Err(e) => return IpcResponse::error(e.to_string()),
        };
        respond(run_locked(&self.engine, move |engine| engine.remove_domains(&domains)).await)
    }

    /// Handles the status command.
    async fn handle_status(&self) -> IpcResponse {
        respond(run_locked(&self.engine, |engine| engine.status()).await)
    }

    /// Handles the list command.
    async fn handle_list(&self) -> IpcResponse {
        respond(run_locked(&self.engine, |engine| engine.list_domains()).await)
    }
}

fn respond<T: serde::Serialize>(result: Result<T, JoinError>) -> IpcResponse {
    match result {
        Ok(data) => IpcResponse::success(&data),
        Err(e) => internal_error(e),
    }
}

fn internal_error(e: JoinError) -> IpcResponse {
    tracing::error!("Engine operation failed: {}", e);
    IpcResponse::error("internal error")
}

fn parse_duration(request: &IpcRequest) -> Result<Duration, RequestError> {
    let raw = request
        .arg(ARG_DURATION)
        .ok_or(RequestError::MissingArgument(ARG_DURATION))?;
    humantime::parse_duration(raw).map_err(|_| RequestError::InvalidDuration(raw.to_string()))
}

fn required_domains(request: &IpcRequest) -> Result<Vec<String>, RequestError> {
    let domains = request.domains();
    if domains.is_empty() {
        return Err(RequestError::MissingArgument("domains"));
    }
    Ok(domains)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::audit::MemoryAuditLog;
    use crate::config::Config;
    use crate::daemon::store::TimerStore;
    use crate::dns::MockCacheFlusher;
    use crate::hosts::MemoryHosts;
    use crate::types::{ListData, MutateData, ReblockData, StatusData, UnblockData};

    // ------------------------------------------------------------------------
    // Helper functions
    // ------------------------------------------------------------------------

    fn create_temp_socket_path() -> PathBuf {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sock");
        // Keep the directory so it's not deleted
        std::mem::forget(dir);
        path
    }

    fn create_engine(domains: &[&str]) -> (Arc<Mutex<BlockEngine>>, Arc<MemoryHosts>) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        std::mem::forget(dir);

        let mut config = Config::default();
        for d in domains {
            config.add_domain(d);
        }
        let hosts = Arc::new(MemoryHosts::new("127.0.0.1 localhost\n"));
        let engine = BlockEngine::new(
            config,
            root.join("config.yaml"),
            TimerStore::new(root.join("state.yaml")),
            hosts.clone(),
            Arc::new(MockCacheFlusher::new()),
            Arc::new(MemoryAuditLog::new()),
        );
        (Arc::new(Mutex::new(engine)), hosts)
    }

    fn request(json: &str) -> IpcRequest {
        serde_json::from_str(json).unwrap()
    }

    async fn round_trip(socket_path: &Path, line: &str) -> IpcResponse {
        let mut stream = UnixStream::connect(socket_path).await.unwrap();
        stream.write_all(line.as_bytes()).await.unwrap();
        stream.flush().await.unwrap();

        let mut reader = BufReader::new(stream);
        let mut response = String::new();
        reader.read_line(&mut response).await.unwrap();
        serde_json::from_str(&response).unwrap()
    }

    // ------------------------------------------------------------------------
    // IpcServer Tests
    // ------------------------------------------------------------------------

    mod ipc_server_tests {
        use super::*;

        #[tokio::test]
        async fn test_server_creation() {
            let socket_path = create_temp_socket_path();
            let server = IpcServer::bind(&socket_path).await;

            assert!(server.is_ok());
            assert!(socket_path.exists());
        }

        #[cfg(unix)]
        #[tokio::test]
        async fn test_socket_is_world_accessible() {
            use std::os::unix::fs::PermissionsExt;

            let socket_path = create_temp_socket_path();
            let _server = IpcServer::bind(&socket_path).await.unwrap();

            let mode = std::fs::metadata(&socket_path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o666);
        }

        #[tokio::test]
        async fn test_server_removes_stale_socket() {
            let socket_path = create_temp_socket_path();
            std::fs::write(&socket_path, "dummy").unwrap();

            let server = IpcServer::bind(&socket_path).await;
            assert!(server.is_ok());
        }

        #[tokio::test]
        async fn test_server_refuses_when_daemon_alive() {
            let socket_path = create_temp_socket_path();
            let _first = IpcServer::bind(&socket_path).await.unwrap();

            let second = IpcServer::bind(&socket_path).await;
            assert!(matches!(second, Err(IpcError::AlreadyRunning(_))));
        }

        #[tokio::test]
        async fn test_server_creates_parent_directory() {
            let dir = tempfile::tempdir().unwrap();
            let socket_path = dir.path().join("subdir").join("test.sock");

            let server = IpcServer::bind(&socket_path).await;
            assert!(server.is_ok());
            assert!(socket_path.parent().unwrap().exists());
        }

        #[tokio::test]
        async fn test_server_drop_cleanup() {
            let socket_path = create_temp_socket_path();

            {
                let _server = IpcServer::bind(&socket_path).await.unwrap();
                assert!(socket_path.exists());
            }

            assert!(!socket_path.exists());
        }

        #[tokio::test]
        async fn test_serve_answers_and_shuts_down() {
            let socket_path = create_temp_socket_path();
            let server = IpcServer::bind(&socket_path).await.unwrap();
            let (engine, _hosts) = create_engine(&["a.com"]);
            let handler = Arc::new(RequestHandler::new(engine));
            let (tx, rx) = watch::channel(false);
            let handle = tokio::spawn(server.serve(handler, rx));

            let response = round_trip(&socket_path, "{\"command\":\"list\"}\n").await;
            let data: ListData = response.into_data().unwrap();
            assert_eq!(data.domains, vec!["a.com"]);

            tx.send(true).unwrap();
            handle.await.unwrap();
            assert!(!socket_path.exists());
        }

        #[tokio::test]
        async fn test_malformed_request_gets_error_response() {
            let socket_path = create_temp_socket_path();
            let server = IpcServer::bind(&socket_path).await.unwrap();
            let (engine, _hosts) = create_engine(&[]);
            let (_tx, rx) = watch::channel(false);
            tokio::spawn(server.serve(Arc::new(RequestHandler::new(engine)), rx));

            let response = round_trip(&socket_path, "not valid json\n").await;

            assert!(!response.ok);
            assert!(response.error.unwrap().starts_with("invalid request"));
        }

        #[tokio::test]
        async fn test_client_closing_early_is_harmless() {
            let socket_path = create_temp_socket_path();
            let server = IpcServer::bind(&socket_path).await.unwrap();
            let (engine, _hosts) = create_engine(&["a.com"]);
            let (_tx, rx) = watch::channel(false);
            tokio::spawn(server.serve(Arc::new(RequestHandler::new(engine)), rx));

            drop(UnixStream::connect(&socket_path).await.unwrap());

            let response = round_trip(&socket_path, "{\"command\":\"status\"}\n").await;
            assert!(response.ok);
        }
    }

    // ------------------------------------------------------------------------
    // RequestHandler Tests
    // ------------------------------------------------------------------------

    mod request_handler_tests {
        use super::*;

        #[tokio::test]
        async fn test_handle_status() {
            let (engine, _hosts) = create_engine(&["a.com"]);
            let handler = RequestHandler::new(engine);

            let response = handler.handle(IpcRequest::status()).await;

            let data: StatusData = response.into_data().unwrap();
            assert_eq!(data.domains.len(), 1);
            assert_eq!(data.domains[0].domain, "a.com");
        }

        #[tokio::test]
        async fn test_handle_unknown_command() {
            let (engine, _hosts) = create_engine(&[]);
            let handler = RequestHandler::new(engine);

            let response = handler.handle(request(r#"{"command":"explode"}"#)).await;

            assert!(!response.ok);
            assert_eq!(response.error.as_deref(), Some("unknown command: explode"));
        }

        #[tokio::test]
        async fn test_handle_unblock() {
            let (engine, hosts) = create_engine(&["a.com", "b.com"]);
            let handler = RequestHandler::new(engine);

            let response = handler
                .handle(request(
                    r#"{"command":"unblock","args":{"domains":"a.com","duration":"15m"}}"#,
                ))
                .await;

            let data: UnblockData = response.into_data().unwrap();
            assert_eq!(data.domains, vec!["a.com"]);
            assert_eq!(data.duration, "15m");
            assert!(hosts.content().contains("0.0.0.0 b.com"));
            assert!(!hosts.content().contains("0.0.0.0 a.com"));
        }

        #[tokio::test]
        async fn test_handle_unblock_requires_duration() {
            let (engine, _hosts) = create_engine(&["a.com"]);
            let handler = RequestHandler::new(engine);

            let response = handler.handle(request(r#"{"command":"unblock"}"#)).await;

            assert_eq!(response.error.as_deref(), Some("duration required"));
        }

        #[tokio::test]
        async fn test_handle_unblock_invalid_duration() {
            let (engine, _hosts) = create_engine(&["a.com"]);
            let handler = RequestHandler::new(engine);

            let response = handler
                .handle(request(
                    r#"{"command":"unblock","args":{"duration":"soon"}}"#,
                ))
                .await;

            assert_eq!(response.error.as_deref(), Some("invalid duration: soon"));
        }

        #[tokio::test]
        async fn test_handle_unblock_unknown_domain() {
            let (engine, _hosts) = create_engine(&["a.com"]);
            let handler = RequestHandler::new(engine.clone());

            let response = handler
                .handle(request(
                    r#"{"command":"unblock","args":{"domains":"x.com","duration":"5m"}}"#,
                ))
                .await;

            assert_eq!(
                response.error.as_deref(),
                Some("domain \"x.com\" not in block list")
            );
            assert!(engine.lock().await.store().is_empty());
        }

        #[tokio::test]
        async fn test_handle_reblock_all() {
            let (engine, _hosts) = create_engine(&["a.com"]);
            let handler = RequestHandler::new(engine);
            handler
                .handle(request(r#"{"command":"unblock","args":{"duration":"5m"}}"#))
                .await;

            let response = handler.handle(request(r#"{"command":"reblock"}"#)).await;

            let data: ReblockData = response.into_data().unwrap();
            assert_eq!(data.domains, vec!["a.com"]);
        }

        #[tokio::test]
        async fn test_handle_add_and_remove() {
            let (engine, _hosts) = create_engine(&["a.com"]);
            let handler = RequestHandler::new(engine);

            let added: MutateData = handler
                .handle(IpcRequest::add(&["b.com".to_string()]))
                .await
                .into_data()
                .unwrap();
            assert_eq!(added.added, vec!["b.com"]);
            assert_eq!(added.domains, vec!["a.com", "b.com"]);

            let removed: MutateData = handler
                .handle(IpcRequest::remove(&["a.com".to_string()]))
                .await
                .into_data()
                .unwrap();
            assert_eq!(removed.removed, vec!["a.com"]);
            assert_eq!(removed.domains, vec!["b.com"]);
        }

        #[tokio::test]
        async fn test_handle_add_requires_domains() {
            let (engine, _hosts) = create_engine(&[]);
            let handler = RequestHandler::new(engine);

            let response = handler.handle(request(r#"{"command":"add"}"#)).await;

            assert_eq!(response.error.as_deref(), Some("domains required"));
        }

        #[tokio::test]
        async fn test_handle_list() {
            let (engine, _hosts) = create_engine(&["b.com", "a.com"]);
            let handler = RequestHandler::new(engine);

            let data: ListData = handler.handle(IpcRequest::list()).await.into_data().unwrap();

            assert_eq!(data.domains, vec!["b.com", "a.com"]);
        }
    }
}
