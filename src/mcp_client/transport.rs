//! JSON-RPC over stdio transport.
//!
//! Owns an MCP server child process and turns its line-delimited pipes into a
//! correlated request/response interface:
//! - Writing JSON-RPC requests to stdin, one line per request, under a single lock
//! - Reading responses from stdout in one background task
//! - Routing each response to its waiting caller by `id`, not by arrival order

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::errors::McpError;
use super::types::{ServerConfig, JSONRPC_VERSION};

// ─── Constants ───────────────────────────────────────────────────────────────

/// How long disposal waits for a background task to observe shutdown.
const TASK_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// How long disposal waits for a killed server process to exit.
const KILL_WAIT_TIMEOUT: Duration = Duration::from_secs(1);

// ─── Transport Capability ────────────────────────────────────────────────────

/// Request/response channel to an MCP server.
///
/// `send` hands back the raw response line; decoding success or error
/// payloads is the client's job.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one JSON-RPC request and wait for its correlated response.
    ///
    /// Fails with [`McpError::NotConnected`] before writing anything when the
    /// channel is known to be closed, and with [`McpError::Cancelled`] when
    /// `cancel` fires or the transport is disposed while waiting.
    async fn send(&self, request: &str, cancel: &CancellationToken) -> Result<String, McpError>;

    /// Current liveness, re-evaluated on every call.
    fn is_connected(&self) -> bool;

    /// Tear down the channel. Idempotent; leaves no caller waiting.
    async fn dispose(&self);
}

// ─── Pending-Request Table ───────────────────────────────────────────────────

/// Completion slot for one outstanding request.
type Slot = oneshot::Sender<String>;

/// Correlation ID → completion slot for every outstanding request.
#[derive(Default)]
struct PendingTable {
    slots: Mutex<HashMap<String, Slot>>,
}

impl PendingTable {
    fn insert(&self, id: String, slot: Slot) {
        lock(&self.slots).insert(id, slot);
    }

    fn take(&self, id: &str) -> Option<Slot> {
        lock(&self.slots).remove(id)
    }

    fn drain(&self) -> Vec<Slot> {
        lock(&self.slots).drain().map(|(_, slot)| slot).collect()
    }

    fn len(&self) -> usize {
        lock(&self.slots).len()
    }
}

/// Removes a request's slot once its caller stops waiting, whatever the reason.
struct PendingGuard<'a> {
    table: &'a PendingTable,
    id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.table.take(&self.id);
    }
}

/// What the read loop did with one non-blank line.
#[derive(Debug, PartialEq, Eq)]
enum Dispatch {
    /// Handed to the waiting caller.
    Delivered,
    /// Matched a slot whose caller had already gone away.
    Abandoned,
    /// Carried an `id` nobody is waiting for.
    Stray,
    /// Valid JSON without a usable `id`.
    MissingId,
    /// Not JSON at all.
    Malformed,
}

/// Route one response line to the slot registered under its `id`.
fn dispatch_line(pending: &PendingTable, line: &str) -> Dispatch {
    let Ok(value) = serde_json::from_str::<Value>(line) else {
        return Dispatch::Malformed;
    };
    let Some(id) = correlation_id(&value) else {
        return Dispatch::MissingId;
    };
    match pending.take(&id) {
        Some(slot) => match slot.send(line.to_string()) {
            Ok(()) => Dispatch::Delivered,
            Err(_) => Dispatch::Abandoned,
        },
        None => Dispatch::Stray,
    }
}

/// Extract a response's correlation ID. Numeric IDs compare by their decimal text.
fn correlation_id(message: &Value) -> Option<String> {
    match message.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Re-serialize a caller's request with our correlation ID and protocol version.
fn stamp_request(request: &str, id: &str) -> Result<String, McpError> {
    let mut envelope: Value =
        serde_json::from_str(request).map_err(|e| McpError::InvalidRequest {
            reason: format!("request is not valid JSON: {e}"),
        })?;

    let fields = envelope
        .as_object_mut()
        .ok_or_else(|| McpError::InvalidRequest {
            reason: "request must be a JSON object".into(),
        })?;

    if !fields.get("method").is_some_and(Value::is_string) {
        return Err(McpError::InvalidRequest {
            reason: "request has no string 'method'".into(),
        });
    }

    fields.insert("jsonrpc".into(), Value::String(JSONRPC_VERSION.into()));
    fields.insert("id".into(), Value::String(id.into()));

    serde_json::to_string(&envelope).map_err(|e| McpError::InvalidRequest {
        reason: format!("failed to serialize request: {e}"),
    })
}

// ─── StdioTransport ──────────────────────────────────────────────────────────

/// Bi-directional JSON-RPC transport over a child process's stdio.
pub struct StdioTransport {
    server_name: String,
    /// `None` once disposed.
    child: Mutex<Option<Child>>,
    /// Write-exclusivity lock over the child's stdin. Shared with in-flight
    /// write tasks so a started line is always finished.
    writer: Arc<tokio::sync::Mutex<Option<ChildStdin>>>,
    pending: Arc<PendingTable>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
    reader: Mutex<Option<JoinHandle<()>>>,
    stderr_drain: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl StdioTransport {
    /// Spawn the configured server and start reading its stdout.
    ///
    /// Must be called from within a Tokio runtime. Spawn failures are returned
    /// immediately.
    pub fn spawn(name: &str, config: &ServerConfig) -> Result<Self, McpError> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args);

        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        if let Some(dir) = config.cwd.as_deref() {
            cmd.current_dir(dir);
        }

        // Windows: prevent console window from appearing for child processes
        #[cfg(target_os = "windows")]
        {
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| McpError::SpawnFailed {
            name: name.to_string(),
            reason: format!("{e}"),
        })?;

        let stdin = child.stdin.take().ok_or(McpError::SpawnFailed {
            name: name.to_string(),
            reason: "failed to capture stdin".into(),
        })?;

        let stdout = child.stdout.take().ok_or(McpError::SpawnFailed {
            name: name.to_string(),
            reason: "failed to capture stdout".into(),
        })?;

        let stderr = child.stderr.take().ok_or(McpError::SpawnFailed {
            name: name.to_string(),
            reason: "failed to capture stderr".into(),
        })?;

        tracing::info!(
            server = name,
            command = %config.command,
            pid = ?child.id(),
            "spawned MCP server"
        );

        let pending = Arc::new(PendingTable::default());
        let shutdown = CancellationToken::new();

        let reader = tokio::spawn(read_loop(
            name.to_string(),
            stdout,
            Arc::clone(&pending),
            shutdown.clone(),
        ));
        let stderr_drain = tokio::spawn(drain_stderr(name.to_string(), stderr, shutdown.clone()));

        Ok(Self {
            server_name: name.to_string(),
            child: Mutex::new(Some(child)),
            writer: Arc::new(tokio::sync::Mutex::new(Some(stdin))),
            pending,
            next_id: AtomicU64::new(0),
            shutdown,
            reader: Mutex::new(Some(reader)),
            stderr_drain: Mutex::new(Some(stderr_drain)),
            disposed: AtomicBool::new(false),
        })
    }

    /// Name this transport was spawned under (used in errors and logs).
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Number of requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    fn next_request_id(&self) -> String {
        (self.next_id.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }

    fn not_connected(&self) -> McpError {
        McpError::NotConnected {
            server: self.server_name.clone(),
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&self, request: &str, cancel: &CancellationToken) -> Result<String, McpError> {
        if !self.is_connected() {
            return Err(self.not_connected());
        }

        let id = self.next_request_id();
        let mut line = stamp_request(request, &id)?;
        line.push('\n');

        // Queue for the writer, but give up as soon as the caller does.
        let writer = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(McpError::Cancelled),
            _ = self.shutdown.cancelled() => return Err(McpError::Cancelled),
            writer = Arc::clone(&self.writer).lock_owned() => writer,
        };
        if writer.is_none() {
            return Err(self.not_connected());
        }

        let (slot, response) = oneshot::channel();
        self.pending.insert(id.clone(), slot);
        let _guard = PendingGuard {
            table: &self.pending,
            id: id.clone(),
        };

        // The write runs in its own task holding the lock, so dropping this
        // future (timeout, select) can never leave half a line on the pipe.
        let server = self.server_name.clone();
        let mut write = tokio::spawn(async move {
            let mut writer = writer;
            match writer.as_mut() {
                Some(stdin) => write_line(&server, stdin, &line).await,
                None => Err(McpError::NotConnected { server }),
            }
        });
        tokio::select! {
            biased;
            written = &mut write => written.map_err(|e| McpError::TransportError {
                server: self.server_name.clone(),
                reason: format!("write task failed: {e}"),
            })??,
            _ = cancel.cancelled() => return Err(McpError::Cancelled),
            _ = self.shutdown.cancelled() => return Err(McpError::Cancelled),
        }

        tracing::debug!(server = %self.server_name, id = %id, "request sent");

        tokio::select! {
            response = response => response.map_err(|_| McpError::Cancelled),
            _ = cancel.cancelled() => {
                tracing::debug!(server = %self.server_name, id = %id, "request cancelled by caller");
                Err(McpError::Cancelled)
            }
            _ = self.shutdown.cancelled() => Err(McpError::Cancelled),
        }
    }

    fn is_connected(&self) -> bool {
        match lock(&self.child).as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.shutdown.cancel();

        let reader = lock(&self.reader).take();
        if let Some(handle) = reader {
            join_bounded(handle).await;
        }
        let stderr_drain = lock(&self.stderr_drain).take();
        if let Some(handle) = stderr_drain {
            join_bounded(handle).await;
        }

        // Dropping a slot's sender resolves its caller with `Cancelled`.
        let cancelled = self.pending.drain().len();

        let child = lock(&self.child).take();
        if let Some(mut child) = child {
            if matches!(child.try_wait(), Ok(None)) {
                let _ = child.start_kill();
                let _ = tokio::time::timeout(KILL_WAIT_TIMEOUT, child.wait()).await;
            }
        }

        self.writer.lock().await.take();

        tracing::info!(
            server = %self.server_name,
            cancelled,
            "MCP transport disposed"
        );
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.shutdown.cancel();
        drop(self.pending.drain());

        let child = self.child.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(child) = child.as_mut() {
            let _ = child.start_kill();
        }

        for task in [&mut self.reader, &mut self.stderr_drain] {
            if let Some(handle) = task.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
                handle.abort();
            }
        }

        tracing::debug!(server = %self.server_name, "MCP transport dropped without dispose");
    }
}

// ─── Background Tasks ────────────────────────────────────────────────────────

async fn write_line(server: &str, stdin: &mut ChildStdin, line: &str) -> Result<(), McpError> {
    stdin
        .write_all(line.as_bytes())
        .await
        .map_err(|e| McpError::TransportError {
            server: server.to_string(),
            reason: format!("failed to write to stdin: {e}"),
        })?;
    stdin.flush().await.map_err(|e| McpError::TransportError {
        server: server.to_string(),
        reason: format!("failed to flush stdin: {e}"),
    })
}

/// Read one line, lossily decoded. `None` at end of stream.
async fn next_line<R>(reader: &mut BufReader<R>, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

/// Consume the server's stdout until it closes or shutdown is signalled.
async fn read_loop<R>(
    server: String,
    stdout: R,
    pending: Arc<PendingTable>,
    shutdown: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = next_line(&mut reader, &mut buf) => next,
        };

        let line = match next {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::info!(server = %server, "server stdout closed (process may have exited)");
                break;
            }
            Err(e) => {
                tracing::warn!(server = %server, error = %e, "failed to read from stdout");
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match dispatch_line(&pending, trimmed) {
            Dispatch::Delivered => {}
            Dispatch::Abandoned => {
                tracing::debug!(server = %server, "response arrived after caller gave up");
            }
            Dispatch::Stray => {
                tracing::debug!(server = %server, "dropping response with no pending request");
            }
            Dispatch::MissingId | Dispatch::Malformed => {
                // Could be server log output on stdout.
                tracing::debug!(server = %server, line = trimmed, "ignoring non-response line");
            }
        }
    }
}

/// Forward the server's stderr into the log so the pipe never fills up.
async fn drain_stderr<R>(server: String, stderr: R, shutdown: CancellationToken)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = next_line(&mut reader, &mut buf) => next,
        };
        match next {
            Ok(Some(line)) => {
                let line = line.trim_end();
                if !line.is_empty() {
                    tracing::debug!(server = %server, stderr = line, "server stderr");
                }
            }
            Ok(None) | Err(_) => break,
        }
    }
}

async fn join_bounded(mut handle: JoinHandle<()>) {
    if tokio::time::timeout(TASK_JOIN_TIMEOUT, &mut handle).await.is_err() {
        handle.abort();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
