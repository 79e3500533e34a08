//! Bridge to live spreadsheet applications running a session server.
//!
//! Each open workbook is announced by a discovery file; the runtime connects
//! over localhost TCP and speaks the JSONL protocol from `livesheet-protocol`.

use std::fs;
use std::io::{BufReader, BufWriter, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use livesheet_config::Settings;
use livesheet_protocol::{
    ApplyOpsMessage, ApplyOpsResultMessage, CellInfo, CellRange, ClientMessage, DiscoveryFile,
    Extent, HelloMessage, InspectMessage, InspectResult, InspectTarget, Op, PingMessage,
    ServerMessage, WorkbookInfo, PROTOCOL_VERSION,
};
use uuid::Uuid;

use crate::error::{LiveSheetError, Result};
use crate::workbook::{AppInstance, LiveWorkbook, OpenWorkbook, WorkbookDirectory};

// ============================================================================
// Discovery
// ============================================================================

/// A running session as read from its discovery file.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct LiveSession {
    pub session_id: Uuid,
    pub port: u16,
    pub pid: u32,
    pub workbook_path: Option<PathBuf>,
    pub workbook_title: String,
    pub created_at: DateTime<Utc>,
    pub protocol_version: u32,
}

impl LiveSession {
    /// `None` when the file carries a malformed id or timestamp.
    pub fn from_discovery(file: DiscoveryFile) -> Option<Self> {
        let session_id = Uuid::parse_str(&file.session_id).ok()?;
        let created_at = DateTime::parse_from_rfc3339(&file.created_at).ok()?.with_timezone(&Utc);
        Some(Self {
            session_id,
            port: file.port,
            pid: file.pid,
            workbook_path: file.workbook_path,
            workbook_title: file.workbook_title,
            created_at,
            protocol_version: file.protocol_version,
        })
    }
}

/// Platform-specific directory for discovery files.
pub fn discovery_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        let base = std::env::var("XDG_STATE_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local/state")
            });
        base.join("livesheet/sessions")
    }

    #[cfg(target_os = "macos")]
    {
        let base = dirs::data_dir().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join("Library/Application Support")
        });
        base.join("livesheet/sessions")
    }

    #[cfg(target_os = "windows")]
    {
        let base = dirs::data_local_dir().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("C:\\"))
                .join("AppData\\Local")
        });
        base.join("livesheet\\sessions")
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        std::env::temp_dir().join("livesheet/sessions")
    }
}

/// Check if a process is still running.
fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        let Ok(pid) = i32::try_from(pid) else {
            return false;
        };
        unsafe { libc::kill(pid, 0) == 0 }
    }

    #[cfg(windows)]
    {
        use windows_sys::Win32::Foundation::CloseHandle;
        use windows_sys::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

        unsafe {
            let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
            if !handle.is_null() {
                CloseHandle(handle);
                true
            } else {
                false
            }
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        true
    }
}

/// List live sessions in `dir`, newest first. Files of dead processes are removed.
pub fn list_sessions_in(dir: &Path) -> std::io::Result<Vec<LiveSession>> {
    scan_sessions(dir, true)
}

/// Like [`list_sessions_in`], but leaves files of dead processes in place.
pub fn live_sessions_in(dir: &Path) -> std::io::Result<Vec<LiveSession>> {
    scan_sessions(dir, false)
}

fn scan_sessions(dir: &Path, prune: bool) -> std::io::Result<Vec<LiveSession>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut sessions = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().map_or(true, |ext| ext != "json") {
            continue;
        }
        let Ok(contents) = fs::read_to_string(&path) else {
            continue;
        };
        let Some(session) = serde_json::from_str::<DiscoveryFile>(&contents)
            .ok()
            .and_then(LiveSession::from_discovery)
        else {
            log::debug!("skipping unreadable discovery file {}", path.display());
            continue;
        };

        if is_process_alive(session.pid) {
            sessions.push(session);
        } else if prune {
            log::debug!("removing stale discovery file {}", path.display());
            let _ = fs::remove_file(&path);
        }
    }

    sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(sessions)
}

/// List sessions in the configured (or platform) discovery directory.
pub fn list_sessions(settings: &Settings) -> std::io::Result<Vec<LiveSession>> {
    let dir = settings.discovery_dir.clone().unwrap_or_else(discovery_dir);
    list_sessions_in(&dir)
}

// ============================================================================
// Session Client
// ============================================================================

/// Maximum line size (10MB). Protects against memory exhaustion from malformed/hostile messages.
pub const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub connect: Duration,
    pub io: Duration,
}

impl Timeouts {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            connect: Duration::from_secs(settings.connect_timeout_secs),
            io: Duration::from_secs(settings.io_timeout_secs),
        }
    }
}

/// A client connection to one session server.
pub struct SessionClient {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    session_id: String,
    revision: u64,
    next_id: u64,
}

impl SessionClient {
    /// Connect to `port` on localhost and perform the hello handshake.
    pub fn connect(port: u16, token: &str, timeouts: Timeouts) -> std::result::Result<Self, SessionError> {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let stream = TcpStream::connect_timeout(&addr, timeouts.connect)
            .map_err(|e| SessionError::ConnectionFailed(e.to_string()))?;

        stream.set_read_timeout(Some(timeouts.io))
            .map_err(|e| SessionError::ConnectionFailed(e.to_string()))?;
        stream.set_write_timeout(Some(timeouts.io))
            .map_err(|e| SessionError::ConnectionFailed(e.to_string()))?;

        let reader = BufReader::new(stream.try_clone()
            .map_err(|e| SessionError::ConnectionFailed(e.to_string()))?);
        let writer = BufWriter::new(stream);

        let mut client = Self {
            reader,
            writer,
            session_id: String::new(),
            revision: 0,
            next_id: 1,
        };

        let hello = ClientMessage::Hello(HelloMessage {
            id: client.next_request_id(),
            client: "livesheet".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            token: token.to_string(),
            protocol_version: PROTOCOL_VERSION,
        });
        client.send(&hello)?;

        match client.receive()? {
            ServerMessage::Welcome(welcome) => {
                if welcome.protocol_version != PROTOCOL_VERSION {
                    return Err(SessionError::ProtocolError(format!(
                        "server speaks protocol v{}, expected v{}",
                        welcome.protocol_version, PROTOCOL_VERSION
                    )));
                }
                client.session_id = welcome.session_id;
                client.revision = welcome.revision;
                Ok(client)
            }
            ServerMessage::Error(err) => Err(SessionError::AuthFailed(err.message)),
            _ => Err(SessionError::ProtocolError("Unexpected response to hello".into())),
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Apply operations to the session.
    pub fn apply_ops(&mut self, ops: Vec<Op>, atomic: bool) -> std::result::Result<ApplyOpsResultMessage, SessionError> {
        let msg = ClientMessage::ApplyOps(ApplyOpsMessage {
            id: self.next_request_id(),
            ops,
            atomic,
        });
        self.send(&msg)?;

        match self.receive()? {
            ServerMessage::ApplyOpsResult(result) => {
                self.revision = result.revision;
                Ok(result)
            }
            ServerMessage::Error(err) => Err(SessionError::ServerError { code: err.code, message: err.message }),
            _ => Err(SessionError::ProtocolError("Unexpected response to apply_ops".into())),
        }
    }

    pub fn inspect(&mut self, target: InspectTarget) -> std::result::Result<InspectResult, SessionError> {
        let msg = ClientMessage::Inspect(InspectMessage {
            id: self.next_request_id(),
            target,
        });
        self.send(&msg)?;

        match self.receive()? {
            ServerMessage::InspectResult(result) => {
                self.revision = result.revision;
                Ok(result.result)
            }
            ServerMessage::Error(err) => Err(SessionError::ServerError { code: err.code, message: err.message }),
            _ => Err(SessionError::ProtocolError("Unexpected response to inspect".into())),
        }
    }

    pub fn ping(&mut self) -> std::result::Result<(), SessionError> {
        let msg = ClientMessage::Ping(PingMessage {
            id: self.next_request_id(),
        });
        self.send(&msg)?;

        match self.receive()? {
            ServerMessage::Pong(_) => Ok(()),
            ServerMessage::Error(err) => Err(SessionError::ServerError { code: err.code, message: err.message }),
            _ => Err(SessionError::ProtocolError("Unexpected response to ping".into())),
        }
    }

    fn next_request_id(&mut self) -> String {
        let id = self.next_id;
        self.next_id += 1;
        id.to_string()
    }

    fn send(&mut self, msg: &ClientMessage) -> std::result::Result<(), SessionError> {
        let json = serde_json::to_string(msg)
            .map_err(|e| SessionError::ProtocolError(e.to_string()))?;
        writeln!(self.writer, "{}", json)
            .map_err(|e| SessionError::IoError(e.to_string()))?;
        self.writer.flush()
            .map_err(|e| SessionError::IoError(e.to_string()))?;
        Ok(())
    }

    fn receive(&mut self) -> std::result::Result<ServerMessage, SessionError> {
        let line = read_line_bounded(&mut self.reader, MAX_LINE_BYTES)?;

        serde_json::from_str(&line)
            .map_err(|e| SessionError::ProtocolError(format!("Invalid JSON: {}", e)))
    }
}

/// Read one newline-terminated frame of at most `max_bytes`.
pub fn read_line_bounded<R: Read>(reader: &mut R, max_bytes: usize) -> std::result::Result<String, SessionError> {
    let mut buf = Vec::with_capacity(4096);

    loop {
        let mut byte = [0u8; 1];
        match reader.read(&mut byte) {
            Ok(0) => {
                if buf.is_empty() {
                    return Err(SessionError::ConnectionClosed);
                }
                return Err(SessionError::ProtocolError(
                    "connection closed mid-frame (no newline)".to_string()
                ));
            }
            Ok(_) => {
                if byte[0] == b'\n' {
                    break;
                }
                buf.push(byte[0]);

                if buf.len() > max_bytes {
                    return Err(SessionError::ProtocolError(format!(
                        "message exceeds {} byte limit",
                        max_bytes
                    )));
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(SessionError::IoError(e.to_string())),
        }
    }

    String::from_utf8(buf)
        .map_err(|e| SessionError::ProtocolError(format!("Invalid UTF-8: {}", e)))
}

/// Errors that can occur when talking to a session server.
#[derive(Debug)]
pub enum SessionError {
    ConnectionFailed(String),
    ConnectionClosed,
    AuthFailed(String),
    IoError(String),
    ProtocolError(String),
    ServerError { code: String, message: String },
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::ConnectionFailed(msg) => write!(f, "Connection failed: {}", msg),
            SessionError::ConnectionClosed => write!(f, "Connection closed by server"),
            SessionError::AuthFailed(msg) => write!(f, "Authentication failed: {}", msg),
            SessionError::IoError(msg) => write!(f, "I/O error: {}", msg),
            SessionError::ProtocolError(msg) => write!(f, "Protocol error: {}", msg),
            SessionError::ServerError { code, message } => write!(f, "Server error [{}]: {}", code, message),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<SessionError> for LiveSheetError {
    fn from(err: SessionError) -> Self {
        LiveSheetError::Bridge(err.to_string())
    }
}

// ============================================================================
// Capabilities
// ============================================================================

/// Workbook served by a remote session. Connects on first use.
pub struct RemoteWorkbook {
    session: LiveSession,
    token: String,
    timeouts: Timeouts,
    client: Option<SessionClient>,
}

impl RemoteWorkbook {
    pub fn new(session: LiveSession, token: &str, timeouts: Timeouts) -> Self {
        Self { session, token: token.to_string(), timeouts, client: None }
    }

    pub fn session(&self) -> &LiveSession {
        &self.session
    }

    fn client(&mut self) -> Result<&mut SessionClient> {
        if self.client.is_none() {
            log::debug!(
                "connecting to session {} on port {}",
                self.session.session_id,
                self.session.port
            );
            let client = SessionClient::connect(self.session.port, &self.token, self.timeouts)?;
            self.client = Some(client);
        }
        self.client
            .as_mut()
            .ok_or_else(|| LiveSheetError::Bridge("session client unavailable".into()))
    }

    fn inspect(&mut self, target: InspectTarget) -> Result<InspectResult> {
        let result = self.client()?.inspect(target);
        if result.is_err() {
            // reconnect on the next call
            self.client = None;
        }
        Ok(result?)
    }
}

impl LiveWorkbook for RemoteWorkbook {
    fn info(&mut self) -> Result<WorkbookInfo> {
        match self.inspect(InspectTarget::Workbook)? {
            InspectResult::Workbook(info) => Ok(info),
            other => Err(unexpected("workbook", &other)),
        }
    }

    fn used_extent(&mut self, sheet: &str) -> Result<Option<Extent>> {
        match self.inspect(InspectTarget::UsedExtent { sheet: sheet.to_string() })? {
            InspectResult::UsedExtent { extent } => Ok(extent),
            other => Err(unexpected("used_extent", &other)),
        }
    }

    fn read_range(&mut self, sheet: &str, range: CellRange) -> Result<Vec<Vec<CellInfo>>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        match self.inspect(InspectTarget::Range { sheet: sheet.to_string(), range })? {
            InspectResult::Range { rows } => Ok(rows),
            other => Err(unexpected("range", &other)),
        }
    }

    fn apply(&mut self, ops: Vec<Op>) -> Result<()> {
        let total = ops.len();
        let result = match self.client()?.apply_ops(ops, true) {
            Ok(result) => result,
            Err(e) => {
                self.client = None;
                return Err(e.into());
            }
        };
        if let Some(err) = result.error {
            return Err(LiveSheetError::Bridge(format!(
                "op {} rejected [{}]: {}",
                err.op_index, err.code, err.message
            )));
        }
        if result.applied != total {
            return Err(LiveSheetError::Bridge(format!(
                "server applied {} of {} ops",
                result.applied, total
            )));
        }
        Ok(())
    }
}

fn unexpected(wanted: &str, got: &InspectResult) -> LiveSheetError {
    LiveSheetError::Bridge(format!("expected {wanted} inspect result, got {got:?}"))
}

/// Directory over the discovery files of running session servers.
pub struct RemoteDirectory {
    dir: PathBuf,
    token: String,
    timeouts: Timeouts,
}

impl RemoteDirectory {
    pub fn new(dir: PathBuf, token: &str, timeouts: Timeouts) -> Self {
        Self { dir, token: token.to_string(), timeouts }
    }

    /// Discovery dir, token and timeouts from settings. A missing token is sent empty.
    pub fn from_settings(settings: &Settings) -> Self {
        let dir = settings.discovery_dir.clone().unwrap_or_else(discovery_dir);
        let token = settings.session_token().unwrap_or_default();
        Self::new(dir, &token, Timeouts::from_settings(settings))
    }

    /// Lookups never touch the discovery directory.
    fn sessions(&self) -> Result<Vec<LiveSession>> {
        live_sessions_in(&self.dir).map_err(|e| {
            LiveSheetError::Bridge(format!("cannot read discovery dir {}: {e}", self.dir.display()))
        })
    }

    fn listing(&self, session: LiveSession) -> OpenWorkbook<RemoteWorkbook> {
        OpenWorkbook {
            name: session.workbook_title.clone(),
            full_path: session
                .workbook_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            handle: RemoteWorkbook::new(session, &self.token, self.timeouts),
        }
    }
}

impl WorkbookDirectory for RemoteDirectory {
    type Handle = RemoteWorkbook;

    /// Workbooks of the process owning the newest session.
    fn default_instance(&self) -> Result<Vec<OpenWorkbook<RemoteWorkbook>>> {
        let sessions = self.sessions()?;
        let Some(pid) = sessions.first().map(|s| s.pid) else {
            return Ok(Vec::new());
        };
        Ok(sessions
            .into_iter()
            .filter(|s| s.pid == pid)
            .map(|s| self.listing(s))
            .collect())
    }

    fn instances(&self) -> Result<Vec<AppInstance<RemoteWorkbook>>> {
        let mut instances: Vec<AppInstance<RemoteWorkbook>> = Vec::new();
        for session in self.sessions()? {
            let pid = session.pid;
            let listing = self.listing(session);
            match instances.iter_mut().find(|i| i.pid == pid) {
                Some(instance) => instance.workbooks.push(listing),
                None => instances.push(AppInstance { pid, workbooks: vec![listing] }),
            }
        }
        Ok(instances)
    }
}

// ============================================================================
// Tests
// ============================================================================
