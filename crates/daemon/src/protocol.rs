// SPDX-License-Identifier: MIT

//! IPC protocol for daemon communication.
//!
//! Wire format: one JSON object per line, the same newline-delimited
//! JSON the durable event log uses. Frames are bounded by
//! [`MAX_FRAME_BYTES`] and carry their timeout inside the send/receive
//! helpers. The HTTP facade translates its routes onto these requests;
//! error kinds carry enough category for it to pick a status code.

use dg_core::{
    Artifact, Clarification, ClarificationStatus, EventRecord, JobRun, JobStatus, Project,
    ProjectStatus, ProtocolRun, QaResult, SpecRun, StepRun,
};
use dg_engine::{ReconciliationReport, RecoveryOutcome};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle action on a protocol run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolAction {
    Start,
    Pause,
    Resume,
    Cancel,
}

/// Action on a step run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    Run,
    Retry,
    Qa,
}

/// Request from a client (CLI or HTTP facade) to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Health check ping
    Ping,

    /// Version handshake
    Hello { version: String },

    /// Readiness with component breakdown
    Ready,

    /// Request daemon shutdown
    Shutdown,

    // -- projects --
    CreateProject {
        name: String,
        #[serde(default)]
        git_url: Option<String>,
        #[serde(default)]
        base_branch: Option<String>,
        #[serde(default)]
        local_path: Option<String>,
        #[serde(default)]
        policy_overrides: Option<serde_json::Value>,
    },
    ListProjects {
        #[serde(default)]
        status: Option<ProjectStatus>,
    },
    GetProject {
        id: u64,
    },
    UpdateProject {
        id: u64,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        git_url: Option<String>,
        #[serde(default)]
        base_branch: Option<String>,
        #[serde(default)]
        local_path: Option<String>,
        #[serde(default)]
        policy_overrides: Option<serde_json::Value>,
    },
    DeleteProject {
        id: u64,
    },
    ArchiveProject {
        id: u64,
    },
    UnarchiveProject {
        id: u64,
    },

    // -- protocols --
    CreateProtocol {
        project_id: u64,
        protocol_name: String,
        #[serde(default)]
        base_branch: Option<String>,
        #[serde(default)]
        description: String,
        #[serde(default)]
        template_config: Option<serde_json::Value>,
    },
    ListProtocols {
        #[serde(default)]
        project_id: Option<u64>,
        #[serde(default)]
        limit: usize,
    },
    GetProtocol {
        id: u64,
    },
    ProtocolAction {
        id: u64,
        action: ProtocolAction,
    },
    CheckCompleteProtocol {
        id: u64,
    },
    ListProtocolArtifacts {
        id: u64,
    },

    // -- steps --
    StepAction {
        id: u64,
        action: StepAction,
        #[serde(default)]
        engine_id: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },

    // -- job runs --
    ListRuns {
        #[serde(default)]
        project_id: Option<u64>,
        #[serde(default)]
        protocol_run_id: Option<u64>,
        #[serde(default)]
        step_run_id: Option<u64>,
        #[serde(default)]
        status: Option<JobStatus>,
        #[serde(default)]
        job_type: Option<String>,
        #[serde(default)]
        limit: usize,
    },
    GetRun {
        run_id: String,
    },
    GetRunLogs {
        run_id: String,
        /// Byte cap; clamped to 2,000,000.
        #[serde(default)]
        max_bytes: usize,
    },
    ListRunArtifacts {
        run_id: String,
    },
    GetArtifactContent {
        run_id: String,
        name: String,
    },

    // -- events --
    RecentEvents {
        #[serde(default)]
        limit: usize,
        #[serde(default)]
        project_id: Option<u64>,
        #[serde(default)]
        protocol_id: Option<u64>,
        #[serde(default)]
        event_type: Option<String>,
        #[serde(default)]
        category: Option<String>,
    },

    // -- clarifications --
    ListClarifications {
        #[serde(default)]
        project_id: Option<u64>,
        #[serde(default)]
        status: Option<ClarificationStatus>,
    },
    AnswerClarification {
        id: u64,
        answer: String,
        answered_by: String,
    },
    DismissClarification {
        id: u64,
    },

    // -- reconciliation --
    Reconcile {
        #[serde(default)]
        protocol_run_id: Option<u64>,
        #[serde(default)]
        dry_run: bool,
    },
    ReconciliationStatus,

    // -- spec runs --
    CreateSpecRun {
        project_id: u64,
        spec_name: String,
        #[serde(default)]
        branch_name: Option<String>,
        #[serde(default)]
        base_branch: Option<String>,
    },
    ListSpecRuns {
        #[serde(default)]
        project_id: Option<u64>,
    },
    SetSpecRunStatus {
        id: u64,
        status: dg_core::SpecRunStatus,
    },

    // -- recovery --
    RecoverStuck,

    // -- webhooks --
    WindmillWebhook {
        windmill_job_id: String,
        status: String,
        #[serde(default)]
        result: Option<serde_json::Value>,
        #[serde(default)]
        error: Option<String>,
    },
    CiWebhook {
        provider: String,
        #[serde(default)]
        repo_url: Option<String>,
        #[serde(default)]
        summary: Option<String>,
    },
}

/// Error category for boundary mapping (the HTTP facade picks the
/// status code from this).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidTransition,
    NotFound,
    Validation,
    AgentUnavailable,
    ExecutionBlocked,
    Timeout,
    Transient,
    ExternalExecutor,
    Configuration,
    Internal,
}

/// Protocol run with its ordered steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProtocolDetail {
    pub run: ProtocolRun,
    pub steps: Vec<StepRun>,
}

/// Response from daemon to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    /// Generic success
    Ok,

    /// Health check response
    Pong,

    /// Version handshake response
    Hello { version: String },

    /// Daemon is shutting down
    ShuttingDown,

    /// Error response
    Error { kind: ErrorKind, message: String },

    Project { project: Project },
    Projects { projects: Vec<Project> },

    Protocol { detail: ProtocolDetail },
    Protocols { protocols: Vec<ProtocolRun> },

    Step { step: StepRun },
    Qa { result: QaResult, step: StepRun },

    Runs { runs: Vec<JobRun> },
    Run { run: JobRun },
    RunLogs {
        log_path: Option<String>,
        content: String,
        truncated: bool,
    },

    Artifacts { artifacts: Vec<Artifact> },
    ArtifactContent { name: String, content: String },

    Events { events: Vec<EventRecord> },

    Clarifications { clarifications: Vec<Clarification> },
    Clarification { clarification: Clarification },

    Reconciliation { report: ReconciliationReport },
    ReconciliationLast { report: Option<ReconciliationReport> },

    Recovery { outcomes: Vec<RecoveryOutcome> },

    /// Webhook acknowledged; `status` is "updated" or "ignored".
    Webhook { status: String },

    Ready(crate::health::ReadinessReport),

    SpecRuns { spec_runs: Vec<SpecRun> },
    SpecRun { spec_run: SpecRun },

    Complete { complete: bool },
}

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame exceeds {max} bytes")]
    FrameTooLarge { max: usize },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout")]
    Timeout,
}

/// Frame ceiling. Requests are tiny and the bulky responses (run logs,
/// artifact bodies) are byte-capped upstream, so anything bigger than
/// this is a confused or hostile peer.
pub const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Default IPC timeout
pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Protocol version (from Cargo.toml)
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Send one frame: the message as a single JSON line.
///
/// Framing matches the durable event log: newline-delimited JSON.
/// serde_json escapes newlines inside strings, so the terminator is
/// unambiguous and a peer can debug the wire with a line reader. The
/// timeout covers serialization through flush.
pub async fn send_frame<W, T>(
    writer: &mut W,
    msg: &T,
    timeout: std::time::Duration,
) -> Result<(), ProtocolError>
where
    W: tokio::io::AsyncWriteExt + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(msg)?;
    if line.len() >= MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge {
            max: MAX_FRAME_BYTES,
        });
    }
    line.push(b'\n');

    tokio::time::timeout(timeout, async {
        writer.write_all(&line).await?;
        writer.flush().await
    })
    .await
    .map_err(|_| ProtocolError::Timeout)??;
    Ok(())
}

/// Receive one frame.
///
/// Reads through a `take`-bounded cursor so an unterminated line from a
/// bad peer cannot grow without limit: hitting the cap with no newline
/// in sight is a `FrameTooLarge`, EOF before any byte is a clean close.
pub async fn recv_frame<R, T>(
    reader: &mut R,
    timeout: std::time::Duration,
) -> Result<T, ProtocolError>
where
    R: tokio::io::AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    use tokio::io::AsyncBufReadExt as _;
    use tokio::io::AsyncReadExt as _;

    let mut line = String::new();
    let mut bounded = reader.take(MAX_FRAME_BYTES as u64);
    let read = tokio::time::timeout(timeout, bounded.read_line(&mut line))
        .await
        .map_err(|_| ProtocolError::Timeout)??;

    if read == 0 {
        return Err(ProtocolError::ConnectionClosed);
    }
    if !line.ends_with('\n') {
        // Either the peer hung up mid-frame or the frame blew the cap.
        if read >= MAX_FRAME_BYTES {
            return Err(ProtocolError::FrameTooLarge {
                max: MAX_FRAME_BYTES,
            });
        }
        return Err(ProtocolError::ConnectionClosed);
    }
    Ok(serde_json::from_str(line.trim_end())?)
}

/// Read a request frame.
pub async fn read_request<R>(
    reader: &mut R,
    timeout: std::time::Duration,
) -> Result<Request, ProtocolError>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    recv_frame(reader, timeout).await
}

/// Write a response frame.
pub async fn write_response<W>(
    writer: &mut W,
    response: &Response,
    timeout: std::time::Duration,
) -> Result<(), ProtocolError>
where
    W: tokio::io::AsyncWriteExt + Unpin,
{
    send_frame(writer, response, timeout).await
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
