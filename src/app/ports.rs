//! Port traits: the hexagonal boundary between the planner and the device.
//!
//! ```text
//!   Driver ──▶ Planner ──▶ PrinterPort / TransferPort
//!     │
//!     └──────▶ TransportPort (one request at a time)
//! ```
//!
//! The driver owns every adapter.  The planner borrows the printer and
//! transfer ports for the duration of a single call and never keeps them;
//! only the clock is owned, as it is a plain value.

use core::fmt;

use super::commands::{Block, Command, JobId};
use super::events::{Event, Incident, SendTelemetry, TransferId};

/// Milliseconds since boot.  Wraps; compare with `wrapping_sub`.
pub type Timestamp = u32;

/// Scratch area the driver lends to the planner for staging payloads.
pub const SCRATCH_SIZE: usize = 512;

/// Caller-owned scratch buffer.  See [`PrinterPort::take_changed_path`].
pub type ScratchBuffer = heapless::Vec<u8, SCRATCH_SIZE>;

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic millisecond clock.
pub trait ClockPort {
    fn now_ms(&self) -> Timestamp;
}

// ───────────────────────────────────────────────────────────────
// Printer port (driven adapter: planner → device)
// ───────────────────────────────────────────────────────────────

/// Coarse state of the device, as far as the planner cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Idle,
    Ready,
    Busy,
    Printing,
    Paused,
    Finished,
    Stopped,
    Error,
}

impl DeviceState {
    /// A job is loaded and not yet over.
    pub fn is_printing(self) -> bool {
        matches!(self, Self::Printing | Self::Paused)
    }
}

/// Job control requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobControl {
    Pause,
    Resume,
    Stop,
}

/// Result of handing one gcode line to the printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcodeSubmit {
    Submitted,
    /// The gcode queue is full; try the same line again later.
    Busy,
    Failed(&'static str),
}

/// Metadata of a changed filesystem path.  The path itself is staged in
/// the scratch buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathChange {
    pub is_file: bool,
    pub incident: Incident,
}

/// The device-side surface the command handlers drive.
///
/// Requests answer synchronously (accept or refuse with a static reason).
/// Anything that takes longer is tracked as a background command by the
/// planner and polled through [`device_state`](Self::device_state).
pub trait PrinterPort {
    fn device_state(&self) -> DeviceState;

    /// Id of the currently loaded job, if any.
    fn job_id(&self) -> Option<JobId>;

    /// Fingerprint of everything reported in the `INFO` event.
    fn info_fingerprint(&self) -> u64;

    /// Pop the next changed path, writing it into `scratch`.
    fn take_changed_path(&mut self, scratch: &mut ScratchBuffer) -> Option<PathChange>;

    fn path_exists(&self, path: &str) -> bool;

    /// Returns `false` if the request makes no sense in the current state.
    fn job_control(&mut self, control: JobControl) -> bool;

    fn start_print(&mut self, path: &str) -> Result<(), &'static str>;

    /// Returns `false` if the ready flag can't be changed right now.
    fn set_ready(&mut self, ready: bool) -> bool;

    fn submit_gcode(&mut self, line: &str) -> GcodeSubmit;

    fn delete_file(&mut self, path: &str) -> Result<(), &'static str>;

    fn delete_folder(&mut self, path: &str) -> Result<(), &'static str>;

    fn create_folder(&mut self, path: &str) -> Result<(), &'static str>;
}

// ───────────────────────────────────────────────────────────────
// Transfer port (driven adapter: planner → download subsystem)
// ───────────────────────────────────────────────────────────────

/// Handle of a running download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadHandle {
    pub transfer_id: TransferId,
}

/// Everything needed to open a fresh Connect download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadRequest<'a> {
    pub path: &'a str,
    pub team: u64,
    pub hash: &'a str,
    pub port: Option<u16>,
    /// `(key, iv)` for encrypted downloads.
    pub cipher: Option<(Block, Block)>,
    /// Plain-text size of an encrypted file, `0` when unknown.
    pub orig_size: u32,
}

/// Everything needed to continue a broken encrypted download.
///
/// The transfer subsystem knows how many bytes already reached the disk;
/// the planner supplies what it can't reconstruct from the partial file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeRequest {
    pub transfer_id: TransferId,
    pub orig_size: u32,
    pub port: Option<u16>,
    pub iv: Block,
}

/// Why the transfer subsystem refused to (re)start a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadRefused {
    /// Another transfer occupies the only slot.
    NoTransferSlot,
    AlreadyExists,
    Storage(&'static str),
    /// The file server said no.
    Refused,
    /// Network trouble while opening the stream.
    Network,
}

impl DownloadRefused {
    pub fn reason(self) -> &'static str {
        match self {
            Self::NoTransferSlot => "Another transfer in progress",
            Self::AlreadyExists => "File already exists",
            Self::Storage(msg) => msg,
            Self::Refused => "Failed to download",
            Self::Network => "Network error",
        }
    }
}

impl fmt::Display for DownloadRefused {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// Outcome of one step of the download, reported through
/// [`Planner::download_done`](crate::planner::Planner::download_done).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStep {
    Continue,
    Finished,
    /// Transient: the connection broke mid-stream.
    FailedNetwork,
    FailedOther(&'static str),
    /// Stopped on request.
    Aborted,
}

/// How a transfer the planner merely observed ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Finished,
    Stopped,
    Error,
}

pub trait TransferPort {
    fn start_download(
        &mut self,
        request: &DownloadRequest<'_>,
    ) -> Result<DownloadHandle, DownloadRefused>;

    fn resume_download(
        &mut self,
        request: &ResumeRequest,
    ) -> Result<DownloadHandle, DownloadRefused>;

    /// Move the running download forward.  Driver-side only.
    fn step_download(&mut self) -> DownloadStep;

    /// The transfer currently occupying the slot (ours or anyone's).
    fn current_transfer(&self) -> Option<TransferId>;

    /// How a finished transfer ended, if still remembered.
    fn transfer_outcome(&self, id: TransferId) -> Option<TransferOutcome>;

    /// Ask the running transfer to stop.  `false` if nothing is running.
    fn request_stop(&mut self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Transport port (driver only)
// ───────────────────────────────────────────────────────────────

/// Failure of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Could not talk to the server at all (DNS, TCP, TLS, timeout).
    Network,
    /// The server answered with a refusal status.
    Refused(u16),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network failure"),
            Self::Refused(status) => write!(f, "refused with status {status}"),
        }
    }
}

/// The single, non-multiplexed connection to the server.
///
/// A successful request may carry a command back.
pub trait TransportPort {
    fn send_telemetry(
        &mut self,
        telemetry: SendTelemetry,
    ) -> Result<Option<Command>, TransportError>;

    fn send_event(&mut self, event: &Event) -> Result<Option<Command>, TransportError>;
}
