//! Outbound events and the actions handed to the driver.
//!
//! The planner only ever produces structured values.  Turning an
//! [`Event`] into wire bytes is the job of the codec behind the
//! [`TransportPort`](super::ports::TransportPort).

use core::fmt;
use core::time::Duration;

use serde::Serialize;

use super::commands::{CommandId, JobId, SharedPath};

/// Identifier of a file transfer, assigned by the transfer subsystem.
pub type TransferId = u32;

/// Kind of an outbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Info,
    JobInfo,
    FileInfo,
    FileChanged,
    TransferInfo,
    Rejected,
    Accepted,
    Finished,
    Failed,
    TransferStopped,
    TransferAborted,
    TransferFinished,
}

impl EventType {
    /// Name of the event as the server knows it.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::JobInfo => "JOB_INFO",
            Self::FileInfo => "FILE_INFO",
            Self::FileChanged => "FILE_CHANGED",
            Self::TransferInfo => "TRANSFER_INFO",
            Self::Rejected => "REJECTED",
            Self::Accepted => "ACCEPTED",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
            Self::TransferStopped => "TRANSFER_STOPPED",
            Self::TransferAborted => "TRANSFER_ABORTED",
            Self::TransferFinished => "TRANSFER_FINISHED",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to a path reported in a `FILE_CHANGED` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Incident {
    Created,
    Deleted,
    /// Several changes were merged; the server should re-read the subtree.
    Combined,
}

/// An outbound notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    #[serde(rename = "event")]
    pub kind: EventType,
    pub command_id: Option<CommandId>,
    pub job_id: Option<JobId>,
    pub path: Option<SharedPath>,
    pub transfer_id: Option<TransferId>,
    /// Constant human-readable reason.  Never built at runtime.
    pub reason: Option<&'static str>,
    pub is_file: bool,
    pub incident: Option<Incident>,
    /// The command that started whatever this event reports on.
    pub start_cmd_id: Option<CommandId>,
}

impl Event {
    pub fn new(kind: EventType) -> Self {
        Self {
            kind,
            command_id: None,
            job_id: None,
            path: None,
            transfer_id: None,
            reason: None,
            is_file: false,
            incident: None,
            start_cmd_id: None,
        }
    }

    /// Reply to a specific command.
    pub fn reply(kind: EventType, command_id: CommandId) -> Self {
        Self {
            command_id: Some(command_id),
            ..Self::new(kind)
        }
    }

    /// `REJECTED` reply citing a static reason.
    pub fn rejected(command_id: CommandId, reason: &'static str) -> Self {
        Self::reply(EventType::Rejected, command_id).with_reason(reason)
    }

    #[must_use]
    pub fn with_reason(mut self, reason: &'static str) -> Self {
        self.reason = Some(reason);
        self
    }

    #[must_use]
    pub fn with_job(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: SharedPath) -> Self {
        self.path = Some(path);
        self
    }

    #[must_use]
    pub fn with_transfer(mut self, transfer_id: Option<TransferId>) -> Self {
        self.transfer_id = transfer_id;
        self
    }

    #[must_use]
    pub fn with_start_cmd(mut self, start_cmd_id: Option<CommandId>) -> Self {
        self.start_cmd_id = start_cmd_id;
        self
    }
}

/// Ask the driver to send telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendTelemetry {
    /// Nothing has been observed yet; send a telemetry without data.
    pub empty: bool,
}

/// State of the download slot, as advertised in a [`Sleep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadActivity {
    /// The transfer is running and wants to be stepped.
    Running,
    /// The transfer broke and waits for
    /// [`Planner::recover_download`](crate::planner::Planner::recover_download).
    NeedsRetry,
}

/// Nothing to send right now.
///
/// The driver may nap for `duration`, stepping the background command
/// and the download in the meantime.  An incoming command may cut the nap
/// short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sleep {
    pub duration: Duration,
    /// A background command wants stepping.
    pub background: bool,
    pub download: Option<DownloadActivity>,
}

/// What the driver should do next.
///
/// Everything except [`Action::Sleep`] expects a matching
/// [`Planner::action_done`](crate::planner::Planner::action_done).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SendTelemetry(SendTelemetry),
    Event(Event),
    Sleep(Sleep),
}

impl Action {
    /// Whether the driver owes an `action_done` for this action.
    pub fn expects_done(&self) -> bool {
        !matches!(self, Self::Sleep(_))
    }
}

/// Outcome of a sending action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionResult {
    Ok,
    /// Transport-level failure; the server never saw (or never answered)
    /// the request.
    Failed,
    /// The server understood the request and said no.
    Refused,
}
