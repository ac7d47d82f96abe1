//! Download resume manager.
//!
//! Wraps a running Connect download with what is needed to restart it
//! after the connection breaks: original size, port and the initial IV.
//!
//! Only encrypted downloads can be resumed.  A plain-text download would
//! need far more state to pick up mid-stream, and is only ever used on
//! local networks anyway, so it simply gets a retry budget of zero.  The
//! same code path then makes every failure terminal.
//!
//! ```text
//!            FailedNetwork, budget left
//!   Running ───────────────────────────▶ NeedsRetry
//!      ▲                                    │
//!      └──────── recover_download ──────────┘
//!
//!   any state ── Finished / FailedOther / Aborted / budget spent ──▶ gone
//! ```

use log::{info, warn};

use crate::app::commands::{BLOCK_SIZE, Block, Encryption};
use crate::app::events::{EventType, TransferId};
use crate::app::ports::{DownloadHandle, DownloadStep, ResumeRequest};

/// What the planner should do after a download step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Keep going.
    Continue,
    /// Broken but resumable; wait for `recover_download`.
    Retry,
    /// Over.  Report an event of this kind.
    Done {
        kind: EventType,
        reason: Option<&'static str>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumableDownload {
    download: DownloadHandle,
    orig_size: u32,
    port: Option<u16>,
    orig_iv: Block,
    need_retry: bool,
    allowed_retries: u8,
}

impl ResumableDownload {
    /// A plain-text download.  Never resumed.
    pub fn plain(download: DownloadHandle, port: Option<u16>) -> Self {
        Self {
            download,
            orig_size: 0,
            port,
            orig_iv: [0; BLOCK_SIZE],
            need_retry: false,
            allowed_retries: 0,
        }
    }

    pub fn encrypted(
        download: DownloadHandle,
        encryption: &Encryption,
        port: Option<u16>,
        allowed_retries: u8,
    ) -> Self {
        Self {
            download,
            orig_size: encryption.orig_size,
            port,
            orig_iv: encryption.iv,
            need_retry: false,
            allowed_retries,
        }
    }

    pub fn transfer_id(&self) -> TransferId {
        self.download.transfer_id
    }

    pub fn need_retry(&self) -> bool {
        self.need_retry
    }

    pub fn allowed_retries(&self) -> u8 {
        self.allowed_retries
    }

    /// Digest a step reported by the transfer subsystem.
    pub fn on_step(&mut self, step: DownloadStep) -> StepOutcome {
        match step {
            DownloadStep::Continue => StepOutcome::Continue,
            DownloadStep::Finished => StepOutcome::Done {
                kind: EventType::TransferFinished,
                reason: None,
            },
            DownloadStep::Aborted => StepOutcome::Done {
                kind: EventType::TransferStopped,
                reason: None,
            },
            DownloadStep::FailedOther(reason) => StepOutcome::Done {
                kind: EventType::TransferAborted,
                reason: Some(reason),
            },
            DownloadStep::FailedNetwork => self.network_failure(),
        }
    }

    /// One transient failure spends one retry.  The failure that spends
    /// the last one is terminal.
    pub fn network_failure(&mut self) -> StepOutcome {
        self.allowed_retries = self.allowed_retries.saturating_sub(1);
        if self.allowed_retries == 0 {
            warn!(
                "Download: transfer {} broke with no retries left",
                self.transfer_id()
            );
            self.need_retry = false;
            return StepOutcome::Done {
                kind: EventType::TransferAborted,
                reason: Some("Network error"),
            };
        }
        info!(
            "Download: transfer {} broke, {} retries left",
            self.transfer_id(),
            self.allowed_retries
        );
        self.need_retry = true;
        StepOutcome::Retry
    }

    /// Parameters to hand to the transfer subsystem for the restart.
    pub fn resume_request(&self) -> ResumeRequest {
        ResumeRequest {
            transfer_id: self.transfer_id(),
            orig_size: self.orig_size,
            port: self.port,
            iv: self.orig_iv,
        }
    }

    /// The transfer subsystem restarted the stream.
    pub fn resumed(&mut self, download: DownloadHandle) {
        self.download = download;
        self.need_retry = false;
    }
}
