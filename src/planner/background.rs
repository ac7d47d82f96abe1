//! Background command tracker.
//!
//! Some commands outlive the request that carried them: a multi-line gcode
//! is fed to the printer line by line, a print start waits until the
//! printer actually prints.  The planner keeps at most one such command
//! and the driver steps it while napping.

use log::debug;

use crate::app::commands::{CommandId, GcodeText, SharedPath};
use crate::app::ports::{DeviceState, GcodeSubmit, PrinterPort};

/// Progress report of one background step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundResult {
    /// Progress was made; step again soon.
    More,
    /// Waiting on the printer.
    Later,
    Success,
    Failure,
}

impl BackgroundResult {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

/// Gcode being fed into the printer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundGcode {
    gcode: GcodeText,
    /// Byte offset of the first line not yet submitted.
    position: usize,
}

impl BackgroundGcode {
    pub fn new(gcode: GcodeText) -> Self {
        Self { gcode, position: 0 }
    }

    /// Next meaningful line and the offset just past it.
    fn next_line(&self) -> Option<(&str, usize)> {
        let mut offset = self.position;
        for raw in self.gcode[self.position..].split_inclusive('\n') {
            offset += raw.len();
            let line = raw.split(';').next().unwrap_or_default().trim();
            if !line.is_empty() {
                return Some((line, offset));
            }
        }
        None
    }

    fn step(&mut self, printer: &mut impl PrinterPort) -> BackgroundResult {
        let Some((line, next)) = self.next_line() else {
            return BackgroundResult::Success;
        };
        match printer.submit_gcode(line) {
            GcodeSubmit::Submitted => {
                debug!("Background: submitted '{}'", line);
                self.position = next;
                if self.next_line().is_some() {
                    BackgroundResult::More
                } else {
                    BackgroundResult::Success
                }
            }
            GcodeSubmit::Busy => BackgroundResult::Later,
            GcodeSubmit::Failed(reason) => {
                debug!("Background: gcode '{}' failed: {}", line, reason);
                BackgroundResult::Failure
            }
        }
    }
}

/// The long-running part of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackgroundCmd {
    Gcode(BackgroundGcode),
    /// The printer accepted a print start; wait until it prints.
    StartPrint { path: SharedPath },
}

impl BackgroundCmd {
    pub fn step(&mut self, printer: &mut impl PrinterPort) -> BackgroundResult {
        match self {
            Self::Gcode(gcode) => gcode.step(printer),
            Self::StartPrint { .. } => match printer.device_state() {
                DeviceState::Printing | DeviceState::Paused | DeviceState::Finished => {
                    BackgroundResult::Success
                }
                DeviceState::Stopped | DeviceState::Error => BackgroundResult::Failure,
                DeviceState::Idle | DeviceState::Ready | DeviceState::Busy => {
                    BackgroundResult::Later
                }
            },
        }
    }

    /// Reason reported in the `FAILED` event.
    pub fn failure_reason(&self) -> &'static str {
        match self {
            Self::Gcode(_) => "Gcode failed",
            Self::StartPrint { .. } => "Print failed to start",
        }
    }
}

/// A command accepted but still being worked on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundCommand {
    pub id: CommandId,
    pub command: BackgroundCmd,
}
