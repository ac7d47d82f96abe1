//! Reference driver.
//!
//! Glue between the planner and the adapters: asks for the next action,
//! performs it on the transport, reports the result and feeds any command
//! that came back.  While the planner says nap, the background command
//! and the download are stepped.
//!
//! ```text
//!   loop {
//!       match driver.tick(..)? {
//!           Tick::Sent(_) => {}
//!           Tick::Slept(d) => wait(d),   // or until a command arrives
//!       }
//!   }
//! ```
//!
//! The driver does not sleep itself; the caller owns the event loop.

use core::time::Duration;

use anyhow::{Context, Result};
use log::{debug, warn};

use crate::app::commands::Command;
use crate::app::events::{Action, ActionResult, DownloadActivity, Sleep};
use crate::app::ports::{
    ClockPort, PrinterPort, ScratchBuffer, TransferPort, TransportError, TransportPort,
};
use crate::planner::Planner;
use crate::planner::background::BackgroundResult;

/// What one [`Driver::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// A request went out (or tried to).
    Sent(ActionResult),
    /// Nothing to send; the caller should wait this long.
    Slept(Duration),
}

/// Owns the scratch buffer lent to the planner.
#[derive(Debug, Default)]
pub struct Driver {
    scratch: ScratchBuffer,
}

impl Driver {
    pub fn new() -> Self {
        Self::default()
    }

    /// One round of the connection loop.
    pub fn tick<C: ClockPort>(
        &mut self,
        planner: &mut Planner<C>,
        printer: &mut impl PrinterPort,
        transfers: &mut impl TransferPort,
        transport: &mut impl TransportPort,
    ) -> Result<Tick> {
        let action = planner.next_action(&mut self.scratch, printer, transfers);
        let sent = match action {
            Action::SendTelemetry(telemetry) => transport.send_telemetry(telemetry),
            Action::Event(event) => transport.send_event(&event),
            Action::Sleep(sleep) => {
                Self::work_while_napping(planner, sleep, printer, transfers)?;
                return Ok(Tick::Slept(sleep.duration));
            }
        };

        let (result, command) = match sent {
            Ok(command) => (ActionResult::Ok, command),
            Err(TransportError::Network) => (ActionResult::Failed, None),
            Err(e @ TransportError::Refused(_)) => {
                warn!("Driver: {}", e);
                (ActionResult::Refused, None)
            }
        };
        planner
            .action_done(result)
            .context("reporting the action result")?;

        if let Some(command) = command {
            Self::feed(planner, command, printer, transfers);
        }
        Ok(Tick::Sent(result))
    }

    fn feed<C: ClockPort>(
        planner: &mut Planner<C>,
        command: Command,
        printer: &mut impl PrinterPort,
        transfers: &mut impl TransferPort,
    ) {
        let id = command.id;
        debug!("Driver: received command {}", id);
        if let Err(e) = planner.command(command, printer, transfers) {
            // Unanswered, so the server sends it again.
            warn!("Driver: command {} left for later: {}", id, e);
        }
    }

    fn work_while_napping<C: ClockPort>(
        planner: &mut Planner<C>,
        sleep: Sleep,
        printer: &mut impl PrinterPort,
        transfers: &mut impl TransferPort,
    ) -> Result<()> {
        if sleep.background {
            let result = planner
                .background_step(printer)
                .context("stepping the background command")?;
            if result.is_terminal() {
                planner
                    .background_done(result)
                    .context("resolving the background command")?;
            } else if result == BackgroundResult::Later {
                debug!("Driver: background command waits on the printer");
            }
        }

        match sleep.download {
            Some(DownloadActivity::NeedsRetry) => planner
                .recover_download(transfers)
                .context("recovering the download")?,
            Some(DownloadActivity::Running) => {
                let step = transfers.step_download();
                planner
                    .download_done(step)
                    .context("reporting a download step")?;
            }
            None => {}
        }
        Ok(())
    }
}
