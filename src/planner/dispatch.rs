//! Command dispatch.
//!
//! Every command gets exactly one reply event, planned right away, except
//! the ones that go to the background (their reply comes from
//! `background_done`) and `START_PRINT` which is acknowledged only by the
//! outcome.  Handlers are one per command kind; the match in
//! [`Planner::command`] is exhaustive.

use log::{info, warn};

use crate::app::commands::{
    Command, CommandData, CommandId, JobId, SharedPath, StartConnectDownload,
};
use crate::app::events::{Event, EventType};
use crate::app::ports::{ClockPort, DownloadRequest, JobControl, PrinterPort, TransferPort};
use crate::error::PlannerError;

use super::{COMMAND_HEADROOM, DEFERRED_EVENTS, Planner};
use super::background::{BackgroundCmd, BackgroundCommand, BackgroundGcode};
use super::download::ResumableDownload;

impl<C: ClockPort> Planner<C> {
    /// A command arrived from the server.
    ///
    /// When too many events already wait to be sent the command is refused
    /// with [`PlannerError::EventBacklog`] before anything runs, so no side
    /// effect happens without its reply.  The server repeats it later.
    pub fn command(
        &mut self,
        command: Command,
        printer: &mut impl PrinterPort,
        transfers: &mut impl TransferPort,
    ) -> Result<(), PlannerError> {
        if self.deferred_events.len() + COMMAND_HEADROOM > DEFERRED_EVENTS {
            warn!(
                "Planner: {} events waiting, not dispatching command {}",
                self.deferred_events.len(),
                command.id
            );
            return Err(PlannerError::EventBacklog);
        }
        let Command { id, data } = self.classify(command);
        info!("Planner: command {} {}", id, data.name());

        match data {
            CommandData::BrokenCommand { reason } => self.plan(Event::rejected(id, reason)),
            CommandData::UnknownCommand => self.plan(Event::rejected(id, "Unknown command")),
            CommandData::GcodeTooLarge => self.plan(Event::rejected(id, "Gcode too large")),
            CommandData::ProcessingThisCommand => {
                // The server repeats itself; it didn't see our ACCEPTED.
                self.plan(Event::reply(EventType::Accepted, id));
            }
            CommandData::ProcessingOtherCommand => {
                self.plan(Event::rejected(id, "Processing other command"));
            }
            CommandData::Gcode(gcode) => {
                self.background_command = Some(BackgroundCommand {
                    id,
                    command: BackgroundCmd::Gcode(BackgroundGcode::new(gcode)),
                });
                self.plan(Event::reply(EventType::Accepted, id));
            }
            CommandData::SendInfo => {
                // What goes out is the current state; don't resend it unasked.
                self.info_changes.set_hash(printer.info_fingerprint());
                self.plan(Event::reply(EventType::Info, id));
            }
            CommandData::SendJobInfo { job_id } => self.send_job_info(id, job_id, printer),
            CommandData::SendFileInfo { path } => self.send_file_info(id, path, printer),
            CommandData::SendTransferInfo => self.send_transfer_info(id, transfers),
            CommandData::PausePrint => {
                self.job_control(id, JobControl::Pause, "No print to pause", printer);
            }
            CommandData::ResumePrint => {
                self.job_control(id, JobControl::Resume, "No paused print to resume", printer);
            }
            CommandData::StopPrint => self.stop_print(id, printer),
            CommandData::StartPrint { path } => self.start_print(id, path, printer),
            CommandData::SetPrinterReady => {
                self.printer_ready(id, true, "Can't set ready now", printer);
            }
            CommandData::CancelPrinterReady => {
                self.printer_ready(id, false, "Can't cancel ready now", printer);
            }
            CommandData::StartConnectDownload(download) => {
                self.start_connect_download(id, &download, transfers);
            }
            CommandData::DeleteFile { path } => {
                let result = printer.delete_file(&path);
                self.finished_or_rejected(id, result);
            }
            CommandData::DeleteFolder { path } => {
                let result = printer.delete_folder(&path);
                self.finished_or_rejected(id, result);
            }
            CommandData::CreateFolder { path } => {
                let result = printer.create_folder(&path);
                self.finished_or_rejected(id, result);
            }
            CommandData::StopTransfer => self.stop_transfer(id, transfers),
        }
        Ok(())
    }

    /// Commands that would take the background slot while it's busy turn
    /// into one of the `Processing*` kinds.
    fn classify(&self, command: Command) -> Command {
        let Some(busy) = self.background_command_id() else {
            return command;
        };
        if busy == command.id {
            Command::new(command.id, CommandData::ProcessingThisCommand)
        } else if command.data.starts_background() {
            Command::new(command.id, CommandData::ProcessingOtherCommand)
        } else {
            command
        }
    }

    fn send_job_info(&mut self, id: CommandId, job_id: JobId, printer: &impl PrinterPort) {
        if printer.job_id() == Some(job_id) {
            self.plan(Event::reply(EventType::JobInfo, id).with_job(job_id));
        } else {
            self.plan(Event::rejected(id, "Job ID doesn't match"));
        }
    }

    fn send_file_info(&mut self, id: CommandId, path: SharedPath, printer: &impl PrinterPort) {
        if printer.path_exists(&path) {
            self.plan(Event::reply(EventType::FileInfo, id).with_path(path));
        } else {
            self.plan(Event::rejected(id, "File not found"));
        }
    }

    fn send_transfer_info(&mut self, id: CommandId, transfers: &impl TransferPort) {
        let Some(transfer) = transfers.current_transfer() else {
            self.plan(Event::rejected(id, "No transfer in progress"));
            return;
        };
        let own = self.download.as_ref().map(ResumableDownload::transfer_id) == Some(transfer);
        let start = if own { self.transfer_start_cmd } else { None };
        self.plan(
            Event::reply(EventType::TransferInfo, id)
                .with_transfer(Some(transfer))
                .with_start_cmd(start),
        );
    }

    fn job_control(
        &mut self,
        id: CommandId,
        control: JobControl,
        refusal: &'static str,
        printer: &mut impl PrinterPort,
    ) {
        if printer.job_control(control) {
            self.plan(Event::reply(EventType::Finished, id));
        } else {
            self.plan(Event::rejected(id, refusal));
        }
    }

    fn stop_print(&mut self, id: CommandId, printer: &mut impl PrinterPort) {
        if !printer.job_control(JobControl::Stop) {
            self.plan(Event::rejected(id, "No print to stop"));
            return;
        }
        self.plan(Event::reply(EventType::Finished, id));
        self.print_start_cmd = None;

        // A print we were still waiting on will never start now.
        let starting = matches!(
            self.background_command,
            Some(BackgroundCommand {
                command: BackgroundCmd::StartPrint { .. },
                ..
            })
        );
        if let Some(cmd) = self.background_command.take_if(|_| starting) {
            info!("Planner: print stopped before it started ({})", cmd.id);
            self.plan(Event::reply(EventType::Failed, cmd.id).with_reason("Print stopped"));
        }
    }

    fn start_print(&mut self, id: CommandId, path: SharedPath, printer: &mut impl PrinterPort) {
        match printer.start_print(&path) {
            Ok(()) => {
                // Reply comes once the printer actually prints.
                self.background_command = Some(BackgroundCommand {
                    id,
                    command: BackgroundCmd::StartPrint { path },
                });
            }
            Err(reason) => self.plan(Event::rejected(id, reason)),
        }
    }

    fn printer_ready(
        &mut self,
        id: CommandId,
        ready: bool,
        refusal: &'static str,
        printer: &mut impl PrinterPort,
    ) {
        if printer.set_ready(ready) {
            self.plan(Event::reply(EventType::Finished, id));
        } else {
            self.plan(Event::rejected(id, refusal));
        }
    }

    fn start_connect_download(
        &mut self,
        id: CommandId,
        download: &StartConnectDownload,
        transfers: &mut impl TransferPort,
    ) {
        if self.download.is_some() {
            self.plan(Event::rejected(id, "Another download in progress"));
            return;
        }

        let request = DownloadRequest {
            path: &download.path,
            team: download.team,
            hash: &download.hash,
            port: download.port,
            cipher: download.encryption.map(|e| (e.key, e.iv)),
            orig_size: download.encryption.map_or(0, |e| e.orig_size),
        };
        match transfers.start_download(&request) {
            Ok(handle) => {
                info!(
                    "Download: {} started as transfer {}",
                    download.path, handle.transfer_id
                );
                self.download = Some(match &download.encryption {
                    Some(encryption) => ResumableDownload::encrypted(
                        handle,
                        encryption,
                        download.port,
                        self.config.encrypted_download_retries,
                    ),
                    None => ResumableDownload::plain(handle, download.port),
                });
                self.transfer_start_cmd = Some(id);
                self.plan(
                    Event::reply(EventType::Accepted, id).with_transfer(Some(handle.transfer_id)),
                );
            }
            Err(refused) => {
                warn!("Download: {} refused: {}", download.path, refused);
                self.plan(Event::rejected(id, refused.reason()));
            }
        }
    }

    fn stop_transfer(&mut self, id: CommandId, transfers: &mut impl TransferPort) {
        // A broken download has nothing running to stop; just drop it.
        if let Some(broken) = self.download.take_if(|d| d.need_retry()) {
            self.plan(Event::reply(EventType::Finished, id));
            self.finish_transfer(broken.transfer_id(), EventType::TransferStopped, None);
            return;
        }
        if transfers.request_stop() {
            self.plan(Event::reply(EventType::Finished, id));
        } else {
            self.plan(Event::rejected(id, "No transfer in progress"));
        }
    }

    fn finished_or_rejected(&mut self, id: CommandId, result: Result<(), &'static str>) {
        match result {
            Ok(()) => self.plan(Event::reply(EventType::Finished, id)),
            Err(reason) => self.plan(Event::rejected(id, reason)),
        }
    }
}
