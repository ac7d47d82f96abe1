//! Fuzz target: planner call sequences
//!
//! Interprets each input byte as one call into the planner (in or out of
//! contract) and asserts that it never panics and the bookkeeping stays
//! within its bounds.
//!
//! cargo fuzz run fuzz_planner_ops

#![no_main]

use std::cell::Cell;
use std::rc::Rc;

use connect_planner::Planner;
use connect_planner::app::commands::{
    Command, CommandData, JobId, StartConnectDownload, gcode_text, shared_path,
};
use connect_planner::app::events::{ActionResult, Incident, TransferId};
use connect_planner::app::ports::{
    ClockPort, DeviceState, DownloadHandle, DownloadRefused, DownloadRequest, DownloadStep,
    GcodeSubmit, JobControl, PathChange, PrinterPort, ResumeRequest, ScratchBuffer, Timestamp,
    TransferOutcome, TransferPort,
};
use connect_planner::planner::background::BackgroundResult;
use libfuzzer_sys::fuzz_target;

#[derive(Clone, Default)]
struct Clock(Rc<Cell<Timestamp>>);

impl ClockPort for Clock {
    fn now_ms(&self) -> Timestamp {
        self.0.get()
    }
}

/// Printer whose answers flip with a seed byte.
struct Coin(u8);

impl PrinterPort for Coin {
    fn device_state(&self) -> DeviceState {
        if self.0 & 1 == 0 { DeviceState::Idle } else { DeviceState::Printing }
    }
    fn job_id(&self) -> Option<JobId> {
        (self.0 & 2 != 0).then_some(u16::from(self.0))
    }
    fn info_fingerprint(&self) -> u64 {
        u64::from(self.0 >> 4)
    }
    fn take_changed_path(&mut self, scratch: &mut ScratchBuffer) -> Option<PathChange> {
        if self.0 & 4 == 0 {
            return None;
        }
        scratch.extend_from_slice(b"/usb/x").ok()?;
        Some(PathChange {
            is_file: true,
            incident: Incident::Combined,
        })
    }
    fn path_exists(&self, _path: &str) -> bool {
        self.0 & 8 != 0
    }
    fn job_control(&mut self, _control: JobControl) -> bool {
        self.0 & 1 != 0
    }
    fn start_print(&mut self, _path: &str) -> Result<(), &'static str> {
        if self.0 & 1 == 0 { Ok(()) } else { Err("Printer busy") }
    }
    fn set_ready(&mut self, ready: bool) -> bool {
        ready
    }
    fn submit_gcode(&mut self, _line: &str) -> GcodeSubmit {
        match self.0 % 3 {
            0 => GcodeSubmit::Submitted,
            1 => GcodeSubmit::Busy,
            _ => GcodeSubmit::Failed("bad"),
        }
    }
    fn delete_file(&mut self, _path: &str) -> Result<(), &'static str> {
        Ok(())
    }
    fn delete_folder(&mut self, _path: &str) -> Result<(), &'static str> {
        Err("Not empty")
    }
    fn create_folder(&mut self, _path: &str) -> Result<(), &'static str> {
        Ok(())
    }
}

#[derive(Default)]
struct Slot {
    next: TransferId,
    current: Option<TransferId>,
}

impl TransferPort for Slot {
    fn start_download(
        &mut self,
        _r: &DownloadRequest<'_>,
    ) -> Result<DownloadHandle, DownloadRefused> {
        self.next += 1;
        self.current = Some(self.next);
        Ok(DownloadHandle { transfer_id: self.next })
    }
    fn resume_download(&mut self, r: &ResumeRequest) -> Result<DownloadHandle, DownloadRefused> {
        if r.transfer_id % 2 == 0 {
            return Err(DownloadRefused::Network);
        }
        self.next += 1;
        self.current = Some(self.next);
        Ok(DownloadHandle { transfer_id: self.next })
    }
    fn step_download(&mut self) -> DownloadStep {
        DownloadStep::Continue
    }
    fn current_transfer(&self) -> Option<TransferId> {
        self.current
    }
    fn transfer_outcome(&self, id: TransferId) -> Option<TransferOutcome> {
        (id % 3 == 0).then_some(TransferOutcome::Error)
    }
    fn request_stop(&mut self) -> bool {
        self.current.take().is_some()
    }
}

fn command(byte: u8) -> CommandData {
    let Some(path) = shared_path("/usb/a.gcode") else {
        return CommandData::UnknownCommand;
    };
    match byte % 12 {
        0 => CommandData::SendInfo,
        1 => gcode_text("G28\nG1 X1").map_or(CommandData::GcodeTooLarge, CommandData::Gcode),
        2 => CommandData::StartPrint { path },
        3 => CommandData::StopPrint,
        4 => CommandData::PausePrint,
        5 => CommandData::StopTransfer,
        6 => CommandData::SendTransferInfo,
        7 => CommandData::SendFileInfo { path },
        8 => CommandData::SendJobInfo { job_id: u16::from(byte) },
        9 => CommandData::DeleteFolder { path },
        10 => CommandData::StartConnectDownload(StartConnectDownload {
            path,
            team: 1,
            hash: heapless::String::new(),
            port: None,
            encryption: None,
        }),
        _ => CommandData::BrokenCommand { reason: "Fuzz" },
    }
}

fuzz_target!(|data: &[u8]| {
    let clock = Clock::default();
    let mut planner = Planner::new(clock.clone());
    let mut printer = Coin(0);
    let mut transfers = Slot::default();
    let mut scratch = ScratchBuffer::new();

    for pair in data.chunks(2) {
        let (op, arg) = (pair[0], pair.get(1).copied().unwrap_or(0));
        printer.0 = arg;
        match op % 10 {
            0 | 1 => {
                let _ = planner.next_action(&mut scratch, &mut printer, &transfers);
            }
            2 => {
                let result = [ActionResult::Ok, ActionResult::Failed, ActionResult::Refused];
                let _ = planner.action_done(result[usize::from(arg % 3)]);
            }
            3 => {
                let cmd = Command::new(u32::from(arg % 4), command(arg));
                let _ = planner.command(cmd, &mut printer, &mut transfers);
            }
            4 => clock.0.set(clock.0.get().wrapping_add(u32::from(arg) * 97)),
            5 => {
                if let Ok(result) = planner.background_step(&mut printer) {
                    let _ = planner.background_done(result);
                }
            }
            6 => {
                let steps = [
                    DownloadStep::Continue,
                    DownloadStep::Finished,
                    DownloadStep::FailedNetwork,
                    DownloadStep::FailedOther("Fuzz"),
                    DownloadStep::Aborted,
                ];
                let _ = planner.download_done(steps[usize::from(arg % 5)]);
            }
            7 => {
                let _ = planner.recover_download(&mut transfers);
            }
            8 => {
                let _ = planner.background_done(BackgroundResult::Success);
            }
            _ => planner.reset(),
        }

        assert!(planner.deferred_len() <= 8);
        assert!(planner.deferred_len() == 0 || planner.planned_event().is_some());
        assert!(planner.failed_attempts() <= 16);
    }
});
