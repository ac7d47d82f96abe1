//! Mock ports for integration tests.
//!
//! Each mock records what the planner asked of it so tests can assert on
//! the full history.  [`Harness`] bundles them with a planner and a
//! shared clock.

use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use connect_planner::Planner;
use connect_planner::app::commands::{Block, Command, CommandData, CommandId, JobId};
use connect_planner::app::events::{
    Action, ActionResult, DownloadActivity, Event, EventType, Incident, SendTelemetry, TransferId,
};
use connect_planner::app::ports::{
    ClockPort, DeviceState, DownloadHandle, DownloadRefused, DownloadRequest, DownloadStep,
    GcodeSubmit, JobControl, PathChange, PrinterPort, ResumeRequest, ScratchBuffer, Timestamp,
    TransferOutcome, TransferPort, TransportError, TransportPort,
};
use connect_planner::config::PlannerConfig;

// ── Clock ─────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockClock(Rc<Cell<Timestamp>>);

#[allow(dead_code)]
impl MockClock {
    pub fn advance(&self, ms: u32) {
        self.0.set(self.0.get().wrapping_add(ms));
    }

    pub fn set(&self, ms: Timestamp) {
        self.0.set(ms);
    }
}

impl ClockPort for MockClock {
    fn now_ms(&self) -> Timestamp {
        self.0.get()
    }
}

// ── Printer ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum PrinterCall {
    JobControl(JobControl),
    StartPrint(String),
    SetReady(bool),
    Gcode(String),
    DeleteFile(String),
    DeleteFolder(String),
    CreateFolder(String),
}

pub struct MockPrinter {
    pub state: DeviceState,
    pub job: Option<JobId>,
    pub fingerprint: u64,
    pub files: Vec<String>,
    pub changed: VecDeque<(String, PathChange)>,
    pub gcode_busy: bool,
    pub calls: Vec<PrinterCall>,
}

#[allow(dead_code)]
impl MockPrinter {
    pub fn new() -> Self {
        Self {
            state: DeviceState::Idle,
            job: None,
            fingerprint: 1,
            files: vec!["/usb/box.gcode".to_string()],
            changed: VecDeque::new(),
            gcode_busy: false,
            calls: Vec::new(),
        }
    }

    pub fn gcode_lines(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                PrinterCall::Gcode(line) => Some(line.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn change_path(&mut self, path: &str, is_file: bool, incident: Incident) {
        self.changed
            .push_back((path.to_string(), PathChange { is_file, incident }));
    }
}

impl Default for MockPrinter {
    fn default() -> Self {
        Self::new()
    }
}

impl PrinterPort for MockPrinter {
    fn device_state(&self) -> DeviceState {
        self.state
    }

    fn job_id(&self) -> Option<JobId> {
        self.job
    }

    fn info_fingerprint(&self) -> u64 {
        self.fingerprint
    }

    fn take_changed_path(&mut self, scratch: &mut ScratchBuffer) -> Option<PathChange> {
        let (path, change) = self.changed.pop_front()?;
        scratch.extend_from_slice(path.as_bytes()).ok()?;
        Some(change)
    }

    fn path_exists(&self, path: &str) -> bool {
        self.files.iter().any(|f| f == path)
    }

    fn job_control(&mut self, control: JobControl) -> bool {
        self.calls.push(PrinterCall::JobControl(control));
        let next = match (control, self.state) {
            (JobControl::Pause, DeviceState::Printing) => DeviceState::Paused,
            (JobControl::Resume, DeviceState::Paused) => DeviceState::Printing,
            (JobControl::Stop, DeviceState::Printing | DeviceState::Paused) => {
                DeviceState::Stopped
            }
            _ => return false,
        };
        self.state = next;
        true
    }

    fn start_print(&mut self, path: &str) -> Result<(), &'static str> {
        self.calls.push(PrinterCall::StartPrint(path.to_string()));
        if !self.path_exists(path) {
            return Err("File not found");
        }
        match self.state {
            DeviceState::Idle
            | DeviceState::Ready
            | DeviceState::Finished
            | DeviceState::Stopped => {
                self.state = DeviceState::Busy;
                Ok(())
            }
            _ => Err("Printer busy"),
        }
    }

    fn set_ready(&mut self, ready: bool) -> bool {
        self.calls.push(PrinterCall::SetReady(ready));
        match (ready, self.state) {
            (true, DeviceState::Idle) => self.state = DeviceState::Ready,
            (false, DeviceState::Ready) => self.state = DeviceState::Idle,
            _ => return false,
        }
        true
    }

    fn submit_gcode(&mut self, line: &str) -> GcodeSubmit {
        if self.gcode_busy {
            return GcodeSubmit::Busy;
        }
        self.calls.push(PrinterCall::Gcode(line.to_string()));
        if line.starts_with("M112") {
            return GcodeSubmit::Failed("Emergency stop");
        }
        GcodeSubmit::Submitted
    }

    fn delete_file(&mut self, path: &str) -> Result<(), &'static str> {
        self.calls.push(PrinterCall::DeleteFile(path.to_string()));
        let before = self.files.len();
        self.files.retain(|f| f != path);
        if self.files.len() == before {
            Err("File not found")
        } else {
            Ok(())
        }
    }

    fn delete_folder(&mut self, path: &str) -> Result<(), &'static str> {
        self.calls.push(PrinterCall::DeleteFolder(path.to_string()));
        Ok(())
    }

    fn create_folder(&mut self, path: &str) -> Result<(), &'static str> {
        self.calls.push(PrinterCall::CreateFolder(path.to_string()));
        Ok(())
    }
}

// ── Transfers ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct StartedDownload {
    pub path: String,
    pub cipher: Option<(Block, Block)>,
    pub orig_size: u32,
    pub port: Option<u16>,
}

#[derive(Default)]
pub struct MockTransfers {
    next_id: TransferId,
    pub current: Option<TransferId>,
    pub outcomes: HashMap<TransferId, TransferOutcome>,
    /// Scripted results of `step_download`; `Continue` once empty.
    pub steps: VecDeque<DownloadStep>,
    /// Scripted failures of `resume_download`; success once empty.
    pub resume_failures: VecDeque<DownloadRefused>,
    pub refuse_start: Option<DownloadRefused>,
    pub started: Vec<StartedDownload>,
    pub resumed: Vec<ResumeRequest>,
    pub stop_requests: u32,
}

#[allow(dead_code)]
impl MockTransfers {
    pub fn new() -> Self {
        Self {
            next_id: 100,
            ..Self::default()
        }
    }

    fn allocate(&mut self) -> TransferId {
        self.next_id += 1;
        self.current = Some(self.next_id);
        self.next_id
    }

    /// Someone else (e.g. a local upload) starts a transfer.
    pub fn foreign_transfer(&mut self) -> TransferId {
        self.allocate()
    }

    /// The running transfer ends outside of the planner's control.
    pub fn end_current(&mut self, outcome: TransferOutcome) {
        if let Some(id) = self.current.take() {
            self.outcomes.insert(id, outcome);
        }
    }
}

impl TransferPort for MockTransfers {
    fn start_download(
        &mut self,
        request: &DownloadRequest<'_>,
    ) -> Result<DownloadHandle, DownloadRefused> {
        if let Some(refused) = self.refuse_start {
            return Err(refused);
        }
        if self.current.is_some() {
            return Err(DownloadRefused::NoTransferSlot);
        }
        self.started.push(StartedDownload {
            path: request.path.to_string(),
            cipher: request.cipher,
            orig_size: request.orig_size,
            port: request.port,
        });
        Ok(DownloadHandle {
            transfer_id: self.allocate(),
        })
    }

    fn resume_download(
        &mut self,
        request: &ResumeRequest,
    ) -> Result<DownloadHandle, DownloadRefused> {
        self.resumed.push(*request);
        if let Some(refused) = self.resume_failures.pop_front() {
            return Err(refused);
        }
        Ok(DownloadHandle {
            transfer_id: self.allocate(),
        })
    }

    fn step_download(&mut self) -> DownloadStep {
        let step = self.steps.pop_front().unwrap_or(DownloadStep::Continue);
        let outcome = match step {
            DownloadStep::Continue => return step,
            DownloadStep::Finished => TransferOutcome::Finished,
            DownloadStep::Aborted => TransferOutcome::Stopped,
            DownloadStep::FailedNetwork | DownloadStep::FailedOther(_) => TransferOutcome::Error,
        };
        self.end_current(outcome);
        step
    }

    fn current_transfer(&self) -> Option<TransferId> {
        self.current
    }

    fn transfer_outcome(&self, id: TransferId) -> Option<TransferOutcome> {
        self.outcomes.get(&id).copied()
    }

    fn request_stop(&mut self) -> bool {
        self.stop_requests += 1;
        if self.current.is_none() {
            return false;
        }
        self.steps.push_front(DownloadStep::Aborted);
        true
    }
}

// ── Transport ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Telemetry(SendTelemetry),
    Event(Event),
}

/// Answers from a queue; plain success once the queue runs dry.
#[derive(Default)]
pub struct MockTransport {
    pub script: VecDeque<Result<Option<Command>, TransportError>>,
    pub sent: Vec<Sent>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply_with(&mut self, command: Command) {
        self.script.push_back(Ok(Some(command)));
    }

    pub fn fail(&mut self, error: TransportError) {
        self.script.push_back(Err(error));
    }

    pub fn events(&self) -> Vec<&Event> {
        self.sent
            .iter()
            .filter_map(|s| match s {
                Sent::Event(e) => Some(e),
                Sent::Telemetry(_) => None,
            })
            .collect()
    }

    fn answer(&mut self) -> Result<Option<Command>, TransportError> {
        self.script.pop_front().unwrap_or(Ok(None))
    }
}

impl TransportPort for MockTransport {
    fn send_telemetry(
        &mut self,
        telemetry: SendTelemetry,
    ) -> Result<Option<Command>, TransportError> {
        self.sent.push(Sent::Telemetry(telemetry));
        self.answer()
    }

    fn send_event(&mut self, event: &Event) -> Result<Option<Command>, TransportError> {
        self.sent.push(Sent::Event(event.clone()));
        self.answer()
    }
}

// ── Harness ───────────────────────────────────────────────────

pub struct Harness {
    pub clock: MockClock,
    pub planner: Planner<MockClock>,
    pub printer: MockPrinter,
    pub transfers: MockTransfers,
    pub scratch: ScratchBuffer,
}

#[allow(dead_code)]
impl Harness {
    pub fn new() -> Self {
        Self::with_config(PlannerConfig::default())
    }

    pub fn with_config(config: PlannerConfig) -> Self {
        let clock = MockClock::default();
        let planner = Planner::with_config(clock.clone(), config).expect("valid config");
        Self {
            clock,
            planner,
            printer: MockPrinter::new(),
            transfers: MockTransfers::new(),
            scratch: ScratchBuffer::new(),
        }
    }

    pub fn next(&mut self) -> Action {
        self.planner
            .next_action(&mut self.scratch, &mut self.printer, &self.transfers)
    }

    pub fn done(&mut self, result: ActionResult) {
        self.planner.action_done(result).expect("action in flight");
    }

    pub fn command(&mut self, id: CommandId, data: CommandData) {
        self.planner
            .command(Command::new(id, data), &mut self.printer, &mut self.transfers)
            .expect("room for the reply");
    }

    /// Next action must be an event; acknowledge it and return it.
    pub fn expect_event(&mut self) -> Event {
        match self.next() {
            Action::Event(event) => {
                self.done(ActionResult::Ok);
                event
            }
            other => panic!("expected an event, got {other:?}"),
        }
    }

    /// Next action must be a telemetry; acknowledge it.
    pub fn expect_telemetry(&mut self) -> SendTelemetry {
        match self.next() {
            Action::SendTelemetry(t) => {
                self.done(ActionResult::Ok);
                t
            }
            other => panic!("expected telemetry, got {other:?}"),
        }
    }

    /// First contact: empty telemetry, INFO, first full telemetry.
    pub fn connect(&mut self) {
        assert!(self.expect_telemetry().empty);
        assert_eq!(self.expect_event().kind, EventType::Info);
        assert!(!self.expect_telemetry().empty);
    }

    /// Drive the background command and the download the way a driver
    /// does during a nap.
    pub fn nap_work(&mut self) -> Action {
        let action = self.next();
        if let Action::Sleep(sleep) = action {
            if sleep.background {
                let result = self
                    .planner
                    .background_step(&mut self.printer)
                    .expect("background command");
                if result.is_terminal() {
                    self.planner.background_done(result).expect("terminal");
                }
            }
            match sleep.download {
                Some(DownloadActivity::NeedsRetry) => {
                    self.planner
                        .recover_download(&mut self.transfers)
                        .expect("download to recover");
                }
                Some(DownloadActivity::Running) => {
                    let step = self.transfers.step_download();
                    self.planner.download_done(step).expect("download running");
                }
                None => {}
            }
        }
        action
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
