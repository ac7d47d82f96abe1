//! The connection planner.
//!
//! There is only one connection to the server, so only one request can be
//! in flight.  The planner decides which one (if any) goes next, reacts to
//! commands from the server and keeps the retry bookkeeping.  It never
//! performs I/O itself: the driver asks, acts, and reports back.
//!
//! ```text
//!            ┌────────────── next_action ──────────────┐
//!            │  1. pending cooldown nap                 │
//!  Driver ◀──│  2. planned event (then deferred ones)   │
//!            │  3. observed changes → new event         │
//!            │  4. telemetry, if due                    │
//!            │  5. nap until telemetry is due           │
//!            └──────────────────────────────────────────┘
//!  Driver ──▶ action_done(Ok | Failed | Refused)
//!  Driver ──▶ command / background_done / download_done / recover_download
//! ```

pub mod background;
pub mod changes;
pub mod cooldown;
mod dispatch;
pub mod download;

use core::time::Duration;

use heapless::Deque;
use log::{debug, info, warn};

use crate::app::commands::{CommandId, shared_path};
use crate::app::events::{
    Action, ActionResult, DownloadActivity, Event, EventType, SendTelemetry, Sleep, TransferId,
};
use crate::app::ports::{
    ClockPort, DeviceState, DownloadRefused, DownloadStep, PrinterPort, ScratchBuffer, Timestamp,
    TransferOutcome, TransferPort,
};
use crate::config::PlannerConfig;
use crate::error::{ConfigError, PlannerError};

use background::{BackgroundCmd, BackgroundCommand, BackgroundResult};
use changes::Tracked;
use cooldown::Cooldown;
use download::{ResumableDownload, StepOutcome};

/// Events waiting behind the planned one.
const DEFERRED_EVENTS: usize = 8;

/// Free deferred slots a command needs before it is dispatched: up to two
/// events of its own, plus the pending completions of the background
/// command and of the download.  With this much room nothing planned is
/// ever dropped.
const COMMAND_HEADROOM: usize = 4;

/// What the driver is currently doing on our behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InFlight {
    Telemetry,
    Event,
}

pub struct Planner<C: ClockPort> {
    clock: C,
    config: PlannerConfig,

    /// The next (or current) event to send.  Only removed once the server
    /// saw it.
    planned_event: Option<Event>,
    /// Events produced while one was already planned, oldest first.
    deferred_events: Deque<Event, DEFERRED_EVENTS>,
    in_flight: Option<InFlight>,

    /// Last time a telemetry got through.
    last_telemetry: Option<Timestamp>,
    /// Last time the server got anything from us.
    last_success: Option<Timestamp>,
    cooldown: Cooldown,
    /// Failed attempts to send the currently planned event.
    event_attempts: u8,

    background_command: Option<BackgroundCommand>,
    download: Option<ResumableDownload>,

    info_changes: Tracked,
    observed_transfer: Option<TransferId>,
    /// Transfer whose end was already reported (or must not be).
    reported_transfer: Option<TransferId>,
    transfer_start_cmd: Option<CommandId>,
    print_start_cmd: Option<CommandId>,
}

impl<C: ClockPort> Planner<C> {
    /// Planner with the default configuration.
    pub fn new(clock: C) -> Self {
        Self::build(clock, PlannerConfig::default())
    }

    pub fn with_config(clock: C, config: PlannerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(clock, config))
    }

    /// Planner configured from a stored JSON blob.  Missing fields take
    /// defaults.
    pub fn from_json_config(clock: C, json: &str) -> crate::Result<Self> {
        let config = PlannerConfig::from_json(json)?;
        Ok(Self::build(clock, config))
    }

    fn build(clock: C, config: PlannerConfig) -> Self {
        let cooldown = Cooldown::new(config.cooldown_base(), config.cooldown_max());
        Self {
            clock,
            config,
            planned_event: None,
            deferred_events: Deque::new(),
            in_flight: None,
            last_telemetry: None,
            last_success: None,
            cooldown,
            event_attempts: 0,
            background_command: None,
            download: None,
            info_changes: Tracked::new(),
            observed_transfer: None,
            reported_transfer: None,
            transfer_start_cmd: None,
            print_start_cmd: None,
        }
    }

    /// Swap the configuration.  We may be talking to another server now,
    /// so everything is reset.
    pub fn reconfigure(&mut self, config: PlannerConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.cooldown = Cooldown::new(config.cooldown_base(), config.cooldown_max());
        self.config = config;
        self.reset();
        Ok(())
    }

    /// Drop all state.
    ///
    /// For the severe cases: connect disabled and re-enabled, endpoint or
    /// configuration changed.  No correlation id survives this.
    pub fn reset(&mut self) {
        info!("Planner: reset");
        self.planned_event = None;
        self.deferred_events.clear();
        self.in_flight = None;
        self.last_telemetry = None;
        self.last_success = None;
        self.cooldown.reset();
        self.event_attempts = 0;
        self.background_command = None;
        self.download = None;
        self.info_changes.reset();
        self.observed_transfer = None;
        self.reported_transfer = None;
        self.transfer_start_cmd = None;
        self.print_start_cmd = None;
    }

    // ── Scheduling ────────────────────────────────────────────

    /// What the driver should do next.
    ///
    /// `buffer` is lent for staging payloads and is not retained.  All
    /// actions except [`Action::Sleep`] expect a follow-up
    /// [`action_done`](Self::action_done).
    pub fn next_action(
        &mut self,
        buffer: &mut ScratchBuffer,
        printer: &mut impl PrinterPort,
        transfers: &impl TransferPort,
    ) -> Action {
        if let Some(previous) = self.in_flight.take() {
            warn!("Planner: next_action with {:?} still in flight", previous);
        }

        if let Some(nap) = self.cooldown.take_pending() {
            debug!("Planner: cooling down for {:?}", nap);
            return self.sleep(nap);
        }

        if self.planned_event.is_none() {
            self.observe(buffer, printer, transfers);
        }
        if let Some(event) = &self.planned_event {
            self.in_flight = Some(InFlight::Event);
            return Action::Event(event.clone());
        }

        let interval = self
            .config
            .telemetry_interval(printer.device_state().is_printing());
        match self.since(self.last_telemetry) {
            Some(elapsed) if elapsed < interval => self.sleep(interval - elapsed),
            _ => {
                self.in_flight = Some(InFlight::Telemetry);
                Action::SendTelemetry(SendTelemetry {
                    empty: self.last_success.is_none(),
                })
            }
        }
    }

    /// The driver finished the last sending action.
    pub fn action_done(&mut self, result: ActionResult) -> Result<(), PlannerError> {
        let Some(action) = self.in_flight.take() else {
            warn!("Planner: action_done({:?}) with nothing in flight", result);
            return Err(PlannerError::NoActionInFlight);
        };
        let now = self.clock.now_ms();

        match result {
            ActionResult::Ok => {
                let silence = self.since(self.last_success);
                if silence.is_none_or(|s| s > self.config.reconnect_after()) {
                    // The server may have forgotten about us.
                    self.info_changes.mark_dirty();
                }
                self.last_success = Some(now);
                self.cooldown.record_success();
                match action {
                    InFlight::Telemetry => self.last_telemetry = Some(now),
                    InFlight::Event => {
                        self.finish_event();
                        // Telemetry right away; commands only come with it.
                        self.last_telemetry = None;
                    }
                }
            }
            ActionResult::Failed => {
                let nap = self.cooldown.record_failure();
                info!(
                    "Planner: communication failed ({} in a row), cooling down {:?}",
                    self.cooldown.failed_attempts(),
                    nap
                );
                if action == InFlight::Event {
                    self.event_attempts = self.event_attempts.saturating_add(1);
                    if self.event_attempts >= self.config.give_up_after_attempts {
                        // Maybe it's the event itself that breaks things.
                        if let Some(event) = &self.planned_event {
                            warn!(
                                "Planner: giving up on {} after {} attempts",
                                event.kind, self.event_attempts
                            );
                        }
                        self.finish_event();
                        self.info_changes.mark_dirty();
                    }
                }
            }
            ActionResult::Refused => match action {
                InFlight::Event => {
                    if let Some(event) = &self.planned_event {
                        warn!("Planner: server refused {}, dropping it", event.kind);
                    }
                    self.finish_event();
                }
                // Don't hammer the server with the same telemetry.
                InFlight::Telemetry => self.last_telemetry = Some(now),
            },
        }
        Ok(())
    }

    // ── Background commands ───────────────────────────────────

    /// Id of the command being executed in the background, if any.
    pub fn background_command_id(&self) -> Option<CommandId> {
        self.background_command.as_ref().map(|c| c.id)
    }

    /// Advance the background command by one step.
    ///
    /// Terminal results are not applied here; hand them to
    /// [`background_done`](Self::background_done).
    pub fn background_step(
        &mut self,
        printer: &mut impl PrinterPort,
    ) -> Result<BackgroundResult, PlannerError> {
        let cmd = self
            .background_command
            .as_mut()
            .ok_or(PlannerError::NoBackgroundCommand)?;
        Ok(cmd.command.step(printer))
    }

    /// Resolve the background command.  Only for `Success` / `Failure`.
    pub fn background_done(&mut self, result: BackgroundResult) -> Result<(), PlannerError> {
        if self.background_command.is_none() {
            return Err(PlannerError::NoBackgroundCommand);
        }
        if !result.is_terminal() {
            return Err(PlannerError::BackgroundNotTerminal);
        }
        let Some(BackgroundCommand { id, command }) = self.background_command.take() else {
            return Err(PlannerError::NoBackgroundCommand);
        };

        let event = match (result, &command) {
            (BackgroundResult::Success, BackgroundCmd::StartPrint { .. }) => {
                self.print_start_cmd = Some(id);
                Event::reply(EventType::Finished, id)
            }
            (BackgroundResult::Success, _) => Event::reply(EventType::Finished, id),
            (_, BackgroundCmd::StartPrint { .. }) => {
                // Whatever job shows up next is not ours.
                self.print_start_cmd = None;
                Event::reply(EventType::Failed, id).with_reason(command.failure_reason())
            }
            _ => Event::reply(EventType::Failed, id).with_reason(command.failure_reason()),
        };
        info!("Planner: background command {} done: {}", id, event.kind);
        self.plan(event);
        Ok(())
    }

    // ── Downloads ─────────────────────────────────────────────

    pub fn download(&self) -> Option<&ResumableDownload> {
        self.download.as_ref()
    }

    /// The transfer subsystem reports a step of our download.
    pub fn download_done(&mut self, step: DownloadStep) -> Result<(), PlannerError> {
        let download = self.download.as_mut().ok_or(PlannerError::NoDownload)?;
        let outcome = download.on_step(step);
        self.apply_download_outcome(outcome);
        Ok(())
    }

    /// Restart a broken encrypted download from its saved metadata.
    ///
    /// Calling this when no download waits for a retry is a contract
    /// violation; it returns [`PlannerError::NothingToRecover`] and changes
    /// nothing.
    pub fn recover_download(
        &mut self,
        transfers: &mut impl TransferPort,
    ) -> Result<(), PlannerError> {
        let download = self
            .download
            .as_mut()
            .filter(|d| d.need_retry())
            .ok_or(PlannerError::NothingToRecover)?;

        let outcome = match transfers.resume_download(&download.resume_request()) {
            Ok(handle) => {
                let old = download.transfer_id();
                info!(
                    "Download: transfer {} resumed as {}",
                    old, handle.transfer_id
                );
                download.resumed(handle);
                if handle.transfer_id != old {
                    // The old id vanishing is not an outcome to report.
                    self.reported_transfer = Some(old);
                }
                StepOutcome::Continue
            }
            Err(DownloadRefused::Network) => download.network_failure(),
            Err(refused) => {
                warn!("Download: resume refused: {}", refused);
                StepOutcome::Done {
                    kind: EventType::TransferAborted,
                    reason: Some(refused.reason()),
                }
            }
        };
        self.apply_download_outcome(outcome);
        Ok(())
    }

    fn apply_download_outcome(&mut self, outcome: StepOutcome) {
        let StepOutcome::Done { kind, reason } = outcome else {
            return;
        };
        if let Some(download) = self.download.take() {
            self.finish_transfer(download.transfer_id(), kind, reason);
        }
    }

    /// Plan the terminal event of our own transfer.
    fn finish_transfer(&mut self, id: TransferId, kind: EventType, reason: Option<&'static str>) {
        info!("Download: transfer {} over: {}", id, kind);
        let mut event = Event::new(kind)
            .with_transfer(Some(id))
            .with_start_cmd(self.transfer_start_cmd.take());
        event.reason = reason;
        self.reported_transfer = Some(id);
        if self.observed_transfer == Some(id) {
            self.observed_transfer = None;
        }
        self.plan(event);
    }

    // ── Observation ───────────────────────────────────────────

    pub fn planned_event(&self) -> Option<&Event> {
        self.planned_event.as_ref()
    }

    /// Events queued behind the planned one.
    pub fn deferred_len(&self) -> usize {
        self.deferred_events.len()
    }

    pub fn failed_attempts(&self) -> u8 {
        self.cooldown.failed_attempts()
    }

    /// Remembered cooldown duration (may be set while no nap is pending).
    pub fn cooldown(&self) -> Option<Duration> {
        self.cooldown.current()
    }

    /// Whether the next action is a cooldown nap.
    pub fn cooldown_pending(&self) -> bool {
        self.cooldown.is_pending()
    }

    pub fn last_telemetry(&self) -> Option<Timestamp> {
        self.last_telemetry
    }

    pub fn last_success(&self) -> Option<Timestamp> {
        self.last_success
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    // ── Internal ──────────────────────────────────────────────

    /// Plan an event, or queue it behind the one already planned.
    fn plan(&mut self, event: Event) {
        if self.planned_event.is_none() {
            debug!("Planner: planned {}", event.kind);
            self.planned_event = Some(event);
            self.event_attempts = 0;
            return;
        }
        debug!("Planner: deferred {}", event.kind);
        if let Err(event) = self.deferred_events.push_back(event) {
            warn!("Planner: event queue full, dropping {}", event.kind);
        }
    }

    /// The planned event is dealt with; promote the next one.
    fn finish_event(&mut self) {
        if let Some(event) = self.planned_event.take() {
            if event.kind == EventType::Info {
                self.info_changes.mark_clean();
            }
        }
        self.planned_event = self.deferred_events.pop_front();
        self.event_attempts = 0;
    }

    /// Look at the printer and transfers for something worth an event.
    /// Only once the server knows about us.
    fn observe(
        &mut self,
        buffer: &mut ScratchBuffer,
        printer: &mut impl PrinterPort,
        transfers: &impl TransferPort,
    ) {
        if self.last_success.is_none() {
            return;
        }

        if self.info_changes.set_hash(printer.info_fingerprint()) {
            self.plan(Event::new(EventType::Info));
            return;
        }

        if let Some(event) = self.observe_transfer(transfers) {
            self.plan(event);
            return;
        }

        if let Some(event) = Self::changed_path(buffer, printer) {
            self.plan(event);
            return;
        }

        if let Some(start) = self.print_start_cmd {
            match printer.job_id() {
                Some(job_id) => {
                    self.print_start_cmd = None;
                    self.plan(
                        Event::new(EventType::JobInfo)
                            .with_job(job_id)
                            .with_start_cmd(Some(start)),
                    );
                }
                None if printer.device_state() == DeviceState::Idle => {
                    debug!("Planner: print of command {} ended without a job", start);
                    self.print_start_cmd = None;
                }
                None => {}
            }
        }
    }

    /// Transfers come and go outside of our control too (uploads from
    /// other clients).  Report what changed since the last look.
    fn observe_transfer(&mut self, transfers: &impl TransferPort) -> Option<Event> {
        let current = transfers.current_transfer();
        if current == self.observed_transfer {
            return None;
        }
        let previous = core::mem::replace(&mut self.observed_transfer, current);
        let own = self.download.as_ref().map(ResumableDownload::transfer_id);

        if let Some(prev) = previous {
            let reportable = Some(prev) != own && Some(prev) != self.reported_transfer;
            if let Some(outcome) = transfers.transfer_outcome(prev).filter(|_| reportable) {
                let kind = match outcome {
                    TransferOutcome::Finished => EventType::TransferFinished,
                    TransferOutcome::Stopped => EventType::TransferStopped,
                    TransferOutcome::Error => EventType::TransferAborted,
                };
                self.reported_transfer = Some(prev);
                // Look at the new one (if any) next time.
                self.observed_transfer = None;
                return Some(Event::new(kind).with_transfer(Some(prev)));
            }
        }

        match current {
            Some(id) if Some(id) != own => {
                Some(Event::new(EventType::TransferInfo).with_transfer(Some(id)))
            }
            _ => None,
        }
    }

    fn changed_path(buffer: &mut ScratchBuffer, printer: &mut impl PrinterPort) -> Option<Event> {
        buffer.clear();
        let change = printer.take_changed_path(buffer)?;
        let path = core::str::from_utf8(&buffer[..]).ok().and_then(shared_path);
        buffer.clear();
        let Some(path) = path else {
            warn!("Planner: changed path not representable, skipping");
            return None;
        };
        let mut event = Event::new(EventType::FileChanged).with_path(path);
        event.is_file = change.is_file;
        event.incident = Some(change.incident);
        Some(event)
    }

    fn sleep(&self, duration: Duration) -> Action {
        // A background step may produce an event; only let it run when
        // nothing is waiting to be sent, so nothing piles up.
        let background = self.background_command.is_some() && self.planned_event.is_none();
        let download = self.download.as_ref().map(|d| {
            if d.need_retry() {
                DownloadActivity::NeedsRetry
            } else {
                DownloadActivity::Running
            }
        });
        Action::Sleep(Sleep {
            duration,
            background,
            download,
        })
    }

    fn since(&self, past: Option<Timestamp>) -> Option<Duration> {
        past.map(|p| Duration::from_millis(u64::from(self.clock.now_ms().wrapping_sub(p))))
    }
}
