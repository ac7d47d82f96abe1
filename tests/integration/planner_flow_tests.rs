//! Scheduling: telemetry cadence, INFO tracking, event ordering, backoff.

use core::time::Duration;

use connect_planner::app::commands::{CommandData, shared_path};
use connect_planner::app::events::{Action, ActionResult, EventType, Incident, SendTelemetry};
use connect_planner::app::ports::{DeviceState, ScratchBuffer, TransferOutcome};
use connect_planner::config::PlannerConfig;
use connect_planner::{ConfigError, Error, Planner, PlannerError};

use crate::mock_ports::{Harness, MockClock, MockPrinter, MockTransfers};

fn sleep_duration(action: &Action) -> Duration {
    match action {
        Action::Sleep(sleep) => sleep.duration,
        other => panic!("expected a nap, got {other:?}"),
    }
}

#[test]
fn first_contact_then_idle_cadence() {
    let mut h = Harness::new();
    h.connect();
    assert_eq!(sleep_duration(&h.next()), Duration::from_millis(4000));

    h.clock.advance(4000);
    assert!(!h.expect_telemetry().empty);
}

#[test]
fn printing_shortens_telemetry_interval() {
    let mut h = Harness::new();
    h.connect();
    h.printer.state = DeviceState::Printing;
    assert_eq!(sleep_duration(&h.next()), Duration::from_millis(1000));
}

#[test]
fn changed_printer_info_is_resent() {
    let mut h = Harness::new();
    h.connect();
    h.printer.fingerprint = 2;
    let event = h.expect_event();
    assert_eq!(event.kind, EventType::Info);
    assert_eq!(event.command_id, None);
    // Clean again.
    assert!(matches!(h.next(), Action::SendTelemetry(_)));
}

#[test]
fn info_resent_after_long_silence() {
    let mut h = Harness::new();
    h.connect();
    h.clock.advance(20_000);
    h.expect_telemetry();
    assert_eq!(h.expect_event().kind, EventType::Info);
}

#[test]
fn file_change_becomes_event() {
    let mut h = Harness::new();
    h.connect();
    h.printer.change_path("/usb/new.gcode", true, Incident::Created);

    let event = h.expect_event();
    assert_eq!(event.kind, EventType::FileChanged);
    assert_eq!(event.path.as_deref(), Some("/usb/new.gcode"));
    assert!(event.is_file);
    assert_eq!(event.incident, Some(Incident::Created));
    assert!(h.scratch.is_empty());
}

#[test]
fn nothing_is_observed_before_first_contact() {
    let mut h = Harness::new();
    h.printer.change_path("/usb/a", false, Incident::Deleted);
    assert_eq!(
        h.next(),
        Action::SendTelemetry(SendTelemetry { empty: true })
    );
    assert_eq!(h.printer.changed.len(), 1);
}

#[test]
fn start_print_reports_finished_then_job_info() {
    let mut h = Harness::new();
    h.connect();
    let path = shared_path("/usb/box.gcode").unwrap();
    h.command(5, CommandData::StartPrint { path });
    assert_eq!(h.planner.background_command_id(), Some(5));
    assert!(h.planner.planned_event().is_none());

    // Printer still warming up.
    match h.nap_work() {
        Action::Sleep(sleep) => assert!(sleep.background),
        other => panic!("expected a nap, got {other:?}"),
    }
    assert_eq!(h.planner.background_command_id(), Some(5));

    h.printer.state = DeviceState::Printing;
    h.printer.job = Some(42);
    h.nap_work();
    assert_eq!(h.planner.background_command_id(), None);

    let finished = h.expect_event();
    assert_eq!((finished.kind, finished.command_id), (EventType::Finished, Some(5)));

    let job = h.expect_event();
    assert_eq!(job.kind, EventType::JobInfo);
    assert_eq!(job.job_id, Some(42));
    assert_eq!(job.start_cmd_id, Some(5));
}

#[test]
fn print_ending_without_job_forgets_its_start_command() {
    let mut h = Harness::new();
    h.connect();
    let path = shared_path("/usb/box.gcode").unwrap();
    h.command(5, CommandData::StartPrint { path });
    h.printer.state = DeviceState::Printing;
    h.nap_work();
    assert_eq!(h.expect_event().kind, EventType::Finished);
    h.expect_telemetry();

    // The print is gone before it ever had a job id.
    h.printer.state = DeviceState::Idle;
    assert!(matches!(h.next(), Action::Sleep(_)));

    // A job started from the printer itself is not ours.
    h.printer.state = DeviceState::Printing;
    h.printer.job = Some(9);
    assert!(matches!(h.next(), Action::Sleep(_)));
    assert!(h.planner.planned_event().is_none());
}

#[test]
fn failed_start_print_drops_earlier_start_command() {
    let mut h = Harness::new();
    h.connect();
    let path = shared_path("/usb/box.gcode").unwrap();
    h.command(5, CommandData::StartPrint { path: path.clone() });
    h.printer.state = DeviceState::Printing;
    h.nap_work();
    assert_eq!(h.expect_event().kind, EventType::Finished);

    h.printer.state = DeviceState::Stopped;
    h.command(6, CommandData::StartPrint { path });
    h.expect_telemetry();
    h.printer.state = DeviceState::Error;
    h.nap_work();
    let failed = h.expect_event();
    assert_eq!((failed.kind, failed.command_id), (EventType::Failed, Some(6)));

    h.printer.state = DeviceState::Printing;
    h.printer.job = Some(9);
    h.expect_telemetry();
    assert!(matches!(h.next(), Action::Sleep(_)));
}

#[test]
fn events_go_out_in_order() {
    let mut h = Harness::new();
    h.connect();
    h.command(1, CommandData::SendInfo);
    h.command(2, CommandData::UnknownCommand);
    let folder = shared_path("/usb/new").unwrap();
    h.command(3, CommandData::CreateFolder { path: folder });
    assert_eq!(h.planner.deferred_len(), 2);

    let ids: Vec<_> = (0..3).map(|_| h.expect_event().command_id).collect();
    assert_eq!(ids, [Some(1), Some(2), Some(3)]);
    assert!(h.planner.planned_event().is_none());
}

#[test]
fn foreign_transfer_is_reported_start_and_end() {
    let mut h = Harness::new();
    h.connect();
    let id = h.transfers.foreign_transfer();

    let info = h.expect_event();
    assert_eq!((info.kind, info.transfer_id), (EventType::TransferInfo, Some(id)));
    assert_eq!(info.command_id, None);

    h.transfers.end_current(TransferOutcome::Finished);
    let end = h.expect_event();
    assert_eq!((end.kind, end.transfer_id), (EventType::TransferFinished, Some(id)));

    // Reported once only.
    assert!(matches!(h.next(), Action::SendTelemetry(_)));
}

#[test]
fn repeated_failures_back_off_then_recover() {
    let mut h = Harness::new();
    let mut naps = Vec::new();
    for _ in 0..3 {
        assert!(matches!(h.next(), Action::SendTelemetry(_)));
        h.done(ActionResult::Failed);
        naps.push(sleep_duration(&h.next()));
    }
    assert_eq!(
        naps,
        [100, 200, 400].map(Duration::from_millis)
    );
    assert_eq!(h.planner.failed_attempts(), 3);

    h.expect_telemetry();
    assert_eq!(h.planner.failed_attempts(), 0);
    assert_eq!(h.planner.cooldown(), None);
}

#[test]
fn failing_event_is_given_up() {
    let config = PlannerConfig {
        give_up_after_attempts: 2,
        ..Default::default()
    };
    let mut h = Harness::with_config(config);
    h.connect();
    h.command(1, CommandData::UnknownCommand);

    for _ in 0..2 {
        assert!(matches!(h.next(), Action::Event(_)));
        h.done(ActionResult::Failed);
        assert!(matches!(h.next(), Action::Sleep(_)));
    }
    assert!(h.planner.planned_event().is_none());

    // The server may have missed more than that event.
    let info = h.expect_event();
    assert_eq!((info.kind, info.command_id), (EventType::Info, None));
}

#[test]
fn refused_event_is_dropped_without_backoff() {
    let mut h = Harness::new();
    h.connect();
    h.command(1, CommandData::UnknownCommand);
    assert!(matches!(h.next(), Action::Event(_)));
    h.done(ActionResult::Refused);

    assert!(h.planner.planned_event().is_none());
    assert_eq!(h.planner.failed_attempts(), 0);
    assert!(!h.planner.cooldown_pending());
    assert!(matches!(h.next(), Action::Sleep(_)));
}

#[test]
fn reset_forgets_everything() {
    let mut h = Harness::new();
    h.connect();
    let path = shared_path("/usb/box.gcode").unwrap();
    h.command(5, CommandData::StartPrint { path });
    h.command(6, CommandData::SendInfo);
    h.command(7, CommandData::SendInfo);
    assert!(matches!(h.next(), Action::Event(_)));

    h.planner.reset();
    assert_eq!(h.planner.background_command_id(), None);
    assert!(h.planner.planned_event().is_none());
    assert_eq!(h.planner.deferred_len(), 0);
    assert!(h.planner.download().is_none());
    assert!(h.planner.last_success().is_none());
    assert!(h.planner.action_done(ActionResult::Ok).is_err());
    assert_eq!(h.next(), Action::SendTelemetry(SendTelemetry { empty: true }));
}

#[test]
fn planner_from_stored_json() -> connect_planner::Result<()> {
    let json = r#"{"cooldown_base_ms": 250}"#;
    let mut planner = Planner::from_json_config(MockClock::default(), json)?;
    assert_eq!(planner.config().cooldown_base_ms, 250);

    let (mut printer, transfers) = (MockPrinter::new(), MockTransfers::new());
    let action = planner.next_action(&mut ScratchBuffer::new(), &mut printer, &transfers);
    assert!(action.expects_done());
    planner.action_done(ActionResult::Failed)?;
    assert_eq!(planner.cooldown(), Some(Duration::from_millis(250)));

    let again = planner.action_done(ActionResult::Ok).map_err(Error::from);
    assert_eq!(again, Err(Error::Planner(PlannerError::NoActionInFlight)));

    let broken = Planner::from_json_config(MockClock::default(), "{");
    assert!(matches!(broken, Err(Error::Config(ConfigError::Malformed))));
    let invalid = Planner::from_json_config(MockClock::default(), r#"{"cooldown_base_ms": 0}"#);
    assert!(matches!(invalid, Err(Error::Config(ConfigError::ValidationFailed(_)))));
    Ok(())
}
