//! Log-based transport adapter.
//!
//! Implements [`TransportPort`] by writing every request to the logger
//! instead of the wire.  Useful for dry runs on the host and as the
//! reference for what the driver hands to a real transport.  Never fails
//! and never receives commands.

use log::info;

use crate::app::commands::Command;
use crate::app::events::{Event, SendTelemetry};
use crate::app::ports::{TransportError, TransportPort};

#[derive(Debug, Default)]
pub struct LogTransport {
    sent: u32,
}

impl LogTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests "sent" so far.
    pub fn sent(&self) -> u32 {
        self.sent
    }
}

impl TransportPort for LogTransport {
    fn send_telemetry(
        &mut self,
        telemetry: SendTelemetry,
    ) -> Result<Option<Command>, TransportError> {
        self.sent = self.sent.wrapping_add(1);
        info!(
            "TELEM | #{} | {}",
            self.sent,
            if telemetry.empty { "empty" } else { "full" }
        );
        Ok(None)
    }

    fn send_event(&mut self, event: &Event) -> Result<Option<Command>, TransportError> {
        self.sent = self.sent.wrapping_add(1);
        match serde_json::to_string(event) {
            Ok(json) => info!("EVENT | #{} | {}", self.sent, json),
            Err(e) => info!("EVENT | #{} | {} (unserializable: {})", self.sent, event.kind, e),
        }
        Ok(None)
    }
}
