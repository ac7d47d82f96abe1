//! Change tracking for the `INFO` event.
//!
//! The printer exposes a fingerprint of everything `INFO` reports.  When it
//! moves, the server needs a fresh `INFO`; the tracker stays dirty until
//! one is acknowledged.

#[derive(Debug, Clone, Default)]
pub struct Tracked {
    fingerprint: Option<u64>,
    dirty: bool,
}

impl Tracked {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the current fingerprint.  Returns whether a resend is due.
    pub fn set_hash(&mut self, fingerprint: u64) -> bool {
        if self.fingerprint != Some(fingerprint) {
            self.fingerprint = Some(fingerprint);
            self.dirty = true;
        }
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Forget the fingerprint too; the next one always counts as a change.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
