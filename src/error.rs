//! Unified error types for the connection planner.
//!
//! Nothing in the planner is fatal.  Communication failures and server
//! refusals are not errors at all (they are [`ActionResult`] values);
//! what remains are contract violations by the driver, backpressure on
//! commands and bad configuration.  All variants are `Copy`.
//!
//! [`ActionResult`]: crate::app::events::ActionResult

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Planner(PlannerError),
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Planner(e) => write!(f, "planner: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Planner contract violations
// ---------------------------------------------------------------------------

/// The driver called the planner out of order.  The call had no effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerError {
    /// `action_done` without a preceding sending action.
    NoActionInFlight,
    /// `background_done` / `background_step` with an empty slot.
    NoBackgroundCommand,
    /// `background_done` with `More` or `Later`.
    BackgroundNotTerminal,
    /// `download_done` with no download in progress.
    NoDownload,
    /// `recover_download` when no download waits for a retry.
    NothingToRecover,
    /// `command` while too many events wait to be sent.  The command was
    /// not dispatched; the server repeats unanswered commands.
    EventBacklog,
}

impl fmt::Display for PlannerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoActionInFlight => write!(f, "no action in flight"),
            Self::NoBackgroundCommand => write!(f, "no background command"),
            Self::BackgroundNotTerminal => write!(f, "background result is not terminal"),
            Self::NoDownload => write!(f, "no download in progress"),
            Self::NothingToRecover => write!(f, "no download needs a retry"),
            Self::EventBacklog => write!(f, "too many events waiting, command not dispatched"),
        }
    }
}

impl std::error::Error for PlannerError {}

impl From<PlannerError> for Error {
    fn from(e: PlannerError) -> Self {
        Self::Planner(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Not parseable as a config at all.
    Malformed,
    /// A field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed config"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
