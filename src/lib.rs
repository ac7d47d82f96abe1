//! Connect planner library.
//!
//! The client-side scheduler of a printer's single connection to the
//! Connect server: which request goes out next, how failures back off,
//! how server commands are answered and how long-running work (background
//! gcode, print start, downloads) is tracked.  Everything is synchronous
//! and does no I/O; the embedding firmware drives it through
//! [`driver::Driver`] or its own loop.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod driver;
pub mod error;
pub mod planner;

pub use error::{ConfigError, Error, PlannerError, Result};
pub use planner::Planner;
