//! Application vocabulary and ports: pure data, zero I/O.
//!
//! [`commands`] and [`events`] are the two halves of the conversation with
//! the server; [`ports`] is everything the planner needs from the device
//! side, expressed as traits so the whole core runs on the host in tests.

pub mod commands;
pub mod events;
pub mod ports;
