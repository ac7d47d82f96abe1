//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter         | Implements     | Connects to          |
//! |-----------------|----------------|----------------------|
//! | `log_transport` | TransportPort  | Log output (dry run) |
//! | `time`          | ClockPort      | `std::time::Instant` |
//!
//! Printer and transfer adapters live in the embedding firmware.

pub mod log_transport;
pub mod time;
