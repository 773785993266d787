//! Service layer for Cart Rotom.
//!
//! Domain logic separated from the CLI and HTTP surfaces.

pub mod check;
pub mod scheduler;

pub use check::{should_notify, CheckReport, CycleSummary, StockChecker, BOT_DETECTED_MESSAGE};
pub use scheduler::Scheduler;
