//! Command implementations.

pub mod agent;
pub mod check;
pub mod notify;
pub mod payment;
pub mod serve;
