//! Cart Rotom - product stock monitor.
//!
//! Periodically fetches product pages, decides whether the product is in
//! stock, and alerts the owner over a webhook or Telegram when that changes.

pub mod cli;
pub mod config;
pub mod crypto;
pub mod models;
pub mod notifications;
pub mod repository;
pub mod scrapers;
pub mod server;
pub mod services;
pub mod stock;
