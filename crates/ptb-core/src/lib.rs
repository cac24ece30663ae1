//! Core domain + application logic for the parcel tracking bot.
//!
//! This crate is framework-agnostic. Telegram and the postal carrier live
//! behind ports (traits) implemented in adapter crates.

pub mod carrier;
pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod notifier;
pub mod retention;
pub mod scan;
pub mod store;
pub mod tracker;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
