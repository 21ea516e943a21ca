//! # UIX Common Library
//!
//! Shared code for the uncertainty index services:
//! - Error and result types
//! - Bootstrap configuration (TOML, root folder resolution)
//! - SQLite pool initialisation and schema
//! - Month labels and clock abstraction

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
pub use time::{Clock, FixedClock, MonthLabel, SystemClock};
