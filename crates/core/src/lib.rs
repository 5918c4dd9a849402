//! Yay Reviews Core - Shared types library.
//!
//! This crate provides common types used across all Yay Reviews components:
//! - `server` - Webhook receiver and daily review-request sweeper
//! - `cli` - Command-line tools for migrations and operations
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for queue IDs, order IDs, shop domains and statuses
//! - [`time`] - Clock abstraction and UTC day windows

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod time;
pub mod types;

pub use time::{Clock, FixedClock, SystemClock, day_window};
pub use types::*;
