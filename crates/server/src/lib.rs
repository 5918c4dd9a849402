//! Yay Reviews server library.
//!
//! Receives Shopify fulfillment webhooks, queues review-request emails in
//! Postgres and sends them from a daily sweep.
//!
//! # Architecture
//!
//! - [`routes`] - Axum handlers for the webhook endpoint and health checks
//! - [`services`] - Webhook intake, sweep, scheduler, rendering and mail
//! - [`db`] - `email_queue` and `shop_sessions` repositories
//! - [`shopify`] - Per-shop Admin API client and webhook signatures
//! - [`config`] - Environment configuration
//!
//! The binary in `main.rs` wires these together; the CLI and the integration
//! tests use the same library.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod services;
pub mod shopify;
pub mod state;
