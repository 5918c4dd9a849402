//! Core types for the review-request pipeline.
//!
//! This module provides type-safe wrappers for the pipeline's domain concepts.

pub mod id;
pub mod shop;
pub mod status;

pub use id::{OrderId, OrderIdError, QueueItemId};
pub use shop::{ShopDomain, ShopDomainError};
pub use status::*;
