//! Business logic services for the review pipeline.
//!
//! # Services
//!
//! - `intake` - Fulfillment webhook verification and enqueueing
//! - `sweep` - Daily processing of due queue items
//! - `scheduler` - Fixed-time daily trigger for the sweep
//! - `dispatch` - Rendering and sending one review request
//! - `template` - Placeholder resolution and Askama email layouts
//! - `email` - Email delivery via SMTP
//! - `discount` - Reward discount codes

pub mod discount;
pub mod dispatch;
pub mod email;
pub mod intake;
pub mod scheduler;
pub mod sweep;
pub mod template;

pub use discount::generate_discount_code;
pub use dispatch::{DispatchError, dispatch_review_request, send_test_email};
pub use email::{EmailError, MailTransport, OutgoingEmail, SendOutcome, SmtpMailer};
pub use intake::{InboundWebhook, IntakeError, IntakeOutcome, WebhookIntake};
pub use scheduler::{DailySchedule, spawn_daily_sweep};
pub use sweep::{SweepReport, Sweeper};
pub use template::{EmailKind, RenderError, RenderedEmail};
