//! Queue status and webhook topic enums.

use serde::{Deserialize, Serialize};

/// Delivery status of a review-request queue item.
///
/// The only legal transitions are `Pending -> Sent` and `Pending -> Failed`;
/// both right-hand states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "email_queue_status", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    /// Waiting for its scheduled day.
    #[default]
    Pending,
    /// Email handed to the SMTP relay.
    Sent,
    /// Dispatch failed; never retried automatically.
    Failed,
}

impl QueueStatus {
    /// Whether no further transitions are allowed from this status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }

    /// Whether `self -> next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(self, Self::Pending) && next.is_terminal()
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Sent => write!(f, "SENT"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

impl std::str::FromStr for QueueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "SENT" => Ok(Self::Sent),
            "FAILED" => Ok(Self::Failed),
            _ => Err(format!("invalid queue status: {s}")),
        }
    }
}

/// Webhook topics that schedule a review request.
///
/// `ORDERS_FULFILLED` is registered when the app may read customer PII;
/// otherwise the REST `fulfillments/create` topic is used as a fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WebhookTopic {
    /// `ORDERS_FULFILLED` (GraphQL enum form).
    #[serde(rename = "ORDERS_FULFILLED")]
    OrdersFulfilled,
    /// `FULFILLMENTS/CREATE` (REST form, upper-cased).
    #[serde(rename = "FULFILLMENTS/CREATE")]
    FulfillmentsCreate,
}

impl WebhookTopic {
    /// Upper-cased allow-list, as compared against the `x-shopify-topic` header.
    pub const ALLOWED: [&'static str; 2] = ["ORDERS_FULFILLED", "FULFILLMENTS/CREATE"];

    /// Match a raw `x-shopify-topic` header value (case-insensitive).
    ///
    /// Shopify delivers REST-registered subscriptions with slash topics
    /// (`orders/fulfilled`), so that spelling is accepted as well.
    #[must_use]
    pub fn from_header(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ORDERS_FULFILLED" | "ORDERS/FULFILLED" => Some(Self::OrdersFulfilled),
            "FULFILLMENTS/CREATE" => Some(Self::FulfillmentsCreate),
            _ => None,
        }
    }

    /// Canonical upper-case name, stored alongside the queue row.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrdersFulfilled => "ORDERS_FULFILLED",
            Self::FulfillmentsCreate => "FULFILLMENTS/CREATE",
        }
    }

    /// Topic name as the REST webhooks endpoint expects it.
    #[must_use]
    pub const fn rest_name(self) -> &'static str {
        match self {
            Self::OrdersFulfilled => "orders/fulfilled",
            Self::FulfillmentsCreate => "fulfillments/create",
        }
    }
}

impl std::fmt::Display for WebhookTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_status_transitions() {
        assert!(QueueStatus::Pending.can_transition_to(QueueStatus::Sent));
        assert!(QueueStatus::Pending.can_transition_to(QueueStatus::Failed));
        assert!(!QueueStatus::Pending.can_transition_to(QueueStatus::Pending));
        assert!(!QueueStatus::Sent.can_transition_to(QueueStatus::Failed));
        assert!(!QueueStatus::Failed.can_transition_to(QueueStatus::Sent));
        assert!(!QueueStatus::Failed.can_transition_to(QueueStatus::Pending));
    }

    #[test]
    fn test_queue_status_display_and_parse() {
        for status in [QueueStatus::Pending, QueueStatus::Sent, QueueStatus::Failed] {
            assert_eq!(status.to_string().parse::<QueueStatus>(), Ok(status));
        }
        assert_eq!("sent".parse::<QueueStatus>(), Ok(QueueStatus::Sent));
        assert!("LEASED".parse::<QueueStatus>().is_err());
    }

    #[test]
    fn test_queue_status_serde() {
        assert_eq!(
            serde_json::to_string(&QueueStatus::Failed).ok().as_deref(),
            Some("\"FAILED\"")
        );
    }

    #[test]
    fn test_topic_from_header() {
        assert_eq!(
            WebhookTopic::from_header("ORDERS_FULFILLED"),
            Some(WebhookTopic::OrdersFulfilled)
        );
        assert_eq!(
            WebhookTopic::from_header("orders/fulfilled"),
            Some(WebhookTopic::OrdersFulfilled)
        );
        assert_eq!(
            WebhookTopic::from_header("fulfillments/create"),
            Some(WebhookTopic::FulfillmentsCreate)
        );
        assert_eq!(WebhookTopic::from_header("CARTS_UPDATE"), None);
        assert_eq!(WebhookTopic::from_header(""), None);
    }

    #[test]
    fn test_topic_names() {
        assert_eq!(WebhookTopic::FulfillmentsCreate.as_str(), "FULFILLMENTS/CREATE");
        assert_eq!(WebhookTopic::FulfillmentsCreate.rest_name(), "fulfillments/create");
        for topic in [WebhookTopic::OrdersFulfilled, WebhookTopic::FulfillmentsCreate] {
            assert!(WebhookTopic::ALLOWED.contains(&topic.as_str()));
        }
    }
}
