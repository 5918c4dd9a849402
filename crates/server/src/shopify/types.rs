//! Domain types read from the Admin API.

use std::collections::HashSet;

use serde::Deserialize;

/// Days between fulfillment and the review request when unset.
pub const DEFAULT_DAY_SEND: u32 = 5;
/// Accepted range for `daySend`.
pub const DAY_SEND_RANGE: std::ops::RangeInclusive<u32> = 1..=30;

const DEFAULT_SUBJECT: &str = "Reminder email for you";
const DEFAULT_HEADING: &str = "What did you think?";
const DEFAULT_CONTENT: &str = "<p>Hi {customer_name}, We want to check in and see how you are enjoying your shopping at {site_title} {review_products}</p>";
const DEFAULT_FOOTER: &str = "{site_title} — Built with YayReviews";
const DEFAULT_SUBJECT_DISCOUNT: &str = "Reward for you";
const DEFAULT_HEADING_DISCOUNT: &str = "Thank you for your review";
const DEFAULT_CONTENT_DISCOUNT: &str = "<p>Thank you for reviewing {product_name}! As a token of our appreciation, we'd like to offer you a {discount_code} discount on your next purchase.</p>";

const DEFAULT_FIRST_NAME: &str = "John";
const DEFAULT_LAST_NAME: &str = "Doe";

// =============================================================================
// Email settings
// =============================================================================

/// Which reviews earn the reward email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscountTrigger {
    /// Only five-star reviews.
    #[default]
    FiveStar,
    /// Any submitted review.
    Any,
}

impl DiscountTrigger {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "5_star" => Some(Self::FiveStar),
            "any" => Some(Self::Any),
            _ => None,
        }
    }
}

/// A merchant's email settings, as stored in the `$app:email_settings`
/// metaobject. Unset or empty fields are `None`; the accessors fill defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailSettings {
    /// Days to wait after fulfillment (`daySend`).
    pub day_send: Option<i64>,
    /// Reminder subject.
    pub email_subject: Option<String>,
    /// Reminder heading.
    pub email_heading: Option<String>,
    /// Reminder body template.
    pub email_content: Option<String>,
    /// Reminder footer template.
    pub email_footer: Option<String>,
    /// Reward subject.
    pub email_subject_discount: Option<String>,
    /// Reward heading.
    pub email_heading_discount: Option<String>,
    /// Reward body template.
    pub email_content_discount: Option<String>,
    /// Reward footer template.
    pub email_footer_discount: Option<String>,
    /// Which reviews earn a reward.
    pub review_discount_when: Option<DiscountTrigger>,
    /// Discount code handed out by the reward email.
    pub review_discount_code: Option<String>,
}

/// Subject, heading, body and footer of one email kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailTemplate {
    /// Subject line.
    pub subject: String,
    /// `<h2>` heading.
    pub heading: String,
    /// Body template with `{placeholder}` tokens.
    pub content: String,
    /// Footer template with `{placeholder}` tokens.
    pub footer: String,
}

impl EmailSettings {
    /// Build settings from metaobject `(key, value)` fields.
    ///
    /// Rich-text fields (`emailContent`, `emailContentDiscount`) contribute the
    /// first paragraph's first text node; values that are not rich-text JSON
    /// are used verbatim. Unknown keys and unparseable numbers are ignored.
    #[must_use]
    pub fn from_fields<'a, I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
    {
        let mut settings = Self::default();

        for (key, value) in fields {
            let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
                continue;
            };
            let text = || Some(value.to_string());

            match key {
                "daySend" => settings.day_send = value.parse().ok(),
                "emailSubject" => settings.email_subject = text(),
                "emailHeading" => settings.email_heading = text(),
                "emailContent" => settings.email_content = rich_text_value(value),
                "emailFooter" => settings.email_footer = text(),
                "emailSubjectDiscount" => settings.email_subject_discount = text(),
                "emailHeadingDiscount" => settings.email_heading_discount = text(),
                "emailContentDiscount" => settings.email_content_discount = rich_text_value(value),
                "emailFooterDiscount" => settings.email_footer_discount = text(),
                "reviewDiscountWhen" => {
                    settings.review_discount_when = DiscountTrigger::parse(value);
                }
                "reviewDiscountCode" => settings.review_discount_code = text(),
                _ => {}
            }
        }

        settings
    }

    /// Days between fulfillment and the review request, clamped to 1-30.
    #[must_use]
    pub fn days_to_wait(&self) -> u32 {
        self.day_send.map_or(DEFAULT_DAY_SEND, |days| {
            let clamped = days.clamp(
                i64::from(*DAY_SEND_RANGE.start()),
                i64::from(*DAY_SEND_RANGE.end()),
            );
            u32::try_from(clamped).unwrap_or(DEFAULT_DAY_SEND)
        })
    }

    /// Review-request template with defaults filled in.
    #[must_use]
    pub fn reminder(&self) -> EmailTemplate {
        EmailTemplate {
            subject: or_default(self.email_subject.as_ref(), DEFAULT_SUBJECT),
            heading: or_default(self.email_heading.as_ref(), DEFAULT_HEADING),
            content: or_default(self.email_content.as_ref(), DEFAULT_CONTENT),
            footer: or_default(self.email_footer.as_ref(), DEFAULT_FOOTER),
        }
    }

    /// Reward template with defaults filled in.
    #[must_use]
    pub fn reward(&self) -> EmailTemplate {
        EmailTemplate {
            subject: or_default(self.email_subject_discount.as_ref(), DEFAULT_SUBJECT_DISCOUNT),
            heading: or_default(self.email_heading_discount.as_ref(), DEFAULT_HEADING_DISCOUNT),
            content: or_default(self.email_content_discount.as_ref(), DEFAULT_CONTENT_DISCOUNT),
            footer: or_default(self.email_footer_discount.as_ref(), DEFAULT_FOOTER),
        }
    }
}

fn or_default(value: Option<&String>, default: &str) -> String {
    value.map_or_else(|| default.to_string(), Clone::clone)
}

#[derive(Deserialize)]
struct RichTextNode {
    value: Option<String>,
    #[serde(default)]
    children: Vec<RichTextNode>,
}

/// First paragraph's first text node of a Shopify rich-text document.
fn rich_text_value(raw: &str) -> Option<String> {
    match serde_json::from_str::<RichTextNode>(raw) {
        Ok(root) => root
            .children
            .into_iter()
            .next()
            .and_then(|paragraph| paragraph.children.into_iter().next())
            .and_then(|text| text.value)
            .filter(|v| !v.is_empty()),
        Err(_) => Some(raw.to_string()),
    }
}

// =============================================================================
// Orders
// =============================================================================

/// A product the customer can review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewProduct {
    /// Product global ID.
    pub id: String,
    /// Product title.
    pub title: String,
    /// Storefront handle.
    pub handle: String,
    /// First product image, if any.
    pub image_url: Option<String>,
    /// Alt text of that image.
    pub image_alt: Option<String>,
}

/// The customer attached to an order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderCustomer {
    /// First name.
    pub first_name: Option<String>,
    /// Last name.
    pub last_name: Option<String>,
    /// Default email address.
    pub email: Option<String>,
}

/// What the review request needs to know about an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderInfo {
    /// Order global ID.
    pub id: String,
    /// Display name, e.g. `#1001`.
    pub name: String,
    /// Order contact email.
    pub email: Option<String>,
    /// Customer, absent for guest checkouts without PII access.
    pub customer: Option<OrderCustomer>,
    /// Products in line-item order; may repeat.
    pub products: Vec<ReviewProduct>,
}

impl OrderInfo {
    /// Recipient: the customer's default email, else the order email.
    #[must_use]
    pub fn recipient(&self) -> Option<&str> {
        fn non_empty(email: &Option<String>) -> Option<&str> {
            email
                .as_deref()
                .map(str::trim)
                .filter(|email| !email.is_empty())
        }

        self.customer
            .as_ref()
            .and_then(|customer| non_empty(&customer.email))
            .or_else(|| non_empty(&self.email))
    }

    /// `first last`, defaulting each part independently.
    #[must_use]
    pub fn customer_name(&self) -> String {
        let part = |value: Option<&String>, default: &'static str| {
            value
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
                .to_string()
        };
        let customer = self.customer.as_ref();
        format!(
            "{} {}",
            part(customer.and_then(|c| c.first_name.as_ref()), DEFAULT_FIRST_NAME),
            part(customer.and_then(|c| c.last_name.as_ref()), DEFAULT_LAST_NAME),
        )
    }

    /// Distinct products in first-seen order.
    #[must_use]
    pub fn review_products(&self) -> Vec<&ReviewProduct> {
        let mut seen = HashSet::new();
        self.products
            .iter()
            .filter(|product| seen.insert(product.id.as_str()))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn product(id: &str, title: &str) -> ReviewProduct {
        ReviewProduct {
            id: id.to_string(),
            title: title.to_string(),
            handle: title.to_lowercase(),
            image_url: None,
            image_alt: None,
        }
    }

    fn order(customer: Option<OrderCustomer>, email: Option<&str>) -> OrderInfo {
        OrderInfo {
            id: "gid://shopify/Order/1".to_string(),
            name: "#1001".to_string(),
            email: email.map(str::to_string),
            customer,
            products: vec![],
        }
    }

    #[test]
    fn test_from_fields_reads_rich_text_and_numbers() {
        let content = r#"{"type":"root","children":[{"type":"paragraph","children":[{"type":"text","value":"Hi {customer_name}"}]}]}"#;
        let settings = EmailSettings::from_fields([
            ("daySend", Some("7")),
            ("emailSubject", Some("Tell us!")),
            ("emailContent", Some(content)),
            ("reviewDiscountWhen", Some("any")),
            ("emailFooter", Some("")),
            ("somethingElse", Some("ignored")),
        ]);

        assert_eq!(settings.day_send, Some(7));
        assert_eq!(settings.email_subject.as_deref(), Some("Tell us!"));
        assert_eq!(settings.email_content.as_deref(), Some("Hi {customer_name}"));
        assert_eq!(settings.review_discount_when, Some(DiscountTrigger::Any));
        assert_eq!(settings.email_footer, None);
    }

    #[test]
    fn test_rich_text_falls_back_to_raw_value() {
        let settings = EmailSettings::from_fields([("emailContent", Some("<p>Plain {site_title}</p>"))]);
        assert_eq!(
            settings.email_content.as_deref(),
            Some("<p>Plain {site_title}</p>")
        );
    }

    #[test]
    fn test_days_to_wait_defaults_and_clamps() {
        assert_eq!(EmailSettings::default().days_to_wait(), 5);
        let with = |d| EmailSettings {
            day_send: Some(d),
            ..EmailSettings::default()
        };
        assert_eq!(with(7).days_to_wait(), 7);
        assert_eq!(with(0).days_to_wait(), 1);
        assert_eq!(with(-3).days_to_wait(), 1);
        assert_eq!(with(90).days_to_wait(), 30);
    }

    #[test]
    fn test_reminder_defaults() {
        let template = EmailSettings::default().reminder();
        assert_eq!(template.subject, "Reminder email for you");
        assert_eq!(template.heading, "What did you think?");
        assert!(template.content.contains("{review_products}"));
        assert!(template.footer.starts_with("{site_title}"));
    }

    #[test]
    fn test_reward_uses_merchant_values() {
        let settings = EmailSettings {
            email_subject_discount: Some("A gift".to_string()),
            ..EmailSettings::default()
        };
        let template = settings.reward();
        assert_eq!(template.subject, "A gift");
        assert_eq!(template.heading, "Thank you for your review");
    }

    #[test]
    fn test_recipient_prefers_customer_email() {
        let customer = OrderCustomer {
            email: Some("jane@example.com".to_string()),
            ..OrderCustomer::default()
        };
        assert_eq!(
            order(Some(customer), Some("order@example.com")).recipient(),
            Some("jane@example.com")
        );
        assert_eq!(
            order(Some(OrderCustomer::default()), Some("order@example.com")).recipient(),
            Some("order@example.com")
        );
        assert_eq!(order(None, Some("  ")).recipient(), None);
        assert_eq!(order(None, None).recipient(), None);
    }

    #[test]
    fn test_customer_name_defaults() {
        assert_eq!(order(None, None).customer_name(), "John Doe");
        let customer = OrderCustomer {
            first_name: Some("Jane".to_string()),
            ..OrderCustomer::default()
        };
        assert_eq!(order(Some(customer), None).customer_name(), "Jane Doe");
    }

    #[test]
    fn test_review_products_dedup_first_seen() {
        let mut info = order(None, None);
        info.products = vec![product("p1", "Mug"), product("p2", "Tee"), product("p1", "Mug")];

        let titles: Vec<&str> = info
            .review_products()
            .iter()
            .map(|p| p.title.as_str())
            .collect();
        assert_eq!(titles, ["Mug", "Tee"]);
    }
}
