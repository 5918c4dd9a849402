//! Review-request and reward email rendering.
//!
//! Merchant-authored subject, heading, content and footer strings carry
//! `{placeholder}` tokens from a closed set. [`Placeholders`] resolves them in
//! a single left-to-right pass: substituted text is never re-scanned, and
//! unknown tokens or tokens without a value are left as written. Plain values
//! are HTML-escaped in HTML output; product cards and the discount section are
//! rendered by Askama and inserted as trusted fragments.

use askama::Template;
use thiserror::Error;
use yay_reviews_core::ShopDomain;

use crate::shopify::{EmailSettings, EmailTemplate, OrderCustomer, OrderInfo, ReviewProduct};

use super::discount::generate_discount_code;

/// Site title used for test emails.
pub const SAMPLE_SITE_TITLE: &str = "Demo Store";
const SAMPLE_PRODUCT_TITLE: &str = "T-neck";
const SAMPLE_DISCOUNT_VALUE: &str = "10% off";

/// Errors that can occur while rendering an email.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Askama template rendering failed.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// Which email a merchant template describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailKind {
    /// Review request sent after fulfillment.
    Reminder,
    /// Thank-you email carrying a discount code.
    Reward,
}

impl std::str::FromStr for EmailKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reminder" | "review" => Ok(Self::Reminder),
            "reward" | "discount" => Ok(Self::Reward),
            other => Err(format!("unknown email kind: {other}")),
        }
    }
}

/// A rendered email ready for the mailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    /// Subject line, placeholders resolved, not escaped.
    pub subject: String,
    /// Full HTML document.
    pub html: String,
}

// =============================================================================
// Placeholder resolution
// =============================================================================

/// The closed set of template tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// `{customer_name}`
    CustomerName,
    /// `{site_title}`
    SiteTitle,
    /// `{review_products}`
    ReviewProducts,
    /// `{product_name}`
    ProductName,
    /// `{discount_code}`
    DiscountCode,
    /// `{discount}`
    Discount,
    /// `{discount_value}`
    DiscountValue,
}

impl Placeholder {
    /// Token name without braces.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CustomerName => "customer_name",
            Self::SiteTitle => "site_title",
            Self::ReviewProducts => "review_products",
            Self::ProductName => "product_name",
            Self::DiscountCode => "discount_code",
            Self::Discount => "discount",
            Self::DiscountValue => "discount_value",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "customer_name" => Some(Self::CustomerName),
            "site_title" => Some(Self::SiteTitle),
            "review_products" => Some(Self::ReviewProducts),
            "product_name" => Some(Self::ProductName),
            "discount_code" => Some(Self::DiscountCode),
            "discount" => Some(Self::Discount),
            "discount_value" => Some(Self::DiscountValue),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Html(String),
}

fn escape_html(text: &str) -> String {
    let Ok(escaped) = askama::filters::escape(text, askama::filters::Html);
    escaped.to_string()
}

/// Values bound to placeholders for one email.
#[derive(Debug, Clone, Default)]
pub struct Placeholders {
    values: Vec<(Placeholder, Value)>,
}

impl Placeholders {
    /// No bound values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a plain-text value; it is escaped in HTML output.
    #[must_use]
    pub fn text(mut self, placeholder: Placeholder, value: impl Into<String>) -> Self {
        self.values.push((placeholder, Value::Text(value.into())));
        self
    }

    /// Bind a trusted HTML fragment; it is only substituted in HTML output.
    #[must_use]
    pub fn html(mut self, placeholder: Placeholder, fragment: impl Into<String>) -> Self {
        self.values.push((placeholder, Value::Html(fragment.into())));
        self
    }

    fn get(&self, placeholder: Placeholder) -> Option<&Value> {
        self.values
            .iter()
            .rev()
            .find(|(p, _)| *p == placeholder)
            .map(|(_, value)| value)
    }

    /// Resolve tokens for an HTML body.
    ///
    /// # Errors
    ///
    /// Returns an error if escaping a value fails.
    pub fn resolve_html(&self, template: &str) -> Result<String, RenderError> {
        self.resolve(template, |value| match value {
            Value::Text(text) => Ok(Some(escape_html(text))),
            Value::Html(html) => Ok(Some(html.clone())),
        })
    }

    /// Resolve tokens for plain text such as a subject line.
    #[must_use]
    pub fn resolve_text(&self, template: &str) -> String {
        self.resolve(template, |value| match value {
            Value::Text(text) => Ok(Some(text.clone())),
            Value::Html(_) => Ok(None),
        })
        .unwrap_or_else(|_: RenderError| template.to_string())
    }

    fn resolve<F>(&self, template: &str, mut render: F) -> Result<String, RenderError>
    where
        F: FnMut(&Value) -> Result<Option<String>, askama::Error>,
    {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some((before, after)) = rest.split_once('{') {
            out.push_str(before);
            rest = after;

            // A `{` before the closing brace starts a new candidate token
            let Some((name, tail)) = after
                .split_once('}')
                .filter(|(name, _)| !name.contains('{'))
            else {
                out.push('{');
                continue;
            };

            let value = Placeholder::from_name(name).and_then(|p| self.get(p));
            match value.map(&mut render).transpose()?.flatten() {
                Some(text) => {
                    out.push_str(&text);
                    rest = tail;
                }
                None => out.push('{'),
            }
        }

        out.push_str(rest);
        Ok(out)
    }

    fn contains_token(template: &str, placeholder: Placeholder) -> bool {
        template.contains(&format!("{{{}}}", placeholder.name()))
    }
}

// =============================================================================
// Layout templates
// =============================================================================

#[derive(Template)]
#[template(path = "email/review_request.html")]
struct ReviewRequestLayout<'a> {
    subject: &'a str,
    heading: &'a str,
    content: &'a str,
    footer: &'a str,
}

#[derive(Template)]
#[template(path = "email/reward.html")]
struct RewardLayout<'a> {
    subject: &'a str,
    heading: &'a str,
    content: &'a str,
    footer: &'a str,
    discount_section: &'a str,
}

struct ProductCard<'a> {
    title: &'a str,
    image_url: &'a str,
    image_alt: &'a str,
    review_url: String,
}

#[derive(Template)]
#[template(path = "email/review_products.html")]
struct ReviewProductsFragment<'a> {
    products: Vec<ProductCard<'a>>,
}

#[derive(Template)]
#[template(path = "email/discount.html")]
struct DiscountFragment<'a> {
    code: &'a str,
    value: &'a str,
    apply_url: String,
}

/// One card per distinct product, linking to its storefront page.
///
/// # Errors
///
/// Returns an error if the fragment fails to render.
pub fn render_review_products(
    shop: &ShopDomain,
    products: &[&ReviewProduct],
) -> Result<String, RenderError> {
    let products = products
        .iter()
        .map(|product| ProductCard {
            title: &product.title,
            image_url: product.image_url.as_deref().unwrap_or_default(),
            image_alt: product
                .image_alt
                .as_deref()
                .unwrap_or(product.title.as_str()),
            review_url: shop.product_url(&product.handle),
        })
        .collect();

    Ok(ReviewProductsFragment { products }.render()?)
}

fn render_discount_section(
    shop: &ShopDomain,
    code: &str,
    value: Option<&str>,
) -> Result<String, RenderError> {
    Ok(DiscountFragment {
        code,
        value: value.unwrap_or_default(),
        apply_url: shop.discount_url(code),
    }
    .render()?)
}

// =============================================================================
// Emails
// =============================================================================

/// Render the review request for a fulfilled order.
///
/// # Errors
///
/// Returns an error if a template fails to render.
pub fn render_review_request(
    shop: &ShopDomain,
    site_title: &str,
    template: &EmailTemplate,
    order: &OrderInfo,
) -> Result<RenderedEmail, RenderError> {
    let products = render_review_products(shop, &order.review_products())?;
    let placeholders = Placeholders::new()
        .text(Placeholder::CustomerName, order.customer_name())
        .text(Placeholder::SiteTitle, site_title)
        .html(Placeholder::ReviewProducts, products);

    let subject = placeholders.resolve_text(&template.subject);
    let heading = placeholders.resolve_text(&template.heading);
    let content = placeholders.resolve_html(&template.content)?;
    let footer = placeholders.resolve_html(&template.footer)?;

    let html = ReviewRequestLayout {
        subject: &subject,
        heading: &heading,
        content: &content,
        footer: &footer,
    }
    .render()?;

    Ok(RenderedEmail { subject, html })
}

/// What a reward email hands out.
#[derive(Debug, Clone, Copy)]
pub struct Reward<'a> {
    /// Name of the reviewed product.
    pub product_name: &'a str,
    /// Discount code, if one was issued.
    pub discount_code: Option<&'a str>,
    /// Human summary of the discount, e.g. `10% off`.
    pub discount_value: Option<&'a str>,
}

/// Render the reward email sent after a qualifying review.
///
/// When a code is present and the content has no `{discount}` token, the
/// discount section is appended after the content.
///
/// # Errors
///
/// Returns an error if a template fails to render.
pub fn render_reward(
    shop: &ShopDomain,
    site_title: &str,
    template: &EmailTemplate,
    customer_name: &str,
    reward: &Reward<'_>,
) -> Result<RenderedEmail, RenderError> {
    let mut placeholders = Placeholders::new()
        .text(Placeholder::CustomerName, customer_name)
        .text(Placeholder::SiteTitle, site_title)
        .text(Placeholder::ProductName, reward.product_name);

    let mut discount_section = String::new();
    if let Some(code) = reward.discount_code {
        discount_section = render_discount_section(shop, code, reward.discount_value)?;
        placeholders = placeholders
            .text(Placeholder::DiscountCode, code)
            .html(Placeholder::Discount, discount_section.clone());
    }
    if let Some(value) = reward.discount_value {
        placeholders = placeholders.text(Placeholder::DiscountValue, value);
    }

    let subject = placeholders.resolve_text(&template.subject);
    let heading = placeholders.resolve_text(&template.heading);
    let content = placeholders.resolve_html(&template.content)?;
    let footer = placeholders.resolve_html(&template.footer)?;

    if Placeholders::contains_token(&template.content, Placeholder::Discount) {
        discount_section.clear();
    }

    let html = RewardLayout {
        subject: &subject,
        heading: &heading,
        content: &content,
        footer: &footer,
        discount_section: &discount_section,
    }
    .render()?;

    Ok(RenderedEmail { subject, html })
}

// =============================================================================
// Sample data
// =============================================================================

/// Order used for test emails: John Doe with two T-necks.
#[must_use]
pub fn sample_order() -> OrderInfo {
    let product = |n: u32| ReviewProduct {
        id: format!("gid://shopify/Product/{n}"),
        title: SAMPLE_PRODUCT_TITLE.to_string(),
        handle: "t-neck".to_string(),
        image_url: None,
        image_alt: None,
    };

    OrderInfo {
        id: "gid://shopify/Order/1001".to_string(),
        name: "#1001".to_string(),
        email: None,
        customer: Some(OrderCustomer {
            first_name: Some("John".to_string()),
            last_name: Some("Doe".to_string()),
            email: None,
        }),
        products: vec![product(1), product(2)],
    }
}

/// Render `kind` from the merchant's settings with sample data.
///
/// # Errors
///
/// Returns an error if a template fails to render.
pub fn render_test_email(
    shop: &ShopDomain,
    settings: &EmailSettings,
    kind: EmailKind,
) -> Result<RenderedEmail, RenderError> {
    let order = sample_order();

    match kind {
        EmailKind::Reminder => {
            render_review_request(shop, SAMPLE_SITE_TITLE, &settings.reminder(), &order)
        }
        EmailKind::Reward => {
            let code = settings
                .review_discount_code
                .clone()
                .unwrap_or_else(generate_discount_code);
            render_reward(
                shop,
                SAMPLE_SITE_TITLE,
                &settings.reward(),
                &order.customer_name(),
                &Reward {
                    product_name: SAMPLE_PRODUCT_TITLE,
                    discount_code: Some(&code),
                    discount_value: Some(SAMPLE_DISCOUNT_VALUE),
                },
            )
        }
    }
}
