//! GraphQL operations for the Shopify Admin API.
//!
//! Each operation follows the layout `graphql_client` generates: a unit
//! struct implementing [`GraphQLQuery`] plus a snake-case module holding its
//! `Variables` and `ResponseData`. Only the fields the review pipeline reads
//! are declared.

use graphql_client::{GraphQLQuery, QueryBody};

use super::types::{EmailSettings, OrderCustomer, OrderInfo, ReviewProduct};

// =============================================================================
// Email settings metaobject
// =============================================================================

/// Reads the app-owned `$app:email_settings` metaobject.
pub struct GetEmailSettings;

pub mod get_email_settings {
    use serde::{Deserialize, Serialize};

    pub const OPERATION_NAME: &str = "GetEmailSettings";
    pub const QUERY: &str = r#"query GetEmailSettings {
  metaobjects(type: "$app:email_settings", first: 1) {
    nodes {
      id
      fields {
        key
        value
      }
    }
  }
}"#;

    #[derive(Debug, Serialize)]
    pub struct Variables;

    #[derive(Debug, Clone, Deserialize)]
    pub struct ResponseData {
        pub metaobjects: Metaobjects,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct Metaobjects {
        pub nodes: Vec<Metaobject>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct Metaobject {
        pub id: String,
        pub fields: Vec<MetaobjectField>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct MetaobjectField {
        pub key: String,
        pub value: Option<String>,
    }
}

impl GraphQLQuery for GetEmailSettings {
    type Variables = get_email_settings::Variables;
    type ResponseData = get_email_settings::ResponseData;

    fn build_query(variables: Self::Variables) -> QueryBody<Self::Variables> {
        QueryBody {
            variables,
            query: get_email_settings::QUERY,
            operation_name: get_email_settings::OPERATION_NAME,
        }
    }
}

impl From<&get_email_settings::Metaobject> for EmailSettings {
    fn from(metaobject: &get_email_settings::Metaobject) -> Self {
        Self::from_fields(
            metaobject
                .fields
                .iter()
                .map(|field| (field.key.as_str(), field.value.as_deref())),
        )
    }
}

// =============================================================================
// Order info
// =============================================================================

/// Reads the customer, contact email and line-item products of one order.
pub struct FetchOrderInfo;

pub mod fetch_order_info {
    use serde::{Deserialize, Serialize};

    pub const OPERATION_NAME: &str = "FetchOrderInfo";
    pub const QUERY: &str = r"query FetchOrderInfo($id: ID!) {
  order(id: $id) {
    id
    name
    email
    customer {
      id
      firstName
      lastName
      defaultEmailAddress {
        emailAddress
      }
    }
    lineItems(first: 100) {
      edges {
        node {
          id
          variant {
            product {
              id
              title
              handle
              media(first: 1, sortKey: POSITION) {
                edges {
                  node {
                    ... on MediaImage {
                      image {
                        url
                        altText
                      }
                    }
                  }
                }
              }
            }
          }
        }
      }
    }
  }
}";

    #[derive(Debug, Serialize)]
    pub struct Variables {
        pub id: String,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct ResponseData {
        pub order: Option<Order>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct Order {
        pub id: String,
        pub name: String,
        pub email: Option<String>,
        pub customer: Option<Customer>,
        #[serde(rename = "lineItems")]
        pub line_items: Connection<LineItem>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct Customer {
        #[serde(rename = "firstName")]
        pub first_name: Option<String>,
        #[serde(rename = "lastName")]
        pub last_name: Option<String>,
        #[serde(rename = "defaultEmailAddress")]
        pub default_email_address: Option<EmailAddress>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct EmailAddress {
        #[serde(rename = "emailAddress")]
        pub email_address: Option<String>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct Connection<T> {
        pub edges: Vec<Edge<T>>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct Edge<T> {
        pub node: T,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct LineItem {
        pub variant: Option<Variant>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct Variant {
        pub product: Product,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct Product {
        pub id: String,
        pub title: String,
        pub handle: String,
        pub media: Connection<Media>,
    }

    /// Non-image media resolve to an empty object.
    #[derive(Debug, Clone, Deserialize)]
    pub struct Media {
        #[serde(default)]
        pub image: Option<Image>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct Image {
        pub url: String,
        #[serde(rename = "altText")]
        pub alt_text: Option<String>,
    }
}

impl GraphQLQuery for FetchOrderInfo {
    type Variables = fetch_order_info::Variables;
    type ResponseData = fetch_order_info::ResponseData;

    fn build_query(variables: Self::Variables) -> QueryBody<Self::Variables> {
        QueryBody {
            variables,
            query: fetch_order_info::QUERY,
            operation_name: fetch_order_info::OPERATION_NAME,
        }
    }
}

impl From<fetch_order_info::Order> for OrderInfo {
    fn from(order: fetch_order_info::Order) -> Self {
        let customer = order.customer.map(|customer| OrderCustomer {
            first_name: customer.first_name,
            last_name: customer.last_name,
            email: customer
                .default_email_address
                .and_then(|address| address.email_address),
        });

        // Custom and deleted-variant line items have no product to review
        let products = order
            .line_items
            .edges
            .into_iter()
            .filter_map(|edge| edge.node.variant)
            .map(|variant| {
                let product = variant.product;
                let image = product
                    .media
                    .edges
                    .into_iter()
                    .find_map(|edge| edge.node.image);
                ReviewProduct {
                    id: product.id,
                    title: product.title,
                    handle: product.handle,
                    image_url: image.as_ref().map(|image| image.url.clone()),
                    image_alt: image.and_then(|image| image.alt_text),
                }
            })
            .collect();

        Self {
            id: order.id,
            name: order.name,
            email: order.email,
            customer,
            products,
        }
    }
}

// =============================================================================
// Webhook subscriptions
// =============================================================================

/// Subscribes the app to a webhook topic.
pub struct WebhookSubscriptionCreate;

pub mod webhook_subscription_create {
    use serde::{Deserialize, Serialize};

    pub const OPERATION_NAME: &str = "WebhookSubscriptionCreate";
    pub const QUERY: &str = r"mutation WebhookSubscriptionCreate($topic: WebhookSubscriptionTopic!, $webhookSubscription: WebhookSubscriptionInput!) {
  webhookSubscriptionCreate(topic: $topic, webhookSubscription: $webhookSubscription) {
    webhookSubscription {
      id
    }
    userErrors {
      field
      message
    }
  }
}";

    #[derive(Debug, Serialize)]
    pub struct Variables {
        pub topic: String,
        #[serde(rename = "webhookSubscription")]
        pub webhook_subscription: WebhookSubscriptionInput,
    }

    #[derive(Debug, Serialize)]
    pub struct WebhookSubscriptionInput {
        #[serde(rename = "callbackUrl")]
        pub callback_url: String,
        pub format: String,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct ResponseData {
        #[serde(rename = "webhookSubscriptionCreate")]
        pub webhook_subscription_create: Option<Payload>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct Payload {
        #[serde(rename = "webhookSubscription")]
        pub webhook_subscription: Option<WebhookSubscription>,
        #[serde(rename = "userErrors")]
        pub user_errors: Vec<UserError>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct WebhookSubscription {
        pub id: String,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct UserError {
        pub field: Option<Vec<String>>,
        pub message: String,
    }
}

impl GraphQLQuery for WebhookSubscriptionCreate {
    type Variables = webhook_subscription_create::Variables;
    type ResponseData = webhook_subscription_create::ResponseData;

    fn build_query(variables: Self::Variables) -> QueryBody<Self::Variables> {
        QueryBody {
            variables,
            query: webhook_subscription_create::QUERY,
            operation_name: webhook_subscription_create::OPERATION_NAME,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_build_query_carries_operation_name() {
        let body = FetchOrderInfo::build_query(fetch_order_info::Variables {
            id: "gid://shopify/Order/42".to_string(),
        });
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["operationName"], "FetchOrderInfo");
        assert_eq!(json["variables"]["id"], "gid://shopify/Order/42");
        assert!(json["query"].as_str().unwrap().contains("defaultEmailAddress"));
    }

    #[test]
    fn test_order_response_into_order_info() {
        let data: fetch_order_info::ResponseData = serde_json::from_value(serde_json::json!({
            "order": {
                "id": "gid://shopify/Order/42",
                "name": "#1042",
                "email": "order@example.com",
                "customer": {
                    "id": "gid://shopify/Customer/7",
                    "firstName": "Jane",
                    "lastName": null,
                    "defaultEmailAddress": { "emailAddress": "jane@example.com" }
                },
                "lineItems": { "edges": [
                    { "node": { "id": "li1", "variant": { "product": {
                        "id": "gid://shopify/Product/1", "title": "T-neck", "handle": "t-neck",
                        "media": { "edges": [ { "node": { "image": {
                            "url": "https://cdn.shopify.com/t-neck.jpg", "altText": "Front"
                        } } } ] }
                    } } } },
                    { "node": { "id": "li2", "variant": { "product": {
                        "id": "gid://shopify/Product/2", "title": "Gift card", "handle": "gift-card",
                        "media": { "edges": [ { "node": {} } ] }
                    } } } },
                    { "node": { "id": "li3", "variant": null } }
                ] }
            }
        }))
        .unwrap();

        let info = OrderInfo::from(data.order.unwrap());
        assert_eq!(info.recipient(), Some("jane@example.com"));
        assert_eq!(info.customer_name(), "Jane Doe");
        assert_eq!(info.products.len(), 2);
        assert_eq!(
            info.products[0].image_url.as_deref(),
            Some("https://cdn.shopify.com/t-neck.jpg")
        );
        assert_eq!(info.products[1].image_url, None);
    }

    #[test]
    fn test_metaobject_into_settings() {
        let data: get_email_settings::ResponseData = serde_json::from_value(serde_json::json!({
            "metaobjects": { "nodes": [ {
                "id": "gid://shopify/Metaobject/1",
                "fields": [
                    { "key": "daySend", "value": "14" },
                    { "key": "emailHeading", "value": null }
                ]
            } ] }
        }))
        .unwrap();

        let settings = EmailSettings::from(&data.metaobjects.nodes[0]);
        assert_eq!(settings.days_to_wait(), 14);
        assert_eq!(settings.email_heading, None);
    }
}
