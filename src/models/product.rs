use crate::billing;
use crate::entities::{Availability, BillingCycle, ProductCategory, product_entity as products};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PaginationParams;

pub const DEFAULT_PRODUCT_PAGE_SIZE: u64 = 10;
pub const DEFAULT_POPULAR_LIMIT: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub description: String,
    pub image: String,
    pub url: String,
    pub category: ProductCategory,
    /// Cents.
    pub price_monthly: i64,
    pub price_yearly: i64,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub is_popular: bool,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub reviews: i64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub availability: Option<Availability>,
    #[serde(default)]
    pub trial_days: i32,
    pub max_users: Option<i32>,
    pub storage: Option<String>,
    pub support: Option<String>,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub url: Option<String>,
    pub category: Option<ProductCategory>,
    pub price_monthly: Option<i64>,
    pub price_yearly: Option<i64>,
    pub features: Option<Vec<String>>,
    pub is_popular: Option<bool>,
    pub rating: Option<f64>,
    pub reviews: Option<i64>,
    pub tags: Option<Vec<String>>,
    pub availability: Option<Availability>,
    pub is_active: Option<bool>,
    pub trial_days: Option<i32>,
    pub max_users: Option<i32>,
    pub storage: Option<String>,
    pub support: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductQuery {
    pub search: Option<String>,
    pub category: Option<ProductCategory>,
    pub is_popular: Option<bool>,
    /// Bounds on the monthly price, in cents.
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub include_inactive: bool,
    #[serde(flatten)]
    pub pagination: PaginationParams,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormattedPrice {
    pub monthly: String,
    pub yearly: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductResponse {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub image: String,
    pub url: String,
    pub category: ProductCategory,
    pub price_monthly: i64,
    pub price_yearly: i64,
    pub formatted_price: FormattedPrice,
    pub yearly_savings: i64,
    pub features: Vec<String>,
    pub is_popular: bool,
    pub rating: f64,
    pub reviews: i64,
    pub tags: Vec<String>,
    pub availability: Availability,
    pub is_active: bool,
    pub trial_days: i32,
    pub max_users: Option<i32>,
    pub storage: Option<String>,
    pub support: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<products::Model> for ProductResponse {
    fn from(p: products::Model) -> Self {
        Self {
            formatted_price: FormattedPrice {
                monthly: billing::format_price(p.price_monthly),
                yearly: billing::format_price(p.price_yearly),
            },
            yearly_savings: billing::yearly_savings_percent(p.price_monthly, p.price_yearly),
            id: p.id,
            name: p.name,
            description: p.description,
            image: p.image,
            url: p.url,
            category: p.category,
            price_monthly: p.price_monthly,
            price_yearly: p.price_yearly,
            features: p.features.0,
            is_popular: p.is_popular,
            rating: p.rating,
            reviews: p.reviews,
            tags: p.tags.0,
            availability: p.availability,
            is_active: p.is_active,
            trial_days: p.trial_days,
            max_users: p.max_users,
            storage: p.storage,
            support: p.support,
            created_at: p.created_at.unwrap_or_else(Utc::now),
            updated_at: p.updated_at,
        }
    }
}

/// Compact product view embedded in subscription listings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductSummary {
    pub id: i64,
    pub name: String,
    pub category: ProductCategory,
    pub image: String,
}

impl From<&products::Model> for ProductSummary {
    fn from(p: &products::Model) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            category: p.category,
            image: p.image.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceOption {
    pub amount: i64,
    pub currency: String,
    pub interval: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub savings: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PricingOptions {
    pub monthly: PriceOption,
    pub yearly: PriceOption,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscriptionOptions {
    pub product_id: i64,
    pub name: String,
    pub description: String,
    pub pricing: PricingOptions,
    pub features: Vec<String>,
    pub trial_days: i32,
    pub max_users: Option<i32>,
    pub storage: Option<String>,
    pub support: Option<String>,
}

impl SubscriptionOptions {
    /// `None` when the product cannot be subscribed to.
    pub fn for_product(p: &products::Model, currency: &str) -> Option<Self> {
        if !p.can_subscribe() {
            return None;
        }
        let option = |cycle: BillingCycle, savings: Option<i64>| PriceOption {
            amount: billing::price_for(cycle, p.price_monthly, p.price_yearly),
            currency: currency.to_string(),
            interval: cycle.unit().to_string(),
            savings,
        };
        Some(Self {
            product_id: p.id,
            name: p.name.clone(),
            description: p.description.clone(),
            pricing: PricingOptions {
                monthly: option(BillingCycle::Monthly, None),
                yearly: option(
                    BillingCycle::Yearly,
                    Some(billing::yearly_savings_percent(p.price_monthly, p.price_yearly)),
                ),
            },
            features: p.features.0.clone(),
            trial_days: p.trial_days,
            max_users: p.max_users,
            storage: p.storage.clone(),
            support: p.support.clone(),
        })
    }
}
