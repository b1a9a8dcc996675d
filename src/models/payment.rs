use crate::entities::{BillingCycle, PaymentMethod, PaymentStatus, payment_entity as payments};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub product_id: i64,
    pub billing_cycle: BillingCycle,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub subscription_id: i64,
    pub payment_id: i64,
    pub external_ref: String,
    pub redirect_url: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmCheckoutRequest {
    pub external_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentResponse {
    pub id: i64,
    pub subscription_id: i64,
    pub method: PaymentMethod,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub external_ref: String,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<payments::Model> for PaymentResponse {
    fn from(p: payments::Model) -> Self {
        Self {
            id: p.id,
            subscription_id: p.subscription_id,
            method: p.method,
            amount: p.amount,
            currency: p.currency,
            status: p.status,
            external_ref: p.external_ref,
            failure_reason: p.failure_reason,
            created_at: p.created_at.unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfirmCheckoutResponse {
    pub payment: PaymentResponse,
    pub subscription: super::SubscriptionResponse,
}

/// Counts from one pass of renewal collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RenewalSummary {
    pub renewed: u64,
    pub failed: u64,
}

pub const DEFAULT_PAYMENT_PAGE_SIZE: u64 = 20;
