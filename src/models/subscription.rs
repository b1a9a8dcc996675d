use crate::billing::{self, PlanChangeKind};
use crate::entities::{
    BillingCycle, PaymentMethod, SubscriptionStatus, subscription_entity as subscriptions,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PaginationParams, ProductSummary};

pub const DEFAULT_SUBSCRIPTION_PAGE_SIZE: u64 = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub product_id: i64,
    pub billing_cycle: BillingCycle,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionQuery {
    pub status: Option<SubscriptionStatus>,
    pub billing_cycle: Option<BillingCycle>,
    #[serde(flatten)]
    pub pagination: PaginationParams,
}

/// Upgrade/downgrade target; at least one field must change something.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangePlanRequest {
    pub product_id: Option<i64>,
    pub billing_cycle: Option<BillingCycle>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionResponse {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<ProductSummary>,
    pub status: SubscriptionStatus,
    pub billing_cycle: BillingCycle,
    pub amount: i64,
    pub formatted_amount: String,
    pub payment_method: PaymentMethod,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub next_billing: Option<DateTime<Utc>>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub failure_reason: Option<String>,
    pub last_payment_date: Option<DateTime<Utc>>,
    pub next_payment_date: Option<DateTime<Utc>>,
    pub auto_renew: bool,
    pub metadata: serde_json::Value,
    pub days_remaining: i64,
    pub is_active: bool,
    pub is_in_trial: bool,
    pub is_expiring_soon: bool,
    pub created_at: DateTime<Utc>,
}

impl SubscriptionResponse {
    pub fn build(
        s: subscriptions::Model,
        product: Option<ProductSummary>,
        now: DateTime<Utc>,
        expiring_window_days: i64,
    ) -> Self {
        Self {
            days_remaining: billing::days_remaining_at(s.end_date, now),
            is_active: billing::is_active_at(s.status, s.end_date, now),
            is_in_trial: billing::is_in_trial_at(s.status, s.trial_ends_at, now),
            is_expiring_soon: s.status == SubscriptionStatus::Active
                && billing::is_expiring_soon_at(s.end_date, now, expiring_window_days),
            formatted_amount: billing::format_price(s.amount),
            id: s.id,
            user_id: s.user_id,
            product_id: s.product_id,
            product,
            status: s.status,
            billing_cycle: s.billing_cycle,
            amount: s.amount,
            payment_method: s.payment_method,
            start_date: s.start_date,
            end_date: s.end_date,
            next_billing: s.next_billing,
            trial_ends_at: s.trial_ends_at,
            cancelled_at: s.cancelled_at,
            cancel_reason: s.cancel_reason,
            failure_reason: s.failure_reason,
            last_payment_date: s.last_payment_date,
            next_payment_date: s.next_payment_date,
            auto_renew: s.auto_renew,
            metadata: s.metadata,
            created_at: s.created_at.unwrap_or(now),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanChangeResponse {
    pub kind: PlanChangeKind,
    pub subscription: SubscriptionResponse,
}
