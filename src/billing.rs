//! Billing-period arithmetic and the status derivations built on it.
//!
//! Every function takes `now` explicitly so the services decide the clock and
//! the rules stay testable. Intervals are fixed day counts: a monthly period is
//! 30 days and a yearly one 365 days, regardless of calendar month lengths.

use crate::entities::{BillingCycle, SubscriptionStatus};
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_EXPIRING_WINDOW_DAYS: i64 = 7;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

impl BillingCycle {
    pub fn interval_days(&self) -> i64 {
        match self {
            BillingCycle::Monthly => 30,
            BillingCycle::Yearly => 365,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::days(self.interval_days())
    }

    /// Interval name used in checkout payloads ("month" / "year").
    pub fn unit(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "month",
            BillingCycle::Yearly => "year",
        }
    }
}

/// Dates of a freshly opened billing period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub next_billing: DateTime<Utc>,
    pub trial_ends_at: Option<DateTime<Utc>>,
}

pub fn next_billing_from(start: DateTime<Utc>, cycle: BillingCycle) -> DateTime<Utc> {
    start + cycle.interval()
}

pub fn open_period(now: DateTime<Utc>, cycle: BillingCycle, trial_days: i32) -> BillingPeriod {
    let end = next_billing_from(now, cycle);
    BillingPeriod {
        start: now,
        end,
        next_billing: end,
        trial_ends_at: (trial_days > 0).then(|| now + Duration::days(i64::from(trial_days))),
    }
}

/// Status a subscription enters once it is paid for (or needs no payment yet).
pub fn initial_status(trial_days: i32) -> SubscriptionStatus {
    if trial_days > 0 {
        SubscriptionStatus::Trial
    } else {
        SubscriptionStatus::Active
    }
}

/// End of the period after a single renewal.
pub fn extend(end: DateTime<Utc>, cycle: BillingCycle) -> DateTime<Utc> {
    end + cycle.interval()
}

/// Advance `end` by whole intervals until it lies strictly after `now`.
/// Returns the new end and the number of periods covered (at least one).
pub fn roll_forward(
    end: DateTime<Utc>,
    cycle: BillingCycle,
    now: DateTime<Utc>,
) -> (DateTime<Utc>, u32) {
    let mut new_end = extend(end, cycle);
    let mut periods = 1u32;
    while new_end <= now {
        new_end = extend(new_end, cycle);
        periods += 1;
    }
    (new_end, periods)
}

pub fn is_active_at(status: SubscriptionStatus, end: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    status == SubscriptionStatus::Active && now < end
}

pub fn is_in_trial_at(
    status: SubscriptionStatus,
    trial_ends_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    status == SubscriptionStatus::Trial && trial_ends_at.is_some_and(|t| now < t)
}

/// Whole days left in the period, rounded up; never negative.
pub fn days_remaining_at(end: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let diff = (end - now).num_milliseconds();
    if diff <= 0 {
        0
    } else {
        (diff + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY
    }
}

pub fn is_expiring_soon_at(end: DateTime<Utc>, now: DateTime<Utc>, days: i64) -> bool {
    end > now && end <= now + Duration::days(days)
}

/// Yearly cost of a subscription billed `amount` cents per `cycle`.
pub fn annualized(amount: i64, cycle: BillingCycle) -> i64 {
    match cycle {
        BillingCycle::Monthly => amount * 12,
        BillingCycle::Yearly => amount,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanChangeKind {
    Upgrade,
    Downgrade,
    Lateral,
}

pub fn classify_change(
    old_amount: i64,
    old_cycle: BillingCycle,
    new_amount: i64,
    new_cycle: BillingCycle,
) -> PlanChangeKind {
    let old = annualized(old_amount, old_cycle);
    let new = annualized(new_amount, new_cycle);
    match new.cmp(&old) {
        std::cmp::Ordering::Greater => PlanChangeKind::Upgrade,
        std::cmp::Ordering::Less => PlanChangeKind::Downgrade,
        std::cmp::Ordering::Equal => PlanChangeKind::Lateral,
    }
}

pub fn price_for(cycle: BillingCycle, monthly: i64, yearly: i64) -> i64 {
    match cycle {
        BillingCycle::Monthly => monthly,
        BillingCycle::Yearly => yearly,
    }
}

/// Prices must be non-negative and a year must cost less than twelve months.
pub fn validate_pricing(monthly: i64, yearly: i64) -> AppResult<()> {
    if monthly < 0 || yearly < 0 {
        return Err(AppError::ValidationError(
            "Prices must not be negative".to_string(),
        ));
    }
    if yearly >= monthly * 12 {
        return Err(AppError::ValidationError(
            "Yearly price should be less than 12 times monthly price".to_string(),
        ));
    }
    Ok(())
}

/// Percentage saved by paying yearly, rounded half away from zero.
pub fn yearly_savings_percent(monthly: i64, yearly: i64) -> i64 {
    let monthly_total = monthly * 12;
    if monthly_total <= 0 {
        return 0;
    }
    let savings = (monthly_total - yearly) as f64;
    (savings / monthly_total as f64 * 100.0).round() as i64
}

pub fn format_price(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.abs();
    format!("{sign}${}.{:02}", abs / 100, abs % 100)
}
