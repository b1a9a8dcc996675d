//! Background scheduled tasks for the application.
//!
//! The lifecycle sweep turns ended trials into active subscriptions, collects
//! due renewals and expires lapsed ones. Call `spawn_all` once during startup.

use crate::models::RenewalSummary;
use crate::services::{PaymentService, SubscriptionService};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub renewals: RenewalSummary,
    pub trials_converted: u64,
    pub expired: u64,
}

/// One pass of the lifecycle sweep. Each step runs even if an earlier one failed.
pub async fn run_lifecycle_sweep(
    payment_service: &PaymentService,
    subscription_service: &SubscriptionService,
    now: DateTime<Utc>,
) -> SweepReport {
    let mut report = SweepReport::default();

    // trials first, so a trial whose period already ended is renewed or expired in this pass
    match subscription_service.convert_ended_trials(now).await {
        Ok(n) => report.trials_converted = n,
        Err(e) => log::error!("Failed to convert ended trials: {e:?}"),
    }
    match payment_service.collect_renewals(now).await {
        Ok(summary) => report.renewals = summary,
        Err(e) => log::error!("Failed to collect renewals: {e:?}"),
    }
    match subscription_service.expire_lapsed(now).await {
        Ok(n) => report.expired = n,
        Err(e) => log::error!("Failed to expire lapsed subscriptions: {e:?}"),
    }

    report
}

/// Spawn all background tasks.
///
/// Detaches the sweep loop via `tokio::spawn`; it does not block.
pub fn spawn_all(
    payment_service: PaymentService,
    subscription_service: SubscriptionService,
    sweep_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let report = run_lifecycle_sweep(&payment_service, &subscription_service, Utc::now()).await;
            if report != SweepReport::default() {
                log::info!(
                    "Lifecycle sweep: renewed {}, renewal failures {}, trials converted {}, expired {}",
                    report.renewals.renewed,
                    report.renewals.failed,
                    report.trials_converted,
                    report.expired
                );
            }
            tokio::time::sleep(sweep_interval).await;
        }
    })
}
