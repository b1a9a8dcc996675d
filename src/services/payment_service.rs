use crate::billing;
use crate::entities::{
    PaymentStatus, SubscriptionStatus, payment_entity as payments, product_entity as products,
    subscription_entity as subs,
};
use crate::error::{AppError, AppResult};
use crate::external::{ChargeRequest, CheckoutContext, GatewayOutcome, GatewayRegistry};
use crate::models::*;
use crate::services::SubscriptionService;
use crate::services::subscription_service::{
    apply_period, ensure_no_live, ensure_user, find_subscription, subscribable_product,
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde_json::json;

#[derive(Clone)]
pub struct PaymentService {
    pool: DatabaseConnection,
    gateways: GatewayRegistry,
    subscription_service: SubscriptionService,
    currency: String,
}

impl PaymentService {
    pub fn new(
        pool: DatabaseConnection,
        gateways: GatewayRegistry,
        subscription_service: SubscriptionService,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            gateways,
            subscription_service,
            currency: currency.into(),
        }
    }

    /// Open a gateway checkout for a product. The subscription stays `pending`
    /// until the payment is confirmed.
    pub async fn start_checkout(
        &self,
        user_id: i64,
        req: CheckoutRequest,
    ) -> AppResult<CheckoutResponse> {
        let gateway = self.gateways.get(req.payment_method)?;
        let now = Utc::now();
        let txn = self.pool.begin().await?;

        ensure_user(&txn, user_id).await?;
        let product = subscribable_product(&txn, req.product_id).await?;
        ensure_no_live(&txn, user_id, product.id, None).await?;

        let amount = billing::price_for(req.billing_cycle, product.price_monthly, product.price_yearly);
        let period = billing::open_period(now, req.billing_cycle, 0);

        let pending = subs::Entity::find()
            .filter(subs::Column::UserId.eq(user_id))
            .filter(subs::Column::ProductId.eq(product.id))
            .filter(subs::Column::Status.eq(SubscriptionStatus::Pending))
            .order_by_desc(subs::Column::Id)
            .one(&txn)
            .await?;

        // a retried checkout reuses the pending subscription with the new terms
        let reuse = pending.is_some();
        let mut am = match pending {
            Some(existing) => existing.into_active_model(),
            None => subs::ActiveModel {
                user_id: Set(user_id),
                product_id: Set(product.id),
                status: Set(SubscriptionStatus::Pending),
                auto_renew: Set(true),
                metadata: Set(json!({})),
                created_at: Set(Some(now)),
                ..Default::default()
            },
        };
        am.billing_cycle = Set(req.billing_cycle);
        am.amount = Set(amount);
        am.payment_method = Set(req.payment_method);
        am.start_date = Set(period.start);
        am.end_date = Set(period.end);
        am.next_billing = Set(None);
        am.next_payment_date = Set(None);
        am.trial_ends_at = Set(None);
        am.failure_reason = Set(None);
        am.updated_at = Set(Some(now));
        let sub = if reuse {
            am.update(&txn).await?
        } else {
            am.insert(&txn).await?
        };

        let session = gateway
            .initiate(&CheckoutContext {
                user_id,
                subscription_id: sub.id,
                amount,
                currency: self.currency.clone(),
                description: format!("{} ({})", product.name, req.billing_cycle),
            })
            .await?;

        let payment = payments::ActiveModel {
            user_id: Set(user_id),
            subscription_id: Set(sub.id),
            method: Set(req.payment_method),
            amount: Set(amount),
            currency: Set(self.currency.clone()),
            status: Set(PaymentStatus::Pending),
            external_ref: Set(session.external_ref.clone()),
            created_at: Set(Some(now)),
            updated_at: Set(Some(now)),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        log::info!(
            "Checkout {} started for user {user_id}, subscription {} via {}",
            payment.external_ref,
            sub.id,
            payment.method
        );
        Ok(CheckoutResponse {
            subscription_id: sub.id,
            payment_id: payment.id,
            external_ref: session.external_ref,
            redirect_url: session.redirect_url,
            amount,
            currency: self.currency.clone(),
        })
    }

    /// Settle a checkout with the gateway's verdict. Confirming a reference
    /// that is already paid returns the current state unchanged.
    pub async fn confirm_checkout(
        &self,
        user_id: i64,
        req: ConfirmCheckoutRequest,
    ) -> AppResult<ConfirmCheckoutResponse> {
        let payment = payments::Entity::find()
            .filter(payments::Column::ExternalRef.eq(req.external_ref.as_str()))
            .one(&self.pool)
            .await?
            .filter(|p| p.user_id == user_id)
            .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

        match payment.status {
            PaymentStatus::Paid => return self.confirmation(payment).await,
            PaymentStatus::Failed => {
                return Err(AppError::ValidationError(
                    "Payment has already failed; start a new checkout".to_string(),
                ));
            }
            PaymentStatus::Pending => {}
        }

        let outcome = self
            .gateways
            .get(payment.method)?
            .verify(&payment.external_ref)
            .await?;

        let now = Utc::now();
        let txn = self.pool.begin().await?;
        let sub = find_subscription(&txn, payment.subscription_id).await?;
        let blocked = if sub.status != SubscriptionStatus::Pending {
            Some(AppError::ValidationError(
                "Subscription is no longer awaiting payment".to_string(),
            ))
        } else if outcome.is_paid() {
            match ensure_no_live(&txn, sub.user_id, sub.product_id, Some(sub.id)).await {
                Ok(()) => None,
                Err(e @ AppError::Conflict(_)) => Some(e),
                Err(e) => return Err(e),
            }
        } else {
            None
        };
        if let Some(err) = blocked {
            // the payment can never activate anything, so it is closed as failed
            let mut am = payment.into_active_model();
            am.status = Set(PaymentStatus::Failed);
            am.failure_reason = Set(Some(err.public_message()));
            am.updated_at = Set(Some(now));
            let payment = am.update(&txn).await?;
            txn.commit().await?;
            log::warn!("Payment {} closed without activation: {err}", payment.external_ref);
            return Err(err);
        }

        let payment = if outcome.is_paid() {
            let trial_days = products::Entity::find_by_id(sub.product_id)
                .one(&txn)
                .await?
                .map(|p| p.trial_days)
                .unwrap_or(0);
            let period = billing::open_period(now, sub.billing_cycle, trial_days);
            let sub_id = sub.id;
            let mut am = sub.into_active_model();
            apply_period(&mut am, &period, billing::initial_status(trial_days), now);
            am.last_payment_date = Set(Some(now));
            am.update(&txn).await?;

            let payment = settle(payment, &outcome, now).update(&txn).await?;
            log::info!("Payment {} paid, subscription {sub_id} activated", payment.external_ref);
            payment
        } else {
            let reason = outcome
                .failure_reason
                .clone()
                .unwrap_or_else(|| "Payment failed".to_string());
            let mut am = sub.into_active_model();
            am.failure_reason = Set(Some(reason));
            am.updated_at = Set(Some(now));
            am.update(&txn).await?;

            let payment = settle(payment, &outcome, now).update(&txn).await?;
            log::warn!("Payment {} failed", payment.external_ref);
            payment
        };
        txn.commit().await?;

        self.confirmation(payment).await
    }

    /// Charge auto-renewing subscriptions whose period has ended. Every missed
    /// period is charged in one go; a declined charge expires the subscription.
    pub async fn collect_renewals(&self, now: DateTime<Utc>) -> AppResult<RenewalSummary> {
        let due = subs::Entity::find()
            .filter(subs::Column::Status.eq(SubscriptionStatus::Active))
            .filter(subs::Column::AutoRenew.eq(true))
            .filter(subs::Column::EndDate.lte(now))
            .order_by_asc(subs::Column::EndDate)
            .all(&self.pool)
            .await?;

        let mut summary = RenewalSummary::default();
        for sub in due {
            let id = sub.id;
            match self.renew_one(sub, now).await {
                Ok(true) => summary.renewed += 1,
                Ok(false) => summary.failed += 1,
                Err(e) => log::error!("Failed to collect renewal for subscription {id}: {e}"),
            }
        }
        Ok(summary)
    }

    pub async fn payment_history(&self, user_id: i64) -> AppResult<Vec<PaymentResponse>> {
        let list = payments::Entity::find()
            .filter(payments::Column::UserId.eq(user_id))
            .order_by_desc(payments::Column::CreatedAt)
            .order_by_desc(payments::Column::Id)
            .all(&self.pool)
            .await?;
        Ok(list.into_iter().map(Into::into).collect())
    }

    pub async fn list_payments(
        &self,
        params: &PaginationParams,
    ) -> AppResult<PaginatedResponse<PaymentResponse>> {
        let page = params.page();
        let page_size = params.page_size_or(DEFAULT_PAYMENT_PAGE_SIZE);
        let base = payments::Entity::find();

        let total = base.clone().count(&self.pool).await?;
        let list = base
            .order_by_desc(payments::Column::CreatedAt)
            .order_by_desc(payments::Column::Id)
            .limit(page_size)
            .offset(params.offset(DEFAULT_PAYMENT_PAGE_SIZE))
            .all(&self.pool)
            .await?;

        Ok(PaginatedResponse::new(
            list.into_iter().map(Into::into).collect(),
            page,
            page_size,
            total,
        ))
    }

    /// Returns whether the charge went through.
    async fn renew_one(&self, sub: subs::Model, now: DateTime<Utc>) -> AppResult<bool> {
        let (new_end, periods) = billing::roll_forward(sub.end_date, sub.billing_cycle, now);
        let amount = sub.amount * i64::from(periods);
        let outcome = self
            .gateways
            .get(sub.payment_method)?
            .charge(&ChargeRequest {
                user_id: sub.user_id,
                subscription_id: sub.id,
                amount,
                currency: self.currency.clone(),
            })
            .await?;

        let txn = self.pool.begin().await?;
        payments::ActiveModel {
            user_id: Set(sub.user_id),
            subscription_id: Set(sub.id),
            method: Set(sub.payment_method),
            amount: Set(amount),
            currency: Set(self.currency.clone()),
            status: Set(outcome.status),
            external_ref: Set(outcome.external_ref.clone()),
            failure_reason: Set(outcome.failure_reason.clone()),
            created_at: Set(Some(now)),
            updated_at: Set(Some(now)),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let id = sub.id;
        let paid = outcome.is_paid();
        let mut am = sub.into_active_model();
        if paid {
            am.end_date = Set(new_end);
            am.next_billing = Set(Some(new_end));
            am.next_payment_date = Set(Some(new_end));
            am.last_payment_date = Set(Some(now));
            am.failure_reason = Set(None);
        } else {
            am.status = Set(SubscriptionStatus::Expired);
            am.auto_renew = Set(false);
            am.next_billing = Set(None);
            am.next_payment_date = Set(None);
            am.failure_reason = Set(Some(
                outcome
                    .failure_reason
                    .unwrap_or_else(|| "Renewal charge failed".to_string()),
            ));
        }
        am.updated_at = Set(Some(now));
        am.update(&txn).await?;
        txn.commit().await?;

        if paid {
            log::info!("Subscription {id} renewed for {periods} period(s) until {new_end}");
        } else {
            log::warn!("Subscription {id} expired after a declined renewal charge");
        }
        Ok(paid)
    }

    async fn confirmation(&self, payment: payments::Model) -> AppResult<ConfirmCheckoutResponse> {
        let subscription = self
            .subscription_service
            .get_subscription(payment.subscription_id)
            .await?;
        Ok(ConfirmCheckoutResponse {
            payment: PaymentResponse::from(payment),
            subscription,
        })
    }
}

fn settle(
    payment: payments::Model,
    outcome: &GatewayOutcome,
    now: DateTime<Utc>,
) -> payments::ActiveModel {
    let mut am = payment.into_active_model();
    am.status = Set(outcome.status);
    am.failure_reason = Set(outcome.failure_reason.clone());
    am.updated_at = Set(Some(now));
    am
}
