use crate::billing::{self, BillingPeriod};
use crate::entities::{
    SubscriptionStatus, product_entity as products, subscription_entity as subs,
    user_entity as users,
};
use crate::error::{AppError, AppResult};
use crate::models::*;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde_json::json;

#[derive(Clone)]
pub struct SubscriptionService {
    pool: DatabaseConnection,
    expiring_window_days: i64,
}

impl SubscriptionService {
    pub fn new(pool: DatabaseConnection, expiring_window_days: i64) -> Self {
        Self {
            pool,
            expiring_window_days,
        }
    }

    /// Subscribe `user_id` directly, without a checkout round trip.
    pub async fn create_from_product(
        &self,
        user_id: i64,
        req: CreateSubscriptionRequest,
    ) -> AppResult<SubscriptionResponse> {
        let now = Utc::now();
        let txn = self.pool.begin().await?;

        ensure_user(&txn, user_id).await?;
        let product = subscribable_product(&txn, req.product_id).await?;
        ensure_no_live(&txn, user_id, product.id, None).await?;

        let period = billing::open_period(now, req.billing_cycle, product.trial_days);
        let status = billing::initial_status(product.trial_days);
        let mut am = subs::ActiveModel {
            user_id: Set(user_id),
            product_id: Set(product.id),
            billing_cycle: Set(req.billing_cycle),
            amount: Set(billing::price_for(
                req.billing_cycle,
                product.price_monthly,
                product.price_yearly,
            )),
            payment_method: Set(req.payment_method),
            auto_renew: Set(true),
            metadata: Set(json!({})),
            created_at: Set(Some(now)),
            ..Default::default()
        };
        apply_period(&mut am, &period, status, now);
        let sub = am.insert(&txn).await?;
        txn.commit().await?;

        log::info!(
            "Subscription {} created for user {user_id} on product {} ({}, {})",
            sub.id,
            product.id,
            sub.billing_cycle,
            sub.status
        );
        Ok(self.respond(sub, Some(&product), now))
    }

    pub async fn get_subscription(&self, subscription_id: i64) -> AppResult<SubscriptionResponse> {
        let sub = find_subscription(&self.pool, subscription_id).await?;
        self.with_product(sub).await
    }

    /// Like `get_subscription`, but only for the owner.
    pub async fn get_user_subscription(
        &self,
        user_id: i64,
        subscription_id: i64,
    ) -> AppResult<SubscriptionResponse> {
        let sub = find_subscription(&self.pool, subscription_id).await?;
        if sub.user_id != user_id {
            return Err(AppError::NotFound("Subscription not found".to_string()));
        }
        self.with_product(sub).await
    }

    pub async fn list_user_subscriptions(&self, user_id: i64) -> AppResult<Vec<SubscriptionResponse>> {
        let now = Utc::now();
        let rows = subs::Entity::find()
            .filter(subs::Column::UserId.eq(user_id))
            .find_also_related(products::Entity)
            .order_by_desc(subs::Column::CreatedAt)
            .order_by_desc(subs::Column::Id)
            .all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(s, p)| self.respond(s, p.as_ref(), now))
            .collect())
    }

    pub async fn list_all_subscriptions(
        &self,
        query: &SubscriptionQuery,
    ) -> AppResult<PaginatedResponse<SubscriptionResponse>> {
        let now = Utc::now();
        let page = query.pagination.page();
        let page_size = query.pagination.page_size_or(DEFAULT_SUBSCRIPTION_PAGE_SIZE);

        let mut base = subs::Entity::find();
        if let Some(status) = query.status {
            base = base.filter(subs::Column::Status.eq(status));
        }
        if let Some(cycle) = query.billing_cycle {
            base = base.filter(subs::Column::BillingCycle.eq(cycle));
        }

        let total = base.clone().count(&self.pool).await?;
        let rows = base
            .find_also_related(products::Entity)
            .order_by_desc(subs::Column::CreatedAt)
            .order_by_desc(subs::Column::Id)
            .limit(page_size)
            .offset(query.pagination.offset(DEFAULT_SUBSCRIPTION_PAGE_SIZE))
            .all(&self.pool)
            .await?;

        Ok(PaginatedResponse::new(
            rows.into_iter()
                .map(|(s, p)| self.respond(s, p.as_ref(), now))
                .collect(),
            page,
            page_size,
            total,
        ))
    }

    /// Live subscriptions whose period has not ended yet.
    pub async fn find_active_by_user(&self, user_id: i64) -> AppResult<Vec<SubscriptionResponse>> {
        let now = Utc::now();
        let rows = subs::Entity::find()
            .filter(subs::Column::UserId.eq(user_id))
            .filter(subs::Column::Status.is_in(SubscriptionStatus::LIVE))
            .filter(subs::Column::EndDate.gt(now))
            .find_also_related(products::Entity)
            .order_by_asc(subs::Column::EndDate)
            .all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(s, p)| self.respond(s, p.as_ref(), now))
            .collect())
    }

    pub async fn find_by_product(&self, product_id: i64) -> AppResult<Vec<SubscriptionResponse>> {
        let now = Utc::now();
        let product = products::Entity::find_by_id(product_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;
        let rows = subs::Entity::find()
            .filter(subs::Column::ProductId.eq(product_id))
            .order_by_desc(subs::Column::CreatedAt)
            .order_by_desc(subs::Column::Id)
            .all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|s| self.respond(s, Some(&product), now))
            .collect())
    }

    /// Active subscriptions ending within `days` (the configured window by default).
    pub async fn find_expiring(&self, days: Option<i64>) -> AppResult<Vec<SubscriptionResponse>> {
        let now = Utc::now();
        let days = days.unwrap_or(self.expiring_window_days);
        if days < 0 {
            return Err(AppError::ValidationError(
                "Days must not be negative".to_string(),
            ));
        }
        let rows = subs::Entity::find()
            .filter(subs::Column::Status.eq(SubscriptionStatus::Active))
            .filter(subs::Column::EndDate.gt(now))
            .filter(subs::Column::EndDate.lte(now + Duration::days(days)))
            .find_also_related(products::Entity)
            .order_by_asc(subs::Column::EndDate)
            .all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(s, p)| self.respond(s, p.as_ref(), now))
            .collect())
    }

    pub async fn cancel(
        &self,
        subscription_id: i64,
        reason: Option<String>,
    ) -> AppResult<SubscriptionResponse> {
        let now = Utc::now();
        let sub = find_subscription(&self.pool, subscription_id).await?;
        if matches!(
            sub.status,
            SubscriptionStatus::Cancelled | SubscriptionStatus::Expired
        ) {
            return Err(AppError::ValidationError(format!(
                "Cannot cancel a subscription that is {}",
                sub.status
            )));
        }

        let mut am = sub.into_active_model();
        am.status = Set(SubscriptionStatus::Cancelled);
        am.cancelled_at = Set(Some(now));
        am.cancel_reason = Set(reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty()));
        am.auto_renew = Set(false);
        am.updated_at = Set(Some(now));
        let sub = am.update(&self.pool).await?;

        log::info!("Subscription {subscription_id} cancelled");
        self.with_product(sub).await
    }

    /// Extend an active subscription by one billing interval.
    pub async fn renew(&self, subscription_id: i64) -> AppResult<SubscriptionResponse> {
        let now = Utc::now();
        let sub = find_subscription(&self.pool, subscription_id).await?;
        if sub.status != SubscriptionStatus::Active {
            return Err(AppError::ValidationError(
                "Only active subscriptions can be renewed".to_string(),
            ));
        }

        let new_end = billing::extend(sub.end_date, sub.billing_cycle);
        let mut am = sub.into_active_model();
        am.end_date = Set(new_end);
        am.next_billing = Set(Some(new_end));
        am.next_payment_date = Set(Some(new_end));
        am.last_payment_date = Set(Some(now));
        am.updated_at = Set(Some(now));
        let sub = am.update(&self.pool).await?;

        log::info!("Subscription {subscription_id} renewed until {new_end}");
        self.with_product(sub).await
    }

    /// Move a live subscription to another product and/or billing cycle.
    /// The period restarts now and the amount follows the new price.
    pub async fn change_plan(
        &self,
        subscription_id: i64,
        req: ChangePlanRequest,
    ) -> AppResult<PlanChangeResponse> {
        let now = Utc::now();
        let txn = self.pool.begin().await?;

        let sub = find_subscription(&txn, subscription_id).await?;
        if !sub.status.is_live() {
            return Err(AppError::ValidationError(
                "Only active or trial subscriptions can change plan".to_string(),
            ));
        }
        let target_product_id = req.product_id.unwrap_or(sub.product_id);
        let target_cycle = req.billing_cycle.unwrap_or(sub.billing_cycle);
        if target_product_id == sub.product_id && target_cycle == sub.billing_cycle {
            return Err(AppError::ValidationError(
                "Subscription is already on this plan".to_string(),
            ));
        }

        let product = subscribable_product(&txn, target_product_id).await?;
        if target_product_id != sub.product_id {
            ensure_no_live(&txn, sub.user_id, target_product_id, Some(sub.id)).await?;
        }

        let new_amount =
            billing::price_for(target_cycle, product.price_monthly, product.price_yearly);
        let kind = billing::classify_change(sub.amount, sub.billing_cycle, new_amount, target_cycle);

        let mut metadata = match sub.metadata.clone() {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        metadata.insert(
            "previous_plan".to_string(),
            json!({
                "product_id": sub.product_id,
                "billing_cycle": sub.billing_cycle,
                "amount": sub.amount,
                "changed_at": now,
            }),
        );

        let period = billing::open_period(now, target_cycle, 0);
        let status = sub.status;
        let mut am = sub.into_active_model();
        am.product_id = Set(target_product_id);
        am.billing_cycle = Set(target_cycle);
        am.amount = Set(new_amount);
        am.start_date = Set(period.start);
        am.end_date = Set(period.end);
        am.next_billing = Set(Some(period.next_billing));
        am.next_payment_date = Set(Some(period.next_billing));
        am.metadata = Set(serde_json::Value::Object(metadata));
        am.updated_at = Set(Some(now));
        if status == SubscriptionStatus::Trial {
            // a plan change ends the trial
            am.status = Set(SubscriptionStatus::Active);
            am.trial_ends_at = Set(None);
        }
        let sub = am.update(&txn).await?;
        txn.commit().await?;

        log::info!(
            "Subscription {subscription_id} changed plan ({kind:?}) to product {target_product_id} {target_cycle}"
        );
        Ok(PlanChangeResponse {
            kind,
            subscription: self.respond(sub, Some(&product), now),
        })
    }

    pub async fn set_auto_renew(
        &self,
        subscription_id: i64,
        auto_renew: bool,
    ) -> AppResult<SubscriptionResponse> {
        let sub = find_subscription(&self.pool, subscription_id).await?;
        if auto_renew && !sub.status.is_live() {
            return Err(AppError::ValidationError(
                "Auto-renew can only be enabled on active or trial subscriptions".to_string(),
            ));
        }
        let mut am = sub.into_active_model();
        am.auto_renew = Set(auto_renew);
        am.updated_at = Set(Some(Utc::now()));
        let sub = am.update(&self.pool).await?;
        log::info!("Subscription {subscription_id} auto-renew set to {auto_renew}");
        self.with_product(sub).await
    }

    /// Trials whose window closed become active, including ones whose period
    /// has already ended; renewal or expiry picks those up afterwards.
    pub async fn convert_ended_trials(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let ended = subs::Entity::find()
            .filter(subs::Column::Status.eq(SubscriptionStatus::Trial))
            .filter(
                Condition::any()
                    .add(subs::Column::TrialEndsAt.lte(now))
                    .add(subs::Column::TrialEndsAt.is_null()),
            )
            .all(&self.pool)
            .await?;

        let mut converted = 0u64;
        for sub in ended {
            let id = sub.id;
            let mut am = sub.into_active_model();
            am.status = Set(SubscriptionStatus::Active);
            am.updated_at = Set(Some(now));
            am.update(&self.pool).await?;
            log::info!("Subscription {id} trial ended, now active");
            converted += 1;
        }
        Ok(converted)
    }

    /// Live subscriptions past their end that will not renew are expired.
    pub async fn expire_lapsed(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let lapsed = subs::Entity::find()
            .filter(subs::Column::Status.is_in(SubscriptionStatus::LIVE))
            .filter(subs::Column::EndDate.lte(now))
            .filter(subs::Column::AutoRenew.eq(false))
            .all(&self.pool)
            .await?;

        let mut expired = 0u64;
        for sub in lapsed {
            let id = sub.id;
            let mut am = sub.into_active_model();
            am.status = Set(SubscriptionStatus::Expired);
            am.next_billing = Set(None);
            am.next_payment_date = Set(None);
            am.updated_at = Set(Some(now));
            am.update(&self.pool).await?;
            log::info!("Subscription {id} expired");
            expired += 1;
        }
        Ok(expired)
    }

    async fn with_product(&self, sub: subs::Model) -> AppResult<SubscriptionResponse> {
        let product = products::Entity::find_by_id(sub.product_id)
            .one(&self.pool)
            .await?;
        Ok(self.respond(sub, product.as_ref(), Utc::now()))
    }

    fn respond(
        &self,
        sub: subs::Model,
        product: Option<&products::Model>,
        now: DateTime<Utc>,
    ) -> SubscriptionResponse {
        SubscriptionResponse::build(
            sub,
            product.map(ProductSummary::from),
            now,
            self.expiring_window_days,
        )
    }
}

/// Write a freshly opened period onto `am` and clear any earlier cancellation or failure.
pub(crate) fn apply_period(
    am: &mut subs::ActiveModel,
    period: &BillingPeriod,
    status: SubscriptionStatus,
    now: DateTime<Utc>,
) {
    am.status = Set(status);
    am.start_date = Set(period.start);
    am.end_date = Set(period.end);
    am.next_billing = Set(Some(period.next_billing));
    am.next_payment_date = Set(Some(period.next_billing));
    am.trial_ends_at = Set(period.trial_ends_at);
    am.cancelled_at = Set(None);
    am.cancel_reason = Set(None);
    am.failure_reason = Set(None);
    am.last_payment_date = Set((status == SubscriptionStatus::Active).then_some(now));
    am.updated_at = Set(Some(now));
}

pub(crate) async fn find_subscription<C: ConnectionTrait>(
    db: &C,
    subscription_id: i64,
) -> AppResult<subs::Model> {
    subs::Entity::find_by_id(subscription_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))
}

pub(crate) async fn ensure_user<C: ConnectionTrait>(db: &C, user_id: i64) -> AppResult<users::Model> {
    users::Entity::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

pub(crate) async fn subscribable_product<C: ConnectionTrait>(
    db: &C,
    product_id: i64,
) -> AppResult<products::Model> {
    let product = products::Entity::find_by_id(product_id)
        .one(db)
        .await?
        .filter(|p| p.is_active)
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;
    if !product.can_subscribe() {
        return Err(AppError::ValidationError(
            "Product is not available for subscription".to_string(),
        ));
    }
    Ok(product)
}

/// At most one active or trial subscription per (user, product).
pub(crate) async fn ensure_no_live<C: ConnectionTrait>(
    db: &C,
    user_id: i64,
    product_id: i64,
    except: Option<i64>,
) -> AppResult<()> {
    let mut q = subs::Entity::find()
        .filter(subs::Column::UserId.eq(user_id))
        .filter(subs::Column::ProductId.eq(product_id))
        .filter(subs::Column::Status.is_in(SubscriptionStatus::LIVE));
    if let Some(id) = except {
        q = q.filter(subs::Column::Id.ne(id));
    }
    if q.count(db).await? > 0 {
        return Err(AppError::Conflict(
            "Already subscribed to this product".to_string(),
        ));
    }
    Ok(())
}
