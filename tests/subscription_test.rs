mod common;

use chrono::{Duration, Utc};
use common::setup;
use subshop_backend::AppError;
use subshop_backend::billing::PlanChangeKind;
use subshop_backend::entities::{BillingCycle, PaymentMethod, SubscriptionStatus};
use subshop_backend::models::*;

#[tokio::test]
async fn test_create_opens_a_billing_period() {
    let app = setup().await;
    let admin = app.admin().await;
    let user = app.user("sub@example.com").await;
    let product = app.product(admin.id, "Wiki", 1500, 15000, 0).await;

    let sub = app.subscribe(user.id, product.id, BillingCycle::Monthly).await;
    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert_eq!(sub.amount, 1500);
    assert_eq!(sub.formatted_amount, "$15.00");
    assert_eq!(sub.end_date - sub.start_date, Duration::days(30));
    assert_eq!(sub.next_billing, Some(sub.end_date));
    assert_eq!(sub.next_payment_date, Some(sub.end_date));
    assert_eq!(sub.trial_ends_at, None);
    assert!(sub.auto_renew);
    assert!(sub.is_active);
    assert_eq!(sub.days_remaining, 30);
    assert_eq!(sub.product.as_ref().map(|p| p.name.as_str()), Some("Wiki"));

    let dup = app
        .subscriptions
        .create_from_product(
            user.id,
            CreateSubscriptionRequest {
                product_id: product.id,
                billing_cycle: BillingCycle::Yearly,
                payment_method: PaymentMethod::Esewa,
            },
        )
        .await;
    assert!(matches!(dup, Err(AppError::Conflict(_))));

    let yearly = app.subscribe(admin.id, product.id, BillingCycle::Yearly).await;
    assert_eq!(yearly.amount, 15000);
    assert_eq!(yearly.end_date - yearly.start_date, Duration::days(365));
}

#[tokio::test]
async fn test_create_rejects_unavailable_products_and_unknown_users() {
    let app = setup().await;
    let admin = app.admin().await;
    let user = app.user("sub@example.com").await;
    let product = app.product(admin.id, "Wiki", 1500, 15000, 0).await;

    app.products
        .update_product(
            admin.id,
            product.id,
            UpdateProductRequest {
                availability: Some(subshop_backend::entities::Availability::Discontinued),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let res = app
        .subscriptions
        .create_from_product(
            user.id,
            CreateSubscriptionRequest {
                product_id: product.id,
                billing_cycle: BillingCycle::Monthly,
                payment_method: PaymentMethod::Card,
            },
        )
        .await;
    assert!(matches!(res, Err(AppError::ValidationError(_))));

    let other = app.product(admin.id, "Board", 900, 9000, 0).await;
    let res = app
        .subscriptions
        .create_from_product(
            424242,
            CreateSubscriptionRequest {
                product_id: other.id,
                billing_cycle: BillingCycle::Monthly,
                payment_method: PaymentMethod::Card,
            },
        )
        .await;
    assert!(matches!(res, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_trial_products_start_in_trial() {
    let app = setup().await;
    let admin = app.admin().await;
    let user = app.user("trial@example.com").await;
    let product = app.product(admin.id, "Sheets", 1000, 10000, 14).await;

    let sub = app.subscribe(user.id, product.id, BillingCycle::Monthly).await;
    assert_eq!(sub.status, SubscriptionStatus::Trial);
    assert!(sub.is_in_trial);
    assert!(!sub.is_active);
    assert_eq!(sub.trial_ends_at, Some(sub.start_date + Duration::days(14)));
    assert_eq!(sub.end_date, sub.start_date + Duration::days(30));
    assert_eq!(sub.last_payment_date, None);

    // the trial counts as live
    let live = app.subscriptions.find_active_by_user(user.id).await.unwrap();
    assert_eq!(live.len(), 1);

    let trial_end = sub.trial_ends_at.unwrap();
    assert_eq!(
        app.subscriptions
            .convert_ended_trials(trial_end - Duration::seconds(1))
            .await
            .unwrap(),
        0
    );
    assert_eq!(
        app.subscriptions
            .convert_ended_trials(trial_end + Duration::seconds(1))
            .await
            .unwrap(),
        1
    );
    let sub = app.subscriptions.get_subscription(sub.id).await.unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Active);
}

#[tokio::test]
async fn test_cancel_then_resubscribe() {
    let app = setup().await;
    let admin = app.admin().await;
    let user = app.user("cancel@example.com").await;
    let product = app.product(admin.id, "Wiki", 1500, 15000, 0).await;
    let sub = app.subscribe(user.id, product.id, BillingCycle::Monthly).await;

    let cancelled = app
        .subscriptions
        .cancel(sub.id, Some("  Too expensive ".to_string()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);
    assert_eq!(cancelled.cancel_reason.as_deref(), Some("Too expensive"));
    assert!(cancelled.cancelled_at.is_some());
    assert!(!cancelled.auto_renew);
    assert!(!cancelled.is_active);

    assert!(matches!(
        app.subscriptions.cancel(sub.id, None).await,
        Err(AppError::ValidationError(_))
    ));
    assert!(matches!(
        app.subscriptions.renew(sub.id).await,
        Err(AppError::ValidationError(_))
    ));

    let again = app.subscribe(user.id, product.id, BillingCycle::Monthly).await;
    assert_ne!(again.id, sub.id);
    let mine = app.subscriptions.list_user_subscriptions(user.id).await.unwrap();
    assert_eq!(mine.len(), 2);
    assert_eq!(mine[0].id, again.id);
}

#[tokio::test]
async fn test_renew_extends_by_one_interval() {
    let app = setup().await;
    let admin = app.admin().await;
    let user = app.user("renew@example.com").await;
    let product = app.product(admin.id, "Wiki", 1500, 15000, 0).await;
    let sub = app.subscribe(user.id, product.id, BillingCycle::Yearly).await;

    let renewed = app.subscriptions.renew(sub.id).await.unwrap();
    assert_eq!(renewed.end_date, sub.end_date + Duration::days(365));
    assert_eq!(renewed.next_billing, Some(renewed.end_date));
    assert_eq!(renewed.next_payment_date, Some(renewed.end_date));
    assert!(renewed.last_payment_date.is_some());
    assert_eq!(renewed.start_date, sub.start_date);
}

#[tokio::test]
async fn test_change_plan_classifies_by_annual_cost() {
    let app = setup().await;
    let admin = app.admin().await;
    let user = app.user("plan@example.com").await;
    let basic = app.product(admin.id, "Basic", 1000, 10000, 0).await;
    let pro = app.product(admin.id, "Pro", 3000, 30000, 0).await;
    let sub = app.subscribe(user.id, basic.id, BillingCycle::Monthly).await;

    // 10000/yr < 12 * 1000
    let yearly = app
        .subscriptions
        .change_plan(
            sub.id,
            ChangePlanRequest {
                billing_cycle: Some(BillingCycle::Yearly),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(yearly.kind, PlanChangeKind::Downgrade);
    assert_eq!(yearly.subscription.amount, 10000);
    assert_eq!(
        yearly.subscription.end_date - yearly.subscription.start_date,
        Duration::days(365)
    );
    assert_eq!(yearly.subscription.metadata["previous_plan"]["amount"], 1000);

    let upgraded = app
        .subscriptions
        .change_plan(
            sub.id,
            ChangePlanRequest {
                product_id: Some(pro.id),
                billing_cycle: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(upgraded.kind, PlanChangeKind::Upgrade);
    assert_eq!(upgraded.subscription.product_id, pro.id);
    assert_eq!(upgraded.subscription.amount, 30000);

    assert!(matches!(
        app.subscriptions
            .change_plan(sub.id, ChangePlanRequest::default())
            .await,
        Err(AppError::ValidationError(_))
    ));

    // cannot move onto a product that already has a live subscription
    let other = app.subscribe(user.id, basic.id, BillingCycle::Monthly).await;
    assert!(matches!(
        app.subscriptions
            .change_plan(
                other.id,
                ChangePlanRequest {
                    product_id: Some(pro.id),
                    billing_cycle: None,
                },
            )
            .await,
        Err(AppError::Conflict(_))
    ));

    app.subscriptions.cancel(other.id, None).await.unwrap();
    assert!(matches!(
        app.subscriptions
            .change_plan(
                other.id,
                ChangePlanRequest {
                    billing_cycle: Some(BillingCycle::Yearly),
                    ..Default::default()
                },
            )
            .await,
        Err(AppError::ValidationError(_))
    ));
}

#[tokio::test]
async fn test_expire_lapsed_only_without_auto_renew() {
    let app = setup().await;
    let admin = app.admin().await;
    let user = app.user("lapse@example.com").await;
    let a = app.product(admin.id, "Alpha", 1000, 10000, 0).await;
    let b = app.product(admin.id, "Beta", 1000, 10000, 0).await;
    let keep = app.subscribe(user.id, a.id, BillingCycle::Monthly).await;
    let lapse = app.subscribe(user.id, b.id, BillingCycle::Monthly).await;
    app.subscriptions.set_auto_renew(lapse.id, false).await.unwrap();

    let after_end = lapse.end_date + Duration::seconds(1);
    assert_eq!(app.subscriptions.expire_lapsed(Utc::now()).await.unwrap(), 0);
    assert_eq!(app.subscriptions.expire_lapsed(after_end).await.unwrap(), 1);

    let lapse = app.subscriptions.get_subscription(lapse.id).await.unwrap();
    assert_eq!(lapse.status, SubscriptionStatus::Expired);
    assert_eq!(lapse.next_billing, None);
    let keep = app.subscriptions.get_subscription(keep.id).await.unwrap();
    assert_eq!(keep.status, SubscriptionStatus::Active);

    assert!(matches!(
        app.subscriptions.set_auto_renew(lapse.id, true).await,
        Err(AppError::ValidationError(_))
    ));
}

#[tokio::test]
async fn test_queries() {
    let app = setup().await;
    let admin = app.admin().await;
    let alice = app.user("alice@example.com").await;
    let bob = app.user("bob@example.com").await;
    let monthly = app.product(admin.id, "Monthly Thing", 1000, 10000, 0).await;
    let yearly = app.product(admin.id, "Yearly Thing", 1000, 10000, 0).await;

    let a1 = app.subscribe(alice.id, monthly.id, BillingCycle::Monthly).await;
    app.subscribe(alice.id, yearly.id, BillingCycle::Yearly).await;
    let b1 = app.subscribe(bob.id, monthly.id, BillingCycle::Monthly).await;
    app.subscriptions.cancel(b1.id, None).await.unwrap();

    assert!(matches!(
        app.subscriptions.get_user_subscription(bob.id, a1.id).await,
        Err(AppError::NotFound(_))
    ));
    assert_eq!(
        app.subscriptions
            .get_user_subscription(alice.id, a1.id)
            .await
            .unwrap()
            .id,
        a1.id
    );

    assert_eq!(app.subscriptions.find_active_by_user(alice.id).await.unwrap().len(), 2);
    assert!(app.subscriptions.find_active_by_user(bob.id).await.unwrap().is_empty());
    assert_eq!(app.subscriptions.find_by_product(monthly.id).await.unwrap().len(), 2);

    // monthly periods end in 30 days, yearly in 365
    let soon = app.subscriptions.find_expiring(Some(31)).await.unwrap();
    assert_eq!(soon.len(), 1);
    assert_eq!(soon[0].id, a1.id);
    assert!(soon[0].is_expiring_soon == (soon[0].days_remaining <= 7));
    assert!(app.subscriptions.find_expiring(None).await.unwrap().is_empty());

    let all = app
        .subscriptions
        .list_all_subscriptions(&SubscriptionQuery::default())
        .await
        .unwrap();
    assert_eq!(all.total, 3);
    assert_eq!(all.page_size, DEFAULT_SUBSCRIPTION_PAGE_SIZE);

    let cancelled = app
        .subscriptions
        .list_all_subscriptions(&SubscriptionQuery {
            status: Some(SubscriptionStatus::Cancelled),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(cancelled.total, 1);
    assert_eq!(cancelled.items[0].id, b1.id);

    let yearly_only = app
        .subscriptions
        .list_all_subscriptions(&SubscriptionQuery {
            billing_cycle: Some(BillingCycle::Yearly),
            pagination: PaginationParams::new(Some(1), Some(1)),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(yearly_only.total, 1);
    assert_eq!(yearly_only.total_pages, 1);
}
