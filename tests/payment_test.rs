mod common;

use chrono::Duration;
use common::setup;
use subshop_backend::AppError;
use subshop_backend::entities::{BillingCycle, PaymentMethod, PaymentStatus, SubscriptionStatus};
use subshop_backend::models::*;
use subshop_backend::tasks::run_lifecycle_sweep;

fn checkout(product_id: i64, method: PaymentMethod) -> CheckoutRequest {
    CheckoutRequest {
        product_id,
        billing_cycle: BillingCycle::Monthly,
        payment_method: method,
    }
}

#[tokio::test]
async fn test_checkout_then_confirm_activates() {
    let app = setup().await;
    let admin = app.admin().await;
    let user = app.user("buyer@example.com").await;
    let product = app.product(admin.id, "Wiki", 1500, 15000, 0).await;

    let started = app
        .payments
        .start_checkout(user.id, checkout(product.id, PaymentMethod::Esewa))
        .await
        .unwrap();
    assert_eq!(started.amount, 1500);
    assert_eq!(started.currency, "USD");
    assert!(started.external_ref.starts_with("esewa_"));
    assert!(started.redirect_url.ends_with(&format!("?ref={}", started.external_ref)));

    let pending = app
        .subscriptions
        .get_subscription(started.subscription_id)
        .await
        .unwrap();
    assert_eq!(pending.status, SubscriptionStatus::Pending);
    assert!(!pending.is_active);
    // pending subscriptions do not count as live
    assert!(app.subscriptions.find_active_by_user(user.id).await.unwrap().is_empty());

    let confirmed = app
        .payments
        .confirm_checkout(
            user.id,
            ConfirmCheckoutRequest {
                external_ref: started.external_ref.clone(),
            },
        )
        .await
        .unwrap();
    assert_eq!(confirmed.payment.status, PaymentStatus::Paid);
    assert_eq!(confirmed.subscription.status, SubscriptionStatus::Active);
    assert!(confirmed.subscription.last_payment_date.is_some());
    assert_eq!(
        confirmed.subscription.end_date - confirmed.subscription.start_date,
        Duration::days(30)
    );

    // confirming twice changes nothing
    let again = app
        .payments
        .confirm_checkout(
            user.id,
            ConfirmCheckoutRequest {
                external_ref: started.external_ref.clone(),
            },
        )
        .await
        .unwrap();
    assert_eq!(again.subscription.end_date, confirmed.subscription.end_date);
    assert_eq!(app.payments.payment_history(user.id).await.unwrap().len(), 1);

    let blocked = app
        .payments
        .start_checkout(user.id, checkout(product.id, PaymentMethod::Card))
        .await;
    assert!(matches!(blocked, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn test_checkout_with_trial_product() {
    let app = setup().await;
    let admin = app.admin().await;
    let user = app.user("trialbuyer@example.com").await;
    let product = app.product(admin.id, "Sheets", 1000, 10000, 7).await;

    let started = app
        .payments
        .start_checkout(user.id, checkout(product.id, PaymentMethod::Stripe))
        .await
        .unwrap();
    let confirmed = app
        .payments
        .confirm_checkout(
            user.id,
            ConfirmCheckoutRequest {
                external_ref: started.external_ref,
            },
        )
        .await
        .unwrap();
    let sub = confirmed.subscription;
    assert_eq!(sub.status, SubscriptionStatus::Trial);
    assert_eq!(sub.trial_ends_at, Some(sub.start_date + Duration::days(7)));
}

#[tokio::test]
async fn test_failed_payment_keeps_subscription_pending() {
    let app = setup().await;
    let admin = app.admin().await;
    let user = app.user("declined@example.com").await;
    let product = app.product(admin.id, "Wiki", 1500, 15000, 0).await;

    let started = app
        .payments
        .start_checkout(user.id, checkout(product.id, PaymentMethod::Khalti))
        .await
        .unwrap();
    app.khalti.mark_failing(&started.external_ref).await;

    let result = app
        .payments
        .confirm_checkout(
            user.id,
            ConfirmCheckoutRequest {
                external_ref: started.external_ref.clone(),
            },
        )
        .await
        .unwrap();
    assert_eq!(result.payment.status, PaymentStatus::Failed);
    assert!(result.payment.failure_reason.is_some());
    assert_eq!(result.subscription.status, SubscriptionStatus::Pending);
    assert!(result.subscription.failure_reason.is_some());

    assert!(matches!(
        app.payments
            .confirm_checkout(
                user.id,
                ConfirmCheckoutRequest {
                    external_ref: started.external_ref,
                },
            )
            .await,
        Err(AppError::ValidationError(_))
    ));

    // a retry reuses the pending subscription
    let retry = app
        .payments
        .start_checkout(
            user.id,
            CheckoutRequest {
                product_id: product.id,
                billing_cycle: BillingCycle::Yearly,
                payment_method: PaymentMethod::Imepay,
            },
        )
        .await
        .unwrap();
    assert_eq!(retry.subscription_id, started.subscription_id);
    assert_eq!(retry.amount, 15000);
    let sub = app
        .subscriptions
        .get_subscription(retry.subscription_id)
        .await
        .unwrap();
    assert_eq!(sub.failure_reason, None);
    assert_eq!(sub.payment_method, PaymentMethod::Imepay);
}

#[tokio::test]
async fn test_confirm_checks_ownership() {
    let app = setup().await;
    let admin = app.admin().await;
    let owner = app.user("owner@example.com").await;
    let other = app.user("other@example.com").await;
    let product = app.product(admin.id, "Wiki", 1500, 15000, 0).await;

    let started = app
        .payments
        .start_checkout(owner.id, checkout(product.id, PaymentMethod::Card))
        .await
        .unwrap();
    assert!(matches!(
        app.payments
            .confirm_checkout(
                other.id,
                ConfirmCheckoutRequest {
                    external_ref: started.external_ref,
                },
            )
            .await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        app.payments
            .confirm_checkout(
                owner.id,
                ConfirmCheckoutRequest {
                    external_ref: "card_missing".to_string(),
                },
            )
            .await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_collect_renewals_charges_missed_periods() {
    let app = setup().await;
    let admin = app.admin().await;
    let user = app.user("renewing@example.com").await;
    let product = app.product(admin.id, "Wiki", 1500, 15000, 0).await;
    let sub = app.subscribe(user.id, product.id, BillingCycle::Monthly).await;

    // nothing is due while the period runs
    let summary = app.payments.collect_renewals(sub.end_date - Duration::days(1)).await.unwrap();
    assert_eq!(summary, RenewalSummary::default());

    let now = sub.end_date + Duration::days(61);
    let summary = app.payments.collect_renewals(now).await.unwrap();
    assert_eq!(summary.renewed, 1);
    assert_eq!(summary.failed, 0);

    let renewed = app.subscriptions.get_subscription(sub.id).await.unwrap();
    assert_eq!(renewed.status, SubscriptionStatus::Active);
    assert_eq!(renewed.end_date, sub.end_date + Duration::days(90));
    assert_eq!(renewed.next_billing, Some(renewed.end_date));
    assert_eq!(renewed.last_payment_date, Some(now));

    let history = app.payments.payment_history(user.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].amount, 3 * 1500);
    assert_eq!(history[0].status, PaymentStatus::Paid);
}

#[tokio::test]
async fn test_declined_renewal_expires_subscription() {
    let app = setup().await;
    let admin = app.admin().await;
    let user = app.user("broke@example.com").await;
    let product = app.product(admin.id, "Wiki", 1500, 15000, 0).await;
    let sub = app.subscribe(user.id, product.id, BillingCycle::Monthly).await;
    app.khalti.set_decline_charges(true);

    let report = run_lifecycle_sweep(
        &app.payments,
        &app.subscriptions,
        sub.end_date + Duration::hours(1),
    )
    .await;
    assert_eq!(report.renewals.failed, 1);
    assert_eq!(report.expired, 0);

    let expired = app.subscriptions.get_subscription(sub.id).await.unwrap();
    assert_eq!(expired.status, SubscriptionStatus::Expired);
    assert!(!expired.auto_renew);
    assert_eq!(
        expired.failure_reason.as_deref(),
        Some("Renewal charge declined")
    );

    let payments = app
        .payments
        .list_payments(&PaginationParams::default())
        .await
        .unwrap();
    assert_eq!(payments.total, 1);
    assert_eq!(payments.items[0].status, PaymentStatus::Failed);
}

#[tokio::test]
async fn test_sweep_runs_every_step() {
    let app = setup().await;
    let admin = app.admin().await;
    let user = app.user("sweep@example.com").await;
    let trial = app.product(admin.id, "Trial Thing", 1000, 10000, 3).await;
    let plain = app.product(admin.id, "Plain Thing", 1000, 10000, 0).await;

    let t = app.subscribe(user.id, trial.id, BillingCycle::Monthly).await;
    let p = app.subscribe(user.id, plain.id, BillingCycle::Monthly).await;
    app.subscriptions.set_auto_renew(p.id, false).await.unwrap();

    // trial window over, plain period still running
    let report = run_lifecycle_sweep(&app.payments, &app.subscriptions, t.start_date + Duration::days(4)).await;
    assert_eq!(report.trials_converted, 1);
    assert_eq!(report.expired, 0);

    let report = run_lifecycle_sweep(&app.payments, &app.subscriptions, p.end_date + Duration::days(1)).await;
    assert_eq!(report.expired, 1);
    assert_eq!(report.renewals.renewed, 1);

    let t = app.subscriptions.get_subscription(t.id).await.unwrap();
    assert_eq!(t.status, SubscriptionStatus::Active);
    let p = app.subscriptions.get_subscription(p.id).await.unwrap();
    assert_eq!(p.status, SubscriptionStatus::Expired);
}

#[tokio::test]
async fn test_sweep_catches_up_trial_past_its_period() {
    let app = setup().await;
    let admin = app.admin().await;
    let user = app.user("latesweep@example.com").await;
    let renewing = app.product(admin.id, "Trial Renew", 1000, 10000, 3).await;
    let lapsing = app.product(admin.id, "Trial Lapse", 1000, 10000, 3).await;

    let r = app.subscribe(user.id, renewing.id, BillingCycle::Monthly).await;
    let l = app.subscribe(user.id, lapsing.id, BillingCycle::Monthly).await;
    app.subscriptions.set_auto_renew(l.id, false).await.unwrap();

    // first sweep happens after both the trial window and the period ended
    let now = r.end_date + Duration::days(1);
    let report = run_lifecycle_sweep(&app.payments, &app.subscriptions, now).await;
    assert_eq!(report.trials_converted, 2);
    assert_eq!(report.renewals.renewed, 1);
    assert_eq!(report.expired, 1);

    let r = app.subscriptions.get_subscription(r.id).await.unwrap();
    assert_eq!(r.status, SubscriptionStatus::Active);
    assert!(r.end_date > now);
    let l = app.subscriptions.get_subscription(l.id).await.unwrap();
    assert_eq!(l.status, SubscriptionStatus::Expired);

    // the expired trial no longer blocks a new subscription
    let again = app
        .subscriptions
        .create_from_product(
            user.id,
            CreateSubscriptionRequest {
                product_id: lapsing.id,
                billing_cycle: BillingCycle::Monthly,
                payment_method: PaymentMethod::Khalti,
            },
        )
        .await;
    assert!(again.is_ok());
}

#[tokio::test]
async fn test_confirm_after_cancelled_checkout_closes_payment() {
    let app = setup().await;
    let admin = app.admin().await;
    let user = app.user("changedmind@example.com").await;
    let product = app.product(admin.id, "Wiki", 1500, 15000, 0).await;

    let started = app
        .payments
        .start_checkout(user.id, checkout(product.id, PaymentMethod::Esewa))
        .await
        .unwrap();
    app.subscriptions
        .cancel(started.subscription_id, Some("changed my mind".to_string()))
        .await
        .unwrap();

    let result = app
        .payments
        .confirm_checkout(
            user.id,
            ConfirmCheckoutRequest {
                external_ref: started.external_ref.clone(),
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::ValidationError(_))));

    let history = app.payments.payment_history(user.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, PaymentStatus::Failed);
    assert_eq!(
        history[0].failure_reason.as_deref(),
        Some("Subscription is no longer awaiting payment")
    );
}

#[tokio::test]
async fn test_confirm_when_already_subscribed_closes_payment() {
    let app = setup().await;
    let admin = app.admin().await;
    let user = app.user("twice@example.com").await;
    let product = app.product(admin.id, "Wiki", 1500, 15000, 0).await;

    let started = app
        .payments
        .start_checkout(user.id, checkout(product.id, PaymentMethod::Card))
        .await
        .unwrap();
    // a pending checkout does not block a direct subscription
    app.subscribe(user.id, product.id, BillingCycle::Monthly).await;

    let result = app
        .payments
        .confirm_checkout(
            user.id,
            ConfirmCheckoutRequest {
                external_ref: started.external_ref,
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));

    let history = app.payments.payment_history(user.id).await.unwrap();
    assert_eq!(history[0].status, PaymentStatus::Failed);
    let pending = app
        .subscriptions
        .get_subscription(started.subscription_id)
        .await
        .unwrap();
    assert_eq!(pending.status, SubscriptionStatus::Pending);
}

#[tokio::test]
async fn test_listings_tolerate_huge_page_numbers() {
    let app = setup().await;
    let admin = app.admin().await;
    let user = app.user("pager@example.com").await;
    let product = app.product(admin.id, "Wiki", 1500, 15000, 0).await;
    app.subscribe(user.id, product.id, BillingCycle::Monthly).await;

    let far = PaginationParams::new(Some(u64::MAX), None);
    let products = app
        .products
        .list_products(&ProductQuery {
            pagination: far.clone(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(products.total, 1);
    assert!(products.items.is_empty());

    let subs = app
        .subscriptions
        .list_all_subscriptions(&SubscriptionQuery {
            pagination: far.clone(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(subs.total, 1);
    assert!(subs.items.is_empty());

    let payments = app.payments.list_payments(&far).await.unwrap();
    assert!(payments.items.is_empty());
}
