use crate::config::PaymentsConfig;
use crate::entities::{PaymentMethod, PaymentStatus};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

/// What a gateway needs to open a hosted checkout.
#[derive(Debug, Clone)]
pub struct CheckoutContext {
    pub user_id: i64,
    pub subscription_id: i64,
    pub amount: i64,
    pub currency: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySession {
    pub external_ref: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOutcome {
    pub external_ref: String,
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,
}

impl GatewayOutcome {
    pub fn is_paid(&self) -> bool {
        self.status == PaymentStatus::Paid
    }
}

/// Off-session charge for a renewal.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub user_id: i64,
    pub subscription_id: i64,
    pub amount: i64,
    pub currency: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn method(&self) -> PaymentMethod;

    async fn initiate(&self, ctx: &CheckoutContext) -> AppResult<GatewaySession>;

    /// Outcome of a checkout started with `initiate`.
    async fn verify(&self, external_ref: &str) -> AppResult<GatewayOutcome>;

    async fn charge(&self, request: &ChargeRequest) -> AppResult<GatewayOutcome>;
}

/// Stand-in for eSewa, Khalti, IME Pay, Stripe and card processing.
/// Every payment succeeds unless its reference was marked as failing or
/// charges are being declined.
pub struct MockGateway {
    method: PaymentMethod,
    callback_url: String,
    issued: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<String>>,
    decline_charges: AtomicBool,
}

impl MockGateway {
    pub fn new(method: PaymentMethod, callback_url: impl Into<String>) -> Self {
        Self {
            method,
            callback_url: callback_url.into(),
            issued: Mutex::new(HashSet::new()),
            failing: Mutex::new(HashSet::new()),
            decline_charges: AtomicBool::new(false),
        }
    }

    pub async fn mark_failing(&self, external_ref: &str) {
        self.failing.lock().await.insert(external_ref.to_string());
    }

    pub fn set_decline_charges(&self, decline: bool) {
        self.decline_charges.store(decline, Ordering::SeqCst);
    }

    fn new_reference(&self) -> String {
        format!("{}_{}", self.method, Uuid::new_v4().simple())
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn method(&self) -> PaymentMethod {
        self.method
    }

    async fn initiate(&self, ctx: &CheckoutContext) -> AppResult<GatewaySession> {
        if ctx.amount < 0 {
            return Err(AppError::PaymentError(
                "Amount must not be negative".to_string(),
            ));
        }
        let external_ref = self.new_reference();
        self.issued.lock().await.insert(external_ref.clone());
        log::debug!(
            "{} checkout {} opened for subscription {} ({} {})",
            self.method,
            external_ref,
            ctx.subscription_id,
            ctx.amount,
            ctx.currency
        );
        Ok(GatewaySession {
            redirect_url: format!("{}?ref={}", self.callback_url, external_ref),
            external_ref,
        })
    }

    async fn verify(&self, external_ref: &str) -> AppResult<GatewayOutcome> {
        if !self.issued.lock().await.contains(external_ref) {
            return Err(AppError::PaymentError(format!(
                "Unknown {} reference {external_ref}",
                self.method
            )));
        }
        let failed = self.failing.lock().await.contains(external_ref);
        Ok(GatewayOutcome {
            external_ref: external_ref.to_string(),
            status: if failed {
                PaymentStatus::Failed
            } else {
                PaymentStatus::Paid
            },
            failure_reason: failed.then(|| "Payment was declined".to_string()),
        })
    }

    async fn charge(&self, request: &ChargeRequest) -> AppResult<GatewayOutcome> {
        // settled immediately, so the reference is never verified later
        let external_ref = self.new_reference();
        let declined = self.decline_charges.load(Ordering::SeqCst);
        log::debug!(
            "{} charge {} for subscription {}: {}",
            self.method,
            external_ref,
            request.subscription_id,
            if declined { "declined" } else { "paid" }
        );
        Ok(GatewayOutcome {
            external_ref,
            status: if declined {
                PaymentStatus::Failed
            } else {
                PaymentStatus::Paid
            },
            failure_reason: declined.then(|| "Renewal charge declined".to_string()),
        })
    }
}

/// One gateway per payment method.
#[derive(Clone)]
pub struct GatewayRegistry {
    gateways: HashMap<PaymentMethod, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn empty() -> Self {
        Self {
            gateways: HashMap::new(),
        }
    }

    /// Mock gateways for every method, redirecting to the configured callbacks.
    pub fn mock(config: &PaymentsConfig) -> Self {
        [
            (PaymentMethod::Esewa, &config.esewa_callback),
            (PaymentMethod::Khalti, &config.khalti_callback),
            (PaymentMethod::Imepay, &config.imepay_callback),
            (PaymentMethod::Stripe, &config.stripe_callback),
            (PaymentMethod::Card, &config.card_callback),
        ]
        .into_iter()
        .fold(Self::empty(), |registry, (method, callback)| {
            registry.with_gateway(Arc::new(MockGateway::new(method, callback.as_str())))
        })
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(gateway.method(), gateway);
        self
    }

    pub fn get(&self, method: PaymentMethod) -> AppResult<Arc<dyn PaymentGateway>> {
        self.gateways.get(&method).cloned().ok_or_else(|| {
            AppError::ValidationError(format!("Payment method {method} is not supported"))
        })
    }
}
