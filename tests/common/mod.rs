#![allow(dead_code)]

use sea_orm::{ActiveModelTrait, EntityTrait, IntoActiveModel, Set};
use std::sync::Arc;
use subshop_backend::config::{DatabaseConfig, PaymentsConfig};
use subshop_backend::database::{DbPool, create_pool, run_migrations};
use subshop_backend::entities::{
    BillingCycle, PaymentMethod, ProductCategory, Role, user_entity as users,
};
use subshop_backend::external::{GatewayRegistry, MockGateway};
use subshop_backend::models::*;
use subshop_backend::services::*;

pub const TEST_PASSWORD: &str = "Secret123";

pub struct TestApp {
    pub pool: DbPool,
    pub auth: AuthService,
    pub products: ProductService,
    pub subscriptions: SubscriptionService,
    pub payments: PaymentService,
    /// Registered for `PaymentMethod::Khalti`, so tests can fail references or decline charges.
    pub khalti: Arc<MockGateway>,
}

pub async fn setup() -> TestApp {
    let pool = create_pool(&DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
    })
    .await
    .expect("connect sqlite");
    run_migrations(&pool).await.expect("migrate");

    let config = PaymentsConfig::default();
    let khalti = Arc::new(MockGateway::new(
        PaymentMethod::Khalti,
        config.khalti_callback.clone(),
    ));
    let gateways = GatewayRegistry::mock(&config).with_gateway(khalti.clone());

    let subscriptions = SubscriptionService::new(pool.clone(), 7);
    TestApp {
        auth: AuthService::new(pool.clone(), 4),
        products: ProductService::new(pool.clone(), "USD"),
        payments: PaymentService::new(pool.clone(), gateways, subscriptions.clone(), "USD"),
        subscriptions,
        khalti,
        pool,
    }
}

impl TestApp {
    pub async fn user(&self, email: &str) -> UserResponse {
        self.auth
            .sign_up(SignUpRequest {
                name: "Test User".to_string(),
                email: email.to_string(),
                password: TEST_PASSWORD.to_string(),
            })
            .await
            .expect("sign up")
    }

    pub async fn user_with_role(&self, email: &str, role: Role) -> UserResponse {
        let user = self.user(email).await;
        let model = users::Entity::find_by_id(user.id)
            .one(&self.pool)
            .await
            .unwrap()
            .unwrap();
        let mut am = model.into_active_model();
        am.role = Set(role);
        am.update(&self.pool).await.unwrap();
        self.auth.get_profile(user.id).await.unwrap()
    }

    pub async fn admin(&self) -> UserResponse {
        self.user_with_role("admin@example.com", Role::Admin).await
    }

    pub async fn product(
        &self,
        admin_id: i64,
        name: &str,
        price_monthly: i64,
        price_yearly: i64,
        trial_days: i32,
    ) -> ProductResponse {
        self.products
            .create_product(admin_id, product_request(name, price_monthly, price_yearly, trial_days))
            .await
            .expect("create product")
    }

    pub async fn subscribe(
        &self,
        user_id: i64,
        product_id: i64,
        billing_cycle: BillingCycle,
    ) -> SubscriptionResponse {
        self.subscriptions
            .create_from_product(
                user_id,
                CreateSubscriptionRequest {
                    product_id,
                    billing_cycle,
                    payment_method: PaymentMethod::Khalti,
                },
            )
            .await
            .expect("subscribe")
    }
}

pub fn product_request(
    name: &str,
    price_monthly: i64,
    price_yearly: i64,
    trial_days: i32,
) -> CreateProductRequest {
    let slug = name.to_lowercase().replace(' ', "-");
    CreateProductRequest {
        name: name.to_string(),
        description: format!("{name} for teams"),
        image: format!("https://picsum.photos/seed/{slug}/800/600"),
        url: format!("https://example.com/{slug}"),
        category: ProductCategory::Productivity,
        price_monthly,
        price_yearly,
        features: vec!["Feature A".to_string()],
        is_popular: false,
        rating: 4.0,
        reviews: 10,
        tags: vec!["Teams".to_string()],
        availability: None,
        trial_days,
        max_users: Some(5),
        storage: None,
        support: None,
    }
}
