pub mod payments;
pub mod products;
pub mod subscriptions;
pub mod users;

pub use payments as payment_entity;
pub use products as product_entity;
pub use subscriptions as subscription_entity;
pub use users as user_entity;

pub use payments::{PaymentMethod, PaymentStatus};
pub use products::{Availability, ProductCategory, StringList};
pub use subscriptions::{BillingCycle, SubscriptionStatus};
pub use users::{AuthProvider, Role};
