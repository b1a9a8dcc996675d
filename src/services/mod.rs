pub mod auth_service;
pub mod payment_service;
pub mod product_service;
pub mod subscription_service;

pub use auth_service::*;
pub use payment_service::*;
pub use product_service::*;
pub use subscription_service::*;
