pub mod pagination;
pub mod payment;
pub mod product;
pub mod subscription;
pub mod user;

pub use pagination::*;
pub use payment::*;
pub use product::*;
pub use subscription::*;
pub use user::*;
