mod audit_log;
mod license;
mod license_request;
mod payment;
mod payment_method;
mod subscription_plan;
mod user;

pub use audit_log::*;
pub use license::*;
pub use license_request::*;
pub use payment::*;
pub use payment_method::*;
pub use subscription_plan::*;
pub use user::*;
