// Request/Response models
pub mod common;
pub mod subscription_ext; // Extension methods for entity::subscriptions
pub mod transaction;
pub mod validate;
