// Service modules
pub mod app_store_client;
pub mod jwt_service;
pub mod product_catalog;
pub mod signature_verifier;
pub mod subscription_service;
pub mod token_store;
pub mod validation_service;

pub use app_store_client::AppStoreClient;
pub use jwt_service::JWTService;
pub use product_catalog::ProductCatalog;
pub use signature_verifier::SignatureVerifier;
pub use subscription_service::SubscriptionService;
pub use token_store::TokenStore;
pub use validation_service::ValidationService;
