use crate::{
    config::Config,
    services::{
        AppStoreClient, JWTService, ProductCatalog, SignatureVerifier, SubscriptionService,
        TokenStore, ValidationService,
    },
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub redis: Arc<redis::Client>,
    pub jwt_service: Arc<JWTService>,
    pub subscription_service: Arc<SubscriptionService>,
    pub validation_service: Arc<ValidationService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        // Connect to database
        let db = sea_orm::Database::connect(&config.database.url).await?;

        // Connect to Redis
        let redis = Arc::new(redis::Client::open(config.redis.url.as_str())?);

        // Initialize services
        let token_store = Arc::new(TokenStore::new(redis.clone()));
        let jwt_service = Arc::new(JWTService::new(Arc::new(config.auth.clone())));
        let subscription_service = Arc::new(SubscriptionService::new(db.clone()));

        // Trust material loads once at startup and is shared read-only
        let trusted_roots = config.app_store.load_trusted_roots()?;
        let verifier = Arc::new(SignatureVerifier::new(&trusted_roots));

        let app_store = Arc::new(AppStoreClient::new(
            &config.app_store,
            Some(token_store.clone()),
        )?);
        let catalog = Arc::new(ProductCatalog::new(&config.catalog)?);

        let validation_service = Arc::new(ValidationService::new(
            app_store,
            verifier,
            catalog,
            subscription_service.clone(),
            config.app_store.bundle_id.clone(),
        ));

        Ok(Self {
            db,
            redis,
            jwt_service,
            subscription_service,
            validation_service,
            config: Arc::new(config),
        })
    }
}
