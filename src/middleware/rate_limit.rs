//! Rate limiting middleware using Redis
//!
//! Sliding-window counter keyed by user id. Applied to the validation route,
//! which fans out to the remote store service on every request.

use crate::{
    config::RateLimitConfig,
    error::{ApiError, Result},
    middleware::jwt_auth::UserIdentity,
};
use axum::{extract::Request, middleware::Next, response::Response};
use redis::{AsyncCommands, Client};
use std::sync::Arc;
use tracing::{debug, warn};

/// Rate limiting middleware
///
/// Uses a sliding window counter in Redis to track request rates per user.
/// Returns 429 Too Many Requests when the limit is exceeded.
pub fn rate_limit_middleware(
    redis_client: Arc<Client>,
    config: RateLimitConfig,
) -> impl Fn(
    Request,
    Next,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response>> + Send>>
       + Clone {
    move |request: Request, next: Next| {
        let redis_client = redis_client.clone();
        let config = config.clone();

        Box::pin(async move {
            // Extract identity from request extensions (set by auth middleware)
            let identity = request.extensions().get::<UserIdentity>().ok_or_else(|| {
                ApiError::Internal(anyhow::anyhow!(
                    "Rate limit middleware requires jwt_auth_middleware"
                ))
            })?;

            let allowed = check_rate_limit(
                &redis_client,
                &identity.user_id.to_string(),
                config.validate_rpm,
                config.window_seconds,
            )
            .await?;

            if !allowed {
                warn!("Rate limit exceeded for user: {}", identity.user_id);
                return Err(ApiError::RateLimitExceeded);
            }

            debug!("Rate limit check passed for user: {}", identity.user_id);

            Ok(next.run(request).await)
        })
    }
}

/// Check rate limit using a Redis sliding window counter
///
/// Returns true if the request is allowed, false if the limit is exceeded.
async fn check_rate_limit(
    redis_client: &Client,
    user_id: &str,
    limit: u32,
    window_seconds: u32,
) -> Result<bool> {
    let mut conn = redis_client
        .get_multiplexed_async_connection()
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Redis connection failed: {}", e)))?;

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("System clock before epoch: {}", e)))?
        .as_secs();

    let key = format!("rate_limit:user:{}", user_id);
    let window_start = now - window_seconds as u64;

    // Sorted set with timestamps as scores; drop entries outside the window
    let _: () = conn
        .zrembyscore(&key, 0, window_start as f64)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Redis ZREMRANGEBYSCORE failed: {}", e)))?;

    let count: u32 = conn
        .zcard(&key)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Redis ZCARD failed: {}", e)))?;

    if count >= limit {
        return Ok(false);
    }

    let member = format!("{}:{}", now, uuid::Uuid::new_v4());
    let _: () = conn
        .zadd(&key, member, now as f64)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Redis ZADD failed: {}", e)))?;

    // Expire the key once the window plus a small buffer has passed
    let _: () = conn
        .expire(&key, (window_seconds + 10) as i64)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Redis EXPIRE failed: {}", e)))?;

    Ok(true)
}

/// Create rate limit middleware from application configuration
pub fn create_rate_limiter(
    redis_client: Arc<Client>,
    config: &RateLimitConfig,
) -> impl Fn(
    Request,
    Next,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response>> + Send>>
       + Clone {
    rate_limit_middleware(redis_client, config.clone())
}
