use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::models::common::StoreEnvironment;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub app_store: AppStoreConfig,
    pub catalog: CatalogConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub application: ApplicationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

/// App Store Server API credentials and trust configuration.
///
/// The key material comes from App Store Connect: an ES256 signing key
/// (.p8 contents), its key id, the issuer id, and the app's bundle id.
#[derive(Debug, Clone, Deserialize)]
pub struct AppStoreConfig {
    #[serde(default)]
    pub key_id: String,
    #[serde(default)]
    pub issuer_id: String,
    /// Contents of the .p8 private key, with or without PEM headers
    #[serde(default)]
    pub private_key: String,
    pub bundle_id: String,
    /// Environments tried in order; adding one is a config change, not code
    #[serde(default = "default_environments")]
    pub environments: Vec<EnvironmentEndpoint>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Directory of trusted root certificates (.cer/.crt/.pem)
    #[serde(default)]
    pub root_certificates_path: Option<String>,
    /// Inline trusted roots, base64-encoded DER
    #[serde(default)]
    pub root_certificates: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentEndpoint {
    pub name: StoreEnvironment,
    pub base_url: String,
}

fn default_environments() -> Vec<EnvironmentEndpoint> {
    vec![
        EnvironmentEndpoint {
            name: StoreEnvironment::Production,
            base_url: "https://api.storekit.itunes.apple.com".to_string(),
        },
        EnvironmentEndpoint {
            name: StoreEnvironment::Sandbox,
            base_url: "https://api.storekit-sandbox.itunes.apple.com".to_string(),
        },
    ]
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

/// Versioned product-id to tier enumeration. Unknown ids are rejected at
/// validation time rather than granted a default tier.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    pub version: String,
    pub products: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_expiration_minutes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub validate_rpm: u32,
    pub window_seconds: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            validate_rpm: 30,
            window_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApplicationConfig {
    /// Origin of the web dashboard allowed to call this API
    #[serde(default)]
    pub dashboard_origin: Option<String>,
}

impl AppStoreConfig {
    /// Load the trusted root certificate set, once at startup.
    ///
    /// Certificates come from a directory of .cer/.crt/.pem files and/or
    /// inline base64 entries. PEM input is unwrapped to DER so that trust
    /// pinning always operates on DER bytes.
    pub fn load_trusted_roots(&self) -> anyhow::Result<Vec<Vec<u8>>> {
        let mut roots = Vec::new();

        if let Some(dir) = &self.root_certificates_path {
            let dir = Path::new(dir);
            if dir.is_dir() {
                for entry in std::fs::read_dir(dir)? {
                    let path = entry?.path();
                    let is_cert = path
                        .extension()
                        .and_then(|e| e.to_str())
                        .map(|e| matches!(e, "cer" | "crt" | "pem"))
                        .unwrap_or(false);
                    if !is_cert {
                        continue;
                    }
                    let bytes = std::fs::read(&path)?;
                    roots.push(normalize_certificate(&bytes)?);
                    tracing::info!("Loaded trusted root certificate: {}", path.display());
                }
            } else {
                tracing::warn!(
                    "Trusted root certificate path does not exist: {}",
                    dir.display()
                );
            }
        }

        for (i, encoded) in self.root_certificates.iter().enumerate() {
            let bytes = BASE64
                .decode(encoded.trim())
                .map_err(|e| anyhow::anyhow!("root_certificates[{}] is not base64: {}", i, e))?;
            roots.push(normalize_certificate(&bytes)?);
        }

        Ok(roots)
    }
}

/// Accept either DER or PEM certificate input, returning DER bytes.
fn normalize_certificate(bytes: &[u8]) -> anyhow::Result<Vec<u8>> {
    let text = std::str::from_utf8(bytes).ok();
    if let Some(text) = text {
        if text.contains("-----BEGIN CERTIFICATE-----") {
            let body: String = text
                .lines()
                .filter(|l| !l.starts_with("-----"))
                .collect::<Vec<_>>()
                .join("");
            return BASE64
                .decode(body.trim())
                .map_err(|e| anyhow::anyhow!("invalid PEM certificate body: {}", e));
        }
    }
    Ok(bytes.to_vec())
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for environment variable overrides)
        dotenvy::dotenv().ok();

        // Build config from config.yml (required) with environment variable overrides
        let config = config::Config::builder()
            // Load config.yml (REQUIRED)
            .add_source(config::File::with_name("config").required(true))
            // Allow environment variables to override config file
            .add_source(
                config::Environment::with_prefix("CHORDELIA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
