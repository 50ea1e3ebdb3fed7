use crate::{config::CatalogConfig, models::common::EntitlementTier};
use std::collections::HashMap;
use tracing::info;

/// Versioned product-id to entitlement-tier mapping.
///
/// The catalog is an explicit enumeration loaded from configuration; nothing
/// is inferred from product-id string patterns. Unknown ids resolve to
/// `None` so the orchestrator rejects the transaction instead of granting a
/// default tier.
pub struct ProductCatalog {
    version: String,
    products: HashMap<String, EntitlementTier>,
}

impl ProductCatalog {
    pub fn new(config: &CatalogConfig) -> anyhow::Result<Self> {
        let mut products = HashMap::new();
        for (product_id, tier_name) in &config.products {
            let tier = EntitlementTier::from_str(tier_name).ok_or_else(|| {
                anyhow::anyhow!(
                    "catalog {}: product {} maps to unknown tier '{}'",
                    config.version,
                    product_id,
                    tier_name
                )
            })?;
            if tier == EntitlementTier::None {
                anyhow::bail!(
                    "catalog {}: product {} cannot map to 'none'",
                    config.version,
                    product_id
                );
            }
            products.insert(product_id.clone(), tier);
        }

        info!(
            "Loaded product catalog {} ({} products)",
            config.version,
            products.len()
        );

        Ok(Self {
            version: config.version.clone(),
            products,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn resolve(&self, product_id: &str) -> Option<EntitlementTier> {
        self.products.get(product_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_config(products: &[(&str, &str)]) -> CatalogConfig {
        CatalogConfig {
            version: "2025-06".to_string(),
            products: products
                .iter()
                .map(|(id, tier)| (id.to_string(), tier.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_resolves_known_products() {
        let catalog = ProductCatalog::new(&catalog_config(&[
            ("tier.monthly", "monthly"),
            ("tier.annual", "annual"),
            ("tier.unlock", "lifetime"),
        ]))
        .unwrap();

        assert_eq!(
            catalog.resolve("tier.monthly"),
            Some(EntitlementTier::Monthly)
        );
        assert_eq!(
            catalog.resolve("tier.unlock"),
            Some(EntitlementTier::Lifetime)
        );
    }

    #[test]
    fn test_unknown_product_resolves_to_none_option() {
        let catalog = ProductCatalog::new(&catalog_config(&[("tier.monthly", "monthly")])).unwrap();
        assert_eq!(catalog.resolve("tier.unknown"), None);
    }

    #[test]
    fn test_bad_tier_name_fails_at_load() {
        let result = ProductCatalog::new(&catalog_config(&[("tier.monthly", "gold")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_none_tier_is_rejected_at_load() {
        let result = ProductCatalog::new(&catalog_config(&[("tier.monthly", "none")]));
        assert!(result.is_err());
    }
}
