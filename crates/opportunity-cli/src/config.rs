use anyhow::{bail, Context, Result};
use provider_clients::ProviderSettings;
use signal_core::EngineConfig;
use std::env;

/// One product to score: id plus its keyword set
#[derive(Debug, Clone, PartialEq)]
pub struct ProductSpec {
    pub product_id: String,
    pub keywords: Vec<String>,
}

impl ProductSpec {
    /// Parse `product-id=keyword one,keyword two`.
    pub fn parse(raw: &str) -> Result<Self> {
        let (id, keywords) = raw
            .split_once('=')
            .with_context(|| format!("expected PRODUCT_ID=kw1,kw2 but got '{}'", raw))?;
        let product_id = id.trim().to_string();
        if product_id.is_empty() {
            bail!("empty product id in '{}'", raw);
        }
        let keywords: Vec<String> = keywords
            .split(',')
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        Ok(Self { product_id, keywords })
    }
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub engine: EngineConfig,
    pub providers: ProviderSettings,
    pub products: Vec<ProductSpec>,
    /// Re-score on this period until SIGINT/SIGTERM; `None` scores once
    pub refresh_interval_seconds: Option<u64>,
    pub top_n: Option<usize>,
}

impl CliConfig {
    /// Products come from the command line, falling back to `PRODUCTS` (`;`-separated).
    pub fn from_env_and_args(args: &[String]) -> Result<Self> {
        let engine = EngineConfig::from_env().context("invalid engine configuration")?;
        engine.validate().context("invalid engine configuration")?;
        let providers = ProviderSettings::from_env().context("invalid provider configuration")?;

        let raw_products: Vec<String> = if args.is_empty() {
            env::var("PRODUCTS")
                .unwrap_or_default()
                .split(';')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        } else {
            args.to_vec()
        };
        if raw_products.is_empty() {
            bail!("no products given: pass PRODUCT_ID=kw1,kw2 arguments or set PRODUCTS");
        }
        let products = raw_products
            .iter()
            .map(|raw| ProductSpec::parse(raw))
            .collect::<Result<Vec<_>>>()?;

        let refresh_interval_seconds = match env::var("REFRESH_INTERVAL_SECONDS") {
            Ok(raw) if !raw.trim().is_empty() => {
                let secs: u64 = raw.trim().parse().context("REFRESH_INTERVAL_SECONDS")?;
                (secs > 0).then_some(secs)
            }
            _ => None,
        };
        let top_n = match env::var("TOP_N") {
            Ok(raw) if !raw.trim().is_empty() => Some(raw.trim().parse().context("TOP_N")?),
            _ => None,
        };

        Ok(Self {
            engine,
            providers,
            products,
            refresh_interval_seconds,
            top_n,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_product_spec() {
        let spec = ProductSpec::parse("sku-42= yoga mat, cork yoga mat ,,").unwrap();
        assert_eq!(spec.product_id, "sku-42");
        assert_eq!(spec.keywords, vec!["yoga mat".to_string(), "cork yoga mat".to_string()]);
    }

    #[test]
    fn test_product_spec_without_keywords_is_kept() {
        // The scorer reports it as insufficient data
        let spec = ProductSpec::parse("sku-1=").unwrap();
        assert!(spec.keywords.is_empty());
    }

    #[test]
    fn test_malformed_product_spec() {
        assert!(ProductSpec::parse("yoga mat").is_err());
        assert!(ProductSpec::parse(" =yoga mat").is_err());
    }
}
