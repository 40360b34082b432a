use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_VERSION: &str = "2025-07";
pub const DEFAULT_ALT_TEXT: &str = "Uploaded via API";

/// Credentials and endpoint of the Shopify store files are registered with.
#[derive(Debug, Clone)]
pub struct ShopifyConfig {
    /// App API key (optional, not needed by admin GraphQL calls)
    pub api_key: Option<String>,
    /// App API secret (optional, not needed by admin GraphQL calls)
    pub api_secret: Option<String>,
    /// Admin API access token sent as `X-Shopify-Access-Token`
    pub admin_token: String,
    /// Shop hostname, e.g. `my-store.myshopify.com`
    pub shop: String,
    /// Admin API version (default: 2025-07)
    pub api_version: String,
}

impl ShopifyConfig {
    pub fn graphql_endpoint(&self) -> String {
        let shop = self.shop.trim_end_matches('/');
        if shop.starts_with("https://") || shop.starts_with("http://") {
            format!("{}/admin/api/{}/graphql.json", shop, self.api_version)
        } else {
            format!("https://{}/admin/api/{}/graphql.json", shop, self.api_version)
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub shopify: ShopifyConfig,

    /// Listening port (default: 3000)
    pub port: u16,

    /// Directory incoming files are staged in (default: "uploads")
    pub upload_dir: PathBuf,

    /// Alt text attached to every created file (default: "Uploaded via API")
    pub alt_text: String,

    /// Timeout for each GraphQL call (default: 30s)
    pub platform_timeout: Duration,

    /// Longest the storage upload may go without progress (default: 60s)
    pub storage_idle_timeout: Duration,

    /// TCP connect timeout for both outbound clients (default: 10s)
    pub connect_timeout: Duration,

    /// Inbound request body cap in bytes; `None` leaves uploads unbounded
    pub max_upload_size: Option<usize>,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let shopify = ShopifyConfig {
            api_key: env::var("SHOPIFY_API_KEY").ok(),
            api_secret: env::var("SHOPIFY_API_SECRET").ok(),
            admin_token: env::var("ADMIN_API_TOKEN").context("ADMIN_API_TOKEN must be set")?,
            shop: env::var("SHOPIFY_STORE").context("SHOPIFY_STORE must be set")?,
            api_version: env::var("SHOPIFY_API_VERSION")
                .unwrap_or_else(|_| DEFAULT_API_VERSION.to_string()),
        };

        Ok(Self {
            shopify,

            port: parse_var("PORT")?.unwrap_or(3000),

            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("uploads")),

            alt_text: env::var("FILE_ALT_TEXT").unwrap_or_else(|_| DEFAULT_ALT_TEXT.to_string()),

            platform_timeout: Duration::from_secs(
                parse_var("PLATFORM_TIMEOUT_SECS")?.unwrap_or(30),
            ),

            storage_idle_timeout: Duration::from_secs(
                parse_var("STORAGE_IDLE_TIMEOUT_SECS")?.unwrap_or(60),
            ),

            connect_timeout: Duration::from_secs(
                parse_var("CONNECT_TIMEOUT_SECS")?.unwrap_or(10),
            ),

            max_upload_size: parse_var("MAX_UPLOAD_SIZE")?,
        })
    }

    /// Config for tests and local runs against fake endpoints
    pub fn development() -> Self {
        Self {
            shopify: ShopifyConfig {
                api_key: None,
                api_secret: None,
                admin_token: "shpat_development".to_string(),
                shop: "development.myshopify.com".to_string(),
                api_version: DEFAULT_API_VERSION.to_string(),
            },
            port: 3000,
            upload_dir: PathBuf::from("uploads"),
            alt_text: DEFAULT_ALT_TEXT.to_string(),
            platform_timeout: Duration::from_secs(30),
            storage_idle_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            max_upload_size: None,
        }
    }
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(v) => v
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} has an invalid value: {}", name, v)),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.port, 3000);
        assert_eq!(config.alt_text, "Uploaded via API");
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
        assert!(config.max_upload_size.is_none());
    }

    #[test]
    fn test_graphql_endpoint() {
        let mut shopify = AppConfig::development().shopify;
        assert_eq!(
            shopify.graphql_endpoint(),
            "https://development.myshopify.com/admin/api/2025-07/graphql.json"
        );

        shopify.shop = "https://other.myshopify.com/".to_string();
        shopify.api_version = "2024-10".to_string();
        assert_eq!(
            shopify.graphql_endpoint(),
            "https://other.myshopify.com/admin/api/2024-10/graphql.json"
        );

        shopify.shop = "http://127.0.0.1:8080".to_string();
        assert_eq!(
            shopify.graphql_endpoint(),
            "http://127.0.0.1:8080/admin/api/2024-10/graphql.json"
        );
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        unsafe { env::set_var("UPLOAD_BRIDGE_TEST_PORT", "not-a-port") };
        let parsed: Result<Option<u16>> = parse_var("UPLOAD_BRIDGE_TEST_PORT");
        unsafe { env::remove_var("UPLOAD_BRIDGE_TEST_PORT") };
        assert!(parsed.is_err());

        let missing: Option<u16> = parse_var("UPLOAD_BRIDGE_TEST_UNSET").unwrap();
        assert!(missing.is_none());
    }
}
