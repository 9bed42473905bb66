use serde::Deserialize;
use validator::Validate;

/// Verifier configuration, provided by the embedding application.
///
/// Loaded from `config.yml` with `SUBGUARD__`-prefixed environment variable
/// overrides, or constructed directly. Validate before use: an empty shared
/// secret cannot verify auto-renewable subscriptions against the vendor.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct VerifierConfig {
    #[validate(nested)]
    pub primary: PrimaryEndpointConfig,
    #[validate(nested)]
    pub vendor: VendorEndpointConfig,
    /// Route verification to the sandbox environment.
    #[serde(default)]
    pub sandbox_mode: bool,
    #[serde(default = "default_exclude_old_transactions")]
    pub exclude_old_transactions: bool,
    #[serde(default)]
    pub transport: TransportConfig,
}

/// The operator's own verification server, always tried first.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PrimaryEndpointConfig {
    #[validate(url)]
    pub url: String,
}

/// The platform vendor's verification service, used only when the primary
/// endpoint is unreachable.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct VendorEndpointConfig {
    #[validate(url)]
    #[serde(default = "default_vendor_production_url")]
    pub production_url: String,
    #[validate(url)]
    #[serde(default = "default_vendor_sandbox_url")]
    pub sandbox_url: String,
    /// Shared secret for auto-renewable subscription validation.
    #[validate(length(min = 1))]
    pub shared_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
            connect_timeout_ms: 10_000,
        }
    }
}

fn default_exclude_old_transactions() -> bool {
    true
}

fn default_vendor_production_url() -> String {
    "https://buy.itunes.apple.com/verifyReceipt".to_string()
}

fn default_vendor_sandbox_url() -> String {
    "https://sandbox.itunes.apple.com/verifyReceipt".to_string()
}

impl VerifierConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for environment variable overrides)
        dotenvy::dotenv().ok();

        // Build config from config.yml (required) with environment variable overrides
        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(true))
            .add_source(
                config::Environment::with_prefix("SUBGUARD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
