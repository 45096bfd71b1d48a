//! # Affirm Configuration
//!
//! API key pairs and endpoints for the Affirm integration.
//! Keys are loaded from environment variables; the sandbox/live switch
//! comes from the gateway settings.

use gateway_core::{Country, Currency, PaymentError, PaymentResult};
use std::env;
use std::time::Duration;

/// Public/private key pair for one region
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub public_key: String,
    pub private_key: String,
}

impl KeyPair {
    pub fn new(public_key: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            private_key: private_key.into(),
        }
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Affirm API configuration
#[derive(Debug, Clone)]
pub struct AffirmConfig {
    /// US key pair (USD orders)
    pub us_keys: Option<KeyPair>,

    /// Canada key pair (CAD orders)
    pub ca_keys: Option<KeyPair>,

    /// Sandbox or live endpoints
    pub sandbox: bool,

    /// Merchant's home region; tracker reports with no order use its keys
    /// first
    pub region: Country,

    /// API base URL override for both regions (for testing/mocking)
    pub api_base_url: Option<String>,

    /// Error tracker URL override (for testing/mocking)
    pub tracker_url: Option<String>,

    /// Timeout for charge API calls
    pub timeout: Duration,

    /// Timeout for error tracker deliveries
    pub tracker_timeout: Duration,
}

impl AffirmConfig {
    /// Load key pairs from environment variables.
    ///
    /// Env vars (at least one complete pair is required):
    /// - `AFFIRM_PUBLIC_KEY` / `AFFIRM_PRIVATE_KEY`
    /// - `AFFIRM_PUBLIC_KEY_CA` / `AFFIRM_PRIVATE_KEY_CA`
    ///
    /// `AFFIRM_API_BASE_URL` optionally points both regions at another host.
    pub fn from_env() -> PaymentResult<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let us_keys = key_pair_from_env("AFFIRM_PUBLIC_KEY", "AFFIRM_PRIVATE_KEY")?;
        let ca_keys = key_pair_from_env("AFFIRM_PUBLIC_KEY_CA", "AFFIRM_PRIVATE_KEY_CA")?;

        if us_keys.is_none() && ca_keys.is_none() {
            return Err(PaymentError::Configuration(
                "no Affirm API keys configured; set AFFIRM_PUBLIC_KEY/AFFIRM_PRIVATE_KEY or the _CA pair"
                    .to_string(),
            ));
        }

        let mut config = Self::new(us_keys, ca_keys);
        config.api_base_url = env::var("AFFIRM_API_BASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());
        Ok(config)
    }

    /// Create config with explicit key pairs (sandbox, default timeouts)
    pub fn new(us_keys: Option<KeyPair>, ca_keys: Option<KeyPair>) -> Self {
        Self {
            us_keys,
            ca_keys,
            sandbox: true,
            region: Country::Usa,
            api_base_url: None,
            tracker_url: None,
            timeout: Duration::from_secs(30),
            tracker_timeout: Duration::from_secs(2),
        }
    }

    /// Builder: sandbox or live
    pub fn with_sandbox(mut self, sandbox: bool) -> Self {
        self.sandbox = sandbox;
        self
    }

    /// Builder: merchant's home region
    pub fn with_region(mut self, region: Country) -> Self {
        self.region = region;
        self
    }

    /// Builder: set custom API base URL (for testing)
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    /// Builder: set custom tracker URL (for testing)
    pub fn with_tracker_url(mut self, url: impl Into<String>) -> Self {
        self.tracker_url = Some(url.into());
        self
    }

    /// Builder: charge API timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Key pair for a country
    pub fn keys_for(&self, country: Country) -> PaymentResult<&KeyPair> {
        let keys = match country {
            Country::Usa => self.us_keys.as_ref(),
            Country::Can => self.ca_keys.as_ref(),
        };
        keys.ok_or_else(|| {
            PaymentError::Configuration(format!("no Affirm API keys configured for {}", country))
        })
    }

    /// Key pair for tracker deliveries: the order's country when known,
    /// otherwise the merchant's region, else the other region
    pub fn tracker_keys(&self, country: Option<Country>) -> Option<(Country, &KeyPair)> {
        match country {
            Some(country) => self.keys_for(country).ok().map(|keys| (country, keys)),
            None => {
                let other = match self.region {
                    Country::Usa => Country::Can,
                    Country::Can => Country::Usa,
                };
                [self.region, other]
                    .into_iter()
                    .find_map(|country| self.keys_for(country).ok().map(|keys| (country, keys)))
            }
        }
    }

    /// Supported currency with a complete key pair for its region
    pub fn is_valid_for_use(&self, currency: Currency) -> bool {
        self.keys_for(currency.country()).is_ok()
    }

    /// Transactions API base URL for a country
    pub fn api_base_url(&self, country: Country) -> String {
        if let Some(url) = &self.api_base_url {
            return url.trim_end_matches('/').to_string();
        }
        let host = match (country, self.sandbox) {
            (Country::Usa, true) => "https://sandbox.affirm.com",
            (Country::Usa, false) => "https://api.affirm.com",
            (Country::Can, true) => "https://sandbox.affirm.ca",
            (Country::Can, false) => "https://api.affirm.ca",
        };
        format!("{}/api/v1", host)
    }

    /// Error tracker endpoint
    pub fn tracker_url(&self) -> String {
        if let Some(url) = &self.tracker_url {
            return url.clone();
        }
        let host = if self.sandbox {
            "https://api.global-sandbox.affirm.com"
        } else {
            "https://api.global.affirm.com"
        };
        format!("{}/api/v1/partnersolutions/platform/tracker", host)
    }

    /// Merchant dashboard page for a charge
    pub fn dashboard_url(&self, charge_id: &str) -> String {
        let host = if self.sandbox {
            "sandbox.affirm.com"
        } else {
            "affirm.com"
        };
        format!("https://{}/dashboard/#/details/{}", host, charge_id)
    }
}

/// Both halves or neither; a half-configured pair is an error
fn key_pair_from_env(public_var: &str, private_var: &str) -> PaymentResult<Option<KeyPair>> {
    let read = |name: &str| {
        env::var(name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    match (read(public_var), read(private_var)) {
        (Some(public_key), Some(private_key)) => Ok(Some(KeyPair::new(public_key, private_key))),
        (None, None) => Ok(None),
        _ => Err(PaymentError::Configuration(format!(
            "{} and {} must be set together",
            public_var, private_var
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn us_only() -> AffirmConfig {
        AffirmConfig::new(Some(KeyPair::new("pub_us", "priv_us")), None)
    }

    #[test]
    fn test_base_urls() {
        let config = us_only();
        assert_eq!(config.api_base_url(Country::Usa), "https://sandbox.affirm.com/api/v1");
        assert_eq!(config.api_base_url(Country::Can), "https://sandbox.affirm.ca/api/v1");

        let live = config.with_sandbox(false);
        assert_eq!(live.api_base_url(Country::Usa), "https://api.affirm.com/api/v1");
        assert_eq!(live.api_base_url(Country::Can), "https://api.affirm.ca/api/v1");

        let mocked = us_only().with_api_base_url("http://127.0.0.1:9999/");
        assert_eq!(mocked.api_base_url(Country::Can), "http://127.0.0.1:9999");
    }

    #[test]
    fn test_tracker_and_dashboard_urls() {
        let config = us_only();
        assert_eq!(
            config.tracker_url(),
            "https://api.global-sandbox.affirm.com/api/v1/partnersolutions/platform/tracker"
        );
        assert_eq!(
            config.dashboard_url("ch_1"),
            "https://sandbox.affirm.com/dashboard/#/details/ch_1"
        );

        let live = config.with_sandbox(false);
        assert_eq!(
            live.tracker_url(),
            "https://api.global.affirm.com/api/v1/partnersolutions/platform/tracker"
        );
        assert_eq!(live.dashboard_url("ch_1"), "https://affirm.com/dashboard/#/details/ch_1");
    }

    #[test]
    fn test_key_selection() {
        let config = us_only();
        assert_eq!(config.keys_for(Country::Usa).unwrap().public_key, "pub_us");
        assert!(config.keys_for(Country::Can).is_err());
        assert!(config.is_valid_for_use(Currency::USD));
        assert!(!config.is_valid_for_use(Currency::CAD));
    }

    #[test]
    fn test_tracker_key_fallback() {
        let config = us_only();
        assert_eq!(config.tracker_keys(None).unwrap().0, Country::Usa);
        assert!(config.tracker_keys(Some(Country::Can)).is_none());

        let ca_only = AffirmConfig::new(None, Some(KeyPair::new("pub_ca", "priv_ca")));
        let (country, keys) = ca_only.tracker_keys(None).unwrap();
        assert_eq!(country, Country::Can);
        assert_eq!(keys.public_key, "pub_ca");

        // Both pairs: the merchant's region wins when there is no order
        let both = AffirmConfig::new(
            Some(KeyPair::new("pub_us", "priv_us")),
            Some(KeyPair::new("pub_ca", "priv_ca")),
        );
        assert_eq!(both.tracker_keys(None).unwrap().0, Country::Usa);
        let canadian = both.with_region(Country::Can);
        assert_eq!(canadian.tracker_keys(None).unwrap().1.public_key, "pub_ca");
        assert_eq!(canadian.tracker_keys(Some(Country::Usa)).unwrap().0, Country::Usa);
    }

    #[test]
    fn test_private_key_not_logged() {
        let rendered = format!("{:?}", KeyPair::new("pub", "very-secret"));
        assert!(!rendered.contains("very-secret"));
    }

    #[test]
    fn test_half_configured_pair_rejected() {
        env::set_var("AFFIRM_TEST_PUB_HALF", "pub");
        env::remove_var("AFFIRM_TEST_PRIV_HALF");
        assert!(key_pair_from_env("AFFIRM_TEST_PUB_HALF", "AFFIRM_TEST_PRIV_HALF").is_err());

        env::remove_var("AFFIRM_TEST_PUB_NONE");
        env::remove_var("AFFIRM_TEST_PRIV_NONE");
        assert_eq!(
            key_pair_from_env("AFFIRM_TEST_PUB_NONE", "AFFIRM_TEST_PRIV_NONE").unwrap(),
            None
        );
    }
}
