//! Process- and session-level policy knobs. Every value the specification
//! calls "policy, not a fundamental" lives here instead of as a hard-coded
//! constant, and is loadable from a TOML file the way the reference
//! workspace's services load their `config.toml`.

use serde::{Deserialize, Serialize};

use blueshare_cost::CostModel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlueShareConfig {
    /// NSIGII per-device vote timeout (`T_vote`), in seconds.
    pub vote_timeout_secs: u64,
    /// ZeroKey verification token lifetime, in seconds.
    pub zero_key_lifetime_secs: u64,
    /// Lightning invoice expiry, in seconds.
    pub invoice_expiry_secs: u64,
    /// USD/BTC conversion rate used for satoshi quoting.
    pub rate_usd_per_btc: f64,
    /// CostEngine's affine-model constants.
    pub cost_model: CostModel,
    /// Maximum concurrent networks (sessions).
    pub max_networks: usize,
    /// Maximum devices admitted to a single network.
    pub max_devices_per_network: usize,
    /// Maximum in-flight payment transactions across all sessions.
    pub max_inflight_transactions: usize,
}

impl Default for BlueShareConfig {
    fn default() -> Self {
        Self {
            vote_timeout_secs: 5,
            zero_key_lifetime_secs: blueshare_identity::DEFAULT_KEY_LIFETIME_SECS,
            invoice_expiry_secs: blueshare_payment::DEFAULT_INVOICE_EXPIRY_SECS,
            rate_usd_per_btc: blueshare_payment::DEFAULT_RATE_USD_PER_BTC,
            cost_model: CostModel::default(),
            max_networks: 10,
            max_devices_per_network: 50,
            max_inflight_transactions: 1000,
        }
    }
}

impl BlueShareConfig {
    pub fn vote_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.vote_timeout_secs)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_specification() {
        let cfg = BlueShareConfig::default();
        assert_eq!(cfg.vote_timeout_secs, 5);
        assert_eq!(cfg.zero_key_lifetime_secs, 30 * 24 * 60 * 60);
        assert_eq!(cfg.invoice_expiry_secs, 600);
        assert_eq!(cfg.rate_usd_per_btc, 40_000.0);
        assert_eq!(cfg.max_networks, 10);
        assert_eq!(cfg.max_devices_per_network, 50);
        assert_eq!(cfg.max_inflight_transactions, 1000);
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = BlueShareConfig::default();
        let rendered = cfg.to_toml_string().unwrap();
        let parsed = BlueShareConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(cfg, parsed);
    }

    #[test]
    fn partial_toml_overrides_fall_back_to_defaults() {
        let parsed = BlueShareConfig::from_toml_str("rate_usd_per_btc = 55000.0\n").unwrap();
        assert_eq!(parsed.rate_usd_per_btc, 55_000.0);
        assert_eq!(parsed.vote_timeout_secs, 5);
    }
}
