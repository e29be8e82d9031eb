use crate::{invoice::DEFAULT_REFERENCE_TEMPLATE, policy::SettlementPolicy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconConfig {
    /// Policy given to new reconciliations when the caller picks none.
    /// `null` leaves them without a policy until one is chosen.
    #[serde(default)]
    pub default_policy: Option<SettlementPolicy>,
    /// 1 = January. Used to derive fiscal windows.
    #[serde(default = "default_fiscal_start_month")]
    pub fiscal_year_start_month: u32,
    #[serde(default)]
    pub require_bank_pull_limit: bool,
    /// Derive an NGT factor from the MGQ when no factor is configured.
    #[serde(default = "default_true")]
    pub derive_ngt_factor: bool,
    /// `{contract}` is replaced with the contract name.
    #[serde(default = "default_reference_template")]
    pub reference_label_template: String,
}

fn default_fiscal_start_month() -> u32 {
    4
}

fn default_true() -> bool {
    true
}

fn default_reference_template() -> String {
    DEFAULT_REFERENCE_TEMPLATE.to_string()
}

impl ReconConfig {
    /// Load from the data/ directory.
    /// In tests, use ReconConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/reconciliation.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: ReconConfig = serde_json::from_str(&content)?;
        if !(1..=12).contains(&config.fiscal_year_start_month) {
            anyhow::bail!(
                "fiscal_year_start_month must be 1..=12, got {}",
                config.fiscal_year_start_month
            );
        }
        Ok(config)
    }

    pub fn default_test() -> Self {
        Self {
            default_policy:           Some(SettlementPolicy::BillNow),
            fiscal_year_start_month:  4,
            require_bank_pull_limit:  false,
            derive_ngt_factor:        true,
            reference_label_template: default_reference_template(),
        }
    }
}
