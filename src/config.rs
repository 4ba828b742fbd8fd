//! Strategy + venue configuration loading.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SymbolConfig {
    pub name: String,
    pub venue: String,
    pub tick_size: f64,
    pub lot_size: f64,
    pub max_order_notional: f64,
    pub max_position: f64,
    #[serde(default = "default_hedge_ratio")]
    pub hedge_ratio: f64,
    #[serde(default)]
    pub basis_capture: bool,
    #[serde(default)]
    pub max_cancels_per_minute: Option<u32>,
    #[serde(default = "default_post_only")]
    pub post_only: bool,
    #[serde(default)]
    pub maker_fee_bps: f64,
    #[serde(default = "default_taker_fee_bps")]
    pub taker_fee_bps: f64,
}

fn default_hedge_ratio() -> f64 {
    1.0
}

fn default_post_only() -> bool {
    true
}

fn default_taker_fee_bps() -> f64 {
    4.0
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RiskConfig {
    pub max_drawdown: f64,
    pub max_daily_loss: f64,
    pub max_inventory_notional: f64,
    #[serde(default = "default_kill_switch_threshold")]
    pub kill_switch_threshold: u32,
    #[serde(default)]
    pub max_orders: Option<u32>,
    #[serde(default)]
    pub account_notional_cap: Option<f64>,
    #[serde(default)]
    pub max_open_orders: Option<u32>,
}

fn default_kill_switch_threshold() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QuoteConfig {
    #[serde(default = "default_model")]
    pub model: String,
    pub gamma: f64,
    pub horizon_seconds: f64,
    pub kappa: f64,
    #[serde(default)]
    pub min_spread: f64,
    #[serde(default = "default_refresh_seconds")]
    pub refresh_seconds: f64,
    #[serde(default)]
    pub skew_alpha: f64,
}

fn default_model() -> String {
    "avellaneda_stoikov".to_string()
}

fn default_refresh_seconds() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InventoryConfig {
    #[serde(default)]
    pub target: f64,
    pub soft_limit: f64,
    pub hard_limit: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HedgeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_rebalance_threshold")]
    pub rebalance_threshold: f64,
    pub max_notional: f64,
    #[serde(default = "default_hedge_ratio")]
    pub hedge_ratio: f64,
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: f64,
    #[serde(default = "default_mode")]
    pub mode: String,
}

fn default_true() -> bool {
    true
}

fn default_rebalance_threshold() -> f64 {
    0.05
}

fn default_cooldown_seconds() -> f64 {
    5.0
}

fn default_mode() -> String {
    "perp".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BasisConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub max_notional: f64,
    #[serde(default)]
    pub target_notional: f64,
    #[serde(default)]
    pub funding_threshold: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    pub dsn: String,
}

fn default_storage_backend() -> String {
    "sqlite".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_host")]
    pub host: String,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_host() -> String {
    "0.0.0.0".to_string()
}

fn default_metrics_port() -> u16 {
    9001
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyConfig {
    pub symbols: Vec<SymbolConfig>,
    pub risk: RiskConfig,
    #[serde(default = "default_latency_budget_ms")]
    pub latency_budget_ms: u64,
    pub quote: QuoteConfig,
    pub inventory: InventoryConfig,
    pub hedge: HedgeConfig,
    pub basis: BasisConfig,
    pub venues_config: String,
    pub storage: StorageConfig,
    pub metrics: MetricsConfig,
    #[serde(skip)]
    pub base_path: PathBuf,
}

fn default_latency_budget_ms() -> u64 {
    500
}

impl StrategyConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading strategy config at {}", path.display()))?;
        let mut config: StrategyConfig = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing strategy config at {}", path.display()))?;
        config.base_path = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.inventory.hard_limit < self.inventory.soft_limit {
            bail!("inventory.hard_limit must be >= inventory.soft_limit");
        }
        for symbol in &self.symbols {
            if symbol.tick_size <= 0.0 {
                bail!("symbol {} tick_size must be > 0", symbol.name);
            }
            if symbol.lot_size <= 0.0 {
                bail!("symbol {} lot_size must be > 0", symbol.name);
            }
            if symbol.max_order_notional <= 0.0 {
                bail!("symbol {} max_order_notional must be > 0", symbol.name);
            }
            if symbol.max_position < 0.0 {
                bail!("symbol {} max_position must be >= 0", symbol.name);
            }
            if symbol.hedge_ratio < 0.0 {
                bail!("symbol {} hedge_ratio must be >= 0", symbol.name);
            }
        }

        if self.risk.max_drawdown <= 0.0 {
            bail!("risk.max_drawdown must be > 0");
        }
        if self.risk.max_daily_loss <= 0.0 {
            bail!("risk.max_daily_loss must be > 0");
        }
        if self.risk.max_inventory_notional <= 0.0 {
            bail!("risk.max_inventory_notional must be > 0");
        }
        if self.risk.kill_switch_threshold == 0 {
            bail!("risk.kill_switch_threshold must be >= 1");
        }
        if let Some(cap) = self.risk.account_notional_cap {
            if cap <= 0.0 {
                bail!("risk.account_notional_cap must be > 0");
            }
        }

        if self.quote.gamma <= 0.0 {
            bail!("quote.gamma must be > 0");
        }
        if self.quote.horizon_seconds <= 0.0 {
            bail!("quote.horizon_seconds must be > 0");
        }
        if self.quote.kappa <= 0.0 {
            bail!("quote.kappa must be > 0");
        }
        if self.quote.min_spread < 0.0 {
            bail!("quote.min_spread must be >= 0");
        }
        if self.quote.refresh_seconds <= 0.0 {
            bail!("quote.refresh_seconds must be > 0");
        }

        if self.inventory.soft_limit < 0.0 {
            bail!("inventory.soft_limit must be >= 0");
        }
        if self.inventory.hard_limit < 0.0 {
            bail!("inventory.hard_limit must be >= 0");
        }

        if self.hedge.rebalance_threshold < 0.0 {
            bail!("hedge.rebalance_threshold must be >= 0");
        }
        if self.hedge.max_notional <= 0.0 {
            bail!("hedge.max_notional must be > 0");
        }
        if self.hedge.cooldown_seconds <= 0.0 {
            bail!("hedge.cooldown_seconds must be > 0");
        }
        if self.hedge.hedge_ratio < 0.0 {
            bail!("hedge.hedge_ratio must be >= 0");
        }

        if self.basis.max_notional < 0.0 {
            bail!("basis.max_notional must be >= 0");
        }
        if self.basis.target_notional < 0.0 {
            bail!("basis.target_notional must be >= 0");
        }
        if self.basis.funding_threshold < 0.0 {
            bail!("basis.funding_threshold must be >= 0");
        }

        if self.metrics.port == 0 {
            bail!("metrics.port must be >= 1");
        }

        Ok(())
    }

    pub fn venues_path(&self) -> PathBuf {
        let configured = PathBuf::from(&self.venues_config);
        if configured.is_absolute() {
            configured
        } else {
            self.base_path.join(configured)
        }
    }

    pub fn load_venues(&self) -> Result<Venues> {
        Venues::load(self.venues_path())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VenueRateLimit {
    #[serde(rename = "type")]
    pub kind: String,
    pub limit: u32,
    pub interval: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VenueConfig {
    pub rest_base: String,
    pub ws_public: String,
    #[serde(default)]
    pub ws_private: Option<String>,
    #[serde(default)]
    pub rate_limits: Vec<VenueRateLimit>,
    #[serde(default)]
    pub has_paper: bool,
    #[serde(default)]
    pub funding_endpoint: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Venues(pub HashMap<String, VenueConfig>);

impl Venues {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading venues config at {}", path.display()))?;
        let map: HashMap<String, VenueConfig> = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing venues config at {}", path.display()))?;
        Ok(Venues(map))
    }

    pub fn get(&self, venue: &str) -> Result<&VenueConfig> {
        self.0
            .get(venue)
            .with_context(|| format!("unknown venue: {venue}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
symbols:
  - name: BTC-PERP
    venue: kucoin
    tick_size: 0.1
    lot_size: 0.01
    max_order_notional: 1000.0
    max_position: 1.0
risk:
  max_drawdown: 100.0
  max_daily_loss: 200.0
  max_inventory_notional: 5000.0
quote:
  gamma: 0.1
  horizon_seconds: 10.0
  kappa: 1.0
inventory:
  soft_limit: 0.5
  hard_limit: 1.0
hedge:
  max_notional: 1000.0
basis: {}
venues_config: venues.yaml
storage:
  dsn: "sqlite:///./mm-bot.db"
metrics: {}
"#;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("default.yaml");
        std::fs::write(&config_path, SAMPLE).unwrap();
        let config = StrategyConfig::load(&config_path).unwrap();
        assert_eq!(config.symbols.len(), 1);
        assert_eq!(config.metrics.port, 9001);
        assert_eq!(config.hedge.cooldown_seconds, 5.0);
        assert_eq!(config.quote.refresh_seconds, 1.0);
    }

    #[test]
    fn rejects_hard_limit_below_soft_limit() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("default.yaml");
        let bad = SAMPLE.replace("hard_limit: 1.0", "hard_limit: 0.1");
        std::fs::write(&config_path, bad).unwrap();
        assert!(StrategyConfig::load(&config_path).is_err());
    }

    #[test]
    fn venues_path_resolves_relative_to_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("default.yaml");
        std::fs::write(&config_path, SAMPLE).unwrap();
        let config = StrategyConfig::load(&config_path).unwrap();
        assert_eq!(config.venues_path(), dir.path().join("venues.yaml"));
    }

    #[test]
    fn unknown_venue_errors() {
        let venues = Venues::default();
        assert!(venues.get("binance").is_err());
    }

    #[test]
    fn rejects_non_positive_gamma() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("default.yaml");
        let bad = SAMPLE.replace("gamma: 0.1", "gamma: -5.0");
        std::fs::write(&config_path, bad).unwrap();
        assert!(StrategyConfig::load(&config_path).is_err());
    }

    #[test]
    fn rejects_non_positive_max_drawdown() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("default.yaml");
        let bad = SAMPLE.replace("max_drawdown: 100.0", "max_drawdown: -100.0");
        std::fs::write(&config_path, bad).unwrap();
        assert!(StrategyConfig::load(&config_path).is_err());
    }
}
