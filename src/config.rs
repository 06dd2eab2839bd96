use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

use crate::money::DEFAULT_MONEY_SCALE;
use crate::slot::{PaytableError, ScatterRule, SymbolEntry, SymbolTable};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// PostgreSQL connection for users, balance records and orders
    #[serde(default)]
    pub postgres: Option<DatabaseConfig>,
    #[serde(default)]
    pub engine: EngineConfig,
    /// Overrides the built-in paytable when present
    #[serde(default)]
    pub paytable: Option<Vec<SymbolEntry>>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    50
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

/// Settlement engine policy
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    /// Order number prefix, e.g. "SLOT"
    pub order_prefix: String,
    /// Snowflake machine id, unique per engine instance
    pub machine_id: u8,
    /// Operator name written to balance records
    pub operator: String,
    /// Extra attempts after a transaction conflict
    pub max_conflict_retries: u32,
    /// Per-attempt timeout; 0 disables
    pub settle_timeout_ms: u64,
    /// Record business rejections as FAILED orders
    pub persist_failed_orders: bool,
    /// Max fractional digits of a bet
    pub money_scale: u32,
    /// Board-wide counts that trigger a scatter win
    pub scatter_thresholds: Vec<u8>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            order_prefix: "SLOT".to_string(),
            machine_id: 1,
            operator: "slot-engine".to_string(),
            max_conflict_retries: 3,
            settle_timeout_ms: 5_000,
            persist_failed_orders: false,
            money_scale: DEFAULT_MONEY_SCALE,
            scatter_thresholds: vec![5],
        }
    }
}

impl EngineConfig {
    pub fn scatter_rule(&self) -> ScatterRule {
        ScatterRule::new(self.scatter_thresholds.iter().copied())
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", config_path))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Build the symbol table, failing fast on an invalid paytable
    pub fn symbol_table(&self) -> Result<SymbolTable, PaytableError> {
        let table = match &self.paytable {
            Some(rows) => SymbolTable::new(rows.clone())?,
            None => SymbolTable::standard(),
        };
        table.check_money_scale(self.engine.money_scale)?;
        Ok(table)
    }
}
