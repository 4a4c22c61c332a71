use std::{
    env,
    path::{Path, PathBuf},
    sync::Arc,
};

use base64::{engine::general_purpose, Engine as _};
use dotenvy::Error as DotenvError;
use serde::Deserialize;
use solana_sdk::{
    native_token::sol_to_lamports,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use thiserror::Error;

use crate::{
    balance::SellSize,
    swap::constants::DEFAULT_BLOCK_ENGINE_URL,
    trade::{BuyParams, SellParams},
};

const DEFAULT_BUY_AMOUNT_SOL: f64 = 0.01;
const DEFAULT_BUY_SLIPPAGE_PCT: f64 = 30.0;
const DEFAULT_SELL_SLIPPAGE_PCT: f64 = 50.0;
const DEFAULT_BUY_PRIORITY_FEE_SOL: f64 = 0.0001;
const DEFAULT_SELL_PRIORITY_FEE_SOL: f64 = 0.0001;
const DEFAULT_BUY_CU_LIMIT: u32 = 65_000;
const DEFAULT_SELL_CU_LIMIT: u32 = 50_000;
const DEFAULT_TIP_SOL: f64 = 0.000_05;

#[derive(Clone)]
pub struct Config {
    pub env_path: PathBuf,
    pub operator: Arc<Keypair>,
    pub rpc_url: String,
    pub block_engine_url: String,
    pub buy_amount_sol: f64,
    pub buy_slippage_pct: f64,
    pub sell_slippage_pct: f64,
    pub buy_priority_fee_sol: f64,
    pub sell_priority_fee_sol: f64,
    pub buy_cu_limit: u32,
    pub sell_cu_limit: u32,
    pub tip_sol: f64,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let env_path = env::current_dir()
            .map_err(|e| ConfigError::Io("current_dir".into(), e))?
            .join(".env");

        match dotenvy::from_path(&env_path) {
            Ok(_) => {}
            Err(DotenvError::LineParse(_, _)) | Err(DotenvError::Io(_)) if env_path.exists() => {
                return Err(ConfigError::Dotenv)
            }
            Err(_) => {
                return Err(ConfigError::MissingEnv(env_path));
            }
        }

        let raw = RawConfig::gather()?;

        let operator = Arc::new(parse_keypair(&raw.private_key)?);
        if raw.rpc_url.trim().is_empty() {
            return Err(ConfigError::MissingRpcUrl);
        }

        Ok(Self {
            env_path,
            operator,
            rpc_url: raw.rpc_url.trim().to_owned(),
            block_engine_url: raw
                .block_engine_url
                .unwrap_or_else(|| DEFAULT_BLOCK_ENGINE_URL.to_owned()),
            buy_amount_sol: raw.buy_amount_sol.unwrap_or(DEFAULT_BUY_AMOUNT_SOL),
            buy_slippage_pct: raw.buy_slippage_pct.unwrap_or(DEFAULT_BUY_SLIPPAGE_PCT),
            sell_slippage_pct: raw.sell_slippage_pct.unwrap_or(DEFAULT_SELL_SLIPPAGE_PCT),
            buy_priority_fee_sol: raw
                .buy_priority_fee_sol
                .unwrap_or(DEFAULT_BUY_PRIORITY_FEE_SOL),
            sell_priority_fee_sol: raw
                .sell_priority_fee_sol
                .unwrap_or(DEFAULT_SELL_PRIORITY_FEE_SOL),
            buy_cu_limit: raw.buy_cu_limit.unwrap_or(DEFAULT_BUY_CU_LIMIT),
            sell_cu_limit: raw.sell_cu_limit.unwrap_or(DEFAULT_SELL_CU_LIMIT),
            tip_sol: raw.tip_sol.unwrap_or(DEFAULT_TIP_SOL),
        })
    }

    pub fn operator_pubkey(&self) -> Pubkey {
        self.operator.pubkey()
    }

    pub fn operator_keypair(&self) -> Arc<Keypair> {
        Arc::clone(&self.operator)
    }

    pub fn tip_lamports(&self) -> u64 {
        sol_to_lamports(self.tip_sol.max(0.0))
    }

    pub fn buy_compute_unit_price_microlamports(&self) -> u64 {
        compute_unit_price_for_fee(self.buy_priority_fee_sol, self.buy_cu_limit)
    }

    pub fn sell_compute_unit_price_microlamports(&self) -> u64 {
        compute_unit_price_for_fee(self.sell_priority_fee_sol, self.sell_cu_limit)
    }

    pub fn buy_params(&self) -> BuyParams {
        BuyParams {
            sol_in: self.buy_amount_sol,
            slippage_pct: self.buy_slippage_pct,
            cu_limit: self.buy_cu_limit,
            cu_price_micro_lamports: self.buy_compute_unit_price_microlamports(),
            tip_lamports: self.tip_lamports(),
        }
    }

    pub fn sell_params(&self, size: SellSize, close_token_account: bool) -> SellParams {
        SellParams {
            size,
            slippage_pct: self.sell_slippage_pct,
            cu_limit: self.sell_cu_limit,
            cu_price_micro_lamports: self.sell_compute_unit_price_microlamports(),
            tip_lamports: self.tip_lamports(),
            close_token_account,
        }
    }
}

fn compute_unit_price_for_fee(fee: f64, cu_limit: u32) -> u64 {
    if cu_limit == 0 {
        return 0;
    }
    let micro_total = fee.max(0.0) * 1_000_000_000_000_000.0; // 1e15 microlamports
    (micro_total / cu_limit as f64)
        .max(0.0)
        .min(u64::MAX as f64) as u64
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(rename = "PRIVATE_KEY")]
    private_key: String,
    #[serde(rename = "RPC_URL")]
    rpc_url: String,
    #[serde(
        rename = "BLOCK_ENGINE_URL",
        default,
        deserialize_with = "de_optional_string"
    )]
    block_engine_url: Option<String>,
    #[serde(rename = "BUY_AMOUNT_SOL", default, deserialize_with = "de_optional_f64")]
    buy_amount_sol: Option<f64>,
    #[serde(
        rename = "BUY_SLIPPAGE_PCT",
        default,
        deserialize_with = "de_optional_f64"
    )]
    buy_slippage_pct: Option<f64>,
    #[serde(
        rename = "SELL_SLIPPAGE_PCT",
        default,
        deserialize_with = "de_optional_f64"
    )]
    sell_slippage_pct: Option<f64>,
    #[serde(
        rename = "BUY_PRIORITY_FEE_SOL",
        default,
        deserialize_with = "de_optional_f64"
    )]
    buy_priority_fee_sol: Option<f64>,
    #[serde(
        rename = "SELL_PRIORITY_FEE_SOL",
        default,
        deserialize_with = "de_optional_f64"
    )]
    sell_priority_fee_sol: Option<f64>,
    #[serde(rename = "BUY_CU_LIMIT", default, deserialize_with = "de_optional_u32")]
    buy_cu_limit: Option<u32>,
    #[serde(rename = "SELL_CU_LIMIT", default, deserialize_with = "de_optional_u32")]
    sell_cu_limit: Option<u32>,
    #[serde(rename = "TIP_SOL", default, deserialize_with = "de_optional_f64")]
    tip_sol: Option<f64>,
}

impl RawConfig {
    fn gather() -> Result<Self, ConfigError> {
        let mut data = std::collections::BTreeMap::new();
        for (key, value) in env::vars() {
            data.insert(key, value);
        }
        let json = serde_json::to_value(&data).map_err(|e| ConfigError::Serde(e.to_string()))?;
        serde_json::from_value(json).map_err(|e| ConfigError::Serde(e.to_string()))
    }
}

fn parse_keypair(encoded: &str) -> Result<Keypair, ConfigError> {
    let trimmed = encoded.trim();

    if let Ok(bytes) = bs58::decode(trimmed).into_vec() {
        if let Ok(kp) = Keypair::from_bytes(&bytes) {
            return Ok(kp);
        }
    }

    if let Ok(bytes) = general_purpose::STANDARD.decode(trimmed.as_bytes()) {
        if let Ok(kp) = Keypair::from_bytes(&bytes) {
            return Ok(kp);
        }
    }

    if trimmed.starts_with('[') {
        if let Ok(vec) = serde_json::from_str::<Vec<u8>>(trimmed) {
            if let Ok(kp) = Keypair::from_bytes(&vec) {
                return Ok(kp);
            }
        }
    }

    Err(ConfigError::InvalidPrivateKey)
}

fn de_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_owned())
        }
    }))
}

fn de_optional_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    opt.map(|raw| {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(serde::de::Error::custom("expected number"));
        }
        trimmed
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom("expected number"))
    })
    .transpose()
}

fn de_optional_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    opt.map(|raw| {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(serde::de::Error::custom("expected integer"));
        }
        trimmed
            .parse::<u32>()
            .map_err(|_| serde::de::Error::custom("expected integer"))
    })
    .transpose()
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine working directory for {0}")]
    Io(String, #[source] std::io::Error),
    #[error("missing .env at {0}")]
    MissingEnv(PathBuf),
    #[error("failed to parse .env file")]
    Dotenv,
    #[error("invalid private key")]
    InvalidPrivateKey,
    #[error("RPC_URL must be set")]
    MissingRpcUrl,
    #[error("serialization error: {0}")]
    Serde(String),
}

impl ConfigError {
    pub fn missing_env_path(&self) -> Option<&Path> {
        match self {
            ConfigError::MissingEnv(path) => Some(path.as_path()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> Config {
        Config {
            env_path: PathBuf::new(),
            operator: Arc::new(Keypair::new()),
            rpc_url: "http://localhost:8899".to_string(),
            block_engine_url: DEFAULT_BLOCK_ENGINE_URL.to_string(),
            buy_amount_sol: 0.01,
            buy_slippage_pct: 30.0,
            sell_slippage_pct: 50.0,
            buy_priority_fee_sol: 0.003,
            sell_priority_fee_sol: 0.004,
            buy_cu_limit: 65_000,
            sell_cu_limit: 50_000,
            tip_sol: 0.000_05,
        }
    }

    #[test]
    fn per_side_fee_helpers() {
        let config = sample_config();
        assert_eq!(
            config.buy_compute_unit_price_microlamports(),
            super::compute_unit_price_for_fee(0.003, 65_000)
        );
        assert_eq!(
            config.sell_compute_unit_price_microlamports(),
            super::compute_unit_price_for_fee(0.004, 50_000)
        );
        assert_eq!(config.tip_lamports(), sol_to_lamports(0.000_05));
    }

    #[test]
    fn fee_conversion_round_trips_through_cu_budget() {
        // fee_sol = cu_price_microlamports * cu_limit / 1e15
        let price = compute_unit_price_for_fee(0.0001, 100_000);
        assert_eq!(price, 1_000_000);
        assert_eq!(compute_unit_price_for_fee(0.0001, 0), 0);
        assert_eq!(compute_unit_price_for_fee(-1.0, 100_000), 0);
    }

    #[test]
    fn params_builders_carry_config_values() {
        let config = sample_config();
        let buy = config.buy_params();
        assert_eq!(buy.sol_in, 0.01);
        assert_eq!(buy.slippage_pct, 30.0);
        assert_eq!(buy.cu_limit, 65_000);

        let sell = config.sell_params(SellSize::Percentage(25.0), true);
        assert_eq!(sell.slippage_pct, 50.0);
        assert_eq!(sell.cu_limit, 50_000);
        assert!(sell.close_token_account);
        assert_eq!(sell.size, SellSize::Percentage(25.0));
    }

    #[test]
    fn keypair_parses_bs58_and_json_array() {
        let kp = Keypair::new();
        let bs58_encoded = bs58::encode(kp.to_bytes()).into_string();
        assert_eq!(
            parse_keypair(&bs58_encoded).unwrap().pubkey(),
            kp.pubkey()
        );

        let json_encoded = serde_json::to_string(&kp.to_bytes().to_vec()).unwrap();
        assert_eq!(
            parse_keypair(&json_encoded).unwrap().pubkey(),
            kp.pubkey()
        );

        assert!(parse_keypair("not a key").is_err());
    }
}
