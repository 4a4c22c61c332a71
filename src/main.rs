mod async_log;
mod balance;
mod bundle;
mod coin_data;
mod config;
mod swap;
mod trade;

use std::{env, sync::Arc, time::Duration};

use log::{info, warn};
use solana_client::nonblocking::rpc_client::RpcClient;

use crate::{
    balance::SellSize,
    bundle::BundleClient,
    config::Config,
    trade::{CancelToken, Confirmation, TradeOutcome, Trader},
};

const CONFIRM_TIMEOUT: Duration = Duration::from_secs(30);

const USAGE: &str = "\
usage:
  pump-trader buy <MINT> [--sol <AMOUNT>]
  pump-trader sell <MINT> [--pct <PERCENT> | --amount <TOKENS>] [--keep-open]

sell defaults to the full balance and closes the token account afterwards;
pass --keep-open to leave it funded with rent.";

#[derive(Debug, PartialEq)]
enum Command {
    Buy {
        mint: String,
        sol_in: Option<f64>,
    },
    Sell {
        mint: String,
        size: SellSize,
        keep_open: bool,
    },
}

fn parse_command(args: &[String]) -> Result<Command, String> {
    let mut iter = args.iter();
    let action = iter.next().ok_or("missing command")?;
    let mint = iter
        .next()
        .ok_or("missing mint address")?
        .clone();

    match action.as_str() {
        "buy" => {
            let mut sol_in = None;
            while let Some(flag) = iter.next() {
                match flag.as_str() {
                    "--sol" => {
                        let raw = iter.next().ok_or("--sol requires a value")?;
                        let value = raw
                            .parse::<f64>()
                            .map_err(|_| format!("invalid SOL amount: {raw}"))?;
                        if value <= 0.0 {
                            return Err(format!("SOL amount must be positive: {raw}"));
                        }
                        sol_in = Some(value);
                    }
                    other => return Err(format!("unknown flag for buy: {other}")),
                }
            }
            Ok(Command::Buy { mint, sol_in })
        }
        "sell" => {
            let mut size = SellSize::All;
            let mut keep_open = false;
            let mut size_set = false;
            while let Some(flag) = iter.next() {
                match flag.as_str() {
                    "--pct" => {
                        let raw = iter.next().ok_or("--pct requires a value")?;
                        let value = raw
                            .parse::<f64>()
                            .map_err(|_| format!("invalid percentage: {raw}"))?;
                        if value <= 0.0 || value > 100.0 {
                            return Err(format!("percentage must be in (0, 100]: {raw}"));
                        }
                        if size_set {
                            return Err("--pct and --amount are mutually exclusive".into());
                        }
                        size = SellSize::Percentage(value);
                        size_set = true;
                    }
                    "--amount" => {
                        let raw = iter.next().ok_or("--amount requires a value")?;
                        let value = raw
                            .parse::<f64>()
                            .map_err(|_| format!("invalid token amount: {raw}"))?;
                        if value <= 0.0 {
                            return Err(format!("token amount must be positive: {raw}"));
                        }
                        if size_set {
                            return Err("--pct and --amount are mutually exclusive".into());
                        }
                        size = SellSize::Exact(value);
                        size_set = true;
                    }
                    "--keep-open" => keep_open = true,
                    other => return Err(format!("unknown flag for sell: {other}")),
                }
            }
            Ok(Command::Sell {
                mint,
                size,
                keep_open,
            })
        }
        other => Err(format!("unknown command: {other}")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env::set_var(
        env_logger::DEFAULT_FILTER_ENV,
        env::var_os(env_logger::DEFAULT_FILTER_ENV).unwrap_or_else(|| "info".into()),
    );
    env_logger::init();
    let _async_logger = async_log::init_async_logger();

    let args: Vec<String> = env::args().skip(1).collect();
    let command = match parse_command(&args) {
        Ok(command) => command,
        Err(err) => {
            eprintln!("error: {err}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    let config = Config::load()?;
    let rpc = Arc::new(RpcClient::new(config.rpc_url.clone()));
    let bundle = BundleClient::new(config.block_engine_url.clone());
    let trader = Trader::new(config.operator_keypair(), Arc::clone(&rpc), bundle);

    log_startup_summary(&config, &rpc).await;

    let cancel = CancelToken::new();
    let outcome = match &command {
        Command::Buy { mint, sol_in } => {
            let mut params = config.buy_params();
            if let Some(sol) = sol_in {
                params.sol_in = *sol;
            }
            trader.buy(mint, &params, &cancel).await?
        }
        Command::Sell {
            mint,
            size,
            keep_open,
        } => {
            let params = config.sell_params(*size, !keep_open);
            trader.sell(mint, &params, &cancel).await?
        }
    };

    match outcome {
        TradeOutcome::NothingToSell => {
            info!("No holdings to sell; nothing submitted");
        }
        TradeOutcome::Submitted {
            signature,
            bundle_id,
        } => {
            info!(
                "Bundle accepted | signature={} | bundle_id={}",
                signature,
                bundle_id.as_deref().unwrap_or("<none>")
            );
            match trader.confirm_signature(&signature, CONFIRM_TIMEOUT).await? {
                Confirmation::Confirmed => info!("Transaction {} confirmed", signature),
                Confirmation::Rejected => {
                    anyhow::bail!("transaction {} failed on chain", signature)
                }
                Confirmation::TimedOut => {
                    anyhow::bail!(
                        "transaction {} not confirmed within {:?}; blockhash likely expired",
                        signature,
                        CONFIRM_TIMEOUT
                    )
                }
            }
        }
    }

    Ok(())
}

async fn log_startup_summary(config: &Config, rpc: &RpcClient) {
    let operator = config.operator_pubkey();
    let balance_lamports = match rpc.get_balance(&operator).await {
        Ok(value) => value,
        Err(err) => {
            warn!("Failed to fetch operator SOL balance: {err}");
            0
        }
    };
    let balance_sol = balance_lamports as f64 / 1_000_000_000.0;

    info!(
        "Startup | operator={} | sol={:.4} | buy_sol={:.4} | buy_slip={:.1}% | sell_slip={:.1}% | tip={:.6}",
        operator,
        balance_sol,
        config.buy_amount_sol,
        config.buy_slippage_pct,
        config.sell_slippage_pct,
        config.tip_sol,
    );
    info!(
        "Endpoints | rpc={} | block_engine={}",
        config.rpc_url, config.block_engine_url
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn buy_with_override() {
        let cmd = parse_command(&args(&["buy", "MINT", "--sol", "0.5"])).unwrap();
        assert_eq!(
            cmd,
            Command::Buy {
                mint: "MINT".into(),
                sol_in: Some(0.5)
            }
        );
    }

    #[test]
    fn sell_defaults_to_everything_and_closes() {
        let cmd = parse_command(&args(&["sell", "MINT"])).unwrap();
        assert_eq!(
            cmd,
            Command::Sell {
                mint: "MINT".into(),
                size: SellSize::All,
                keep_open: false
            }
        );
    }

    #[test]
    fn sell_percentage_keep_open() {
        let cmd = parse_command(&args(&["sell", "MINT", "--pct", "25", "--keep-open"])).unwrap();
        assert_eq!(
            cmd,
            Command::Sell {
                mint: "MINT".into(),
                size: SellSize::Percentage(25.0),
                keep_open: true
            }
        );
    }

    #[test]
    fn conflicting_size_flags_are_rejected() {
        assert!(parse_command(&args(&["sell", "MINT", "--pct", "25", "--amount", "10"])).is_err());
        assert!(parse_command(&args(&["sell", "MINT", "--pct", "0"])).is_err());
        assert!(parse_command(&args(&["sell", "MINT", "--pct", "150"])).is_err());
        assert!(parse_command(&args(&["buy"])).is_err());
        assert!(parse_command(&args(&["hold", "MINT"])).is_err());
    }
}
