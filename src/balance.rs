//! Sell sizing.
//!
//! A sell request is either an explicit UI amount, a percentage of holdings,
//! or everything. `resolve_sell_amount` turns that into a concrete amount in
//! one place; an empty wallet resolves to a benign no-op, not an error.

use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    commitment_config::CommitmentConfig, program_pack::Pack, pubkey::Pubkey,
};
use spl_associated_token_account::get_associated_token_address;
use thiserror::Error;

use crate::swap::constants::TOKEN_DECIMALS;

/// How much to sell, before the wallet has been consulted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SellSize {
    /// Explicit UI amount; holdings are not queried.
    Exact(f64),
    /// Percentage of current holdings.
    Percentage(f64),
    All,
}

#[derive(Debug, Error)]
pub enum BalanceError {
    #[error("token account {0} is not a valid SPL token account")]
    BadAccount(Pubkey),
    #[error("rpc error: {0}")]
    Rpc(#[from] solana_client::client_error::ClientError),
}

/// Current holdings for `owner`'s associated token account, in UI units.
/// A missing account means the wallet never held the token: `None`.
pub async fn token_balance(
    rpc: &RpcClient,
    owner: &Pubkey,
    mint: &Pubkey,
) -> Result<Option<f64>, BalanceError> {
    let token_account = get_associated_token_address(owner, mint);
    let account = rpc
        .get_account_with_commitment(&token_account, CommitmentConfig::processed())
        .await?
        .value;

    match account {
        None => Ok(None),
        Some(account) => {
            let state = spl_token::state::Account::unpack(&account.data)
                .map_err(|_| BalanceError::BadAccount(token_account))?;
            Ok(Some(state.amount as f64 / TOKEN_DECIMALS as f64))
        }
    }
}

/// Resolve the concrete UI amount to sell, or `None` when there is nothing
/// to do. Percentages are floored; a full-balance sell takes the balance
/// verbatim.
pub fn resolve_sell_amount(size: SellSize, balance: Option<f64>) -> Option<f64> {
    match size {
        SellSize::Exact(amount) => {
            if amount > 0.0 {
                Some(amount)
            } else {
                None
            }
        }
        SellSize::Percentage(pct) => {
            let balance = balance.unwrap_or(0.0);
            if balance <= 0.0 {
                return None;
            }
            let amount = (balance * pct / 100.0).floor();
            if amount > 0.0 {
                Some(amount)
            } else {
                None
            }
        }
        SellSize::All => match balance {
            Some(balance) if balance > 0.0 => Some(balance),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_size_hint_sells_full_balance() {
        assert_eq!(resolve_sell_amount(SellSize::All, Some(1000.0)), Some(1000.0));
    }

    #[test]
    fn percentage_is_floored() {
        assert_eq!(
            resolve_sell_amount(SellSize::Percentage(10.0), Some(1000.0)),
            Some(100.0)
        );
        assert_eq!(
            resolve_sell_amount(SellSize::Percentage(0.001), Some(1000.0)),
            None
        );
    }

    #[test]
    fn empty_wallet_is_a_noop() {
        assert_eq!(resolve_sell_amount(SellSize::All, Some(0.0)), None);
        assert_eq!(resolve_sell_amount(SellSize::All, None), None);
        assert_eq!(resolve_sell_amount(SellSize::Percentage(50.0), None), None);
    }

    #[test]
    fn exact_amount_ignores_balance() {
        assert_eq!(
            resolve_sell_amount(SellSize::Exact(42.0), Some(1.0)),
            Some(42.0)
        );
        assert_eq!(resolve_sell_amount(SellSize::Exact(42.0), None), Some(42.0));
        assert_eq!(resolve_sell_amount(SellSize::Exact(0.0), Some(1000.0)), None);
    }
}
