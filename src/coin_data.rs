//! Bonding curve lookup.
//!
//! The curve account for a mint lives at a program-derived address, so the
//! whole snapshot can be resolved from the mint alone: derive the PDA, fetch
//! the account, decode the reserve fields. Snapshots are never cached; the
//! reserves move every block.

use std::str::FromStr;

use borsh::BorshDeserialize;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey};
use spl_associated_token_account::get_associated_token_address;
use thiserror::Error;

use crate::swap::constants::{BONDING_CURVE_SEED, PUMP_FUN_PROGRAM};

/// Anchor account discriminator for `BondingCurve`.
const BONDING_CURVE_DISCRIMINATOR: [u8; 8] = [23, 183, 248, 55, 96, 216, 172, 96];

/// Immutable snapshot of a token's bonding curve state.
#[derive(Clone, Debug)]
pub struct CoinData {
    pub mint: Pubkey,
    pub bonding_curve: Pubkey,
    pub associated_bonding_curve: Pubkey,
    pub virtual_token_reserves: u64,
    pub virtual_sol_reserves: u64,
    pub real_token_reserves: u64,
    pub real_sol_reserves: u64,
    /// Set once the curve has migrated off Pump.fun; trading against it fails.
    pub complete: bool,
}

#[derive(Debug, Error)]
pub enum CoinDataError {
    #[error("invalid mint address {0}")]
    InvalidMint(String),
    #[error("no bonding curve account found for mint {0}")]
    NotFound(Pubkey),
    #[error("bonding curve account {0} has an unexpected layout")]
    BadLayout(Pubkey),
    #[error("rpc error: {0}")]
    Rpc(#[from] solana_client::client_error::ClientError),
}

/// On-chain layout of the curve account body, after the 8-byte discriminator.
/// Newer deployments append a creator pubkey; trailing bytes are ignored.
#[derive(BorshDeserialize)]
struct CurveState {
    virtual_token_reserves: u64,
    virtual_sol_reserves: u64,
    real_token_reserves: u64,
    real_sol_reserves: u64,
    #[allow(dead_code)]
    token_total_supply: u64,
    complete: bool,
}

pub fn derive_bonding_curve(mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[BONDING_CURVE_SEED, mint.as_ref()], &PUMP_FUN_PROGRAM).0
}

/// Resolve a mint string to its current curve snapshot.
pub async fn fetch_coin_data(rpc: &RpcClient, mint_str: &str) -> Result<CoinData, CoinDataError> {
    let mint = Pubkey::from_str(mint_str.trim())
        .map_err(|_| CoinDataError::InvalidMint(mint_str.to_owned()))?;

    let bonding_curve = derive_bonding_curve(&mint);
    let associated_bonding_curve = get_associated_token_address(&bonding_curve, &mint);

    let account = rpc
        .get_account_with_commitment(&bonding_curve, CommitmentConfig::processed())
        .await?
        .value
        .ok_or(CoinDataError::NotFound(bonding_curve))?;

    let state = parse_curve_account(&bonding_curve, &account.data)?;

    Ok(CoinData {
        mint,
        bonding_curve,
        associated_bonding_curve,
        virtual_token_reserves: state.virtual_token_reserves,
        virtual_sol_reserves: state.virtual_sol_reserves,
        real_token_reserves: state.real_token_reserves,
        real_sol_reserves: state.real_sol_reserves,
        complete: state.complete,
    })
}

fn parse_curve_account(address: &Pubkey, data: &[u8]) -> Result<CurveState, CoinDataError> {
    if data.len() < 8 || data[..8] != BONDING_CURVE_DISCRIMINATOR {
        return Err(CoinDataError::BadLayout(*address));
    }
    let mut body = &data[8..];
    CurveState::deserialize(&mut body).map_err(|_| CoinDataError::BadLayout(*address))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve_bytes(virtual_token: u64, virtual_sol: u64, complete: bool) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&BONDING_CURVE_DISCRIMINATOR);
        data.extend_from_slice(&virtual_token.to_le_bytes());
        data.extend_from_slice(&virtual_sol.to_le_bytes());
        data.extend_from_slice(&800_000_000_000u64.to_le_bytes()); // real token
        data.extend_from_slice(&5_000_000_000u64.to_le_bytes()); // real sol
        data.extend_from_slice(&1_000_000_000_000u64.to_le_bytes()); // supply
        data.push(complete as u8);
        data
    }

    #[test]
    fn derive_bonding_curve_is_deterministic() {
        let mint = Pubkey::new_unique();
        assert_eq!(derive_bonding_curve(&mint), derive_bonding_curve(&mint));
        assert_ne!(
            derive_bonding_curve(&mint),
            derive_bonding_curve(&Pubkey::new_unique())
        );
    }

    #[test]
    fn parse_curve_account_reads_reserves() {
        let address = Pubkey::new_unique();
        let data = curve_bytes(1_000_000_000_000, 30_000_000_000, false);
        let state = parse_curve_account(&address, &data).unwrap();
        assert_eq!(state.virtual_token_reserves, 1_000_000_000_000);
        assert_eq!(state.virtual_sol_reserves, 30_000_000_000);
        assert!(!state.complete);
    }

    #[test]
    fn parse_curve_account_tolerates_trailing_creator() {
        let address = Pubkey::new_unique();
        let mut data = curve_bytes(1, 2, true);
        data.extend_from_slice(Pubkey::new_unique().as_ref());
        let state = parse_curve_account(&address, &data).unwrap();
        assert!(state.complete);
    }

    #[test]
    fn parse_curve_account_rejects_wrong_discriminator() {
        let address = Pubkey::new_unique();
        let mut data = curve_bytes(1, 2, false);
        data[0] ^= 0xff;
        assert!(matches!(
            parse_curve_account(&address, &data),
            Err(CoinDataError::BadLayout(_))
        ));
    }

    #[test]
    fn parse_curve_account_rejects_truncated_data() {
        let address = Pubkey::new_unique();
        let data = &curve_bytes(1, 2, false)[..20];
        assert!(matches!(
            parse_curve_account(&address, data),
            Err(CoinDataError::BadLayout(_))
        ));
    }
}
