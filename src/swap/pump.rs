//! Pump.fun swap instruction builder.
//!
//! The account list and byte layout are a fixed contract with the on-chain
//! program: 8-byte Anchor discriminator, then two little-endian u64s
//! (amount, limit). Any deviation in account order or writability makes the
//! program reject the instruction, so both variants are pinned by a schema
//! that is checked in debug builds and exercised by the tests.

use borsh::{self, BorshDeserialize, BorshSerialize};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_program, sysvar,
};
use std::io;
use thiserror::Error;

use super::constants::{EVENT_AUTHORITY, FEE_RECIPIENT, GLOBAL, PUMP_FUN_PROGRAM};

/// Anchor instruction discriminators for the Pump.fun program.
pub mod discriminators {
    /// hex 66063d1201daebea
    pub const BUY: [u8; 8] = [102, 6, 61, 18, 1, 218, 235, 234];
    /// hex 33e685a4017f83ad
    pub const SELL: [u8; 8] = [51, 230, 133, 164, 1, 127, 131, 173];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CurveOp {
    Buy,
    Sell,
}

/// Per-trade accounts; the global/fee/program accounts are fixed constants.
#[derive(Clone, Debug)]
pub struct SwapAccounts {
    pub mint: Pubkey,
    pub bonding_curve: Pubkey,
    pub associated_bonding_curve: Pubkey,
    pub associated_user: Pubkey,
    pub user: Pubkey,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct BuyArgs {
    amount: u64,
    max_sol_cost: u64,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct SellArgs {
    amount: u64,
    min_sol_output: u64,
}

#[derive(Debug, Error)]
pub enum InstructionError {
    #[error("swap amount is zero")]
    ZeroAmount,
    #[error("account list does not match the {op:?} schema at position {position}")]
    SchemaMismatch { op: CurveOp, position: usize },
    #[error(transparent)]
    Serialization(#[from] io::Error),
}

/// Build the swap instruction for either direction.
///
/// `limit` is `max_sol_cost` for a buy and `min_sol_output` for a sell; both
/// are packed as little-endian u64 after the amount.
pub fn build_swap_instruction(
    op: CurveOp,
    accounts: &SwapAccounts,
    amount: u64,
    limit: u64,
) -> Result<Instruction, InstructionError> {
    if amount == 0 {
        return Err(InstructionError::ZeroAmount);
    }

    let mut data = Vec::with_capacity(24);
    match op {
        CurveOp::Buy => {
            data.extend_from_slice(&discriminators::BUY);
            data.extend(borsh::to_vec(&BuyArgs {
                amount,
                max_sol_cost: limit,
            })?);
        }
        CurveOp::Sell => {
            data.extend_from_slice(&discriminators::SELL);
            data.extend(borsh::to_vec(&SellArgs {
                amount,
                min_sol_output: limit,
            })?);
        }
    }

    let metas = swap_account_metas(op, accounts);
    debug_assert!(validate_account_schema(op, &metas).is_ok());

    Ok(Instruction {
        program_id: PUMP_FUN_PROGRAM,
        accounts: metas,
        data,
    })
}

/// One builder for both variants; the two lists differ only in the slot
/// between the system program and the event authority (rent sysvar on buy,
/// associated-token program + token program order on sell).
fn swap_account_metas(op: CurveOp, accounts: &SwapAccounts) -> Vec<AccountMeta> {
    let mut metas = Vec::with_capacity(12);
    metas.push(AccountMeta::new_readonly(GLOBAL, false));
    metas.push(AccountMeta::new(FEE_RECIPIENT, false));
    metas.push(AccountMeta::new_readonly(accounts.mint, false));
    metas.push(AccountMeta::new(accounts.bonding_curve, false));
    metas.push(AccountMeta::new(accounts.associated_bonding_curve, false));
    metas.push(AccountMeta::new(accounts.associated_user, false));
    metas.push(AccountMeta::new(accounts.user, true));
    metas.push(AccountMeta::new_readonly(system_program::id(), false));
    match op {
        CurveOp::Buy => {
            metas.push(AccountMeta::new_readonly(spl_token::id(), false));
            metas.push(AccountMeta::new_readonly(sysvar::rent::id(), false));
        }
        CurveOp::Sell => {
            metas.push(AccountMeta::new_readonly(
                spl_associated_token_account::id(),
                false,
            ));
            metas.push(AccountMeta::new_readonly(spl_token::id(), false));
        }
    }
    metas.push(AccountMeta::new_readonly(EVENT_AUTHORITY, false));
    metas.push(AccountMeta::new_readonly(PUMP_FUN_PROGRAM, false));
    metas
}

/// (is_signer, is_writable) per position, in program order.
const ACCOUNT_SCHEMA: [(bool, bool); 12] = [
    (false, false), // global
    (false, true),  // fee recipient
    (false, false), // mint
    (false, true),  // bonding curve
    (false, true),  // curve token account
    (false, true),  // user token account
    (true, true),   // user
    (false, false), // system program
    (false, false), // token program / associated token program
    (false, false), // rent / token program
    (false, false), // event authority
    (false, false), // program id
];

pub fn validate_account_schema(
    op: CurveOp,
    metas: &[AccountMeta],
) -> Result<(), InstructionError> {
    if metas.len() != ACCOUNT_SCHEMA.len() {
        return Err(InstructionError::SchemaMismatch {
            op,
            position: metas.len().min(ACCOUNT_SCHEMA.len()),
        });
    }
    for (position, (meta, (is_signer, is_writable))) in
        metas.iter().zip(ACCOUNT_SCHEMA.iter()).enumerate()
    {
        if meta.is_signer != *is_signer || meta.is_writable != *is_writable {
            return Err(InstructionError::SchemaMismatch { op, position });
        }
    }
    Ok(())
}
