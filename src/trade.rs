//! Trade pipeline: quote, build, sign, submit.
//!
//! One trade is a strict sequence. Reserve state and holdings are fetched
//! first, the instruction list is finalized, and only then is the blockhash
//! pulled so it is as fresh as possible at signing time. A signed transaction
//! is bound to that blockhash; any retry restarts from the quote, never from
//! the signed blob. Concurrent trades on different mints are independent;
//! serializing trades that touch the same token account is the caller's job.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use log::info;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    commitment_config::CommitmentConfig,
    compute_budget::ComputeBudgetInstruction,
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    system_instruction,
    transaction::Transaction,
};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account,
};
use thiserror::Error;
use tokio::time::{sleep, Instant};

use crate::{
    balance::{resolve_sell_amount, token_balance, BalanceError, SellSize},
    bundle::{BundleClient, SubmitError},
    coin_data::{fetch_coin_data, CoinData, CoinDataError},
    info_async,
    swap::{
        constants::random_tip_account,
        math::{compute_buy, compute_sell, SwapMathError},
        pump::{build_swap_instruction, CurveOp, InstructionError, SwapAccounts},
    },
    warn_async,
};

const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TradeStage {
    Quoting,
    Building,
    Signing,
    Submitting,
}

impl fmt::Display for TradeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TradeStage::Quoting => "quoting",
            TradeStage::Building => "building",
            TradeStage::Signing => "signing",
            TradeStage::Submitting => "submitting",
        };
        f.write_str(name)
    }
}

/// Cooperative cancellation, checked at stage boundaries. An abandoned trade
/// never signs or submits.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BuyParams {
    pub sol_in: f64,
    pub slippage_pct: f64,
    pub cu_limit: u32,
    pub cu_price_micro_lamports: u64,
    pub tip_lamports: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct SellParams {
    pub size: SellSize,
    pub slippage_pct: f64,
    pub cu_limit: u32,
    pub cu_price_micro_lamports: u64,
    pub tip_lamports: u64,
    pub close_token_account: bool,
}

/// Definitive per-trade result. An empty wallet on sell is a successful
/// no-op, not a failure.
#[derive(Clone, Debug)]
pub enum TradeOutcome {
    Submitted {
        signature: Signature,
        bundle_id: Option<String>,
    },
    NothingToSell,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Rejected,
    TimedOut,
}

#[derive(Debug, Error)]
pub enum TradeError {
    #[error(transparent)]
    CoinData(#[from] CoinDataError),
    #[error(transparent)]
    Math(#[from] SwapMathError),
    #[error(transparent)]
    Instruction(#[from] InstructionError),
    #[error(transparent)]
    Balance(#[from] BalanceError),
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error("token program error: {0}")]
    Token(#[from] solana_sdk::program_error::ProgramError),
    #[error("rpc error: {0}")]
    Rpc(#[from] solana_client::client_error::ClientError),
    #[error("bonding curve for {0} is complete; token has migrated off the curve")]
    CurveComplete(Pubkey),
    #[error("trade cancelled at the {0} stage")]
    Cancelled(TradeStage),
}

/// Everything a trade needs, injected once at startup: the signing key, the
/// RPC connection, and the relay client. No hidden globals.
pub struct Trader {
    signer: Arc<Keypair>,
    rpc: Arc<RpcClient>,
    bundle: BundleClient,
}

impl Trader {
    pub fn new(signer: Arc<Keypair>, rpc: Arc<RpcClient>, bundle: BundleClient) -> Self {
        Self {
            signer,
            rpc,
            bundle,
        }
    }

    pub fn signer_pubkey(&self) -> Pubkey {
        self.signer.pubkey()
    }

    /// Buy `params.sol_in` SOL worth of `mint_str` off its bonding curve.
    pub async fn buy(
        &self,
        mint_str: &str,
        params: &BuyParams,
        cancel: &CancelToken,
    ) -> Result<TradeOutcome, TradeError> {
        ensure_active(cancel, TradeStage::Quoting)?;
        let coin = fetch_coin_data(&self.rpc, mint_str).await?;
        guard_curve(&coin)?;

        let plan = compute_buy(
            params.sol_in,
            coin.virtual_sol_reserves,
            coin.virtual_token_reserves,
            params.slippage_pct,
        )?;
        info!(
            "Buy quote | mint={} tokens={} max_sol_cost={} slippage={}%",
            coin.mint, plan.token_amount, plan.max_sol_cost, params.slippage_pct
        );

        ensure_active(cancel, TradeStage::Building)?;
        let owner = self.signer.pubkey();
        let token_account = get_associated_token_address(&owner, &coin.mint);

        // A failed lookup aborts the trade; only a definitively absent
        // account gets a create instruction.
        let create_ix = if self.account_exists(&token_account).await? {
            None
        } else {
            Some(create_associated_token_account(
                &owner,
                &owner,
                &coin.mint,
                &spl_token::id(),
            ))
        };

        let swap_ix = build_swap_instruction(
            CurveOp::Buy,
            &swap_accounts(&coin, token_account, owner),
            plan.token_amount,
            plan.max_sol_cost,
        )?;

        let instructions = assemble_instructions(
            params.cu_price_micro_lamports,
            params.cu_limit,
            create_ix,
            swap_ix,
            None,
            &owner,
            params.tip_lamports,
        );

        self.sign_and_submit(instructions, cancel).await
    }

    /// Sell `mint_str` holdings according to the sizing rule in `params`.
    pub async fn sell(
        &self,
        mint_str: &str,
        params: &SellParams,
        cancel: &CancelToken,
    ) -> Result<TradeOutcome, TradeError> {
        ensure_active(cancel, TradeStage::Quoting)?;
        let coin = fetch_coin_data(&self.rpc, mint_str).await?;
        guard_curve(&coin)?;

        let owner = self.signer.pubkey();
        let held = match params.size {
            SellSize::Exact(_) => None,
            _ => token_balance(&self.rpc, &owner, &coin.mint).await?,
        };
        let amount_ui = match resolve_sell_amount(params.size, held) {
            Some(amount) => amount,
            None => {
                info!("Nothing to sell for mint {}; treating as success", coin.mint);
                return Ok(TradeOutcome::NothingToSell);
            }
        };

        let plan = compute_sell(
            amount_ui,
            coin.virtual_sol_reserves,
            coin.virtual_token_reserves,
            params.slippage_pct,
        )?;
        info!(
            "Sell quote | mint={} amount={} min_sol_output={} slippage={}%",
            coin.mint, plan.token_amount, plan.min_sol_output, params.slippage_pct
        );

        ensure_active(cancel, TradeStage::Building)?;
        let token_account = get_associated_token_address(&owner, &coin.mint);
        let swap_ix = build_swap_instruction(
            CurveOp::Sell,
            &swap_accounts(&coin, token_account, owner),
            plan.token_amount,
            plan.min_sol_output,
        )?;

        let close_ix = if params.close_token_account {
            Some(spl_token::instruction::close_account(
                &spl_token::id(),
                &token_account,
                &owner,
                &owner,
                &[&owner],
            )?)
        } else {
            None
        };

        let instructions = assemble_instructions(
            params.cu_price_micro_lamports,
            params.cu_limit,
            None,
            swap_ix,
            close_ix,
            &owner,
            params.tip_lamports,
        );

        self.sign_and_submit(instructions, cancel).await
    }

    /// Poll the signature until the network confirms or rejects it, or the
    /// deadline passes. A stale blockhash shows up here as `TimedOut`.
    pub async fn confirm_signature(
        &self,
        signature: &Signature,
        timeout: Duration,
    ) -> Result<Confirmation, TradeError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.rpc.get_signature_status(signature).await? {
                Some(Ok(())) => return Ok(Confirmation::Confirmed),
                Some(Err(err)) => {
                    warn_async!("Transaction {} failed on chain: {}", signature, err);
                    return Ok(Confirmation::Rejected);
                }
                None => {
                    if Instant::now() >= deadline {
                        return Ok(Confirmation::TimedOut);
                    }
                    sleep(CONFIRM_POLL_INTERVAL).await;
                }
            }
        }
    }

    async fn account_exists(
        &self,
        address: &Pubkey,
    ) -> Result<bool, solana_client::client_error::ClientError> {
        let response = self
            .rpc
            .get_account_with_commitment(address, CommitmentConfig::processed())
            .await?;
        Ok(response.value.is_some())
    }

    /// Fetch the blockhash last, sign once, hand the blob to the relay.
    /// Signed -> submitted is irreversible.
    async fn sign_and_submit(
        &self,
        instructions: Vec<Instruction>,
        cancel: &CancelToken,
    ) -> Result<TradeOutcome, TradeError> {
        ensure_active(cancel, TradeStage::Signing)?;
        let blockhash = self.rpc.get_latest_blockhash().await?;

        let owner = self.signer.pubkey();
        let tx = Transaction::new_signed_with_payer(
            &instructions,
            Some(&owner),
            &[self.signer.as_ref()],
            blockhash,
        );
        let signature = tx.signatures[0];

        ensure_active(cancel, TradeStage::Submitting)?;
        let receipt = self.bundle.send_bundle(&tx).await?;
        info_async!(
            "Submitted {} via {} ({} instructions)",
            signature,
            self.bundle.endpoint(),
            instructions.len()
        );

        Ok(TradeOutcome::Submitted {
            signature,
            bundle_id: receipt.bundle_id,
        })
    }
}

fn ensure_active(cancel: &CancelToken, stage: TradeStage) -> Result<(), TradeError> {
    if cancel.is_cancelled() {
        return Err(TradeError::Cancelled(stage));
    }
    Ok(())
}

fn guard_curve(coin: &CoinData) -> Result<(), TradeError> {
    if coin.complete {
        return Err(TradeError::CurveComplete(coin.mint));
    }
    Ok(())
}

fn swap_accounts(coin: &CoinData, token_account: Pubkey, owner: Pubkey) -> SwapAccounts {
    SwapAccounts {
        mint: coin.mint,
        bonding_curve: coin.bonding_curve,
        associated_bonding_curve: coin.associated_bonding_curve,
        associated_user: token_account,
        user: owner,
    }
}

/// Fixed instruction order: compute unit price, compute unit limit, optional
/// account creation, the swap, optional account closure, then the tip. The
/// tip is skipped when zero.
fn assemble_instructions(
    cu_price_micro_lamports: u64,
    cu_limit: u32,
    create_ix: Option<Instruction>,
    swap_ix: Instruction,
    close_ix: Option<Instruction>,
    payer: &Pubkey,
    tip_lamports: u64,
) -> Vec<Instruction> {
    let has_tip = tip_lamports > 0;
    let capacity = 3
        + usize::from(create_ix.is_some())
        + usize::from(close_ix.is_some())
        + usize::from(has_tip);
    let mut instructions = Vec::with_capacity(capacity);

    instructions.push(ComputeBudgetInstruction::set_compute_unit_price(
        cu_price_micro_lamports,
    ));
    instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(cu_limit));
    if let Some(ix) = create_ix {
        instructions.push(ix);
    }
    instructions.push(swap_ix);
    if let Some(ix) = close_ix {
        instructions.push(ix);
    }
    if has_tip {
        instructions.push(system_instruction::transfer(
            payer,
            &random_tip_account(),
            tip_lamports,
        ));
    }

    instructions
}
