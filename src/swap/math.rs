//! Bonding curve pricing.
//!
//! Pure functions only; the curve snapshot is fetched by the caller. Amounts
//! that end up packed into instruction data are always truncated toward zero,
//! never rounded, so the on-chain limits are respected.

use thiserror::Error;

use super::constants::{LAMPORTS_PER_SOL, TOKEN_DECIMALS};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SwapMathError {
    #[error("bonding curve has zero {0} reserves")]
    DivisionByZero(&'static str),
}

/// Quoted buy: how many token base units a SOL budget purchases, and the
/// slippage-padded ceiling on what we are willing to pay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuyPlan {
    pub token_amount: u64,
    pub max_sol_cost: u64,
}

/// Quoted sell: the token base units leaving the wallet and the
/// slippage-cut floor on lamports coming back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SellPlan {
    pub token_amount: u64,
    pub min_sol_output: u64,
}

/// Quote a buy of `sol_in` SOL against the current virtual reserves.
///
/// `token_amount = floor(sol_in_lamports * virtual_token / virtual_sol)` per
/// the curve's constant-product pricing; `max_sol_cost` pads the budget by
/// the slippage tolerance (in whole percent).
pub fn compute_buy(
    sol_in: f64,
    virtual_sol_reserves: u64,
    virtual_token_reserves: u64,
    slippage_pct: f64,
) -> Result<BuyPlan, SwapMathError> {
    if virtual_sol_reserves == 0 {
        return Err(SwapMathError::DivisionByZero("sol"));
    }
    if virtual_token_reserves == 0 {
        return Err(SwapMathError::DivisionByZero("token"));
    }

    let sol_in_lamports = (sol_in.max(0.0) * LAMPORTS_PER_SOL as f64) as u64;
    let token_amount = (sol_in_lamports as u128 * virtual_token_reserves as u128
        / virtual_sol_reserves as u128) as u64;

    let padded = sol_in.max(0.0) * (1.0 + slippage_pct / 100.0);
    let max_sol_cost = (padded * LAMPORTS_PER_SOL as f64) as u64;

    Ok(BuyPlan {
        token_amount,
        max_sol_cost,
    })
}

/// Quote a sell of `token_amount_ui` tokens (UI units, 6 decimals) against
/// the current virtual reserves.
///
/// Price is taken from the decimal-normalized reserve ratio; the minimum
/// acceptable proceeds are cut by the slippage tolerance and floored.
pub fn compute_sell(
    token_amount_ui: f64,
    virtual_sol_reserves: u64,
    virtual_token_reserves: u64,
    slippage_pct: f64,
) -> Result<SellPlan, SwapMathError> {
    if virtual_token_reserves == 0 {
        return Err(SwapMathError::DivisionByZero("token"));
    }
    if virtual_sol_reserves == 0 {
        return Err(SwapMathError::DivisionByZero("sol"));
    }

    let sol_reserves_dec = virtual_sol_reserves as f64 / LAMPORTS_PER_SOL as f64;
    let token_reserves_dec = virtual_token_reserves as f64 / TOKEN_DECIMALS as f64;
    let price = sol_reserves_dec / token_reserves_dec;

    let token_amount = (token_amount_ui.max(0.0) * TOKEN_DECIMALS as f64) as u64;

    let sol_out = token_amount_ui.max(0.0) * price;
    let cut = sol_out * (1.0 - slippage_pct / 100.0);
    let min_sol_output = (cut * LAMPORTS_PER_SOL as f64) as u64;

    Ok(SellPlan {
        token_amount,
        min_sol_output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VSOL: u64 = 30_000_000_000;
    const VTOK: u64 = 1_000_000_000_000;

    #[test]
    fn buy_regression_vector() {
        let plan = compute_buy(0.1, VSOL, VTOK, 30.0).unwrap();
        // 100_000_000 lamports * 1e12 / 30e9
        assert_eq!(plan.token_amount, 3_333_333_333);
        // 0.1 * 1.3 SOL
        assert_eq!(plan.max_sol_cost, 130_000_000);
    }

    #[test]
    fn buy_max_cost_never_below_budget() {
        for slippage in [0.0, 1.0, 5.0, 30.0, 50.0] {
            let plan = compute_buy(0.25, VSOL, VTOK, slippage).unwrap();
            assert!(plan.max_sol_cost >= 250_000_000, "slippage={slippage}");
        }
    }

    #[test]
    fn buy_monotonic_in_sol_in() {
        let mut last = 0;
        for sol_in in [0.01, 0.05, 0.1, 0.5, 1.0] {
            let plan = compute_buy(sol_in, VSOL, VTOK, 10.0).unwrap();
            assert!(plan.token_amount >= last);
            last = plan.token_amount;
        }
    }

    #[test]
    fn buy_monotonic_in_reserves() {
        let base = compute_buy(0.1, VSOL, VTOK, 10.0).unwrap();
        let more_tokens = compute_buy(0.1, VSOL, VTOK * 2, 10.0).unwrap();
        let more_sol = compute_buy(0.1, VSOL * 2, VTOK, 10.0).unwrap();
        assert!(more_tokens.token_amount >= base.token_amount);
        assert!(more_sol.token_amount <= base.token_amount);
    }

    #[test]
    fn buy_zero_reserves_abort() {
        assert_eq!(
            compute_buy(0.1, 0, VTOK, 30.0),
            Err(SwapMathError::DivisionByZero("sol"))
        );
        assert_eq!(
            compute_buy(0.1, VSOL, 0, 30.0),
            Err(SwapMathError::DivisionByZero("token"))
        );
    }

    #[test]
    fn sell_proceeds_bounded_by_quote() {
        // price = 30 / 1_000_000 SOL per token
        let sol_out_lamports = (1000.0 * (30.0 / 1_000_000.0) * 1e9) as u64;
        for slippage in [0.0, 1.0, 25.0, 50.0] {
            let plan = compute_sell(1000.0, VSOL, VTOK, slippage).unwrap();
            assert!(plan.min_sol_output <= sol_out_lamports, "slippage={slippage}");
        }
    }

    #[test]
    fn sell_amount_is_base_units() {
        let plan = compute_sell(1000.0, VSOL, VTOK, 50.0).unwrap();
        assert_eq!(plan.token_amount, 1000 * TOKEN_DECIMALS);
    }

    #[test]
    fn sell_zero_reserves_abort() {
        assert_eq!(
            compute_sell(1.0, VSOL, 0, 50.0),
            Err(SwapMathError::DivisionByZero("token"))
        );
        assert_eq!(
            compute_sell(1.0, 0, VTOK, 50.0),
            Err(SwapMathError::DivisionByZero("sol"))
        );
    }
}
