use rand::{seq::SliceRandom, thread_rng};
use solana_sdk::pubkey;
use solana_sdk::pubkey::Pubkey;

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Pump.fun mints are always created with 6 decimals. This is a deployment
/// constant of the exchange, not a universal token property.
pub const TOKEN_DECIMALS: u64 = 1_000_000;

pub const PUMP_FUN_PROGRAM: Pubkey = pubkey!("6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P");
pub const GLOBAL: Pubkey = pubkey!("4wTV1YmiEkRvAtNtsSGPtUrqRYQMe5SKy2uB4Jjaxnjf");
pub const FEE_RECIPIENT: Pubkey = pubkey!("CebN5WGQ4jvEPvsVU4EoHEpgzq1VV7AbicfhtW4xC9iM");
pub const EVENT_AUTHORITY: Pubkey = pubkey!("Ce6TQqeHC9p8KetsN6JsjHK7UTZk7nasjjnr7XxHp9vL");

/// Seed for the per-mint bonding curve PDA.
pub const BONDING_CURVE_SEED: &[u8] = b"bonding-curve";

pub const DEFAULT_BLOCK_ENGINE_URL: &str = "https://mainnet.block-engine.jito.wtf/api/v1/bundles";

/// Published Jito tip accounts. Tips may land on any of them; picking one at
/// random spreads write locks across concurrent bundles.
pub const JITO_TIP_ACCOUNTS: [Pubkey; 8] = [
    pubkey!("96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5"),
    pubkey!("HFqU5x63VTqvQss8hp11i4wVV8bD44PvwucfZ2bU7gRe"),
    pubkey!("Cw8CFyM9FkoMi7K7Crf6HNQqf4uEMzpKw6QNghXLvLkY"),
    pubkey!("ADaUMid9yfUytqMBgopwjb2DTLSokTSzL1zt6iGPaS49"),
    pubkey!("DfXygSm4jCyNCybVYYK6DwvWqjKee8pbDmJGcLWNDXjh"),
    pubkey!("ADuUkR4vqLUMWXxW9gh6D6L8pMSawimctcNZ5pGwDcEt"),
    pubkey!("DttWaMuVvTiduZRnguLF7jNxTgiMBZ1hyAumKUiL2KRL"),
    pubkey!("3AVi9Tg9Uo68tJfuvoKvqKNWKkC5wPdSSdeBnizKZ6jT"),
];

pub fn random_tip_account() -> Pubkey {
    let mut rng = thread_rng();
    *JITO_TIP_ACCOUNTS
        .choose(&mut rng)
        .expect("tip account list should not be empty")
}
