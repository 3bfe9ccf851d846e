//! 提现示例：从子账户 0 提取 USDC 到钱包地址

use anyhow::{Context, Result};
use v4_client::{infrastructure::logging, prelude::*};

/// 10 USDC
const WITHDRAW_QUANTUMS: u64 = 10_000_000;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config_path = std::env::var("CONFIG_PATH").ok();
    let config = Config::from_env_and_file(config_path.as_deref())?;
    config.validate().context("Invalid configuration")?;

    if let Err(e) = logging::init_logging(&config.logging) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let mnemonic = std::env::var("MNEMONIC").context("MNEMONIC must be set")?;
    let wallet = Wallet::from_mnemonic_with_path(
        &mnemonic,
        &config.wallet.address_prefix,
        &config.wallet.hd_path,
    )
    .context("Failed to derive wallet")?;

    tracing::info!(
        network = %config.network.name,
        address = %wallet.address(),
        "Starting withdraw"
    );

    let client = ValidatorClient::connect(&config);
    let subaccount = SubaccountRef::new(wallet.address().clone(), 0);

    match client
        .withdraw(&wallet, &subaccount, USDC_ASSET_ID, WITHDRAW_QUANTUMS)
        .await
    {
        Ok(result) => {
            println!("**Withdraw Tx**");
            println!("{}", serde_json::to_string_pretty(&result.raw)?);
            println!("tx hash: {}", result.tx_hash);
        }
        Err(e) => {
            tracing::error!(code = e.code(), error = %e, "Withdraw failed");
            println!("{}", e);
        }
    }

    Ok(())
}
