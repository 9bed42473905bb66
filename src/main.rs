use std::env;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use subguard::{
    HttpTransport, MemoryReceiptStore, Reachability, ReceiptStore, ReceiptVerifier, VerifierConfig,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Spot-check a receipt file against the configured verification endpoints.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,subguard=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = env::args().skip(1);
    let Some(receipt_path) = args.next() else {
        anyhow::bail!("usage: subguard <receipt-file> [product-id]");
    };
    let product_id = args.next();

    let config = VerifierConfig::load()?;
    tracing::info!(primary = %config.primary.url, sandbox = config.sandbox_mode, "loaded configuration");

    let transport = Arc::new(HttpTransport::new(&config.transport)?);
    let store = Arc::new(MemoryReceiptStore::new());
    let connectivity = Arc::new(Reachability::new(true));
    let verifier = ReceiptVerifier::new(config, transport, store.clone(), connectivity)?;

    let raw = tokio::fs::read(&receipt_path).await?;
    // Receipt files are commonly base64 text; fall back to raw bytes.
    let receipt = match BASE64.decode(raw.trim_ascii()) {
        Ok(bytes) => bytes,
        Err(_) => raw,
    };

    let verification = match product_id {
        Some(product) => verifier.verify_receipt(&receipt, &product).await?,
        None => {
            store.save_latest_receipt(&receipt).await?;
            verifier.verify_saved_receipt().await?
        }
    };

    match verification.expiration_epoch_seconds() {
        Some(expiration) => {
            tracing::info!(expiration, status = ?verification.status, "receipt verified")
        }
        None => tracing::info!("receipt verified; no active subscription found"),
    }

    Ok(())
}
