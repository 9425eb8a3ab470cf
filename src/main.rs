use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Instrument};

use marketplace_checkout::app_system::{setup_tracing, OrderSystem};
use marketplace_checkout::config::Config;
use marketplace_checkout::domain::{CheckoutLine, CheckoutReceipt, CheckoutRequest, PaymentMethod, VariantCreate};
use marketplace_checkout::payment::SandboxProvider;

#[tokio::main]
async fn main() -> Result<(), String> {
    // Setup tracing once for the entire application
    setup_tracing();

    let mut config = Config::from_env();
    config.payment_poll_interval = config.payment_poll_interval.min(Duration::from_millis(200));
    info!(?config, "Starting checkout demo");

    // The sandbox settles every bank transfer on its second status poll
    let system = OrderSystem::new(config, Arc::new(SandboxProvider::settling_after(2)));

    let span = tracing::info_span!("catalog_seeding");
    let mug = async {
        system
            .variant_client
            .create_variant(VariantCreate {
                product_id: 1,
                product_name: "Stoneware mug".to_string(),
                image: "mug.png".to_string(),
                price: Decimal::new(10000, 2),
                quantity: 8,
            })
            .await
            .map_err(|e| e.to_string())
    }
    .instrument(span)
    .await?;
    info!(variant_id = mug.id, "Catalog seeded");

    let request = |quantity: i64, payment_method: PaymentMethod| CheckoutRequest {
        user_id: 42,
        lines: vec![CheckoutLine { variant_id: mug.id, quantity, price: mug.price }],
        shipping_fee: Decimal::new(1000, 2),
        total: mug.price * Decimal::from(quantity) + Decimal::new(1000, 2),
        payment_method,
    };

    let span = tracing::info_span!("cash_on_delivery");
    match system
        .order_client
        .create_order(request(5, PaymentMethod::CashOnDelivery))
        .instrument(span)
        .await
    {
        Ok(receipt) => info!(order_id = ?receipt.order().map(|o| o.id), total = %receipt.draft().total, "Order placed"),
        Err(e) => error!(error = %e, "Order failed"),
    }

    let span = tracing::info_span!("bank_transfer");
    let bank_draft = match system
        .order_client
        .create_order(request(2, PaymentMethod::BankTransfer))
        .instrument(span)
        .await
    {
        Ok(CheckoutReceipt::AwaitingPayment { draft, payment_link, .. }) => {
            info!(draft_id = draft.id, %payment_link, "Awaiting bank transfer");
            Some(draft.id)
        }
        Ok(_) => None,
        Err(e) => {
            error!(error = %e, "Order failed");
            None
        }
    };

    // Oversell attempt: only one unit is left
    if let Err(e) = system.order_client.create_order(request(2, PaymentMethod::CashOnDelivery)).await {
        info!(error = %e, "Oversell rejected as expected");
    }

    if let Some(draft_id) = bank_draft {
        for _ in 0..50 {
            if !system.watcher.is_watching(draft_id) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let draft = system.draft_client.fetch_draft(draft_id).await.map_err(|e| e.to_string())?;
        info!(draft_id, promotion = ?draft.promotion, "Bank transfer settled");
    }

    let report = system.reconciliation().run_once().await.map_err(|e| e.to_string())?;
    info!(?report, "Reconciled");

    let mug = system.variant_client.fetch_variant(mug.id).await.map_err(|e| e.to_string())?;
    info!(durable_quantity = mug.quantity, "Durable stock after reconciliation");

    // Shutdown system gracefully
    system.shutdown().await?;

    info!("Application completed successfully");
    Ok(())
}
