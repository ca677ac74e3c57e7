//! Walks a purchase, a refund and a pending approval through the
//! in-memory store and logs what the purchase store observes.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;

use storefront_core::{Product, ProductId, ProductKind};
use storefront_purchases::{PurchaseStore, StoreConfig};
use storefront_storekit::{InMemoryStore, PurchaseOutcome, VerificationResult};

fn sample_catalog() -> anyhow::Result<Vec<Product>> {
    Ok(vec![
        Product::new(
            ProductId::new("car.race")?,
            "Race car",
            "A fast car",
            "$0.99",
            ProductKind::NonConsumable,
        ),
        Product::new(
            ProductId::new("fuel.small")?,
            "Fuel",
            "A small tank",
            "$0.49",
            ProductKind::Consumable,
        ),
        Product::new(
            ProductId::new("pro.monthly")?,
            "Pro",
            "Monthly plan",
            "$4.99",
            ProductKind::Subscription,
        ),
    ])
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    storefront_observability::init();

    let catalog = sample_catalog()?;
    let mut config = StoreConfig::from_env().context("loading store config")?;
    if config.product_ids.is_empty() {
        tracing::warn!("no product ids configured; requesting the sample catalog");
        config = StoreConfig::new().with_products(catalog.iter().map(|p| p.id.clone()));
    }

    let fake = Arc::new(InMemoryStore::with_products(catalog));
    let store = PurchaseStore::start(fake.clone(), &config).await;
    let events = store.events();
    tracing::info!(products = store.products().len(), "catalog ready");

    let car = store
        .lookup_product(&ProductId::new("car.race")?)
        .context("race car missing from catalog")?;
    let (transaction, state) = store.purchase(&car).await?;
    tracing::info!(%state, owned = ?store.purchased_products(), "race car purchase settled");

    // A refund arrives through the update stream.
    if let Some(transaction) = transaction {
        let mut owned_rx = store.subscribe_purchased_products();
        fake.push_update(VerificationResult::verified(transaction.revoked_at(Utc::now())));
        tokio::time::timeout(Duration::from_secs(1), owned_rx.changed())
            .await
            .context("refund was not applied in time")??;
        tracing::info!(owned = ?store.purchased_products(), "race car refunded");
    }

    // Ask-to-buy: pending now, approved later.
    let pro = store
        .lookup_product(&ProductId::new("pro.monthly")?)
        .context("pro plan missing from catalog")?;
    fake.script_purchase(Ok(PurchaseOutcome::Pending));
    let (_, state) = store.purchase(&pro).await?;
    tracing::info!(%state, "pro plan awaiting approval");

    let mut owned_rx = store.subscribe_purchased_products();
    let approved = fake
        .make_transaction(&pro)
        .context("in-memory store unavailable")?;
    fake.push_update(VerificationResult::verified(approved));
    tokio::time::timeout(Duration::from_secs(1), owned_rx.changed())
        .await
        .context("approval was not applied in time")??;
    tracing::info!(
        pro = store.is_purchased(&pro.id).await?,
        "pro plan approved"
    );

    for envelope in events.drain() {
        tracing::info!(
            event = %serde_json::to_string(envelope.payload())?,
            "recorded"
        );
    }

    store.shutdown().await;
    Ok(())
}
