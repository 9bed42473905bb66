use std::collections::HashMap;

use time::OffsetDateTime;
use tracing::debug;

use crate::models::wire::{ReceiptResponse, WireEntry};

/// One historical purchase/renewal record extracted from a verified response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionEntry {
    pub product_id: String,
    pub original_transaction_id: String,
    pub purchase_date: OffsetDateTime,
    /// Present for auto-renewable subscriptions only.
    pub expiration_date: Option<OffsetDateTime>,
}

impl SubscriptionEntry {
    fn from_wire(entry: &WireEntry) -> Option<Self> {
        let purchase_date = entry.purchase_date_ms.as_deref().and_then(parse_ms_epoch)?;
        Some(Self {
            product_id: entry.product_id.clone(),
            original_transaction_id: entry.original_transaction_id.clone().unwrap_or_default(),
            purchase_date,
            expiration_date: entry.expires_date_ms.as_deref().and_then(parse_ms_epoch),
        })
    }
}

fn parse_ms_epoch(ms: &str) -> Option<OffsetDateTime> {
    let ms: i64 = ms.parse().ok()?;
    OffsetDateTime::from_unix_timestamp(ms / 1000).ok()
}

/// Collect every usable entry from a verified response, merging the in-app
/// purchase list with the renewal history. Entries without a parseable
/// purchase date are skipped.
pub fn subscription_entries(response: &ReceiptResponse) -> Vec<SubscriptionEntry> {
    let in_app = response
        .receipt
        .as_ref()
        .and_then(|receipt| receipt.in_app.as_deref())
        .unwrap_or_default();
    let latest = response.latest_receipt_info.as_deref().unwrap_or_default();

    let mut entries = Vec::with_capacity(in_app.len() + latest.len());
    for wire in in_app.iter().chain(latest) {
        match SubscriptionEntry::from_wire(wire) {
            Some(entry) => entries.push(entry),
            None => debug!(
                product_id = %wire.product_id,
                "skipping entry without a usable purchase date"
            ),
        }
    }
    entries
}

/// Per product, the expiration of the latest entry by purchase date.
pub fn latest_expirations(
    entries: &[SubscriptionEntry],
) -> HashMap<String, Option<OffsetDateTime>> {
    let mut latest: HashMap<&str, &SubscriptionEntry> = HashMap::new();
    for entry in entries {
        let slot = latest.entry(entry.product_id.as_str()).or_insert(entry);
        if entry.purchase_date > slot.purchase_date {
            *slot = entry;
        }
    }
    latest
        .into_iter()
        .map(|(product, entry)| (product.to_string(), entry.expiration_date))
        .collect()
}
