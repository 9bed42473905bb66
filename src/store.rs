use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::StoreError;

/// Persistence contract for verified purchase state.
///
/// Implementations must make `merge_expiration` atomic per product so the
/// monotonic-maximum invariant holds under concurrent verification of
/// different products.
#[async_trait]
pub trait ReceiptStore: Send + Sync {
    /// Last verified expiration recorded for a product.
    async fn expiration(&self, product_id: &str) -> Result<Option<OffsetDateTime>, StoreError>;

    /// Record `candidate` unless a later expiration is already stored, and
    /// return whichever value is stored afterwards. History never retracts a
    /// later-known expiration in favor of an earlier one.
    async fn merge_expiration(
        &self,
        product_id: &str,
        candidate: OffsetDateTime,
    ) -> Result<OffsetDateTime, StoreError>;

    /// Most recently saved raw receipt blob.
    async fn latest_receipt(&self) -> Result<Option<Vec<u8>>, StoreError>;

    async fn save_latest_receipt(&self, receipt: &[u8]) -> Result<(), StoreError>;

    /// Remove all purchase state.
    async fn clear(&self) -> Result<(), StoreError>;
}

/// In-memory store; the reference implementation of the merge semantics.
#[derive(Default)]
pub struct MemoryReceiptStore {
    inner: Mutex<MemoryStoreState>,
}

#[derive(Default)]
struct MemoryStoreState {
    expirations: HashMap<String, OffsetDateTime>,
    latest_receipt: Option<Vec<u8>>,
}

impl MemoryReceiptStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryStoreState>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }
}

#[async_trait]
impl ReceiptStore for MemoryReceiptStore {
    async fn expiration(&self, product_id: &str) -> Result<Option<OffsetDateTime>, StoreError> {
        Ok(self.lock()?.expirations.get(product_id).copied())
    }

    async fn merge_expiration(
        &self,
        product_id: &str,
        candidate: OffsetDateTime,
    ) -> Result<OffsetDateTime, StoreError> {
        let mut state = self.lock()?;
        let stored = state
            .expirations
            .entry(product_id.to_string())
            .or_insert(candidate);
        if *stored < candidate {
            *stored = candidate;
        }
        Ok(*stored)
    }

    async fn latest_receipt(&self) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.lock()?.latest_receipt.clone())
    }

    async fn save_latest_receipt(&self, receipt: &[u8]) -> Result<(), StoreError> {
        self.lock()?.latest_receipt = Some(receipt.to_vec());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.expirations.clear();
        state.latest_receipt = None;
        Ok(())
    }
}
