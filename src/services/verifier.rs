use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use time::OffsetDateTime;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::AbortHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::VerifierConfig,
    error::{Result, TransportError, VerifyError},
    models::{
        common::{SubscriptionStatus, Verification, VerificationEndpoint},
        events::SubscriptionEvent,
        receipt::{latest_expirations, subscription_entries},
        wire::{ReceiptRequest, ReceiptResponse, STATUS_SANDBOX_RECEIPT_ON_PRODUCTION, STATUS_VALID},
    },
    services::{
        connectivity::ConnectivityMonitor, subscription_state::SubscriptionState,
        transport::VerificationTransport,
    },
    store::ReceiptStore,
    utils,
};

/// Coalescing key for saved-receipt verification, which is not scoped to a
/// single product.
const ALL_PRODUCTS_KEY: &str = "*";

/// Orchestrates receipt verification: endpoint fallback order, connectivity
/// retry, response reconciliation and state updates.
///
/// Explicitly constructed with its collaborators; hold a clone wherever a
/// reference is needed.
#[derive(Clone)]
pub struct ReceiptVerifier {
    inner: Arc<VerifierInner>,
}

struct VerifierInner {
    config: VerifierConfig,
    primary: VerificationEndpoint,
    vendor_production: VerificationEndpoint,
    vendor_sandbox: VerificationEndpoint,
    transport: Arc<dyn VerificationTransport>,
    store: Arc<dyn ReceiptStore>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    state: SubscriptionState,
    in_flight: Mutex<HashMap<String, InFlight>>,
    generation: AtomicU64,
}

struct InFlight {
    id: Uuid,
    waiters: Vec<oneshot::Sender<Result<Verification>>>,
    abort: Option<AbortHandle>,
}

enum Attempt {
    /// The endpoint accepted the receipt.
    Accepted(ReceiptResponse),
    /// Both endpoints failed with retryable transport errors; park until
    /// connectivity is restored.
    Offline,
}

impl ReceiptVerifier {
    /// Fails fast on invalid configuration, e.g. an empty shared secret.
    pub fn new(
        config: VerifierConfig,
        transport: Arc<dyn VerificationTransport>,
        store: Arc<dyn ReceiptStore>,
        connectivity: Arc<dyn ConnectivityMonitor>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| VerifyError::InvalidInput(format!("invalid verifier configuration: {e}")))?;

        let primary = VerificationEndpoint::primary(config.primary.url.clone());
        let vendor_production = VerificationEndpoint::vendor(
            config.vendor.production_url.clone(),
            config.vendor.shared_secret.clone(),
        );
        let vendor_sandbox = VerificationEndpoint::vendor(
            config.vendor.sandbox_url.clone(),
            config.vendor.shared_secret.clone(),
        );

        Ok(Self {
            inner: Arc::new(VerifierInner {
                config,
                primary,
                vendor_production,
                vendor_sandbox,
                transport,
                store,
                connectivity,
                state: SubscriptionState::new(),
                in_flight: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        })
    }

    /// Subscribe to subscription lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<SubscriptionEvent> {
        self.inner.state.subscribe()
    }

    /// Post an event through the lifecycle hub on behalf of an external
    /// collaborator (e.g. the purchase flow announcing catalog data).
    pub fn post_event(&self, event: SubscriptionEvent) {
        self.inner.state.post(event);
    }

    pub fn is_subscription_active(&self) -> bool {
        self.inner.state.any_active(OffsetDateTime::now_utc())
    }

    pub fn status(&self, product_id: &str) -> SubscriptionStatus {
        self.inner.state.status(product_id)
    }

    /// Verify a freshly obtained receipt tied to a purchase or restore.
    ///
    /// Exactly one terminal outcome is reported per call. A request for a
    /// product with a verification already in flight joins that operation
    /// instead of issuing a duplicate network call.
    #[instrument(skip(self, receipt), fields(receipt = %utils::receipt_fingerprint(receipt)))]
    pub async fn verify_receipt(&self, receipt: &[u8], product_id: &str) -> Result<Verification> {
        if receipt.is_empty() {
            return Err(VerifyError::InvalidInput("receipt must not be empty".into()));
        }
        if product_id.is_empty() {
            return Err(VerifyError::InvalidInput(
                "product identifier must not be empty".into(),
            ));
        }
        self.join_or_start(
            product_id.to_string(),
            receipt.to_vec(),
            Some(product_id.to_string()),
        )
        .await
    }

    /// Re-verify the most recently persisted receipt, e.g. at launch.
    /// Reports `Unknown` without touching the network when none is saved.
    #[instrument(skip(self))]
    pub async fn verify_saved_receipt(&self) -> Result<Verification> {
        let Some(receipt) = self.inner.store.latest_receipt().await? else {
            debug!("no saved receipt; nothing to verify");
            return Ok(Verification::unknown(None));
        };
        self.join_or_start(ALL_PRODUCTS_KEY.to_string(), receipt, None)
            .await
    }

    /// Re-run saved-receipt verification when a subscription looks lapsed
    /// locally but may have renewed server-side.
    #[instrument(skip(self))]
    pub async fn check_for_renewed_subscription(&self) -> Result<Verification> {
        info!("checking for a renewed subscription");
        self.verify_saved_receipt().await
    }

    /// Wipe persisted purchase state and cancel in-flight verifications,
    /// including parked connectivity retries. Joined callers observe
    /// `VerifyError::Cancelled`; a late-arriving response from a cancelled
    /// attempt is neither persisted nor reported.
    #[instrument(skip(self))]
    pub async fn clear_purchase_info(&self) -> Result<()> {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);

        let drained: Vec<InFlight> = {
            let mut in_flight = self.inner.lock_in_flight();
            in_flight.drain().map(|(_, entry)| entry).collect()
        };
        for entry in drained {
            if let Some(abort) = entry.abort {
                abort.abort();
            }
            // Dropping the waiters resolves joined callers to Cancelled.
        }

        self.inner.store.clear().await?;
        self.inner.state.reset();
        info!("cleared purchase info");
        Ok(())
    }

    async fn join_or_start(
        &self,
        key: String,
        receipt: Vec<u8>,
        product_id: Option<String>,
    ) -> Result<Verification> {
        let (tx, rx) = oneshot::channel();
        let id = Uuid::new_v4();
        let generation = self.inner.generation.load(Ordering::SeqCst);

        let started = {
            let mut in_flight = self.inner.lock_in_flight();
            match in_flight.get_mut(&key) {
                Some(entry) => {
                    entry.waiters.push(tx);
                    false
                }
                None => {
                    in_flight.insert(
                        key.clone(),
                        InFlight {
                            id,
                            waiters: vec![tx],
                            abort: None,
                        },
                    );
                    true
                }
            }
        };

        if started {
            let inner = Arc::clone(&self.inner);
            let task_key = key.clone();
            let handle = tokio::spawn(async move {
                let result = inner.drive(receipt, product_id, generation).await;
                inner.complete(&task_key, id, result);
            });

            let mut in_flight = self.inner.lock_in_flight();
            if let Some(entry) = in_flight.get_mut(&key) {
                if entry.id == id {
                    entry.abort = Some(handle.abort_handle());
                }
            }
        } else {
            debug!(key = %key, "joined verification already in flight");
        }

        rx.await.unwrap_or(Err(VerifyError::Cancelled))
    }
}

impl VerifierInner {
    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, HashMap<String, InFlight>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Deliver a terminal result to every caller joined to this operation.
    /// A result whose in-flight entry is gone belongs to a cancelled
    /// attempt and is dropped.
    fn complete(&self, key: &str, id: Uuid, result: Result<Verification>) {
        let waiters = {
            let mut in_flight = self.lock_in_flight();
            match in_flight.get(key) {
                Some(entry) if entry.id == id => in_flight
                    .remove(key)
                    .map(|entry| entry.waiters)
                    .unwrap_or_default(),
                _ => {
                    debug!(key = %key, "dropping result of cancelled verification");
                    return;
                }
            }
        };
        for tx in waiters {
            let _ = tx.send(result.clone());
        }
    }

    async fn drive(
        &self,
        receipt: Vec<u8>,
        product_id: Option<String>,
        generation: u64,
    ) -> Result<Verification> {
        let request_id = Uuid::new_v4();
        let payload = BASE64.encode(&receipt);
        // Subscribe before the first attempt so a transition that happens
        // mid-attempt still wakes the parked request.
        let mut reachable = self.connectivity.subscribe();

        loop {
            match self.attempt(&payload, request_id).await? {
                Attempt::Accepted(response) => {
                    return self.finish(response, receipt, product_id, generation).await;
                }
                Attempt::Offline => {
                    info!(%request_id, "verification endpoints unreachable; waiting for connectivity");
                    self.wait_for_reachability(&mut reachable).await?;
                    info!(%request_id, "connectivity restored; retrying verification");
                }
            }
        }
    }

    /// One pass over the endpoint fallback order.
    ///
    /// A definitive primary response is authoritative: the vendor endpoint
    /// is consulted only when the primary is unreachable, never to
    /// double-check a success.
    async fn attempt(&self, payload: &str, request_id: Uuid) -> Result<Attempt> {
        let request = self.primary_request(payload, self.config.sandbox_mode);
        match self.transport.post_receipt(&self.primary, &request).await {
            Ok(response) => self.handle_primary_response(response, payload, request_id).await,
            Err(err) if err.is_retryable() => {
                warn!(%request_id, error = %err, "primary endpoint unreachable; falling back to vendor");
                self.attempt_vendor(payload, request_id).await
            }
            Err(err) => Err(final_transport_error(err)),
        }
    }

    async fn handle_primary_response(
        &self,
        response: ReceiptResponse,
        payload: &str,
        request_id: Uuid,
    ) -> Result<Attempt> {
        match response.status {
            STATUS_VALID => Ok(Attempt::Accepted(response)),
            STATUS_SANDBOX_RECEIPT_ON_PRODUCTION if !self.config.sandbox_mode => {
                // One-time retry of the primary's sandbox variant: same URL,
                // sandbox flag set, the operator server routes accordingly.
                info!(%request_id, "sandbox receipt on production; retrying primary sandbox variant");
                let request = self.primary_request(payload, true);
                self.settle_sandbox_retry(
                    self.transport.post_receipt(&self.primary, &request).await,
                )
            }
            code => Err(VerifyError::ServerRejected { code }),
        }
    }

    async fn attempt_vendor(&self, payload: &str, request_id: Uuid) -> Result<Attempt> {
        let endpoint = if self.config.sandbox_mode {
            &self.vendor_sandbox
        } else {
            &self.vendor_production
        };
        let request = self.vendor_request(payload, endpoint);

        match self.transport.post_receipt(endpoint, &request).await {
            Ok(response) => match response.status {
                STATUS_VALID => Ok(Attempt::Accepted(response)),
                STATUS_SANDBOX_RECEIPT_ON_PRODUCTION if !self.config.sandbox_mode => {
                    info!(%request_id, "sandbox receipt on production; retrying vendor sandbox variant");
                    let request = self.vendor_request(payload, &self.vendor_sandbox);
                    self.settle_sandbox_retry(
                        self.transport
                            .post_receipt(&self.vendor_sandbox, &request)
                            .await,
                    )
                }
                code => Err(VerifyError::ServerRejected { code }),
            },
            Err(err) if err.is_retryable() => Ok(Attempt::Offline),
            Err(err) => Err(final_transport_error(err)),
        }
    }

    /// The sandbox variant's answer is reported as-is; there is no second
    /// retry.
    fn settle_sandbox_retry(
        &self,
        result: std::result::Result<ReceiptResponse, TransportError>,
    ) -> Result<Attempt> {
        match result {
            Ok(retry) if retry.status == STATUS_VALID => Ok(Attempt::Accepted(retry)),
            Ok(retry) => Err(VerifyError::ServerRejected { code: retry.status }),
            Err(err) if err.is_retryable() => Ok(Attempt::Offline),
            Err(err) => Err(final_transport_error(err)),
        }
    }

    /// Parse an accepted response, reconcile it with stored state and feed
    /// the state machine.
    async fn finish(
        &self,
        response: ReceiptResponse,
        receipt: Vec<u8>,
        product_id: Option<String>,
        generation: u64,
    ) -> Result<Verification> {
        let entries = subscription_entries(&response);
        let per_product = latest_expirations(&entries);

        let mut candidates: Vec<(String, Option<OffsetDateTime>)> = match &product_id {
            Some(product) => vec![(product.clone(), per_product.get(product).copied().flatten())],
            None => per_product
                .iter()
                .map(|(product, expiration)| (product.clone(), *expiration))
                .collect(),
        };
        candidates.sort_by(|a, b| a.0.cmp(&b.0));

        // A response arriving after clear_purchase_info must not touch the
        // store or the state machine.
        if self.generation.load(Ordering::SeqCst) != generation {
            return Err(VerifyError::Cancelled);
        }

        // Refresh the saved receipt, preferring the renewal blob returned by
        // the server.
        let saved = match response.latest_receipt.as_deref().map(|b64| BASE64.decode(b64)) {
            Some(Ok(bytes)) => bytes,
            Some(Err(err)) => {
                debug!(error = %err, "ignoring undecodable latest_receipt in response");
                receipt
            }
            None => receipt,
        };
        if !saved.is_empty() {
            self.store.save_latest_receipt(&saved).await?;
        }

        let now = OffsetDateTime::now_utc();
        let mut reported: Option<OffsetDateTime> = None;
        for (product, candidate) in &candidates {
            let merged = match candidate {
                Some(expiration) => Some(self.store.merge_expiration(product, *expiration).await?),
                None => self.store.expiration(product).await?,
            };
            let status = self.state.apply(product, merged, now);
            debug!(product = %product, ?status, "reconciled verification result");
            reported = match (reported, merged) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };
        }

        let verification = Verification {
            product_id,
            expiration: reported,
            status: SubscriptionStatus::from_expiration(reported, now),
        };
        info!(
            expiration = ?verification.expiration_epoch_seconds(),
            status = ?verification.status,
            "verification complete"
        );
        Ok(verification)
    }

    async fn wait_for_reachability(&self, reachable: &mut watch::Receiver<bool>) -> Result<()> {
        loop {
            reachable.changed().await.map_err(|_| {
                VerifyError::Transport(TransportError::Unreachable(
                    "connectivity monitor dropped".into(),
                ))
            })?;
            if *reachable.borrow() {
                return Ok(());
            }
        }
    }

    fn primary_request(&self, payload: &str, sandbox: bool) -> ReceiptRequest {
        ReceiptRequest {
            receipt_data: payload.to_string(),
            password: None,
            exclude_old_transactions: self.config.exclude_old_transactions,
            sandbox: Some(sandbox),
        }
    }

    fn vendor_request(&self, payload: &str, endpoint: &VerificationEndpoint) -> ReceiptRequest {
        ReceiptRequest {
            receipt_data: payload.to_string(),
            password: endpoint.shared_secret.clone(),
            exclude_old_transactions: self.config.exclude_old_transactions,
            sandbox: None,
        }
    }
}

fn final_transport_error(err: TransportError) -> VerifyError {
    match err {
        TransportError::InvalidResponse(msg) => VerifyError::Parse(msg),
        other => VerifyError::Transport(other),
    }
}
