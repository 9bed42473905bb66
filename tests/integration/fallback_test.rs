use subguard::{SubscriptionStatus, TransportError, VerifyError};

use crate::support::*;

#[tokio::test]
async fn primary_success_never_calls_fallback() {
    let h = harness();
    h.transport.enqueue(
        PRIMARY_URL,
        Ok(accepted(vec![entry(PRODUCT, in_secs(-60), Some(in_secs(3600)))])),
    );

    let verification = h.verifier.verify_receipt(b"receipt", PRODUCT).await.unwrap();

    assert!(matches!(verification.status, SubscriptionStatus::Active { .. }));
    assert_eq!(h.transport.calls_to(VENDOR_PRODUCTION_URL), 0);
    assert_eq!(h.transport.calls_to(VENDOR_SANDBOX_URL), 0);

    // The primary request carries the sandbox routing flag, never the secret.
    let requests = h.transport.requests_to(PRIMARY_URL);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].password, None);
    assert_eq!(requests[0].sandbox, Some(false));
    assert!(requests[0].exclude_old_transactions);
}

#[tokio::test]
async fn primary_rejection_is_authoritative() {
    let h = harness();
    h.transport.enqueue(PRIMARY_URL, Ok(rejected(21002)));

    let err = h.verifier.verify_receipt(b"receipt", PRODUCT).await.unwrap_err();

    assert_eq!(err, VerifyError::ServerRejected { code: 21002 });
    assert_eq!(h.transport.calls_to(VENDOR_PRODUCTION_URL), 0);
    assert_eq!(h.transport.calls_to(VENDOR_SANDBOX_URL), 0);
}

#[tokio::test]
async fn falls_back_to_vendor_when_primary_unreachable() {
    let h = harness();
    h.transport
        .enqueue(PRIMARY_URL, Err(TransportError::Timeout));
    h.transport.enqueue(
        VENDOR_PRODUCTION_URL,
        Ok(accepted(vec![entry(PRODUCT, in_secs(-60), Some(in_secs(3600)))])),
    );

    let verification = h.verifier.verify_receipt(b"receipt", PRODUCT).await.unwrap();

    assert!(matches!(verification.status, SubscriptionStatus::Active { .. }));
    assert_eq!(h.transport.calls_to(VENDOR_PRODUCTION_URL), 1);

    // The vendor request must carry the shared secret.
    let requests = h.transport.requests_to(VENDOR_PRODUCTION_URL);
    assert_eq!(requests[0].password.as_deref(), Some(SHARED_SECRET));
    assert_eq!(requests[0].sandbox, None);
}

#[tokio::test]
async fn non_retryable_primary_failure_is_final() {
    let h = harness();
    h.transport.enqueue(
        PRIMARY_URL,
        Err(TransportError::InvalidRequest("bad body".into())),
    );

    let err = h.verifier.verify_receipt(b"receipt", PRODUCT).await.unwrap_err();

    assert_eq!(
        err,
        VerifyError::Transport(TransportError::InvalidRequest("bad body".into()))
    );
    assert_eq!(h.transport.calls_to(VENDOR_PRODUCTION_URL), 0);
}

#[tokio::test]
async fn schema_mismatch_surfaces_as_parse_failure() {
    let h = harness();
    h.transport.enqueue(
        PRIMARY_URL,
        Err(TransportError::InvalidResponse("missing status".into())),
    );

    let err = h.verifier.verify_receipt(b"receipt", PRODUCT).await.unwrap_err();

    assert_eq!(err, VerifyError::Parse("missing status".into()));
    assert_eq!(h.transport.calls_to(VENDOR_PRODUCTION_URL), 0);
}

#[tokio::test]
async fn sandbox_receipt_on_production_retries_sandbox_once() {
    let h = harness();
    h.transport
        .enqueue(PRIMARY_URL, Err(TransportError::Timeout));
    h.transport.enqueue(VENDOR_PRODUCTION_URL, Ok(rejected(21007)));
    h.transport.enqueue(
        VENDOR_SANDBOX_URL,
        Ok(accepted(vec![entry(PRODUCT, in_secs(-60), Some(in_secs(3600)))])),
    );

    let verification = h.verifier.verify_receipt(b"receipt", PRODUCT).await.unwrap();

    assert!(matches!(verification.status, SubscriptionStatus::Active { .. }));
    assert_eq!(h.transport.calls_to(VENDOR_PRODUCTION_URL), 1);
    assert_eq!(h.transport.calls_to(VENDOR_SANDBOX_URL), 1);
}

#[tokio::test]
async fn sandbox_retry_result_is_reported_as_is() {
    let h = harness();
    h.transport
        .enqueue(PRIMARY_URL, Err(TransportError::Timeout));
    h.transport.enqueue(VENDOR_PRODUCTION_URL, Ok(rejected(21007)));
    h.transport.enqueue(VENDOR_SANDBOX_URL, Ok(rejected(21004)));

    let err = h.verifier.verify_receipt(b"receipt", PRODUCT).await.unwrap_err();

    assert_eq!(err, VerifyError::ServerRejected { code: 21004 });
    assert_eq!(h.transport.calls_to(VENDOR_SANDBOX_URL), 1);
}

#[tokio::test]
async fn sandbox_mode_targets_vendor_sandbox_directly() {
    let mut config = test_config();
    config.sandbox_mode = true;
    let h = harness_with_config(config);

    h.transport
        .enqueue(PRIMARY_URL, Err(TransportError::Timeout));
    h.transport.enqueue(
        VENDOR_SANDBOX_URL,
        Ok(accepted(vec![entry(PRODUCT, in_secs(-60), Some(in_secs(3600)))])),
    );

    let verification = h.verifier.verify_receipt(b"receipt", PRODUCT).await.unwrap();

    assert!(matches!(verification.status, SubscriptionStatus::Active { .. }));
    assert_eq!(h.transport.calls_to(VENDOR_PRODUCTION_URL), 0);
    assert_eq!(h.transport.calls_to(VENDOR_SANDBOX_URL), 1);
    assert_eq!(
        h.transport.requests_to(PRIMARY_URL)[0].sandbox,
        Some(true)
    );
}

#[tokio::test]
async fn construction_rejects_empty_shared_secret() {
    let mut config = test_config();
    config.vendor.shared_secret = String::new();

    let transport = std::sync::Arc::new(ScriptedTransport::new());
    let store = std::sync::Arc::new(subguard::MemoryReceiptStore::new());
    let reachability = std::sync::Arc::new(subguard::Reachability::new(true));
    let result = subguard::ReceiptVerifier::new(config, transport, store, reachability);

    assert!(matches!(result, Err(VerifyError::InvalidInput(_))));
}

#[tokio::test]
async fn rejects_empty_inputs() {
    let h = harness();

    let err = h.verifier.verify_receipt(b"", PRODUCT).await.unwrap_err();
    assert!(matches!(err, VerifyError::InvalidInput(_)));

    let err = h.verifier.verify_receipt(b"receipt", "").await.unwrap_err();
    assert!(matches!(err, VerifyError::InvalidInput(_)));

    assert_eq!(h.transport.total_calls(), 0);
}
