use std::time::Duration;

use crate::support::*;

#[tokio::test]
async fn concurrent_requests_for_same_product_share_one_call() {
    let h = harness();
    h.transport.set_delay(Duration::from_millis(100));
    h.transport.enqueue(
        PRIMARY_URL,
        Ok(accepted(vec![entry(PRODUCT, in_secs(-60), Some(in_secs(3600)))])),
    );

    let first = {
        let verifier = h.verifier.clone();
        tokio::spawn(async move { verifier.verify_receipt(b"receipt", PRODUCT).await })
    };
    let second = {
        let verifier = h.verifier.clone();
        tokio::spawn(async move { verifier.verify_receipt(b"receipt", PRODUCT).await })
    };

    let results = futures::future::join_all([first, second]).await;
    let outcomes: Vec<_> = results
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    // Both callers observe the same outcome from a single network call.
    assert_eq!(outcomes[0], outcomes[1]);
    assert_eq!(h.transport.total_calls(), 1);
}

#[tokio::test]
async fn distinct_products_verify_independently() {
    let other_product = "com.example.pro.yearly";
    let h = harness();
    h.transport.set_delay(Duration::from_millis(50));
    h.transport.enqueue(
        PRIMARY_URL,
        Ok(accepted(vec![entry(PRODUCT, in_secs(-60), Some(in_secs(3600)))])),
    );
    h.transport.enqueue(
        PRIMARY_URL,
        Ok(accepted(vec![entry(other_product, in_secs(-60), Some(in_secs(7200)))])),
    );

    let first = {
        let verifier = h.verifier.clone();
        tokio::spawn(async move { verifier.verify_receipt(b"receipt", PRODUCT).await })
    };
    let second = {
        let verifier = h.verifier.clone();
        tokio::spawn(
            async move { verifier.verify_receipt(b"receipt-2", other_product).await },
        )
    };

    let results = futures::future::join_all([first, second]).await;
    for joined in results {
        joined.unwrap().unwrap();
    }

    assert_eq!(h.transport.calls_to(PRIMARY_URL), 2);
}
