use time::OffsetDateTime;

/// Subscription lifecycle notifications, fired at most once per actual state
/// transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionEvent {
    /// First resolution into an active state, or a renewal after a lapse.
    SubscriptionActivated {
        product_id: String,
        until: OffsetDateTime,
    },
    SubscriptionExpired {
        product_id: String,
        at: OffsetDateTime,
    },
    /// Posted by the purchase flow once product catalog data has been
    /// fetched; carried here so consumers have a single event stream.
    ProductDataAvailable,
}
