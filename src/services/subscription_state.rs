use std::collections::HashMap;
use std::sync::Mutex;

use time::OffsetDateTime;
use tokio::sync::broadcast;
use tracing::debug;

use crate::models::{common::SubscriptionStatus, events::SubscriptionEvent};

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Tracks per-product subscription status and emits a lifecycle event
/// exactly when the state transitions, never on repeated confirmation.
pub struct SubscriptionState {
    statuses: Mutex<HashMap<String, SubscriptionStatus>>,
    events: broadcast::Sender<SubscriptionEvent>,
}

impl SubscriptionState {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            statuses: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SubscriptionEvent> {
        self.events.subscribe()
    }

    /// Fold a reconciled expiration fact into the state machine and return
    /// the derived status.
    pub fn apply(
        &self,
        product_id: &str,
        expiration: Option<OffsetDateTime>,
        now: OffsetDateTime,
    ) -> SubscriptionStatus {
        let status = SubscriptionStatus::from_expiration(expiration, now);
        let previous = self
            .lock_statuses()
            .insert(product_id.to_string(), status);

        if let Some(event) = transition_event(previous, status, product_id) {
            debug!(?event, "subscription state transition");
            let _ = self.events.send(event);
        }
        status
    }

    pub fn status(&self, product_id: &str) -> SubscriptionStatus {
        self.lock_statuses()
            .get(product_id)
            .copied()
            .unwrap_or(SubscriptionStatus::Unknown)
    }

    /// Whether any product's recorded expiration is still in the future.
    pub fn any_active(&self, now: OffsetDateTime) -> bool {
        self.lock_statuses()
            .values()
            .any(|status| matches!(status, SubscriptionStatus::Active { until } if *until > now))
    }

    /// Post an event on behalf of an external collaborator, e.g. the
    /// purchase flow announcing fetched catalog data.
    pub fn post(&self, event: SubscriptionEvent) {
        let _ = self.events.send(event);
    }

    /// Forget all state without emitting events.
    pub fn reset(&self) {
        self.lock_statuses().clear();
    }

    fn lock_statuses(&self) -> std::sync::MutexGuard<'_, HashMap<String, SubscriptionStatus>> {
        self.statuses.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for SubscriptionState {
    fn default() -> Self {
        Self::new()
    }
}

fn transition_event(
    previous: Option<SubscriptionStatus>,
    next: SubscriptionStatus,
    product_id: &str,
) -> Option<SubscriptionEvent> {
    let was_active = matches!(previous, Some(SubscriptionStatus::Active { .. }));
    let was_expired = matches!(previous, Some(SubscriptionStatus::Expired { .. }));

    match next {
        SubscriptionStatus::Active { until } if !was_active => {
            Some(SubscriptionEvent::SubscriptionActivated {
                product_id: product_id.to_string(),
                until,
            })
        }
        SubscriptionStatus::Expired { at } if !was_expired => {
            Some(SubscriptionEvent::SubscriptionExpired {
                product_id: product_id.to_string(),
                at,
            })
        }
        _ => None,
    }
}
