use tokio::sync::watch;

/// Observes network reachability transitions.
///
/// The verifier parks failed requests on the receiver and retries once per
/// transition to reachable; there is no polling.
pub trait ConnectivityMonitor: Send + Sync {
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Reachability flag driven by the embedding application (or by tests).
pub struct Reachability {
    tx: watch::Sender<bool>,
}

impl Reachability {
    pub fn new(initially_reachable: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_reachable);
        Self { tx }
    }

    /// Report the current reachability. Repeated reports of the same state
    /// do not wake parked verifications.
    pub fn set_reachable(&self, reachable: bool) {
        self.tx.send_if_modified(|current| {
            if *current == reachable {
                false
            } else {
                *current = reachable;
                true
            }
        });
    }

    pub fn is_reachable(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Reachability {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivityMonitor for Reachability {
    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
