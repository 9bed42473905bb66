// Service modules
pub mod connectivity;
pub mod subscription_state;
pub mod transport;
pub mod verifier;

pub use connectivity::{ConnectivityMonitor, Reachability};
pub use subscription_state::SubscriptionState;
pub use transport::{HttpTransport, VerificationTransport};
pub use verifier::ReceiptVerifier;
