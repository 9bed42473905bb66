// Library exports for testing and reuse
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::VerifierConfig;
pub use error::{Result, StoreError, TransportError, VerifyError};
pub use models::common::{SubscriptionStatus, Verification, VerificationEndpoint};
pub use models::events::SubscriptionEvent;
pub use services::connectivity::{ConnectivityMonitor, Reachability};
pub use services::transport::{HttpTransport, VerificationTransport};
pub use services::verifier::ReceiptVerifier;
pub use store::{MemoryReceiptStore, ReceiptStore};
