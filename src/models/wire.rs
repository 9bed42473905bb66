use serde::{Deserialize, Serialize};

/// Receipt accepted by the verification endpoint.
pub const STATUS_VALID: i32 = 0;

/// A sandbox receipt was sent to a production endpoint; the sandbox variant
/// of the same endpoint must be retried once before treating the code as a
/// rejection.
pub const STATUS_SANDBOX_RECEIPT_ON_PRODUCTION: i32 = 21007;

/// POST body sent to both verification endpoints.
///
/// `password` is set only for the vendor endpoint; `sandbox` only for the
/// primary endpoint, which selects the vendor environment server-side.
#[derive(Debug, Clone, Serialize)]
pub struct ReceiptRequest {
    #[serde(rename = "receipt-data")]
    pub receipt_data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(rename = "exclude-old-transactions")]
    pub exclude_old_transactions: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReceiptResponse {
    pub status: i32,
    #[serde(default)]
    pub receipt: Option<ReceiptPayload>,
    /// Renewal history for auto-renewable subscriptions.
    #[serde(default)]
    pub latest_receipt_info: Option<Vec<WireEntry>>,
    /// Base64 of the newest receipt blob, when the server returns one.
    #[serde(default)]
    pub latest_receipt: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReceiptPayload {
    #[serde(default)]
    pub bundle_id: Option<String>,
    #[serde(default)]
    pub in_app: Option<Vec<WireEntry>>,
}

/// One purchase/renewal record as the endpoint reports it. Dates arrive as
/// millisecond-epoch strings.
#[derive(Debug, Clone, Deserialize)]
pub struct WireEntry {
    pub product_id: String,
    #[serde(default)]
    pub original_transaction_id: Option<String>,
    #[serde(default)]
    pub purchase_date_ms: Option<String>,
    #[serde(default)]
    pub expires_date_ms: Option<String>,
}
