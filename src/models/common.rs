use time::OffsetDateTime;

/// Derived subscription state. `Unknown` until a verification establishes a
/// dated expiration fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active { until: OffsetDateTime },
    Expired { at: OffsetDateTime },
    Unknown,
}

impl SubscriptionStatus {
    pub fn from_expiration(expiration: Option<OffsetDateTime>, now: OffsetDateTime) -> Self {
        match expiration {
            Some(until) if until > now => Self::Active { until },
            Some(at) => Self::Expired { at },
            None => Self::Unknown,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }
}

/// A verification endpoint. Two well-known instances exist: the operator's
/// primary server and the platform vendor's fallback, the latter requiring
/// the shared secret for auto-renewable subscription validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationEndpoint {
    pub url: String,
    pub is_vendor_fallback: bool,
    pub shared_secret: Option<String>,
}

impl VerificationEndpoint {
    pub fn primary(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            is_vendor_fallback: false,
            shared_secret: None,
        }
    }

    pub fn vendor(url: impl Into<String>, shared_secret: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            is_vendor_fallback: true,
            shared_secret: Some(shared_secret.into()),
        }
    }
}

/// Terminal result of one verification request.
///
/// A `None` expiration on a successful verification means "no active
/// subscription was found", which is distinct from a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// Product the request was scoped to; `None` for saved-receipt
    /// verification across all products.
    pub product_id: Option<String>,
    pub expiration: Option<OffsetDateTime>,
    pub status: SubscriptionStatus,
}

impl Verification {
    pub fn expiration_epoch_seconds(&self) -> Option<i64> {
        self.expiration.map(OffsetDateTime::unix_timestamp)
    }

    pub(crate) fn unknown(product_id: Option<String>) -> Self {
        Self {
            product_id,
            expiration: None,
            status: SubscriptionStatus::Unknown,
        }
    }
}
