use sha2::{Digest, Sha256};

/// Short digest for correlating receipts in logs without dumping blobs.
pub fn receipt_fingerprint(receipt: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(receipt);
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}
