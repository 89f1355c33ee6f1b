//! Content fingerprint for index staleness detection.
//!
//! The fingerprint is a SHA-256 digest over the schema description followed
//! by every business rule, in order. Each part is length-prefixed so that
//! moving text between the description and a rule, or between two rules,
//! always changes the digest. Rule order is significant: rules are rendered
//! into prompts in order, so a reorder is a content change.

use sha2::{Digest, Sha256};

/// Key under which the current fingerprint is persisted.
pub const FINGERPRINT_KEY: &str = "schema_fingerprint";

/// Compute the 64-character lowercase hex fingerprint of a catalog's content.
pub fn compute(description: &str, rules: &[String]) -> String {
    let mut hasher = Sha256::new();
    update_framed(&mut hasher, description);
    for rule in rules {
        update_framed(&mut hasher, rule);
    }
    hex::encode(hasher.finalize())
}

fn update_framed(hasher: &mut Sha256, part: &str) {
    hasher.update((part.len() as u64).to_le_bytes());
    hasher.update(part.as_bytes());
}
