use crate::model::Record;
use sha2::{Digest, Sha256};

/// Separator between fingerprinted fields
const FIELD_SEPARATOR: &str = "|";

/// Computes the content fingerprint of a record
///
/// The digest covers, in order: `name`, `description`, `price_gross`,
/// `price_net`, `availability`, `rating`, `review_count`. Category, image,
/// snapshot, status and timestamps do not participate, so two records that
/// agree on the tracked fields always share a fingerprint.
///
/// # Returns
///
/// A 64 character lowercase hex SHA-256 digest
pub fn fingerprint(record: &Record) -> String {
    let rating = record.rating.map(|r| r.as_str()).unwrap_or("");
    let fields = [
        record.name.clone(),
        record.description.clone(),
        record.price_gross.to_string(),
        record.price_net.to_string(),
        record.availability.clone(),
        rating.to_string(),
        record.review_count.to_string(),
    ];

    let mut hasher = Sha256::new();
    hasher.update(fields.join(FIELD_SEPARATOR).as_bytes());
    hex::encode(hasher.finalize())
}
