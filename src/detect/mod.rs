//! Change detection
//!
//! - `fingerprint`: deterministic digest over the tracked record fields
//! - `detect_changes`: compares a fresh record with its stored version and
//!   records what changed

mod detector;
mod fingerprint;

pub use detector::{detect_changes, diff_records, Detection, PRICE_THRESHOLD};
pub use fingerprint::fingerprint;
