// === Canonical Serialization ===
pub mod canonical;

// === HMAC Content Binding ===
pub mod fingerprint;

// === Re-exports ===
pub use canonical::{canonical_parameters_json, canonical_record_json};
pub use fingerprint::{Fingerprint, FingerprintError, Fingerprinter};
