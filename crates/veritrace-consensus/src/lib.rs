// === Rater Protocol ===
pub mod rater;

// === Consensus Gate ===
pub mod gate;

// === Re-exports ===
pub use gate::{ConsensusGate, GateError};
pub use rater::{classification_instruction, parse_verdict, rater_parameters};
