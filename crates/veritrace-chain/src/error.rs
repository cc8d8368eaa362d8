/// Caller-visible failure taxonomy for the chain paths.
///
/// Low-level RPC errors arrive as free text; `classify` maps them onto the
/// taxonomy while keeping the original message for diagnostics. Nothing
/// here is retried; retry policy belongs to the caller.

use thiserror::Error;
use veritrace_crypto::FingerprintError;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("gas error: {0}")]
    Gas(String),
    #[error("nonce error: {0}")]
    Nonce(String),
    #[error("contract execution reverted: {0}")]
    ContractRevert(String),
    #[error("rpc unavailable: {0}")]
    RpcUnavailable(String),
    #[error("call data decode failed: {0}")]
    Decode(String),
    #[error("record serialization failed: {0}")]
    Serialize(String),
    #[error("invalid chain configuration: {0}")]
    Config(String),
    #[error("chain error: {0}")]
    Unknown(String),
}

impl ChainError {
    /// Map a raw node error message onto the taxonomy. Reverts are matched
    /// before the generic "gas" bucket because revert messages routinely
    /// mention gas.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("insufficient funds") {
            ChainError::InsufficientFunds(message)
        } else if lower.contains("revert") {
            ChainError::ContractRevert(message)
        } else if lower.contains("nonce") {
            ChainError::Nonce(message)
        } else if lower.contains("gas") {
            ChainError::Gas(message)
        } else if lower.contains("connect")
            || lower.contains("connection")
            || lower.contains("timed out")
            || lower.contains("timeout")
            || lower.contains("transport")
        {
            ChainError::RpcUnavailable(message)
        } else {
            ChainError::Unknown(message)
        }
    }

    /// Read-path RPC failures are availability problems, not semantic ones.
    pub fn rpc(err: impl std::fmt::Display) -> Self {
        ChainError::RpcUnavailable(err.to_string())
    }
}

impl From<FingerprintError> for ChainError {
    fn from(err: FingerprintError) -> Self {
        ChainError::Serialize(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_buckets() {
        assert!(matches!(
            ChainError::classify("err: insufficient funds for gas * price + value"),
            ChainError::InsufficientFunds(_)
        ));
        assert!(matches!(
            ChainError::classify("execution reverted: out of gas"),
            ChainError::ContractRevert(_)
        ));
        assert!(matches!(
            ChainError::classify("nonce too low"),
            ChainError::Nonce(_)
        ));
        assert!(matches!(
            ChainError::classify("intrinsic gas too low"),
            ChainError::Gas(_)
        ));
        assert!(matches!(
            ChainError::classify("error trying to connect: dns error"),
            ChainError::RpcUnavailable(_)
        ));
        assert!(matches!(
            ChainError::classify("something novel"),
            ChainError::Unknown(_)
        ));
    }

    #[test]
    fn original_message_is_preserved() {
        let err = ChainError::classify("nonce too high: expected 7");
        assert!(err.to_string().contains("expected 7"));
    }
}
