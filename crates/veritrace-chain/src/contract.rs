/// ABI binding for the record-storage contract method.
///
/// One state-changing function of eight ordered strings:
/// `storeLLMRecord(hash, prompt, response, llm_provider, model_name,
/// timestamp, parameters, consensus_votes)`. The 4-byte selector prefixes
/// the encoded arguments; no other storage layout is assumed.

use crate::error::ChainError;
use ethers::abi::{Function, Param, ParamType, StateMutability, Token};
use veritrace_core::types::DecodedRecord;

pub const STORE_FUNCTION_NAME: &str = "storeLLMRecord";

pub fn store_function() -> Function {
    let input = |name: &str| Param {
        name: name.to_string(),
        kind: ParamType::String,
        internal_type: None,
    };
    #[allow(deprecated)]
    Function {
        name: STORE_FUNCTION_NAME.to_string(),
        inputs: vec![
            input("hash"),
            input("prompt"),
            input("response"),
            input("llm_provider"),
            input("model_name"),
            input("timestamp"),
            input("parameters"),
            input("consensus_votes"),
        ],
        outputs: vec![],
        constant: None,
        state_mutability: StateMutability::NonPayable,
    }
}

/// Selector-prefixed call data for one record commit.
pub fn encode_store_call(call: &DecodedRecord) -> Result<Vec<u8>, ChainError> {
    let tokens = vec![
        Token::String(call.fingerprint.clone()),
        Token::String(call.prompt.clone()),
        Token::String(call.response.clone()),
        Token::String(call.llm_provider.clone()),
        Token::String(call.model_name.clone()),
        Token::String(call.timestamp.clone()),
        Token::String(call.parameters_json.clone()),
        Token::String(call.consensus_votes.clone()),
    ];
    store_function()
        .encode_input(&tokens)
        .map_err(|e| ChainError::Serialize(e.to_string()))
}

/// Decode commit call data back into the record fields: check the selector,
/// strip it, ABI-decode the remainder.
pub fn decode_store_call(input: &[u8]) -> Result<DecodedRecord, ChainError> {
    let function = store_function();
    if input.len() < 4 {
        return Err(ChainError::Decode(
            "call data is shorter than a method selector".to_string(),
        ));
    }
    let selector = function.short_signature();
    if input[..4] != selector {
        return Err(ChainError::Decode(format!(
            "method selector mismatch: expected 0x{}, got 0x{}",
            hex::encode(selector),
            hex::encode(&input[..4])
        )));
    }

    let tokens = function
        .decode_input(&input[4..])
        .map_err(|e| ChainError::Decode(e.to_string()))?;
    let mut strings = tokens.into_iter().map(|token| match token {
        Token::String(s) => Ok(s),
        other => Err(ChainError::Decode(format!(
            "unexpected token type in call data: {other:?}"
        ))),
    });
    let mut next = || {
        strings
            .next()
            .unwrap_or_else(|| Err(ChainError::Decode("call data is missing fields".to_string())))
    };

    Ok(DecodedRecord {
        fingerprint: next()?,
        prompt: next()?,
        response: next()?,
        llm_provider: next()?,
        model_name: next()?,
        timestamp: next()?,
        parameters_json: next()?,
        consensus_votes: next()?,
    })
}
