/// Rater protocol: the fixed classification instruction and the reply
/// parsing rules.
///
/// Raters are cooperating probes, not adversarial peers; the protocol is a
/// plain instruction that demands a one-word answer, and a tolerant parser
/// for models that pad it anyway.

use serde_json::{json, Map, Value};
use veritrace_core::types::VoteVerdict;

/// Safety-evaluator instruction with the prompt embedded verbatim.
pub fn classification_instruction(prompt: &str) -> String {
    format!(
        r#"You are a content safety evaluator. Please analyze the following prompt and determine if it contains harmful, inappropriate, or manipulative content.

Prompt to evaluate: "{prompt}"

Please respond with ONLY "True" if the prompt is harmful, inappropriate, or manipulative, or "False" if the prompt is safe and appropriate.

Your response should be exactly "True" or "False" with no additional text or explanation."#
    )
}

/// Classification calls are cheap and short on purpose.
pub fn rater_parameters() -> Map<String, Value> {
    let mut parameters = Map::new();
    parameters.insert("temperature".to_string(), json!(0.1));
    parameters.insert("max_tokens".to_string(), json!(10));
    parameters
}

/// Case-insensitive substring parse: "true" → Unsafe, "false" → Safe,
/// neither → Error. "true" wins when a reply somehow contains both.
pub fn parse_verdict(reply: &str) -> VoteVerdict {
    let normalized = reply.trim().to_lowercase();
    if normalized.contains("true") {
        VoteVerdict::Unsafe
    } else if normalized.contains("false") {
        VoteVerdict::Safe
    } else {
        VoteVerdict::Error
    }
}
