/// Canonical JSON for record binding.
///
/// CORE INVARIANT:
/// The fingerprint MAC input, the on-chain `parameters` string, and the
/// recomputation done during verification are all produced by the functions
/// in this module. Two serializers would eventually disagree; one cannot.
///
/// Canonical form: object keys in lexicographic (byte) order at every
/// nesting level, compact separators, Unicode passed through verbatim
/// (JSON string escaping only where the grammar demands it).

use crate::fingerprint::FingerprintError;
use serde_json::{Map, Value};

/// Canonical serialization of a full generation record.
///
/// Key order is fixed: `consensus_votes` (omitted when empty),
/// `llm_provider`, `model_name`, `parameters`, `prompt`, `response`,
/// `timestamp`.
pub fn canonical_record_json(
    llm_provider: &str,
    model_name: &str,
    prompt: &str,
    response: &str,
    parameters: &Map<String, Value>,
    timestamp: &str,
    consensus_votes: &str,
) -> Result<String, FingerprintError> {
    let mut record = Map::new();
    record.insert("llm_provider".to_string(), Value::from(llm_provider));
    record.insert("model_name".to_string(), Value::from(model_name));
    record.insert("prompt".to_string(), Value::from(prompt));
    record.insert("response".to_string(), Value::from(response));
    record.insert(
        "parameters".to_string(),
        Value::Object(parameters.clone()),
    );
    record.insert("timestamp".to_string(), Value::from(timestamp));
    if !consensus_votes.is_empty() {
        record.insert("consensus_votes".to_string(), Value::from(consensus_votes));
    }

    let mut out = String::new();
    write_canonical(&Value::Object(record), &mut out)?;
    Ok(out)
}

/// Canonical serialization of the parameters object alone; this exact
/// string is what goes on chain next to the record fields.
pub fn canonical_parameters_json(
    parameters: &Map<String, Value>,
) -> Result<String, FingerprintError> {
    let mut out = String::new();
    write_canonical(&Value::Object(parameters.clone()), &mut out)?;
    Ok(out)
}

/// Recursive canonical writer. Keys are sorted here rather than relying on
/// map iteration order, so the output is stable regardless of how the
/// `serde_json` map is backed.
fn write_canonical(value: &Value, out: &mut String) -> Result<(), FingerprintError> {
    match value {
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&encode_scalar(&Value::from(key.as_str()))?);
                out.push(':');
                write_canonical(&map[key.as_str()], out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&encode_scalar(scalar)?),
    }
    Ok(())
}

fn encode_scalar(value: &Value) -> Result<String, FingerprintError> {
    serde_json::to_string(value).map_err(|e| FingerprintError::Serialize(e.to_string()))
}
