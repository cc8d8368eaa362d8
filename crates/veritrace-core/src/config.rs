/// Process-wide configuration, loaded once at startup from the environment.
///
/// A missing required variable is a fatal startup error; nothing in the
/// pipeline reads the environment after init.

use crate::types::RaterDescriptor;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONSENSUS_THRESHOLD: usize = 3;
pub const DEFAULT_CONSENSUS_DEADLINE_SECS: u64 = 60;
pub const DEFAULT_CHAIN_ID: u64 = 11_155_111; // Sepolia
pub const DEFAULT_GAS_PRICE_BOOST: f64 = 1.5;
pub const DEFAULT_GAS_LIMIT_FALLBACK: u64 = 500_000;
pub const DEFAULT_MIN_GAS_PRICE_WEI: u128 = 1_000_000_000; // 1 gwei
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Chain-facing settings; present only when the commit/verify paths are
/// configured.
#[derive(Debug, Clone)]
pub struct ChainSettings {
    pub rpc_url: String,
    pub private_key: String,
    pub contract_address: String,
    /// Expected transaction sender for verification. Derived from the
    /// private key when not set explicitly.
    pub issuer_address: Option<String>,
    pub chain_id: u64,
    pub gas_price_boost: f64,
    pub gas_limit_fallback: u64,
    pub min_gas_price_wei: u128,
    pub rpc_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ConsensusSettings {
    pub raters: Vec<RaterDescriptor>,
    pub threshold: usize,
    /// Overall fan-out deadline D.
    pub deadline: Duration,
    /// Per-rater call timeout T; defaults to the deadline.
    pub rater_timeout: Duration,
    /// Legacy permissive policy: count rater errors as safe votes.
    /// Off by default (default-deny).
    pub treat_errors_as_safe: bool,
    /// Abort outstanding raters once the outcome is determined.
    pub early_decision: bool,
}

impl ConsensusSettings {
    pub fn defaults() -> Self {
        let deadline = Duration::from_secs(DEFAULT_CONSENSUS_DEADLINE_SECS);
        Self {
            raters: RaterDescriptor::canonical_set(),
            threshold: DEFAULT_CONSENSUS_THRESHOLD,
            deadline,
            rater_timeout: deadline,
            treat_errors_as_safe: false,
            early_decision: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Key for the HMAC content binding. Required unconditionally.
    pub hmac_secret: String,
    pub openrouter_api_key: Option<String>,
    pub chain: Option<ChainSettings>,
    pub consensus: ConsensusSettings,
}

/// Presence report for one configuration variable, judged by the same
/// rules `from_env` applies. `fatal` is true when `from_env` would fail on
/// the current environment because this variable is unset.
#[derive(Debug, Clone)]
pub struct VarReport {
    pub var: &'static str,
    pub set: bool,
    pub fatal: bool,
    /// What an unset value means, for operator-facing output.
    pub note: &'static str,
}

impl GatewayConfig {
    /// Describe every configuration variable against the current
    /// environment. `veritrace_admin doctor` consults this instead of its
    /// own table so the report cannot drift from what `from_env` enforces:
    /// the HMAC secret is the only unconditional requirement, the API key
    /// merely disables generation when absent, and the chain trio is
    /// all-or-nothing.
    pub fn describe_requirements() -> Vec<VarReport> {
        let present = |name: &str| env_opt(name).is_some();

        let chain_vars = ["RPC_URL", "PRIVATE_KEY", "CONTRACT_ADDRESS"];
        let chain_any = chain_vars.iter().any(|var| present(var));

        let mut reports = vec![
            VarReport {
                var: "HMAC_SECRET_KEY",
                set: present("HMAC_SECRET_KEY"),
                fatal: !present("HMAC_SECRET_KEY"),
                note: "required",
            },
            VarReport {
                var: "OPENROUTER_API_KEY",
                set: present("OPENROUTER_API_KEY"),
                fatal: false,
                note: "generation disabled",
            },
        ];
        for var in chain_vars {
            let set = present(var);
            reports.push(VarReport {
                var,
                set,
                // The trio stands or falls together: a partial set is a
                // misconfiguration, full absence just disables the
                // commit/verify paths.
                fatal: chain_any && !set,
                note: "chain paths disabled",
            });
        }
        reports.push(VarReport {
            var: "ISSUER_ADDRESS",
            set: present("ISSUER_ADDRESS"),
            fatal: false,
            note: "derived from PRIVATE_KEY",
        });
        for var in [
            "CONSENSUS_RATERS",
            "CONSENSUS_THRESHOLD",
            "CONSENSUS_DEADLINE_SECS",
            "RATER_TIMEOUT_SECS",
            "CONSENSUS_TREAT_ERRORS_AS_SAFE",
            "CONSENSUS_EARLY_DECISION",
            "CHAIN_ID",
            "GAS_PRICE_BOOST",
            "GAS_LIMIT_FALLBACK",
            "MIN_GAS_PRICE_WEI",
            "RPC_TIMEOUT_SECS",
        ] {
            reports.push(VarReport {
                var,
                set: present(var),
                fatal: false,
                note: "default applies",
            });
        }
        reports
    }

    /// Load everything from the environment. Fatal on missing or
    /// malformed values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let hmac_secret =
            env_opt("HMAC_SECRET_KEY").ok_or(ConfigError::Missing("HMAC_SECRET_KEY"))?;

        let consensus = ConsensusSettings {
            raters: read_raters()?,
            threshold: env_parse("CONSENSUS_THRESHOLD", DEFAULT_CONSENSUS_THRESHOLD)?,
            deadline: Duration::from_secs(env_parse(
                "CONSENSUS_DEADLINE_SECS",
                DEFAULT_CONSENSUS_DEADLINE_SECS,
            )?),
            rater_timeout: Duration::from_secs(env_parse(
                "RATER_TIMEOUT_SECS",
                env_parse("CONSENSUS_DEADLINE_SECS", DEFAULT_CONSENSUS_DEADLINE_SECS)?,
            )?),
            treat_errors_as_safe: env_parse("CONSENSUS_TREAT_ERRORS_AS_SAFE", false)?,
            early_decision: env_parse("CONSENSUS_EARLY_DECISION", false)?,
        };

        Ok(Self {
            hmac_secret,
            openrouter_api_key: env_opt("OPENROUTER_API_KEY"),
            chain: read_chain_settings()?,
            consensus,
        })
    }
}

/// The three chain variables stand or fall together: all absent means the
/// commit/verify paths are simply not configured, a partial set is a
/// misconfiguration.
fn read_chain_settings() -> Result<Option<ChainSettings>, ConfigError> {
    let rpc_url = env_opt("RPC_URL");
    let private_key = env_opt("PRIVATE_KEY");
    let contract_address = env_opt("CONTRACT_ADDRESS");

    if rpc_url.is_none() && private_key.is_none() && contract_address.is_none() {
        return Ok(None);
    }

    let rpc_url = rpc_url.ok_or(ConfigError::Missing("RPC_URL"))?;
    let private_key = private_key.ok_or(ConfigError::Missing("PRIVATE_KEY"))?;
    let contract_address = contract_address.ok_or(ConfigError::Missing("CONTRACT_ADDRESS"))?;

    Ok(Some(ChainSettings {
        rpc_url,
        private_key,
        contract_address,
        issuer_address: env_opt("ISSUER_ADDRESS"),
        chain_id: env_parse("CHAIN_ID", DEFAULT_CHAIN_ID)?,
        gas_price_boost: env_parse("GAS_PRICE_BOOST", DEFAULT_GAS_PRICE_BOOST)?,
        gas_limit_fallback: env_parse("GAS_LIMIT_FALLBACK", DEFAULT_GAS_LIMIT_FALLBACK)?,
        min_gas_price_wei: env_parse("MIN_GAS_PRICE_WEI", DEFAULT_MIN_GAS_PRICE_WEI)?,
        rpc_timeout: Duration::from_secs(env_parse(
            "RPC_TIMEOUT_SECS",
            DEFAULT_RPC_TIMEOUT_SECS,
        )?),
    }))
}

/// `CONSENSUS_RATERS` is a JSON array of `{rater_id, provider, model}`
/// objects; the canonical five-rater set applies when unset.
fn read_raters() -> Result<Vec<RaterDescriptor>, ConfigError> {
    match env_opt("CONSENSUS_RATERS") {
        None => Ok(RaterDescriptor::canonical_set()),
        Some(raw) => {
            let raters: Vec<RaterDescriptor> =
                serde_json::from_str(&raw).map_err(|e| ConfigError::Invalid {
                    var: "CONSENSUS_RATERS",
                    reason: e.to_string(),
                })?;
            if raters.is_empty() {
                return Err(ConfigError::Invalid {
                    var: "CONSENSUS_RATERS",
                    reason: "rater set must not be empty".to_string(),
                });
            }
            Ok(raters)
        }
    }
}

/// Unset and empty are both treated as absent.
fn env_opt(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

fn env_parse<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var: name,
            reason: e.to_string(),
        }),
    }
}
