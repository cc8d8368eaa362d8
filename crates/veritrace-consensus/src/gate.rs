/// Consensus Gate: bounded-parallel fan-out across N raters with a
/// threshold decision.
///
/// CORE INVARIANTS:
/// 1. The tally always covers all N raters: ok / error / timeout /
///    cancelled, every rater yields exactly one vote.
/// 2. Individual rater failures never surface as gate failures; the gate
///    can only fail at construction time (misconfiguration).
/// 3. Default-deny: an undecidable rater counts toward the non-safe side
///    unless the legacy permissive policy is switched on.

use crate::rater::{classification_instruction, parse_verdict, rater_parameters};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::task::JoinSet;
use veritrace_core::config::ConsensusSettings;
use veritrace_core::types::{ConsensusOutcome, RaterDescriptor, SafetyVote, VoteVerdict};
use veritrace_llm::ProviderRegistry;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("consensus threshold {threshold} is outside 1..={raters}")]
    InvalidThreshold { threshold: usize, raters: usize },
    #[error("duplicate rater id: {0}")]
    DuplicateRaterId(String),
}

/// Single-shot evaluator: IDLE → FANOUT → DECIDED → REPORTED, no retries.
pub struct ConsensusGate {
    registry: Arc<ProviderRegistry>,
    settings: ConsensusSettings,
}

impl std::fmt::Debug for ConsensusGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsensusGate")
            .field("settings", &self.settings)
            .finish()
    }
}

impl ConsensusGate {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        settings: ConsensusSettings,
    ) -> Result<Self, GateError> {
        let raters = settings.raters.len();
        if settings.threshold == 0 || settings.threshold > raters {
            return Err(GateError::InvalidThreshold {
                threshold: settings.threshold,
                raters,
            });
        }
        let mut seen = HashSet::new();
        for rater in &settings.raters {
            if !seen.insert(rater.rater_id.as_str()) {
                return Err(GateError::DuplicateRaterId(rater.rater_id.clone()));
            }
        }
        Ok(Self { registry, settings })
    }

    /// Evaluate one prompt. Never fails; rater trouble becomes Error votes.
    pub async fn evaluate(&self, prompt: &str) -> ConsensusOutcome {
        let instruction = classification_instruction(prompt);
        let parameters = rater_parameters();
        let total = self.settings.raters.len();

        // Exactly N in-flight slots, no queueing.
        let mut calls = JoinSet::new();
        for rater in self.settings.raters.clone() {
            let registry = Arc::clone(&self.registry);
            let instruction = instruction.clone();
            let parameters = parameters.clone();
            let per_call_timeout = self.settings.rater_timeout;
            calls.spawn(async move {
                let started = Instant::now();
                match tokio::time::timeout(
                    per_call_timeout,
                    registry.generate(&rater.provider, &rater.model, &instruction, &parameters),
                )
                .await
                {
                    Ok(Ok(reply)) => SafetyVote {
                        rater_id: rater.rater_id,
                        verdict: parse_verdict(&reply.content),
                        latency: started.elapsed(),
                        raw: reply.content,
                    },
                    Ok(Err(err)) => {
                        warn!("rater {} failed: {err}", rater.rater_id);
                        SafetyVote {
                            rater_id: rater.rater_id,
                            verdict: VoteVerdict::Error,
                            latency: started.elapsed(),
                            raw: err.to_string(),
                        }
                    }
                    Err(_) => SafetyVote {
                        rater_id: rater.rater_id,
                        verdict: VoteVerdict::Error,
                        latency: per_call_timeout,
                        raw: "rater call timed out".to_string(),
                    },
                }
            });
        }

        let deadline = tokio::time::Instant::now() + self.settings.deadline;
        let mut collected: HashMap<String, SafetyVote> = HashMap::new();
        let mut cutoff_reason = "cancelled at consensus deadline";

        while !calls.is_empty() {
            match tokio::time::timeout_at(deadline, calls.join_next()).await {
                Ok(Some(Ok(vote))) => {
                    debug!("rater {} voted {:?}", vote.rater_id, vote.verdict);
                    collected.insert(vote.rater_id.clone(), vote);
                    if self.settings.early_decision && self.decided(&collected, total) {
                        cutoff_reason = "cancelled after early decision";
                        calls.abort_all();
                        break;
                    }
                }
                Ok(Some(Err(join_err))) => {
                    // Aborted or panicked task; the rater is tallied as an
                    // Error vote below.
                    warn!("rater task did not complete: {join_err}");
                }
                Ok(None) => break,
                Err(_) => {
                    calls.abort_all();
                    break;
                }
            }
        }

        // Raters still outstanding at cutoff are Error votes with
        // latency = D.
        let votes: Vec<SafetyVote> = self
            .settings
            .raters
            .iter()
            .map(|rater| {
                collected.remove(&rater.rater_id).unwrap_or_else(|| SafetyVote {
                    rater_id: rater.rater_id.clone(),
                    verdict: VoteVerdict::Error,
                    latency: self.settings.deadline,
                    raw: cutoff_reason.to_string(),
                })
            })
            .collect();

        let outcome = self.tally(votes, total);
        info!(
            "consensus outcome: passed={} safe={} unsafe={} error={} threshold={}",
            outcome.passed,
            outcome.safe_votes,
            outcome.unsafe_votes,
            outcome.error_votes,
            outcome.threshold
        );
        outcome
    }

    /// The outcome is determined once the safe side reaches the threshold
    /// or the non-safe side makes the threshold unreachable.
    fn decided(&self, collected: &HashMap<String, SafetyVote>, total: usize) -> bool {
        let (safe, non_safe) = self.effective_counts(collected.values());
        safe >= self.settings.threshold || non_safe > total - self.settings.threshold
    }

    fn effective_counts<'a>(
        &self,
        votes: impl Iterator<Item = &'a SafetyVote>,
    ) -> (usize, usize) {
        let mut safe = 0;
        let mut non_safe = 0;
        for vote in votes {
            match vote.verdict {
                VoteVerdict::Safe => safe += 1,
                VoteVerdict::Unsafe => non_safe += 1,
                VoteVerdict::Error if self.settings.treat_errors_as_safe => safe += 1,
                VoteVerdict::Error => non_safe += 1,
            }
        }
        (safe, non_safe)
    }

    fn tally(&self, votes: Vec<SafetyVote>, total: usize) -> ConsensusOutcome {
        let safe_votes = votes
            .iter()
            .filter(|v| v.verdict == VoteVerdict::Safe)
            .count();
        let unsafe_votes = votes
            .iter()
            .filter(|v| v.verdict == VoteVerdict::Unsafe)
            .count();
        let error_votes = votes
            .iter()
            .filter(|v| v.verdict == VoteVerdict::Error)
            .count();
        let (effective_safe, _) = self.effective_counts(votes.iter());

        ConsensusOutcome {
            passed: effective_safe >= self.settings.threshold,
            safe_votes,
            unsafe_votes,
            error_votes,
            total,
            threshold: self.settings.threshold,
            votes,
        }
    }
}
