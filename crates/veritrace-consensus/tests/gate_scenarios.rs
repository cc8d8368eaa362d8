// End-to-end gate scenarios against scripted raters, on a paused clock so
// the deadline and timeout paths run in milliseconds of wall time.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use veritrace_consensus::ConsensusGate;
use veritrace_core::config::ConsensusSettings;
use veritrace_core::types::{RaterDescriptor, VoteVerdict};
use veritrace_llm::{GenerationReply, LlmError, LlmProvider, ProviderRegistry};

/// A rater that replies with a fixed string after a fixed delay, or fails.
struct ScriptedRater {
    reply: &'static str,
    delay: Duration,
    fail: bool,
}

#[async_trait]
impl LlmProvider for ScriptedRater {
    async fn generate(
        &self,
        _provider: &str,
        model: &str,
        _prompt: &str,
        _parameters: &Map<String, Value>,
    ) -> Result<GenerationReply, LlmError> {
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(LlmError::Transport("scripted failure".to_string()));
        }
        Ok(GenerationReply {
            content: self.reply.to_string(),
            model: model.to_string(),
            latency: self.delay,
        })
    }
}

/// Wire up one scripted rater per slot and return the gate.
fn scripted_gate(
    scripts: Vec<ScriptedRater>,
    configure: impl FnOnce(&mut ConsensusSettings),
) -> ConsensusGate {
    let mut registry = ProviderRegistry::new();
    let mut raters = Vec::new();
    for (i, script) in scripts.into_iter().enumerate() {
        let id = format!("rater-{i}");
        registry.register(id.clone(), Arc::new(script));
        raters.push(RaterDescriptor::new(id.clone(), id, "scripted"));
    }
    let mut settings = ConsensusSettings::defaults();
    settings.raters = raters;
    configure(&mut settings);
    ConsensusGate::new(Arc::new(registry), settings).unwrap()
}

fn fast(reply: &'static str) -> ScriptedRater {
    ScriptedRater {
        reply,
        delay: Duration::from_millis(50),
        fail: false,
    }
}

#[tokio::test(start_paused = true)]
async fn four_safe_one_unsafe_passes() {
    let gate = scripted_gate(
        vec![fast("False"), fast("False"), fast("False"), fast("False"), fast("True")],
        |_| {},
    );
    let outcome = gate.evaluate("benign prompt").await;
    assert!(outcome.passed);
    assert_eq!(outcome.safe_votes, 4);
    assert_eq!(outcome.unsafe_votes, 1);
    assert_eq!(outcome.error_votes, 0);
    assert_eq!(outcome.total, 5);
    assert_eq!(outcome.votes_string(), "4/5");
}

#[tokio::test(start_paused = true)]
async fn two_safe_is_rejected() {
    let gate = scripted_gate(
        vec![
            fast("False"),
            fast("False"),
            fast("True"),
            fast("True"),
            ScriptedRater {
                reply: "",
                delay: Duration::from_millis(50),
                fail: true,
            },
        ],
        |_| {},
    );
    let outcome = gate.evaluate("dubious prompt").await;
    assert!(!outcome.passed);
    assert_eq!(outcome.safe_votes, 2);
    assert_eq!(outcome.unsafe_votes, 2);
    assert_eq!(outcome.error_votes, 1);
    assert_eq!(outcome.total, 5);
}

#[tokio::test(start_paused = true)]
async fn hanging_raters_are_cancelled_at_the_deadline() {
    let hang = Duration::from_secs(300);
    let gate = scripted_gate(
        vec![
            ScriptedRater { reply: "False", delay: Duration::from_secs(2), fail: false },
            ScriptedRater { reply: "False", delay: Duration::from_secs(2), fail: false },
            ScriptedRater { reply: "False", delay: Duration::from_secs(2), fail: false },
            ScriptedRater { reply: "False", delay: hang, fail: false },
            ScriptedRater { reply: "False", delay: hang, fail: false },
        ],
        |settings| {
            settings.deadline = Duration::from_secs(5);
            // Keep the per-call timeout out of the way so the overall
            // deadline is what fires.
            settings.rater_timeout = Duration::from_secs(600);
        },
    );
    let outcome = gate.evaluate("slow fan-out").await;
    assert!(outcome.passed);
    assert_eq!(outcome.safe_votes, 3);
    assert_eq!(outcome.error_votes, 2);
    assert_eq!(outcome.total, 5);
    let cancelled: Vec<_> = outcome
        .votes
        .iter()
        .filter(|v| v.verdict == VoteVerdict::Error)
        .collect();
    for vote in cancelled {
        assert_eq!(vote.latency, Duration::from_secs(5));
        assert!(vote.raw.contains("deadline"));
    }
}

#[tokio::test(start_paused = true)]
async fn all_raters_timing_out_rejects() {
    let gate = scripted_gate(
        vec![
            ScriptedRater { reply: "False", delay: Duration::from_secs(100), fail: false },
            ScriptedRater { reply: "False", delay: Duration::from_secs(100), fail: false },
            ScriptedRater { reply: "False", delay: Duration::from_secs(100), fail: false },
            ScriptedRater { reply: "False", delay: Duration::from_secs(100), fail: false },
            ScriptedRater { reply: "False", delay: Duration::from_secs(100), fail: false },
        ],
        |settings| {
            settings.rater_timeout = Duration::from_secs(2);
        },
    );
    let outcome = gate.evaluate("unreachable raters").await;
    assert!(!outcome.passed);
    assert_eq!(outcome.error_votes, 5);
    assert_eq!(outcome.total, 5);
    for vote in &outcome.votes {
        assert_eq!(vote.latency, Duration::from_secs(2));
        assert!(vote.raw.contains("timed out"));
    }
}

#[tokio::test(start_paused = true)]
async fn exactly_threshold_safes_pass_and_one_fewer_rejects() {
    let at_threshold = scripted_gate(
        vec![fast("False"), fast("False"), fast("False"), fast("True"), fast("True")],
        |_| {},
    );
    assert!(at_threshold.evaluate("edge").await.passed);

    let below_threshold = scripted_gate(
        vec![fast("False"), fast("False"), fast("True"), fast("True"), fast("True")],
        |_| {},
    );
    assert!(!below_threshold.evaluate("edge").await.passed);
}

#[tokio::test(start_paused = true)]
async fn unparseable_replies_become_error_votes() {
    let gate = scripted_gate(
        vec![fast("False"), fast("False"), fast("False"), fast("maybe"), fast("???")],
        |_| {},
    );
    let outcome = gate.evaluate("vague raters").await;
    assert!(outcome.passed);
    assert_eq!(outcome.safe_votes, 3);
    assert_eq!(outcome.error_votes, 2);
}

#[tokio::test(start_paused = true)]
async fn early_decision_cancels_the_stragglers() {
    let slow = Duration::from_secs(100);
    let gate = scripted_gate(
        vec![
            fast("False"),
            fast("False"),
            fast("False"),
            ScriptedRater { reply: "False", delay: slow, fail: false },
            ScriptedRater { reply: "False", delay: slow, fail: false },
        ],
        |settings| {
            settings.early_decision = true;
        },
    );
    let outcome = gate.evaluate("quick quorum").await;
    assert!(outcome.passed);
    assert_eq!(outcome.safe_votes, 3);
    assert_eq!(outcome.error_votes, 2);
    assert_eq!(outcome.total, 5);
    assert!(outcome
        .votes
        .iter()
        .any(|v| v.raw.contains("early decision")));
}

#[tokio::test(start_paused = true)]
async fn legacy_policy_lets_errors_count_as_safe() {
    let failing = || ScriptedRater {
        reply: "",
        delay: Duration::from_millis(50),
        fail: true,
    };

    let permissive = scripted_gate(
        vec![fast("False"), fast("False"), failing(), failing(), failing()],
        |settings| {
            settings.treat_errors_as_safe = true;
        },
    );
    assert!(permissive.evaluate("flaky raters").await.passed);

    let strict = scripted_gate(
        vec![fast("False"), fast("False"), failing(), failing(), failing()],
        |_| {},
    );
    assert!(!strict.evaluate("flaky raters").await.passed);
}
