//! Single-record turn loop: drives one conversation turn by turn, applying
//! retry-with-backoff and score extraction per turn.

use std::time::Duration;

use tracing::warn;

use super::{EngineConfig, TurnState};
use crate::errors::BackendError;
use crate::extract::ScoreExtractor;
use crate::model::{Record, SamplingParams, TurnContext};
use crate::providers::ChatBackend;

/// Drive every turn of `record` to a terminal state.
///
/// Recoverable failures (transient, rejected, extraction) are resolved here
/// and surfaced only as data: error messages accumulate per turn and
/// exhausted turns leave `None` slots. Only unclassified backend failures
/// return an error, aborting the caller's batch.
///
/// A record whose turns are all already complete is returned untouched
/// without issuing requests. Turn *t+1* never starts before turn *t* is
/// terminal; an exhausted turn's missing response is carried forward as
/// degraded context.
pub async fn drive_record(
    backend: &dyn ChatBackend,
    cfg: &EngineConfig,
    record: &mut Record,
    system: Option<&str>,
    params: &SamplingParams,
    extractor: Option<&dyn ScoreExtractor>,
) -> Result<(), BackendError> {
    if record.is_complete(extractor.is_some()) {
        return Ok(());
    }
    record.reset_annotations();

    let turns = record.prompts.len();
    for turn in 0..turns {
        record.responses.push(None);
        record.extracted.push(None);
        record.errors.push(Vec::new());

        let mut state = TurnState::Pending;
        let mut attempts = 0u32;
        let mut delay = Duration::ZERO;

        while attempts < cfg.max_retries {
            if let Some(last) = record.errors[turn].last() {
                warn!(
                    record = %record.id,
                    turn,
                    retry_in = ?delay,
                    "retrying after error: {last}"
                );
            }
            tokio::time::sleep(delay).await;

            state = TurnState::InFlight;
            let result = {
                let ctx = TurnContext {
                    system,
                    prompts: &record.prompts[..=turn],
                    responses: &record.responses[..turn],
                };
                backend.request(&ctx, params).await
            };

            match result {
                Ok(text) => {
                    record.responses[turn] = Some(text);
                    let Some(extractor) = extractor else {
                        state = TurnState::Succeeded;
                        break;
                    };
                    let text = record.responses[turn].as_deref().unwrap_or_default();
                    match extractor.extract(text) {
                        Ok(value) => {
                            record.extracted[turn] = Some(value);
                            state = TurnState::Succeeded;
                            break;
                        }
                        Err(e) => {
                            // A re-roll may produce a compliant format.
                            record.errors[turn].push(e.to_string());
                            attempts += 1;
                            delay = cfg.request_interval;
                        }
                    }
                }
                Err(BackendError::Transient(msg)) => {
                    record.errors[turn].push(msg);
                    attempts += 1;
                    delay = cfg.transient_cooldown;
                }
                Err(BackendError::Rejected(msg)) => {
                    record.errors[turn].push(msg);
                    attempts += 1;
                    delay = cfg.request_interval;
                }
                Err(fatal) => return Err(fatal),
            }
        }

        if state != TurnState::Succeeded {
            state = TurnState::Exhausted;
            warn!(
                record = %record.id,
                turn,
                attempts,
                "turn exhausted retry budget"
            );
        }
        debug_assert!(state.is_terminal());

        // Inter-turn pacing within one record.
        if turn + 1 < turns {
            tokio::time::sleep(cfg.request_interval).await;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::RegexScoreExtractor;
    use crate::model::ScoreValue;
    use crate::providers::fake::{FakeBackend, FakeReply};

    fn score_extractor() -> RegexScoreExtractor {
        RegexScoreExtractor::new(r"\[\[(\d)\]\]").unwrap()
    }

    #[tokio::test]
    async fn single_turn_success_with_extraction() {
        let backend = FakeBackend::fixed("[[4]]");
        let mut record = Record::single_turn("1", "2+2?");

        drive_record(
            &backend,
            &EngineConfig::immediate(3),
            &mut record,
            None,
            &SamplingParams::default(),
            Some(&score_extractor()),
        )
        .await
        .unwrap();

        assert_eq!(record.responses, vec![Some("[[4]]".to_string())]);
        assert_eq!(record.extracted, vec![Some(ScoreValue::Single("4".into()))]);
        assert_eq!(record.errors, vec![Vec::<String>::new()]);
    }

    #[tokio::test]
    async fn retry_budget_bounds_extraction_attempts_exactly() {
        // max_retries = 2 with an extractor that never matches: exactly two
        // attempts, two recorded errors, then EXHAUSTED.
        let backend = FakeBackend::fixed("no score here");
        let mut record = Record::single_turn("1", "q");

        drive_record(
            &backend,
            &EngineConfig::immediate(2),
            &mut record,
            None,
            &SamplingParams::default(),
            Some(&score_extractor()),
        )
        .await
        .unwrap();

        assert_eq!(backend.calls(), 2);
        assert_eq!(record.errors[0].len(), 2);
        // The last unextractable response is kept.
        assert_eq!(record.responses[0].as_deref(), Some("no score here"));
        assert_eq!(record.extracted[0], None);
    }

    #[tokio::test]
    async fn transient_error_retries_same_turn() {
        let backend = FakeBackend::script(vec![
            FakeReply::Transient("rate limited".into()),
            FakeReply::Text("[[3]]".into()),
        ]);
        let mut record = Record::single_turn("1", "q");

        drive_record(
            &backend,
            &EngineConfig::immediate(3),
            &mut record,
            None,
            &SamplingParams::default(),
            Some(&score_extractor()),
        )
        .await
        .unwrap();

        assert_eq!(record.errors[0], vec!["rate limited".to_string()]);
        assert_eq!(record.extracted[0], Some(ScoreValue::Single("3".into())));
    }

    #[tokio::test]
    async fn rejected_and_transient_share_one_budget() {
        let backend = FakeBackend::script(vec![
            FakeReply::Transient("429".into()),
            FakeReply::Rejected("400".into()),
        ]);
        let mut record = Record::single_turn("1", "q");

        drive_record(
            &backend,
            &EngineConfig::immediate(2),
            &mut record,
            None,
            &SamplingParams::default(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(backend.calls(), 2);
        assert_eq!(record.errors[0].len(), 2);
        assert_eq!(record.responses[0], None);
    }

    #[tokio::test]
    async fn fatal_error_propagates() {
        let backend = FakeBackend::script(vec![FakeReply::Fatal("auth failure".into())]);
        let mut record = Record::single_turn("1", "q");

        let err = drive_record(
            &backend,
            &EngineConfig::immediate(3),
            &mut record,
            None,
            &SamplingParams::default(),
            None,
        )
        .await
        .unwrap_err();

        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn exhausted_turn_degrades_context_instead_of_aborting() {
        // Turn 0 exhausts its budget; turn 1 still runs and succeeds.
        let backend = FakeBackend::script(vec![
            FakeReply::Rejected("bad request".into()),
            FakeReply::Rejected("bad request".into()),
            FakeReply::Text("second turn answer".into()),
        ]);
        let mut record = Record::new("1", vec!["t0".into(), "t1".into()]);

        drive_record(
            &backend,
            &EngineConfig::immediate(2),
            &mut record,
            None,
            &SamplingParams::default(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(record.responses[0], None);
        assert_eq!(
            record.responses[1].as_deref(),
            Some("second turn answer")
        );
        assert_eq!(record.errors[0].len(), 2);
        assert!(record.errors[1].is_empty());
    }

    #[tokio::test]
    async fn completed_record_is_a_no_op() {
        let mut record = Record::single_turn("1", "q");
        record.responses.push(Some("done".into()));
        record.extracted.push(Some(ScoreValue::Single("5".into())));
        record.errors.push(vec![]);

        let backend = FakeBackend::script(vec![]);
        drive_record(
            &backend,
            &EngineConfig::immediate(3),
            &mut record,
            None,
            &SamplingParams::default(),
            Some(&score_extractor()),
        )
        .await
        .unwrap();

        assert_eq!(backend.calls(), 0);
        assert_eq!(record.responses[0].as_deref(), Some("done"));
    }
}
