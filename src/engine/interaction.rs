//! Operations a person driving the session performs between runs.
//!
//! `reject`, `insight`, `oracle_fix` and `partition_fix` edit the store and
//! leave it ready to resume; `ask` only reads it. Callers hold the session
//! lock across the edit and the resumed run.

use crate::errors::{ControllerError, ParseError, PhaseError};
use crate::oracle::{Message, ReasoningOracle, user_turns};
use crate::phase::{PhaseOutcome, PhaseRecord};
use crate::reply::{BlockList, CodeBlock, OracleItem, Prediction};
use crate::state::{Coordinate, StateStore};

/// Where the controller should pick up after a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restart {
    /// Resume after this checkpoint.
    From(Coordinate),
    /// Nothing upstream survives; start over.
    Fresh,
}

impl Restart {
    pub fn resume(&self) -> Option<Coordinate> {
        match self {
            Restart::From(coord) => Some(*coord),
            Restart::Fresh => None,
        }
    }
}

/// Discard iteration `(depth, iteration)` and everything after it.
pub fn reject(store: &StateStore, depth: u32, iteration: u32) -> Result<Restart, ControllerError> {
    let target = Coordinate::narrowing(depth, iteration, 1);
    if !store.exists(target) {
        return Err(ControllerError::MissingState { coord: target });
    }

    match store.last_reliable_before(depth, iteration)? {
        Some(reliable) => {
            store.rewind(Some(reliable))?;
            tracing::info!(rejected = %target, reliable = %reliable, "rejected iteration");
            Ok(Restart::From(reliable))
        }
        None => {
            store.clear()?;
            tracing::info!(rejected = %target, "rejected first iteration; restarting");
            Ok(Restart::Fresh)
        }
    }
}

/// Append a user hint to the context stored at `coord` and drop every
/// later checkpoint, so the next run reasons with it.
pub fn insight(store: &StateStore, coord: Coordinate, text: &str) -> Result<(), ControllerError> {
    let state = store
        .load::<PhaseRecord>(coord)
        .ok_or(ControllerError::MissingState { coord })?;
    let record = PhaseRecord {
        session: state.result.session.with_insight(text),
        outcome: state.result.outcome,
    };
    store.save(coord, &state.messages, &record)?;
    store.rewind(Some(coord))?;
    tracing::info!(coord = %coord, "insight recorded");
    Ok(())
}

/// Replace the prediction of iteration `(depth, iteration)` and drop every
/// later checkpoint. Returns the coordinate to resume from.
pub fn oracle_fix(
    store: &StateStore,
    depth: u32,
    iteration: u32,
    items: Vec<OracleItem>,
) -> Result<Coordinate, ControllerError> {
    let coord = Coordinate::narrowing(depth, iteration, 6);
    let state = store
        .load::<PhaseRecord>(coord)
        .ok_or(ControllerError::MissingState { coord })?;
    if !matches!(state.result.outcome, PhaseOutcome::Prediction { .. }) {
        return Err(unexpected(coord, "prediction", &state.result.outcome));
    }
    if items.is_empty() {
        return Err(PhaseError::from(ParseError::Empty {
            phase: "Prediction",
            what: "oracle items",
        })
        .into());
    }

    let record = PhaseRecord {
        session: state.result.session,
        outcome: PhaseOutcome::Prediction {
            prediction: Prediction { items },
        },
    };
    store.save(coord, &state.messages, &record)?;
    store.rewind(Some(coord))?;
    tracing::info!(coord = %coord, "prediction replaced");
    Ok(coord)
}

/// Replace the block list of iteration `(depth, iteration)` and drop every
/// later checkpoint, selection included. The blocks are re-anchored onto
/// the stored window exactly like a partition reply.
pub fn partition_fix(
    store: &StateStore,
    depth: u32,
    iteration: u32,
    blocks: Vec<CodeBlock>,
) -> Result<Coordinate, ControllerError> {
    let coord = Coordinate::narrowing(depth, iteration, 1);
    let state = store
        .load::<PhaseRecord>(coord)
        .ok_or(ControllerError::MissingState { coord })?;
    let previous = match state.result.outcome {
        PhaseOutcome::Partition { blocks } => blocks,
        other => return Err(unexpected(coord, "partition", &other)),
    };
    if blocks.is_empty() {
        return Err(PhaseError::from(ParseError::Empty {
            phase: "Partition",
            what: "blocks",
        })
        .into());
    }

    let fixed = BlockList {
        blocks,
        ..previous
    }
    .normalize(state.result.session.window())
    .map_err(PhaseError::from)?;
    tracing::debug!(blocks = fixed.len(), "normalized block list:\n{}", fixed.listing());

    let record = PhaseRecord {
        session: state.result.session,
        outcome: PhaseOutcome::Partition { blocks: fixed },
    };
    store.save(coord, &state.messages, &record)?;
    store.rewind(Some(coord))?;
    tracing::info!(coord = %coord, "block list replaced");
    Ok(coord)
}

fn unexpected(coord: Coordinate, expected: &'static str, found: &PhaseOutcome) -> ControllerError {
    ControllerError::UnexpectedRecord {
        coord,
        expected,
        found: found.label(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AskReply {
    Answered { reply: String, messages: Vec<Message> },
    /// The transcript already holds the maximum number of user turns.
    Refused { message: String },
}

/// Continue the conversation stored at `coord` with one question.
pub async fn ask(
    store: &StateStore,
    oracle: &dyn ReasoningOracle,
    coord: Coordinate,
    question: &str,
    max_user_turns: usize,
) -> Result<AskReply, ControllerError> {
    let state = store
        .load::<PhaseRecord>(coord)
        .ok_or(ControllerError::MissingState { coord })?;
    let mut messages = state.messages;

    if user_turns(&messages) >= max_user_turns {
        return Ok(AskReply::Refused {
            message: format!(
                "You have reached the maximum interaction limit ({} times). Please manage the session length.",
                max_user_turns
            ),
        });
    }

    messages.push(Message::user(question));
    let reply = oracle.invoke(&messages).await.map_err(PhaseError::from)?;
    messages.push(Message::assistant(reply.clone()));
    Ok(AskReply::Answered { reply, messages })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::sample;
    use crate::oracle::ScriptedOracle;
    use crate::phase::PhaseOutcome;
    use crate::session::Session;
    use tempfile::tempdir;

    fn coord(d: u32, i: u32, p: u32, s: u32) -> Coordinate {
        Coordinate::new(d, i, p, s).unwrap()
    }

    fn seed(store: &StateStore, coords: &[Coordinate], messages: &[Message]) {
        let record = PhaseRecord {
            session: Session::start(&sample::data()).unwrap(),
            outcome: PhaseOutcome::Failed {
                message: "placeholder".into(),
            },
        };
        for c in coords {
            store.save(*c, messages, &record).unwrap();
        }
    }

    #[test]
    fn test_reject_later_iteration_rewinds_to_previous_comparison() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().to_path_buf());
        seed(
            &store,
            &[coord(1, 1, 1, 1), coord(1, 1, 1, 7), coord(1, 2, 1, 1), coord(1, 2, 1, 2)],
            &[],
        );

        let restart = reject(&store, 1, 2).unwrap();
        assert_eq!(restart, Restart::From(coord(1, 1, 1, 7)));
        assert_eq!(store.list().unwrap(), vec![coord(1, 1, 1, 1), coord(1, 1, 1, 7)]);
    }

    #[test]
    fn test_reject_new_depth_rewinds_to_parent_localization() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().to_path_buf());
        seed(
            &store,
            &[coord(1, 1, 1, 7), coord(1, 1, 2, 1), coord(1, 2, 1, 1), coord(1, 2, 2, 1), coord(2, 1, 1, 1)],
            &[],
        );

        let restart = reject(&store, 2, 1).unwrap();
        assert_eq!(restart.resume(), Some(coord(1, 2, 2, 1)));
        assert!(!store.exists(coord(2, 1, 1, 1)));
    }

    #[test]
    fn test_reject_first_iteration_clears_session() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().to_path_buf());
        seed(&store, &[coord(1, 1, 1, 1), coord(1, 1, 1, 2)], &[]);

        assert_eq!(reject(&store, 1, 1).unwrap(), Restart::Fresh);
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_reject_requires_partition() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().to_path_buf());
        let err = reject(&store, 1, 3).unwrap_err();
        assert!(matches!(err, ControllerError::MissingState { .. }));
    }

    #[test]
    fn test_insight_appends_context_and_rewinds() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().to_path_buf());
        seed(&store, &[coord(1, 1, 1, 7), coord(1, 1, 2, 1)], &[]);

        insight(&store, coord(1, 1, 1, 7), "c should never be negative").unwrap();

        let state = store.load::<PhaseRecord>(coord(1, 1, 1, 7)).unwrap();
        assert!(state
            .result
            .session
            .context
            .ends_with("\n\nUser insight:\nc should never be negative"));
        assert_eq!(store.list().unwrap(), vec![coord(1, 1, 1, 7)]);
    }

    fn seed_outcome(store: &StateStore, at: Coordinate, outcome: PhaseOutcome) {
        let record = PhaseRecord {
            session: Session::start(&sample::data()).unwrap(),
            outcome,
        };
        store.save(at, &[Message::user("request")], &record).unwrap();
    }

    fn item(name: &str, expected: &str) -> OracleItem {
        OracleItem {
            name: name.into(),
            analysis: "by hand".into(),
            expected: expected.into(),
        }
    }

    fn block(id: usize, start_line: i64, end_line: i64, comment: &str) -> CodeBlock {
        CodeBlock {
            id,
            start_line,
            end_line,
            comment: comment.into(),
        }
    }

    #[test]
    fn test_oracle_fix_replaces_prediction_and_rewinds() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().to_path_buf());
        seed(&store, &[coord(1, 1, 1, 1), coord(1, 1, 1, 7), coord(1, 1, 2, 1)], &[]);
        seed_outcome(
            &store,
            coord(1, 1, 1, 6),
            PhaseOutcome::Prediction {
                prediction: Prediction {
                    items: vec![item("c", "-1")],
                },
            },
        );

        let resume = oracle_fix(&store, 1, 1, vec![item("c", "3")]).unwrap();
        assert_eq!(resume, coord(1, 1, 1, 6));
        assert_eq!(store.list().unwrap(), vec![coord(1, 1, 1, 1), coord(1, 1, 1, 6)]);

        let state = store.load::<PhaseRecord>(coord(1, 1, 1, 6)).unwrap();
        match state.result.outcome {
            PhaseOutcome::Prediction { prediction } => {
                assert_eq!(prediction.item("c").unwrap().expected, "3");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(state.messages.len(), 1);
    }

    #[test]
    fn test_oracle_fix_requires_prediction_state() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().to_path_buf());
        let err = oracle_fix(&store, 1, 1, vec![item("c", "3")]).unwrap_err();
        assert!(matches!(err, ControllerError::MissingState { .. }));

        seed(&store, &[coord(1, 1, 1, 6)], &[]);
        let err = oracle_fix(&store, 1, 1, vec![item("c", "3")]).unwrap_err();
        assert!(matches!(
            err,
            ControllerError::UnexpectedRecord {
                expected: "prediction",
                found: "failed",
                ..
            }
        ));
    }

    #[test]
    fn test_oracle_fix_rejects_empty_prediction() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().to_path_buf());
        seed_outcome(
            &store,
            coord(1, 1, 1, 6),
            PhaseOutcome::Prediction {
                prediction: Prediction {
                    items: vec![item("c", "-1")],
                },
            },
        );
        assert!(oracle_fix(&store, 1, 1, Vec::new()).is_err());
        assert!(store.exists(coord(1, 1, 1, 6)));
    }

    fn seed_partition(store: &StateStore) {
        let blocks = BlockList {
            start_line: 1,
            end_line: 10,
            description: "arrange then act".into(),
            blocks: vec![block(0, 1, 5, "setup"), block(1, 6, 10, "compute and check")],
        };
        seed_outcome(store, coord(1, 1, 1, 1), PhaseOutcome::Partition { blocks });
    }

    #[test]
    fn test_partition_fix_normalizes_blocks_and_rewinds() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().to_path_buf());
        seed_partition(&store);
        seed(&store, &[coord(1, 1, 1, 2), coord(1, 1, 1, 3)], &[]);

        let fixed = vec![
            block(7, 3, 3, "inputs"),
            block(8, 4, 7, "call add"),
            block(9, 8, 8, "check"),
        ];
        let resume = partition_fix(&store, 1, 1, fixed).unwrap();
        assert_eq!(resume, coord(1, 1, 1, 1));
        assert_eq!(store.list().unwrap(), vec![coord(1, 1, 1, 1)]);

        let state = store.load::<PhaseRecord>(coord(1, 1, 1, 1)).unwrap();
        match state.result.outcome {
            PhaseOutcome::Partition { blocks } => {
                assert_eq!(
                    blocks.listing(),
                    "- ID: 0, Line 1-3: inputs\n- ID: 1, Line 4-7: call add\n- ID: 2, Line 8-10: check"
                );
                assert_eq!(blocks.description, "arrange then act");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_partition_fix_rejects_blocks_outside_window() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().to_path_buf());
        seed_partition(&store);
        seed(&store, &[coord(1, 1, 1, 2)], &[]);

        let err = partition_fix(&store, 1, 1, vec![block(0, 1, 12, "too long"), block(1, 13, 14, "x")])
            .unwrap_err();
        assert!(matches!(
            err,
            ControllerError::Phase(PhaseError::Parse(ParseError::BlockOutOfWindow { id: 0, .. }))
        ));
        // nothing was touched
        assert_eq!(store.list().unwrap(), vec![coord(1, 1, 1, 1), coord(1, 1, 1, 2)]);
        assert!(partition_fix(&store, 1, 1, Vec::new()).is_err());
    }

    #[tokio::test]
    async fn test_ask_continues_transcript_without_saving() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().to_path_buf());
        let history = vec![Message::user("compare"), Message::assistant("<format>...</format>")];
        seed(&store, &[coord(1, 1, 1, 7)], &history);
        let oracle = ScriptedOracle::new(["because c is -1"]);

        let reply = ask(&store, &oracle, coord(1, 1, 1, 7), "why inconsistent?", 20)
            .await
            .unwrap();
        match reply {
            AskReply::Answered { reply, messages } => {
                assert_eq!(reply, "because c is -1");
                assert_eq!(messages.len(), 4);
                assert_eq!(messages[2].content, "why inconsistent?");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(oracle.requests()[0].len(), 3);
        let stored = store.load::<PhaseRecord>(coord(1, 1, 1, 7)).unwrap();
        assert_eq!(stored.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_ask_refuses_at_turn_limit() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().to_path_buf());
        let history: Vec<Message> = (0..3).map(|i| Message::user(format!("q{}", i))).collect();
        seed(&store, &[coord(1, 1, 1, 7)], &history);
        let oracle = ScriptedOracle::new(["unused"]);

        let reply = ask(&store, &oracle, coord(1, 1, 1, 7), "one more?", 3).await.unwrap();
        assert_eq!(
            reply,
            AskReply::Refused {
                message: "You have reached the maximum interaction limit (3 times). Please manage the session length."
                    .into()
            }
        );
        assert_eq!(oracle.remaining(), 1);
    }
}
