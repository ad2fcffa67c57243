//! The phase controller.
//!
//! Every phase result is checkpointed under its coordinate before the next
//! phase starts, and every phase reads its inputs back from the store, so a
//! run can be resumed from any saved coordinate. The analysis is driven by
//! a flat loop over coordinates; stepping into a callee only bumps `depth`.

use super::{ManualOverride, RunOutcome};
use crate::errors::ControllerError;
use crate::executor::{PhaseExecutor, PhaseRun, PromptSet};
use crate::fixtures::DebugData;
use crate::oracle::{Message, ReasoningOracle};
use crate::phase::{CombinationIo, PhaseKind, PhaseOutcome, PhaseRecord};
use crate::reply::{
    Abstraction, BlockList, CodeBlock, Comparison, Expectation, Prediction, Specification,
};
use crate::session::Session;
use crate::state::{Coordinate, PersistedState, SessionLock, StateStore};
use pilot_trace::{ExtractOptions, RecordedCall, recorded_calls};

/// What the loop does after the checkpoint at the current coordinate.
enum Step {
    /// A phase ran and must be checkpointed at `coord`.
    Ran { coord: Coordinate, run: PhaseRun },
    /// The iteration was undone; continue from its partition.
    Backtrack { coord: Coordinate, session: Session },
}

pub struct Controller<'a> {
    store: &'a StateStore,
    data: &'a DebugData,
    executor: PhaseExecutor<'a>,
}

impl<'a> Controller<'a> {
    pub fn new(
        store: &'a StateStore,
        data: &'a DebugData,
        oracle: &'a dyn ReasoningOracle,
        prompts: &'a PromptSet,
        trace: ExtractOptions,
    ) -> Self {
        Self {
            store,
            data,
            executor: PhaseExecutor::new(data, oracle, prompts, trace),
        }
    }

    /// Start a fresh analysis, discarding earlier checkpoints, or continue
    /// after the checkpoint at `resume`, discarding every later one.
    ///
    /// Errors never escape: they are reported as [`RunOutcome::Failed`].
    pub async fn run(&self, resume: Option<Coordinate>, manual: Option<ManualOverride>) -> RunOutcome {
        let result = match self.store.lock() {
            Ok(lock) => self.drive(&lock, resume, manual).await,
            Err(e) => Err(e.into()),
        };
        finish(result)
    }

    /// [`Controller::run`] for a caller that already holds the session lock,
    /// typically across an edit of the store.
    pub async fn run_locked(
        &self,
        lock: &SessionLock,
        resume: Option<Coordinate>,
        manual: Option<ManualOverride>,
    ) -> RunOutcome {
        finish(self.drive(lock, resume, manual).await)
    }

    async fn drive(
        &self,
        _lock: &SessionLock,
        resume: Option<Coordinate>,
        manual: Option<ManualOverride>,
    ) -> Result<RunOutcome, ControllerError> {
        let (mut current, mut session) = match resume {
            None => {
                let origin = Coordinate::origin();
                let stale = self.store.clear()?;
                tracing::info!(stale, "starting fresh analysis at {}", origin);
                let run = self.executor.partition(Session::start(self.data)?).await;
                let session = self.checkpoint(origin, run)?;
                (origin, session)
            }
            Some(coord) => {
                let record = self.load(coord)?.result;
                let stale = self.store.rewind(Some(coord))?;
                tracing::info!(coord = %coord, phase = record.outcome.label(), stale, "resuming");
                match record.outcome {
                    PhaseOutcome::Failed { message } => {
                        return Err(ControllerError::PhaseFailed { coord, message });
                    }
                    PhaseOutcome::Localization { localization, .. } if localization.is_root_cause() => {
                        return Ok(RunOutcome::RootCauseFound { coord });
                    }
                    _ => (coord, record.session),
                }
            }
        };

        let mut iterations = 0usize;
        loop {
            iterations += 1;
            tracing::debug!(iteration = iterations, coord = %current, "controller step");

            match self.advance(current, session, manual).await? {
                Step::Backtrack { coord, session: restored } => {
                    tracing::info!(coord = %coord, "all outputs consistent; backtracking");
                    current = coord;
                    session = restored;
                }
                Step::Ran { coord, run } => {
                    let root_cause = matches!(
                        &run.outcome,
                        PhaseOutcome::Localization { localization, .. } if localization.is_root_cause()
                    );
                    session = self.checkpoint(coord, run)?;
                    if root_cause {
                        tracing::info!(coord = %coord, "root cause found");
                        return Ok(RunOutcome::RootCauseFound { coord });
                    }
                    if manual.is_some() {
                        return Ok(RunOutcome::Overridden { coord });
                    }
                    current = coord;
                }
            }
        }
    }

    /// Decide and run the phase that follows the checkpoint at `current`.
    async fn advance(
        &self,
        current: Coordinate,
        session: Session,
        manual: Option<ManualOverride>,
    ) -> Result<Step, ControllerError> {
        let block_override = manual.and_then(|m| m.block());
        let localize_override = manual.and_then(|m| m.localize());

        if current.is_localizing() {
            // the stored session already focuses on the callee
            let coord = Coordinate::narrowing(current.depth + 1, 1, 1);
            let run = self.executor.partition(session).await;
            return Ok(Step::Ran { coord, run });
        }

        let step = match current.step {
            1 => {
                let blocks = self.partition_at(current)?;
                if current.iteration > 1 && blocks.len() == 1 {
                    tracing::info!(coord = %current, "window is impartible; localizing previous iteration");
                    self.store.remove(current)?;
                    let previous = Coordinate::narrowing(current.depth, current.iteration - 1, 1);
                    let coord = Coordinate::localizing(previous.depth, previous.iteration);
                    let (selected, calls) = self.localization_inputs(previous, &session)?;
                    let run = self
                        .executor
                        .localization(session, &selected, &calls, localize_override)
                        .await;
                    Step::Ran { coord, run }
                } else {
                    let run = self.executor.selection(session, &blocks, block_override).await;
                    Step::Ran {
                        coord: current.at_step(2),
                        run,
                    }
                }
            }
            2 => {
                let (_, selected) = self.selection_at(current)?;
                let run = self.executor.abstraction(session, &selected).await;
                Step::Ran {
                    coord: current.at_step(3),
                    run,
                }
            }
            3 => {
                let (_, selected) = self.selection_at(current.at_step(2))?;
                let blocks = self.partition_at(current.at_step(1))?;
                let run = self.executor.extraction(session, &selected, &blocks).await;
                Step::Ran {
                    coord: current.at_step(4),
                    run,
                }
            }
            4 => {
                let expectations = self.extraction_at(current)?;
                let abstraction = self.abstraction_at(current.at_step(3))?;
                let (block, _) = self.selection_at(current.at_step(2))?;
                let run = self
                    .executor
                    .combination(session, &block, &abstraction.presentation(), &expectations)
                    .await;
                Step::Ran {
                    coord: current.at_step(5),
                    run,
                }
            }
            5 => {
                let (specification, io, transcript) = self.combination_at(current)?;
                let run = self
                    .executor
                    .prediction(session, &specification.render(), &io.invalue, transcript)
                    .await;
                Step::Ran {
                    coord: current.at_step(6),
                    run,
                }
            }
            6 => {
                let (prediction, transcript) = self.prediction_at(current)?;
                let (_, io, _) = self.combination_at(current.at_step(5))?;
                let minimum = self.partition_at(current.at_step(1))?.len();
                let run = self
                    .executor
                    .comparison(session, &prediction, &io.outvalue, transcript, minimum)
                    .await;
                Step::Ran {
                    coord: current.at_step(7),
                    run,
                }
            }
            _ => {
                let (comparison, minimum, compared) = self.comparison_at(current)?;
                if comparison.all_consistent() {
                    let (coord, session) = self.backtrack(current, compared)?;
                    return Ok(Step::Backtrack { coord, session });
                }

                let localize = minimum == 1 || session.is_single_line() || current.iteration >= 2;
                if localize {
                    let coord = Coordinate::localizing(current.depth, current.iteration);
                    let (selected, calls) = self.localization_inputs(current, &session)?;
                    let run = self
                        .executor
                        .localization(session, &selected, &calls, localize_override)
                        .await;
                    Step::Ran { coord, run }
                } else {
                    let coord = Coordinate::narrowing(current.depth, current.iteration + 1, 1);
                    let run = self.executor.partition(session).await;
                    Step::Ran { coord, run }
                }
            }
        };
        Ok(step)
    }

    /// Drop steps 7..=2 of this iteration and carry the comparison's context
    /// into the surviving partition checkpoint.
    fn backtrack(&self, current: Coordinate, compared: Session) -> Result<(Coordinate, Session), ControllerError> {
        for step in (2..=current.step).rev() {
            self.store.remove(current.at_step(step))?;
        }
        let origin = current.at_step(1);
        let mut state = self.load(origin)?;
        state.result.session.context = compared.context;
        self.store.save(origin, &state.messages, &state.result)?;
        Ok((origin, state.result.session))
    }

    /// Selected block of `iteration`'s step 2 and the calls made inside the
    /// span recorded at its step 5.
    fn localization_inputs(
        &self,
        iteration: Coordinate,
        session: &Session,
    ) -> Result<(String, Vec<RecordedCall>), ControllerError> {
        let (_, selected) = self.selection_at(iteration.at_step(2))?;
        let (_, io, _) = self.combination_at(iteration.at_step(5))?;
        let calls = match io.span {
            Some(span) => recorded_calls(&self.data.calls, session.call_id, span),
            None => Vec::new(),
        };
        tracing::info!(calls = calls.len(), "found calls in selected block execution range");
        Ok((selected, calls))
    }

    fn checkpoint(&self, coord: Coordinate, run: PhaseRun) -> Result<Session, ControllerError> {
        let record = PhaseRecord {
            session: run.session,
            outcome: run.outcome,
        };
        self.store.save(coord, &run.messages, &record)?;
        tracing::info!(coord = %coord, phase = %PhaseKind::from_coordinate(coord), "checkpoint saved");
        match record.outcome {
            PhaseOutcome::Failed { message } => Err(ControllerError::PhaseFailed { coord, message }),
            _ => Ok(record.session),
        }
    }

    fn load(&self, coord: Coordinate) -> Result<PersistedState<PhaseRecord>, ControllerError> {
        self.store
            .load(coord)
            .ok_or(ControllerError::MissingState { coord })
    }

    fn partition_at(&self, coord: Coordinate) -> Result<BlockList, ControllerError> {
        match self.load(coord)?.result.outcome {
            PhaseOutcome::Partition { blocks } => Ok(blocks),
            other => Err(unexpected(coord, "partition", &other)),
        }
    }

    fn selection_at(&self, coord: Coordinate) -> Result<(CodeBlock, String), ControllerError> {
        match self.load(coord)?.result.outcome {
            PhaseOutcome::Selection { block, selected, .. } => Ok((block, selected)),
            other => Err(unexpected(coord, "selection", &other)),
        }
    }

    fn abstraction_at(&self, coord: Coordinate) -> Result<Abstraction, ControllerError> {
        match self.load(coord)?.result.outcome {
            PhaseOutcome::Abstraction { abstraction } => Ok(abstraction),
            other => Err(unexpected(coord, "abstraction", &other)),
        }
    }

    fn extraction_at(&self, coord: Coordinate) -> Result<Vec<Expectation>, ControllerError> {
        match self.load(coord)?.result.outcome {
            PhaseOutcome::Extraction { expectations } => Ok(expectations),
            other => Err(unexpected(coord, "extraction", &other)),
        }
    }

    fn combination_at(
        &self,
        coord: Coordinate,
    ) -> Result<(Specification, CombinationIo, Vec<Message>), ControllerError> {
        let state = self.load(coord)?;
        match state.result.outcome {
            PhaseOutcome::Combination { specification, io } => Ok((specification, io, state.messages)),
            other => Err(unexpected(coord, "combination", &other)),
        }
    }

    fn prediction_at(&self, coord: Coordinate) -> Result<(Prediction, Vec<Message>), ControllerError> {
        let state = self.load(coord)?;
        match state.result.outcome {
            PhaseOutcome::Prediction { prediction } => Ok((prediction, state.messages)),
            other => Err(unexpected(coord, "prediction", &other)),
        }
    }

    fn comparison_at(&self, coord: Coordinate) -> Result<(Comparison, usize, Session), ControllerError> {
        let record = self.load(coord)?.result;
        match record.outcome {
            PhaseOutcome::Comparison { comparison, minimum } => Ok((comparison, minimum, record.session)),
            other => Err(unexpected(coord, "comparison", &other)),
        }
    }
}

fn finish(result: Result<RunOutcome, ControllerError>) -> RunOutcome {
    match result {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!("debugging stopped: {}", e);
            RunOutcome::Failed {
                message: e.to_string(),
            }
        }
    }
}

fn unexpected(coord: Coordinate, expected: &'static str, found: &PhaseOutcome) -> ControllerError {
    ControllerError::UnexpectedRecord {
        coord,
        expected,
        found: found.label(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::LocalizeOverride;
    use crate::fixtures::sample;
    use crate::oracle::ScriptedOracle;
    use tempfile::tempdir;

    const PARTITION_TEST: &str = "<format>\n\"start_line\": 1,\n\"end_line\": 10,\n\"description\": \"arrange then act\",\n- \"line\": 5, \"comment\": \"setup\"\n- \"line\": 10, \"comment\": \"compute and check\"\n</format>";
    const PARTITION_SINGLE: &str = "<format>\n\"start_line\": 6,\n\"end_line\": 10,\n\"description\": \"act\",\n- \"line\": 10, \"comment\": \"all of it\"\n</format>";
    const PARTITION_ADD: &str = "<format>\n\"start_line\": 20,\n\"end_line\": 22,\n\"description\": \"add\",\n- \"line\": 22, \"comment\": \"body\"\n</format>";
    const SELECT_0: &str = "<format>\n\"analysis\": \"only block\",\n\"id\": 0\n</format>";
    const SELECT_1: &str = "<format>\n\"analysis\": \"c is computed here\",\n\"id\": 1\n</format>";
    const ABSTRACT: &str = "<format>\n\"signature\": \"int compute(int a, int b)\",\n\"intent\": \"c = a + b\"\n</format>";
    const EXTRACT: &str = "<format>\n- \"object\": \"c\", \"stage\": \"after add\", \"expect\": \"3\"\n</format>";
    const COMBINE: &str = "<format>\n\"input\":\n- \"name\": \"a\", \"detail\": \"int\"\n\"output\":\n- \"name\": \"c\", \"detail\": \"sum\"\n\"operational_semantics\":\n- \"c = a + b\"\n</format>";
    const PREDICT: &str = "<format>\n\"oracle\":\n- \"name\": \"c\", \"analysis\": \"1 + 2\", \"expected\": \"3\"\n</format>";
    const COMPARE_BAD: &str = "<format>\n\"match\":\n- \"name\": \"c\", \"actual\": \"-1\", \"reason\": \"sign flipped\", \"consistent\": 0\n\"summary\": \"c is wrong after add\"\n</format>";
    const COMPARE_GOOD: &str = "<format>\n\"match\":\n- \"name\": \"c\", \"actual\": \"3\", \"reason\": \"same\", \"consistent\": 1\n\"summary\": \"this block is fine\"\n</format>";
    const LOCALIZE_STEP: &str = "<format>\n\"analysis\": \"add returns the wrong value\",\n\"fault\": 0,\n\"details\": 7\n</format>";
    const LOCALIZE_ROOT: &str = "<format>\n\"analysis\": \"subtracts instead of adding\",\n\"fault\": 1,\n\"details\": \"line 21\"\n</format>";

    fn coord(d: u32, i: u32, p: u32, s: u32) -> Coordinate {
        Coordinate::new(d, i, p, s).unwrap()
    }

    struct Harness {
        _dir: tempfile::TempDir,
        store: StateStore,
        data: DebugData,
        prompts: PromptSet,
    }

    impl Harness {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let store = StateStore::for_session(dir.path(), "Sample", "1");
            Self {
                _dir: dir,
                store,
                data: sample::data(),
                prompts: PromptSet::builtin(),
            }
        }

        async fn run(
            &self,
            oracle: &ScriptedOracle,
            resume: Option<Coordinate>,
            manual: Option<ManualOverride>,
        ) -> RunOutcome {
            Controller::new(&self.store, &self.data, oracle, &self.prompts, ExtractOptions::default())
                .run(resume, manual)
                .await
        }

        fn record(&self, at: Coordinate) -> PhaseRecord {
            self.store.load::<PhaseRecord>(at).unwrap().result
        }
    }

    #[tokio::test]
    async fn test_full_run_narrows_steps_into_callee_and_finds_root_cause() {
        let h = Harness::new();
        let oracle = ScriptedOracle::new([
            // depth 1, iteration 1
            PARTITION_TEST, SELECT_1, ABSTRACT, EXTRACT, COMBINE, PREDICT, COMPARE_BAD,
            // depth 1, iteration 2: one block, so localize iteration 1
            PARTITION_SINGLE, LOCALIZE_STEP,
            // depth 2 inside Calc#add
            PARTITION_ADD, SELECT_0, ABSTRACT, EXTRACT, COMBINE, PREDICT, COMPARE_BAD, LOCALIZE_ROOT,
        ]);

        let outcome = h.run(&oracle, None, None).await;
        assert_eq!(outcome, RunOutcome::RootCauseFound { coord: coord(2, 1, 2, 1) });
        assert_eq!(oracle.remaining(), 0);

        let selected = h.record(coord(1, 1, 1, 2));
        assert_eq!((selected.session.start_line, selected.session.end_line), (6, 10));

        // impartible partition is dropped, localization lands on iteration 1
        assert!(!h.store.exists(coord(1, 2, 1, 1)));
        let located = h.record(coord(1, 1, 2, 1));
        match &located.outcome {
            PhaseOutcome::Localization { recorded_calls, .. } => {
                assert_eq!(recorded_calls.len(), 1);
                assert_eq!(recorded_calls[0].id, 7);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(located.session.call_id, 7);
        assert_eq!(located.session.stack, vec!["Test#run".to_string(), "Calc#add".to_string()]);

        let deeper = h.record(coord(2, 1, 1, 1));
        assert_eq!(deeper.session.method_name, "Calc#add");

        // the impartible step went straight from partition to localization
        let requests = oracle.requests();
        assert!(requests[8][0].content.contains("7: Calc#add"));
        assert!(requests[8][0].content.contains("- ID: 1, Line 6-10: compute and check"));
    }

    #[tokio::test]
    async fn test_consistent_comparison_backtracks_to_partition() {
        let h = Harness::new();
        let oracle = ScriptedOracle::new([
            PARTITION_TEST, SELECT_1, ABSTRACT, EXTRACT, COMBINE, PREDICT, COMPARE_GOOD,
            "no format here",
        ]);

        let outcome = h.run(&oracle, None, None).await;
        match outcome {
            RunOutcome::Failed { message } => assert!(message.contains("Agent Selection failed")),
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(
            h.store.list().unwrap(),
            vec![coord(1, 1, 1, 1), coord(1, 1, 1, 2)]
        );
        let partition = h.record(coord(1, 1, 1, 1));
        assert!(partition
            .session
            .context
            .ends_with("analysis from Test#run[6:10]:\nthis block is fine"));
        assert!(h.record(coord(1, 1, 1, 2)).outcome.is_failed());

        // re-selection saw the full window again
        let requests = oracle.requests();
        assert!(requests[7][0].content.contains("10 assert c == 3;"));
        assert!(requests[7][0].content.contains("1 int a = 1;"));
    }

    #[tokio::test]
    async fn test_block_override_runs_one_phase() {
        let h = Harness::new();
        let oracle = ScriptedOracle::new([PARTITION_TEST, SELECT_1, ABSTRACT]);

        let outcome = h.run(&oracle, None, Some(ManualOverride::Block(0))).await;
        assert_eq!(outcome, RunOutcome::Overridden { coord: coord(1, 1, 1, 2) });
        assert_eq!(oracle.remaining(), 1);

        let selected = h.record(coord(1, 1, 1, 2));
        assert_eq!((selected.session.start_line, selected.session.end_line), (1, 5));
    }

    #[tokio::test]
    async fn test_resume_continues_after_checkpoint() {
        let h = Harness::new();
        let first = ScriptedOracle::new([PARTITION_TEST, SELECT_1]);
        h.run(&first, None, Some(ManualOverride::Block(0))).await;

        let second = ScriptedOracle::new([ABSTRACT]);
        let outcome = h
            .run(
                &second,
                Some(coord(1, 1, 1, 2)),
                Some(ManualOverride::Localize(LocalizeOverride::RootCause)),
            )
            .await;
        assert_eq!(outcome, RunOutcome::Overridden { coord: coord(1, 1, 1, 3) });
        let request = &second.requests()[0][0].content;
        assert!(request.contains("- ID: 0, Line 1-5: setup"));
        assert!(!request.contains("7 c = add(a, b);"));
    }

    #[tokio::test]
    async fn test_resume_discards_checkpoints_of_the_old_path() {
        let h = Harness::new();
        // stops on an exhausted script after saving (1,1,1,5)
        let first = ScriptedOracle::new([PARTITION_TEST, SELECT_1, ABSTRACT, EXTRACT, COMBINE]);
        assert!(h.run(&first, None, None).await.is_failed());
        assert!(h.store.exists(coord(1, 1, 1, 5)));

        let second = ScriptedOracle::new([SELECT_1]);
        let outcome = h
            .run(&second, Some(coord(1, 1, 1, 1)), Some(ManualOverride::Block(0)))
            .await;
        assert_eq!(outcome, RunOutcome::Overridden { coord: coord(1, 1, 1, 2) });
        assert_eq!(
            h.store.list().unwrap(),
            vec![coord(1, 1, 1, 1), coord(1, 1, 1, 2)]
        );
        let selected = h.record(coord(1, 1, 1, 2));
        assert_eq!((selected.session.start_line, selected.session.end_line), (1, 5));
    }

    #[tokio::test]
    async fn test_run_locked_uses_the_callers_lock() {
        let h = Harness::new();
        let oracle = ScriptedOracle::new([PARTITION_TEST, SELECT_1]);
        let lock = h.store.lock().unwrap();

        let outcome = Controller::new(&h.store, &h.data, &oracle, &h.prompts, ExtractOptions::default())
            .run_locked(&lock, None, Some(ManualOverride::Block(1)))
            .await;
        assert_eq!(outcome, RunOutcome::Overridden { coord: coord(1, 1, 1, 2) });

        // the lock is still held for anyone else
        assert!(h.store.lock().is_err());
        drop(lock);
        assert!(h.store.lock().is_ok());
    }

    #[tokio::test]
    async fn test_resume_from_root_cause_is_terminal() {
        let h = Harness::new();
        let oracle = ScriptedOracle::new([
            PARTITION_TEST, SELECT_1, ABSTRACT, EXTRACT, COMBINE, PREDICT, COMPARE_BAD,
            PARTITION_SINGLE, LOCALIZE_STEP,
            PARTITION_ADD, SELECT_0, ABSTRACT, EXTRACT, COMBINE, PREDICT, COMPARE_BAD, LOCALIZE_ROOT,
        ]);
        h.run(&oracle, None, None).await;

        let idle = ScriptedOracle::new(Vec::<String>::new());
        let outcome = h.run(&idle, Some(coord(2, 1, 2, 1)), None).await;
        assert_eq!(outcome, RunOutcome::RootCauseFound { coord: coord(2, 1, 2, 1) });
        assert!(idle.requests().is_empty());
    }

    #[tokio::test]
    async fn test_later_iteration_inconsistency_localizes() {
        let h = Harness::new();
        let data = &h.data;
        let session = Session::start(data).unwrap();
        let blocks = crate::reply::parse_partition(PARTITION_TEST)
            .unwrap()
            .normalize(session.window())
            .unwrap();
        let block = blocks.blocks[1].clone();
        let narrowed = session.clone().narrow_to(&block);
        let save = |at: Coordinate, session: &Session, outcome: PhaseOutcome| {
            h.store
                .save(
                    at,
                    &[],
                    &PhaseRecord {
                        session: session.clone(),
                        outcome,
                    },
                )
                .unwrap();
        };

        save(coord(1, 2, 1, 1), &session, PhaseOutcome::Partition { blocks });
        save(
            coord(1, 2, 1, 2),
            &narrowed,
            PhaseOutcome::Selection {
                analysis: "a".into(),
                selected: block.describe(),
                block,
            },
        );
        save(
            coord(1, 2, 1, 5),
            &narrowed,
            PhaseOutcome::Combination {
                specification: Specification::default(),
                io: CombinationIo {
                    span: Some(pilot_trace::ExecutionSpan { first: 3, last: 6 }),
                    ..CombinationIo::default()
                },
            },
        );
        let comparison = crate::reply::parse_comparison(COMPARE_BAD).unwrap();
        save(
            coord(1, 2, 1, 7),
            &narrowed,
            PhaseOutcome::Comparison {
                comparison,
                minimum: 2,
            },
        );

        let oracle = ScriptedOracle::new([LOCALIZE_ROOT]);
        let outcome = h.run(&oracle, Some(coord(1, 2, 1, 7)), None).await;
        assert_eq!(outcome, RunOutcome::RootCauseFound { coord: coord(1, 2, 2, 1) });
        assert!(oracle.requests()[0][0].content.contains("7: Calc#add"));
    }

    #[tokio::test]
    async fn test_resume_from_missing_or_failed_state() {
        let h = Harness::new();
        let oracle = ScriptedOracle::new(Vec::<String>::new());
        match h.run(&oracle, Some(coord(1, 1, 1, 3)), None).await {
            RunOutcome::Failed { message } => assert!(message.contains("1,1,1,3")),
            other => panic!("unexpected {:?}", other),
        }

        // bootstrap partition fails on an exhausted script and is persisted
        let outcome = h.run(&oracle, None, None).await;
        assert!(outcome.is_failed());
        assert!(h.record(Coordinate::origin()).outcome.is_failed());
        match h.run(&oracle, Some(Coordinate::origin()), None).await {
            RunOutcome::Failed { message } => assert!(message.contains("Agent Partition failed")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_locked_session_fails_fast() {
        let h = Harness::new();
        let _held = h.store.lock().unwrap();
        let oracle = ScriptedOracle::new([PARTITION_TEST]);
        match h.run(&oracle, None, None).await {
            RunOutcome::Failed { message } => assert!(message.contains("locked")),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(oracle.remaining(), 1);
    }
}
