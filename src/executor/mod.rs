//! Phase execution.
//!
//! Each operation builds one request from the session and the results of
//! earlier phases, asks the oracle once, and parses the reply. A failed
//! call or an unparseable reply becomes [`PhaseOutcome::Failed`]; phases
//! never retry on their own.

pub mod prompts;
pub mod reconcile;

pub use prompts::PromptSet;
pub use reconcile::{NO_VALUE, consistency_ratio, reconcile};

use crate::errors::{ParseError, PhaseError};
use crate::fixtures::DebugData;
use crate::oracle::{Message, ReasoningOracle};
use crate::phase::{CombinationIo, PhaseKind, PhaseOutcome};
use crate::reply::{
    self, BlockList, CodeBlock, Details, Expectation, Localization, Prediction, render_expectations,
};
use crate::session::Session;
use pilot_trace::{BlockIo, DependencyExtractor, ExtractOptions, RecordedCall, render_calls};

/// Forced localization decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalizeOverride {
    /// Declare the current block the root cause.
    RootCause,
    /// Step into the n-th (1-based) recorded call.
    StepInto(usize),
}

/// What one phase produced.
#[derive(Debug, Clone)]
pub struct PhaseRun {
    /// Request/reply transcript of this phase.
    pub messages: Vec<Message>,
    pub outcome: PhaseOutcome,
    /// Session the next phase should run under.
    pub session: Session,
}

type Attempt = Result<(Vec<Message>, PhaseOutcome, Session), PhaseError>;

pub struct PhaseExecutor<'a> {
    data: &'a DebugData,
    oracle: &'a dyn ReasoningOracle,
    prompts: &'a PromptSet,
    trace: ExtractOptions,
}

impl<'a> PhaseExecutor<'a> {
    pub fn new(
        data: &'a DebugData,
        oracle: &'a dyn ReasoningOracle,
        prompts: &'a PromptSet,
        trace: ExtractOptions,
    ) -> Self {
        Self {
            data,
            oracle,
            prompts,
            trace,
        }
    }

    pub async fn partition(&self, session: Session) -> PhaseRun {
        let attempt = self.try_partition(&session).await;
        finish(PhaseKind::Partition, session, attempt)
    }

    pub async fn selection(&self, session: Session, blocks: &BlockList, forced: Option<usize>) -> PhaseRun {
        let attempt = self.try_selection(&session, blocks, forced).await;
        finish(PhaseKind::Selection, session, attempt)
    }

    pub async fn abstraction(&self, session: Session, selected: &str) -> PhaseRun {
        let attempt = self.try_abstraction(&session, selected).await;
        finish(PhaseKind::Abstraction, session, attempt)
    }

    pub async fn extraction(&self, session: Session, selected: &str, blocks: &BlockList) -> PhaseRun {
        let attempt = self.try_extraction(&session, selected, blocks).await;
        finish(PhaseKind::Extraction, session, attempt)
    }

    pub async fn combination(
        &self,
        session: Session,
        block: &CodeBlock,
        presentation: &str,
        expectations: &[Expectation],
    ) -> PhaseRun {
        let attempt = self
            .try_combination(&session, block, presentation, expectations)
            .await;
        finish(PhaseKind::Combination, session, attempt)
    }

    /// Continues the Combination transcript.
    pub async fn prediction(
        &self,
        session: Session,
        specification: &str,
        invalue: &str,
        transcript: Vec<Message>,
    ) -> PhaseRun {
        let attempt = self
            .try_prediction(&session, specification, invalue, transcript)
            .await;
        finish(PhaseKind::Prediction, session, attempt)
    }

    /// Continues the Prediction transcript and records the summary in the context.
    pub async fn comparison(
        &self,
        session: Session,
        prediction: &Prediction,
        outvalue: &str,
        transcript: Vec<Message>,
        minimum: usize,
    ) -> PhaseRun {
        let attempt = self
            .try_comparison(&session, prediction, outvalue, transcript, minimum)
            .await;
        finish(PhaseKind::Comparison, session, attempt)
    }

    pub async fn localization(
        &self,
        session: Session,
        selected: &str,
        calls: &[RecordedCall],
        forced: Option<LocalizeOverride>,
    ) -> PhaseRun {
        let attempt = self.try_localization(&session, selected, calls, forced).await;
        finish(PhaseKind::Localization, session, attempt)
    }

    async fn try_partition(&self, session: &Session) -> Attempt {
        let test = self.data.failure_report();
        let stack = session.stack_text();
        let prompt = self.prompts.render(
            PhaseKind::Partition,
            &[
                ("code", session.code.as_str()),
                ("context", session.context.as_str()),
                ("test", test.as_str()),
                ("stack", stack.as_str()),
            ],
        );
        let (messages, reply) = self.ask(Vec::new(), prompt).await?;
        let blocks = reply::parse_partition(&reply)?.normalize(session.window())?;
        tracing::info!(blocks = blocks.len(), "window partitioned");
        Ok((messages, PhaseOutcome::Partition { blocks }, session.clone()))
    }

    async fn try_selection(&self, session: &Session, blocks: &BlockList, forced: Option<usize>) -> Attempt {
        let list = blocks.listing();
        let prompt = self.prompts.render(
            PhaseKind::Selection,
            &[
                ("code", session.code.as_str()),
                ("context", session.context.as_str()),
                ("list", list.as_str()),
            ],
        );
        let (messages, reply) = self.ask(Vec::new(), prompt).await?;
        let mut selection = reply::parse_selection(&reply)?;
        if let Some(id) = forced {
            tracing::info!(id, "using selected override");
            selection.id = id as i64;
            selection.analysis = format!("Override by user selection: {}", id);
        }

        let block = blocks.block(selection.id)?.clone();
        tracing::info!(id = block.id, "selected block {}-{}", block.start_line, block.end_line);
        let narrowed = session.clone().narrow_to(&block);
        let outcome = PhaseOutcome::Selection {
            analysis: selection.analysis,
            selected: block.describe(),
            block,
        };
        Ok((messages, outcome, narrowed))
    }

    async fn try_abstraction(&self, session: &Session, selected: &str) -> Attempt {
        let prompt = self.prompts.render(
            PhaseKind::Abstraction,
            &[
                ("code", session.code.as_str()),
                ("context", session.context.as_str()),
                ("selected", selected),
            ],
        );
        let (messages, reply) = self.ask(Vec::new(), prompt).await?;
        let abstraction = reply::parse_abstraction(&reply)?;
        Ok((messages, PhaseOutcome::Abstraction { abstraction }, session.clone()))
    }

    async fn try_extraction(&self, session: &Session, selected: &str, blocks: &BlockList) -> Attempt {
        let list = blocks.listing();
        let prompt = self.prompts.render(
            PhaseKind::Extraction,
            &[
                ("selected", selected),
                ("list", list.as_str()),
                ("context", session.context.as_str()),
            ],
        );
        let (messages, reply) = self.ask(Vec::new(), prompt).await?;
        let expectations = reply::parse_extraction(&reply)?;
        Ok((messages, PhaseOutcome::Extraction { expectations }, session.clone()))
    }

    async fn try_combination(
        &self,
        session: &Session,
        block: &CodeBlock,
        presentation: &str,
        expectations: &[Expectation],
    ) -> Attempt {
        let block_io = self.slice_window(session);
        let io = CombinationIo {
            input: block_io.input_listing(),
            output: block_io.output_listing(),
            invalue: block_io.input_values(),
            outvalue: block_io.output_values(),
            span: block_io.span,
        };

        let selected = block.describe();
        let expectation = render_expectations(expectations);
        let prompt = self.prompts.render(
            PhaseKind::Combination,
            &[
                ("code", session.code.as_str()),
                ("selected", selected.as_str()),
                ("presentation", presentation),
                ("expectation", expectation.as_str()),
                ("input", io.input.as_str()),
                ("output", io.output.as_str()),
            ],
        );
        let (messages, reply) = self.ask(Vec::new(), prompt).await?;
        let specification = reply::parse_combination(&reply)?;
        Ok((messages, PhaseOutcome::Combination { specification, io }, session.clone()))
    }

    async fn try_prediction(
        &self,
        session: &Session,
        specification: &str,
        invalue: &str,
        transcript: Vec<Message>,
    ) -> Attempt {
        let prompt = self.prompts.render(
            PhaseKind::Prediction,
            &[
                ("specification", specification),
                ("invalue", invalue),
                ("context", session.context.as_str()),
            ],
        );
        let (messages, reply) = self.ask(transcript, prompt).await?;
        let prediction = reply::parse_prediction(&reply)?;
        Ok((messages, PhaseOutcome::Prediction { prediction }, session.clone()))
    }

    async fn try_comparison(
        &self,
        session: &Session,
        prediction: &Prediction,
        outvalue: &str,
        transcript: Vec<Message>,
        minimum: usize,
    ) -> Attempt {
        let oracle = prediction.render();
        let prompt = self.prompts.render(
            PhaseKind::Comparison,
            &[("oracle", oracle.as_str()), ("outvalue", outvalue)],
        );
        let (messages, reply) = self.ask(transcript, prompt).await?;
        let comparison = reconcile(reply::parse_comparison(&reply)?, prediction);
        tracing::info!(
            ratio = comparison.ratio,
            items = comparison.items.len(),
            "comparison reconciled"
        );
        let updated = session.clone().with_analysis(&comparison.summary);
        Ok((messages, PhaseOutcome::Comparison { comparison, minimum }, updated))
    }

    async fn try_localization(
        &self,
        session: &Session,
        selected: &str,
        calls: &[RecordedCall],
        forced: Option<LocalizeOverride>,
    ) -> Attempt {
        let source = self
            .data
            .method(&session.method_name)
            .ok_or_else(|| PhaseError::UnknownMethod {
                method: session.method_name.clone(),
            })?;
        let record = render_calls(calls);
        let prompt = self.prompts.render(
            PhaseKind::Localization,
            &[
                ("code", source.whole.as_str()),
                ("context", session.context.as_str()),
                ("selected", selected),
                ("record", record.as_str()),
            ],
        );
        let (messages, reply) = self.ask(Vec::new(), prompt).await?;
        let mut localization = reply::parse_localization(&reply)?;
        apply_override(&mut localization, calls, forced);

        let next = if localization.is_root_cause() {
            session.clone()
        } else {
            let call_id = localization
                .details
                .call_id()
                .ok_or_else(|| ParseError::InvalidStepTarget {
                    details: localization.details.to_string(),
                })?;
            session.clone().step_into(call_id, self.data)?
        };
        let outcome = PhaseOutcome::Localization {
            localization,
            recorded_calls: calls.to_vec(),
        };
        Ok((messages, outcome, next))
    }

    /// Read/write slice of the session window inside the focused call.
    fn slice_window(&self, session: &Session) -> BlockIo {
        let Some(call) = self.data.calls.get(session.call_id) else {
            tracing::warn!(call_id = session.call_id, "focused call missing; no trace values");
            return BlockIo::empty();
        };
        DependencyExtractor::new(&self.data.trace, &self.data.fixes, self.trace)
            .extract(call, session.window())
    }

    async fn ask(&self, mut messages: Vec<Message>, prompt: String) -> Result<(Vec<Message>, String), PhaseError> {
        messages.push(Message::user(prompt));
        let reply = self.oracle.invoke(&messages).await?;
        messages.push(Message::assistant(reply.clone()));
        Ok((messages, reply))
    }
}

fn apply_override(localization: &mut Localization, calls: &[RecordedCall], forced: Option<LocalizeOverride>) {
    match forced {
        Some(LocalizeOverride::RootCause) => {
            localization.fault = 1;
            localization.details = Details::Call(0);
            localization.analysis =
                "Override by user selection: fault=1 (root cause found), details=0".to_string();
            tracing::info!("override: root cause found");
        }
        Some(LocalizeOverride::StepInto(n)) => match n.checked_sub(1).and_then(|i| calls.get(i)) {
            Some(call) => {
                localization.fault = 0;
                localization.details = Details::Call(call.id);
                localization.analysis = format!(
                    "Override by user selection: fault=0 (step into), details={} (call to {})",
                    call.id, call.method_name
                );
                tracing::info!(call_id = call.id, "override: step into recorded call {}", n);
            }
            None => tracing::warn!(
                "step-into override {} is out of range for {} recorded calls; keeping the oracle's decision",
                n,
                calls.len()
            ),
        },
        None => {}
    }
}

fn finish(kind: PhaseKind, session: Session, attempt: Attempt) -> PhaseRun {
    match attempt {
        Ok((messages, outcome, session)) => PhaseRun {
            messages,
            outcome,
            session,
        },
        Err(e) => {
            let message = format!("Agent {} failed: {}", kind, e);
            tracing::warn!("{}", message);
            PhaseRun {
                messages: Vec::new(),
                outcome: PhaseOutcome::Failed { message },
                session,
            }
        }
    }
}
