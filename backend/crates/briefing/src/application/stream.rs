//! Stream Driver
//!
//! Runs the orchestrator in its own task and forwards its events over a
//! bounded channel. The receiving side is the HTTP body; when the client
//! disconnects the channel closes and the orchestrator stops at its next
//! checkpoint.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::application::orchestrator::AgentOrchestrator;
use crate::application::usage::UsageTally;
use crate::domain::conversation::BriefingRequest;
use crate::domain::repository::{ModelBackend, ToolExecutor, UsageRecorder};
use crate::domain::stream::StreamEvent;
use crate::error::OrchestratorError;

pub const ITERATION_LIMIT_MESSAGE: &str = "This question needed more processing than allowed. \
     Please ask something simpler or more specific.";
pub const CAPACITY_MESSAGE: &str =
    "The briefing service is at capacity right now. Please try again in a few minutes.";
pub const GENERIC_MESSAGE: &str =
    "Something went wrong while preparing the briefing. Please try again.";

const CHANNEL_CAPACITY: usize = 32;

/// Sending half handed to the orchestrator
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<StreamEvent>,
}

impl EventSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// `false` once the receiver is gone
    pub async fn send(&self, event: StreamEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// User-facing text for a failed run. `None` when nobody is listening.
pub fn terminal_message(error: &OrchestratorError) -> Option<&'static str> {
    match error {
        OrchestratorError::Cancelled => None,
        OrchestratorError::IterationLimit { .. } => Some(ITERATION_LIMIT_MESSAGE),
        OrchestratorError::Model(e) if e.is_quota() => Some(CAPACITY_MESSAGE),
        OrchestratorError::Model(_) => Some(GENERIC_MESSAGE),
    }
}

pub struct BriefingStream<M, T, R>
where
    M: ModelBackend,
    T: ToolExecutor,
    R: UsageRecorder,
{
    orchestrator: AgentOrchestrator<M, T>,
    recorder: Arc<R>,
}

impl<M, T, R> Clone for BriefingStream<M, T, R>
where
    M: ModelBackend,
    T: ToolExecutor,
    R: UsageRecorder,
{
    fn clone(&self) -> Self {
        Self {
            orchestrator: self.orchestrator.clone(),
            recorder: self.recorder.clone(),
        }
    }
}

impl<M, T, R> BriefingStream<M, T, R>
where
    M: ModelBackend + Sync + 'static,
    T: ToolExecutor + Sync + 'static,
    R: UsageRecorder + Sync + 'static,
{
    pub fn new(orchestrator: AgentOrchestrator<M, T>, recorder: Arc<R>) -> Self {
        Self {
            orchestrator,
            recorder,
        }
    }

    /// Spawn the run and return the event receiver.
    ///
    /// A minted session token is the first event. The stream then ends
    /// with exactly one `done` or `error`, unless the client left first.
    pub fn start(
        &self,
        request: BriefingRequest,
        minted_token: Option<String>,
    ) -> mpsc::Receiver<StreamEvent> {
        let (sink, rx) = EventSink::channel(CHANNEL_CAPACITY);
        let orchestrator = self.orchestrator.clone();
        let recorder = self.recorder.clone();

        let task = async move {
            if let Some(token) = minted_token {
                sink.send(StreamEvent::SessionToken(token)).await;
            }

            let mut tally = UsageTally::default();
            let outcome = AssertUnwindSafe(orchestrator.run(&request, &sink, &mut tally))
                .catch_unwind()
                .await;

            let terminal = match outcome {
                Ok(Ok(())) => Some(StreamEvent::Done),
                Ok(Err(e)) => {
                    match &e {
                        OrchestratorError::Cancelled => {
                            tracing::info!("Client disconnected, briefing abandoned")
                        }
                        OrchestratorError::IterationLimit { .. } => {
                            tracing::warn!(error = %e, "Briefing stopped")
                        }
                        OrchestratorError::Model(_) => {
                            tracing::error!(error = %e, "Briefing failed")
                        }
                    }
                    terminal_message(&e).map(|m| StreamEvent::Error(m.to_string()))
                }
                Err(_) => {
                    tracing::error!("Briefing task panicked");
                    Some(StreamEvent::Error(GENERIC_MESSAGE.to_string()))
                }
            };

            if let Some(event) = terminal {
                sink.send(event).await;
            }
            drop(sink);

            if let Err(e) = recorder.record(&tally).await {
                tracing::warn!(error = %e, "Failed to record usage");
            } else {
                tracing::debug!(
                    model_calls = tally.model_calls,
                    input_tokens = tally.input_tokens,
                    output_tokens = tally.output_tokens,
                    tool_calls = tally.tool_calls(),
                    "Usage recorded"
                );
            }
        };

        tokio::spawn(task.instrument(tracing::Span::current()));
        rx
    }
}
