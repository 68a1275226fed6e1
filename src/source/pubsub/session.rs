//! Credit-based subscription session.
//!
//! A session requests its whole target up front (bounded by the transport's
//! in-flight ceiling), then drains batches in delivery order, decoding each
//! item and handing it to the caller's handler before touching the next one.
//! The first item that fails to decode ends the session.

use super::handler::EventHandler;
use super::parser::EventParser;
use super::payload::PayloadDecoder;
use crate::error::{CdcStreamError, Result};
use crate::metrics;
use crate::models::TopicSchema;
use crate::source::adapter::{FetchBatch, FetchRequest, FetchStream, StreamingTransport};
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Subscribing,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Subscribing => "subscribing",
            SessionState::Streaming => "streaming",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
            SessionState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-flight demand of a session.
///
/// `received_total` never exceeds `requested_total`, and
/// `outstanding_credit` never exceeds the transport's in-flight ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchRunState {
    pub requested_total: u32,
    pub received_total: u32,
    pub outstanding_credit: u32,
}

impl FetchRunState {
    pub fn new(requested_total: u32) -> Self {
        Self {
            requested_total,
            ..Default::default()
        }
    }

    pub fn remaining(&self) -> u32 {
        self.requested_total.saturating_sub(self.received_total)
    }

    pub fn is_satisfied(&self) -> bool {
        self.received_total >= self.requested_total
    }
}

/// Snapshot published after every state change and every dispatched event
#[derive(Debug, Clone)]
pub struct SessionProgress {
    pub state: SessionState,
    pub run: FetchRunState,
    pub batches_received: u64,
    pub last_progress_at: Instant,
    /// Human-readable cause once the session has failed
    pub failure: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionReason {
    TargetReached,
    EndOfStream,
}

/// How a session ended
#[derive(Debug)]
pub enum SessionOutcome {
    Completed {
        reason: CompletionReason,
        received: u32,
    },
    Failed {
        error: CdcStreamError,
        received: u32,
    },
    Cancelled {
        received: u32,
    },
}

impl SessionOutcome {
    pub fn state(&self) -> SessionState {
        match self {
            SessionOutcome::Completed { .. } => SessionState::Completed,
            SessionOutcome::Failed { .. } => SessionState::Failed,
            SessionOutcome::Cancelled { .. } => SessionState::Cancelled,
        }
    }

    /// Events dispatched to the handler before the session ended
    pub fn received(&self) -> u32 {
        match self {
            SessionOutcome::Completed { received, .. }
            | SessionOutcome::Failed { received, .. }
            | SessionOutcome::Cancelled { received } => *received,
        }
    }

    pub fn cause(&self) -> Option<String> {
        match self {
            SessionOutcome::Failed { error, .. } => Some(error.to_string()),
            _ => None,
        }
    }

    pub fn into_result(self) -> Result<u32> {
        match self {
            SessionOutcome::Failed { error, .. } => Err(error),
            other => Ok(other.received()),
        }
    }
}

/// Control side of a session: cancellation and progress observation.
#[derive(Clone)]
pub struct SubscriptionHandle {
    cancel_tx: Arc<watch::Sender<bool>>,
    progress_rx: watch::Receiver<SessionProgress>,
}

impl SubscriptionHandle {
    /// Request cooperative cancellation. Observed before each batch and
    /// between items.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub fn is_cancel_requested(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    pub fn progress(&self) -> SessionProgress {
        self.progress_rx.borrow().clone()
    }

    pub fn watch_progress(&self) -> watch::Receiver<SessionProgress> {
        self.progress_rx.clone()
    }

    /// Time since the session last made progress
    pub fn idle_for(&self) -> Duration {
        self.progress_rx.borrow().last_progress_at.elapsed()
    }

    /// Cancel the session if it makes no progress for `timeout`.
    ///
    /// Returns `true` if cancellation was triggered, `false` once the
    /// session reached a terminal state on its own.
    pub async fn cancel_on_stall(&self, timeout: Duration) -> bool {
        let mut progress = self.progress_rx.clone();
        loop {
            if progress.borrow_and_update().state.is_terminal() {
                return false;
            }
            match tokio::time::timeout(timeout, progress.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => return false,
                Err(_) => {
                    warn!("No progress for {:?}, cancelling subscription", timeout);
                    self.cancel();
                    return true;
                }
            }
        }
    }
}

pub struct SubscriptionSession {
    topic: String,
    schema: Arc<TopicSchema>,
    transport: Arc<dyn StreamingTransport>,
    parser: EventParser,
    state: SessionState,
    run: FetchRunState,
    credit_ceiling: u32,
    batches_received: u64,
    failure: Option<String>,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
    progress_tx: watch::Sender<SessionProgress>,
}

impl SubscriptionSession {
    pub fn new(
        transport: Arc<dyn StreamingTransport>,
        topic: impl Into<String>,
        schema: Arc<TopicSchema>,
        decoder: Arc<dyn PayloadDecoder>,
        target_count: u32,
    ) -> Result<Self> {
        if target_count == 0 {
            return Err(CdcStreamError::Validation(
                "Subscription target count must be at least 1".to_string(),
            ));
        }

        let run = FetchRunState::new(target_count);
        let credit_ceiling = transport.max_in_flight().max(1);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (progress_tx, _) = watch::channel(SessionProgress {
            state: SessionState::Idle,
            run,
            batches_received: 0,
            last_progress_at: Instant::now(),
            failure: None,
        });

        Ok(Self {
            topic: topic.into(),
            parser: EventParser::new(schema.clone(), decoder),
            schema,
            transport,
            state: SessionState::Idle,
            run,
            credit_ceiling,
            batches_received: 0,
            failure: None,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
            progress_tx,
        })
    }

    /// Lower the in-flight ceiling below the transport's
    pub fn with_max_in_flight(mut self, max_in_flight: u32) -> Self {
        self.credit_ceiling = self.credit_ceiling.min(max_in_flight.max(1));
        self
    }

    pub fn handle(&self) -> SubscriptionHandle {
        SubscriptionHandle {
            cancel_tx: self.cancel_tx.clone(),
            progress_rx: self.progress_tx.subscribe(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn run_state(&self) -> FetchRunState {
        self.run
    }

    /// Drive the subscription to a terminal state, dispatching every decoded
    /// event to `handler` in delivery order.
    pub async fn run<H>(mut self, handler: &mut H) -> SessionOutcome
    where
        H: EventHandler + ?Sized,
    {
        let mut cancel = self.cancel_rx.clone();
        if *cancel.borrow_and_update() {
            let outcome = self.cancelled();
            return self.finish(outcome);
        }

        info!(
            "Subscribing to {} and waiting for {} events",
            self.topic, self.run.requested_total
        );
        self.set_state(SessionState::Subscribing);

        let opened = tokio::select! {
            biased;
            _ = cancellation(&mut cancel) => None,
            opened = self.transport.open(&self.topic, &self.schema) => Some(opened),
        };

        let mut stream = match opened {
            Some(Ok(stream)) => stream,
            Some(Err(e)) => {
                let outcome = self.failed(e);
                return self.finish(outcome);
            }
            None => {
                let outcome = self.cancelled();
                return self.finish(outcome);
            }
        };

        let outcome = self.consume(stream.as_mut(), handler, &mut cancel).await;

        if let Err(e) = stream.close().await {
            warn!("Failed to close stream for {}: {}", self.topic, e);
        }
        self.finish(outcome)
    }

    async fn consume<H>(
        &mut self,
        stream: &mut dyn FetchStream,
        handler: &mut H,
        cancel: &mut watch::Receiver<bool>,
    ) -> SessionOutcome
    where
        H: EventHandler + ?Sized,
    {
        let ready = tokio::select! {
            biased;
            _ = cancellation(cancel) => return self.cancelled(),
            ready = stream.ready() => ready,
        };
        if let Err(e) = ready {
            return self.failed(e);
        }

        self.set_state(SessionState::Streaming);
        if let Err(e) = self.request_credit(stream).await {
            return self.failed(e);
        }

        loop {
            let next = tokio::select! {
                biased;
                _ = cancellation(cancel) => return self.cancelled(),
                next = stream.next_batch() => next,
            };

            let batch = match next {
                Some(Ok(batch)) => batch,
                Some(Err(e)) => {
                    error!("Subscribe/receive error on {}: {}", self.topic, e);
                    return self.failed(e);
                }
                None => {
                    info!("Done receiving events on {}", self.topic);
                    return self.completed(CompletionReason::EndOfStream);
                }
            };

            if *cancel.borrow() {
                return self.cancelled();
            }

            if let ControlFlow::Break(outcome) = self.dispatch_batch(batch, handler, cancel) {
                return outcome;
            }

            if self.run.is_satisfied() {
                return self.completed(CompletionReason::TargetReached);
            }

            if self.run.outstanding_credit == 0 {
                if let Err(e) = self.request_credit(stream).await {
                    return self.failed(e);
                }
            }
        }
    }

    fn dispatch_batch<H>(
        &mut self,
        batch: FetchBatch,
        handler: &mut H,
        cancel: &watch::Receiver<bool>,
    ) -> ControlFlow<SessionOutcome>
    where
        H: EventHandler + ?Sized,
    {
        self.batches_received += 1;
        metrics::record_batch(&self.topic, batch.events.len());

        if batch.is_keepalive() {
            debug!(
                "Keepalive on {} (pending {:?})",
                self.topic, batch.pending_num_requested
            );
            self.reconcile_pending(batch.pending_num_requested);
            self.publish();
            return ControlFlow::Continue(());
        }

        debug!(
            "Received batch of {} events on {}",
            batch.events.len(),
            self.topic
        );

        let total = batch.events.len();
        for (index, raw) in batch.events.iter().enumerate() {
            if *cancel.borrow() {
                return ControlFlow::Break(self.cancelled());
            }

            if self.run.is_satisfied() {
                warn!(
                    "Dropping {} events received beyond the requested {} on {}",
                    total - index,
                    self.run.requested_total,
                    self.topic
                );
                break;
            }

            let started = Instant::now();
            let event = match self.parser.parse(raw) {
                Ok(event) => event,
                Err(e) => {
                    metrics::record_decode_failure(&self.topic, e.kind());
                    error!("Failed to parse message on {}: {}", self.topic, e);
                    return ControlFlow::Break(self.failed(e));
                }
            };
            metrics::record_event_decoded(
                &self.topic,
                event.header().change_type.as_str(),
                started.elapsed(),
            );

            self.run.received_total += 1;
            self.run.outstanding_credit = self.run.outstanding_credit.saturating_sub(1);
            handler.handle(event);
            self.publish();
        }

        self.reconcile_pending(batch.pending_num_requested);
        metrics::update_outstanding_credit(&self.topic, self.run.outstanding_credit);
        ControlFlow::Continue(())
    }

    /// Top up demand to `min(remaining, ceiling)`
    async fn request_credit(&mut self, stream: &mut dyn FetchStream) -> Result<()> {
        let target = self.run.remaining().min(self.credit_ceiling);
        let grant = target.saturating_sub(self.run.outstanding_credit);
        if grant == 0 {
            return Ok(());
        }

        debug!("Requesting {} events on {}", grant, self.topic);
        stream
            .send_demand(FetchRequest {
                topic_name: self.topic.clone(),
                num_requested: grant,
            })
            .await?;

        self.run.outstanding_credit += grant;
        metrics::update_outstanding_credit(&self.topic, self.run.outstanding_credit);
        self.publish();
        Ok(())
    }

    /// Adopt the server's view of what it still owes us
    fn reconcile_pending(&mut self, pending: Option<u32>) {
        if let Some(pending) = pending {
            self.run.outstanding_credit = pending
                .min(self.run.remaining())
                .min(self.credit_ceiling);
        }
    }

    fn set_state(&mut self, state: SessionState) {
        debug!("Subscription on {}: {} -> {}", self.topic, self.state, state);
        self.state = state;
        self.publish();
    }

    fn publish(&self) {
        self.progress_tx.send_replace(SessionProgress {
            state: self.state,
            run: self.run,
            batches_received: self.batches_received,
            last_progress_at: Instant::now(),
            failure: self.failure.clone(),
        });
    }

    fn completed(&self, reason: CompletionReason) -> SessionOutcome {
        SessionOutcome::Completed {
            reason,
            received: self.run.received_total,
        }
    }

    fn failed(&self, error: CdcStreamError) -> SessionOutcome {
        SessionOutcome::Failed {
            error,
            received: self.run.received_total,
        }
    }

    fn cancelled(&self) -> SessionOutcome {
        SessionOutcome::Cancelled {
            received: self.run.received_total,
        }
    }

    fn finish(&mut self, outcome: SessionOutcome) -> SessionOutcome {
        match &outcome {
            SessionOutcome::Completed { reason, received } => info!(
                "Subscription on {} completed ({:?}) after {} events",
                self.topic, reason, received
            ),
            SessionOutcome::Failed { error, received } => error!(
                "Subscription on {} failed after {} events: {}",
                self.topic, received, error
            ),
            SessionOutcome::Cancelled { received } => info!(
                "Subscription on {} cancelled after {} events",
                self.topic, received
            ),
        }

        self.failure = outcome.cause();
        metrics::record_session_outcome(&self.topic, outcome.state().as_str());
        self.set_state(outcome.state());
        outcome
    }
}

/// Resolves once cancellation has been requested
async fn cancellation(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // sender gone: cancellation can no longer be requested
            std::future::pending::<()>().await;
        }
    }
}
