// Subscription session tests: credit flow, completion, failure and
// cancellation against the in-memory transport

use crate::fixtures::*;
use cdcstream::error::CdcStreamError;
use cdcstream::models::{Event, ReplayId, TopicSchema};
use cdcstream::source::pubsub::*;
use cdcstream::source::{FetchBatch, StreamingTransport};
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
mod session_tests {
    use super::*;

    fn session(transport: &MemoryTransport, count: u32) -> SubscriptionSession {
        let schema = Arc::new(TopicSchema::parse(ACCOUNT_SCHEMA).unwrap());
        let decoder = Arc::new(AvroPayloadDecoder::new(ACCOUNT_SCHEMA).unwrap());
        let transport: Arc<dyn StreamingTransport> = Arc::new(transport.clone());
        SubscriptionSession::new(transport, TOPIC, schema, decoder, count).unwrap()
    }

    fn demanded(transport: &MemoryTransport) -> Vec<u32> {
        transport
            .demands()
            .iter()
            .map(|request| request.num_requested)
            .collect()
    }

    #[test]
    fn test_zero_target_is_rejected() {
        let transport = MemoryTransport::new();
        let schema = Arc::new(TopicSchema::parse(ACCOUNT_SCHEMA).unwrap());
        let decoder = Arc::new(AvroPayloadDecoder::new(ACCOUNT_SCHEMA).unwrap());
        let result = SubscriptionSession::new(Arc::new(transport), TOPIC, schema, decoder, 0);
        assert!(matches!(result, Err(CdcStreamError::Validation(_))));
    }

    #[tokio::test]
    async fn test_completes_when_target_reached() {
        let transport = MemoryTransport::new();
        let feed = transport.register_topic(TOPIC, ACCOUNT_SCHEMA);
        feed.send_events(vec![update_event(1), update_event(2)]).unwrap();
        feed.send_events(vec![update_event(3)]).unwrap();

        let session = session(&transport, 3);
        let handle = session.handle();
        let mut seen = Vec::new();
        let outcome = session
            .run(&mut |event: Event| seen.push(event.replay_id()))
            .await;

        assert!(matches!(
            outcome,
            SessionOutcome::Completed {
                reason: CompletionReason::TargetReached,
                received: 3
            }
        ));
        assert_eq!(seen, vec![ReplayId(1), ReplayId(2), ReplayId(3)]);
        assert_eq!(demanded(&transport), vec![3]);
        assert_eq!(transport.demands()[0].topic_name, TOPIC);
        assert_eq!(transport.streams_closed(), 1);

        let progress = handle.progress();
        assert_eq!(progress.state, SessionState::Completed);
        assert_eq!(progress.run.received_total, 3);
        assert_eq!(progress.run.outstanding_credit, 0);
        assert_eq!(progress.batches_received, 2);
    }

    #[tokio::test]
    async fn test_decode_failure_stops_session() {
        let transport = MemoryTransport::new();
        let feed = transport.register_topic(TOPIC, ACCOUNT_SCHEMA);
        feed.send_events(vec![update_event(1), malformed_event(2), update_event(3)])
            .unwrap();

        let session = session(&transport, 3);
        let handle = session.handle();
        let mut handler = LoggingHandler::new();
        let outcome = session.run(&mut handler).await;

        assert_eq!(outcome.state(), SessionState::Failed);
        assert_eq!(outcome.received(), 1);
        assert_eq!(handler.handled(), 1);
        assert!(outcome.cause().unwrap().contains("evt-2"));
        match outcome {
            SessionOutcome::Failed { error, .. } => assert!(error.is_decode_error()),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(handle.progress().failure.is_some());
        assert_eq!(transport.streams_closed(), 1);
    }

    #[tokio::test]
    async fn test_end_of_stream_completes_short() {
        let transport = MemoryTransport::new();
        let feed = transport.register_topic(TOPIC, ACCOUNT_SCHEMA);
        feed.send_events(vec![update_event(1), update_event(2)]).unwrap();
        feed.end().unwrap();

        let outcome = session(&transport, 5).run(&mut LoggingHandler::new()).await;

        assert!(matches!(
            outcome,
            SessionOutcome::Completed {
                reason: CompletionReason::EndOfStream,
                received: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_transport_error_fails_session() {
        let transport = MemoryTransport::new();
        let feed = transport.register_topic(TOPIC, ACCOUNT_SCHEMA);
        feed.send_events(vec![update_event(1)]).unwrap();
        feed.fail("connection reset").unwrap();

        let outcome = session(&transport, 5).run(&mut LoggingHandler::new()).await;

        assert_eq!(outcome.received(), 1);
        assert!(matches!(
            outcome.into_result(),
            Err(CdcStreamError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_topic_fails_on_open() {
        let transport = MemoryTransport::new();
        let outcome = session(&transport, 1).run(&mut LoggingHandler::new()).await;

        assert_eq!(outcome.state(), SessionState::Failed);
        assert!(transport.demands().is_empty());
        assert_eq!(transport.streams_closed(), 0);
    }

    #[tokio::test]
    async fn test_surplus_events_are_dropped() {
        let transport = MemoryTransport::new();
        let feed = transport.register_topic(TOPIC, ACCOUNT_SCHEMA);
        feed.send_events(vec![update_event(1), update_event(2), update_event(3)])
            .unwrap();

        let mut seen = 0;
        let outcome = session(&transport, 2)
            .run(&mut |_event: Event| seen += 1)
            .await;

        assert_eq!(outcome.received(), 2);
        assert_eq!(seen, 2);
    }

    #[tokio::test]
    async fn test_keepalive_carries_no_events() {
        let transport = MemoryTransport::new();
        let feed = transport.register_topic(TOPIC, ACCOUNT_SCHEMA);
        feed.send_events(vec![]).unwrap();
        feed.send_events(vec![update_event(1)]).unwrap();

        let session = session(&transport, 1);
        let handle = session.handle();
        let outcome = session.run(&mut LoggingHandler::new()).await;

        assert_eq!(outcome.received(), 1);
        assert_eq!(handle.progress().batches_received, 2);
        assert_eq!(demanded(&transport), vec![1]);
    }

    #[tokio::test]
    async fn test_demand_bounded_by_ceiling() {
        let transport = MemoryTransport::new().with_max_in_flight(2);
        let feed = transport.register_topic(TOPIC, ACCOUNT_SCHEMA);
        feed.send_events(vec![update_event(1), update_event(2)]).unwrap();
        feed.send_events(vec![update_event(3), update_event(4)]).unwrap();
        feed.send_events(vec![update_event(5)]).unwrap();

        let outcome = session(&transport, 5).run(&mut LoggingHandler::new()).await;

        assert_eq!(outcome.received(), 5);
        assert_eq!(demanded(&transport), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_top_up_waits_for_credit_to_drain() {
        let transport = MemoryTransport::new().with_max_in_flight(3);
        let feed = transport.register_topic(TOPIC, ACCOUNT_SCHEMA);
        feed.send_events(vec![update_event(1), update_event(2)]).unwrap();
        feed.send_events(vec![update_event(3)]).unwrap();
        feed.send_events(vec![update_event(4), update_event(5)]).unwrap();

        let outcome = session(&transport, 5).run(&mut LoggingHandler::new()).await;

        assert_eq!(outcome.received(), 5);
        assert_eq!(demanded(&transport), vec![3, 2]);
    }

    #[tokio::test]
    async fn test_session_ceiling_lowers_transport_ceiling() {
        let transport = MemoryTransport::new();
        let feed = transport.register_topic(TOPIC, ACCOUNT_SCHEMA);
        feed.send_events(vec![update_event(1)]).unwrap();
        feed.send_events(vec![update_event(2)]).unwrap();

        let outcome = session(&transport, 2)
            .with_max_in_flight(1)
            .run(&mut LoggingHandler::new())
            .await;

        assert_eq!(outcome.received(), 2);
        assert_eq!(demanded(&transport), vec![1, 1]);
    }

    #[tokio::test]
    async fn test_server_pending_count_triggers_top_up() {
        let transport = MemoryTransport::new();
        let feed = transport.register_topic(TOPIC, ACCOUNT_SCHEMA);
        let mut batch = FetchBatch::new(vec![update_event(1)]);
        // server gave up on the remaining demand
        batch.pending_num_requested = Some(0);
        feed.send_batch(batch).unwrap();
        feed.send_events(vec![update_event(2), update_event(3)]).unwrap();

        let outcome = session(&transport, 3).run(&mut LoggingHandler::new()).await;

        assert_eq!(outcome.received(), 3);
        assert_eq!(demanded(&transport), vec![3, 2]);
    }

    #[tokio::test]
    async fn test_cancel_before_run() {
        let transport = MemoryTransport::new();
        transport.register_topic(TOPIC, ACCOUNT_SCHEMA);

        let session = session(&transport, 1);
        let handle = session.handle();
        handle.cancel();
        assert!(handle.is_cancel_requested());

        let outcome = session.run(&mut LoggingHandler::new()).await;

        assert!(matches!(outcome, SessionOutcome::Cancelled { received: 0 }));
        assert!(transport.demands().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_between_items() {
        let transport = MemoryTransport::new();
        let feed = transport.register_topic(TOPIC, ACCOUNT_SCHEMA);
        feed.send_events(vec![update_event(1), update_event(2), update_event(3)])
            .unwrap();

        let session = session(&transport, 3);
        let handle = session.handle();
        let mut seen = 0;
        let outcome = session
            .run(&mut |_event: Event| {
                seen += 1;
                handle.cancel();
            })
            .await;

        assert!(matches!(outcome, SessionOutcome::Cancelled { received: 1 }));
        assert_eq!(seen, 1);
        assert_eq!(transport.streams_closed(), 1);
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_batches() {
        let transport = MemoryTransport::new();
        transport.register_topic(TOPIC, ACCOUNT_SCHEMA);

        let session = session(&transport, 1);
        let handle = session.handle();
        let task = tokio::spawn(async move { session.run(&mut LoggingHandler::new()).await });

        let mut progress = handle.watch_progress();
        while progress.borrow_and_update().state != SessionState::Streaming {
            progress.changed().await.unwrap();
        }
        handle.cancel();

        let outcome = task.await.unwrap();
        assert_eq!(outcome.state(), SessionState::Cancelled);
        assert_eq!(handle.progress().state, SessionState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_timeout_cancels() {
        let transport = MemoryTransport::new();
        transport.register_topic(TOPIC, ACCOUNT_SCHEMA);

        let session = session(&transport, 1);
        let handle = session.handle();
        let watchdog = handle.clone();
        let stalled =
            tokio::spawn(async move { watchdog.cancel_on_stall(Duration::from_secs(30)).await });

        let outcome = session.run(&mut LoggingHandler::new()).await;

        assert_eq!(outcome.state(), SessionState::Cancelled);
        assert!(stalled.await.unwrap());
    }

    #[tokio::test]
    async fn test_stall_watch_ends_with_session() {
        let transport = MemoryTransport::new();
        let feed = transport.register_topic(TOPIC, ACCOUNT_SCHEMA);
        feed.send_events(vec![update_event(1)]).unwrap();

        let session = session(&transport, 1);
        let watchdog = session.handle();
        let stalled =
            tokio::spawn(async move { watchdog.cancel_on_stall(Duration::from_secs(60)).await });

        let outcome = session.run(&mut LoggingHandler::new()).await;

        assert_eq!(outcome.state(), SessionState::Completed);
        assert!(!stalled.await.unwrap());
    }

    #[test]
    fn test_fetch_run_state_accounting() {
        let mut run = FetchRunState::new(4);
        assert_eq!(run.remaining(), 4);
        assert!(!run.is_satisfied());

        run.received_total = 4;
        assert_eq!(run.remaining(), 0);
        assert!(run.is_satisfied());
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(SessionState::Cancelled.is_terminal());
        assert!(!SessionState::Streaming.is_terminal());
        assert_eq!(SessionState::Subscribing.to_string(), "subscribing");
    }
}
