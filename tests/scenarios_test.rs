//! End-to-end scenarios S1-S6 (spec.md §8), exercised across the upstream
//! protocol engine, filter, and dispatcher together.

use dapnet_pocsag_gateway::downstream::link::encode_frame;
use dapnet_pocsag_gateway::scheduler::{Dispatcher, SendDecision};
use dapnet_pocsag_gateway::upstream::UpstreamEngine;
use dapnet_pocsag_gateway::{Filter, Functional, PagingMessage};

/// S1 — login + schedule + send in an allowed slot, empty filters, modem idle.
#[tokio::test]
async fn s1_login_schedule_and_send() {
    let mut engine = UpstreamEngine::new();

    let writes = engine.process_line(b"2 2024-01-01 00:00:00").await;
    assert_eq!(
        writes,
        vec![b"2 2024-01-01 00:00:00:0000\r\n".to_vec(), b"+\r\n".to_vec()]
    );
    assert!(engine.logged_in());

    let writes = engine.process_line(b"4 0123456789ABCDEF").await;
    assert_eq!(writes, vec![b"+\r\n".to_vec()]);

    let writes = engine.process_line(b"#01 5:a:007B:3:Hello").await;
    assert_eq!(writes, vec![b"#02 +\r\n".to_vec()]);

    let message = engine.take_next_message().unwrap();
    assert_eq!(message.msg_type, 5);
    assert_eq!(message.ric, 0x7B);
    assert_eq!(message.functional, Functional::Alphanumeric);
    assert_eq!(message.body, b"Hello");

    let filter = Filter::default();
    assert_eq!(filter.evaluate(&message), dapnet_pocsag_gateway::filter::Verdict::Accept);

    let mut dispatcher = Dispatcher::new();
    dispatcher.queue.push(message);
    dispatcher.set_modem_idle(true);

    let mut cached_schedule = engine.take_schedule();
    dispatcher.advance_clock(&mut cached_schedule);

    let mut sent_frame = None;
    let decision = dispatcher
        .decide_and_send(|message| {
            sent_frame = Some(encode_frame(&message));
            async { true }
        })
        .await;
    assert_eq!(decision, SendDecision::Sent);

    let frame = sent_frame.expect("a frame was sent");
    assert_eq!(frame.len(), 15);
    assert_eq!(&frame[0..6], b"POCSAG");
    assert_eq!(&frame[6..9], &[0x00, 0x00, 0x7B]);
    assert_eq!(frame[9], 0x03);
    assert_eq!(&frame[10..15], b"Hello");
}

/// S2 — RIC deny: the message never reaches the queue.
#[tokio::test]
async fn s2_ric_deny() {
    let mut engine = UpstreamEngine::new();
    engine.process_line(b"#01 5:a:007B:3:Hello").await;
    let message = engine.take_next_message().unwrap();

    let filter = Filter::new(vec![], vec![123], vec![], vec![]);
    assert_eq!(
        filter.evaluate(&message),
        dapnet_pocsag_gateway::filter::Verdict::RicDenied
    );

    let mut dispatcher = Dispatcher::new();
    dispatcher.set_modem_idle(true);
    let mut cached_schedule = Some(dapnet_pocsag_gateway::Schedule::new([true; 16]));
    dispatcher.advance_clock(&mut cached_schedule);
    // Filter dropped it, so nothing was ever pushed.
    assert!(dispatcher.queue.is_empty());
}

/// S3 — an anchored regex deny drops the message.
#[tokio::test]
async fn s3_regex_deny() {
    let mut engine = UpstreamEngine::new();
    engine.process_line(b"#01 5:a:007B:3:SPAM!!!").await;
    let message = engine.take_next_message().unwrap();

    let pattern = regex::Regex::new("^SPAM.*").unwrap();
    let filter = Filter::new(vec![], vec![], vec![pattern], vec![]);
    assert_eq!(
        filter.evaluate(&message),
        dapnet_pocsag_gateway::filter::Verdict::RegexDenied
    );
}

/// S4 — out-of-budget deferral: a message stays queued when it would not
/// fit in the remaining slot airtime.
#[tokio::test]
async fn s4_out_of_budget_deferral() {
    let mut dispatcher = Dispatcher::new();
    dispatcher.set_modem_idle(true);
    // A single-slot, not-all-slots schedule so the codeword budget applies.
    let mut slots = [false; 16];
    slots[0] = true;
    let mut cached_schedule = Some(dapnet_pocsag_gateway::Schedule::new(slots));
    dispatcher.advance_clock(&mut cached_schedule);

    // Drive sent_codewords close to the 240 budget by sending small
    // messages first (each an Alert2 with an empty-ish short body).
    for _ in 0..9 {
        dispatcher.queue.push(PagingMessage::new(3, 1, Functional::Alert2, vec![b'x'; 2]));
        let decision = dispatcher.decide_and_send(|_| async { true }).await;
        assert_eq!(decision, SendDecision::Sent);
    }

    // Now queue one large message that cannot possibly fit alongside
    // whatever remains of the budget.
    dispatcher.queue.push(PagingMessage::new(3, 1, Functional::Alphanumeric, vec![b'a'; 60]));
    let decision = dispatcher.decide_and_send(|_| async { true }).await;
    assert!(matches!(decision, SendDecision::NoRoomInSlot | SendDecision::WouldNotFit));
    assert!(!dispatcher.queue.is_empty());
}

/// S5 — a stale time-sync message is popped and silently dropped.
#[tokio::test]
async fn s5_stale_time_sync_is_dropped() {
    let mut dispatcher = Dispatcher::new();
    dispatcher.set_modem_idle(true);
    let mut cached_schedule = Some(dapnet_pocsag_gateway::Schedule::new([true; 16]));
    dispatcher.advance_clock(&mut cached_schedule);

    let stale = PagingMessage {
        msg_type: 5,
        ric: 1,
        functional: Functional::Numeric,
        body: b"12:00".to_vec(),
        queued_at: std::time::Instant::now() - std::time::Duration::from_millis(16_000),
    };
    assert!(stale.is_time_sync());
    dispatcher.queue.push(stale);

    let decision = dispatcher.decide_and_send(|_| async { true }).await;
    assert_eq!(decision, SendDecision::StaleTimeSyncDropped);
    assert!(dispatcher.queue.is_empty());
}

/// S6 — repeated login failures back off along the fixed table and
/// saturate fail_count at 9.
#[tokio::test(start_paused = true)]
async fn s6_login_failure_backoff_saturates() {
    let mut engine = UpstreamEngine::new();
    for expected_fail_count in 1..=12 {
        let writes = engine.process_line(b"7 bad auth").await;
        assert_eq!(writes, vec![b"+\r\n".to_vec()]);
        assert_eq!(engine.fail_count(), expected_fail_count.min(9));
    }
}
