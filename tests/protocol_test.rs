//! Upstream protocol engine properties P4 and P5 (spec.md §8).

use dapnet_pocsag_gateway::upstream::UpstreamEngine;

/// P4: a well-formed `#<id>` record is acknowledged with exactly one write,
/// carrying `(id+1) mod 256` in uppercase hex.
#[tokio::test]
async fn p4_positive_ack_wraps_id_modulo_256() {
    let mut engine = UpstreamEngine::new();
    let writes = engine.process_line(b"#FF 5:a:007B:3:Hello").await;
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0], b"#00 +\r\n");
}

/// P4: a malformed `#<id>` record (missing field) gets exactly one negative
/// acknowledgement, still wrapping the id.
#[tokio::test]
async fn p4_negative_ack_on_malformed_record() {
    let mut engine = UpstreamEngine::new();
    let writes = engine.process_line(b"#FF 5:a:007B").await;
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0], b"#00 -\r\n");
    assert!(engine.take_next_message().is_none());
}

/// P5: every `2...` record is answered by exactly two writes, in order:
/// the echoed line with `:0000` appended, then a bare `+\r\n`.
#[tokio::test]
async fn p5_time_sync_echo_is_two_ordered_writes() {
    let mut engine = UpstreamEngine::new();
    let writes = engine.process_line(b"2 2024-06-15 12:30:00").await;
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0], b"2 2024-06-15 12:30:00:0000\r\n");
    assert_eq!(writes[1], b"+\r\n");
}

/// A field 5 that itself contains a colon is carried through verbatim
/// rather than being split again (§4.2.2: only the first four fields are
/// colon-delimited).
#[tokio::test]
async fn message_body_may_contain_colons() {
    let mut engine = UpstreamEngine::new();
    engine.process_line(b"#01 3:a:000001:3:12:30:45 arrived").await;
    let message = engine.take_next_message().unwrap();
    assert_eq!(message.body, b"12:30:45 arrived");
}

/// A schedule record replaces any previously held schedule outright (no
/// merge with the prior bitmap).
#[tokio::test]
async fn schedule_record_replaces_previous() {
    let mut engine = UpstreamEngine::new();
    engine.process_line(b"4 0123456789ABCDEF").await;
    let first = engine.take_schedule().unwrap();
    assert!(first.all_slots());

    engine.process_line(b"4 02").await;
    let second = engine.take_schedule().unwrap();
    assert!(!second.all_slots());
    assert!(second.is_allowed(0));
    assert!(second.is_allowed(2));
    assert!(!second.is_allowed(1));
}
