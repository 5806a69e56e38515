//! Upstream tagged-record protocol engine (C2, §4.2).
//!
//! Grounded on `examples/original_source/DAPNETNetwork.cpp`'s tag dispatch
//! (`parseMessage`/`parseSchedule`/`parseFailedLogin`) and on the teacher's
//! `net/message.rs` for the tagged-record dispatch shape.

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::message::{Functional, PagingMessage};
use crate::schedule::Schedule;
use crate::upstream::link::backoff_for;

/// `(logged_in, fail_count, pending_msg, pending_schedule)` plus the
/// ack-id derivation from each received `#` record (§3, `UpstreamSession`).
#[derive(Debug, Default)]
pub struct UpstreamEngine {
    logged_in: bool,
    fail_count: usize,
    pending_message: Option<PagingMessage>,
    pending_schedule: Option<Schedule>,
}

impl UpstreamEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn logged_in(&self) -> bool {
        self.logged_in
    }

    pub fn fail_count(&self) -> usize {
        self.fail_count
    }

    pub fn take_next_message(&mut self) -> Option<PagingMessage> {
        self.pending_message.take()
    }

    pub fn take_schedule(&mut self) -> Option<Schedule> {
        self.pending_schedule.take()
    }

    /// Dispatch one received line by its leading byte (§4.2's table).
    /// Returns the bytes to write back, in order (possibly more than one
    /// write, possibly none). May suspend on the login-failure back-off
    /// sleep (§4.1's intentional stall, driven from here because it is
    /// keyed off `fail_count`, which this engine alone owns).
    pub async fn process_line(&mut self, line: &[u8]) -> Vec<Vec<u8>> {
        match line.first() {
            Some(b'+') => Vec::new(),
            Some(b'-') => {
                warn!("upstream sent a negative acknowledgement");
                Vec::new()
            }
            Some(b'2') => {
                self.logged_in = true;
                let mut echoed = line.to_vec();
                echoed.extend_from_slice(b":0000\r\n");
                vec![echoed, b"+\r\n".to_vec()]
            }
            Some(b'3') => vec![b"+\r\n".to_vec()],
            Some(b'4') => {
                self.pending_schedule = Some(Schedule::parse(&String::from_utf8_lossy(&line[1..])));
                vec![b"+\r\n".to_vec()]
            }
            Some(b'7') => {
                let wait = backoff_for(self.fail_count);
                warn!(?wait, "upstream login failed, backing off");
                sleep(wait).await;
                if self.fail_count < 9 {
                    self.fail_count += 1;
                }
                vec![b"+\r\n".to_vec()]
            }
            Some(b'#') => self.process_message_record(line),
            _ => {
                debug!(line = %String::from_utf8_lossy(line), "unrecognised upstream record");
                vec![b"-\r\n".to_vec()]
            }
        }
    }

    fn process_message_record(&mut self, line: &[u8]) -> Vec<Vec<u8>> {
        let id = parse_hex_id(line);
        let ack_id = (id + 1) % 256;

        match parse_message_fields(line) {
            Some((msg_type, ric, functional_code, body)) => match Functional::from_code(functional_code) {
                Some(functional) => {
                    self.pending_message = Some(PagingMessage::new(msg_type, ric, functional, body));
                    vec![format!("#{ack_id:02X} +\r\n").into_bytes()]
                }
                // §4.2.2: functional >= 4 is dropped without any acknowledgement.
                None => Vec::new(),
            },
            None => vec![format!("#{ack_id:02X} -\r\n").into_bytes()],
        }
    }
}

/// The two hex digits right after `#`; unparseable (too short, non-hex)
/// degrades to id `0` rather than failing, matching a tolerant `strtoul`.
fn parse_hex_id(line: &[u8]) -> u32 {
    if line.len() < 3 {
        return 0;
    }
    std::str::from_utf8(&line[1..3])
        .ok()
        .and_then(|s| u32::from_str_radix(s, 16).ok())
        .unwrap_or(0)
}

/// Split the bytes from offset 4 onward into five fields: the first four
/// delimited by `:`, the fifth taking whatever remains (may itself contain
/// `:`, per §4.2.2).
fn parse_message_fields(line: &[u8]) -> Option<(u8, u32, u32, Vec<u8>)> {
    if line.len() <= 4 {
        return None;
    }
    let rest = &line[4..];

    let mut fields: Vec<&[u8]> = Vec::with_capacity(5);
    let mut start = 0;
    for _ in 0..4 {
        let pos = rest[start..].iter().position(|&b| b == b':')?;
        fields.push(&rest[start..start + pos]);
        start += pos + 1;
    }
    fields.push(&rest[start..]);

    if fields.iter().any(|f| f.is_empty()) {
        return None;
    }

    let p1 = std::str::from_utf8(fields[0]).ok()?;
    let p3 = std::str::from_utf8(fields[2]).ok()?;
    let p4 = std::str::from_utf8(fields[3]).ok()?;

    let msg_type: u32 = p1.parse().ok()?;
    let ric = u32::from_str_radix(p3, 16).ok()?;
    let functional_code: u32 = p4.parse().ok()?;
    let body = fields[4].to_vec();

    Some((msg_type as u8, ric, functional_code, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn time_sync_echo_marks_logged_in() {
        let mut engine = UpstreamEngine::new();
        let writes = engine.process_line(b"2 2024-01-01 00:00:00").await;
        assert_eq!(writes, vec![b"2 2024-01-01 00:00:00:0000\r\n".to_vec(), b"+\r\n".to_vec()]);
        assert!(engine.logged_in());
    }

    #[tokio::test]
    async fn schedule_record_is_parsed_and_retrievable() {
        let mut engine = UpstreamEngine::new();
        let writes = engine.process_line(b"4 0123456789ABCDEF").await;
        assert_eq!(writes, vec![b"+\r\n".to_vec()]);
        let schedule = engine.take_schedule().unwrap();
        assert!(schedule.all_slots());
        assert!(engine.take_schedule().is_none());
    }

    #[tokio::test]
    async fn well_formed_message_is_acked_and_published() {
        let mut engine = UpstreamEngine::new();
        let writes = engine.process_line(b"#01 5:a:007B:3:Hello").await;
        assert_eq!(writes, vec![b"#02 +\r\n".to_vec()]);

        let message = engine.take_next_message().unwrap();
        assert_eq!(message.msg_type, 5);
        assert_eq!(message.ric, 0x7B);
        assert_eq!(message.functional, Functional::Alphanumeric);
        assert_eq!(message.body, b"Hello");
    }

    #[tokio::test]
    async fn missing_field_is_negatively_acked() {
        let mut engine = UpstreamEngine::new();
        let writes = engine.process_line(b"#01 5:a:007B:3").await;
        assert_eq!(writes, vec![b"#02 -\r\n".to_vec()]);
        assert!(engine.take_next_message().is_none());
    }

    #[tokio::test]
    async fn out_of_range_functional_is_dropped_without_ack() {
        let mut engine = UpstreamEngine::new();
        let writes = engine.process_line(b"#01 5:a:007B:9:Hello").await;
        assert!(writes.is_empty());
        assert!(engine.take_next_message().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn login_failure_backs_off_and_increments_fail_count() {
        let mut engine = UpstreamEngine::new();
        let writes = engine.process_line(b"7 bad auth").await;
        assert_eq!(writes, vec![b"+\r\n".to_vec()]);
        assert_eq!(engine.fail_count(), 1);
    }

    #[tokio::test]
    async fn unknown_tag_is_negatively_acked() {
        let mut engine = UpstreamEngine::new();
        let writes = engine.process_line(b"zzz").await;
        assert_eq!(writes, vec![b"-\r\n".to_vec()]);
    }
}
