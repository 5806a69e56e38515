//! A single POCSAG transmission candidate (§3, `PagingMessage`).

use std::time::Instant;

/// POCSAG functional (address suffix) code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Functional {
    Numeric,
    Alert1,
    Alert2,
    Alphanumeric,
}

impl Functional {
    /// Decode the 2-bit functional code carried in `#` records. `None` for
    /// anything outside `0..3` — callers drop the message without acking.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Functional::Numeric),
            1 => Some(Functional::Alert1),
            2 => Some(Functional::Alert2),
            3 => Some(Functional::Alphanumeric),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Functional::Numeric => 0,
            Functional::Alert1 => 1,
            Functional::Alert2 => 2,
            Functional::Alphanumeric => 3,
        }
    }
}

/// A paging message received from the upstream, queued for transmission
/// through the locally attached POCSAG modem.
///
/// Immutable after construction; the dispatcher exclusively owns an instance
/// once it has been enqueued.
#[derive(Debug, Clone)]
pub struct PagingMessage {
    pub msg_type: u8,
    pub ric: u32,
    pub functional: Functional,
    pub body: Vec<u8>,
    pub queued_at: Instant,
}

impl PagingMessage {
    /// `ric` is expected to be non-zero and `body` empty only for `Alert1`
    /// (§3), but both are wire-supplied values from an untrusted upstream —
    /// this constructor does not enforce either, matching the filter/
    /// dispatcher's tolerance for well-formed-but-unusual input.
    pub fn new(msg_type: u8, ric: u32, functional: Functional, body: Vec<u8>) -> Self {
        Self {
            msg_type,
            ric,
            functional,
            body,
            queued_at: Instant::now(),
        }
    }

    pub fn length(&self) -> usize {
        self.body.len()
    }

    /// A time-sync message per §4.5.5: either `(type=5, Numeric)` or
    /// `(type=6, Alphanumeric, body starts with "XTIME=")`.
    pub fn is_time_sync(&self) -> bool {
        if self.msg_type == 5 && self.functional == Functional::Numeric {
            return true;
        }
        if self.msg_type == 6
            && self.functional == Functional::Alphanumeric
            && self.body.starts_with(b"XTIME=")
        {
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn functional_round_trips_through_code() {
        for f in [
            Functional::Numeric,
            Functional::Alert1,
            Functional::Alert2,
            Functional::Alphanumeric,
        ] {
            assert_eq!(Functional::from_code(f.code() as u32), Some(f));
        }
        assert_eq!(Functional::from_code(4), None);
        assert_eq!(Functional::from_code(99), None);
    }

    #[test]
    fn time_sync_detection() {
        let numeric_sync = PagingMessage::new(5, 123, Functional::Numeric, b"12:00".to_vec());
        assert!(numeric_sync.is_time_sync());

        let xtime_sync =
            PagingMessage::new(6, 123, Functional::Alphanumeric, b"XTIME=123456".to_vec());
        assert!(xtime_sync.is_time_sync());

        let not_sync = PagingMessage::new(6, 123, Functional::Alphanumeric, b"hello".to_vec());
        assert!(!not_sync.is_time_sync());

        let wrong_type = PagingMessage::new(5, 123, Functional::Alphanumeric, b"XTIME=1".to_vec());
        assert!(!wrong_type.is_time_sync());
    }

    #[test]
    fn length_matches_body() {
        let m = PagingMessage::new(3, 42, Functional::Alphanumeric, b"Hello".to_vec());
        assert_eq!(m.length(), 5);
    }
}
