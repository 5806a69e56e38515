//! Pending-message queue (§3, `Queue`).
//!
//! New messages are inserted at the front; the dispatcher consumes from the
//! back — FIFO in effective arrival order. Re-expressed from the original's
//! `std::deque<CPOCSAGMessage*>` as an owned `VecDeque<PagingMessage>`; no
//! raw pointers, no cross-component aliasing (§9).

use std::collections::VecDeque;

use crate::message::PagingMessage;

#[derive(Debug, Default)]
pub struct MessageQueue {
    inner: VecDeque<PagingMessage>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self {
            inner: VecDeque::new(),
        }
    }

    pub fn push(&mut self, message: PagingMessage) {
        self.inner.push_front(message);
    }

    pub fn peek_back(&self) -> Option<&PagingMessage> {
        self.inner.back()
    }

    pub fn pop_back(&mut self) -> Option<PagingMessage> {
        self.inner.pop_back()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}
