//! Scripted mock transport shared by the integration tests

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thermolink_core::protocol::{LineTransport, ProtocolError};

#[derive(Default)]
struct Script {
    replies: VecDeque<String>,
    written: Vec<String>,
    closed: bool,
}

/// Transport double driven by a scripted reply stream. An empty string in
/// the script stands for a read timeout. Clones share the same script, so
/// tests can keep a handle after the client takes ownership.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies(replies: &[&str]) -> Self {
        let t = Self::new();
        t.push_replies(replies);
        t
    }

    pub fn push_replies(&self, replies: &[&str]) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .replies
            .extend(replies.iter().map(|r| r.to_string()));
    }

    /// Scripted replies not yet consumed by the client
    pub fn pending_replies(&self) -> usize {
        self.inner.lock().unwrap().replies.len()
    }

    /// Every line the client wrote, in order, terminators stripped
    pub fn written(&self) -> Vec<String> {
        self.inner.lock().unwrap().written.clone()
    }

    pub fn write_count(&self) -> usize {
        self.inner.lock().unwrap().written.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }
}

impl LineTransport for ScriptedTransport {
    fn send_line(&mut self, text: &str) -> Result<(), ProtocolError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(ProtocolError::NotConnected);
        }
        inner.written.push(text.to_string());
        Ok(())
    }

    fn read_line(&mut self) -> Result<String, ProtocolError> {
        let popped = self.inner.lock().unwrap().replies.pop_front();
        match popped {
            Some(line) => Ok(line),
            None => {
                // Keep the acquisition thread from spinning hot between polls
                std::thread::sleep(Duration::from_millis(1));
                Ok(String::new())
            }
        }
    }

    fn flush(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn close(&mut self) {
        self.inner.lock().unwrap().closed = true;
    }

    fn is_open(&self) -> bool {
        !self.inner.lock().unwrap().closed
    }
}

/// Poll until `predicate` holds or the deadline passes
pub fn wait_for(predicate: impl Fn() -> bool) -> bool {
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while std::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    predicate()
}
