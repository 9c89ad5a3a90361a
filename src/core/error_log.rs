//! # Bounded log of internal operation failures.
//!
//! Internal errors never reach callers in detail; they land here instead. The
//! log keeps the newest `capacity` records and evicts the oldest first.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;

use crate::calls::{CallContext, CallId};

/// One internal failure, as recorded by the control loop.
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    /// When the failure was recorded.
    pub at: SystemTime,
    /// Failing call.
    pub call: CallId,
    /// Operation name.
    pub operation: Arc<str>,
    /// Listener that routed the call, if known.
    pub origin: Option<Arc<str>>,
    /// Context headers of the call.
    pub context: Option<CallContext>,
    /// Error or panic message.
    pub message: String,
}

pub(crate) struct ErrorLog {
    capacity: usize,
    records: Mutex<VecDeque<ErrorRecord>>,
}

impl ErrorLog {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
        }
    }

    pub(crate) fn push(&self, record: ErrorRecord) {
        let mut records = self.records.lock();
        while records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    pub(crate) fn snapshot(&self) -> Vec<ErrorRecord> {
        self.records.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calls::CallFuture;

    fn record(message: &str) -> ErrorRecord {
        ErrorRecord {
            at: SystemTime::now(),
            call: CallFuture::new().id(),
            operation: Arc::from("op"),
            origin: None,
            context: None,
            message: message.to_string(),
        }
    }

    #[test]
    fn evicts_oldest_first() {
        let log = ErrorLog::new(2);
        log.push(record("a"));
        log.push(record("b"));
        log.push(record("c"));

        let kept: Vec<String> = log.snapshot().into_iter().map(|r| r.message).collect();
        assert_eq!(kept, vec!["b", "c"]);
    }

    #[test]
    fn zero_capacity_keeps_latest() {
        let log = ErrorLog::new(0);
        log.push(record("a"));
        log.push(record("b"));
        assert_eq!(log.snapshot().len(), 1);
    }
}
