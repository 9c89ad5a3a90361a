//! # Call descriptors: arguments, context headers and the queued unit of work.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value};

use crate::calls::future::CallFuture;
use crate::operations::OperationRef;

/// Header carrying the caller's deadline (integer ms since the UNIX epoch).
pub const REPLY_BY: &str = "reply-by";

/// Positional and keyword arguments of a call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    /// Positional arguments.
    pub positional: Vec<Value>,
    /// Keyword arguments.
    pub keyword: Map<String, Value>,
}

impl CallArgs {
    /// No arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    pub fn arg(mut self, v: impl Into<Value>) -> Self {
        self.positional.push(v.into());
        self
    }

    /// Sets a keyword argument.
    pub fn kwarg(mut self, name: impl Into<String>, v: impl Into<Value>) -> Self {
        self.keyword.insert(name.into(), v.into());
        self
    }

    /// Positional argument at `index`.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    /// Keyword argument by name.
    pub fn get_kw(&self, name: &str) -> Option<&Value> {
        self.keyword.get(name)
    }

    /// True when there are neither positional nor keyword arguments.
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }
}

/// Per-call context headers (usually the headers of the incoming message).
///
/// The context is pushed onto the service for the duration of one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    headers: HashMap<String, String>,
}

impl CallContext {
    /// Empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Sets the `reply-by` deadline.
    pub fn with_reply_by(self, deadline: SystemTime) -> Self {
        let ms = deadline
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis();
        self.with_header(REPLY_BY, ms.to_string())
    }

    /// Header value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// All headers.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Parsed `reply-by` deadline. Unparseable values count as no deadline.
    pub fn reply_by(&self) -> Option<SystemTime> {
        let ms: u64 = self.get(REPLY_BY)?.trim().parse().ok()?;
        UNIX_EPOCH.checked_add(Duration::from_millis(ms))
    }

    /// True if the deadline is at or before `now`.
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.reply_by().is_some_and(|deadline| now >= deadline)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CallContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            headers: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// One queued call.
pub struct CallDescriptor<S> {
    /// Where the outcome goes.
    pub future: CallFuture,
    /// What to run.
    pub operation: OperationRef<S>,
    /// Arguments for the operation.
    pub args: CallArgs,
    /// Optional headers, pushed onto the service during execution.
    pub context: Option<CallContext>,
    /// Name of the listener that routed this call, if any.
    pub origin: Option<Arc<str>>,
}

impl<S> CallDescriptor<S> {
    /// True if the descriptor carries a deadline that has passed at `now`.
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.context.as_ref().is_some_and(|c| c.is_expired_at(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_by_in_the_past_is_expired() {
        let now = SystemTime::now();
        let ctx = CallContext::new().with_reply_by(now - Duration::from_secs(1));
        assert!(ctx.is_expired_at(now));
    }

    #[test]
    fn reply_by_in_the_future_is_live() {
        let now = SystemTime::now();
        let ctx = CallContext::new().with_reply_by(now + Duration::from_secs(60));
        assert!(!ctx.is_expired_at(now));
    }

    #[test]
    fn garbage_reply_by_means_no_deadline() {
        let ctx = CallContext::new().with_header(REPLY_BY, "soon");
        assert!(ctx.reply_by().is_none());
        assert!(!ctx.is_expired_at(SystemTime::now()));
    }

    #[test]
    fn args_builder() {
        let args = CallArgs::new().arg(1).kwarg("name", "x");
        assert_eq!(args.get(0), Some(&Value::from(1)));
        assert_eq!(args.get_kw("name"), Some(&Value::from("x")));
        assert!(!args.is_empty());
        assert!(CallArgs::new().is_empty());
    }
}
