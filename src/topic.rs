// QUAK/ESR Feed - Topic dispatch and streaming scan statistics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Topic pattern dispatch.
//!
//! Handlers are registered against `/`-delimited patterns that may contain
//! `+` (exactly one level) and `#` (all remaining levels). Matching is a
//! prefix match: a pattern that runs out of segments before the topic does
//! still matches, so `scan/+/start` also fires for `scan/peak/start/ack`.

use crate::error::Result;
use crate::protocol::Message;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Identifier returned by [`TopicMatcher::register`]
pub type HandlerId = u64;

/// Receiver of dispatched messages
pub trait Handler: Send + Sync {
    /// Process one message. Errors and panics are reported by the
    /// dispatcher and do not stop delivery to other handlers.
    fn handle(&self, message: &Message) -> Result<()>;
}

impl<F> Handler for F
where
    F: Fn(&Message) -> Result<()> + Send + Sync,
{
    fn handle(&self, message: &Message) -> Result<()> {
        self(message)
    }
}

struct Registration {
    id: HandlerId,
    pattern: String,
    handler: Arc<dyn Handler>,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("pattern", &self.pattern)
            .finish()
    }
}

/// Outcome of one dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers whose pattern matched
    pub matched: usize,
    /// Matched handlers that returned an error
    pub failed: usize,
}

/// Ordered table of (pattern, handler) registrations
#[derive(Debug, Default)]
pub struct TopicMatcher {
    registrations: Vec<Registration>,
    last_id: HandlerId,
}

impl TopicMatcher {
    /// Create an empty matcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; ids start at 1 and are never reused
    pub fn register(
        &mut self,
        pattern: impl Into<String>,
        handler: impl Handler + 'static,
    ) -> HandlerId {
        self.register_shared(pattern, Arc::new(handler))
    }

    /// Register a handler that is shared with other owners
    pub fn register_shared(
        &mut self,
        pattern: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> HandlerId {
        self.last_id += 1;
        self.registrations.push(Registration {
            id: self.last_id,
            pattern: pattern.into(),
            handler,
        });
        self.last_id
    }

    /// Remove a registration. Unknown ids are ignored.
    ///
    /// Returns true if a registration was removed.
    pub fn remove(&mut self, id: HandlerId) -> bool {
        let before = self.registrations.len();
        self.registrations.retain(|r| r.id != id);
        self.registrations.len() != before
    }

    /// Number of registrations
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Check if no handler is registered
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Registered (id, pattern) pairs in registration order
    pub fn patterns(&self) -> impl Iterator<Item = (HandlerId, &str)> {
        self.registrations.iter().map(|r| (r.id, r.pattern.as_str()))
    }

    /// Invoke every matching handler in registration order
    pub fn dispatch(&self, message: &Message) -> DispatchReport {
        let mut report = DispatchReport::default();

        for registration in &self.registrations {
            if !topic_matches(&registration.pattern, &message.topic) {
                continue;
            }
            report.matched += 1;

            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| registration.handler.handle(message)));
            let result = match outcome {
                Ok(result) => result,
                Err(cause) => {
                    report.failed += 1;
                    log::warn!(
                        "handler {} ({}) panicked on {}: {}",
                        registration.id,
                        registration.pattern,
                        message.topic,
                        panic_message(cause.as_ref())
                    );
                    continue;
                }
            };

            if let Err(e) = result {
                report.failed += 1;
                if e.is_payload_error() {
                    log::debug!(
                        "handler {} ({}) skipped {}: {}",
                        registration.id,
                        registration.pattern,
                        message.topic,
                        e
                    );
                } else {
                    log::warn!(
                        "handler {} ({}) failed on {}: {}",
                        registration.id,
                        registration.pattern,
                        message.topic,
                        e
                    );
                }
            }
        }

        report
    }
}

fn panic_message(cause: &(dyn std::any::Any + Send)) -> &str {
    if let Some(text) = cause.downcast_ref::<&'static str>() {
        text
    } else if let Some(text) = cause.downcast_ref::<String>() {
        text.as_str()
    } else {
        "non-string panic"
    }
}

fn levels(s: &str) -> Vec<&str> {
    let mut parts: Vec<&str> = s.split('/').collect();
    if parts.last() == Some(&"") {
        parts.pop();
    }
    parts
}

/// Check a topic against a pattern.
///
/// A trailing slash on either side is ignored. The pattern may not be
/// longer than the topic, except that a final `#` also covers its parent
/// level (`a/#` matches `a`).
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let filter = levels(pattern);
    let topic = levels(topic);

    if filter.len() > topic.len() {
        let parent_level = filter.len() == topic.len() + 1 && filter.last() == Some(&"#");
        if !parent_level {
            return false;
        }
    }

    for (index, segment) in filter.iter().enumerate() {
        match *segment {
            "+" => continue,
            "#" => return true,
            literal => {
                if topic.get(index) != Some(&literal) {
                    return false;
                }
            }
        }
    }

    true
}
