//! One-shot callbacks as queued in the callback channel.

use crate::messaging::RawMessage;

/// How an invoked callback handled its message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The success callback received the decoded value
    Delivered,
    /// The error callback received a message-carried or decoding error
    Rejected,
}

/// A registration waiting to be paired with the next unmatched message.
///
/// Each registration is consumed by exactly one message.
pub type MatchCallback = Box<dyn FnOnce(&RawMessage) -> CallbackOutcome + Send + 'static>;

/// Wrap a plain closure as a registration that always reports delivery
pub fn on_raw<F>(callback: F) -> MatchCallback
where
    F: FnOnce(&RawMessage) + Send + 'static,
{
    Box::new(move |message: &RawMessage| {
        callback(message);
        CallbackOutcome::Delivered
    })
}
