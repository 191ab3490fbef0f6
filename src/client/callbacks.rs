//! Callback adapters for the public client.
//!
//! A registration pairs a success callback with an error callback. The
//! adapter built here is what actually travels through the callback channel:
//! it decides which of the two runs and reports the choice back to the
//! Matcher as a [`CallbackOutcome`].

use crate::error::RecverError;
use crate::execution::{CallbackOutcome, MatchCallback};
use crate::logging::log_error;
use crate::messaging::{ConsumedMessage, MessageDecoder, RawMessage};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::info;

/// Combine a success and an error callback into one registration.
///
/// Messages carrying an error marker and messages the decoder rejects go to
/// `on_error`; everything else is decoded and handed to `on_success`.
pub(crate) fn adapt<D, F, E>(decoder: Arc<D>, on_success: F, on_error: E) -> MatchCallback
where
    D: MessageDecoder,
    F: FnOnce(ConsumedMessage<D::Value>) + Send + 'static,
    E: FnOnce(RecverError) + Send + 'static,
{
    Box::new(move |message: &RawMessage| {
        if let Some(reason) = message.error_message() {
            on_error(RecverError::message(
                message.topic.clone(),
                message.partition,
                reason,
            ));
            return CallbackOutcome::Rejected;
        }

        match decoder.decode(message) {
            Ok(value) => {
                on_success(ConsumedMessage::from_raw(message, value));
                CallbackOutcome::Delivered
            }
            Err(err) => {
                on_error(err);
                CallbackOutcome::Rejected
            }
        }
    })
}

/// Default success callback: log the message coordinates and value
pub fn log_consumed<V: Debug>(message: ConsumedMessage<V>) {
    info!(
        topic = %message.topic,
        partition = message.partition,
        offset = message.offset,
        value = ?message.value,
        "📨 Message consumed"
    );
}

/// Default error callback
pub fn log_consume_error(err: RecverError) {
    log_error("recver", "consume", &err.to_string(), None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::JsonDecoder;
    use parking_lot::Mutex;

    type Seen = Arc<Mutex<Vec<String>>>;

    fn recording_adapter(seen: &Seen) -> MatchCallback {
        let ok = Arc::clone(seen);
        let err = Arc::clone(seen);
        adapt(
            Arc::new(JsonDecoder),
            move |message| ok.lock().push(format!("ok:{}", message.value)),
            move |error| err.lock().push(format!("err:{error}")),
        )
    }

    #[test]
    fn test_decoded_message_goes_to_success() {
        let seen: Seen = Arc::default();
        let outcome = recording_adapter(&seen)(&RawMessage::new("orders", 0, 7, r#"{"id":1}"#));

        assert_eq!(outcome, CallbackOutcome::Delivered);
        assert_eq!(*seen.lock(), vec![r#"ok:{"id":1}"#.to_string()]);
    }

    #[test]
    fn test_decode_failure_goes_to_error() {
        let seen: Seen = Arc::default();
        let outcome = recording_adapter(&seen)(&RawMessage::new("orders", 0, 7, "not json"));

        assert_eq!(outcome, CallbackOutcome::Rejected);
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].starts_with("err:Message deserialization error"));
    }

    #[test]
    fn test_message_carried_error_goes_to_error() {
        let seen: Seen = Arc::default();
        let outcome =
            recording_adapter(&seen)(&RawMessage::failed("orders", 2, 9, "partition EOF"));

        assert_eq!(outcome, CallbackOutcome::Rejected);
        assert_eq!(
            *seen.lock(),
            vec!["err:Message error on orders[2]: partition EOF".to_string()]
        );
    }
}
