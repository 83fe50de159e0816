//! The contract between transports and the dispatcher.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{trace, warn};

use crate::api::{ApiCaller, ApiResponse};
use crate::correlator::Correlator;
use crate::directory::CallerDirectory;

/// Receives an event payload together with the peer it arrived from.
pub type EventSink = Arc<dyn Fn(Vec<u8>, Arc<dyn ApiCaller>) + Send + Sync>;

/// What an inbound frame turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Carries an `echo` and answers a pending call.
    Response(ApiResponse),
    /// A keep-alive meta event.
    Heartbeat,
    /// Anything else, to be dispatched.
    Event,
}

impl Frame {
    pub fn classify(payload: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(payload)?;
        if value.get("echo").is_some() {
            return serde_json::from_value(value).map(Frame::Response);
        }
        if value.get("meta_event_type").and_then(Value::as_str) == Some("heartbeat") {
            return Ok(Frame::Heartbeat);
        }
        Ok(Frame::Event)
    }
}

/// Everything a driver needs from the runtime.
#[derive(Clone)]
pub struct DriverContext {
    directory: Arc<CallerDirectory>,
    sink: EventSink,
}

impl DriverContext {
    pub fn new(directory: Arc<CallerDirectory>, sink: EventSink) -> Self {
        Self { directory, sink }
    }

    pub fn directory(&self) -> &Arc<CallerDirectory> {
        &self.directory
    }

    /// Hands an event payload to the dispatcher.
    pub fn dispatch(&self, payload: Vec<u8>, caller: Arc<dyn ApiCaller>) {
        (self.sink)(payload, caller);
    }

    /// Routes one frame read from a duplex connection.
    ///
    /// Responses go to `correlator`, heartbeats are dropped and everything
    /// else is dispatched with `caller` as the reply target.
    pub fn route_frame(
        &self,
        payload: Vec<u8>,
        correlator: &Correlator,
        caller: &Arc<dyn ApiCaller>,
    ) {
        match Frame::classify(&payload) {
            Ok(Frame::Response(response)) => {
                correlator.resolve(response);
            }
            Ok(Frame::Heartbeat) => trace!(bot_id = caller.self_id(), "heartbeat"),
            Ok(Frame::Event) => self.dispatch(payload, caller.clone()),
            Err(e) => warn!(bot_id = caller.self_id(), error = %e, "discarding malformed frame"),
        }
    }
}

/// A transport to the platform.
///
/// `connect` establishes the connection (dialing, or binding a listener)
/// and `listen` runs the receive loop for the lifetime of the process.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Short name for logs, e.g. `ws-client`.
    fn name(&self) -> &'static str;

    async fn connect(&self, ctx: &DriverContext);

    async fn listen(&self, ctx: DriverContext);
}

/// A shared driver handle.
pub type BoxedDriver = Arc<dyn Driver>;

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::api::ApiRequest;
    use crate::directory::tests::NullCaller;

    #[test]
    fn test_classify() {
        let resp = Frame::classify(br#"{"status":"ok","retcode":0,"data":null,"echo":3}"#).unwrap();
        assert!(matches!(resp, Frame::Response(r) if r.echo == Some(3)));

        let beat = Frame::classify(br#"{"post_type":"meta_event","meta_event_type":"heartbeat"}"#);
        assert_eq!(beat.unwrap(), Frame::Heartbeat);

        let life = Frame::classify(br#"{"post_type":"meta_event","meta_event_type":"lifecycle"}"#);
        assert_eq!(life.unwrap(), Frame::Event);

        assert!(Frame::classify(b"not json").is_err());
    }

    #[test]
    fn test_route_frame() {
        let seen: Arc<Mutex<Vec<Vec<u8>>>> = Arc::default();
        let sink_seen = seen.clone();
        let ctx = DriverContext::new(
            Arc::new(CallerDirectory::new()),
            Arc::new(move |payload: Vec<u8>, _: Arc<dyn ApiCaller>| {
                sink_seen.lock().unwrap().push(payload)
            }),
        );
        let correlator = Correlator::new();
        let caller: Arc<dyn ApiCaller> = Arc::new(NullCaller(1));

        let mut req = ApiRequest::new("x");
        let pending = correlator.register(&mut req);
        let response = format!(r#"{{"status":"ok","echo":{}}}"#, pending.echo());

        ctx.route_frame(response.into_bytes(), &correlator, &caller);
        ctx.route_frame(br#"{"meta_event_type":"heartbeat"}"#.to_vec(), &correlator, &caller);
        ctx.route_frame(br#"{"post_type":"message"}"#.to_vec(), &correlator, &caller);

        assert_eq!(correlator.pending_len(), 0);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], br#"{"post_type":"message"}"#.to_vec());
    }
}
