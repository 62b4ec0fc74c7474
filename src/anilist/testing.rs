//! Scripted transports for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};

use super::client::{GraphqlRequest, GraphqlTransport, TransportResponse};
use super::error::UpstreamError;
use super::rate_limit::RateLimitInfo;

pub(crate) fn ok_response(data: Value) -> TransportResponse {
    TransportResponse {
        status: 200,
        rate_limit: RateLimitInfo::default(),
        body: json!({ "data": data }),
    }
}

/// Replays a fixed script of replies, in order.
#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Result<TransportResponse, UpstreamError>>>,
    requests: Mutex<Vec<Value>>,
    last_bearer: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    pub(crate) fn new(script: Vec<Result<TransportResponse, UpstreamError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_bearer(&self) -> Option<String> {
        self.last_bearer.lock().unwrap().clone()
    }

    /// Variables of every request sent so far.
    pub(crate) fn sent_variables(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GraphqlTransport for ScriptedTransport {
    async fn send(
        &self,
        request: &GraphqlRequest,
        bearer: Option<&str>,
    ) -> Result<TransportResponse, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.variables.clone());
        *self.last_bearer.lock().unwrap() = bearer.map(str::to_string);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(UpstreamError::Transient("script exhausted".into())))
    }
}
