//! Scripted HTTP transport.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use raccolta_engine::driver::http::{HttpRequest, HttpResponse, HttpTransport};
use raccolta_engine::error::{EngineError, EngineResult};

/// Answers requests from a queue of canned responses and records them.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a `200 application/json` response with `body`.
    pub fn with_json(self, body: serde_json::Value) -> Self {
        self.with_response(200, "application/json; charset=utf-8", &body.to_string())
    }

    pub fn with_response(self, status: u16, content_type: &str, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(HttpResponse {
                status,
                content_type: content_type.to_string(),
                body: body.to_string(),
            });
        self
    }

    /// Requests sent so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> EngineResult<HttpResponse> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request);
        self.responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .ok_or_else(|| EngineError::upstream("http", "no scripted response left"))
    }
}
