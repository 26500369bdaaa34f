#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use power_battle::config::{AiConfig, AI_CONFIG_KEY};
use power_battle::transport::HttpResponse;
use power_battle::{HttpTransport, KeyValueStore, MemoryStore, TransportError};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: String,
    pub bearer: String,
    pub body: Option<Value>,
}

impl RecordedRequest {
    pub fn system_prompt(&self) -> Option<String> {
        let body = self.body.as_ref()?;
        body["messages"]
            .as_array()?
            .iter()
            .find(|m| m["role"] == "system")
            .and_then(|m| m["content"].as_str())
            .map(str::to_string)
    }
}

/// Replays canned responses in order and records every request.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_replies(
        replies: impl IntoIterator<Item = Result<HttpResponse, TransportError>>,
    ) -> Arc<Self> {
        let transport = Self::default();
        transport.replies.lock().extend(replies);
        Arc::new(transport)
    }

    pub fn push(&self, reply: Result<HttpResponse, TransportError>) {
        self.replies.lock().push_back(reply);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn next(&self, request: RecordedRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(request);
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Network("no scripted reply left".into())))
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn post_json(
        &self,
        url: &str,
        bearer: &str,
        body: &Value,
    ) -> Result<HttpResponse, TransportError> {
        self.next(RecordedRequest {
            method: "POST",
            url: url.to_string(),
            bearer: bearer.to_string(),
            body: Some(body.clone()),
        })
    }

    async fn get(&self, url: &str, bearer: &str) -> Result<HttpResponse, TransportError> {
        self.next(RecordedRequest {
            method: "GET",
            url: url.to_string(),
            bearer: bearer.to_string(),
            body: None,
        })
    }
}

/// A successful chat completion whose first choice says `content`.
pub fn chat_reply(content: &str) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse::new(
        200,
        json!({"choices": [{"message": {"role": "assistant", "content": content}}]}).to_string(),
    ))
}

pub fn status_reply(status: u16, body: &str) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse::new(status, body))
}

pub fn not_similar() -> Result<HttpResponse, TransportError> {
    chat_reply(r#"{"isSimilar": false}"#)
}

pub fn test_config() -> AiConfig {
    AiConfig {
        api_key: "sk-test-0123456789".to_string(),
        base_url: "https://judge.example/v1".to_string(),
        model: "judge-model".to_string(),
    }
}

/// Store with a complete AI config already saved.
pub fn configured_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .set(AI_CONFIG_KEY, serde_json::to_value(test_config()).unwrap())
        .unwrap();
    store
}
