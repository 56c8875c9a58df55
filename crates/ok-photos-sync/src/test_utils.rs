//! Scripted remote API and resource fixtures for exercising the engine
//! without a network.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use crate::error::RemoteError;
use crate::parse::Resource;
use crate::remote::{ApiParams, RemoteApi};
use crate::types::RemoteId;

type Handler = Box<dyn Fn(&ApiParams) -> Result<Value, RemoteError> + Send + Sync>;

/// One call observed by [`ScriptedApi`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: String,
    pub params: ApiParams,
}

/// A [`RemoteApi`] answering from per-method scripts.
///
/// Queued responses are consumed first, in order. Once a method's queue is
/// empty its handler (if any) answers. A call with neither fails with a
/// transport error naming the method.
#[derive(Default)]
pub struct ScriptedApi {
    queued: Mutex<HashMap<String, VecDeque<Result<Value, RemoteError>>>>,
    handlers: HashMap<String, Handler>,
    calls: Mutex<Vec<RecordedCall>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, method: &str, response: Value) -> Self {
        self.enqueue(method, Ok(response));
        self
    }

    pub fn with_failure(self, method: &str, error: RemoteError) -> Self {
        self.enqueue(method, Err(error));
        self
    }

    pub fn with_handler<F>(mut self, method: &str, handler: F) -> Self
    where
        F: Fn(&ApiParams) -> Result<Value, RemoteError> + Send + Sync + 'static,
    {
        self.handlers.insert(method.to_string(), Box::new(handler));
        self
    }

    /// Queue a response after construction.
    pub fn enqueue(&self, method: &str, response: Result<Value, RemoteError>) {
        lock(&self.queued)
            .entry(method.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    /// Parameters of every call to `method`, in call order.
    pub fn calls_to(&self, method: &str) -> Vec<ApiParams> {
        lock(&self.calls)
            .iter()
            .filter(|call| call.method == method)
            .map(|call| call.params.clone())
            .collect()
    }
}

#[async_trait]
impl RemoteApi for ScriptedApi {
    async fn call(&self, method: &str, params: &ApiParams) -> Result<Resource, RemoteError> {
        lock(&self.calls).push(RecordedCall {
            method: method.to_string(),
            params: params.clone(),
        });

        let queued = lock(&self.queued)
            .get_mut(method)
            .and_then(VecDeque::pop_front);
        let answer = match queued {
            Some(answer) => answer,
            None => match self.handlers.get(method) {
                Some(handler) => handler(params),
                None => Err(RemoteError::Transport(format!(
                    "no scripted response for {}",
                    method
                ))),
            },
        }?;

        match answer {
            Value::Object(map) => Ok(map),
            other => Err(RemoteError::Transport(format!(
                "scripted response for {} is not an object: {}",
                method, other
            ))),
        }
    }
}

/// Handler serving `items` page by page, honouring `count` and a numeric
/// offset carried in `cursor_key`.
///
/// Items are grouped by the value of `scope_param` (e.g. `aid`); a request
/// for an unknown scope gets an empty page. The cursor is omitted on the
/// last page.
pub fn paged_handler(
    items_key: &'static str,
    cursor_key: &'static str,
    scope_param: &'static str,
    scopes: Vec<(RemoteId, Vec<Value>)>,
) -> impl Fn(&ApiParams) -> Result<Value, RemoteError> + Send + Sync + 'static {
    let scopes: HashMap<String, Vec<Value>> = scopes
        .into_iter()
        .map(|(scope, items)| (scope.to_string(), items))
        .collect();

    move |params: &ApiParams| {
        let items = params
            .get(scope_param)
            .and_then(|scope| scopes.get(scope))
            .cloned()
            .unwrap_or_default();
        let count = params
            .get("count")
            .and_then(|c| c.parse::<usize>().ok())
            .unwrap_or(items.len());
        let offset = params
            .get(cursor_key)
            .and_then(|c| c.parse::<usize>().ok())
            .unwrap_or(0);

        let end = (offset + count).min(items.len());
        let page: Vec<Value> = items.get(offset..end).map(<[Value]>::to_vec).unwrap_or_default();

        let mut response = serde_json::Map::new();
        response.insert(items_key.to_string(), Value::Array(page));
        if end < items.len() {
            response.insert(cursor_key.to_string(), Value::String(end.to_string()));
        }
        Ok(Value::Object(response))
    }
}

pub fn album_resource(aid: RemoteId, group_id: RemoteId, title: &str) -> Value {
    json!({
        "aid": aid.to_string(),
        "group_id": group_id.to_string(),
        "author_type": "GROUP",
        "title": title,
        "created": "2013-05-21",
        "photos_count": 0,
        "like_summary": {"count": 0},
    })
}

pub fn photo_resource(id: RemoteId, album_id: RemoteId, group_id: RemoteId) -> Value {
    json!({
        "id": id.to_string(),
        "album_id": album_id.to_string(),
        "group_id": group_id.to_string(),
        "author_type": "GROUP",
        "text": format!("photo {}", id),
        "created_ms": 1369130400000i64,
        "pic640x480": format!("http://i.mycdn.me/{}/640", id),
    })
}

pub fn user_resource(uid: RemoteId, name: &str) -> Value {
    json!({
        "uid": uid.to_string(),
        "name": name,
        "gender": "female",
        "pic128x128": format!("http://i.mycdn.me/u/{}", uid),
    })
}
