// ABOUTME: Event envelope builder for results sent back to the coordinator.
// ABOUTME: Merges the caller payload with fixed routing fields that callers cannot override.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::{Context, Identity};
use crate::error::SdkError;

/// The four things a handler can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    QueryCreated,
    QueryCompleted,
    QueryFailed,
    EventCreated,
}

/// Wire value of `eventType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    QueryCreated,
    QueryCompleted,
    QueryFailed,
    EventCreated,
}

/// Wire value of `webhookListener`: the name of the emitter that produced the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WebhookListener {
    EmitQueryCreated,
    EmitQueryCompleted,
    EmitQueryFailed,
    EmitEventCreated,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::QueryCreated,
        EventKind::QueryCompleted,
        EventKind::QueryFailed,
        EventKind::EventCreated,
    ];

    pub fn event_type(self) -> EventType {
        match self {
            EventKind::QueryCreated => EventType::QueryCreated,
            EventKind::QueryCompleted => EventType::QueryCompleted,
            EventKind::QueryFailed => EventType::QueryFailed,
            EventKind::EventCreated => EventType::EventCreated,
        }
    }

    pub fn webhook_listener(self) -> WebhookListener {
        match self {
            EventKind::QueryCreated => WebhookListener::EmitQueryCreated,
            EventKind::QueryCompleted => WebhookListener::EmitQueryCompleted,
            EventKind::QueryFailed => WebhookListener::EmitQueryFailed,
            EventKind::EventCreated => WebhookListener::EmitEventCreated,
        }
    }
}

/// Keys every envelope writes itself. Payload entries with these names are dropped.
const ENVELOPE_KEYS: [&str; 4] = ["eventType", "webhookListener", "queryId", "params"];

const AGENT_KEYS: [&str; 1] = ["agentId"];
const CHATBOT_KEYS: [&str; 2] = ["chatbotId", "messages"];

/// One outbound event report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub event_type: EventType,
    pub webhook_listener: WebhookListener,
    pub query_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chatbot_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Value>>,
    #[serde(default)]
    pub params: Value,
    /// Caller-supplied fields, conventionally just `data`.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Envelope {
    /// Build the envelope for `kind` on behalf of `context`.
    ///
    /// An object payload contributes its fields; `null` contributes nothing;
    /// any other value becomes `{"data": value}`. Only the identity keys of
    /// the context's own variant override payload entries.
    pub fn build(context: &Context, kind: EventKind, payload: Value) -> Self {
        let (agent_id, chatbot_id, messages, identity_keys) = match &context.identity {
            Identity::Agent(agent) => (
                Some(agent.agent_id.clone()),
                None,
                None,
                &AGENT_KEYS[..],
            ),
            Identity::Chatbot(chatbot) => (
                None,
                Some(chatbot.chatbot_id.clone()),
                Some(chatbot.messages.clone()),
                &CHATBOT_KEYS[..],
            ),
        };

        Self {
            event_type: kind.event_type(),
            webhook_listener: kind.webhook_listener(),
            query_id: context.query_id.clone(),
            agent_id,
            chatbot_id,
            messages,
            params: context.params.clone(),
            payload: payload_fields(payload, identity_keys),
        }
    }

    /// `QUERY_FAILED` for a task whose payload never decoded into a context.
    pub fn undecodable_task(query_id: impl Into<String>, message: impl Into<String>) -> Self {
        let kind = EventKind::QueryFailed;
        Self {
            event_type: kind.event_type(),
            webhook_listener: kind.webhook_listener(),
            query_id: query_id.into(),
            agent_id: None,
            chatbot_id: None,
            messages: None,
            params: Value::Null,
            payload: payload_fields(Value::String(message.into()), &[]),
        }
    }

    /// The conventional `data` field, if the payload set one.
    pub fn data(&self) -> Option<&Value> {
        self.payload.get("data")
    }

    /// UTF-8 JSON bytes for `ResultMessage.data`.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SdkError> {
        Ok(serde_json::to_vec(self)?)
    }
}

fn payload_fields(payload: Value, identity_keys: &[&str]) -> Map<String, Value> {
    let mut fields = match payload {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("data".to_string(), other);
            map
        }
    };
    fields.retain(|key, _| {
        let key = key.as_str();
        !ENVELOPE_KEYS.contains(&key) && !identity_keys.contains(&key)
    });
    fields
}
