// ABOUTME: Task context decoded from the opaque task payload.
// ABOUTME: Carries the query id, caller params, webhook groups, and the agent or chatbot identity.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SdkError;

/// Which kind of handler a task is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Agent,
    Chatbot,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Agent => f.write_str("agent"),
            TaskKind::Chatbot => f.write_str("chatbot"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentIdentity {
    pub agent_id: String,
    #[serde(default)]
    pub agent_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatbotIdentity {
    pub chatbot_id: String,
    #[serde(default)]
    pub chatbot_name: String,
    /// Conversation history, oldest first. Records are passed through untouched.
    #[serde(default)]
    pub messages: Vec<Value>,
}

/// Identity fields, flattened into the context object on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identity {
    Chatbot(ChatbotIdentity),
    Agent(AgentIdentity),
}

/// One unit of work, as delivered in a task payload.
///
/// Handlers receive it behind an `Arc` shared with their emitters; nothing
/// hands out a mutable reference after decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    pub query_id: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub webhook_groups: Vec<String>,
    #[serde(flatten)]
    pub identity: Identity,
}

impl Context {
    /// Decode a task payload (UTF-8 JSON).
    pub fn decode(payload: &[u8]) -> Result<Self, SdkError> {
        let context: Context =
            serde_json::from_slice(payload).map_err(|e| SdkError::Decode(e.to_string()))?;
        if context.query_id.is_empty() {
            return Err(SdkError::Decode("queryId is empty".into()));
        }
        Ok(context)
    }

    /// Encode as a task payload.
    pub fn encode(&self) -> Result<Vec<u8>, SdkError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn kind(&self) -> TaskKind {
        match self.identity {
            Identity::Agent(_) => TaskKind::Agent,
            Identity::Chatbot(_) => TaskKind::Chatbot,
        }
    }

    pub fn agent_id(&self) -> Option<&str> {
        match &self.identity {
            Identity::Agent(agent) => Some(&agent.agent_id),
            Identity::Chatbot(_) => None,
        }
    }

    pub fn chatbot_id(&self) -> Option<&str> {
        match &self.identity {
            Identity::Chatbot(chatbot) => Some(&chatbot.chatbot_id),
            Identity::Agent(_) => None,
        }
    }

    /// Conversation history; empty for agent tasks.
    pub fn messages(&self) -> &[Value] {
        match &self.identity {
            Identity::Chatbot(chatbot) => &chatbot.messages,
            Identity::Agent(_) => &[],
        }
    }
}

/// Pull `queryId` out of a payload that failed full decoding, so the
/// failure can still be reported against the right query.
pub(crate) fn recover_query_id(payload: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(payload).ok()?;
    match value.get("queryId")? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        _ => None,
    }
}
