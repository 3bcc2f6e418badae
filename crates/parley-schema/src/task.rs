//! Progress payloads tools emit as custom messages

use serde::{Deserialize, Serialize};

use crate::message::{ChatMessage, MessageType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    New,
    Running,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskResult {
    Success,
    Error,
}

/// Status of a long-running task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskData {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub run_id: String,
    #[serde(default = "default_state")]
    pub state: TaskState,
    #[serde(default)]
    pub result: Option<TaskResult>,
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

fn default_state() -> TaskState {
    TaskState::New
}

impl TaskData {
    pub fn new(name: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            run_id: run_id.into(),
            state: TaskState::New,
            result: None,
            data: serde_json::Map::new(),
        }
    }

    pub fn completed(&self) -> bool {
        self.state == TaskState::Complete
    }

    pub fn completed_with_error(&self) -> bool {
        self.completed() && self.result == Some(TaskResult::Error)
    }

    /// Read task data out of a `custom` message
    pub fn from_message(message: &ChatMessage) -> Option<Self> {
        if message.kind != MessageType::Custom {
            return None;
        }
        serde_json::from_value(serde_json::Value::Object(message.custom_data.clone())).ok()
    }

    /// Payload to hand to a custom event writer
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_task_from_custom_message() {
        let mut task = TaskData::new("search", "r1");
        task.state = TaskState::Complete;
        task.result = Some(TaskResult::Error);

        let payload = task.to_payload();
        let msg = ChatMessage::custom(payload.as_object().cloned().unwrap());
        let parsed = TaskData::from_message(&msg).unwrap();
        assert!(parsed.completed_with_error());
        assert_eq!(parsed.name.as_deref(), Some("search"));
    }

    #[test]
    fn test_rejects_non_task_payload() {
        let mut data = serde_json::Map::new();
        data.insert("state".into(), serde_json::json!("exploded"));
        assert!(TaskData::from_message(&ChatMessage::custom(data)).is_none());
        assert!(TaskData::from_message(&ChatMessage::ai("x")).is_none());
    }
}
