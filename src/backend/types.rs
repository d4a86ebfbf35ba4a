//! Wire types exchanged with the assistant backend

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::{ToolCall, ToolDeclarations};

/// Speaker of a conversation turn on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

/// One turn of conversation history sent with a chat request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl ChatTurn {
    /// A plain user turn
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            timestamp: None,
        }
    }
}

/// JSON control payload of a voice request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceRequest {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDeclarations>>,
}

/// Result of a voice request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceResponse {
    #[serde(default)]
    pub id: Option<String>,

    /// What the backend heard
    #[serde(default)]
    pub transcript: Option<String>,

    /// Assistant reply text
    #[serde(default)]
    pub reply: Option<String>,

    /// Reference to synthesized speech (URL, data URL or bare base64 PCM)
    #[serde(default, alias = "ttsAudioReference")]
    pub tts_audio_url: Option<String>,

    #[serde(default)]
    pub meta: Option<Value>,

    #[serde(default)]
    pub function_calls: Option<Vec<ToolCall>>,
}

/// Generation options of a chat request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Text chat request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub model: String,
    pub conversation: Vec<ChatTurn>,
    #[serde(default)]
    pub options: ChatOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDeclarations>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
}

/// Token accounting reported by the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Result of a chat request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub reply: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub meta: Option<Value>,
    #[serde(default)]
    pub function_calls: Option<Vec<ToolCall>>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn voice_request_omits_absent_tools() {
        let request = VoiceRequest {
            model: "m".to_string(),
            system_instruction: Some("be brief".to_string()),
            tools: None,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "model": "m", "systemInstruction": "be brief" })
        );
    }

    #[test]
    fn voice_response_tolerates_nulls_and_missing_fields() {
        let response: VoiceResponse = serde_json::from_value(json!({
            "transcript": null,
            "reply": "Done.",
            "ttsAudioUrl": "https://cdn.example.com/a.pcm",
            "functionCalls": [{ "name": "listCapabilities" }]
        }))
        .unwrap();

        assert!(response.transcript.is_none());
        assert_eq!(response.reply.as_deref(), Some("Done."));
        assert_eq!(response.function_calls.unwrap()[0].name, "listCapabilities");
    }

    #[test]
    fn chat_request_uses_camel_case() {
        let request = ChatRequest {
            model: "m".to_string(),
            conversation: vec![ChatTurn::user("hello")],
            options: ChatOptions {
                temperature: Some(0.5),
                max_tokens: None,
            },
            tools: None,
            tool_config: None,
            system_instruction: Some("sys".to_string()),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["conversation"][0], json!({ "role": "user", "content": "hello" }));
        assert_eq!(value["options"], json!({ "temperature": 0.5 }));
        assert_eq!(value["systemInstruction"], "sys");
        assert!(value.get("toolConfig").is_none());
    }
}
