use serde::{Deserialize, Serialize};

use crate::encode::{EncodedPayload, EncodingError};

/// Body POSTed to the analysis agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisRequest {
    pub messages: Vec<Message>,
}

impl AnalysisRequest {
    /// One user message: the image first, then the instruction.
    pub fn new(payload: &EncodedPayload, instruction: &str) -> Self {
        Self {
            messages: vec![Message {
                role: Role::User,
                content: vec![
                    ContentPart::Image {
                        image: payload.data_uri(),
                        mime_type: payload.mime_type.clone(),
                    },
                    ContentPart::Text {
                        text: instruction.to_string(),
                    },
                ],
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    Image {
        image: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Text {
        text: String,
    },
}

/// Everything that can go wrong between "Analyze" and a displayed result.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error("Request failed: {0}")]
    Transport(String),
    /// Non-2xx status; `detail` is the server body, or `HTTP <code>` when empty.
    #[error("{detail}")]
    Network { status: u16, detail: String },
    #[error("Server returned an empty response. The API may expect a different request format or return a streaming response.")]
    EmptyResponse,
    #[error("Server did not return valid JSON. Response: {snippet}")]
    MalformedJson { snippet: String },
}
