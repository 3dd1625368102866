use std::{fmt, str::FromStr};

use anyhow::Context;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::{api::ApiUrls, app_error::AppError, models::ChatMessageEntity};

/// How many of the latest messages are sent as conversation context.
pub const CONTEXT_WINDOW: usize = 20;

const SYSTEM_PROMPT: &str = "You are a pharmacy assistant. Answer questions about \
medicines, their ingredients and usage, and recommend when to consult a doctor.";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChatSender {
    User,
    Bot,
}

impl ChatSender {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatSender::User => "user",
            ChatSender::Bot => "bot",
        }
    }

    fn model_role(&self) -> &'static str {
        match self {
            ChatSender::User => "user",
            ChatSender::Bot => "model",
        }
    }
}

impl fmt::Display for ChatSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatSender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(ChatSender::User),
            "bot" => Ok(ChatSender::Bot),
            other => Err(format!("Unknown chat sender {other}")),
        }
    }
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

/// Builds a `generateContent` request body from the tail of a transcript.
pub fn build_request(transcript: &[ChatMessageEntity]) -> serde_json::Value {
    let start = transcript.len().saturating_sub(CONTEXT_WINDOW);
    let contents: Vec<_> = transcript[start..]
        .iter()
        .map(|message| {
            let role = message
                .sender
                .parse::<ChatSender>()
                .unwrap_or(ChatSender::User)
                .model_role();
            json!({ "role": role, "parts": [{ "text": message.content }] })
        })
        .collect();

    json!({
        "systemInstruction": { "parts": [{ "text": SYSTEM_PROMPT }] },
        "contents": contents,
    })
}

pub async fn generate_reply(
    client: Client,
    urls: &ApiUrls,
    transcript: &[ChatMessageEntity],
) -> Result<String, AppError> {
    let mut request = client.post(&urls.assistant_api_url).json(&build_request(transcript));
    if let Some(key) = &urls.assistant_api_key {
        request = request.query(&[("key", key)]);
    }

    let response: GenerateContentResponse = request
        .send()
        .await
        .map_err(|_| AppError::ServiceUnreachable("AssistantService".into()))?
        .error_for_status()
        .map_err(|_| AppError::ServiceUnreachable("AssistantService".into()))?
        .json()
        .await
        .context("Failed to parse JSON")?;

    let reply: String = response
        .candidates
        .into_iter()
        .next()
        .map(|candidate| {
            candidate
                .content
                .parts
                .into_iter()
                .map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if reply.trim().is_empty() {
        return Err(AppError::BadGateway("Assistant returned an empty reply".into()));
    }

    Ok(reply)
}
