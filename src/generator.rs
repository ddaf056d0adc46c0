//! Answer Generator (§4G) — an HTTP chat-completion client that turns
//! formatted context into a natural-language answer.
//!
//! Grounded on the teacher's optional HTTP-backed LLM client pattern
//! (feature-gated behind `llm`, `reqwest::blocking` so the rest of the
//! crate stays synchronous), generalized from a code-explanation prompt to
//! a grounding-and-brevity prompt over record context, with a decoding
//! profile chosen from [`crate::embedder::ExecutionProvider`] so the
//! generator doesn't re-probe hardware the embedder already detected.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::embedder::ExecutionProvider;
use crate::query_parser::{ParsedQuery, QueryType};

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("generation model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("generation failed: {0}")]
    GenerationFailed(String),
}

/// Decoding parameters chosen per hardware profile (§4G): a GPU deployment
/// can afford a larger, higher-temperature completion; a CPU-constrained
/// deployment is kept short and deterministic to bound latency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodingProfile {
    pub temperature: f32,
    pub max_tokens: u32,
    pub label: &'static str,
}

impl DecodingProfile {
    pub fn for_provider(provider: ExecutionProvider) -> Self {
        if provider.is_gpu() {
            DecodingProfile {
                temperature: 0.7,
                max_tokens: 500,
                label: "parallel",
            }
        } else {
            DecodingProfile {
                temperature: 0.0,
                max_tokens: 200,
                label: "constrained",
            }
        }
    }
}

pub struct AnswerGenerator {
    endpoint: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::blocking::Client,
    profile: DecodingProfile,
}

impl AnswerGenerator {
    pub fn new(endpoint: String, api_key: Option<String>, model: String, provider: ExecutionProvider) -> Self {
        Self {
            endpoint,
            api_key,
            model,
            client: reqwest::blocking::Client::new(),
            profile: DecodingProfile::for_provider(provider),
        }
    }

    /// Generate an answer grounded in `context` for the given `parsed`
    /// query. Degrades to `GeneratorError` rather than panicking; callers
    /// (the Orchestrator) fall back to returning the formatted context
    /// unanswered rather than failing the whole query (§4G, §7).
    pub fn generate(&self, context: &str, parsed: &ParsedQuery) -> Result<String, GeneratorError> {
        let prompt = build_prompt(context, parsed);

        let body = ChatRequest {
            model: self.model.clone(),
            temperature: self.profile.temperature,
            max_tokens: self.profile.max_tokens,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt,
            }],
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                GeneratorError::ModelUnavailable(e.to_string())
            } else {
                GeneratorError::GenerationFailed(e.to_string())
            }
        })?;

        if response.status() == reqwest::StatusCode::SERVICE_UNAVAILABLE
            || response.status() == reqwest::StatusCode::NOT_FOUND
        {
            return Err(GeneratorError::ModelUnavailable(format!(
                "generation endpoint returned {}",
                response.status()
            )));
        }
        if !response.status().is_success() {
            return Err(GeneratorError::GenerationFailed(format!(
                "generation endpoint returned {}",
                response.status()
            )));
        }

        let parsed_response: ChatResponse = response
            .json()
            .map_err(|e| GeneratorError::GenerationFailed(e.to_string()))?;

        parsed_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| GeneratorError::GenerationFailed("empty completion".to_string()))
    }
}

/// Build the chat-completion prompt: a task declaration, the context
/// verbatim, and a query-type-specific instruction (§4G contract: ground in
/// context, be brief, never alter numeric tokens from a `count` context).
fn build_prompt(context: &str, parsed: &ParsedQuery) -> String {
    let instruction = match parsed.query_type {
        QueryType::Count => "ענה במספר המדויק המופיע בהקשר, ללא שינוי הספרה.",
        QueryType::Summarize => "סכם את ההקשר בקצרה, תוך שמירה על המספרים כפי שהם.",
        QueryType::Urgent => "פרט את הרשומות הדחופות ביותר תחילה, לפי הקיבוץ בהקשר.",
        QueryType::Similar => "הסבר במה הרשומות הבאות דומות לרשומת המקור.",
        QueryType::Find | QueryType::AnswerRetrieval => {
            "ענה על השאלה תוך הסתמכות אך ורק על ההקשר שלהלן."
        }
    };

    format!(
        "אתה עוזר המבוסס אך ורק על המידע הבא. אל תמציא עובדות שאינן מופיעות בהקשר.\n\n\
         הקשר:\n{context}\n\n\
         שאלה: {question}\n\n\
         הנחיה: {instruction}\n\
         תשובה קצרה וממוקדת:",
        context = context,
        question = parsed.original_text,
        instruction = instruction,
    )
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}
