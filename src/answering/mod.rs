//! Question answering over retrieved context via an OpenAI-compatible chat completions API.
//!
//! The default backend targets Groq. The client is cheap to construct and never contacts the
//! provider until [`QueryAnswerer::answer`] is called, so a missing credential only surfaces
//! as a per-call error.

use crate::processing::ContextFragment;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Values shipped in example `.env` files that must be treated as "no credential".
pub const PLACEHOLDER_CREDENTIALS: [&str; 2] = ["your_groq_api_key_here", "temp_key_for_testing"];

const SYSTEM_PROMPT: &str = "You are an experienced audit assistant. Answer the question using \
only the document excerpts provided. Cite concrete figures when they appear. If the excerpts \
do not contain the answer, say that the document does not mention it.";

/// Errors surfaced while generating an answer.
#[derive(Debug, Error)]
pub enum AnswerError {
    /// The configured API URL could not be parsed.
    #[error("Invalid answering endpoint '{url}': {reason}")]
    InvalidEndpoint {
        /// URL as configured.
        url: String,
        /// Parser diagnostic.
        reason: String,
    },
    /// The HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    /// No usable credential is configured.
    #[error("Answering API key is not configured")]
    MissingCredential,
    /// The provider could not be reached.
    #[error("Answering provider unavailable: {0}")]
    Unavailable(String),
    /// The provider answered with a non-success status.
    #[error("Answering provider returned {status}: {body}")]
    Upstream {
        /// HTTP status returned by the provider.
        status: StatusCode,
        /// Response body, for diagnostics.
        body: String,
    },
    /// The provider response could not be interpreted.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Classification of the answering credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    /// No value set.
    Missing,
    /// A known example value.
    Placeholder,
    /// Looks like a real key.
    Configured,
}

/// Classify a credential against the placeholder deny-list.
pub fn classify_credential(value: Option<&str>) -> CredentialStatus {
    match value.map(str::trim) {
        None | Some("") => CredentialStatus::Missing,
        Some(key) if PLACEHOLDER_CREDENTIALS.contains(&key) => CredentialStatus::Placeholder,
        Some(_) => CredentialStatus::Configured,
    }
}

/// Question-answering collaborator consumed by the analysis orchestrator.
#[async_trait]
pub trait QueryAnswerer: Send + Sync {
    /// Produce an answer to `query` grounded in `context`.
    async fn answer(
        &self,
        query: &str,
        context: &[ContextFragment],
    ) -> Result<String, AnswerError>;
}

/// Connection settings for [`GroqAnswerer`].
#[derive(Debug, Clone)]
pub struct AnswererSettings {
    /// Base URL, e.g. `https://api.groq.com/openai/v1`.
    pub api_url: String,
    /// Bearer credential, possibly unset or a placeholder.
    pub api_key: Option<String>,
    /// Chat model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens in the generated answer.
    pub max_tokens: u32,
}

/// Chat-completions client answering audit questions.
pub struct GroqAnswerer {
    http: Client,
    endpoint: Url,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl GroqAnswerer {
    /// Build a client. Fails only on an unparsable URL or an HTTP client build error.
    pub fn new(settings: &AnswererSettings) -> Result<Self, AnswerError> {
        let base = format!("{}/", settings.api_url.trim_end_matches('/'));
        let endpoint = Url::parse(&base)
            .and_then(|base| base.join("chat/completions"))
            .map_err(|err| AnswerError::InvalidEndpoint {
                url: settings.api_url.clone(),
                reason: err.to_string(),
            })?;
        let http = Client::builder()
            .user_agent(concat!("audit-rag/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(AnswerError::Client)?;

        let api_key = match classify_credential(settings.api_key.as_deref()) {
            CredentialStatus::Configured => settings.api_key.clone(),
            CredentialStatus::Missing | CredentialStatus::Placeholder => None,
        };

        Ok(Self {
            http,
            endpoint,
            api_key,
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        })
    }
}

#[async_trait]
impl QueryAnswerer for GroqAnswerer {
    async fn answer(
        &self,
        query: &str,
        context: &[ContextFragment],
    ) -> Result<String, AnswerError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(AnswerError::MissingCredential)?;
        let prompt = build_prompt(query, context);
        let payload = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        tracing::debug!(
            model = %self.model,
            fragments = context.len(),
            "Requesting answer"
        );
        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| AnswerError::Unavailable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnswerError::Upstream { status, body });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|err| AnswerError::InvalidResponse(err.to_string()))?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| AnswerError::InvalidResponse("response contained no answer".into()))
    }
}

/// Render numbered excerpts followed by the question.
pub(crate) fn build_prompt(query: &str, context: &[ContextFragment]) -> String {
    let mut prompt = String::from("Document excerpts:\n");
    if context.is_empty() {
        prompt.push_str("(none)\n");
    }
    for (position, fragment) in context.iter().enumerate() {
        prompt.push_str(&format!(
            "\n[{}] ({})\n{}\n",
            position + 1,
            fragment.source,
            fragment.text.trim()
        ));
    }
    prompt.push_str(&format!("\nQuestion: {query}"));
    prompt
}
