/// OpenAI-compatible chat completions backend (OpenAI, Groq, vLLM, ...)
use super::{GenerationError, GenerationOptions, TextGenerator};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiCompatibleGenerator {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    options: GenerationOptions,
}

impl OpenAiCompatibleGenerator {
    /// Build a client using the API key held in `api_key_env`
    ///
    /// Fails when the variable is unset or empty.
    pub fn from_env(
        base_url: &str,
        model: &str,
        api_key_env: &str,
        options: GenerationOptions,
    ) -> Result<Self, GenerationError> {
        let api_key = std::env::var(api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                GenerationError::Initialization(format!(
                    "Environment variable {} is not set",
                    api_key_env
                ))
            })?;

        Self::new(base_url, model, api_key, options)
    }

    pub fn new(
        base_url: &str,
        model: &str,
        api_key: String,
        options: GenerationOptions,
    ) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| {
                GenerationError::Initialization(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            options,
        })
    }
}

impl TextGenerator for OpenAiCompatibleGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            return Err(GenerationError::Backend { status, body });
        }

        let body: ChatResponse = response.json()?;
        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }
}
