/// Local Ollama server backend
use super::{GenerationError, GenerationOptions, TextGenerator};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: SamplingOptions,
}

#[derive(Debug, Serialize)]
struct SamplingOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Generates through `POST /api/generate` on an Ollama server
pub struct OllamaGenerator {
    client: Client,
    base_url: String,
    model: String,
    options: GenerationOptions,
}

impl OllamaGenerator {
    /// Connect to the server, failing if it does not answer `/api/tags`
    pub fn connect(
        base_url: &str,
        model: &str,
        options: GenerationOptions,
    ) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| {
                GenerationError::Initialization(format!("Failed to create HTTP client: {}", e))
            })?;
        let base_url = base_url.trim_end_matches('/').to_string();

        let response = client
            .get(format!("{}/api/tags", base_url))
            .send()
            .map_err(|e| {
                GenerationError::Initialization(format!(
                    "Ollama server not reachable at {}: {}",
                    base_url, e
                ))
            })?;
        if !response.status().is_success() {
            return Err(GenerationError::Initialization(format!(
                "Ollama server at {} answered {}",
                base_url,
                response.status()
            )));
        }

        tracing::debug!("Connected to Ollama at {} (model {})", base_url, model);

        Ok(Self {
            client,
            base_url,
            model: model.to_string(),
            options,
        })
    }
}

impl TextGenerator for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: SamplingOptions {
                temperature: self.options.temperature,
                num_predict: self.options.max_tokens,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            return Err(GenerationError::Backend { status, body });
        }

        let body: GenerateResponse = response.json()?;
        Ok(body.response)
    }
}
