use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument};

use nudge_core::{ChatTurn, Completion, CompletionProvider, GatewayError};

use crate::converter;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct OpenAiCompatConfig {
    pub base_url: String,
    pub deployment: String,
    pub api_version: String,
    pub api_key: SecretString,
    pub default_model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub system_prompt: String,
    pub timeout: Duration,
}

/// Chat completions against an Azure-style OpenAI deployment.
pub struct OpenAiCompatProvider {
    client: Client,
    config: OpenAiCompatConfig,
    url: String,
}

impl OpenAiCompatProvider {
    pub fn new(config: OpenAiCompatConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::NetworkError(format!("failed to build HTTP client: {e}")))?;
        let url = completions_url(&config.base_url, &config.deployment, &config.api_version);
        Ok(Self { client, config, url })
    }
}

pub fn completions_url(base_url: &str, deployment: &str, api_version: &str) -> String {
    format!(
        "{}/openai/deployments/{deployment}/chat/completions?api-version={api_version}",
        base_url.trim_end_matches('/')
    )
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl CompletionProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai-compat"
    }

    #[instrument(skip(self, turns), fields(deployment = %self.config.deployment, turns = turns.len()))]
    async fn complete(&self, turns: &[ChatTurn]) -> Result<Completion, GatewayError> {
        let body = converter::build_request_body(
            &self.config.system_prompt,
            turns,
            self.config.temperature,
            self.config.max_tokens,
        );

        let resp = self
            .client
            .post(&self.url)
            .header("api-key", self.config.api_key.expose_secret())
            .header("cache-control", "no-cache")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(self.config.timeout)
                } else {
                    GatewayError::NetworkError(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let wait = retry_after(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            return Err(match GatewayError::from_status(status.as_u16(), body) {
                GatewayError::RateLimited { .. } => GatewayError::RateLimited { retry_after: wait },
                other => other,
            });
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
        let completion = converter::parse_response(&json, &self.config.default_model)?;
        debug!(tokens = completion.tokens_used, model = %completion.model, "completion parsed");
        Ok(completion)
    }
}
