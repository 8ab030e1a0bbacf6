use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::env;
use std::time::Duration;
use tokio::runtime::Runtime;

pub const CONTEXT_START: &str = "=== CONTEXT START ===";
pub const CONTEXT_END: &str = "=== CONTEXT END ===";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Gemini,
    OpenAi,
    Anthropic,
    Local,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::Gemini => "gemini",
            LlmProvider::OpenAi => "openai",
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::Local => "local",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "gemini" => Some(LlmProvider::Gemini),
            "openai" => Some(LlmProvider::OpenAi),
            "anthropic" => Some(LlmProvider::Anthropic),
            "local" => Some(LlmProvider::Local),
            _ => None,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::Gemini => "gemini-2.5-flash-lite",
            LlmProvider::OpenAi => "gpt-4.1-mini",
            LlmProvider::Anthropic => "claude-3-5-sonnet",
            LlmProvider::Local => "local",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub system: Option<String>,
    pub user: String,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
}

#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    provider: LlmProvider,
    model: String,
    config: ProviderConfig,
}

#[derive(Clone)]
enum ProviderConfig {
    Gemini { api_key: String },
    OpenAi { api_key: String, base_url: String },
    Anthropic { api_key: String, max_tokens: u32 },
    Local,
}

impl LlmClient {
    /// One completion per call, bounded by `timeout`. Callers decide whether
    /// to retry a failed call.
    pub fn new(provider: LlmProvider, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let model = model.into();
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        let config = match provider {
            LlmProvider::Gemini => ProviderConfig::Gemini {
                api_key: read_api_key("GEMINI_API_KEY")?,
            },
            LlmProvider::OpenAi => ProviderConfig::OpenAi {
                api_key: read_api_key("OPENAI_API_KEY")?,
                base_url: env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            },
            LlmProvider::Anthropic => ProviderConfig::Anthropic {
                api_key: read_api_key("ANTHROPIC_API_KEY")?,
                max_tokens: env::var("ANTHROPIC_MAX_TOKENS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1024),
            },
            LlmProvider::Local => ProviderConfig::Local,
        };
        Ok(Self {
            http,
            provider,
            model,
            config,
        })
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn chat(&self, req: &LlmRequest) -> Result<LlmResponse> {
        match &self.config {
            ProviderConfig::Gemini { api_key } => self.chat_gemini(api_key, req).await,
            ProviderConfig::OpenAi { api_key, base_url } => {
                self.chat_openai(api_key, base_url, req).await
            }
            ProviderConfig::Anthropic {
                api_key,
                max_tokens,
            } => self.chat_anthropic(api_key, *max_tokens, req).await,
            ProviderConfig::Local => Ok(LlmResponse {
                content: synthesize_local_response(req),
            }),
        }
    }

    pub fn chat_blocking(&self, req: &LlmRequest) -> Result<LlmResponse> {
        let rt = Runtime::new().context("failed to create tokio runtime")?;
        rt.block_on(self.chat(req))
    }

    async fn chat_gemini(&self, api_key: &str, req: &LlmRequest) -> Result<LlmResponse> {
        let mut prompt = String::new();
        if let Some(system) = &req.system {
            prompt.push_str(system.trim());
            prompt.push_str("\n\n");
        }
        prompt.push_str(&req.user);
        let payload = json!({
            "contents": [ { "parts": [ { "text": prompt } ] } ]
        });
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, api_key
        );
        let response = self
            .http
            .post(url)
            .json(&payload)
            .send()
            .await
            .with_context(|| "gemini request failed")?
            .error_for_status()
            .context("gemini returned an error")?
            .json::<GeminiResponse>()
            .await
            .context("failed to decode gemini response")?;
        let text = response
            .candidates
            .and_then(|mut c| c.pop())
            .and_then(|candidate| {
                candidate
                    .content
                    .parts
                    .into_iter()
                    .find_map(|part| part.text)
            })
            .ok_or_else(|| anyhow!("missing text in Gemini response"))?;
        Ok(LlmResponse { content: text })
    }

    async fn chat_openai(
        &self,
        api_key: &str,
        base_url: &str,
        req: &LlmRequest,
    ) -> Result<LlmResponse> {
        let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        let mut messages = Vec::new();
        if let Some(system) = &req.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": req.user }));
        let payload = json!({
            "model": self.model,
            "messages": messages,
        });
        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .with_context(|| "openai request failed")?
            .error_for_status()
            .context("openai returned an error")?
            .json::<ChatResponse>()
            .await
            .context("failed to decode openai response")?;
        let text = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("missing text in OpenAI response"))?;
        Ok(LlmResponse { content: text })
    }

    async fn chat_anthropic(
        &self,
        api_key: &str,
        max_tokens: u32,
        req: &LlmRequest,
    ) -> Result<LlmResponse> {
        let mut payload = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "messages": [ { "role": "user", "content": req.user } ],
        });
        if let Some(system) = &req.system {
            payload["system"] = json!(system);
        }
        let response = self
            .http
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&payload)
            .send()
            .await
            .with_context(|| "anthropic request failed")?
            .error_for_status()
            .context("anthropic returned an error")?
            .json::<AnthropicResponse>()
            .await
            .context("failed to decode anthropic response")?;
        let text = response
            .content
            .into_iter()
            .find_map(|part| part.text)
            .ok_or_else(|| anyhow!("missing text in Anthropic response"))?;
        Ok(LlmResponse { content: text })
    }
}

/// Offline provider: answers with the leading words of the supplied context
/// block, so retrieval and prompting can be exercised without network access.
fn synthesize_local_response(req: &LlmRequest) -> String {
    let context = extract_context_block(&req.user);
    let body = if context.is_empty() {
        req.user.clone()
    } else {
        context
    };
    let cleaned = body
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with("[DOC:"))
        .collect::<Vec<&str>>()
        .join(" ");
    let summary = cleaned
        .split_whitespace()
        .take(80)
        .collect::<Vec<&str>>()
        .join(" ");
    format!("According to the manual excerpts: {summary}")
}

fn extract_context_block(text: &str) -> String {
    let Some(start_idx) = text.find(CONTEXT_START) else {
        return String::new();
    };
    let after = &text[start_idx + CONTEXT_START.len()..];
    match after.find(CONTEXT_END) {
        Some(end_idx) => after[..end_idx].trim().to_string(),
        None => after.trim().to_string(),
    }
}

// Provider-specific variable first, generic LLM_API_KEY as the fallback.
fn read_api_key(var: &str) -> Result<String> {
    let value = env::var(var)
        .or_else(|_| env::var("LLM_API_KEY"))
        .map_err(|_| anyhow!(format!("{var} is not set")))?;
    validate_api_key(var, &value)?;
    Ok(value)
}

fn validate_api_key(var: &str, value: &str) -> Result<()> {
    if var.contains("GEMINI") && !value.starts_with("AI") {
        return Err(anyhow!(format!(
            "{} must be a valid Gemini API key (starts with 'AI...')",
            var
        )));
    }
    if var.contains("OPENAI") && !value.starts_with("sk-") {
        return Err(anyhow!(format!("{} must start with 'sk-'", var)));
    }
    if var.contains("ANTHROPIC") && !value.starts_with("sk-ant-") {
        return Err(anyhow!(format!("{} must start with 'sk-ant-'", var)));
    }
    Ok(())
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_round_trips_names() {
        for name in ["gemini", "openai", "anthropic", "local"] {
            let provider = LlmProvider::from_str(name).unwrap();
            assert_eq!(provider.as_str(), name);
        }
        assert!(LlmProvider::from_str("cohere").is_none());
    }

    #[test]
    fn local_provider_answers_from_context() {
        let req = LlmRequest {
            system: None,
            user: format!(
                "Answer from the context.\n\n{CONTEXT_START}\n[DOC: SV650_Manual.pdf, page 1]\nTire pressure should be 32 PSI when cold.\n{CONTEXT_END}\n\nQuestion: What is the tire pressure?\nAnswer:"
            ),
        };
        let answer = synthesize_local_response(&req);
        assert!(answer.contains("32 PSI"));
        assert!(!answer.contains("[DOC:"));
    }

    #[test]
    fn local_provider_without_context_echoes_prompt_words() {
        let req = LlmRequest {
            system: None,
            user: "no markers here".to_string(),
        };
        let answer = synthesize_local_response(&req);
        assert!(answer.contains("no markers here"));
    }

    #[test]
    fn gemini_keys_are_validated() {
        assert!(validate_api_key("GEMINI_API_KEY", "AIzaFake").is_ok());
        assert!(validate_api_key("GEMINI_API_KEY", "bogus").is_err());
        assert!(validate_api_key("ANTHROPIC_API_KEY", "sk-ant-xyz").is_ok());
        assert!(validate_api_key("ANTHROPIC_API_KEY", "sk-xyz").is_err());
    }
}
