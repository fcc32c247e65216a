use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

// Import logging macros
use crate::log_llm_operation;

/// Fixed fallback used whenever the text-generation call cannot run or
/// fails: missing credential, transport error, empty response.
pub const FALLBACK_ENCOURAGEMENT: &str =
    "ما شاء الله! أحسنت يا بطل، واصل اجتهادك في حفظ كتاب الله.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    OpenAi,
    Gemini,
}

/// Common message structure for chat-style requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Enum-based provider implementation
#[derive(Debug, Clone)]
pub enum Provider {
    OpenAi(OpenAiProvider),
    Gemini(GeminiProvider),
}

impl Provider {
    pub async fn make_request(&self, system_message: &str, prompt: &str) -> Result<String> {
        match self {
            Provider::OpenAi(provider) => provider.make_request(system_message, prompt).await,
            Provider::Gemini(provider) => provider.make_request(system_message, prompt).await,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        match self {
            Provider::OpenAi(_) => "OpenAI",
            Provider::Gemini(_) => "Gemini",
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Clone, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiChoice {
    message: ChatMessage,
}

impl OpenAiProvider {
    pub fn new(api_key: String, base_url: Option<String>, model: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
        }
    }

    pub async fn make_request(&self, system_message: &str, prompt: &str) -> Result<String> {
        let request_body = OpenAiRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_message.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(
                provider = "OpenAI",
                status = %status,
                error = %error_text,
                "Text-generation request failed"
            );
            return Err(anyhow::anyhow!("OpenAI API request failed: {}", error_text));
        }

        let body: OpenAiResponse = response.json().await?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(anyhow::anyhow!("No choices in OpenAI response"));
        }
        Ok(content)
    }
}

#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Clone, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

impl GeminiProvider {
    pub fn new(api_key: String, base_url: Option<String>, model: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            model: model.unwrap_or_else(|| "gemini-2.0-flash-exp".to_string()),
        }
    }

    pub async fn make_request(&self, system_message: &str, prompt: &str) -> Result<String> {
        let request_body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: format!("{}\n\n{}", system_message, prompt),
                }],
            }],
        };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(
                provider = "Gemini",
                status = %status,
                error = %error_text,
                "Text-generation request failed"
            );
            return Err(anyhow::anyhow!("Gemini API request failed: {}", error_text));
        }

        let body: GeminiResponse = response.json().await?;
        let content = body
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(anyhow::anyhow!("No candidates in Gemini response"));
        }
        Ok(content)
    }
}

/// One-shot encouragement-message generation with a static fallback. Never
/// fails and never blocks the save/send path on the caller's side.
#[derive(Clone)]
pub struct EncouragementService {
    provider: Provider,
    has_credential: bool,
}

impl EncouragementService {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        kind: ProviderKind,
        model: Option<String>,
    ) -> Self {
        let has_credential = !api_key.is_empty() && api_key != "your-api-key";
        let provider = match kind {
            ProviderKind::OpenAi => {
                Provider::OpenAi(OpenAiProvider::new(api_key, base_url, model))
            }
            ProviderKind::Gemini => {
                Provider::Gemini(GeminiProvider::new(api_key, base_url, model))
            }
        };
        Self {
            provider,
            has_credential,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    pub fn has_credential(&self) -> bool {
        self.has_credential
    }

    /// Generate a short encouragement for today's achievement. A missing
    /// credential resolves synchronously to the fallback without calling
    /// out; any remote failure maps to the same fallback.
    pub async fn generate_encouragement(&self, student_name: &str, achievement: &str) -> String {
        if !self.has_credential {
            log_llm_operation!(fallback, "encouragement", "missing api key");
            return FALLBACK_ENCOURAGEMENT.to_string();
        }

        log_llm_operation!(start, "encouragement", provider = self.provider_name());

        let system_message =
            "أنت معلم تحفيظ قرآن ودود. اكتب رسالة تشجيع قصيرة (جملتان كحد أقصى) لطالب وولي أمره.";
        let prompt = format!(
            "اسم الطالب: {}\nإنجاز اليوم: {}\nاكتب رسالة تشجيعية مناسبة.",
            student_name, achievement
        );

        match self.provider.make_request(system_message, &prompt).await {
            Ok(text) => {
                log_llm_operation!(
                    success,
                    "encouragement",
                    provider = self.provider_name(),
                    response_length = text.len()
                );
                text
            }
            Err(e) => {
                debug!(error = %e, "encouragement generation failed, using fallback");
                log_llm_operation!(fallback, "encouragement", e);
                FALLBACK_ENCOURAGEMENT.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_credential_resolves_to_fallback_without_network() {
        let service = EncouragementService::new(
            "your-api-key".to_string(),
            None,
            ProviderKind::OpenAi,
            None,
        );
        assert!(!service.has_credential());

        let text = service.generate_encouragement("أحمد", "حفظ سورة الملك").await;
        assert_eq!(text, FALLBACK_ENCOURAGEMENT);
    }

    #[tokio::test]
    async fn test_unreachable_provider_falls_back() {
        // Points at a closed local port so the request fails fast.
        let service = EncouragementService::new(
            "sk-test".to_string(),
            Some("http://127.0.0.1:1".to_string()),
            ProviderKind::OpenAi,
            None,
        );
        assert!(service.has_credential());

        let text = service.generate_encouragement("أحمد", "حفظ سورة الملك").await;
        assert_eq!(text, FALLBACK_ENCOURAGEMENT);
    }

    #[test]
    fn test_provider_names() {
        let openai =
            EncouragementService::new("k".to_string(), None, ProviderKind::OpenAi, None);
        assert_eq!(openai.provider_name(), "OpenAI");

        let gemini =
            EncouragementService::new("k".to_string(), None, ProviderKind::Gemini, None);
        assert_eq!(gemini.provider_name(), "Gemini");
    }
}
