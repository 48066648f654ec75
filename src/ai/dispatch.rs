//! Provider dispatcher: routes a generation request to the right provider
//! family, executes it with bounded retry and fallback chains, and normalizes
//! the response.
//!
//! Provider failures never bubble up as errors. Once the user's message is
//! persisted, the worst outcome is an assistant turn carrying a sentinel
//! string; only a missing API key aborts the request.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::catalog::{
    accepts_system_message, classify, fallback_chain, resolve_gemini_model,
    supports_image_generation, supports_vision, uses_completion_token_params, ProviderFamily,
};
use super::credentials::CredentialSource;
use crate::config::AppConfig;

/// Assistant turn text when a provider answered but produced nothing usable.
pub const NO_CONTENT: &str = "[Sem retorno]";
/// Assistant turn text when the provider call itself failed.
pub const GENERATION_FAILED: &str = "[Erro ao gerar resposta da IA]";
/// Appended to the text when image generation was blocked by moderation.
pub const MODERATION_WARNING: &str =
    "\n⚠️ A imagem não pôde ser gerada porque os termos utilizados não passaram pelo sistema de segurança.";

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("chave de API ausente para o provedor {0}")]
    MissingApiKey(ProviderFamily),
}

/// One turn of shared conversation history, provider-agnostic.
#[derive(Debug, Clone)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
    pub attachments: Vec<AttachmentRef>,
}

#[derive(Debug, Clone)]
pub struct AttachmentRef {
    pub name: String,
    pub path: String,
    pub mimetype: String,
}

/// Token accounting normalized across providers. Anthropic's input/output
/// naming maps onto prompt/completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: Option<i32>,
    pub completion_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub name: String,
    pub path: String,
}

/// Why the secondary image-generation call failed, when it did. The
/// user-visible message is already folded into the result text; this carries
/// the structured reason alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageFailure {
    ModerationBlocked,
    Other(String),
}

#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub text: String,
    /// Model that actually produced the response; differs from the requested
    /// one when a fallback chain advanced.
    pub model_used: String,
    pub usage: TokenUsage,
    pub images: Vec<GeneratedImage>,
    pub image_failure: Option<ImageFailure>,
}

#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub temperature: f64,
    /// Last user input, used as the prompt for the image-generation call.
    pub user_input: String,
}

/// Base URLs per provider, overridable for tests.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub openai: String,
    pub openrouter: String,
    pub anthropic: String,
    pub perplexity: String,
    pub gemini: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            openai: "https://api.openai.com".to_string(),
            openrouter: "https://openrouter.ai/api".to_string(),
            anthropic: "https://api.anthropic.com".to_string(),
            perplexity: "https://api.perplexity.ai".to_string(),
            gemini: "https://generativelanguage.googleapis.com".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub max_retries: u32,
    pub backoff: Duration,
    pub timeout: Duration,
    pub upload_dir: PathBuf,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff: Duration::from_secs(3),
            timeout: Duration::from_secs(120),
            upload_dir: PathBuf::from("./data/uploads"),
        }
    }
}

impl From<&AppConfig> for DispatcherConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            backoff: Duration::from_secs(config.retry_backoff_secs),
            timeout: Duration::from_secs(config.request_timeout_secs),
            upload_dir: PathBuf::from(&config.upload_dir),
        }
    }
}

/// The one provider client of the process. Constructed at startup and passed
/// by reference into request handlers; credentials are resolved through the
/// injected source on every call.
pub struct Dispatcher {
    client: Client,
    credentials: Arc<dyn CredentialSource>,
    endpoints: ProviderEndpoints,
    cfg: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(credentials: Arc<dyn CredentialSource>, cfg: DispatcherConfig) -> Self {
        let client = Client::builder()
            .timeout(cfg.timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            credentials,
            endpoints: ProviderEndpoints::default(),
            cfg,
        }
    }

    pub fn with_endpoints(mut self, endpoints: ProviderEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Route a conversation to the provider family of `model` and return the
    /// normalized result.
    pub async fn generate(
        &self,
        model: &str,
        history: &[HistoryMessage],
        opts: &GenerationOptions,
    ) -> Result<GenerationResult, DispatchError> {
        let family = classify(model);
        tracing::info!("dispatching model {} to {}", model, family);
        match family {
            ProviderFamily::Gemini => self.generate_gemini(model, history).await,
            ProviderFamily::OpenRouter => self.generate_openrouter(model, history, opts).await,
            ProviderFamily::Anthropic => self.generate_anthropic(model, history, opts).await,
            ProviderFamily::Perplexity => self.generate_perplexity(model, history, opts).await,
            ProviderFamily::OpenAi => self.generate_openai(model, history, opts).await,
        }
    }

    fn api_key(&self, family: ProviderFamily) -> Result<String, DispatchError> {
        self.credentials
            .api_key(family)
            .ok_or(DispatchError::MissingApiKey(family))
    }

    /// POST with bounded retry on 429. The delay grows linearly per attempt;
    /// the last response is returned as-is so callers see the final status.
    async fn post_with_retry(
        &self,
        url: &str,
        headers: &[(&str, String)],
        body: &Value,
    ) -> reqwest::Result<reqwest::Response> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let mut req = self.client.post(url).json(body);
            for (name, value) in headers {
                req = req.header(*name, value);
            }
            let resp = req.send().await?;
            if resp.status() == StatusCode::TOO_MANY_REQUESTS && attempt < self.cfg.max_retries {
                tracing::warn!(
                    "429 from {}, nova tentativa {}/{}",
                    url,
                    attempt,
                    self.cfg.max_retries
                );
                tokio::time::sleep(self.cfg.backoff * attempt).await;
                continue;
            }
            return Ok(resp);
        }
    }

    fn failure_result(&self, model: &str) -> GenerationResult {
        GenerationResult {
            text: GENERATION_FAILED.to_string(),
            model_used: model.to_string(),
            usage: TokenUsage::default(),
            images: Vec::new(),
            image_failure: None,
        }
    }

    // ── OpenAI-compatible providers ────────────────────────────────

    async fn generate_openai(
        &self,
        model: &str,
        history: &[HistoryMessage],
        opts: &GenerationOptions,
    ) -> Result<GenerationResult, DispatchError> {
        let key = self.api_key(ProviderFamily::OpenAi)?;
        let url = format!("{}/v1/chat/completions", self.endpoints.openai);

        let mut body = json!({
            "model": model,
            "messages": build_openai_messages(history, model).await,
        });
        if !uses_completion_token_params(model) {
            body["temperature"] = json!(opts.temperature);
        }

        let headers = [("Authorization", format!("Bearer {key}"))];
        let mut result = match self.post_with_retry(&url, &headers, &body).await {
            Ok(resp) => parse_chat_completion(resp, model).await,
            Err(e) => {
                tracing::error!("falha na chamada OpenAI: {}", e);
                self.failure_result(model)
            }
        };

        if supports_image_generation(model) {
            self.try_generate_images(&key, model, &opts.user_input, &mut result)
                .await;
        }

        Ok(result)
    }

    async fn generate_openrouter(
        &self,
        model: &str,
        history: &[HistoryMessage],
        opts: &GenerationOptions,
    ) -> Result<GenerationResult, DispatchError> {
        let key = self.api_key(ProviderFamily::OpenRouter)?;
        let url = format!("{}/v1/chat/completions", self.endpoints.openrouter);

        let body = json!({
            "model": model,
            "messages": build_openai_messages(history, model).await,
            "temperature": opts.temperature,
        });

        let headers = [("Authorization", format!("Bearer {key}"))];
        let result = match self.post_with_retry(&url, &headers, &body).await {
            Ok(resp) => parse_chat_completion(resp, model).await,
            Err(e) => {
                tracing::error!("falha na chamada OpenRouter: {}", e);
                self.failure_result(model)
            }
        };
        Ok(result)
    }

    async fn generate_perplexity(
        &self,
        model: &str,
        history: &[HistoryMessage],
        opts: &GenerationOptions,
    ) -> Result<GenerationResult, DispatchError> {
        let key = self.api_key(ProviderFamily::Perplexity)?;
        let url = format!("{}/chat/completions", self.endpoints.perplexity);
        let headers = [("Authorization", format!("Bearer {key}"))];

        let chain = fallback_chain(model);
        let last = chain.len() - 1;
        for (i, mid) in chain.iter().enumerate() {
            let body = json!({
                "model": mid,
                "messages": build_openai_messages(history, mid).await,
                "temperature": opts.temperature,
                "return_citations": true,
            });

            let resp = match self.post_with_retry(&url, &headers, &body).await {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::error!("falha na chamada Perplexity ({}): {}", mid, e);
                    if i == last {
                        return Ok(self.failure_result(model));
                    }
                    continue;
                }
            };

            let status = resp.status();
            if status.is_success() {
                let mut result = parse_chat_completion(resp, mid).await;
                if result.text.is_empty() {
                    result.text = NO_CONTENT.to_string();
                }
                return Ok(result);
            }

            let err_text = resp.text().await.unwrap_or_default();
            tracing::error!("Perplexity {} ({}): {}", status.as_u16(), mid, err_text);
            if i == last {
                return Ok(GenerationResult {
                    text: format!("[Erro Perplexity {}: {}]", status.as_u16(), err_text),
                    model_used: mid.clone(),
                    usage: TokenUsage::default(),
                    images: Vec::new(),
                    image_failure: None,
                });
            }
        }
        Ok(self.failure_result(model))
    }

    // ── Anthropic ──────────────────────────────────────────────────

    async fn generate_anthropic(
        &self,
        model: &str,
        history: &[HistoryMessage],
        opts: &GenerationOptions,
    ) -> Result<GenerationResult, DispatchError> {
        let key = self.api_key(ProviderFamily::Anthropic)?;
        let url = format!("{}/v1/messages", self.endpoints.anthropic);
        let headers = [
            ("x-api-key", key),
            ("anthropic-version", ANTHROPIC_VERSION.to_string()),
        ];
        let messages = build_anthropic_messages(history);

        let chain = fallback_chain(model);
        let last = chain.len() - 1;
        for (i, mid) in chain.iter().enumerate() {
            let body = json!({
                "model": mid,
                "max_tokens": 1024,
                "temperature": opts.temperature,
                "system": system_message_text(mid),
                "messages": messages,
            });

            let resp = match self.post_with_retry(&url, &headers, &body).await {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::error!("falha na chamada Anthropic ({}): {}", mid, e);
                    if i == last {
                        return Ok(self.failure_result(model));
                    }
                    continue;
                }
            };

            let status = resp.status();
            let data: Option<Value> = resp.json().await.ok();

            if status.is_success() {
                if let Some(data) = &data {
                    let text = extract_anthropic_text(data);
                    if !text.is_empty() {
                        return Ok(GenerationResult {
                            text,
                            model_used: mid.clone(),
                            usage: anthropic_usage(data),
                            images: Vec::new(),
                            image_failure: None,
                        });
                    }
                }
                tracing::warn!("Anthropic sem texto (model={})", mid);
                if i == last {
                    return Ok(GenerationResult {
                        text: NO_CONTENT.to_string(),
                        model_used: mid.clone(),
                        usage: TokenUsage::default(),
                        images: Vec::new(),
                        image_failure: None,
                    });
                }
            } else {
                let err_msg = data
                    .as_ref()
                    .and_then(|d| d.get("error"))
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                tracing::error!("Anthropic {} ({}): {}", status.as_u16(), mid, err_msg);
                if i == last {
                    return Ok(GenerationResult {
                        text: format!("[Erro Anthropic {}: {}]", status.as_u16(), err_msg),
                        model_used: mid.clone(),
                        usage: TokenUsage::default(),
                        images: Vec::new(),
                        image_failure: None,
                    });
                }
            }
        }
        Ok(self.failure_result(model))
    }

    // ── Gemini ─────────────────────────────────────────────────────

    async fn generate_gemini(
        &self,
        model: &str,
        history: &[HistoryMessage],
    ) -> Result<GenerationResult, DispatchError> {
        let key = self.api_key(ProviderFamily::Gemini)?;
        // Models without quota on the current key map onto 2.5-flash.
        let gm = resolve_gemini_model(model).to_string();
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoints.gemini, gm
        );
        let body = json!({ "contents": build_gemini_contents(history).await });

        // Gemini signals overload as 503 besides the usual 429; both retry.
        let mut attempt: u32 = 0;
        let resp = loop {
            attempt += 1;
            let send = self
                .client
                .post(&url)
                .header("x-goog-api-key", &key)
                .json(&body)
                .send()
                .await;
            match send {
                Ok(resp)
                    if (resp.status() == StatusCode::TOO_MANY_REQUESTS
                        || resp.status() == StatusCode::SERVICE_UNAVAILABLE)
                        && attempt < self.cfg.max_retries =>
                {
                    tracing::warn!(
                        "Gemini ocupado ({}), retry {}/{}",
                        resp.status().as_u16(),
                        attempt,
                        self.cfg.max_retries
                    );
                    tokio::time::sleep(self.cfg.backoff).await;
                }
                Ok(resp) => break resp,
                Err(e) => {
                    tracing::error!("Gemini erro geral: {}", e);
                    return Ok(self.failure_result(&gm));
                }
            }
        };

        if !resp.status().is_success() {
            tracing::error!("Gemini erro geral: HTTP {}", resp.status().as_u16());
            return Ok(self.failure_result(&gm));
        }

        let parsed: GeminiResponse = match resp.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::error!("resposta Gemini inválida: {}", e);
                return Ok(self.failure_result(&gm));
            }
        };

        let mut text: Option<String> = None;
        let mut images = Vec::new();
        for cand in &parsed.candidates {
            let Some(content) = &cand.content else { continue };
            for part in &content.parts {
                if let Some(t) = &part.text {
                    text = Some(t.clone());
                } else if let Some(inline) = &part.inline_data {
                    if let Some(img) = self.save_inline_image(&inline.data).await {
                        images.push(img);
                    }
                }
            }
        }

        let usage = parsed
            .usage_metadata
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
            })
            .unwrap_or_default();

        // Image turns carry no text; pure-text turns with nothing usable get
        // the sentinel.
        let text = if images.is_empty() {
            text.filter(|t| !t.is_empty())
                .unwrap_or_else(|| NO_CONTENT.to_string())
        } else {
            String::new()
        };

        Ok(GenerationResult {
            text,
            model_used: gm,
            usage,
            images,
            image_failure: None,
        })
    }

    async fn save_inline_image(&self, data_b64: &str) -> Option<GeneratedImage> {
        let bytes = BASE64.decode(data_b64.as_bytes()).ok()?;
        let name = format!("gemini_{}.png", Uuid::new_v4().simple());
        let path = self.cfg.upload_dir.join(&name);
        if let Err(e) = tokio::fs::write(&path, &bytes).await {
            tracing::warn!("falha ao salvar imagem Gemini: {}", e);
            return None;
        }
        Some(GeneratedImage {
            name,
            path: path.to_string_lossy().into_owned(),
        })
    }

    // ── Image generation (OpenAI responses API) ────────────────────

    /// Secondary, independently gated call. Failures degrade to a warning on
    /// the text result instead of failing the request.
    async fn try_generate_images(
        &self,
        key: &str,
        model: &str,
        user_input: &str,
        result: &mut GenerationResult,
    ) {
        let url = format!("{}/v1/responses", self.endpoints.openai);
        let body = json!({
            "model": model,
            "input": [{"role": "user", "content": user_input}],
            "tools": [{"type": "image_generation"}],
        });

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {key}"))
            .json(&body)
            .send()
            .await;

        let resp = match resp {
            Ok(resp) => resp,
            Err(e) => {
                self.note_image_failure(e.to_string(), result);
                return;
            }
        };

        if !resp.status().is_success() {
            let reason = resp.text().await.unwrap_or_default();
            self.note_image_failure(reason, result);
            return;
        }

        let parsed: OpenAiResponsesOutput = match resp.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                self.note_image_failure(e.to_string(), result);
                return;
            }
        };

        for item in parsed.output {
            if item.kind != "image_generation_call" {
                continue;
            }
            let Some(b64) = item.result else { continue };
            let Ok(bytes) = BASE64.decode(b64.as_bytes()) else {
                continue;
            };
            let name = format!("ai_image_{}.png", Uuid::new_v4().simple());
            let path = self.cfg.upload_dir.join(&name);
            match tokio::fs::write(&path, &bytes).await {
                Ok(()) => {
                    tracing::info!("IA gerou imagem {}", name);
                    result.images.push(GeneratedImage {
                        name,
                        path: path.to_string_lossy().into_owned(),
                    });
                }
                Err(e) => tracing::warn!("falha ao salvar imagem gerada: {}", e),
            }
        }
    }

    fn note_image_failure(&self, reason: String, result: &mut GenerationResult) {
        if reason.contains("moderation_blocked") {
            tracing::warn!("geração de imagem bloqueada pela moderação");
            result.text.push_str(MODERATION_WARNING);
            result.image_failure = Some(ImageFailure::ModerationBlocked);
        } else {
            tracing::warn!("falha ao gerar imagem: {}", reason);
            result.image_failure = Some(ImageFailure::Other(reason));
        }
    }

    // ── Chat titles ────────────────────────────────────────────────

    /// Short chat title from the first user message; any failure falls back
    /// to the caller's default.
    pub async fn suggest_title(&self, user_input: &str) -> Option<String> {
        let key = self.credentials.api_key(ProviderFamily::OpenAi)?;
        let url = format!("{}/v1/chat/completions", self.endpoints.openai);
        let snippet: String = user_input.chars().take(1000).collect();
        let body = json!({
            "model": "gpt-3.5-turbo",
            "messages": [{
                "role": "user",
                "content": format!("Crie um título curto (menos de 5 palavras) sem aspas para: {snippet}"),
            }],
            "max_tokens": 12,
            "temperature": 0.5,
        });

        let resp = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(10))
            .header("Authorization", format!("Bearer {key}"))
            .json(&body)
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let parsed: ChatCompletion = resp.json().await.ok()?;
        let title = parsed
            .choices
            .into_iter()
            .next()?
            .message
            .content?
            .trim()
            .to_string();
        (!title.is_empty()).then_some(title)
    }
}

// ── Wire formats ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiUsage {
    prompt_tokens: Option<i32>,
    completion_tokens: Option<i32>,
    total_tokens: Option<i32>,
}

impl From<ApiUsage> for TokenUsage {
    fn from(u: ApiUsage) -> Self {
        Self {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
    #[serde(rename = "inlineData")]
    inline_data: Option<GeminiInlineData>,
}

#[derive(Debug, Deserialize)]
struct GeminiInlineData {
    data: String,
}

#[derive(Debug, Deserialize)]
struct GeminiUsage {
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: Option<i32>,
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: Option<i32>,
    #[serde(rename = "totalTokenCount")]
    total_token_count: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponsesOutput {
    #[serde(default)]
    output: Vec<ResponsesOutputItem>,
}

#[derive(Debug, Deserialize)]
struct ResponsesOutputItem {
    #[serde(rename = "type")]
    kind: String,
    result: Option<String>,
}

/// Parse an OpenAI-dialect chat completion; anything malformed or empty
/// becomes the failure sentinel.
async fn parse_chat_completion(resp: reqwest::Response, model: &str) -> GenerationResult {
    match resp.json::<ChatCompletion>().await {
        Ok(parsed) => {
            let usage = parsed.usage.map(TokenUsage::from).unwrap_or_default();
            let text = parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content);
            match text {
                Some(text) => GenerationResult {
                    text,
                    model_used: model.to_string(),
                    usage,
                    images: Vec::new(),
                    image_failure: None,
                },
                None => GenerationResult {
                    text: GENERATION_FAILED.to_string(),
                    model_used: model.to_string(),
                    usage: TokenUsage::default(),
                    images: Vec::new(),
                    image_failure: None,
                },
            }
        }
        Err(e) => {
            tracing::warn!("resposta do provedor não é JSON esperado: {}", e);
            GenerationResult {
                text: GENERATION_FAILED.to_string(),
                model_used: model.to_string(),
                usage: TokenUsage::default(),
                images: Vec::new(),
                image_failure: None,
            }
        }
    }
}

/// System prompt advertising what the current model can do.
fn system_message_text(model: &str) -> String {
    if supports_image_generation(model) {
        format!(
            "Você é uma IA de chat da plataforma Artificiall.\n\
             📌 Funções disponíveis:\n\
             - Geração de texto: todos os modelos.\n\
             - Geração de imagens: apenas modelos GPT.\n\
             ⚠️ Importante:\n\
             - O Modelo atual PERMITE GERAR: {model}\n\
             - Você pode gerar imagens quando o usuário pedir.\n\
             - Não gere imagens automaticamente se o usuário não pediu.\n\
             - Sempre use o modelo atual para decidir o que é possível."
        )
    } else {
        "Você é uma IA de chat da plataforma Artificiall.\n\
         📌 Funções disponíveis:\n\
         - Geração de texto: todos os modelos.\n\
         - Geração de imagens: **não disponível** neste modelo.\n\
         - Se o usuário pedir para gerar imagens, responda educadamente que o modelo atual selecionado não suporta."
            .to_string()
    }
}

fn data_url(mimetype: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mimetype, BASE64.encode(bytes))
}

/// Build the messages array for OpenAI-dialect providers. Attachments are
/// inlined as base64 only for vision-capable models; otherwise their names
/// are folded into the text.
async fn build_openai_messages(history: &[HistoryMessage], model: &str) -> Vec<Value> {
    let mut messages = Vec::new();
    if accepts_system_message(model) {
        messages.push(json!({"role": "system", "content": system_message_text(model)}));
    }

    let vision = supports_vision(model);
    for m in history {
        if m.attachments.is_empty() {
            messages.push(json!({"role": m.role, "content": m.content}));
            continue;
        }

        if vision {
            let mut parts = Vec::new();
            if !m.content.trim().is_empty() {
                parts.push(json!({"type": "text", "text": m.content}));
            }
            let mut non_images = Vec::new();

            for att in &m.attachments {
                if att.mimetype.starts_with("image/") {
                    // Generated images from earlier assistant turns are not
                    // re-uploaded.
                    if m.role == "assistant" {
                        continue;
                    }
                    match tokio::fs::read(&att.path).await {
                        Ok(bytes) => parts.push(json!({
                            "type": "image_url",
                            "image_url": {"url": data_url(&att.mimetype, &bytes)},
                        })),
                        Err(_) => non_images.push(att.name.clone()),
                    }
                } else if att.mimetype == "application/pdf" {
                    match tokio::fs::read(&att.path).await {
                        Ok(bytes) => parts.push(json!({
                            "type": "file",
                            "file": {
                                "filename": att.name,
                                "file_data": data_url(&att.mimetype, &bytes),
                            },
                        })),
                        Err(_) => non_images.push(att.name.clone()),
                    }
                } else {
                    non_images.push(att.name.clone());
                }
            }

            if !non_images.is_empty() {
                parts.push(json!({
                    "type": "text",
                    "text": format!("Arquivos anexados (não-imagem): {}", non_images.join(", ")),
                }));
            }
            messages.push(json!({"role": m.role, "content": parts}));
        } else {
            let names = m
                .attachments
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            let merged = if m.content.is_empty() {
                format!("[Anexos]: {names}")
            } else {
                format!("{}\n\n[Anexos]: {}", m.content, names)
            };
            messages.push(json!({"role": m.role, "content": merged}));
        }
    }
    messages
}

/// Anthropic takes text-only blocks; turns without text are dropped.
fn build_anthropic_messages(history: &[HistoryMessage]) -> Vec<Value> {
    history
        .iter()
        .filter(|m| !m.content.is_empty())
        .map(|m| {
            json!({
                "role": m.role,
                "content": [{"type": "text", "text": m.content}],
            })
        })
        .collect()
}

/// Gemini gets the whole history flattened into one user turn, with image
/// and PDF attachments inlined.
async fn build_gemini_contents(history: &[HistoryMessage]) -> Value {
    let mut parts = Vec::new();
    for m in history {
        if !m.content.is_empty() {
            parts.push(json!({"text": m.content}));
        }
        for att in &m.attachments {
            if att.mimetype.starts_with("image/") || att.mimetype == "application/pdf" {
                match tokio::fs::read(&att.path).await {
                    Ok(bytes) => parts.push(json!({
                        "inline_data": {
                            "mime_type": att.mimetype,
                            "data": BASE64.encode(&bytes),
                        },
                    })),
                    Err(_) => {
                        parts.push(json!({"text": format!("[Anexo não suportado: {}]", att.name)}))
                    }
                }
            } else {
                parts.push(json!({"text": format!("[Anexo não suportado: {}]", att.name)}));
            }
        }
    }
    json!([{"role": "user", "parts": parts}])
}

fn extract_anthropic_text(data: &Value) -> String {
    let blocks = data
        .get("content")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let texts: Vec<&str> = blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .filter(|t| !t.is_empty())
        .collect();
    if !texts.is_empty() {
        return texts.join("\n");
    }
    // Fallback for responses without a typed text block.
    blocks
        .first()
        .and_then(|b| b.get("text"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Anthropic reports input/output tokens; fold them into the shared fields.
fn anthropic_usage(data: &Value) -> TokenUsage {
    let usage = data.get("usage");
    let input = usage
        .and_then(|u| u.get("input_tokens"))
        .and_then(Value::as_i64)
        .map(|v| v as i32);
    let output = usage
        .and_then(|u| u.get("output_tokens"))
        .and_then(Value::as_i64)
        .map(|v| v as i32);
    let total = match (input, output) {
        (None, None) => None,
        (i, o) => Some(i.unwrap_or(0) + o.unwrap_or(0)),
    };
    TokenUsage {
        prompt_tokens: input,
        completion_tokens: output,
        total_tokens: total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: &str, content: &str) -> HistoryMessage {
        HistoryMessage {
            role: role.to_string(),
            content: content.to_string(),
            attachments: Vec::new(),
        }
    }

    #[tokio::test]
    async fn openai_messages_start_with_system_prompt() {
        let history = vec![msg("user", "olá")];
        let messages = build_openai_messages(&history, "gpt-4o").await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], "olá");
    }

    #[tokio::test]
    async fn o1_mini_gets_no_system_message() {
        let history = vec![msg("user", "olá")];
        let messages = build_openai_messages(&history, "o1-mini").await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
    }

    #[tokio::test]
    async fn attachments_fold_into_text_without_vision() {
        let history = vec![HistoryMessage {
            role: "user".to_string(),
            content: "veja isto".to_string(),
            attachments: vec![AttachmentRef {
                name: "planilha.xlsx".to_string(),
                path: "/nonexistent".to_string(),
                mimetype: "application/vnd.ms-excel".to_string(),
            }],
        }];
        let messages = build_openai_messages(&history, "sonar").await;
        let content = messages[1]["content"].as_str().unwrap();
        assert!(content.contains("veja isto"));
        assert!(content.contains("[Anexos]: planilha.xlsx"));
    }

    #[tokio::test]
    async fn unreadable_attachment_becomes_notice_for_vision_models() {
        let history = vec![HistoryMessage {
            role: "user".to_string(),
            content: "".to_string(),
            attachments: vec![AttachmentRef {
                name: "foto.png".to_string(),
                path: "/nonexistent/foto.png".to_string(),
                mimetype: "image/png".to_string(),
            }],
        }];
        let messages = build_openai_messages(&history, "gpt-4o").await;
        let parts = messages[1]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 1);
        assert!(parts[0]["text"].as_str().unwrap().contains("foto.png"));
    }

    #[test]
    fn anthropic_messages_drop_empty_turns() {
        let history = vec![msg("user", "oi"), msg("assistant", ""), msg("user", "tudo bem?")];
        let messages = build_anthropic_messages(&history);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["content"][0]["text"], "oi");
        assert_eq!(messages[1]["content"][0]["text"], "tudo bem?");
    }

    #[test]
    fn anthropic_usage_maps_input_output_to_prompt_completion() {
        let data = json!({"usage": {"input_tokens": 12, "output_tokens": 6}});
        let usage = anthropic_usage(&data);
        assert_eq!(usage.prompt_tokens, Some(12));
        assert_eq!(usage.completion_tokens, Some(6));
        assert_eq!(usage.total_tokens, Some(18));

        let partial = json!({"usage": {"output_tokens": 6}});
        let usage = anthropic_usage(&partial);
        assert_eq!(usage.prompt_tokens, None);
        assert_eq!(usage.total_tokens, Some(6));

        assert_eq!(anthropic_usage(&json!({})), TokenUsage::default());
    }

    #[test]
    fn anthropic_text_extraction_joins_blocks() {
        let data = json!({"content": [
            {"type": "text", "text": "primeira"},
            {"type": "tool_use", "id": "x"},
            {"type": "text", "text": "segunda"}
        ]});
        assert_eq!(extract_anthropic_text(&data), "primeira\nsegunda");

        let untyped = json!({"content": [{"text": "solta"}]});
        assert_eq!(extract_anthropic_text(&untyped), "solta");

        assert_eq!(extract_anthropic_text(&json!({})), "");
    }
}
