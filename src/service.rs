//! Request-scoped orchestration: quota gate, plan restriction, chat
//! persistence and provider dispatch, in that order. The gate runs before
//! anything touches a provider so an over-quota request costs zero external
//! calls.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::ai::catalog::{
    allowed_for_basic_plan, supports_vision, uses_completion_token_params, BASIC_PLAN_MODELS,
};
use crate::ai::dispatch::{
    AttachmentRef, DispatchError, Dispatcher, GenerationOptions, HistoryMessage,
};
use crate::content::{ContentKind, ReviewStatus};
use crate::db::{models, Database, NewAssistantMessage, NewAttachment, NewGeneratedContent};
use crate::plan::{
    feature_enabled, is_basic_plan, parse_quota_value, FEATURE_COLLAB_APPROVAL_FLOW,
    FEATURE_MONTHLY_MESSAGE_QUOTA,
};
use crate::quota::{self, QuotaStatus};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Structured quota signal; emitted before any provider call.
    #[error("🚫 Você atingiu o limite da sua cota mensal.")]
    QuotaExceeded { month_key: String },
    #[error("Modelo não disponível no plano Básico")]
    ModelNotAllowed,
    #[error("É necessário enviar uma mensagem ou anexos.")]
    EmptyRequest,
    #[error("{0} não encontrado")]
    NotFound(&'static str),
    #[error("Acesso negado")]
    AccessDenied,
    #[error("Recurso não disponível no seu plano")]
    FeatureNotAvailable,
    #[error("Apenas conteúdos de texto podem ser enviados para revisão")]
    NotReviewable,
    #[error("{0}")]
    InvalidContent(&'static str),
    #[error("transição de status inválida: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Models a Básico-plan user may pick, for the rejection payload.
    pub fn basic_plan_models() -> &'static [&'static str] {
        BASIC_PLAN_MODELS
    }
}

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub user_id: String,
    pub chat_id: Option<Uuid>,
    pub input: String,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    /// Already written to the upload dir by the transport layer.
    pub files: Vec<NewAttachment>,
}

#[derive(Debug, Clone)]
pub struct SendMessageResponse {
    pub chat: models::Chat,
    pub messages: Vec<models::ChatMessage>,
    pub generated_text: String,
    pub model_used: String,
    pub temperature: Option<f64>,
    pub uploaded_files: Vec<models::ChatAttachment>,
}

#[derive(Debug, Clone)]
pub struct CreateContentRequest {
    pub user_id: String,
    pub kind: ContentKind,
    pub prompt: String,
    pub model_used: Option<String>,
    pub content_data: Option<String>,
    pub temperature: Option<f64>,
    pub style: Option<String>,
    pub ratio: Option<String>,
    pub duration: Option<i32>,
}

/// Validate a creation request and shape it into a row. Each kind keeps only
/// its own fields; the others are stored as null.
fn build_content_record(
    req: &CreateContentRequest,
    default_model: &str,
) -> Result<NewGeneratedContent, ServiceError> {
    let prompt = req.prompt.trim();
    if prompt.is_empty() {
        return Err(ServiceError::InvalidContent("O prompt é obrigatório."));
    }
    let model_used = req
        .model_used
        .clone()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| default_model.to_string());

    let mut record = NewGeneratedContent {
        user_id: req.user_id.clone(),
        content_type: req.kind.as_str().to_string(),
        prompt: prompt.to_string(),
        model_used,
        content_data: req.content_data.clone(),
        file_path: None,
        temperature: None,
        style: None,
        ratio: None,
        duration: None,
    };

    match req.kind {
        ContentKind::Text => {
            if record
                .content_data
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .is_empty()
            {
                return Err(ServiceError::InvalidContent(
                    "Conteúdo de texto requer o corpo do texto.",
                ));
            }
            record.temperature = req.temperature;
        }
        ContentKind::Image => {
            record.style = req.style.clone();
            record.ratio = req.ratio.clone();
        }
        ContentKind::Video => {
            if matches!(req.duration, Some(d) if d <= 0) {
                return Err(ServiceError::InvalidContent("Duração inválida."));
            }
            record.duration = req.duration;
        }
    }
    Ok(record)
}

pub struct ChatService {
    pub db: Database,
    pub dispatcher: Arc<Dispatcher>,
    pub default_model: String,
}

impl ChatService {
    pub fn new(db: Database, dispatcher: Arc<Dispatcher>, default_model: String) -> Self {
        Self {
            db,
            dispatcher,
            default_model,
        }
    }

    // ── Quota ──────────────────────────────────────────────────────

    async fn monthly_quota(&self, user_id: &str) -> Result<i32, ServiceError> {
        let raw = self
            .db
            .feature_value_for_user(user_id, FEATURE_MONTHLY_MESSAGE_QUOTA)
            .await?;
        Ok(parse_quota_value(raw.as_deref(), 0))
    }

    pub async fn quota_status(&self, user_id: &str) -> Result<QuotaStatus, ServiceError> {
        self.db
            .get_user(user_id)
            .await?
            .ok_or(ServiceError::NotFound("Usuário"))?;

        let quota = self.monthly_quota(user_id).await?;
        let usage = self
            .db
            .get_or_create_usage(user_id, &quota::current_month_key())
            .await?;
        Ok(QuotaStatus::project(
            usage.month_key,
            usage.used_messages,
            quota,
        ))
    }

    // ── Generation ─────────────────────────────────────────────────

    pub async fn send_message(
        &self,
        req: SendMessageRequest,
    ) -> Result<SendMessageResponse, ServiceError> {
        if req.input.is_empty() && req.files.is_empty() {
            return Err(ServiceError::EmptyRequest);
        }

        self.db
            .get_user(&req.user_id)
            .await?
            .ok_or(ServiceError::NotFound("Usuário"))?;

        let model = req
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let temperature = req.temperature.unwrap_or(0.7);

        // Quota gate: must reject before any external provider call.
        let quota = self.monthly_quota(&req.user_id).await?;
        let usage = self
            .db
            .get_or_create_usage(&req.user_id, &quota::current_month_key())
            .await?;
        if quota::is_blocked(usage.used_messages, quota) {
            return Err(ServiceError::QuotaExceeded {
                month_key: usage.month_key,
            });
        }

        // Básico plan only gets the allow-listed models.
        if let Some(plan) = self.db.plan_of_user(&req.user_id).await? {
            if is_basic_plan(&plan.name) && !allowed_for_basic_plan(&model) {
                return Err(ServiceError::ModelNotAllowed);
            }
        }

        let chat = match req.chat_id {
            Some(chat_id) => self.db.get_chat(chat_id, &req.user_id).await?,
            None => None,
        };
        let chat = match chat {
            Some(chat) => chat,
            None => {
                let title = if req.input.is_empty() {
                    None
                } else {
                    self.dispatcher.suggest_title(&req.input).await
                };
                self.db
                    .create_chat(
                        &req.user_id,
                        title.as_deref().unwrap_or("Novo Chat"),
                        supports_vision(&model),
                    )
                    .await?
            }
        };

        let user_msg = self.db.save_user_message(chat.id, &req.input).await?;
        tracing::info!(
            "chat {} - mensagem do usuário salva ({})",
            chat.id,
            user_msg.id
        );

        let mut uploaded_files = Vec::new();
        for file in &req.files {
            match self.db.add_attachment(user_msg.id, file).await {
                Ok(att) => uploaded_files.push(att),
                Err(e) => tracing::warn!("falha ao salvar attachment {}: {}", file.name, e),
            }
        }

        let history = self.load_history(chat.id).await?;
        let result = self
            .dispatcher
            .generate(
                &model,
                &history,
                &GenerationOptions {
                    temperature,
                    user_input: req.input.clone(),
                },
            )
            .await?;

        // Image turns store empty text; the attachments carry the payload.
        let safe_text = if result.images.is_empty() {
            result.text.clone()
        } else {
            String::new()
        };
        let stored_temperature = if uses_completion_token_params(&model) {
            None
        } else {
            Some(temperature)
        };

        let ai_msg = self
            .db
            .save_assistant_message(
                chat.id,
                &NewAssistantMessage {
                    content: safe_text.clone(),
                    model_used: result.model_used.clone(),
                    temperature: stored_temperature,
                    max_tokens: None,
                    prompt_tokens: result.usage.prompt_tokens,
                    completion_tokens: result.usage.completion_tokens,
                    total_tokens: result.usage.total_tokens,
                },
            )
            .await?;

        let mut all_uploaded = uploaded_files;
        for img in &result.images {
            let size_bytes = tokio::fs::metadata(&img.path)
                .await
                .ok()
                .map(|m| m.len() as i64);
            let att = NewAttachment {
                name: img.name.clone(),
                path: img.path.clone(),
                mimetype: "image/png".to_string(),
                size_bytes,
            };
            match self.db.add_attachment(ai_msg.id, &att).await {
                Ok(saved) => all_uploaded.push(saved),
                Err(e) => tracing::warn!("falha ao salvar attachment de IA {}: {}", img.name, e),
            }

            let record = NewGeneratedContent {
                user_id: req.user_id.clone(),
                content_type: ContentKind::Image.as_str().to_string(),
                prompt: req.input.clone(),
                model_used: result.model_used.clone(),
                content_data: None,
                file_path: Some(img.path.clone()),
                temperature: None,
                style: None,
                ratio: None,
                duration: None,
            };
            if let Err(e) = self.db.insert_content(&record).await {
                tracing::warn!("falha ao registrar conteúdo gerado: {}", e);
            }
        }

        // The billable unit is the exchange, counted once the assistant turn
        // is persisted.
        self.db.increment_usage(usage.id, 1).await?;

        let messages = self.db.get_messages(chat.id).await?;
        Ok(SendMessageResponse {
            chat,
            messages,
            generated_text: safe_text,
            model_used: result.model_used,
            temperature: stored_temperature,
            uploaded_files: all_uploaded,
        })
    }

    async fn load_history(&self, chat_id: Uuid) -> Result<Vec<HistoryMessage>, ServiceError> {
        let messages = self.db.get_messages(chat_id).await?;
        let attachments = self.db.attachments_for_chat(chat_id).await?;

        let mut by_message: HashMap<Uuid, Vec<AttachmentRef>> = HashMap::new();
        for att in attachments {
            by_message.entry(att.message_id).or_default().push(AttachmentRef {
                name: att.name,
                path: att.path,
                mimetype: att.mimetype,
            });
        }

        Ok(messages
            .into_iter()
            .map(|m| HistoryMessage {
                attachments: by_message.remove(&m.id).unwrap_or_default(),
                role: m.role,
                content: m.content,
            })
            .collect())
    }

    // ── Generated content ──────────────────────────────────────────

    /// Create a content record directly (text drafts for the review flow,
    /// image/video metadata). Images produced during chat land through
    /// `send_message` instead.
    pub async fn create_content(
        &self,
        req: CreateContentRequest,
    ) -> Result<models::GeneratedContent, ServiceError> {
        self.db
            .get_user(&req.user_id)
            .await?
            .ok_or(ServiceError::NotFound("Usuário"))?;
        let record = build_content_record(&req, &self.default_model)?;
        Ok(self.db.insert_content(&record).await?)
    }

    // ── Review workflow ────────────────────────────────────────────

    /// Everything currently awaiting review. Same gate as approve/reject:
    /// admin role plus the approval-flow feature.
    pub async fn review_inbox(
        &self,
        reviewer_id: &str,
    ) -> Result<Vec<models::GeneratedContent>, ServiceError> {
        let reviewer = self
            .db
            .get_user(reviewer_id)
            .await?
            .ok_or(ServiceError::NotFound("Usuário"))?;
        if reviewer.role.to_lowercase() != "admin" {
            return Err(ServiceError::AccessDenied);
        }
        let flag = self
            .db
            .feature_value_for_user(reviewer_id, FEATURE_COLLAB_APPROVAL_FLOW)
            .await?;
        if !feature_enabled(flag.as_deref()) {
            return Err(ServiceError::FeatureNotAvailable);
        }
        Ok(self
            .db
            .list_contents_by_status(ReviewStatus::InReview)
            .await?)
    }

    pub async fn submit_for_review(
        &self,
        content_id: Uuid,
        user_id: &str,
    ) -> Result<models::GeneratedContent, ServiceError> {
        self.db
            .get_user(user_id)
            .await?
            .ok_or(ServiceError::NotFound("Usuário"))?;
        let content = self
            .db
            .get_content(content_id)
            .await?
            .ok_or(ServiceError::NotFound("Conteúdo"))?;
        if content.user_id != user_id {
            return Err(ServiceError::AccessDenied);
        }
        // Review is text-only for now.
        if ContentKind::parse(&content.content_type) != Some(ContentKind::Text) {
            return Err(ServiceError::NotReviewable);
        }

        let from = ReviewStatus::parse(&content.status).unwrap_or(ReviewStatus::Draft);
        if !from.can_transition(ReviewStatus::InReview) {
            return Err(ServiceError::InvalidTransition {
                from: content.status,
                to: ReviewStatus::InReview.to_string(),
            });
        }

        let flag = self
            .db
            .feature_value_for_user(user_id, FEATURE_COLLAB_APPROVAL_FLOW)
            .await?;
        if !feature_enabled(flag.as_deref()) {
            return Err(ServiceError::FeatureNotAvailable);
        }

        Ok(self
            .db
            .set_review_status(content_id, ReviewStatus::InReview, user_id)
            .await?)
    }

    /// Approve or reject content that is in review. Reviewers must be admins
    /// whose plan carries the approval-flow feature.
    pub async fn review_content(
        &self,
        content_id: Uuid,
        reviewer_id: &str,
        approve: bool,
    ) -> Result<models::GeneratedContent, ServiceError> {
        let reviewer = self
            .db
            .get_user(reviewer_id)
            .await?
            .ok_or(ServiceError::NotFound("Usuário"))?;
        let content = self
            .db
            .get_content(content_id)
            .await?
            .ok_or(ServiceError::NotFound("Conteúdo"))?;

        if reviewer.role.to_lowercase() != "admin" {
            return Err(ServiceError::AccessDenied);
        }
        let flag = self
            .db
            .feature_value_for_user(reviewer_id, FEATURE_COLLAB_APPROVAL_FLOW)
            .await?;
        if !feature_enabled(flag.as_deref()) {
            return Err(ServiceError::FeatureNotAvailable);
        }

        let to = if approve {
            ReviewStatus::Approved
        } else {
            ReviewStatus::Rejected
        };
        let from = ReviewStatus::parse(&content.status).unwrap_or(ReviewStatus::Draft);
        if !from.can_transition(to) {
            return Err(ServiceError::InvalidTransition {
                from: content.status,
                to: to.to_string(),
            });
        }

        Ok(self.db.set_review_status(content_id, to, reviewer_id).await?)
    }
}
