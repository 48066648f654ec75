//! HTTP surface. Thin axum handlers over [`ChatService`]; identity comes
//! from the `X-User-Id` header set by the auth proxy in front of us.

use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::content::ContentKind;
use crate::db::NewAttachment;
use crate::service::{ChatService, CreateContentRequest, SendMessageRequest, ServiceError};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ChatService>,
    pub upload_dir: PathBuf,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/generate-text", post(generate_text))
        .route("/api/chats", get(list_chats))
        .route("/api/chats/quota-status", get(quota_status))
        .route(
            "/api/chats/{id}",
            get(get_chat).patch(update_chat).delete(delete_chat),
        )
        .route("/api/chats/{id}/archive", post(archive_chat))
        .route("/api/chats/{id}/unarchive", post(unarchive_chat))
        .route("/api/chats/attachments/{id}", get(download_attachment))
        .route("/api/projects", post(create_project))
        .route(
            "/api/projects/{id}/contents/{content_id}",
            post(link_content),
        )
        .route("/api/contents", get(list_contents).post(create_content))
        .route("/api/contents/review-inbox", get(review_inbox))
        .route("/api/contents/{id}", get(get_content).delete(delete_content))
        .route("/api/contents/{id}/submit-review", post(submit_review))
        .route("/api/contents/{id}/approve", post(approve_content))
        .route("/api/contents/{id}/reject", post(reject_content))
        .with_state(state)
}

// ── Errors ─────────────────────────────────────────────────────────

pub struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self(ServiceError::Internal(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self.0 {
            ServiceError::QuotaExceeded { month_key } => (
                StatusCode::FORBIDDEN,
                json!({
                    "code": "QUOTA_EXCEEDED",
                    "message": self.0.to_string(),
                    "monthKey": month_key,
                }),
            ),
            ServiceError::ModelNotAllowed => (
                StatusCode::FORBIDDEN,
                json!({
                    "error": self.0.to_string(),
                    "allowed_models": ServiceError::basic_plan_models(),
                }),
            ),
            ServiceError::EmptyRequest
            | ServiceError::NotReviewable
            | ServiceError::InvalidContent(_) => {
                (StatusCode::BAD_REQUEST, json!({ "error": self.0.to_string() }))
            }
            ServiceError::InvalidTransition { .. } => {
                (StatusCode::CONFLICT, json!({ "error": self.0.to_string() }))
            }
            ServiceError::NotFound(_) => {
                (StatusCode::NOT_FOUND, json!({ "error": self.0.to_string() }))
            }
            ServiceError::AccessDenied | ServiceError::FeatureNotAvailable => {
                (StatusCode::FORBIDDEN, json!({ "error": self.0.to_string() }))
            }
            ServiceError::Dispatch(e) => {
                tracing::error!("erro de despacho: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": e.to_string() }),
                )
            }
            ServiceError::Internal(e) => {
                tracing::error!("erro interno: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Erro interno do servidor" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

fn user_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(ApiError(ServiceError::NotFound("Usuário")))
}

// ── Generation ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GenerateBody {
    #[serde(default, alias = "message")]
    input: String,
    #[serde(default)]
    chat_id: Option<Uuid>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    temperature: Option<f64>,
}

/// Accepts both JSON bodies and multipart forms; the multipart path is how
/// attachments arrive.
async fn generate_text(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
) -> Result<Response, ApiError> {
    let user = user_id(&headers)?;

    let is_multipart = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("multipart/form-data"))
        .unwrap_or(false);

    let req = if is_multipart {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError(ServiceError::Internal(anyhow::anyhow!(e))))?;
        parse_multipart(multipart, &state.upload_dir, user).await?
    } else {
        let Json(body) = Json::<GenerateBody>::from_request(request, &state)
            .await
            .map_err(|e| ApiError(ServiceError::Internal(anyhow::anyhow!(e))))?;
        SendMessageRequest {
            user_id: user,
            chat_id: body.chat_id,
            input: body.input.trim().to_string(),
            model: body.model,
            temperature: body.temperature,
            files: Vec::new(),
        }
    };

    let resp = state.service.send_message(req).await?;
    Ok(Json(json!({
        "chat": resp.chat,
        "messages": resp.messages,
        "generated_text": resp.generated_text,
        "model_used": resp.model_used,
        "temperature": resp.temperature,
        "uploaded_files": resp.uploaded_files,
    }))
    .into_response())
}

async fn parse_multipart(
    mut multipart: Multipart,
    upload_dir: &FsPath,
    user: String,
) -> Result<SendMessageRequest, ApiError> {
    let mut req = SendMessageRequest {
        user_id: user,
        chat_id: None,
        input: String::new(),
        model: None,
        temperature: None,
        files: Vec::new(),
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError(ServiceError::Internal(anyhow::anyhow!(e))))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "message" | "input" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError(ServiceError::Internal(anyhow::anyhow!(e))))?;
                req.input = text.trim().to_string();
            }
            "chat_id" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError(ServiceError::Internal(anyhow::anyhow!(e))))?;
                req.chat_id = Uuid::parse_str(text.trim()).ok();
            }
            "model" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError(ServiceError::Internal(anyhow::anyhow!(e))))?;
                if !text.trim().is_empty() {
                    req.model = Some(text.trim().to_string());
                }
            }
            "temperature" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError(ServiceError::Internal(anyhow::anyhow!(e))))?;
                req.temperature = text.trim().parse().ok();
            }
            "files" | "file" => {
                let original = sanitize_filename(field.file_name().unwrap_or("arquivo"));
                let mimetype = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError(ServiceError::Internal(anyhow::anyhow!(e))))?;

                let stored = format!("{}_{}", Uuid::new_v4(), original);
                let path = upload_dir.join(&stored);
                tokio::fs::write(&path, &bytes)
                    .await
                    .map_err(|e| ApiError(ServiceError::Internal(e.into())))?;

                req.files.push(NewAttachment {
                    name: original,
                    path: path.to_string_lossy().into_owned(),
                    mimetype,
                    size_bytes: Some(bytes.len() as i64),
                });
            }
            _ => {}
        }
    }

    Ok(req)
}

/// Strip any path components and control characters from an uploaded name.
fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control() && *c != '\0')
        .collect();
    if cleaned.is_empty() {
        "arquivo".to_string()
    } else {
        cleaned
    }
}

// ── Quota ──────────────────────────────────────────────────────────

async fn quota_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user = user_id(&headers)?;
    let status = state.service.quota_status(&user).await?;
    Ok(Json(status).into_response())
}

// ── Chats ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ListChatsQuery {
    #[serde(default)]
    q: Option<String>,
}

async fn list_chats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListChatsQuery>,
) -> Result<Response, ApiError> {
    let user = user_id(&headers)?;
    let chats = state.service.db.list_chats(&user, query.q.as_deref()).await?;
    Ok(Json(chats).into_response())
}

async fn get_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(chat_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let user = user_id(&headers)?;
    let chat = state
        .service
        .db
        .get_chat(chat_id, &user)
        .await?
        .ok_or(ApiError(ServiceError::NotFound("Chat")))?;
    let messages = state.service.db.get_messages(chat_id).await?;
    Ok(Json(json!({ "chat": chat, "messages": messages })).into_response())
}

#[derive(Debug, Deserialize)]
struct UpdateChatBody {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    system_prompt: Option<String>,
    #[serde(default)]
    default_model: Option<String>,
}

async fn update_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(chat_id): Path<Uuid>,
    Json(body): Json<UpdateChatBody>,
) -> Result<Response, ApiError> {
    let user = user_id(&headers)?;
    let chat = state
        .service
        .db
        .update_chat_meta(
            chat_id,
            &user,
            body.title.as_deref(),
            body.system_prompt.as_deref(),
            body.default_model.as_deref(),
        )
        .await?
        .ok_or(ApiError(ServiceError::NotFound("Chat")))?;
    Ok(Json(chat).into_response())
}

async fn archive_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(chat_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    set_archived(state, headers, chat_id, true).await
}

async fn unarchive_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(chat_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    set_archived(state, headers, chat_id, false).await
}

async fn set_archived(
    state: AppState,
    headers: HeaderMap,
    chat_id: Uuid,
    archived: bool,
) -> Result<Response, ApiError> {
    let user = user_id(&headers)?;
    let found = state
        .service
        .db
        .set_chat_archived(chat_id, &user, archived)
        .await?;
    if !found {
        return Err(ApiError(ServiceError::NotFound("Chat")));
    }
    Ok(Json(json!({ "archived": archived })).into_response())
}

async fn delete_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(chat_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let user = user_id(&headers)?;
    let deleted = state.service.db.delete_chat(chat_id, &user).await?;
    if !deleted {
        return Err(ApiError(ServiceError::NotFound("Chat")));
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn download_attachment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(attachment_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let user = user_id(&headers)?;
    let att = state
        .service
        .db
        .get_attachment_for_user(attachment_id, &user)
        .await?
        .ok_or(ApiError(ServiceError::NotFound("Anexo")))?;

    let bytes = tokio::fs::read(&att.path)
        .await
        .map_err(|_| ApiError(ServiceError::NotFound("Anexo")))?;

    let disposition = format!("inline; filename=\"{}\"", att.name.replace('"', ""));
    Ok((
        [
            (header::CONTENT_TYPE, att.mimetype),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from(bytes),
    )
        .into_response())
}

// ── Projects ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CreateProjectBody {
    name: String,
}

async fn create_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateProjectBody>,
) -> Result<Response, ApiError> {
    let user = user_id(&headers)?;
    let name = body.name.trim();
    if name.is_empty() {
        return Err(ApiError(ServiceError::EmptyRequest));
    }
    let project = state.service.db.create_project(&user, name).await?;
    Ok((StatusCode::CREATED, Json(project)).into_response())
}

async fn link_content(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((project_id, content_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, ApiError> {
    let user = user_id(&headers)?;
    // Both ends must belong to the caller.
    state
        .service
        .db
        .get_content(content_id)
        .await?
        .filter(|c| c.user_id == user)
        .ok_or(ApiError(ServiceError::NotFound("Conteúdo")))?;
    state
        .service
        .db
        .link_content_to_project(content_id, project_id)
        .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ── Generated Content ──────────────────────────────────────────────

async fn list_contents(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user = user_id(&headers)?;
    let contents = state.service.db.list_contents(&user).await?;
    Ok(Json(contents).into_response())
}

#[derive(Debug, Deserialize)]
struct CreateContentBody {
    #[serde(alias = "kind")]
    content_type: String,
    prompt: String,
    #[serde(default)]
    model_used: Option<String>,
    #[serde(default)]
    content_data: Option<String>,
    #[serde(default)]
    temperature: Option<f64>,
    #[serde(default)]
    style: Option<String>,
    #[serde(default)]
    ratio: Option<String>,
    #[serde(default)]
    duration: Option<i32>,
}

async fn create_content(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateContentBody>,
) -> Result<Response, ApiError> {
    let user = user_id(&headers)?;
    let kind = ContentKind::parse(&body.content_type).ok_or(ApiError(
        ServiceError::InvalidContent("Tipo de conteúdo inválido."),
    ))?;
    let content = state
        .service
        .create_content(CreateContentRequest {
            user_id: user,
            kind,
            prompt: body.prompt,
            model_used: body.model_used,
            content_data: body.content_data,
            temperature: body.temperature,
            style: body.style,
            ratio: body.ratio,
            duration: body.duration,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(content)).into_response())
}

async fn review_inbox(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user = user_id(&headers)?;
    let contents = state.service.review_inbox(&user).await?;
    Ok(Json(contents).into_response())
}

async fn get_content(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(content_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let user = user_id(&headers)?;
    let content = state
        .service
        .db
        .get_content(content_id)
        .await?
        .filter(|c| c.user_id == user)
        .ok_or(ApiError(ServiceError::NotFound("Conteúdo")))?;
    let projects = state.service.db.project_ids_for_content(content_id).await?;
    Ok(Json(json!({ "content": content, "projects": projects })).into_response())
}

async fn delete_content(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(content_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let user = user_id(&headers)?;
    let deleted = state.service.db.delete_content(content_id, &user).await?;
    if !deleted {
        return Err(ApiError(ServiceError::NotFound("Conteúdo")));
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn submit_review(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(content_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let user = user_id(&headers)?;
    let content = state.service.submit_for_review(content_id, &user).await?;
    Ok(Json(content).into_response())
}

async fn approve_content(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(content_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let user = user_id(&headers)?;
    let content = state.service.review_content(content_id, &user, true).await?;
    Ok(Json(content).into_response())
}

async fn reject_content(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(content_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let user = user_id(&headers)?;
    let content = state.service.review_content(content_id, &user, false).await?;
    Ok(Json(content).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_paths() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\x\\doc.pdf"), "doc.pdf");
        assert_eq!(sanitize_filename("relatório.pdf"), "relatório.pdf");
        assert_eq!(sanitize_filename(""), "arquivo");
    }
}
