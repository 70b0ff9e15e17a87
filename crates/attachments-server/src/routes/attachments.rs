use axum::{
    extract::{
        multipart::MultipartError, rejection::FormRejection, DefaultBodyLimit, Form, Multipart,
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use attachments_core::form::{FIELD_FILE, FIELD_TAG};
use attachments_core::{
    Actor, AttachmentForm, Capability, TargetRef, UploadSubmission, UploadedFile,
};

use super::{error_response, to_error, ApiError, AppState};

const FIELD_NEXT: &str = "next";

/// Room for multipart framing and the small text fields on top of the file.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

pub fn routes(max_upload_bytes: usize) -> Router<AppState> {
    let body_limit = max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);
    Router::new()
        .route(
            "/attachments/add-for/{kind}/{id}",
            post(add_for).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route(
            "/attachments/{id}/replace",
            post(replace).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/attachments/delete/{id}", post(delete_attachment))
        .route("/attachments/for/{kind}/{id}", get(list_for))
        .route("/attachments/{id}/file", get(download))
}

#[derive(Debug, Default, Deserialize)]
struct NextParam {
    next: Option<String>,
}

fn parse_target(kind: &str, id: &str) -> Result<TargetRef, ApiError> {
    TargetRef::parse(kind, id).map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string()))
}

/// Only same-site absolute paths are followed after a form post.
fn safe_redirect(next: Option<&str>) -> Option<&str> {
    next.filter(|n| n.starts_with('/') && !n.starts_with("//") && !n.contains('\\'))
}

fn redirect_or(next: Option<&str>, fallback: impl IntoResponse) -> Response {
    match safe_redirect(next) {
        Some(to) => Redirect::to(to).into_response(),
        None => fallback.into_response(),
    }
}

fn multipart_error(e: MultipartError) -> ApiError {
    error_response(e.status(), e.body_text())
}

/// Collect the upload form fields and the optional `next` redirect.
async fn read_upload(
    mut multipart: Multipart,
) -> Result<(UploadSubmission, Option<String>), ApiError> {
    let mut submission = UploadSubmission::default();
    let mut next = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            FIELD_FILE => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(multipart_error)?;
                submission.attachment_file = Some(UploadedFile {
                    filename,
                    content_type,
                    data,
                });
            }
            FIELD_TAG => {
                submission.tag = Some(field.text().await.map_err(multipart_error)?);
            }
            FIELD_NEXT => {
                let text = field.text().await.map_err(multipart_error)?;
                next = Some(text).filter(|t| !t.is_empty());
            }
            other => debug!(field = other, "ignoring unknown upload field"),
        }
    }
    Ok((submission, next))
}

async fn add_for(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
    Extension(actor): Extension<Actor>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let target = parse_target(&kind, &id)?;
    if !actor.has_perm(Capability::AddAttachment) {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            format!("{} may not add attachments", actor.username),
        ));
    }

    let (submission, next) = read_upload(multipart).await?;
    let attachment = state
        .service
        .submit(&AttachmentForm::new(), submission, &actor, &target)
        .await
        .map_err(to_error)?;
    Ok(redirect_or(
        next.as_deref(),
        (StatusCode::CREATED, Json(json!(attachment))),
    ))
}

async fn replace(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(actor): Extension<Actor>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let (submission, next) = read_upload(multipart).await?;
    let attachment = state
        .service
        .resubmit(&actor, &id, submission)
        .await
        .map_err(to_error)?;
    Ok(redirect_or(next.as_deref(), Json(json!(attachment))))
}

/// `next` may come from the query string or an urlencoded body.
async fn delete_attachment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<NextParam>,
    form: Result<Form<NextParam>, FormRejection>,
) -> Result<Response, ApiError> {
    let next = form
        .ok()
        .and_then(|Form(body)| body.next)
        .or(query.next)
        .filter(|n| !n.is_empty());
    state
        .service
        .delete(&actor, &id)
        .await
        .map_err(to_error)?;
    Ok(redirect_or(next.as_deref(), StatusCode::NO_CONTENT))
}

async fn list_for(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let target = parse_target(&kind, &id)?;
    let attachments = state
        .service
        .attachments_for(&target)
        .await
        .map_err(to_error)?;
    Ok(Json(json!(attachments)).into_response())
}

async fn download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let (attachment, data) = state.service.read_file(&id).await.map_err(to_error)?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        header_safe_filename(attachment.filename())
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    )
        .into_response())
}

/// Header values must be visible ASCII; quotes would end the parameter.
fn header_safe_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect()
}
