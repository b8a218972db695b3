use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use utoipa::IntoParams;

use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult},
    handlers::{current_student, ensure_achievement_visible, ensure_can_review, reference_scope},
    models::{
        Achievement, AchievementReference, AchievementStats, AchievementStatus, AchievementView,
        DocumentLink, RejectAchievementRequest, SubmitAchievementForm, UpdateAchievementRequest,
    },
    permissions::{
        ACHIEVEMENTS_CREATE, ACHIEVEMENTS_DELETE, ACHIEVEMENTS_READ, ACHIEVEMENTS_SUBMIT,
        ACHIEVEMENTS_UPDATE, ACHIEVEMENTS_VERIFY, REPORTS_READ,
    },
    references::ReferenceScope,
    response::{ApiResponse, PageQuery, Paginated, Reply},
    workflow::{NewAchievement, UploadedFile},
};

const DOWNLOAD_LINK_TTL: Duration = Duration::from_secs(15 * 60);

/// AchievementFilter
///
/// Query parameters of the achievement listings.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct AchievementFilter {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<AchievementStatus>,
}

impl AchievementFilter {
    pub fn page(&self) -> crate::response::Page {
        PageQuery {
            page: self.page,
            limit: self.limit,
        }
        .normalize()
    }
}

/// Joins reference rows with their documents, keeping the reference order.
pub(crate) async fn join_views(
    state: &AppState,
    references: Vec<AchievementReference>,
) -> AppResult<Vec<AchievementView>> {
    let ids: Vec<String> = references
        .iter()
        .map(|r| r.mongo_achievement_id.clone())
        .collect();
    let mut documents: HashMap<String, Achievement> = state
        .achievements
        .find_many(&ids)
        .await?
        .into_iter()
        .map(|a| (a.achievement_id.clone(), a))
        .collect();

    Ok(references
        .into_iter()
        .map(|reference| {
            let achievement = documents.remove(&reference.mongo_achievement_id);
            if achievement.is_none() {
                tracing::warn!(
                    achievement_id = %reference.mongo_achievement_id,
                    "reference row without a document"
                );
            }
            AchievementView {
                reference,
                achievement,
            }
        })
        .collect())
}

/// Lists references in `scope` as joined views.
pub(crate) async fn list_views(
    state: &AppState,
    scope: ReferenceScope,
    filter: &AchievementFilter,
) -> AppResult<Paginated<AchievementView>> {
    let page = filter.page();
    let (references, total) = state.references.list(scope, filter.status, page).await?;
    let views = join_views(state, references).await?;
    Ok(Paginated::new(views, page, total))
}

/// Reads the multipart submit form. Unknown parts are ignored.
async fn read_submission(mut multipart: Multipart) -> AppResult<NewAchievement> {
    let mut input = NewAchievement::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(format!("multipart error: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "documents" => {
                let filename = field.file_name().unwrap_or("file").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::bad_request(format!("read error: {e}")))?;
                input.documents.push(UploadedFile {
                    filename,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            "title" | "category" | "level" | "date" | "description" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::bad_request(format!("read error: {e}")))?;
                match name.as_str() {
                    "title" => input.title = text,
                    "category" => input.category = text,
                    "level" => input.level = text,
                    "date" => input.date = text,
                    _ => input.description = text,
                }
            }
            _ => {}
        }
    }
    Ok(input)
}

/// list_achievements
///
/// Admins see every achievement, lecturers those of their advisees, students their own.
#[utoipa::path(
    get,
    path = "/api/v1/achievements",
    params(AchievementFilter),
    responses(
        (status = 200, description = "Page of achievements", body = ApiResponse<Paginated<AchievementView>>),
        (status = 403, description = "Missing achievements.read")
    ),
    tag = "achievements"
)]
pub async fn list_achievements(
    user: AuthUser,
    State(state): State<AppState>,
    Query(filter): Query<AchievementFilter>,
) -> AppResult<Reply<Paginated<AchievementView>>> {
    state.permissions.require(user.role_id, ACHIEVEMENTS_READ)?;
    let scope = reference_scope(&state, &user).await?;
    let page = list_views(&state, scope, &filter).await?;
    Ok(Reply::ok("achievements", page))
}

#[utoipa::path(
    get,
    path = "/api/v1/achievements/{id}",
    params(("id" = String, Path, description = "Achievement ID")),
    responses(
        (status = 200, description = "Achievement with its reference", body = ApiResponse<AchievementView>),
        (status = 403, description = "Not the owner, advisor or an admin"),
        (status = 404, description = "Not found")
    ),
    tag = "achievements"
)]
pub async fn get_achievement(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Reply<AchievementView>> {
    state.permissions.require(user.role_id, ACHIEVEMENTS_READ)?;
    let achievement = state.workflow.load(&id).await?;
    ensure_achievement_visible(&state, &user, &achievement).await?;

    let reference = state
        .references
        .find_by_achievement(&id)
        .await?
        .ok_or_else(|| AppError::not_found("achievement not found"))?;
    Ok(Reply::ok(
        "achievement",
        AchievementView {
            reference,
            achievement: Some(achievement),
        },
    ))
}

/// submit_achievement
///
/// Multipart create: text fields plus any number of `documents` file parts. The new
/// achievement starts as a draft owned by the caller's student profile.
#[utoipa::path(
    post,
    path = "/api/v1/achievements",
    request_body(content = SubmitAchievementForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Draft created", body = ApiResponse<Achievement>),
        (status = 400, description = "Missing field, bad date or rejected attachment"),
        (status = 500, description = "A store write failed; partial writes were undone")
    ),
    tag = "achievements"
)]
pub async fn submit_achievement(
    user: AuthUser,
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Reply<Achievement>> {
    state.permissions.require(user.role_id, ACHIEVEMENTS_CREATE)?;
    let student = current_student(&state, &user).await?;
    let input = read_submission(multipart).await?;
    let achievement = state.workflow.submit(student.id, input).await?;
    Ok(Reply::created("achievement created", achievement))
}

#[utoipa::path(
    put,
    path = "/api/v1/achievements/{id}",
    params(("id" = String, Path, description = "Achievement ID")),
    request_body = UpdateAchievementRequest,
    responses(
        (status = 200, description = "Draft updated", body = ApiResponse<Achievement>),
        (status = 400, description = "Not a draft or invalid field"),
        (status = 403, description = "Not the owner")
    ),
    tag = "achievements"
)]
pub async fn update_achievement(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateAchievementRequest>,
) -> AppResult<Reply<Achievement>> {
    state.permissions.require(user.role_id, ACHIEVEMENTS_UPDATE)?;
    let student = current_student(&state, &user).await?;
    let achievement = state.workflow.update(student.id, &id, payload).await?;
    Ok(Reply::ok("achievement updated", achievement))
}

#[utoipa::path(
    delete,
    path = "/api/v1/achievements/{id}",
    params(("id" = String, Path, description = "Achievement ID")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 400, description = "Not a draft"),
        (status = 403, description = "Not the owner"),
        (status = 409, description = "Changed concurrently")
    ),
    tag = "achievements"
)]
pub async fn delete_achievement(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Reply<()>> {
    state.permissions.require(user.role_id, ACHIEVEMENTS_DELETE)?;
    let student = current_student(&state, &user).await?;
    state.workflow.delete(student.id, &id).await?;
    Ok(Reply::done("achievement deleted"))
}

#[utoipa::path(
    post,
    path = "/api/v1/achievements/{id}/submit",
    params(("id" = String, Path, description = "Achievement ID")),
    responses(
        (status = 200, description = "Submitted for verification", body = ApiResponse<Achievement>),
        (status = 400, description = "Not a draft"),
        (status = 409, description = "Changed concurrently")
    ),
    tag = "achievements"
)]
pub async fn submit_for_verification(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Reply<Achievement>> {
    state.permissions.require(user.role_id, ACHIEVEMENTS_SUBMIT)?;
    let student = current_student(&state, &user).await?;
    let achievement = state.workflow.submit_for_verification(student.id, &id).await?;
    Ok(Reply::ok("achievement submitted for verification", achievement))
}

/// verify_achievement
///
/// Approves a submitted achievement. Only the owning student's advisor or an admin.
#[utoipa::path(
    post,
    path = "/api/v1/achievements/{id}/verify",
    params(("id" = String, Path, description = "Achievement ID")),
    responses(
        (status = 200, description = "Verified", body = ApiResponse<Achievement>),
        (status = 400, description = "Not submitted"),
        (status = 403, description = "Not the advisor"),
        (status = 409, description = "Changed concurrently")
    ),
    tag = "achievements"
)]
pub async fn verify_achievement(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Reply<Achievement>> {
    state.permissions.require(user.role_id, ACHIEVEMENTS_VERIFY)?;
    let achievement = state.workflow.load(&id).await?;
    ensure_can_review(&state, &user, &achievement).await?;
    let achievement = state.workflow.approve(user.id, &id).await?;
    Ok(Reply::ok("achievement verified", achievement))
}

#[utoipa::path(
    post,
    path = "/api/v1/achievements/{id}/reject",
    params(("id" = String, Path, description = "Achievement ID")),
    request_body = RejectAchievementRequest,
    responses(
        (status = 200, description = "Rejected", body = ApiResponse<Achievement>),
        (status = 400, description = "Not submitted or missing rejection_note"),
        (status = 403, description = "Not the advisor"),
        (status = 409, description = "Changed concurrently")
    ),
    tag = "achievements"
)]
pub async fn reject_achievement(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<RejectAchievementRequest>,
) -> AppResult<Reply<Achievement>> {
    state.permissions.require(user.role_id, ACHIEVEMENTS_VERIFY)?;
    let achievement = state.workflow.load(&id).await?;
    ensure_can_review(&state, &user, &achievement).await?;
    let achievement = state
        .workflow
        .reject(user.id, &id, payload.rejection_note)
        .await?;
    Ok(Reply::ok("achievement rejected", achievement))
}

/// achievement_stats
///
/// Counts per status: global for admins, the caller's advisees for lecturers.
#[utoipa::path(
    get,
    path = "/api/v1/achievements/stats",
    responses(
        (status = 200, description = "Counts per status", body = ApiResponse<AchievementStats>),
        (status = 403, description = "Missing reports.read")
    ),
    tag = "achievements"
)]
pub async fn achievement_stats(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Reply<AchievementStats>> {
    state.permissions.require(user.role_id, REPORTS_READ)?;
    let scope = reference_scope(&state, &user).await?;
    let stats = state.references.status_counts(scope).await?;
    Ok(Reply::ok("achievement statistics", stats))
}

/// document_link
///
/// A presigned download URL for the attachment at `index`.
#[utoipa::path(
    get,
    path = "/api/v1/achievements/{id}/documents/{index}",
    params(
        ("id" = String, Path, description = "Achievement ID"),
        ("index" = usize, Path, description = "Attachment position")
    ),
    responses(
        (status = 200, description = "Download link", body = ApiResponse<DocumentLink>),
        (status = 404, description = "No such achievement or attachment")
    ),
    tag = "achievements"
)]
pub async fn document_link(
    user: AuthUser,
    State(state): State<AppState>,
    Path((id, index)): Path<(String, usize)>,
) -> AppResult<Reply<DocumentLink>> {
    state.permissions.require(user.role_id, ACHIEVEMENTS_READ)?;
    let achievement = state.workflow.load(&id).await?;
    ensure_achievement_visible(&state, &user, &achievement).await?;

    let document = achievement
        .documents
        .get(index)
        .ok_or_else(|| AppError::not_found("attachment not found"))?;
    let url = state
        .storage
        .presigned_download_url(&document.path, DOWNLOAD_LINK_TTL)
        .await?;

    Ok(Reply::ok(
        "download link",
        DocumentLink {
            filename: document.filename.clone(),
            mimetype: document.mimetype.clone(),
            url,
            expires_in_secs: DOWNLOAD_LINK_TTL.as_secs(),
        },
    ))
}
