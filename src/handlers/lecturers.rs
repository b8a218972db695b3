use axum::{
    Json,
    extract::{Path, Query, State},
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult},
    models::{Lecturer, Student, UpdateLecturerRequest},
    permissions::{LECTURERS_MANAGE, LECTURERS_READ, STUDENTS_READ},
    response::{ApiResponse, PageQuery, Paginated, Reply},
};

#[utoipa::path(
    get,
    path = "/api/v1/lecturers",
    params(PageQuery),
    responses((status = 200, description = "Page of lecturers", body = ApiResponse<Paginated<Lecturer>>)),
    tag = "lecturers"
)]
pub async fn list_lecturers(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> AppResult<Reply<Paginated<Lecturer>>> {
    state.permissions.require(user.role_id, LECTURERS_READ)?;
    let page = query.normalize();
    let (lecturers, total) = state.repo.list_lecturers(page).await?;
    Ok(Reply::ok("lecturers", Paginated::new(lecturers, page, total)))
}

#[utoipa::path(
    put,
    path = "/api/v1/lecturers/{id}",
    params(("id" = Uuid, Path, description = "Lecturer profile ID")),
    request_body = UpdateLecturerRequest,
    responses(
        (status = 200, description = "Updated", body = ApiResponse<Lecturer>),
        (status = 400, description = "Blank field or duplicate lecturer_id"),
        (status = 404, description = "Not found")
    ),
    tag = "lecturers"
)]
pub async fn update_lecturer(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLecturerRequest>,
) -> AppResult<Reply<Lecturer>> {
    state.permissions.require(user.role_id, LECTURERS_MANAGE)?;
    let fields = [
        ("lecturer_id", &payload.lecturer_id),
        ("department", &payload.department),
    ];
    for (name, value) in fields {
        if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
            return Err(AppError::bad_request(format!("{name} must not be blank")));
        }
    }
    let req = UpdateLecturerRequest {
        lecturer_id: payload.lecturer_id.map(|v| v.trim().to_string()),
        department: payload.department.map(|v| v.trim().to_string()),
    };

    let lecturer = state
        .repo
        .update_lecturer(id, req)
        .await?
        .ok_or_else(|| AppError::not_found("lecturer not found"))?;
    Ok(Reply::ok("lecturer updated", lecturer))
}

/// list_advisees
///
/// Students whose advisor is this lecturer. A lecturer may only list their own advisees.
#[utoipa::path(
    get,
    path = "/api/v1/lecturers/{id}/advisees",
    params(("id" = Uuid, Path, description = "Lecturer profile ID")),
    responses(
        (status = 200, description = "Advisees", body = ApiResponse<Vec<Student>>),
        (status = 403, description = "Another lecturer's advisees"),
        (status = 404, description = "Not found")
    ),
    tag = "lecturers"
)]
pub async fn list_advisees(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Reply<Vec<Student>>> {
    state.permissions.require(user.role_id, STUDENTS_READ)?;
    let lecturer = state
        .repo
        .get_lecturer(id)
        .await?
        .ok_or_else(|| AppError::not_found("lecturer not found"))?;
    if !user.is_admin() && lecturer.user_id != user.id {
        return Err(AppError::forbidden("not allowed to view these advisees"));
    }
    let advisees = state.repo.list_advisees(lecturer.id).await?;
    Ok(Reply::ok("advisees", advisees))
}
