use axum::{
    Json,
    extract::{Path, Query, State},
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult},
    handlers::{
        achievements::{AchievementFilter, list_views},
        ensure_student_visible,
    },
    models::{AchievementView, AssignAdvisorRequest, Student, UpdateStudentRequest},
    permissions::{ACHIEVEMENTS_READ, STUDENTS_MANAGE, STUDENTS_READ},
    references::ReferenceScope,
    response::{ApiResponse, PageQuery, Paginated, Reply},
};

async fn existing_student(state: &AppState, id: Uuid) -> AppResult<Student> {
    state
        .repo
        .get_student(id)
        .await?
        .ok_or_else(|| AppError::not_found("student not found"))
}

#[utoipa::path(
    get,
    path = "/api/v1/students",
    params(PageQuery),
    responses((status = 200, description = "Page of students", body = ApiResponse<Paginated<Student>>)),
    tag = "students"
)]
pub async fn list_students(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> AppResult<Reply<Paginated<Student>>> {
    state.permissions.require(user.role_id, STUDENTS_READ)?;
    let page = query.normalize();
    let (students, total) = state.repo.list_students(page).await?;
    Ok(Reply::ok("students", Paginated::new(students, page, total)))
}

#[utoipa::path(
    get,
    path = "/api/v1/students/{id}",
    params(("id" = Uuid, Path, description = "Student profile ID")),
    responses(
        (status = 200, description = "Student", body = ApiResponse<Student>),
        (status = 404, description = "Not found")
    ),
    tag = "students"
)]
pub async fn get_student(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Reply<Student>> {
    state.permissions.require(user.role_id, STUDENTS_READ)?;
    let student = existing_student(&state, id).await?;
    Ok(Reply::ok("student", student))
}

#[utoipa::path(
    put,
    path = "/api/v1/students/{id}",
    params(("id" = Uuid, Path, description = "Student profile ID")),
    request_body = UpdateStudentRequest,
    responses(
        (status = 200, description = "Updated", body = ApiResponse<Student>),
        (status = 400, description = "Blank field or duplicate student_id"),
        (status = 404, description = "Not found")
    ),
    tag = "students"
)]
pub async fn update_student(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStudentRequest>,
) -> AppResult<Reply<Student>> {
    state.permissions.require(user.role_id, STUDENTS_MANAGE)?;
    let fields = [
        ("student_id", &payload.student_id),
        ("program_study", &payload.program_study),
        ("academic_year", &payload.academic_year),
    ];
    for (name, value) in fields {
        if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
            return Err(AppError::bad_request(format!("{name} must not be blank")));
        }
    }
    let trim = |v: Option<String>| v.map(|v| v.trim().to_string());
    let req = UpdateStudentRequest {
        student_id: trim(payload.student_id),
        program_study: trim(payload.program_study),
        academic_year: trim(payload.academic_year),
    };

    let student = state
        .repo
        .update_student(id, req)
        .await?
        .ok_or_else(|| AppError::not_found("student not found"))?;
    Ok(Reply::ok("student updated", student))
}

/// assign_advisor
///
/// `advisor_id` must name an existing lecturer profile.
#[utoipa::path(
    put,
    path = "/api/v1/students/{id}/advisor",
    params(("id" = Uuid, Path, description = "Student profile ID")),
    request_body = AssignAdvisorRequest,
    responses(
        (status = 200, description = "Advisor assigned", body = ApiResponse<Student>),
        (status = 400, description = "Missing advisor_id or not a lecturer"),
        (status = 404, description = "Student not found")
    ),
    tag = "students"
)]
pub async fn assign_advisor(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignAdvisorRequest>,
) -> AppResult<Reply<Student>> {
    state.permissions.require(user.role_id, STUDENTS_MANAGE)?;
    let advisor_id = payload
        .advisor_id
        .ok_or_else(|| AppError::bad_request("advisor_id is required"))?;
    existing_student(&state, id).await?;
    if state.repo.get_lecturer(advisor_id).await?.is_none() {
        return Err(AppError::bad_request("advisor_id is not a lecturer"));
    }

    let student = state
        .repo
        .assign_advisor(id, advisor_id)
        .await?
        .ok_or_else(|| AppError::not_found("student not found"))?;
    tracing::info!(student_id = %id, advisor_id = %advisor_id, "advisor assigned");
    Ok(Reply::ok("advisor assigned", student))
}

/// student_achievements
///
/// Achievement history of one student, visible to the student, their advisor and admins.
#[utoipa::path(
    get,
    path = "/api/v1/students/{id}/achievements",
    params(("id" = Uuid, Path, description = "Student profile ID"), AchievementFilter),
    responses(
        (status = 200, description = "Page of achievements", body = ApiResponse<Paginated<AchievementView>>),
        (status = 403, description = "Not visible to the caller"),
        (status = 404, description = "Student not found")
    ),
    tag = "students"
)]
pub async fn student_achievements(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(filter): Query<AchievementFilter>,
) -> AppResult<Reply<Paginated<AchievementView>>> {
    state.permissions.require(user.role_id, ACHIEVEMENTS_READ)?;
    let student = existing_student(&state, id).await?;
    ensure_student_visible(&state, &user, &student).await?;
    let page = list_views(&state, ReferenceScope::Student(student.id), &filter).await?;
    Ok(Reply::ok("student achievements", page))
}
