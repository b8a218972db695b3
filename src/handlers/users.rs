use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    AppState,
    auth::{self, AuthUser, GENERATED_PASSWORD_LEN},
    error::{AppError, AppResult},
    models::{
        AssignRoleRequest, CreateUserRequest, CreatedUser, Lecturer, LecturerProfileRequest,
        NewProfile, NewUser, Role, Student, StudentProfileRequest, UpdateUserRequest, User,
        UserDetail,
    },
    permissions::{
        LECTURERS_MANAGE, ROLE_LECTURER, ROLE_STUDENT, STUDENTS_MANAGE, USERS_CREATE,
        USERS_DELETE, USERS_MANAGE_ROLES, USERS_READ, USERS_UPDATE,
    },
    response::{ApiResponse, PageQuery, Paginated, Reply},
};

/// UserFilter
///
/// Query parameters of `GET /users`.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct UserFilter {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub role_id: Option<Uuid>,
}

fn require_text(field: &str, value: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::bad_request(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn optional_text(field: &str, value: Option<String>) -> AppResult<Option<String>> {
    value.map(|v| require_text(field, &v)).transpose()
}

/// Trimmed values of a profile's optional fields: all present, all absent, or a 400.
fn profile_fields<const N: usize>(
    kind: &str,
    fields: [(&str, &Option<String>); N],
) -> AppResult<Option<[String; N]>> {
    let present: Vec<String> = fields
        .iter()
        .filter_map(|(_, v)| v.as_deref().map(str::trim).filter(|v| !v.is_empty()))
        .map(str::to_string)
        .collect();
    if present.is_empty() {
        return Ok(None);
    }
    if present.len() != N {
        let names: Vec<&str> = fields.iter().map(|(name, _)| *name).collect();
        return Err(AppError::bad_request(format!(
            "{kind} profile requires {}",
            names.join(", ")
        )));
    }
    present
        .try_into()
        .map(Some)
        .map_err(|_| AppError::internal("profile field count mismatch"))
}

async fn existing_role(state: &AppState, role_id: Uuid) -> AppResult<Role> {
    state
        .repo
        .get_role(role_id)
        .await?
        .ok_or_else(|| AppError::bad_request("role not found"))
}

async fn existing_user(state: &AppState, id: Uuid) -> AppResult<User> {
    state
        .repo
        .get_user(id)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))
}

async fn ensure_unique(
    state: &AppState,
    username: Option<&str>,
    email: Option<&str>,
    except: Option<Uuid>,
) -> AppResult<()> {
    if let Some(username) = username {
        if state.repo.username_taken(username, except).await? {
            return Err(AppError::bad_request("username already exists"));
        }
    }
    if let Some(email) = email {
        if state.repo.email_taken(email, except).await? {
            return Err(AppError::bad_request("email already exists"));
        }
    }
    Ok(())
}

/// create_user
///
/// Creates an account with a generated password, returned once in the response. When
/// the role is `student` or `lecturer` and the matching profile fields are given, the
/// profile is written in the same transaction.
#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = ApiResponse<CreatedUser>),
        (status = 400, description = "Missing field, duplicate or unknown role")
    ),
    tag = "users"
)]
pub async fn create_user(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<Reply<CreatedUser>> {
    state.permissions.require(user.role_id, USERS_CREATE)?;

    let username = require_text("username", &payload.username)?;
    let email = require_text("email", &payload.email)?;
    let full_name = require_text("full_name", &payload.full_name)?;
    let role_id = payload
        .role_id
        .ok_or_else(|| AppError::bad_request("role_id is required"))?;
    let role = existing_role(&state, role_id).await?;
    ensure_unique(&state, Some(&username), Some(&email), None).await?;

    let profile = match role.name.as_str() {
        ROLE_STUDENT => profile_fields(
            "student",
            [
                ("student_id", &payload.student_id),
                ("program_study", &payload.program_study),
                ("academic_year", &payload.academic_year),
            ],
        )?
        .map(|[student_id, program_study, academic_year]| {
            NewProfile::Student(StudentProfileRequest {
                student_id,
                program_study,
                academic_year,
            })
        }),
        ROLE_LECTURER => profile_fields(
            "lecturer",
            [
                ("lecturer_id", &payload.lecturer_id),
                ("department", &payload.department),
            ],
        )?
        .map(|[lecturer_id, department]| {
            NewProfile::Lecturer(LecturerProfileRequest {
                lecturer_id,
                department,
            })
        }),
        _ => None,
    };

    let password = auth::generate_password(GENERATED_PASSWORD_LEN);
    let account = state
        .repo
        .create_user(
            NewUser {
                username,
                email,
                password_hash: auth::hash_password(&password)?,
                full_name,
                role_id,
            },
            profile,
        )
        .await?;

    tracing::info!(user_id = %account.user.id, role = %role.name, by = %user.id, "user created");
    Ok(Reply::created(
        "user created",
        CreatedUser {
            user: account.user,
            password,
            student: account.student,
            lecturer: account.lecturer,
        },
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/users",
    params(UserFilter),
    responses((status = 200, description = "Page of users", body = ApiResponse<Paginated<User>>)),
    tag = "users"
)]
pub async fn list_users(
    user: AuthUser,
    State(state): State<AppState>,
    Query(filter): Query<UserFilter>,
) -> AppResult<Reply<Paginated<User>>> {
    state.permissions.require(user.role_id, USERS_READ)?;
    let page = PageQuery {
        page: filter.page,
        limit: filter.limit,
    }
    .normalize();
    let (users, total) = state.repo.list_users(filter.role_id, page).await?;
    Ok(Reply::ok("users", Paginated::new(users, page, total)))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User with profile", body = ApiResponse<UserDetail>),
        (status = 404, description = "Not found")
    ),
    tag = "users"
)]
pub async fn get_user(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Reply<UserDetail>> {
    state.permissions.require(user.role_id, USERS_READ)?;
    let found = existing_user(&state, id).await?;

    let (student, lecturer) = match state.permissions.role_name(found.role_id) {
        Some(ROLE_STUDENT) => (state.repo.student_by_user(id).await?, None),
        Some(ROLE_LECTURER) => (None, state.repo.lecturer_by_user(id).await?),
        _ => (None, None),
    };
    Ok(Reply::ok(
        "user",
        UserDetail {
            user: found,
            student,
            lecturer,
        },
    ))
}

/// update_user
///
/// Partial update. Uniqueness is re-checked only for fields that change; changing the
/// role additionally needs `users.manage_roles`.
#[utoipa::path(
    put,
    path = "/api/v1/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = ApiResponse<User>),
        (status = 400, description = "Blank field, duplicate or unknown role"),
        (status = 404, description = "Not found")
    ),
    tag = "users"
)]
pub async fn update_user(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> AppResult<Reply<User>> {
    state.permissions.require(user.role_id, USERS_UPDATE)?;
    let current = existing_user(&state, id).await?;

    let req = UpdateUserRequest {
        username: optional_text("username", payload.username)?
            .filter(|u| *u != current.username),
        email: optional_text("email", payload.email)?.filter(|e| *e != current.email),
        full_name: optional_text("full_name", payload.full_name)?,
        role_id: payload.role_id.filter(|r| *r != current.role_id),
        is_active: payload.is_active,
    };
    if let Some(role_id) = req.role_id {
        state.permissions.require(user.role_id, USERS_MANAGE_ROLES)?;
        existing_role(&state, role_id).await?;
    }
    ensure_unique(&state, req.username.as_deref(), req.email.as_deref(), Some(id)).await?;

    let updated = state
        .repo
        .update_user(id, req)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;
    Ok(Reply::ok("user updated", updated))
}

/// delete_user
///
/// Soft delete: the row stays, `deleted_at` is set and the account is deactivated.
#[utoipa::path(
    delete,
    path = "/api/v1/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 404, description = "Not found")
    ),
    tag = "users"
)]
pub async fn delete_user(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Reply<()>> {
    state.permissions.require(user.role_id, USERS_DELETE)?;
    if !state.repo.soft_delete_user(id).await? {
        return Err(AppError::not_found("user not found"));
    }
    tracing::info!(user_id = %id, by = %user.id, "user deleted");
    Ok(Reply::done("user deleted"))
}

#[utoipa::path(
    put,
    path = "/api/v1/users/{id}/role",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = AssignRoleRequest,
    responses(
        (status = 200, description = "Role assigned", body = ApiResponse<User>),
        (status = 400, description = "Missing or unknown role"),
        (status = 404, description = "Not found")
    ),
    tag = "users"
)]
pub async fn assign_role(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignRoleRequest>,
) -> AppResult<Reply<User>> {
    state.permissions.require(user.role_id, USERS_MANAGE_ROLES)?;
    let role_id = payload
        .role_id
        .ok_or_else(|| AppError::bad_request("role_id is required"))?;
    existing_role(&state, role_id).await?;

    let updated = state
        .repo
        .assign_role(id, role_id)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;
    Ok(Reply::ok("role assigned", updated))
}

#[utoipa::path(
    post,
    path = "/api/v1/users/{id}/student-profile",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = StudentProfileRequest,
    responses(
        (status = 201, description = "Profile created", body = ApiResponse<Student>),
        (status = 400, description = "Missing field or profile exists"),
        (status = 404, description = "User not found")
    ),
    tag = "users"
)]
pub async fn create_student_profile(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StudentProfileRequest>,
) -> AppResult<Reply<Student>> {
    state.permissions.require(user.role_id, STUDENTS_MANAGE)?;
    let req = StudentProfileRequest {
        student_id: require_text("student_id", &payload.student_id)?,
        program_study: require_text("program_study", &payload.program_study)?,
        academic_year: require_text("academic_year", &payload.academic_year)?,
    };
    existing_user(&state, id).await?;
    if state.repo.student_by_user(id).await?.is_some() {
        return Err(AppError::bad_request("student profile already exists"));
    }
    let student = state.repo.create_student(id, req).await?;
    Ok(Reply::created("student profile created", student))
}

#[utoipa::path(
    post,
    path = "/api/v1/users/{id}/lecturer-profile",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = LecturerProfileRequest,
    responses(
        (status = 201, description = "Profile created", body = ApiResponse<Lecturer>),
        (status = 400, description = "Missing field or profile exists"),
        (status = 404, description = "User not found")
    ),
    tag = "users"
)]
pub async fn create_lecturer_profile(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<LecturerProfileRequest>,
) -> AppResult<Reply<Lecturer>> {
    state.permissions.require(user.role_id, LECTURERS_MANAGE)?;
    let req = LecturerProfileRequest {
        lecturer_id: require_text("lecturer_id", &payload.lecturer_id)?,
        department: require_text("department", &payload.department)?,
    };
    existing_user(&state, id).await?;
    if state.repo.lecturer_by_user(id).await?.is_some() {
        return Err(AppError::bad_request("lecturer profile already exists"));
    }
    let lecturer = state.repo.create_lecturer(id, req).await?;
    Ok(Reply::created("lecturer profile created", lecturer))
}
