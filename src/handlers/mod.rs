//! HTTP handlers, one module per resource. Every handler authenticates through the
//! `AuthUser` extractor (except login/refresh) and checks its permission against the
//! shared [`PermissionCache`](crate::permissions::PermissionCache) before doing work.

pub mod achievements;
pub mod auth;
pub mod lecturers;
pub mod students;
pub mod users;

use uuid::Uuid;

use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult},
    models::{Achievement, Lecturer, Student},
    references::ReferenceScope,
};

/// The caller's student profile, or 403 when the caller has none.
pub(crate) async fn current_student(state: &AppState, user: &AuthUser) -> AppResult<Student> {
    state
        .repo
        .student_by_user(user.id)
        .await?
        .ok_or_else(|| AppError::forbidden("a student profile is required"))
}

/// The caller's lecturer profile, or 403 when the caller has none.
pub(crate) async fn current_lecturer(state: &AppState, user: &AuthUser) -> AppResult<Lecturer> {
    state
        .repo
        .lecturer_by_user(user.id)
        .await?
        .ok_or_else(|| AppError::forbidden("a lecturer profile is required"))
}

/// Which achievement references the caller may list: admins see all, lecturers their
/// advisees', students their own.
pub(crate) async fn reference_scope(state: &AppState, user: &AuthUser) -> AppResult<ReferenceScope> {
    if user.is_admin() {
        Ok(ReferenceScope::All)
    } else if user.is_lecturer() {
        Ok(ReferenceScope::Advisor(current_lecturer(state, user).await?.id))
    } else if user.is_student() {
        Ok(ReferenceScope::Student(current_student(state, user).await?.id))
    } else {
        Err(AppError::forbidden("role has no achievement access"))
    }
}

/// Whether the caller may see the achievements of one student profile.
pub(crate) async fn ensure_student_visible(
    state: &AppState,
    user: &AuthUser,
    student: &Student,
) -> AppResult<()> {
    let allowed = match reference_scope(state, user).await? {
        ReferenceScope::All => true,
        ReferenceScope::Student(own) => own == student.id,
        ReferenceScope::Advisor(lecturer) => student.advisor_id == Some(lecturer),
    };
    if allowed {
        Ok(())
    } else {
        Err(AppError::forbidden("not allowed to view this student's achievements"))
    }
}

/// Owner, the owner's advisor, or an admin.
pub(crate) async fn ensure_achievement_visible(
    state: &AppState,
    user: &AuthUser,
    achievement: &Achievement,
) -> AppResult<()> {
    let student = owning_student(state, achievement).await?;
    ensure_student_visible(state, user, &student).await
}

/// Only the advisor of the owning student or an admin may verify or reject.
pub(crate) async fn ensure_can_review(
    state: &AppState,
    user: &AuthUser,
    achievement: &Achievement,
) -> AppResult<()> {
    if user.is_admin() {
        return Ok(());
    }
    let lecturer = current_lecturer(state, user).await?;
    let student = owning_student(state, achievement).await?;
    if student.advisor_id == Some(lecturer.id) {
        Ok(())
    } else {
        Err(AppError::forbidden("only the student's advisor may review this achievement"))
    }
}

async fn owning_student(state: &AppState, achievement: &Achievement) -> AppResult<Student> {
    let student_id = Uuid::parse_str(&achievement.student_id)
        .map_err(|_| AppError::internal(format!("malformed student_id on {}", achievement.achievement_id)))?;
    state
        .repo
        .get_student(student_id)
        .await?
        .ok_or_else(|| AppError::not_found("student not found"))
}
