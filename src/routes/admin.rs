use crate::{AppState, handlers::users};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Admin Router Module
///
/// Account management. Mounted behind the same authentication layer as the
/// authenticated routes; the `users.*`, `students.manage` and `lecturers.manage`
/// permissions, held only by admins, are checked inside each handler.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/{id}",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/users/{id}/role", put(users::assign_role))
        // Attach a profile to an existing account.
        .route(
            "/users/{id}/student-profile",
            post(users::create_student_profile),
        )
        .route(
            "/users/{id}/lecturer-profile",
            post(users::create_lecturer_profile),
        )
}
