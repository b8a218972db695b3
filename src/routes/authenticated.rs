use crate::{
    AppState,
    handlers::{achievements, auth, lecturers, students},
};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// Routes for any signed-in user. The `AuthUser` layer above this router guarantees an
/// identity; each handler then checks the permission it needs and, for achievements,
/// whether the caller owns, advises or administers the record.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // --- Session ---
        .route("/auth/logout", post(auth::logout))
        .route("/auth/profile", get(auth::profile))
        // --- Achievements ---
        // GET lists by role scope; POST is the multipart submit of a new draft.
        .route(
            "/achievements",
            get(achievements::list_achievements).post(achievements::submit_achievement),
        )
        .route("/achievements/stats", get(achievements::achievement_stats))
        .route(
            "/achievements/{id}",
            get(achievements::get_achievement)
                .put(achievements::update_achievement)
                .delete(achievements::delete_achievement),
        )
        // Owner moves a draft into the verification queue.
        .route(
            "/achievements/{id}/submit",
            post(achievements::submit_for_verification),
        )
        // Advisor or admin decisions.
        .route(
            "/achievements/{id}/verify",
            post(achievements::verify_achievement),
        )
        .route(
            "/achievements/{id}/reject",
            post(achievements::reject_achievement),
        )
        .route(
            "/achievements/{id}/documents/{index}",
            get(achievements::document_link),
        )
        // --- Students ---
        .route("/students", get(students::list_students))
        .route(
            "/students/{id}",
            get(students::get_student).put(students::update_student),
        )
        .route("/students/{id}/advisor", put(students::assign_advisor))
        .route(
            "/students/{id}/achievements",
            get(students::student_achievements),
        )
        // --- Lecturers ---
        .route("/lecturers", get(lecturers::list_lecturers))
        .route("/lecturers/{id}", put(lecturers::update_lecturer))
        .route("/lecturers/{id}/advisees", get(lecturers::list_advisees))
}
