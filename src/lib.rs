use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod config;
pub mod documents;
pub mod error;
pub mod handlers;
pub mod models;
pub mod permissions;
pub mod references;
pub mod repository;
pub mod response;
pub mod storage;
pub mod workflow;

// Module for routing segregation (Public, Authenticated, Admin).
pub mod routes;
use auth::AuthUser;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use documents::{AchievementState, MongoAchievementStore};
pub use error::{AppError, AppResult};
pub use permissions::{PermissionCache, PermissionState};
pub use references::{PostgresReferenceStore, ReferenceState};
pub use repository::{PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};
pub use workflow::AchievementWorkflow;

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and `ToSchema` model into the OpenAPI
/// document served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::login, handlers::auth::refresh, handlers::auth::logout,
        handlers::auth::profile,
        handlers::achievements::list_achievements, handlers::achievements::get_achievement,
        handlers::achievements::submit_achievement, handlers::achievements::update_achievement,
        handlers::achievements::delete_achievement,
        handlers::achievements::submit_for_verification,
        handlers::achievements::verify_achievement, handlers::achievements::reject_achievement,
        handlers::achievements::achievement_stats, handlers::achievements::document_link,
        handlers::users::create_user, handlers::users::list_users, handlers::users::get_user,
        handlers::users::update_user, handlers::users::delete_user, handlers::users::assign_role,
        handlers::users::create_student_profile, handlers::users::create_lecturer_profile,
        handlers::students::list_students, handlers::students::get_student,
        handlers::students::update_student, handlers::students::assign_advisor,
        handlers::students::student_achievements,
        handlers::lecturers::list_lecturers, handlers::lecturers::update_lecturer,
        handlers::lecturers::list_advisees,
    ),
    components(
        schemas(
            models::User, models::Role, models::Student, models::Lecturer, models::UserProfile,
            models::UserDetail, models::AchievementStatus, models::AttachedDocument,
            models::Achievement, models::AchievementReference, models::AchievementView,
            models::AchievementStats, models::DocumentLink, models::LoginRequest,
            models::RefreshRequest, models::LoginResponse, models::RefreshResponse,
            models::CreateUserRequest, models::CreatedUser, models::UpdateUserRequest,
            models::AssignRoleRequest, models::StudentProfileRequest,
            models::LecturerProfileRequest, models::UpdateStudentRequest,
            models::UpdateLecturerRequest, models::AssignAdvisorRequest,
            models::UpdateAchievementRequest, models::RejectAchievementRequest,
            models::SubmitAchievementForm, response::PageMeta,
        )
    ),
    tags(
        (name = "auth", description = "Login, token refresh and profile"),
        (name = "achievements", description = "Achievement submission and verification"),
        (name = "users", description = "Account management"),
        (name = "students", description = "Student profiles"),
        (name = "lecturers", description = "Lecturer profiles")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// The single shared container for every service a handler may need. Cloning is cheap:
/// every member is an `Arc` or a small value.
#[derive(Clone)]
pub struct AppState {
    /// Relational credential store (users, roles, profiles).
    pub repo: RepositoryState,
    /// Achievement documents (MongoDB).
    pub achievements: AchievementState,
    /// Relational achievement references.
    pub references: ReferenceState,
    /// Attachment bucket.
    pub storage: StorageState,
    /// Role → permission lookup loaded at startup.
    pub permissions: PermissionState,
    /// Cross-store submit/verify/delete flows over the three stores above.
    pub workflow: AchievementWorkflow,
    pub config: AppConfig,
}

impl AppState {
    /// Assembles the state, wiring the workflow to the same store handles.
    pub fn new(
        repo: RepositoryState,
        achievements: AchievementState,
        references: ReferenceState,
        storage: StorageState,
        permissions: PermissionState,
        config: AppConfig,
    ) -> Self {
        let workflow = AchievementWorkflow::new(
            achievements.clone(),
            references.clone(),
            storage.clone(),
            config.upload_max_bytes,
        );
        Self {
            repo,
            achievements,
            references,
            storage,
            permissions,
            workflow,
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

// The pieces the `AuthUser` extractor pulls from the state.
impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for PermissionState {
    fn from_ref(app_state: &AppState) -> PermissionState {
        app_state.permissions.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Runs the `AuthUser` extractor ahead of every protected route. A failed extraction
/// rejects with the 401 envelope before the handler is reached.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Mounts `/health`, the Swagger UI and the `/api/v1` tree, then wraps everything in the
/// request-id, tracing and CORS layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    // Room for several maximum-size attachments plus the text fields.
    let body_limit = state.config.upload_max_bytes.saturating_mul(10) + 1024 * 1024;

    let api = Router::new()
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes()
                .merge(admin::admin_routes())
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        );

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(|| async { "ok" }))
        .nest("/api/v1", api)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Opens the per-request span with method, URI and the generated `x-request-id`, so
/// every log line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
