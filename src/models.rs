use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Relational Records (PostgreSQL) ---

/// User
///
/// A row of the `users` table without its credential column. This is the shape every
/// endpoint returns; the password hash only ever travels inside [`UserCredentials`].
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role_id: Uuid,
    pub is_active: bool,
    // Set when the account is soft-deleted; such users can no longer authenticate.
    #[ts(type = "string | null")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// A user row together with its Argon2 PHC hash. Used by login only.
#[derive(Debug, Clone, FromRow)]
pub struct UserCredentials {
    #[sqlx(flatten)]
    pub user: User,
    pub password_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Role {
    pub id: Uuid,
    // One of `admin`, `lecturer`, `student`.
    pub name: String,
    pub description: Option<String>,
}

/// One `(role, permission)` pair from `role_permissions`, as loaded into the permission cache.
#[derive(Debug, Clone, FromRow)]
pub struct RoleGrant {
    pub role_id: Uuid,
    pub role_name: String,
    pub permission: Option<String>,
}

/// Student
///
/// The student profile attached 1:1 to a user. `student_id` is the institutional
/// registration number; `advisor_id` points at a [`Lecturer`] profile.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Student {
    pub id: Uuid,
    pub user_id: Uuid,
    pub student_id: String,
    pub program_study: String,
    pub academic_year: String,
    pub advisor_id: Option<Uuid>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Lecturer {
    pub id: Uuid,
    pub user_id: Uuid,
    pub lecturer_id: String,
    pub department: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// UserProfile
///
/// The caller's identity as returned by login and `GET /auth/profile`: the user plus the
/// resolved role name and the permission strings granted to that role.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role_id: Uuid,
    pub role: String,
    pub permissions: Vec<String>,
}

/// A user with whichever profile its role carries.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: User,
    pub student: Option<Student>,
    pub lecturer: Option<Lecturer>,
}

// --- Achievements ---

/// AchievementStatus
///
/// Lifecycle of an achievement. Mirrored on both stores: as a lowercase string in the
/// document and as the `achievement_status` enum on the reference row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "achievement_status", rename_all = "lowercase")]
pub enum AchievementStatus {
    Draft,
    Submitted,
    Verified,
    Rejected,
}

impl AchievementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AchievementStatus::Draft => "draft",
            AchievementStatus::Submitted => "submitted",
            AchievementStatus::Verified => "verified",
            AchievementStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for AchievementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// AttachedDocument
///
/// Metadata for one uploaded file. `path` is the object key in the attachments bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AttachedDocument {
    pub filename: String,
    pub path: String,
    pub size: i64,
    pub mimetype: String,
    #[ts(type = "string")]
    pub uploaded_at: DateTime<Utc>,
}

/// Achievement
///
/// A record of the `achievements` collection in the document store. `achievement_id` is the
/// key the relational [`AchievementReference`] points at; `student_id` is the owning
/// student profile id. Both are kept as strings so they read the same on either store.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Achievement {
    pub achievement_id: String,
    pub student_id: String,
    pub title: String,
    pub category: String,
    pub level: String,
    #[ts(type = "string")]
    pub date: NaiveDate,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub documents: Vec<AttachedDocument>,
    pub status: AchievementStatus,
    #[serde(default)]
    pub is_deleted: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// AchievementReference
///
/// The relational shadow of an achievement (`achievement_references`). Listing, pagination
/// and the verification queue are all driven from this table.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct AchievementReference {
    pub id: Uuid,
    pub student_id: Uuid,
    pub mongo_achievement_id: String,
    pub status: AchievementStatus,
    #[ts(type = "string | null")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[ts(type = "string | null")]
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<Uuid>,
    pub rejection_note: Option<String>,
    pub is_deleted: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// A reference row joined with its document. `achievement` is `None` when the document
/// is missing, which only happens after a failed compensation.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AchievementView {
    pub reference: AchievementReference,
    pub achievement: Option<Achievement>,
}

/// Counts per status, backing `GET /achievements/stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AchievementStats {
    pub total: i64,
    pub draft: i64,
    pub submitted: i64,
    pub verified: i64,
    pub rejected: i64,
}

/// A short-lived download link for one attachment.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct DocumentLink {
    pub filename: String,
    pub mimetype: String,
    pub url: String,
    pub expires_in_secs: u64,
}

// --- Request Payloads (Input Schemas) ---

// Required text fields default to empty so a missing field surfaces as a 400 from the
// handler's own validation instead of a body-deserialization rejection.

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginRequest {
    /// Username or email address.
    #[serde(default)]
    #[schema(example = "jdoe")]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RefreshResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// CreateUserRequest
///
/// Input for `POST /users`. The student fields are used when the role is `student`, the
/// lecturer fields when it is `lecturer`; a profile is created only when all of its
/// fields are present.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub full_name: String,
    pub role_id: Option<Uuid>,
    pub student_id: Option<String>,
    pub program_study: Option<String>,
    pub academic_year: Option<String>,
    pub lecturer_id: Option<String>,
    pub department: Option<String>,
}

/// The created user and its one-time plaintext password.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreatedUser {
    pub user: User,
    pub password: String,
    pub student: Option<Student>,
    pub lecturer: Option<Lecturer>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AssignRoleRequest {
    pub role_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct StudentProfileRequest {
    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub program_study: String,
    #[serde(default)]
    pub academic_year: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LecturerProfileRequest {
    #[serde(default)]
    pub lecturer_id: String,
    #[serde(default)]
    pub department: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateStudentRequest {
    pub student_id: Option<String>,
    pub program_study: Option<String>,
    pub academic_year: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateLecturerRequest {
    pub lecturer_id: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AssignAdvisorRequest {
    pub advisor_id: Option<Uuid>,
}

/// Partial edit of a draft achievement. `date` is validated as `YYYY-MM-DD`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateAchievementRequest {
    pub title: Option<String>,
    pub category: Option<String>,
    pub level: Option<String>,
    pub description: Option<String>,
    #[schema(example = "2025-03-14")]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RejectAchievementRequest {
    pub rejection_note: Option<String>,
}

/// Multipart body of `POST /achievements`, documented for the OpenAPI schema only.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct SubmitAchievementForm {
    pub title: String,
    pub category: String,
    pub level: String,
    #[schema(example = "2025-03-14")]
    pub date: String,
    pub description: Option<String>,
    #[schema(value_type = Vec<String>, format = Binary)]
    pub documents: Vec<Vec<u8>>,
}

// --- Repository Inputs ---

/// A user row ready to insert (the password is already hashed).
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role_id: Uuid,
}

/// The role profile written in the same transaction as a new user.
#[derive(Debug, Clone)]
pub enum NewProfile {
    Student(StudentProfileRequest),
    Lecturer(LecturerProfileRequest),
}

/// Outcome of creating a user: the row plus whichever profile was written with it.
#[derive(Debug, Clone)]
pub struct CreatedAccount {
    pub user: User,
    pub student: Option<Student>,
    pub lecturer: Option<Lecturer>,
}
