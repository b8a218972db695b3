use crate::{
    error::{AppError, AppResult},
    models::{
        CreatedAccount, Lecturer, LecturerProfileRequest, NewProfile, NewUser, Role, RoleGrant,
        Student, StudentProfileRequest, UpdateLecturerRequest, UpdateStudentRequest,
        UpdateUserRequest, User, UserCredentials,
    },
    response::Page,
};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use uuid::Uuid;

/// Repository Trait
///
/// The relational credential store: users, roles and their grants, student and lecturer
/// profiles. Handlers and the auth extractor only ever see this trait, so tests swap in
/// an in-memory implementation.
///
/// Soft-deleted users (`deleted_at IS NOT NULL`) are invisible to every read here.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users & Auth ---
    /// Looks a user up by username or email for login.
    async fn find_credentials(&self, login: &str) -> AppResult<Option<UserCredentials>>;
    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>>;
    async fn list_users(&self, role_id: Option<Uuid>, page: Page) -> AppResult<(Vec<User>, i64)>;
    // `except` skips the user being updated when re-checking uniqueness.
    async fn username_taken(&self, username: &str, except: Option<Uuid>) -> AppResult<bool>;
    async fn email_taken(&self, email: &str, except: Option<Uuid>) -> AppResult<bool>;
    /// Writes the user and its optional profile in one transaction.
    async fn create_user(&self, user: NewUser, profile: Option<NewProfile>)
    -> AppResult<CreatedAccount>;
    async fn update_user(&self, id: Uuid, req: UpdateUserRequest) -> AppResult<Option<User>>;
    async fn soft_delete_user(&self, id: Uuid) -> AppResult<bool>;
    async fn assign_role(&self, id: Uuid, role_id: Uuid) -> AppResult<Option<User>>;

    // --- Roles ---
    async fn get_role(&self, id: Uuid) -> AppResult<Option<Role>>;
    /// Every role with each of its permission names; a role without grants yields one
    /// row with no permission.
    async fn role_grants(&self) -> AppResult<Vec<RoleGrant>>;

    // --- Students ---
    async fn create_student(&self, user_id: Uuid, req: StudentProfileRequest) -> AppResult<Student>;
    async fn student_by_user(&self, user_id: Uuid) -> AppResult<Option<Student>>;
    async fn get_student(&self, id: Uuid) -> AppResult<Option<Student>>;
    async fn list_students(&self, page: Page) -> AppResult<(Vec<Student>, i64)>;
    async fn update_student(&self, id: Uuid, req: UpdateStudentRequest)
    -> AppResult<Option<Student>>;
    async fn assign_advisor(&self, id: Uuid, advisor_id: Uuid) -> AppResult<Option<Student>>;
    async fn list_advisees(&self, lecturer_id: Uuid) -> AppResult<Vec<Student>>;

    // --- Lecturers ---
    async fn create_lecturer(&self, user_id: Uuid, req: LecturerProfileRequest)
    -> AppResult<Lecturer>;
    async fn lecturer_by_user(&self, user_id: Uuid) -> AppResult<Option<Lecturer>>;
    async fn get_lecturer(&self, id: Uuid) -> AppResult<Option<Lecturer>>;
    async fn list_lecturers(&self, page: Page) -> AppResult<(Vec<Lecturer>, i64)>;
    async fn update_lecturer(
        &self,
        id: Uuid,
        req: UpdateLecturerRequest,
    ) -> AppResult<Option<Lecturer>>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer access across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const USER_COLUMNS: &str =
    "id, username, email, full_name, role_id, is_active, deleted_at, created_at, updated_at";
const STUDENT_COLUMNS: &str =
    "id, user_id, student_id, program_study, academic_year, advisor_id, created_at";
const LECTURER_COLUMNS: &str = "id, user_id, lecturer_id, department, created_at";

/// Maps a unique-constraint violation to a 400 naming the duplicated field.
fn unique_violation(field: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |error| match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::bad_request(format!("{field} already exists"))
        }
        _ => AppError::from(error),
    }
}

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by the PostgreSQL database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_student(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        req: &StudentProfileRequest,
    ) -> AppResult<Student> {
        let query = format!(
            "INSERT INTO students (id, user_id, student_id, program_study, academic_year) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {STUDENT_COLUMNS}"
        );
        sqlx::query_as::<_, Student>(&query)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(&req.student_id)
            .bind(&req.program_study)
            .bind(&req.academic_year)
            .fetch_one(&mut **tx)
            .await
            .map_err(unique_violation("student_id"))
    }

    async fn insert_lecturer(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        req: &LecturerProfileRequest,
    ) -> AppResult<Lecturer> {
        let query = format!(
            "INSERT INTO lecturers (id, user_id, lecturer_id, department) \
             VALUES ($1, $2, $3, $4) RETURNING {LECTURER_COLUMNS}"
        );
        sqlx::query_as::<_, Lecturer>(&query)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(&req.lecturer_id)
            .bind(&req.department)
            .fetch_one(&mut **tx)
            .await
            .map_err(unique_violation("lecturer_id"))
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    /// find_credentials
    ///
    /// Matches the login against both `username` and `email`, skipping soft-deleted users.
    /// Inactive users are returned so the caller can answer 403 rather than 401.
    async fn find_credentials(&self, login: &str) -> AppResult<Option<UserCredentials>> {
        let query = format!(
            "SELECT {USER_COLUMNS}, password_hash FROM users \
             WHERE (username = $1 OR email = $1) AND deleted_at IS NULL"
        );
        let creds = sqlx::query_as::<_, UserCredentials>(&query)
            .bind(login)
            .fetch_optional(&self.pool)
            .await?;
        Ok(creds)
    }

    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL");
        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// list_users
    ///
    /// A `NULL` role filter matches every role.
    async fn list_users(&self, role_id: Option<Uuid>, page: Page) -> AppResult<(Vec<User>, i64)> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users \
             WHERE deleted_at IS NULL AND ($1::uuid IS NULL OR role_id = $1)",
        )
        .bind(role_id)
        .fetch_one(&self.pool)
        .await?;

        let query = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE deleted_at IS NULL AND ($1::uuid IS NULL OR role_id = $1) \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        );
        let users = sqlx::query_as::<_, User>(&query)
            .bind(role_id)
            .bind(page.limit)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;
        Ok((users, total))
    }

    async fn username_taken(&self, username: &str, except: Option<Uuid>) -> AppResult<bool> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = $1 AND ($2::uuid IS NULL OR id <> $2))",
        )
        .bind(username)
        .bind(except)
        .fetch_one(&self.pool)
        .await?;
        Ok(taken)
    }

    async fn email_taken(&self, email: &str, except: Option<Uuid>) -> AppResult<bool> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1 AND ($2::uuid IS NULL OR id <> $2))",
        )
        .bind(email)
        .bind(except)
        .fetch_one(&self.pool)
        .await?;
        Ok(taken)
    }

    /// create_user
    ///
    /// Inserts the user and, when given, its student or lecturer profile inside one
    /// transaction. A failed profile insert rolls the user back when `tx` drops.
    async fn create_user(
        &self,
        user: NewUser,
        profile: Option<NewProfile>,
    ) -> AppResult<CreatedAccount> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            "INSERT INTO users (id, username, email, password_hash, full_name, role_id) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {USER_COLUMNS}"
        );
        let created = sqlx::query_as::<_, User>(&query)
            .bind(Uuid::new_v4())
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.full_name)
            .bind(user.role_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(unique_violation("username or email"))?;

        let mut account = CreatedAccount {
            user: created,
            student: None,
            lecturer: None,
        };
        match profile {
            Some(NewProfile::Student(req)) => {
                account.student = Some(Self::insert_student(&mut tx, account.user.id, &req).await?);
            }
            Some(NewProfile::Lecturer(req)) => {
                account.lecturer =
                    Some(Self::insert_lecturer(&mut tx, account.user.id, &req).await?);
            }
            None => {}
        }

        tx.commit().await?;
        Ok(account)
    }

    /// update_user
    ///
    /// Uses `COALESCE` so only the fields present in `req` change.
    async fn update_user(&self, id: Uuid, req: UpdateUserRequest) -> AppResult<Option<User>> {
        let query = format!(
            "UPDATE users SET \
                username = COALESCE($2, username), \
                email = COALESCE($3, email), \
                full_name = COALESCE($4, full_name), \
                role_id = COALESCE($5, role_id), \
                is_active = COALESCE($6, is_active), \
                updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(req.username)
            .bind(req.email)
            .bind(req.full_name)
            .bind(req.role_id)
            .bind(req.is_active)
            .fetch_optional(&self.pool)
            .await
            .map_err(unique_violation("username or email"))?;
        Ok(user)
    }

    async fn soft_delete_user(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET deleted_at = NOW(), is_active = false, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn assign_role(&self, id: Uuid, role_id: Uuid) -> AppResult<Option<User>> {
        let query = format!(
            "UPDATE users SET role_id = $2, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(role_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn get_role(&self, id: Uuid) -> AppResult<Option<Role>> {
        let role = sqlx::query_as::<_, Role>("SELECT id, name, description FROM roles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(role)
    }

    async fn role_grants(&self) -> AppResult<Vec<RoleGrant>> {
        let grants = sqlx::query_as::<_, RoleGrant>(
            r#"
            SELECT r.id AS role_id, r.name AS role_name, p.name AS permission
            FROM roles r
            LEFT JOIN role_permissions rp ON rp.role_id = r.id
            LEFT JOIN permissions p ON p.id = rp.permission_id
            ORDER BY r.name, p.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(grants)
    }

    // --- Students ---

    async fn create_student(&self, user_id: Uuid, req: StudentProfileRequest) -> AppResult<Student> {
        let mut tx = self.pool.begin().await?;
        let student = Self::insert_student(&mut tx, user_id, &req).await?;
        tx.commit().await?;
        Ok(student)
    }

    async fn student_by_user(&self, user_id: Uuid) -> AppResult<Option<Student>> {
        let query = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE user_id = $1");
        let student = sqlx::query_as::<_, Student>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(student)
    }

    async fn get_student(&self, id: Uuid) -> AppResult<Option<Student>> {
        let query = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = $1");
        let student = sqlx::query_as::<_, Student>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(student)
    }

    async fn list_students(&self, page: Page) -> AppResult<(Vec<Student>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM students")
            .fetch_one(&self.pool)
            .await?;
        let query = format!(
            "SELECT {STUDENT_COLUMNS} FROM students ORDER BY student_id LIMIT $1 OFFSET $2"
        );
        let students = sqlx::query_as::<_, Student>(&query)
            .bind(page.limit)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;
        Ok((students, total))
    }

    async fn update_student(
        &self,
        id: Uuid,
        req: UpdateStudentRequest,
    ) -> AppResult<Option<Student>> {
        let query = format!(
            "UPDATE students SET \
                student_id = COALESCE($2, student_id), \
                program_study = COALESCE($3, program_study), \
                academic_year = COALESCE($4, academic_year) \
             WHERE id = $1 RETURNING {STUDENT_COLUMNS}"
        );
        let student = sqlx::query_as::<_, Student>(&query)
            .bind(id)
            .bind(req.student_id)
            .bind(req.program_study)
            .bind(req.academic_year)
            .fetch_optional(&self.pool)
            .await
            .map_err(unique_violation("student_id"))?;
        Ok(student)
    }

    async fn assign_advisor(&self, id: Uuid, advisor_id: Uuid) -> AppResult<Option<Student>> {
        let query =
            format!("UPDATE students SET advisor_id = $2 WHERE id = $1 RETURNING {STUDENT_COLUMNS}");
        let student = sqlx::query_as::<_, Student>(&query)
            .bind(id)
            .bind(advisor_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(student)
    }

    async fn list_advisees(&self, lecturer_id: Uuid) -> AppResult<Vec<Student>> {
        let query = format!(
            "SELECT {STUDENT_COLUMNS} FROM students WHERE advisor_id = $1 ORDER BY student_id"
        );
        let students = sqlx::query_as::<_, Student>(&query)
            .bind(lecturer_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(students)
    }

    // --- Lecturers ---

    async fn create_lecturer(
        &self,
        user_id: Uuid,
        req: LecturerProfileRequest,
    ) -> AppResult<Lecturer> {
        let mut tx = self.pool.begin().await?;
        let lecturer = Self::insert_lecturer(&mut tx, user_id, &req).await?;
        tx.commit().await?;
        Ok(lecturer)
    }

    async fn lecturer_by_user(&self, user_id: Uuid) -> AppResult<Option<Lecturer>> {
        let query = format!("SELECT {LECTURER_COLUMNS} FROM lecturers WHERE user_id = $1");
        let lecturer = sqlx::query_as::<_, Lecturer>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(lecturer)
    }

    async fn get_lecturer(&self, id: Uuid) -> AppResult<Option<Lecturer>> {
        let query = format!("SELECT {LECTURER_COLUMNS} FROM lecturers WHERE id = $1");
        let lecturer = sqlx::query_as::<_, Lecturer>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(lecturer)
    }

    async fn list_lecturers(&self, page: Page) -> AppResult<(Vec<Lecturer>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lecturers")
            .fetch_one(&self.pool)
            .await?;
        let query = format!(
            "SELECT {LECTURER_COLUMNS} FROM lecturers ORDER BY lecturer_id LIMIT $1 OFFSET $2"
        );
        let lecturers = sqlx::query_as::<_, Lecturer>(&query)
            .bind(page.limit)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;
        Ok((lecturers, total))
    }

    async fn update_lecturer(
        &self,
        id: Uuid,
        req: UpdateLecturerRequest,
    ) -> AppResult<Option<Lecturer>> {
        let query = format!(
            "UPDATE lecturers SET \
                lecturer_id = COALESCE($2, lecturer_id), \
                department = COALESCE($3, department) \
             WHERE id = $1 RETURNING {LECTURER_COLUMNS}"
        );
        let lecturer = sqlx::query_as::<_, Lecturer>(&query)
            .bind(id)
            .bind(req.lecturer_id)
            .bind(req.department)
            .fetch_optional(&self.pool)
            .await
            .map_err(unique_violation("lecturer_id"))?;
        Ok(lecturer)
    }
}
