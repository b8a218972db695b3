#![allow(dead_code)]

use alumni_portal::{
    AppState, create_router,
    auth::{self, TokenType},
    config::AppConfig,
    documents::{AchievementChanges, AchievementStore},
    error::{AppError, AppResult},
    models::{
        Achievement, AchievementReference, AchievementStats, AchievementStatus, CreatedAccount,
        Lecturer, LecturerProfileRequest, NewProfile, NewUser, Role, RoleGrant, Student,
        StudentProfileRequest, UpdateLecturerRequest, UpdateStudentRequest, UpdateUserRequest,
        User, UserCredentials,
    },
    permissions::{self, PermissionCache},
    references::{ReferenceScope, ReferenceStore},
    repository::Repository,
    response::Page,
    storage::MockStorageService,
};
use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use tower::ServiceExt;
use uuid::Uuid;

pub const ADMIN_ROLE: Uuid = Uuid::from_u128(1);
pub const LECTURER_ROLE: Uuid = Uuid::from_u128(2);
pub const STUDENT_ROLE: Uuid = Uuid::from_u128(3);

pub const BOUNDARY: &str = "alumni-test-boundary";

fn role_grants() -> Vec<RoleGrant> {
    let admin = [
        permissions::USERS_READ,
        permissions::USERS_CREATE,
        permissions::USERS_UPDATE,
        permissions::USERS_DELETE,
        permissions::USERS_MANAGE_ROLES,
        permissions::STUDENTS_READ,
        permissions::STUDENTS_MANAGE,
        permissions::LECTURERS_READ,
        permissions::LECTURERS_MANAGE,
        permissions::ACHIEVEMENTS_READ,
        permissions::ACHIEVEMENTS_VERIFY,
        permissions::REPORTS_READ,
    ];
    let lecturer = [
        permissions::STUDENTS_READ,
        permissions::LECTURERS_READ,
        permissions::ACHIEVEMENTS_READ,
        permissions::ACHIEVEMENTS_VERIFY,
        permissions::REPORTS_READ,
    ];
    let student = [
        permissions::ACHIEVEMENTS_CREATE,
        permissions::ACHIEVEMENTS_READ,
        permissions::ACHIEVEMENTS_UPDATE,
        permissions::ACHIEVEMENTS_DELETE,
        permissions::ACHIEVEMENTS_SUBMIT,
    ];

    let mut grants = Vec::new();
    for (role_id, name, list) in [
        (ADMIN_ROLE, permissions::ROLE_ADMIN, &admin[..]),
        (LECTURER_ROLE, permissions::ROLE_LECTURER, &lecturer[..]),
        (STUDENT_ROLE, permissions::ROLE_STUDENT, &student[..]),
    ] {
        for permission in list {
            grants.push(RoleGrant {
                role_id,
                role_name: name.to_string(),
                permission: Some(permission.to_string()),
            });
        }
    }
    grants
}

pub fn permission_cache() -> PermissionCache {
    PermissionCache::from_grants(role_grants())
}

fn paginate<T: Clone>(items: &[T], page: Page) -> (Vec<T>, i64) {
    let total = items.len() as i64;
    let slice = items
        .iter()
        .skip(page.offset() as usize)
        .take(page.limit as usize)
        .cloned()
        .collect();
    (slice, total)
}

// --- Relational credential store ---

#[derive(Clone)]
struct StoredUser {
    user: User,
    password_hash: String,
}

/// In-memory `Repository` seeded with the three roles. Students are shared with
/// [`InMemoryReferenceStore`] so advisor scopes resolve the same way the SQL join does.
#[derive(Default)]
pub struct MockRepository {
    users: Mutex<Vec<StoredUser>>,
    pub students: Arc<Mutex<Vec<Student>>>,
    lecturers: Mutex<Vec<Lecturer>>,
}

impl MockRepository {
    /// Inserts a user directly. The password is hashed only when one is given.
    pub fn add_user(&self, username: &str, role_id: Uuid, password: Option<&str>) -> User {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: format!("{username}@example.com"),
            full_name: username.to_uppercase(),
            role_id,
            is_active: true,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        let password_hash = match password {
            Some(password) => auth::hash_password(password).unwrap(),
            None => String::new(),
        };
        self.users.lock().unwrap().push(StoredUser {
            user: user.clone(),
            password_hash,
        });
        user
    }

    pub fn deactivate(&self, id: Uuid) {
        for stored in self.users.lock().unwrap().iter_mut() {
            if stored.user.id == id {
                stored.user.is_active = false;
            }
        }
    }

    pub fn add_student(&self, user_id: Uuid, advisor_id: Option<Uuid>) -> Student {
        let student = Student {
            id: Uuid::new_v4(),
            user_id,
            student_id: format!("S-{}", &user_id.simple().to_string()[..8]),
            program_study: "Informatics".to_string(),
            academic_year: "2021".to_string(),
            advisor_id,
            created_at: Utc::now(),
        };
        self.students.lock().unwrap().push(student.clone());
        student
    }

    pub fn add_lecturer(&self, user_id: Uuid) -> Lecturer {
        let lecturer = Lecturer {
            id: Uuid::new_v4(),
            user_id,
            lecturer_id: format!("L-{}", &user_id.simple().to_string()[..8]),
            department: "Computer Science".to_string(),
            created_at: Utc::now(),
        };
        self.lecturers.lock().unwrap().push(lecturer.clone());
        lecturer
    }

    fn live_users(&self) -> Vec<StoredUser> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.user.deleted_at.is_none())
            .cloned()
            .collect()
    }

    fn student_row(&self, user_id: Uuid, req: StudentProfileRequest) -> AppResult<Student> {
        let mut students = self.students.lock().unwrap();
        if students.iter().any(|s| s.student_id == req.student_id) {
            return Err(AppError::bad_request("student_id already exists"));
        }
        let student = Student {
            id: Uuid::new_v4(),
            user_id,
            student_id: req.student_id,
            program_study: req.program_study,
            academic_year: req.academic_year,
            advisor_id: None,
            created_at: Utc::now(),
        };
        students.push(student.clone());
        Ok(student)
    }

    fn lecturer_row(&self, user_id: Uuid, req: LecturerProfileRequest) -> AppResult<Lecturer> {
        let mut lecturers = self.lecturers.lock().unwrap();
        if lecturers.iter().any(|l| l.lecturer_id == req.lecturer_id) {
            return Err(AppError::bad_request("lecturer_id already exists"));
        }
        let lecturer = Lecturer {
            id: Uuid::new_v4(),
            user_id,
            lecturer_id: req.lecturer_id,
            department: req.department,
            created_at: Utc::now(),
        };
        lecturers.push(lecturer.clone());
        Ok(lecturer)
    }
}

#[async_trait]
impl Repository for MockRepository {
    async fn find_credentials(&self, login: &str) -> AppResult<Option<UserCredentials>> {
        Ok(self
            .live_users()
            .into_iter()
            .find(|s| s.user.username == login || s.user.email == login)
            .map(|s| UserCredentials {
                user: s.user,
                password_hash: s.password_hash,
            }))
    }

    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self
            .live_users()
            .into_iter()
            .find(|s| s.user.id == id)
            .map(|s| s.user))
    }

    async fn list_users(&self, role_id: Option<Uuid>, page: Page) -> AppResult<(Vec<User>, i64)> {
        let users: Vec<User> = self
            .live_users()
            .into_iter()
            .map(|s| s.user)
            .filter(|u| role_id.is_none_or(|r| u.role_id == r))
            .collect();
        Ok(paginate(&users, page))
    }

    async fn username_taken(&self, username: &str, except: Option<Uuid>) -> AppResult<bool> {
        Ok(self
            .live_users()
            .iter()
            .any(|s| s.user.username == username && Some(s.user.id) != except))
    }

    async fn email_taken(&self, email: &str, except: Option<Uuid>) -> AppResult<bool> {
        Ok(self
            .live_users()
            .iter()
            .any(|s| s.user.email == email && Some(s.user.id) != except))
    }

    async fn create_user(
        &self,
        user: NewUser,
        profile: Option<NewProfile>,
    ) -> AppResult<CreatedAccount> {
        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            role_id: user.role_id,
            is_active: true,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        let mut account = CreatedAccount {
            user: created.clone(),
            student: None,
            lecturer: None,
        };
        match profile {
            Some(NewProfile::Student(req)) => {
                account.student = Some(self.student_row(created.id, req)?);
            }
            Some(NewProfile::Lecturer(req)) => {
                account.lecturer = Some(self.lecturer_row(created.id, req)?);
            }
            None => {}
        }
        self.users.lock().unwrap().push(StoredUser {
            user: created,
            password_hash: user.password_hash,
        });
        Ok(account)
    }

    async fn update_user(&self, id: Uuid, req: UpdateUserRequest) -> AppResult<Option<User>> {
        let mut users = self.users.lock().unwrap();
        let Some(stored) = users
            .iter_mut()
            .find(|s| s.user.id == id && s.user.deleted_at.is_none())
        else {
            return Ok(None);
        };
        let user = &mut stored.user;
        if let Some(username) = req.username {
            user.username = username;
        }
        if let Some(email) = req.email {
            user.email = email;
        }
        if let Some(full_name) = req.full_name {
            user.full_name = full_name;
        }
        if let Some(role_id) = req.role_id {
            user.role_id = role_id;
        }
        if let Some(is_active) = req.is_active {
            user.is_active = is_active;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn soft_delete_user(&self, id: Uuid) -> AppResult<bool> {
        let mut users = self.users.lock().unwrap();
        match users
            .iter_mut()
            .find(|s| s.user.id == id && s.user.deleted_at.is_none())
        {
            Some(stored) => {
                stored.user.deleted_at = Some(Utc::now());
                stored.user.is_active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn assign_role(&self, id: Uuid, role_id: Uuid) -> AppResult<Option<User>> {
        self.update_user(
            id,
            UpdateUserRequest {
                role_id: Some(role_id),
                ..Default::default()
            },
        )
        .await
    }

    async fn get_role(&self, id: Uuid) -> AppResult<Option<Role>> {
        let name = [
            (ADMIN_ROLE, permissions::ROLE_ADMIN),
            (LECTURER_ROLE, permissions::ROLE_LECTURER),
            (STUDENT_ROLE, permissions::ROLE_STUDENT),
        ]
        .into_iter()
        .find(|(role_id, _)| *role_id == id)
        .map(|(_, name)| name);
        Ok(name.map(|name| Role {
            id,
            name: name.to_string(),
            description: None,
        }))
    }

    async fn role_grants(&self) -> AppResult<Vec<RoleGrant>> {
        Ok(role_grants())
    }

    async fn create_student(&self, user_id: Uuid, req: StudentProfileRequest) -> AppResult<Student> {
        self.student_row(user_id, req)
    }

    async fn student_by_user(&self, user_id: Uuid) -> AppResult<Option<Student>> {
        Ok(self
            .students
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.user_id == user_id)
            .cloned())
    }

    async fn get_student(&self, id: Uuid) -> AppResult<Option<Student>> {
        Ok(self
            .students
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }

    async fn list_students(&self, page: Page) -> AppResult<(Vec<Student>, i64)> {
        Ok(paginate(&self.students.lock().unwrap()[..], page))
    }

    async fn update_student(
        &self,
        id: Uuid,
        req: UpdateStudentRequest,
    ) -> AppResult<Option<Student>> {
        let mut students = self.students.lock().unwrap();
        let Some(student) = students.iter_mut().find(|s| s.id == id) else {
            return Ok(None);
        };
        if let Some(student_id) = req.student_id {
            student.student_id = student_id;
        }
        if let Some(program_study) = req.program_study {
            student.program_study = program_study;
        }
        if let Some(academic_year) = req.academic_year {
            student.academic_year = academic_year;
        }
        Ok(Some(student.clone()))
    }

    async fn assign_advisor(&self, id: Uuid, advisor_id: Uuid) -> AppResult<Option<Student>> {
        let mut students = self.students.lock().unwrap();
        Ok(students.iter_mut().find(|s| s.id == id).map(|student| {
            student.advisor_id = Some(advisor_id);
            student.clone()
        }))
    }

    async fn list_advisees(&self, lecturer_id: Uuid) -> AppResult<Vec<Student>> {
        Ok(self
            .students
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.advisor_id == Some(lecturer_id))
            .cloned()
            .collect())
    }

    async fn create_lecturer(
        &self,
        user_id: Uuid,
        req: LecturerProfileRequest,
    ) -> AppResult<Lecturer> {
        self.lecturer_row(user_id, req)
    }

    async fn lecturer_by_user(&self, user_id: Uuid) -> AppResult<Option<Lecturer>> {
        Ok(self
            .lecturers
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.user_id == user_id)
            .cloned())
    }

    async fn get_lecturer(&self, id: Uuid) -> AppResult<Option<Lecturer>> {
        Ok(self
            .lecturers
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.id == id)
            .cloned())
    }

    async fn list_lecturers(&self, page: Page) -> AppResult<(Vec<Lecturer>, i64)> {
        Ok(paginate(&self.lecturers.lock().unwrap()[..], page))
    }

    async fn update_lecturer(
        &self,
        id: Uuid,
        req: UpdateLecturerRequest,
    ) -> AppResult<Option<Lecturer>> {
        let mut lecturers = self.lecturers.lock().unwrap();
        let Some(lecturer) = lecturers.iter_mut().find(|l| l.id == id) else {
            return Ok(None);
        };
        if let Some(lecturer_id) = req.lecturer_id {
            lecturer.lecturer_id = lecturer_id;
        }
        if let Some(department) = req.department {
            lecturer.department = department;
        }
        Ok(Some(lecturer.clone()))
    }
}

// --- Document store ---

/// In-memory `AchievementStore` with the same conditional-write semantics as the
/// Mongo filters. `fail_insert` and `fail_transitions` inject driver errors.
#[derive(Default)]
pub struct InMemoryAchievementStore {
    records: Mutex<HashMap<String, Achievement>>,
    pub fail_insert: AtomicBool,
    pub fail_transitions: AtomicBool,
}

impl InMemoryAchievementStore {
    /// The stored record, including soft-deleted ones.
    pub fn raw(&self, achievement_id: &str) -> Option<Achievement> {
        self.records.lock().unwrap().get(achievement_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Overwrites a status behind the workflow's back, as a concurrent request would.
    pub fn force_status(&self, achievement_id: &str, status: AchievementStatus) {
        if let Some(record) = self.records.lock().unwrap().get_mut(achievement_id) {
            record.status = status;
        }
    }
}

#[async_trait]
impl AchievementStore for InMemoryAchievementStore {
    async fn insert(&self, achievement: &Achievement) -> AppResult<()> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(AppError::internal("document store unavailable"));
        }
        self.records
            .lock()
            .unwrap()
            .insert(achievement.achievement_id.clone(), achievement.clone());
        Ok(())
    }

    async fn find(&self, achievement_id: &str) -> AppResult<Option<Achievement>> {
        Ok(self.raw(achievement_id).filter(|a| !a.is_deleted))
    }

    async fn find_many(&self, achievement_ids: &[String]) -> AppResult<Vec<Achievement>> {
        let records = self.records.lock().unwrap();
        Ok(achievement_ids
            .iter()
            .filter_map(|id| records.get(id))
            .filter(|a| !a.is_deleted)
            .cloned()
            .collect())
    }

    async fn update_details(
        &self,
        achievement_id: &str,
        changes: AchievementChanges,
    ) -> AppResult<Option<Achievement>> {
        let mut records = self.records.lock().unwrap();
        let Some(record) = records
            .get_mut(achievement_id)
            .filter(|a| !a.is_deleted && a.status == AchievementStatus::Draft)
        else {
            return Ok(None);
        };
        if let Some(title) = changes.title {
            record.title = title;
        }
        if let Some(category) = changes.category {
            record.category = category;
        }
        if let Some(level) = changes.level {
            record.level = level;
        }
        if let Some(description) = changes.description {
            record.description = description;
        }
        if let Some(date) = changes.date {
            record.date = date;
        }
        record.updated_at = Utc::now();
        Ok(Some(record.clone()))
    }

    async fn transition(
        &self,
        achievement_id: &str,
        from: AchievementStatus,
        to: AchievementStatus,
    ) -> AppResult<bool> {
        if self.fail_transitions.load(Ordering::SeqCst) {
            return Err(AppError::internal("document store unavailable"));
        }
        let mut records = self.records.lock().unwrap();
        match records
            .get_mut(achievement_id)
            .filter(|a| !a.is_deleted && a.status == from)
        {
            Some(record) => {
                record.status = to;
                record.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_deleted(&self, achievement_id: &str, deleted: bool) -> AppResult<bool> {
        let mut records = self.records.lock().unwrap();
        let matched = records.get_mut(achievement_id).filter(|a| {
            if deleted {
                !a.is_deleted && a.status == AchievementStatus::Draft
            } else {
                a.is_deleted
            }
        });
        match matched {
            Some(record) => {
                record.is_deleted = deleted;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove(&self, achievement_id: &str) -> AppResult<()> {
        self.records.lock().unwrap().remove(achievement_id);
        Ok(())
    }
}

// --- Relational references ---

/// In-memory `ReferenceStore`. `fail_create`, `fail_marks` and `fail_soft_delete` inject
/// errors; `stale_marks` makes every status write match nothing.
#[derive(Default)]
pub struct InMemoryReferenceStore {
    rows: Mutex<Vec<AchievementReference>>,
    students: Arc<Mutex<Vec<Student>>>,
    pub fail_create: AtomicBool,
    pub fail_marks: AtomicBool,
    pub stale_marks: AtomicBool,
    pub fail_soft_delete: AtomicBool,
}

impl InMemoryReferenceStore {
    pub fn new(students: Arc<Mutex<Vec<Student>>>) -> Self {
        Self {
            students,
            ..Self::default()
        }
    }

    pub fn row(&self, achievement_id: &str) -> Option<AchievementReference> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.mongo_achievement_id == achievement_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    fn in_scope(&self, scope: ReferenceScope, row: &AchievementReference) -> bool {
        match scope {
            ReferenceScope::All => true,
            ReferenceScope::Student(id) => row.student_id == id,
            ReferenceScope::Advisor(lecturer) => self
                .students
                .lock()
                .unwrap()
                .iter()
                .any(|s| s.id == row.student_id && s.advisor_id == Some(lecturer)),
        }
    }

    fn visible(&self, scope: ReferenceScope) -> Vec<AchievementReference> {
        let mut rows: Vec<AchievementReference> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| !r.is_deleted)
            .cloned()
            .collect();
        rows.retain(|r| self.in_scope(scope, r));
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows
    }

    fn mark(
        &self,
        achievement_id: &str,
        from: AchievementStatus,
        apply: impl FnOnce(&mut AchievementReference),
    ) -> AppResult<bool> {
        if self.fail_marks.load(Ordering::SeqCst) {
            return Err(AppError::internal("relational store unavailable"));
        }
        if self.stale_marks.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let mut rows = self.rows.lock().unwrap();
        match rows
            .iter_mut()
            .find(|r| r.mongo_achievement_id == achievement_id && !r.is_deleted && r.status == from)
        {
            Some(row) => {
                apply(row);
                row.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl ReferenceStore for InMemoryReferenceStore {
    async fn create(
        &self,
        student_id: Uuid,
        achievement_id: &str,
    ) -> AppResult<AchievementReference> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(AppError::internal("relational store unavailable"));
        }
        let now = Utc::now();
        let row = AchievementReference {
            id: Uuid::new_v4(),
            student_id,
            mongo_achievement_id: achievement_id.to_string(),
            status: AchievementStatus::Draft,
            submitted_at: None,
            verified_at: None,
            verified_by: None,
            rejection_note: None,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        self.rows.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn find_by_achievement(
        &self,
        achievement_id: &str,
    ) -> AppResult<Option<AchievementReference>> {
        Ok(self.row(achievement_id).filter(|r| !r.is_deleted))
    }

    async fn list(
        &self,
        scope: ReferenceScope,
        status: Option<AchievementStatus>,
        page: Page,
    ) -> AppResult<(Vec<AchievementReference>, i64)> {
        let rows: Vec<AchievementReference> = self
            .visible(scope)
            .into_iter()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .collect();
        Ok(paginate(&rows, page))
    }

    async fn mark_submitted(&self, achievement_id: &str) -> AppResult<bool> {
        self.mark(achievement_id, AchievementStatus::Draft, |row| {
            row.status = AchievementStatus::Submitted;
            row.submitted_at = Some(Utc::now());
        })
    }

    async fn mark_verified(&self, achievement_id: &str, verifier: Uuid) -> AppResult<bool> {
        self.mark(achievement_id, AchievementStatus::Submitted, |row| {
            row.status = AchievementStatus::Verified;
            row.verified_at = Some(Utc::now());
            row.verified_by = Some(verifier);
        })
    }

    async fn mark_rejected(
        &self,
        achievement_id: &str,
        verifier: Uuid,
        note: &str,
    ) -> AppResult<bool> {
        self.mark(achievement_id, AchievementStatus::Submitted, |row| {
            row.status = AchievementStatus::Rejected;
            row.verified_at = Some(Utc::now());
            row.verified_by = Some(verifier);
            row.rejection_note = Some(note.to_string());
        })
    }

    async fn soft_delete(&self, achievement_id: &str) -> AppResult<bool> {
        if self.fail_soft_delete.load(Ordering::SeqCst) {
            return Err(AppError::internal("relational store unavailable"));
        }
        let mut rows = self.rows.lock().unwrap();
        match rows.iter_mut().find(|r| {
            r.mongo_achievement_id == achievement_id
                && !r.is_deleted
                && r.status == AchievementStatus::Draft
        }) {
            Some(row) => {
                row.is_deleted = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn status_counts(&self, scope: ReferenceScope) -> AppResult<AchievementStats> {
        let mut counts: HashMap<AchievementStatus, i64> = HashMap::new();
        for row in self.visible(scope) {
            *counts.entry(row.status).or_default() += 1;
        }
        Ok(alumni_portal::references::tally(counts))
    }
}

// --- Application scaffolding ---

/// Every store behind one `AppState`, each still reachable for assertions.
pub struct TestApp {
    pub state: AppState,
    pub repo: Arc<MockRepository>,
    pub achievements: Arc<InMemoryAchievementStore>,
    pub references: Arc<InMemoryReferenceStore>,
    pub storage: MockStorageService,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with(AppConfig::default(), MockStorageService::new())
    }

    pub fn with(config: AppConfig, storage: MockStorageService) -> Self {
        let repo = Arc::new(MockRepository::default());
        let achievements = Arc::new(InMemoryAchievementStore::default());
        let references = Arc::new(InMemoryReferenceStore::new(repo.students.clone()));
        let state = AppState::new(
            repo.clone(),
            achievements.clone(),
            references.clone(),
            Arc::new(storage.clone()),
            Arc::new(permission_cache()),
            config,
        );
        Self {
            state,
            repo,
            achievements,
            references,
            storage,
        }
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// `Authorization` header value carrying a fresh access token for `user`.
    pub fn bearer(&self, user: &User) -> String {
        let role = self
            .state
            .permissions
            .role_name(user.role_id)
            .unwrap_or_default()
            .to_string();
        let (token, _) =
            auth::issue_token(&self.state.config, user, &role, TokenType::Access).unwrap();
        format!("Bearer {token}")
    }
}

/// A student account with a profile, optionally advised by `advisor`.
pub fn student(app: &TestApp, name: &str, advisor: Option<Uuid>) -> (User, Student) {
    let user = app.repo.add_user(name, STUDENT_ROLE, None);
    let student = app.repo.add_student(user.id, advisor);
    (user, student)
}

pub fn lecturer(app: &TestApp, name: &str) -> (User, Lecturer) {
    let user = app.repo.add_user(name, LECTURER_ROLE, None);
    let lecturer = app.repo.add_lecturer(user.id);
    (user, lecturer)
}

pub fn admin(app: &TestApp) -> User {
    app.repo.add_user("admin", ADMIN_ROLE, None)
}

// --- HTTP helpers ---

/// A `multipart/form-data` body: text fields first, then `(filename, content_type, bytes)`
/// parts under the `documents` name.
pub fn multipart_body(fields: &[(&str, &str)], files: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    for (filename, content_type, bytes) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"documents\"; \
                 filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn json_request(method: &str, uri: &str, auth: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(auth) = auth {
        builder = builder.header("authorization", auth);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn empty_request(method: &str, uri: &str, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        builder = builder.header("authorization", auth);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn multipart_request(uri: &str, auth: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("authorization", auth)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Sends one request through the router and decodes the JSON envelope.
pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}
