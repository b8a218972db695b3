use alumni_portal::{
    error::AppError,
    models::{
        Achievement, AchievementStatus, CreateUserRequest, LoginRequest, UpdateAchievementRequest,
    },
    response::{ApiResponse, Page, Paginated},
};
use axum::{http::StatusCode, response::IntoResponse};
use chrono::{NaiveDate, Utc};
use serde_json::{Value, json};

// --- Status wire format ---

#[test]
fn test_status_is_lowercase_on_the_wire() {
    assert_eq!(
        serde_json::to_value(AchievementStatus::Submitted).unwrap(),
        json!("submitted")
    );
    let parsed: AchievementStatus = serde_json::from_value(json!("rejected")).unwrap();
    assert_eq!(parsed, AchievementStatus::Rejected);
    assert!(serde_json::from_value::<AchievementStatus>(json!("Verified")).is_err());
    assert_eq!(AchievementStatus::Draft.to_string(), "draft");
}

#[test]
fn test_achievement_document_shape() {
    let now = Utc::now();
    let achievement = Achievement {
        achievement_id: "a-1".to_string(),
        student_id: "s-1".to_string(),
        title: "Paper accepted".to_string(),
        category: "publication".to_string(),
        level: "international".to_string(),
        date: NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
        description: String::new(),
        documents: vec![],
        status: AchievementStatus::Draft,
        is_deleted: false,
        created_at: now,
        updated_at: now,
    };

    let value = serde_json::to_value(&achievement).unwrap();
    assert_eq!(value["date"], "2025-01-31");
    assert_eq!(value["status"], "draft");
    assert_eq!(value["achievement_id"], "a-1");
}

#[test]
fn test_stored_documents_default_optional_fields() {
    // Older records may lack description, documents or the delete flag.
    let value = json!({
        "achievement_id": "a-2",
        "student_id": "s-1",
        "title": "Scholarship",
        "category": "award",
        "level": "national",
        "date": "2024-09-01",
        "status": "verified",
        "created_at": "2024-09-01T00:00:00Z",
        "updated_at": "2024-09-02T00:00:00Z"
    });
    let achievement: Achievement = serde_json::from_value(value).unwrap();
    assert!(achievement.documents.is_empty());
    assert!(!achievement.is_deleted);
    assert_eq!(achievement.description, "");
}

// --- Request payloads ---

#[test]
fn test_missing_required_fields_deserialize_as_empty() {
    let login: LoginRequest = serde_json::from_value(json!({"username": "jdoe"})).unwrap();
    assert_eq!(login.password, "");

    let create: CreateUserRequest = serde_json::from_value(json!({})).unwrap();
    assert!(create.username.is_empty());
    assert!(create.role_id.is_none());

    let update: UpdateAchievementRequest =
        serde_json::from_value(json!({"title": "New"})).unwrap();
    assert_eq!(update.title.as_deref(), Some("New"));
    assert!(update.date.is_none());
}

// --- Envelope ---

#[test]
fn test_success_envelope_omits_empty_data() {
    let value = serde_json::to_value(ApiResponse::message("logout successful")).unwrap();
    assert_eq!(value, json!({"status": "success", "message": "logout successful"}));

    let value = serde_json::to_value(ApiResponse::success("ok", 5)).unwrap();
    assert_eq!(value["data"], 5);
}

#[test]
fn test_paginated_metadata() {
    let page = Page { page: 3, limit: 4 };
    let value = serde_json::to_value(Paginated::new(vec![1, 2], page, 10)).unwrap();
    assert_eq!(
        value["pagination"],
        json!({"page": 3, "limit": 4, "total_items": 10, "total_pages": 3})
    );

    let empty = serde_json::to_value(Paginated::<i32>::new(vec![], Page::default(), 0)).unwrap();
    assert_eq!(empty["pagination"]["total_pages"], 0);
}

#[tokio::test]
async fn test_error_envelope() {
    let response = AppError::forbidden("missing permission: users.read").into_response();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(
        body,
        json!({"status": "error", "message": "missing permission: users.read"})
    );
}
