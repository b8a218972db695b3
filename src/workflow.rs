use chrono::{NaiveDate, Utc};
use std::future::Future;
use uuid::Uuid;

use crate::{
    documents::{AchievementChanges, AchievementState},
    error::{AppError, AppResult},
    models::{Achievement, AchievementStatus, AttachedDocument, UpdateAchievementRequest},
    references::ReferenceState,
    storage::{StorageState, attachment_key},
};

/// MIME types accepted as achievement attachments.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "image/jpeg",
    "image/png",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// One file part of a submit request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// The fields of a submit request as received; nothing is validated yet.
#[derive(Debug, Clone, Default)]
pub struct NewAchievement {
    pub title: String,
    pub category: String,
    pub level: String,
    pub date: String,
    pub description: String,
    pub documents: Vec<UploadedFile>,
}

/// Size and type limits for attachments.
#[derive(Debug, Clone, Copy)]
pub struct UploadPolicy {
    pub max_bytes: usize,
}

impl UploadPolicy {
    pub fn check(&self, file: &UploadedFile) -> AppResult<()> {
        if !ALLOWED_MIME_TYPES.contains(&file.content_type.as_str()) {
            return Err(AppError::bad_request(format!(
                "{}: file type {} is not allowed",
                file.filename, file.content_type
            )));
        }
        if file.bytes.is_empty() {
            return Err(AppError::bad_request(format!("{}: file is empty", file.filename)));
        }
        if file.bytes.len() > self.max_bytes {
            return Err(AppError::bad_request(format!(
                "{}: file exceeds the {} byte limit",
                file.filename, self.max_bytes
            )));
        }
        Ok(())
    }
}

/// Parses a `YYYY-MM-DD` calendar date.
pub fn parse_date(value: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::bad_request("date must be formatted as YYYY-MM-DD"))
}

fn required(field: &str, value: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::bad_request(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn not_blank(field: &str, value: Option<String>) -> AppResult<Option<String>> {
    value.map(|v| required(field, &v)).transpose()
}

/// AchievementWorkflow
///
/// Drives an achievement through draft → submitted → verified/rejected across the
/// document store and the relational reference table. There is no cross-store
/// transaction: the document is written first, the reference second, and a failed
/// second write is undone on the first store with one best-effort attempt. Failures of
/// that undo are logged and never replace the original error.
///
/// Every transition is a conditional write on the expected status. A write that matches
/// nothing means another request moved the record first and yields 409.
#[derive(Clone)]
pub struct AchievementWorkflow {
    achievements: AchievementState,
    references: ReferenceState,
    storage: StorageState,
    policy: UploadPolicy,
}

impl AchievementWorkflow {
    pub fn new(
        achievements: AchievementState,
        references: ReferenceState,
        storage: StorageState,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            achievements,
            references,
            storage,
            policy: UploadPolicy {
                max_bytes: max_upload_bytes,
            },
        }
    }

    /// Fetches a live achievement or 404.
    pub async fn load(&self, achievement_id: &str) -> AppResult<Achievement> {
        self.achievements
            .find(achievement_id)
            .await?
            .ok_or_else(|| AppError::not_found("achievement not found"))
    }

    async fn load_owned(&self, owner: Uuid, achievement_id: &str) -> AppResult<Achievement> {
        let achievement = self.load(achievement_id).await?;
        if achievement.student_id != owner.to_string() {
            return Err(AppError::forbidden("only the owner may modify this achievement"));
        }
        Ok(achievement)
    }

    /// submit
    ///
    /// Creates a draft owned by the student profile `owner`. Validation happens before any
    /// write; after that, files go to object storage, then the document, then the
    /// reference. Each failure removes what the earlier steps stored.
    pub async fn submit(&self, owner: Uuid, input: NewAchievement) -> AppResult<Achievement> {
        let title = required("title", &input.title)?;
        let category = required("category", &input.category)?;
        let level = required("level", &input.level)?;
        let date = parse_date(&required("date", &input.date)?)?;
        for file in &input.documents {
            self.policy.check(file)?;
        }

        let achievement_id = Uuid::new_v4().to_string();
        let student_id = owner.to_string();

        let mut stored: Vec<AttachedDocument> = Vec::with_capacity(input.documents.len());
        for (index, file) in input.documents.into_iter().enumerate() {
            let key = attachment_key(&student_id, &achievement_id, index, &file.filename);
            let size = file.bytes.len() as i64;
            if let Err(e) = self
                .storage
                .put_object(&key, file.bytes, &file.content_type)
                .await
            {
                self.discard_files(&stored).await;
                return Err(e.into());
            }
            stored.push(AttachedDocument {
                filename: file.filename,
                path: key,
                size,
                mimetype: file.content_type,
                uploaded_at: Utc::now(),
            });
        }

        let now = Utc::now();
        let achievement = Achievement {
            achievement_id: achievement_id.clone(),
            student_id,
            title,
            category,
            level,
            date,
            description: input.description.trim().to_string(),
            documents: stored,
            status: AchievementStatus::Draft,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.achievements.insert(&achievement).await {
            self.discard_files(&achievement.documents).await;
            return Err(e);
        }

        if let Err(e) = self.references.create(owner, &achievement_id).await {
            if let Err(undo) = self.achievements.remove(&achievement_id).await {
                tracing::warn!(
                    achievement_id = %achievement_id,
                    error = %undo,
                    "orphaned achievement document after failed reference write"
                );
            }
            self.discard_files(&achievement.documents).await;
            return Err(e);
        }

        tracing::info!(achievement_id = %achievement_id, student_id = %owner, "achievement drafted");
        Ok(achievement)
    }

    /// update
    ///
    /// Edits the descriptive fields of the owner's draft. Only the document changes.
    pub async fn update(
        &self,
        owner: Uuid,
        achievement_id: &str,
        req: UpdateAchievementRequest,
    ) -> AppResult<Achievement> {
        let changes = AchievementChanges {
            title: not_blank("title", req.title)?,
            category: not_blank("category", req.category)?,
            level: not_blank("level", req.level)?,
            description: req.description.map(|d| d.trim().to_string()),
            date: req.date.as_deref().map(parse_date).transpose()?,
        };

        let achievement = self.load_owned(owner, achievement_id).await?;
        if achievement.status != AchievementStatus::Draft {
            return Err(AppError::bad_request("only draft achievements can be edited"));
        }

        self.achievements
            .update_details(achievement_id, changes)
            .await?
            .ok_or_else(|| AppError::conflict("achievement changed concurrently"))
    }

    /// submit_for_verification
    ///
    /// draft → submitted on the owner's request.
    pub async fn submit_for_verification(
        &self,
        owner: Uuid,
        achievement_id: &str,
    ) -> AppResult<Achievement> {
        let mut achievement = self.load_owned(owner, achievement_id).await?;
        if achievement.status != AchievementStatus::Draft {
            return Err(AppError::bad_request(format!(
                "achievement is {}, only drafts can be submitted for verification",
                achievement.status
            )));
        }

        self.mirror(
            achievement_id,
            AchievementStatus::Draft,
            AchievementStatus::Submitted,
            self.references.mark_submitted(achievement_id),
        )
        .await?;

        achievement.status = AchievementStatus::Submitted;
        achievement.updated_at = Utc::now();
        Ok(achievement)
    }

    /// approve
    ///
    /// submitted → verified. The caller has already established that `verifier` may review
    /// this achievement.
    pub async fn approve(&self, verifier: Uuid, achievement_id: &str) -> AppResult<Achievement> {
        let mut achievement = self.load_submitted(achievement_id).await?;

        self.mirror(
            achievement_id,
            AchievementStatus::Submitted,
            AchievementStatus::Verified,
            self.references.mark_verified(achievement_id, verifier),
        )
        .await?;

        tracing::info!(achievement_id, verifier = %verifier, "achievement verified");
        achievement.status = AchievementStatus::Verified;
        achievement.updated_at = Utc::now();
        Ok(achievement)
    }

    /// reject
    ///
    /// submitted → rejected. A blank or missing note is refused before anything is read.
    pub async fn reject(
        &self,
        verifier: Uuid,
        achievement_id: &str,
        note: Option<String>,
    ) -> AppResult<Achievement> {
        let note = note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| AppError::bad_request("rejection_note is required"))?;

        let mut achievement = self.load_submitted(achievement_id).await?;

        self.mirror(
            achievement_id,
            AchievementStatus::Submitted,
            AchievementStatus::Rejected,
            self.references.mark_rejected(achievement_id, verifier, &note),
        )
        .await?;

        tracing::info!(achievement_id, verifier = %verifier, "achievement rejected");
        achievement.status = AchievementStatus::Rejected;
        achievement.updated_at = Utc::now();
        Ok(achievement)
    }

    /// delete
    ///
    /// Soft-deletes the owner's draft on both stores, document first. Attachments are
    /// removed only once both flags are set.
    pub async fn delete(&self, owner: Uuid, achievement_id: &str) -> AppResult<()> {
        let achievement = self.load_owned(owner, achievement_id).await?;
        if achievement.status != AchievementStatus::Draft {
            return Err(AppError::bad_request("only draft achievements can be deleted"));
        }

        if !self.achievements.set_deleted(achievement_id, true).await? {
            return Err(AppError::conflict("achievement changed concurrently"));
        }

        let outcome = self.references.soft_delete(achievement_id).await;
        if !matches!(outcome, Ok(true)) {
            match self.achievements.set_deleted(achievement_id, false).await {
                Ok(true) => {}
                Ok(false) => tracing::warn!(achievement_id, "restore matched no document"),
                Err(e) => tracing::warn!(achievement_id, error = %e, "failed to restore document"),
            }
            return match outcome {
                Err(e) => Err(e),
                _ => Err(AppError::conflict("achievement changed concurrently")),
            };
        }

        self.discard_files(&achievement.documents).await;
        tracing::info!(achievement_id, "achievement deleted");
        Ok(())
    }

    async fn load_submitted(&self, achievement_id: &str) -> AppResult<Achievement> {
        let achievement = self.load(achievement_id).await?;
        if achievement.status != AchievementStatus::Submitted {
            return Err(AppError::bad_request(format!(
                "achievement is {}, only submitted achievements can be reviewed",
                achievement.status
            )));
        }
        Ok(achievement)
    }

    /// Applies `from → to` on the document, then runs the matching relational write.
    /// If that write fails or matches nothing, the document goes back to `from`.
    async fn mirror<F>(
        &self,
        achievement_id: &str,
        from: AchievementStatus,
        to: AchievementStatus,
        relational: F,
    ) -> AppResult<()>
    where
        F: Future<Output = AppResult<bool>> + Send,
    {
        if !self.achievements.transition(achievement_id, from, to).await? {
            return Err(AppError::conflict("achievement changed concurrently"));
        }

        let error = match relational.await {
            Ok(true) => return Ok(()),
            Ok(false) => AppError::conflict("achievement changed concurrently"),
            Err(e) => e,
        };

        match self.achievements.transition(achievement_id, to, from).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(achievement_id, %from, %to, "revert matched no document"),
            Err(e) => tracing::warn!(achievement_id, %from, %to, error = %e, "failed to revert document status"),
        }
        Err(error)
    }

    async fn discard_files(&self, documents: &[AttachedDocument]) {
        for document in documents {
            if let Err(e) = self.storage.delete_object(&document.path).await {
                tracing::warn!(key = %document.path, error = %e, "failed to delete attachment");
            }
        }
    }
}
