use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Student,
    Teacher,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Student, Role::Teacher];

    pub fn is_admin(self) -> bool {
        match self {
            Role::Admin => true,
            Role::Student | Role::Teacher => false,
        }
    }

    pub fn is_student(self) -> bool {
        match self {
            Role::Student => true,
            Role::Admin | Role::Teacher => false,
        }
    }

    pub fn is_teacher(self) -> bool {
        match self {
            Role::Teacher => true,
            Role::Admin | Role::Student => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFile {
    pub id: i64,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub role_type: Role,
    #[serde(default)]
    pub profile_image: Option<MediaFile>,
}

impl User {
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContestCycle {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HomeworkKind {
    /// Students hand in files.
    Deliverable,
    /// Reading or practice with nothing to hand in.
    Informative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Homework {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub kind: HomeworkKind,
    #[serde(default)]
    pub contest_cycle: Option<ContestCycle>,
}

impl Homework {
    pub fn requires_deliverables(&self) -> bool {
        match self.kind {
            HomeworkKind::Deliverable => true,
            HomeworkKind::Informative => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeworkAttempt {
    pub id: i64,
    #[serde(default)]
    pub homework: Option<Homework>,
    #[serde(default)]
    pub contest_cycle: Option<ContestCycle>,
    #[serde(default)]
    pub delivered_files: Vec<MediaFile>,
    #[serde(default)]
    pub grade: Option<f64>,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A file read into memory, ready for a multipart upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    pub async fn read(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        Ok(Self { name, bytes })
    }

    pub fn mime_type(&self) -> String {
        mime_guess::from_path(&self.name)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }
}

#[derive(Debug, Clone)]
pub struct NewHomeworkAttempt {
    pub user: i64,
    pub homework: i64,
    pub contest_cycle: i64,
    pub files: Vec<UploadFile>,
}

/// Files are on the server but the attempt record does not exist yet.
///
/// Only [`upload_attempt_files`](crate::homework::upload_attempt_files)
/// produces one, so the file ids always come from a real upload:
///
/// ```compile_fail
/// use olympiad_client::models::PendingHomeworkAttempt;
///
/// let forged = PendingHomeworkAttempt {
///     user: 1,
///     homework: 1,
///     contest_cycle: 1,
///     uploaded: vec![],
/// };
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PendingHomeworkAttempt {
    user: i64,
    homework: i64,
    contest_cycle: i64,
    uploaded: Vec<MediaFile>,
}

impl PendingHomeworkAttempt {
    pub(crate) fn new(
        user: i64,
        homework: i64,
        contest_cycle: i64,
        uploaded: Vec<MediaFile>,
    ) -> Self {
        Self {
            user,
            homework,
            contest_cycle,
            uploaded,
        }
    }

    pub fn user(&self) -> i64 {
        self.user
    }

    pub fn homework(&self) -> i64 {
        self.homework
    }

    pub fn contest_cycle(&self) -> i64 {
        self.contest_cycle
    }

    pub fn uploaded(&self) -> &[MediaFile] {
        &self.uploaded
    }

    pub fn delivered_file_ids(&self) -> Vec<i64> {
        self.uploaded.iter().map(|f| f.id).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub pinned: bool,
    pub initial_date: DateTime<Utc>,
    pub final_date: DateTime<Utc>,
    #[serde(default)]
    pub contest_cycle: Option<ContestCycle>,
}

/// Display shape of a notification, with the contest cycle reduced to its name.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationView {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub priority: i32,
    pub pinned: bool,
    pub initial_date: DateTime<Utc>,
    pub final_date: DateTime<Utc>,
    pub contest_cycle: String,
}

impl From<Notification> for NotificationView {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id,
            title: n.title,
            content: n.content.unwrap_or_default(),
            priority: n.priority,
            pinned: n.pinned,
            initial_date: n.initial_date,
            final_date: n.final_date,
            contest_cycle: n.contest_cycle.map(|c| c.name).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    RadioGroup,
    Checkbox,
    Dropdown,
    FreeText,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: i64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: i64,
    pub prompt: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(default)]
    pub options: Vec<AnswerOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub questions: Vec<Question>,
}

/// Chosen answer per question, keyed by question id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationAnswers {
    pub(crate) selected: BTreeMap<i64, i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradedAnswer {
    pub question: i64,
    pub answer: i64,
    #[serde(default)]
    pub is_correct: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationAttempt {
    pub id: i64,
    #[serde(default)]
    pub answers: Vec<GradedAnswer>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub page_count: Option<u32>,
    #[serde(default)]
    pub total: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub pagination: Option<PageInfo>,
}

/// Standard `{ data, meta }` wrapper around collection and entry responses.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
    #[serde(default)]
    pub meta: Meta,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub name: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub jwt: String,
    pub user: User,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Fields a user may change on their own profile. `None` leaves a field
/// untouched on the backend.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}
