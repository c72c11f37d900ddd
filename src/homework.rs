use serde_json::json;
use tracing::{error, info};

use crate::api::ApiClient;
use crate::error::{ClientError, Result};
use crate::models::{
    Homework, HomeworkAttempt, MediaFile, NewHomeworkAttempt, PendingHomeworkAttempt, UploadFile,
};
use crate::query::{Query, Relation};

pub async fn fetch_homeworks(api: &ApiClient, contest_cycle_id: i64) -> Result<Vec<Homework>> {
    let query = Query::new()
        .filters(json!({ "contestCycle": { "id": { "$eq": contest_cycle_id } } }))
        .populate("contestCycle", Relation::new().fields(["name"]))
        .sort("deadline:asc");

    let homeworks: Vec<Homework> = api.get_data("/api/homeworks", &query).await?;
    info!(
        "Fetched {} homeworks for contest cycle {}",
        homeworks.len(),
        contest_cycle_id
    );
    Ok(homeworks)
}

pub async fn fetch_homework_by_id(api: &ApiClient, id: i64) -> Result<Homework> {
    let query = Query::new().populate("contestCycle", Relation::new().fields(["name"]));
    api.get_data(&format!("/api/homeworks/{}", id), &query).await
}

/// Attempts submitted by a user, newest first, with homework and files.
pub async fn fetch_user_homeworks(api: &ApiClient, user_id: i64) -> Result<Vec<HomeworkAttempt>> {
    let query = Query::new()
        .fields_all()
        .filters(json!({ "user": { "$eq": user_id } }))
        .populate(
            "homework",
            Relation::new()
                .fields(["title", "description", "deadline", "type"])
                .populate("contestCycle", Relation::new().fields(["name"])),
        )
        .populate("deliveredFiles", Relation::new().fields(["name", "url"]))
        .sort("createdAt:desc");

    let attempts: Vec<HomeworkAttempt> = api.get_data("/api/homework-attempts", &query).await?;
    info!("Fetched {} homework attempts for user {}", attempts.len(), user_id);
    Ok(attempts)
}

pub async fn upload_files(api: &ApiClient, files: Vec<UploadFile>) -> Result<Vec<MediaFile>> {
    let count = files.len();
    let uploaded = api.upload(files).await?;
    info!("Uploaded {} files ({} returned)", count, uploaded.len());
    Ok(uploaded)
}

/// First phase of a submission: validates the attempt against the homework
/// and uploads its files.
pub async fn upload_attempt_files(
    api: &ApiClient,
    attempt: NewHomeworkAttempt,
    homework: &Homework,
) -> Result<PendingHomeworkAttempt> {
    if attempt.homework != homework.id {
        return Err(ClientError::Precondition(format!(
            "attempt targets homework {} but homework {} was given",
            attempt.homework, homework.id
        )));
    }
    if homework.requires_deliverables() && attempt.files.is_empty() {
        return Err(ClientError::Precondition(format!(
            "homework '{}' requires at least one file",
            homework.title
        )));
    }

    let NewHomeworkAttempt {
        user,
        homework: homework_id,
        contest_cycle,
        files,
    } = attempt;
    let uploaded = if files.is_empty() {
        Vec::new()
    } else {
        upload_files(api, files).await?
    };

    Ok(PendingHomeworkAttempt::new(
        user,
        homework_id,
        contest_cycle,
        uploaded,
    ))
}

/// Second phase: creates the attempt record from already uploaded files.
/// May be called again on the same value if it failed.
pub async fn commit_attempt(
    api: &ApiClient,
    pending: &PendingHomeworkAttempt,
) -> Result<HomeworkAttempt> {
    let payload = json!({
        "user": pending.user(),
        "homework": pending.homework(),
        "contestCycle": pending.contest_cycle(),
        "deliveredFiles": pending.delivered_file_ids(),
    });

    let attempt: HomeworkAttempt = api.post_data("/api/homework-attempts", payload).await?;
    info!(
        "Created homework attempt {} for homework {} (user {})",
        attempt.id,
        pending.homework(),
        pending.user()
    );
    Ok(attempt)
}

pub async fn submit_homework_attempt(
    api: &ApiClient,
    attempt: NewHomeworkAttempt,
    homework: &Homework,
) -> Result<HomeworkAttempt> {
    let pending = upload_attempt_files(api, attempt, homework).await?;

    match commit_attempt(api, &pending).await {
        Ok(created) => Ok(created),
        Err(e) => {
            error!(
                "Attempt for homework {} not created; uploaded files {:?} are left unattached",
                pending.homework(),
                pending.delivered_file_ids()
            );
            Err(e)
        }
    }
}
