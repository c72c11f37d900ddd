use serde_json::json;
use tracing::info;

use crate::api::ApiClient;
use crate::error::{ClientError, Result};
use crate::models::{Evaluation, EvaluationAnswers, EvaluationAttempt, Question, QuestionType};
use crate::query::{Query, Relation};

impl EvaluationAnswers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `option_id` as the answer to `question`. A radio group keeps a
    /// single answer, so choosing again replaces the previous one.
    pub fn select(&mut self, question: &Question, option_id: i64) -> Result<()> {
        match question.question_type {
            QuestionType::RadioGroup => {
                if !question.options.iter().any(|o| o.id == option_id) {
                    return Err(ClientError::Precondition(format!(
                        "option {} does not belong to question {}",
                        option_id, question.id
                    )));
                }
                self.selected.insert(question.id, option_id);
                Ok(())
            }
            QuestionType::Checkbox | QuestionType::Dropdown | QuestionType::FreeText => {
                Err(ClientError::Unsupported(format!(
                    "answers for {:?} questions",
                    question.question_type
                )))
            }
        }
    }

    pub fn selected(&self, question_id: i64) -> Option<i64> {
        self.selected.get(&question_id).copied()
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn unanswered<'a>(&self, evaluation: &'a Evaluation) -> Vec<&'a Question> {
        evaluation
            .questions
            .iter()
            .filter(|q| !self.selected.contains_key(&q.id))
            .collect()
    }
}

pub async fn fetch_evaluation(api: &ApiClient, id: i64) -> Result<Evaluation> {
    let query = Query::new().populate(
        "questions",
        Relation::new().populate("options", Relation::new().fields(["text"])),
    );
    api.get_data(&format!("/api/evaluations/{}", id), &query).await
}

pub async fn fetch_user_evaluation_attempts(
    api: &ApiClient,
    user_id: i64,
    evaluation_id: i64,
) -> Result<Vec<EvaluationAttempt>> {
    let query = Query::new()
        .filters(json!({
            "user": { "$eq": user_id },
            "evaluation": { "id": { "$eq": evaluation_id } },
        }))
        .populate("answers", Relation::new())
        .sort("createdAt:desc");

    api.get_data("/api/evaluation-attempts", &query).await
}

/// Sends the chosen answers. Grading happens on the backend; the returned
/// attempt carries its verdicts.
pub async fn submit_evaluation_attempt(
    api: &ApiClient,
    user_id: i64,
    evaluation: &Evaluation,
    answers: &EvaluationAnswers,
) -> Result<EvaluationAttempt> {
    if answers.is_empty() {
        return Err(ClientError::Precondition(
            "no answers selected".to_string(),
        ));
    }
    if let Some(stray) = answers
        .selected
        .keys()
        .find(|q| !evaluation.questions.iter().any(|question| question.id == **q))
    {
        return Err(ClientError::Precondition(format!(
            "question {} is not part of evaluation {}",
            stray, evaluation.id
        )));
    }

    let payload = json!({
        "user": user_id,
        "evaluation": evaluation.id,
        "answers": answers
            .selected
            .iter()
            .map(|(question, answer)| json!({ "question": question, "answer": answer }))
            .collect::<Vec<_>>(),
    });

    let attempt: EvaluationAttempt = api.post_data("/api/evaluation-attempts", payload).await?;
    info!(
        "Submitted evaluation {} attempt {} ({} answers)",
        evaluation.id,
        attempt.id,
        answers.len()
    );
    Ok(attempt)
}
