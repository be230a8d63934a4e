//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs parameters (never keys) and basic result info.

use std::sync::Arc;
use axum::{extract::{Query, State}, http::StatusCode, response::IntoResponse, Json};
use tracing::{error, info, instrument};

use crate::logic::*;
use crate::protocol::*;
use crate::state::AppState;
use crate::store::StoreError;

type ApiError = (StatusCode, Json<ErrorOut>);

fn store_failure(e: StoreError) -> ApiError {
  error!(target: "store", error = %e, "Store operation failed");
  (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorOut { error: e.to_string() }))
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state, body), fields(topic = %body.topic, difficulty = %body.difficulty))]
pub async fn http_post_course(
  State(state): State<Arc<AppState>>,
  Json(body): Json<CourseIn>,
) -> impl IntoResponse {
  let course = generate_course(&state, &body.topic, body.difficulty, body.api_key.as_deref()).await;
  info!(target: "course", questions = course.questions.len(), fallback = course.is_fallback(), "HTTP course served");
  Json(course)
}

#[instrument(level = "info", skip(state, body), fields(topic = %body.topic, n = ?body.n))]
pub async fn http_post_open_questions(
  State(state): State<Arc<AppState>>,
  Json(body): Json<OpenQuestionsIn>,
) -> impl IntoResponse {
  let n = body.n.unwrap_or(DEFAULT_OPEN_QUESTIONS);
  let questions = generate_open_questions(&state, &body.topic, n, body.difficulty, body.api_key.as_deref()).await;
  Json(OpenQuestionsOut { questions })
}

#[instrument(level = "info", skip(state, body), fields(question_len = body.question.len(), answer_len = body.answer.len()))]
pub async fn http_post_evaluate(
  State(state): State<Arc<AppState>>,
  Json(body): Json<EvaluateIn>,
) -> impl IntoResponse {
  let eval = evaluate_answer(&state, &body.question, &body.answer, body.notes.as_deref(), body.api_key.as_deref()).await;
  info!(target: "course", score = eval.score, "HTTP answer evaluated");
  Json(eval)
}

#[instrument(level = "info", skip(state, body), fields(material_len = body.material.len(), n = ?body.n))]
pub async fn http_post_next_topics(
  State(state): State<Arc<AppState>>,
  Json(body): Json<NextTopicsIn>,
) -> impl IntoResponse {
  let n = body.n.unwrap_or(DEFAULT_NEXT_TOPICS);
  let topics = suggest_followups(&state, &body.material, n, body.api_key.as_deref()).await;
  Json(TopicsOut { topics })
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_topics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(TopicsOut { topics: state.topics.list().await })
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_courses(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(state.courses.list().await)
}

#[instrument(level = "info", skip(state), fields(topic = %q.topic, difficulty = %q.difficulty))]
pub async fn http_delete_course(
  State(state): State<Arc<AppState>>,
  Query(q): Query<CourseKeyQuery>,
) -> Result<Json<RemovedOut>, ApiError> {
  let removed = state.courses.delete(q.topic.trim(), q.difficulty).await.map_err(store_failure)?;
  info!(target: "store", removed, "HTTP course delete");
  Ok(Json(RemovedOut { removed }))
}

#[instrument(level = "info", skip(state, body), fields(topic = %body.topic, score = body.score, total = body.total))]
pub async fn http_post_result(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ResultIn>,
) -> Result<Json<ResultOut>, ApiError> {
  let r = record_result(&state, &body.topic, body.difficulty, body.score, body.total, body.open())
    .await
    .map_err(store_failure)?;
  Ok(Json(ResultOut {
    percent: r.percent,
    mc_percent: r.mc_percent,
    open_percent: r.open_percent,
    next_difficulty: r.next_difficulty,
    stored: r.stored,
  }))
}
