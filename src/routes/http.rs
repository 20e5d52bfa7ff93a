//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;
use axum::{
  extract::{Path, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{error, info, instrument};

use crate::error::Unavailable;
use crate::logic::*;
use crate::protocol::*;
use crate::state::AppState;

impl IntoResponse for ServeError {
  fn into_response(self) -> Response {
    let status = match &self {
      ServeError::UnknownExam(_) => StatusCode::BAD_REQUEST,
      ServeError::UnknownQuestion(_) => StatusCode::NOT_FOUND,
      ServeError::Unavailable(Unavailable::PoolExhausted) => StatusCode::NOT_FOUND,
      ServeError::Unavailable(Unavailable::CatalogUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(ErrorOut { error: self.to_string() })).into_response()
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let inventory = match state.bank.inventory().await {
    Ok(inv) => inv
      .into_iter()
      .map(|(exam_type, questions)| InventoryOut { exam_type, questions })
      .collect(),
    Err(e) => {
      error!(target: "prepforge_backend", error = %e, "Inventory unavailable");
      return (StatusCode::SERVICE_UNAVAILABLE, Json(HealthOut { ok: false, generation: state.generator.is_some(), inventory: vec![] }));
    }
  };
  (StatusCode::OK, Json(HealthOut { ok: true, generation: state.generator.is_some(), inventory }))
}

#[instrument(level = "info", skip(state), fields(user_id = %q.user_id, exam_type = %q.exam_type))]
pub async fn http_get_question(
  State(state): State<Arc<AppState>>,
  Query(q): Query<QuestionQuery>,
) -> Result<Json<NextQuestionOut>, ServeError> {
  let out = next_question(&state, &q.user_id, &q.exam_type, q.target).await?;
  info!(target: "question", id = %out.question.id, origin = out.origin, "HTTP question served");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, body), fields(%body.question_id, answer_len = body.answer.len()))]
pub async fn http_post_answer(
  State(state): State<Arc<AppState>>,
  Json(body): Json<AnswerIn>,
) -> Result<Json<AnswerOut>, ServeError> {
  let out = submit_answer(&state, &body.user_id, &body.question_id, &body.answer, body.response_time).await?;
  info!(target: "question", id = %body.question_id, correct = out.correct, "HTTP submit_answer evaluated");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state), fields(user_id = %q.user_id, exam_type = %q.exam_type))]
pub async fn http_get_ability(
  State(state): State<Arc<AppState>>,
  Query(q): Query<UserQuery>,
) -> Result<Json<AbilityOut>, ServeError> {
  Ok(Json(ability_summary(&state, &q.user_id, &q.exam_type).await?))
}

#[instrument(level = "info", skip(state), fields(user_id = %q.user_id, exam_type = %q.exam_type))]
pub async fn http_get_readiness(
  State(state): State<Arc<AppState>>,
  Query(q): Query<UserQuery>,
) -> Result<Json<ReadinessOut>, ServeError> {
  if !state.is_known_exam(&q.exam_type) {
    return Err(ServeError::UnknownExam(q.exam_type));
  }
  let report = state.selector.exam_readiness(&q.user_id, &q.exam_type).await;
  Ok(Json(ReadinessOut { exam_type: q.exam_type, report }))
}

#[instrument(level = "info", skip(state), fields(user_id = %q.user_id, exam_type = %q.exam_type))]
pub async fn http_get_recommendations(
  State(state): State<Arc<AppState>>,
  Query(q): Query<UserQuery>,
) -> Result<Json<RecommendationsOut>, ServeError> {
  if !state.is_known_exam(&q.exam_type) {
    return Err(ServeError::UnknownExam(q.exam_type));
  }
  let topics = state.selector.topic_recommendations(&q.user_id, &q.exam_type).await;
  Ok(Json(RecommendationsOut { exam_type: q.exam_type, topics }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_question_stats(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<StatsOut>, ServeError> {
  match state.bank.get(&id).await {
    Ok(Some(_)) => {}
    Ok(None) => return Err(ServeError::UnknownQuestion(id)),
    Err(e) => return Err(ServeError::Unavailable(Unavailable::CatalogUnavailable(e.to_string()))),
  }
  let stats = state.selector.items().statistics(&id).await.map(ItemStatsOut::from);
  let effective_difficulty = state.selector.items().rating(&id).await;
  Ok(Json(StatsOut { question_id: id, effective_difficulty, stats }))
}
