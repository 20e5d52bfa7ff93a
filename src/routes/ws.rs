//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. We reply with a single JSON message per request.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument};

use crate::logic::*;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "prepforge_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "prepforge_backend", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let out = reply_to_text(&txt, &state).await;
        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "prepforge_backend", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "prepforge_backend", "WebSocket disconnected");
}

/// Parse, dispatch, serialize.
async fn reply_to_text(txt: &str, state: &AppState) -> String {
  let reply_msg = match serde_json::from_str::<ClientWsMessage>(txt) {
    Ok(incoming) => {
      debug!(target: "prepforge_backend", "WS received: {:?}", &incoming);
      handle_client_ws(incoming, state).await
    }
    Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
  };

  serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  })
}

#[instrument(level = "info", skip(state))]
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::NextQuestion { user_id, exam_type, target } => {
      match next_question(state, &user_id, &exam_type, target).await {
        Ok(next) => {
          info!(target: "question", %exam_type, id = %next.question.id, origin = next.origin, "WS next_question served");
          ServerWsMessage::Question(next)
        }
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      }
    }

    ClientWsMessage::SubmitAnswer { user_id, question_id, answer, response_time } => {
      match submit_answer(state, &user_id, &question_id, &answer, response_time).await {
        Ok(result) => {
          info!(target: "question", id = %question_id, correct = result.correct, "WS submit_answer evaluated");
          ServerWsMessage::AnswerResult(result)
        }
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      }
    }

    ClientWsMessage::Ability { user_id, exam_type } => {
      match ability_summary(state, &user_id, &exam_type).await {
        Ok(a) => ServerWsMessage::Ability(a),
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::parse_config;

  fn state() -> AppState {
    AppState::from_config(parse_config("").unwrap(), None)
  }

  #[tokio::test]
  async fn ping_and_bad_json() {
    let st = state();
    let pong: serde_json::Value = serde_json::from_str(&reply_to_text(r#"{"type":"ping"}"#, &st).await).unwrap();
    assert_eq!(pong["type"], "pong");

    let err: serde_json::Value = serde_json::from_str(&reply_to_text("not json", &st).await).unwrap();
    assert_eq!(err["type"], "error");
    assert!(err["message"].as_str().unwrap().starts_with("Invalid JSON"));
  }

  #[tokio::test]
  async fn next_question_then_answer() {
    let st = state();
    let q: serde_json::Value = serde_json::from_str(
      &reply_to_text(r#"{"type":"next_question","userId":"u1","examType":"GMAT"}"#, &st).await,
    )
    .unwrap();
    assert_eq!(q["type"], "question");
    let id = q["question"]["id"].as_str().unwrap().to_string();
    assert!(q["question"].get("correct_answer").is_none());

    let msg = serde_json::json!({"type": "submit_answer", "userId": "u1", "questionId": id, "answer": "A"}).to_string();
    let a: serde_json::Value = serde_json::from_str(&reply_to_text(&msg, &st).await).unwrap();
    assert_eq!(a["type"], "answer_result");
    assert_eq!(a["questionId"], id.as_str());
    assert_eq!(a["statsRecorded"], true);
  }
}
