//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::ability::progression_for_ability;
use crate::domain::{DifficultyLabel, ItemStatistics, Question, QuestionSource, OPTION_LETTERS};
use crate::selector::{ReadinessReport, Selection, TopicRecommendation};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    NextQuestion {
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(rename = "examType")]
        exam_type: String,
        #[serde(default)]
        target: Option<f64>,
    },
    SubmitAnswer {
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(rename = "questionId")]
        question_id: String,
        answer: String,
        #[serde(rename = "responseTime", default)]
        response_time: Option<f64>,
    },
    Ability {
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(rename = "examType")]
        exam_type: String,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Question(NextQuestionOut),
    AnswerResult(AnswerOut),
    Ability(AbilityOut),
    Error {
        message: String,
    },
}

#[derive(Debug, Deserialize)]
pub struct QuestionQuery {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "examType")]
    pub exam_type: String,
    #[serde(default)]
    pub target: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "examType")]
    pub exam_type: String,
}

/// One option as shown to the learner.
#[derive(Debug, Serialize)]
pub struct ChoiceOut {
    pub letter: &'static str,
    pub text: String,
}

/// Question without its answer key.
#[derive(Debug, Serialize)]
pub struct QuestionOut {
    pub id: String,
    #[serde(rename = "examType")]
    pub exam_type: String,
    pub subject: String,
    pub difficulty: DifficultyLabel,
    pub text: String,
    pub choices: Vec<ChoiceOut>,
    pub topics: Vec<String>,
    pub source: QuestionSource,
}

#[derive(Debug, Serialize)]
pub struct NextQuestionOut {
    pub question: QuestionOut,
    pub ability: f64,
    #[serde(rename = "predictedSuccess")]
    pub predicted_success: f64,
    #[serde(rename = "difficultyRating")]
    pub difficulty_rating: f64,
    #[serde(rename = "relaxedRecency")]
    pub relaxed_recency: bool,
    pub origin: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct AnswerIn {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "questionId")]
    pub question_id: String,
    pub answer: String,
    /// Seconds the learner spent on the question.
    #[serde(rename = "responseTime", default)]
    pub response_time: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct AnswerOut {
    #[serde(rename = "questionId")]
    pub question_id: String,
    pub correct: bool,
    pub expected: String,
    pub explanation: String,
    /// False when the answer was graded but could not be fully saved.
    #[serde(rename = "statsRecorded")]
    pub stats_recorded: bool,
}

#[derive(Debug, Serialize)]
pub struct AbilityOut {
    #[serde(rename = "examType")]
    pub exam_type: String,
    pub ability: f64,
    /// Percent correct over the recent answers.
    pub score: f64,
    #[serde(rename = "suggestedDifficulty")]
    pub suggested_difficulty: DifficultyLabel,
    pub progression: [DifficultyLabel; 3],
}

#[derive(Debug, Serialize)]
pub struct ReadinessOut {
    #[serde(rename = "examType")]
    pub exam_type: String,
    #[serde(flatten)]
    pub report: ReadinessReport,
}

#[derive(Debug, Serialize)]
pub struct RecommendationsOut {
    #[serde(rename = "examType")]
    pub exam_type: String,
    pub topics: Vec<TopicRecommendation>,
}

#[derive(Debug, Serialize)]
pub struct StatsOut {
    #[serde(rename = "questionId")]
    pub question_id: String,
    /// Rating currently used for selection.
    #[serde(rename = "effectiveDifficulty")]
    pub effective_difficulty: f64,
    pub stats: Option<ItemStatsOut>,
}

/// Public shape of `ItemStatistics`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemStatsOut {
    pub times_answered: u64,
    pub correct_percentage: f64,
    pub average_latency_secs: Option<f64>,
    pub difficulty_rating: f64,
    pub discrimination_index: f64,
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

impl From<ItemStatistics> for ItemStatsOut {
    fn from(s: ItemStatistics) -> Self {
        Self {
            times_answered: s.times_answered,
            correct_percentage: s.correct_percentage,
            average_latency_secs: s.average_latency_secs,
            difficulty_rating: s.difficulty_rating,
            discrimination_index: s.discrimination_index,
            last_updated: s.last_updated,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub generation: bool,
    pub inventory: Vec<InventoryOut>,
}

#[derive(Debug, Serialize)]
pub struct InventoryOut {
    #[serde(rename = "examType")]
    pub exam_type: String,
    pub questions: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub error: String,
}

/// Helper to convert a domain Question into the public shape.
pub fn to_out(q: &Question) -> QuestionOut {
    QuestionOut {
        id: q.id.clone(),
        exam_type: q.exam_type.clone(),
        subject: q.subject.clone(),
        difficulty: q.difficulty,
        text: q.text.clone(),
        choices: OPTION_LETTERS
            .iter()
            .zip(q.choices.iter())
            .map(|(letter, text)| ChoiceOut { letter: *letter, text: text.clone() })
            .collect(),
        topics: q.topics.clone(),
        source: q.source.clone(),
    }
}

pub fn to_next_out(s: &Selection, origin: &'static str) -> NextQuestionOut {
    NextQuestionOut {
        question: to_out(&s.question),
        ability: s.ability,
        predicted_success: s.probability,
        difficulty_rating: s.difficulty,
        relaxed_recency: s.relaxed_recency,
        origin,
    }
}

pub fn ability_out(exam_type: &str, ability: f64, score: f64) -> AbilityOut {
    AbilityOut {
        exam_type: exam_type.to_string(),
        ability,
        score,
        suggested_difficulty: crate::ability::label_for_score(score),
        progression: progression_for_ability(ability),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seeds::seed_questions;

    #[test]
    fn question_out_hides_the_answer_key() {
        let q = &seed_questions()[0];
        let v = serde_json::to_value(to_out(q)).unwrap();
        assert!(v.get("correct_answer").is_none());
        assert!(v.get("explanation").is_none());
        assert_eq!(v["choices"][1]["letter"], "B");
        assert_eq!(v["choices"].as_array().unwrap().len(), 4);
        assert_eq!(v["examType"], "GMAT");
    }

    #[test]
    fn ws_messages_are_tagged() {
        let m: ClientWsMessage = serde_json::from_str(
            r#"{"type":"submit_answer","userId":"u","questionId":"q","answer":"b","responseTime":42.5}"#,
        )
        .unwrap();
        match m {
            ClientWsMessage::SubmitAnswer { response_time, answer, .. } => {
                assert_eq!(response_time, Some(42.5));
                assert_eq!(answer, "b");
            }
            other => panic!("unexpected {:?}", other),
        }

        let out = serde_json::to_value(ServerWsMessage::Error { message: "x".into() }).unwrap();
        assert_eq!(out["type"], "error");
        let pong = serde_json::to_value(ServerWsMessage::Pong).unwrap();
        assert_eq!(pong["type"], "pong");
    }

    #[test]
    fn item_stats_use_camel_case_keys() {
        let mut stats = ItemStatistics::new("q1", chrono::Utc::now());
        stats.times_answered = 7;
        let out = StatsOut { question_id: "q1".into(), effective_difficulty: 0.3, stats: Some(stats.into()) };
        let v = serde_json::to_value(out).unwrap();
        assert_eq!(v["stats"]["timesAnswered"], 7);
        assert!(v["stats"].get("times_answered").is_none());
        assert!(v["stats"].get("correctPercentage").is_some());
    }

    #[test]
    fn ability_out_suggests_label_from_score() {
        let a = ability_out("GRE", 1.2, 85.0);
        assert_eq!(a.suggested_difficulty, DifficultyLabel::Hard);
        assert_eq!(a.progression.len(), 3);
    }
}
