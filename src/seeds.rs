//! Built-in seed questions that keep the service useful without a bank or an LLM.

use chrono::Utc;
use uuid::Uuid;

use crate::domain::{DifficultyLabel, Question, QuestionSource};

fn seed(
  id: &str,
  exam_type: &str,
  subject: &str,
  difficulty: DifficultyLabel,
  text: &str,
  choices: [&str; 4],
  correct_answer: &str,
  explanation: &str,
  topics: &[&str],
) -> Question {
  Question {
    id: id.into(),
    exam_type: exam_type.into(),
    subject: subject.into(),
    difficulty,
    text: text.into(),
    choices: choices.iter().map(|c| c.to_string()).collect(),
    correct_answer: correct_answer.into(),
    explanation: explanation.into(),
    topics: topics.iter().map(|t| t.to_string()).collect(),
    source: QuestionSource::Seed,
    created_at: Utc::now(),
  }
}

pub fn seed_questions() -> Vec<Question> {
  use DifficultyLabel::*;
  vec![
    seed(
      "seed-gmat-1", "GMAT", "Quantitative", Easy,
      "If 3x - 7 = 11, what is the value of x?",
      ["4", "6", "7", "18"], "B",
      "3x = 18, so x = 6.",
      &["algebra"],
    ),
    seed(
      "seed-gmat-2", "GMAT", "Quantitative", Medium,
      "A shirt is discounted 20% and then a further 10% off the sale price. What is the total discount?",
      ["28%", "30%", "25%", "32%"], "A",
      "0.8 x 0.9 = 0.72 of the original price, a 28% discount.",
      &["percentages"],
    ),
    seed(
      "seed-gmat-3", "GMAT", "Verbal", Hard,
      "Which choice best completes the argument: the city's traffic fell after the toll began, so the toll reduced traffic. Which assumption is required?",
      [
        "Tolls are popular with residents.",
        "No other factor reduced traffic in the same period.",
        "Traffic had been rising before the toll.",
        "Other cities have tolls.",
      ],
      "B",
      "The causal conclusion requires ruling out alternative causes.",
      &["critical reasoning"],
    ),
    seed(
      "seed-gre-1", "GRE", "Quantitative", Medium,
      "What is the median of 3, 9, 4, 12, 7?",
      ["4", "7", "8", "9"], "B",
      "Sorted: 3, 4, 7, 9, 12; the middle value is 7.",
      &["statistics"],
    ),
    seed(
      "seed-gre-2", "GRE", "Verbal", Easy,
      "Choose the word closest in meaning to LACONIC.",
      ["verbose", "terse", "lazy", "cheerful"], "B",
      "Laconic means using very few words.",
      &["vocabulary"],
    ),
    seed(
      "seed-lsat-1", "LSAT", "Logical Reasoning", Medium,
      "All members of the club are runners. Some runners are swimmers. Which must be true?",
      [
        "Some club members are swimmers.",
        "No club members are swimmers.",
        "All swimmers are runners.",
        "None of the above must be true.",
      ],
      "D",
      "The premises do not connect club members to swimmers.",
      &["conditional logic"],
    ),
  ]
}

/// Absolute last resort when a category has nothing at all and generation is unavailable.
pub fn hard_fallback_question(exam_type: &str) -> Question {
  seed(
    &Uuid::new_v4().to_string(),
    exam_type,
    "General",
    DifficultyLabel::Medium,
    "Which study habit best improves long-term retention?",
    [
      "Rereading notes the night before",
      "Spaced practice with self-testing",
      "Highlighting the textbook",
      "Studying only the easiest material",
    ],
    "B",
    "Spacing and retrieval practice are the most reliable ways to retain material.",
    &["study skills"],
  )
}
