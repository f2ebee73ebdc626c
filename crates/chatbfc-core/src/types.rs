//! Shared practice-session types: settings, plan items, transcript turns, feedback,
//! and the request/response bodies exchanged with the planning, grading, end-of-session
//! and speech-synthesis collaborators.
//!
//! Wire bodies are camelCase JSON so the gateway and the client agree on one format.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// Upper bound on plan length for one practice session.
pub const MAX_QUESTIONS: usize = 15;

fn default_num_questions() -> usize {
    5
}

/// Recruiting stage being practiced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Informal networking conversation with an analyst or associate.
    CoffeeChat,
    /// First-round (phone or video) interview.
    FirstRound,
    /// Final-round interview block.
    Superday,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::CoffeeChat => "coffee chat",
            Stage::FirstRound => "first round",
            Stage::Superday => "superday",
        }
    }

    /// Parse from a loose user-facing string ("coffee chat", "first-round", "superday").
    pub fn parse(s: &str) -> Option<Self> {
        let norm: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect();
        match norm.as_str() {
            "coffee_chat" | "coffee" => Some(Stage::CoffeeChat),
            "first_round" | "first" => Some(Stage::FirstRound),
            "superday" | "super_day" | "final" => Some(Stage::Superday),
            _ => None,
        }
    }
}

/// Category tag on a question item; also used as the plan filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Behavioral,
    Technical,
    Fit,
    Markets,
    Brainteaser,
}

impl QuestionType {
    pub const ALL: [QuestionType; 5] = [
        QuestionType::Behavioral,
        QuestionType::Technical,
        QuestionType::Fit,
        QuestionType::Markets,
        QuestionType::Brainteaser,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            QuestionType::Behavioral => "behavioral",
            QuestionType::Technical => "technical",
            QuestionType::Fit => "fit",
            QuestionType::Markets => "markets",
            QuestionType::Brainteaser => "brainteaser",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.label().eq_ignore_ascii_case(s))
    }
}

/// Settings chosen by the user before a session starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSettings {
    /// Target firm (e.g. "Goldman Sachs"). Firm-specific seed questions are preferred.
    pub firm: String,
    pub stage: Stage,
    /// Question-type filter; empty means every type.
    #[serde(default)]
    pub question_types: Vec<QuestionType>,
    #[serde(default = "default_num_questions")]
    pub num_questions: usize,
    #[serde(default)]
    pub randomize: bool,
    /// Gate the microphone with an explicit hold gesture instead of silence detection.
    #[serde(default)]
    pub hold_to_talk: bool,
}

impl SessionSettings {
    pub fn new(firm: impl Into<String>, stage: Stage) -> Self {
        Self {
            firm: firm.into(),
            stage,
            question_types: Vec::new(),
            num_questions: default_num_questions(),
            randomize: false,
            hold_to_talk: false,
        }
    }

    pub fn with_question_types(mut self, types: Vec<QuestionType>) -> Self {
        self.question_types = types;
        self
    }

    pub fn with_num_questions(mut self, n: usize) -> Self {
        self.num_questions = n;
        self
    }

    pub fn with_randomize(mut self, randomize: bool) -> Self {
        self.randomize = randomize;
        self
    }

    pub fn with_hold_to_talk(mut self, hold: bool) -> Self {
        self.hold_to_talk = hold;
        self
    }

    /// Reject settings the planner cannot serve.
    pub fn validate(&self) -> CoreResult<()> {
        if self.firm.trim().is_empty() {
            return Err(CoreError::InvalidSettings("firm must not be empty".to_string()));
        }
        if self.num_questions == 0 || self.num_questions > MAX_QUESTIONS {
            return Err(CoreError::InvalidSettings(format!(
                "numQuestions must be between 1 and {}, got {}",
                MAX_QUESTIONS, self.num_questions
            )));
        }
        Ok(())
    }

    pub fn plan_request(&self) -> PlanRequest {
        PlanRequest {
            firm: self.firm.clone(),
            stage: self.stage,
            question_types: self.question_types.clone(),
            num_questions: self.num_questions,
            randomize: self.randomize,
        }
    }
}

/// Speaker of a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Interviewer,
    User,
}

/// One complete utterance in the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn interviewer(content: impl Into<String>) -> Self {
        Self {
            role: Role::Interviewer,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A planned question with its grading material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionItem {
    pub id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    /// Interviewer-facing question text.
    pub question: String,
    #[serde(default)]
    pub rubric: Vec<String>,
    #[serde(default)]
    pub ideal_answer_outline: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    pub firm: String,
    pub stage: Stage,
    #[serde(default)]
    pub question_types: Vec<QuestionType>,
    #[serde(default = "default_num_questions")]
    pub num_questions: usize,
    #[serde(default)]
    pub randomize: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResponse {
    pub plan: Vec<QuestionItem>,
    /// Number of seed questions that matched the filter before truncation.
    pub seed_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRequest {
    pub plan_item: QuestionItem,
    pub user_answer: String,
    pub firm: String,
    pub stage: Stage,
}

/// Grading result for one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    /// 0–10 inclusive.
    #[serde(alias = "score0to10")]
    pub score: u8,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub gaps: Vec<String>,
    #[serde(default)]
    pub corrected_answer_outline: Vec<String>,
    #[serde(default)]
    pub next_best_sentence: String,
}

impl Feedback {
    pub const MAX_SCORE: u8 = 10;

    /// Clamp the score into range and drop blank list entries.
    pub fn normalized(mut self) -> Self {
        self.score = self.score.min(Self::MAX_SCORE);
        for list in [
            &mut self.strengths,
            &mut self.gaps,
            &mut self.corrected_answer_outline,
        ] {
            list.retain(|s| !s.trim().is_empty());
            for s in list.iter_mut() {
                *s = s.trim().to_string();
            }
        }
        self.next_best_sentence = self.next_best_sentence.trim().to_string();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndRequest {
    pub settings: SessionSettings,
    #[serde(default)]
    pub asked_question_ids: Vec<String>,
    #[serde(default)]
    pub conversation: Vec<ConversationTurn>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndResponse {
    pub final_summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsRequest {
    pub text: String,
}
