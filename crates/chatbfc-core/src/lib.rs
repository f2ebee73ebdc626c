//! chatbfc-core: shared types and services for ChatBFC interview practice.
//!
//! Holds the wire types exchanged between the practice client and the gateway, the
//! question bank the session plan is drawn from, and the completion-backed grading and
//! summary helpers the gateway serves.

mod config;
mod error;
pub mod grading;
pub mod llm;
mod question_bank;
pub mod similarity;
pub mod summary;
mod types;

pub use config::{CoreConfig, LlmMode, PracticeConfig};
pub use error::{CoreError, CoreResult};
pub use grading::{grade_answer, parse_feedback, rubric_feedback};
pub use llm::{CannedCompletion, CompletionPrompt, CompletionService, OpenRouterCompletion};
pub use question_bank::{QuestionBank, SeedQuestion};
pub use similarity::{is_too_similar, jaccard, word_count, DEFAULT_SIMILARITY_THRESHOLD};
pub use summary::{heuristic_summary, summarize};
pub use types::{
    ConversationTurn, EndRequest, EndResponse, Feedback, GradeRequest, PlanRequest, PlanResponse,
    QuestionItem, QuestionType, Role, SessionSettings, Stage, TtsRequest, MAX_QUESTIONS,
};
