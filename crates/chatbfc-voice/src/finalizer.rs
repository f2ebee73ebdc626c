//! Turn finalization: what the session does once a graded answer comes back.
//!
//! A brief answer may earn a same-question follow-up (the plan pointer is held); otherwise
//! the plan advances. Answering the last item always completes the session, brief or not.
//! Follow-up wording comes from the first grading gap and is swapped for a generic
//! clarifier when it would repeat the interviewer's previous line.

use chatbfc_core::{
    is_too_similar, word_count, Feedback, GradeRequest, PracticeConfig, QuestionItem,
    SessionSettings,
};

const GENERIC_CLARIFIERS: [&str; 3] = [
    "Could you expand on that with a specific example?",
    "Walk me through your reasoning in a bit more detail.",
    "What would you add if you had another minute?",
];

/// The step the session takes after a successful grade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    /// Move to the next plan item.
    Advance,
    /// Ask this text about the same item; the plan pointer is held.
    FollowUp(String),
    /// The last item was answered.
    Complete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FollowUpPolicy {
    pub enabled: bool,
    pub min_words: usize,
    pub max_per_item: usize,
    pub similarity_threshold: f32,
}

impl From<&PracticeConfig> for FollowUpPolicy {
    fn from(config: &PracticeConfig) -> Self {
        Self {
            enabled: config.follow_ups_enabled,
            min_words: config.follow_up_min_words,
            max_per_item: config.max_follow_ups,
            similarity_threshold: config.similarity_threshold,
        }
    }
}

/// Where the session stands when a grade arrives.
#[derive(Debug, Clone, Copy)]
pub struct TurnContext<'a> {
    pub plan_len: usize,
    pub current_index: usize,
    pub follow_ups_asked: usize,
    pub answer: &'a str,
    pub last_interviewer: Option<&'a str>,
}

pub fn grade_request(
    settings: &SessionSettings,
    item: &QuestionItem,
    answer: &str,
) -> GradeRequest {
    GradeRequest {
        plan_item: item.clone(),
        user_answer: answer.to_string(),
        firm: settings.firm.clone(),
        stage: settings.stage,
    }
}

pub fn next_step(
    policy: &FollowUpPolicy,
    ctx: &TurnContext<'_>,
    feedback: &Feedback,
) -> NextStep {
    if ctx.current_index + 1 >= ctx.plan_len {
        return NextStep::Complete;
    }
    let brief = word_count(ctx.answer) < policy.min_words;
    if policy.enabled && brief && ctx.follow_ups_asked < policy.max_per_item {
        return NextStep::FollowUp(follow_up_text(
            feedback,
            ctx.last_interviewer,
            policy.similarity_threshold,
        ));
    }
    NextStep::Advance
}

fn gap_focus(gap: &str) -> String {
    let gap = gap.trim().trim_end_matches('.');
    let lower = gap.to_ascii_lowercase();
    let rest = ["missing:", "missing", "no mention of", "lacked", "did not mention"]
        .iter()
        .find(|p| lower.starts_with(*p))
        .map(|p| gap[p.len()..].trim())
        .unwrap_or(gap);
    let mut chars = rest.chars();
    match chars.next() {
        Some(c) => c.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Follow-up wording, guarded against echoing `last_interviewer`.
pub fn follow_up_text(
    feedback: &Feedback,
    last_interviewer: Option<&str>,
    threshold: f32,
) -> String {
    let candidate = feedback
        .gaps
        .iter()
        .map(|g| gap_focus(g))
        .find(|g| !g.is_empty())
        .map(|focus| format!("Could you say more about {}?", focus))
        .unwrap_or_else(|| GENERIC_CLARIFIERS[0].to_string());

    let Some(previous) = last_interviewer else {
        return candidate;
    };
    if !is_too_similar(&candidate, previous, threshold) {
        return candidate;
    }
    GENERIC_CLARIFIERS
        .iter()
        .find(|c| !is_too_similar(c, previous, threshold))
        .unwrap_or(&GENERIC_CLARIFIERS[GENERIC_CLARIFIERS.len() - 1])
        .to_string()
}
