//! End-of-session summary.

use crate::error::{CoreError, CoreResult};
use crate::llm::{CompletionPrompt, CompletionService};
use crate::types::{ConversationTurn, EndRequest, Feedback, Role};

const SUMMARY_SYSTEM: &str = "You are a finance recruiting coach. Summarize a practice interview \
in under 150 words: overall impression, two strengths, two things to work on, and one concrete \
drill for next time. Plain text, no headings.";

fn transcript(conversation: &[ConversationTurn]) -> String {
    conversation
        .iter()
        .map(|t| {
            let who = match t.role {
                Role::Interviewer => "Interviewer",
                Role::User => "Candidate",
            };
            format!("{}: {}", who, t.content.trim())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn summary_prompt(request: &EndRequest) -> CompletionPrompt {
    let s = &request.settings;
    let user = format!(
        "Firm: {}\nStage: {}\nQuestions asked: {}\n\nTranscript:\n{}",
        s.firm,
        s.stage.label(),
        request.asked_question_ids.len(),
        transcript(&request.conversation)
    );
    CompletionPrompt {
        system: SUMMARY_SYSTEM.to_string(),
        user,
        temperature: 0.4,
        max_tokens: 400,
    }
}

pub async fn summarize(
    service: &dyn CompletionService,
    request: &EndRequest,
) -> CoreResult<String> {
    if request.conversation.is_empty() {
        return Err(CoreError::InvalidRequest(
            "conversation must not be empty".to_string(),
        ));
    }
    let text = service.complete(&summary_prompt(request)).await?;
    Ok(text.trim().to_string())
}

/// Summary built without a model: answer counts plus the feedback collected so far.
pub fn heuristic_summary(request: &EndRequest, feedback: &[Feedback]) -> String {
    let answers = request
        .conversation
        .iter()
        .filter(|t| t.role == Role::User)
        .count();
    let mut out = format!(
        "{} practice at {}: {} question(s) asked, {} answer(s) given.",
        capitalize(request.settings.stage.label()),
        request.settings.firm.trim(),
        request.asked_question_ids.len(),
        answers
    );

    if !feedback.is_empty() {
        let avg = feedback.iter().map(|f| f32::from(f.score)).sum::<f32>() / feedback.len() as f32;
        out.push_str(&format!(" Average score {:.1}/10.", avg));
        if let Some(s) = feedback.iter().flat_map(|f| f.strengths.iter()).next() {
            out.push_str(&format!(" Strength: {}.", s.trim_end_matches('.')));
        }
        if let Some(g) = feedback.iter().flat_map(|f| f.gaps.iter()).next() {
            out.push_str(&format!(" Work on: {}.", g.trim_end_matches('.')));
        }
    } else if answers == 0 {
        out.push_str(" No answers were recorded; start another session when ready.");
    }
    out
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
