//! Grading: assemble the grading prompt for one answer, call the completion service,
//! and reshape the model output into `Feedback`.
//!
//! Model output is expected to contain one JSON object; surrounding prose or code
//! fences are tolerated. `rubric_feedback` is the offline grader used in mock mode.

use crate::error::{CoreError, CoreResult};
use crate::llm::{CompletionPrompt, CompletionService};
use crate::similarity::{tokens, word_count};
use crate::types::{Feedback, GradeRequest};
use serde_json::Value;
use tracing::debug;

const GRADING_SYSTEM: &str = "You grade answers in a finance recruiting practice interview. \
Reply with one JSON object only, with keys: score (integer 0-10), strengths (array of strings), \
gaps (array of strings), correctedAnswerOutline (array of strings), nextBestSentence (string).";

/// Answers shorter than this are capped at a low score by the rubric grader.
const BRIEF_ANSWER_WORDS: usize = 15;

pub fn grading_prompt(request: &GradeRequest) -> CompletionPrompt {
    let item = &request.plan_item;
    let mut user = format!(
        "Firm: {}\nStage: {}\nQuestion type: {}\nQuestion: {}\n",
        request.firm,
        request.stage.label(),
        item.question_type.label(),
        item.question
    );
    if !item.rubric.is_empty() {
        user.push_str("Rubric:\n");
        for r in &item.rubric {
            user.push_str(&format!("- {}\n", r));
        }
    }
    if !item.ideal_answer_outline.is_empty() {
        user.push_str("Ideal answer outline:\n");
        for o in &item.ideal_answer_outline {
            user.push_str(&format!("- {}\n", o));
        }
    }
    user.push_str(&format!("Candidate answer:\n{}\n", request.user_answer.trim()));
    CompletionPrompt {
        system: GRADING_SYSTEM.to_string(),
        user,
        temperature: 0.2,
        max_tokens: 700,
    }
}

/// Grade one answer through the completion service.
pub async fn grade_answer(
    service: &dyn CompletionService,
    request: &GradeRequest,
) -> CoreResult<Feedback> {
    if request.user_answer.trim().is_empty() {
        return Err(CoreError::InvalidRequest("userAnswer must not be empty".to_string()));
    }
    let raw = service.complete(&grading_prompt(request)).await?;
    parse_feedback(&raw)
}

/// Slice out the outermost `{ ... }` of a model reply.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn string_list(v: Option<&Value>) -> Vec<String> {
    match v {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|i| match i {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => s
            .lines()
            .map(|l| l.trim().trim_start_matches(['-', '*', '•']).trim().to_string())
            .filter(|l| !l.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn field<'a>(obj: &'a Value, camel: &str, snake: &str) -> Option<&'a Value> {
    obj.get(camel).or_else(|| obj.get(snake))
}

/// Reshape a model reply into `Feedback`. Scores are rounded and clamped to 0–10.
pub fn parse_feedback(raw: &str) -> CoreResult<Feedback> {
    let json = extract_json_object(raw)
        .ok_or_else(|| CoreError::Parse("no JSON object in grading reply".to_string()))?;
    let obj: Value = serde_json::from_str(json)
        .map_err(|e| CoreError::Parse(format!("grading reply is not valid JSON: {}", e)))?;

    let score = field(&obj, "score", "score0to10")
        .or_else(|| obj.get("score_0_to_10"))
        .and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
        .ok_or_else(|| CoreError::Parse("grading reply has no numeric score".to_string()))?;
    let score = score.round().clamp(0.0, f64::from(Feedback::MAX_SCORE)) as u8;

    let feedback = Feedback {
        score,
        strengths: string_list(obj.get("strengths")),
        gaps: string_list(obj.get("gaps")),
        corrected_answer_outline: string_list(field(
            &obj,
            "correctedAnswerOutline",
            "corrected_answer_outline",
        )),
        next_best_sentence: field(&obj, "nextBestSentence", "next_best_sentence")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    }
    .normalized();
    debug!(score = feedback.score, gaps = feedback.gaps.len(), "Feedback parsed");
    Ok(feedback)
}

fn covers(answer_tokens: &std::collections::HashSet<String>, rubric_entry: &str) -> bool {
    let significant: Vec<String> = tokens(rubric_entry)
        .into_iter()
        .filter(|t| t.len() > 3)
        .collect();
    if significant.is_empty() {
        return false;
    }
    significant.iter().any(|t| answer_tokens.contains(t))
}

/// Offline grader: scores by rubric coverage, caps brief answers.
pub fn rubric_feedback(request: &GradeRequest) -> Feedback {
    let item = &request.plan_item;
    let answer_tokens = tokens(&request.user_answer);
    let words = word_count(&request.user_answer);

    let (covered, missing): (Vec<&String>, Vec<&String>) =
        item.rubric.iter().partition(|r| covers(&answer_tokens, r));

    let mut score = if item.rubric.is_empty() {
        (words / 10).min(10) as u8
    } else {
        ((covered.len() * 10) as f32 / item.rubric.len() as f32).round() as u8
    };
    if words < BRIEF_ANSWER_WORDS {
        score = score.min(4);
    }

    let mut strengths: Vec<String> = covered.iter().map(|r| format!("Covered {}", r)).collect();
    if words >= 40 {
        strengths.push("Gave a complete, developed answer".to_string());
    }
    let mut gaps: Vec<String> = missing.iter().map(|r| format!("Missing {}", r)).collect();
    if words < BRIEF_ANSWER_WORDS {
        gaps.push("Answer was too brief".to_string());
    }

    let next_best_sentence = missing
        .first()
        .map(|r| format!("Add a sentence that addresses {}.", r))
        .or_else(|| item.ideal_answer_outline.last().cloned())
        .unwrap_or_default();

    Feedback {
        score,
        strengths,
        gaps,
        corrected_answer_outline: item.ideal_answer_outline.clone(),
        next_best_sentence,
    }
    .normalized()
}
