//! Question bank: the seed pool a session plan is drawn from.
//!
//! Seeds are tagged with the stages they suit and, optionally, the firms they are specific
//! to. A plan is built once per session: filter by stage and question type, prefer
//! firm-specific seeds, optionally shuffle, truncate to the requested count.

use crate::error::{CoreError, CoreResult};
use crate::types::{PlanRequest, PlanResponse, QuestionItem, QuestionType, Stage};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

const BUILTIN_SEEDS: &str = include_str!("../data/question_bank.json");

/// One seed question as stored in the bank file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedQuestion {
    pub id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    /// May contain a `{firm}` placeholder.
    pub question: String,
    /// Empty means every stage.
    #[serde(default)]
    pub stages: Vec<Stage>,
    /// Lowercase firm names this seed is specific to; empty means generic.
    #[serde(default)]
    pub firms: Vec<String>,
    #[serde(default)]
    pub rubric: Vec<String>,
    #[serde(default)]
    pub ideal_answer_outline: Vec<String>,
}

impl SeedQuestion {
    fn suits_stage(&self, stage: Stage) -> bool {
        self.stages.is_empty() || self.stages.contains(&stage)
    }

    fn suits_firm(&self, firm: &str) -> bool {
        self.firms.is_empty() || self.is_for_firm(firm)
    }

    fn is_for_firm(&self, firm: &str) -> bool {
        let firm = firm.trim();
        self.firms.iter().any(|f| f.trim().eq_ignore_ascii_case(firm))
    }

    fn to_item(&self, firm: &str) -> QuestionItem {
        QuestionItem {
            id: self.id.clone(),
            question_type: self.question_type,
            question: self.question.replace("{firm}", firm.trim()),
            rubric: self.rubric.clone(),
            ideal_answer_outline: self.ideal_answer_outline.clone(),
        }
    }
}

#[derive(Deserialize)]
struct TomlBank {
    #[serde(default)]
    questions: Vec<SeedQuestion>,
}

/// In-memory seed pool.
#[derive(Debug, Clone, Default)]
pub struct QuestionBank {
    seeds: Vec<SeedQuestion>,
}

impl QuestionBank {
    pub fn new(seeds: Vec<SeedQuestion>) -> Self {
        Self { seeds }
    }

    /// The seed set compiled into the crate.
    pub fn builtin() -> CoreResult<Self> {
        Self::from_json_str(BUILTIN_SEEDS)
    }

    pub fn from_json_str(s: &str) -> CoreResult<Self> {
        let seeds: Vec<SeedQuestion> = serde_json::from_str(s)?;
        Ok(Self::new(seeds))
    }

    /// TOML layout: a `[[questions]]` array of tables.
    pub fn from_toml_str(s: &str) -> CoreResult<Self> {
        let bank: TomlBank = toml::from_str(s)?;
        Ok(Self::new(bank.questions))
    }

    /// Load from a `.json` or `.toml` file.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let bank = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::from_toml_str(&content)?,
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::from_json_str(&content)?,
            other => {
                return Err(CoreError::QuestionBank(format!(
                    "unsupported question bank extension {:?} (expected .json or .toml)",
                    other
                )))
            }
        };
        info!(path = %path.display(), seeds = bank.len(), "Question bank loaded");
        Ok(bank)
    }

    /// Use `path` when given, the built-in set otherwise.
    pub fn load_or_builtin(path: Option<&Path>) -> CoreResult<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Self::builtin(),
        }
    }

    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }

    /// Seeds eligible for this request, firm-specific seeds first, bank order otherwise.
    pub fn matching(&self, request: &PlanRequest) -> Vec<&SeedQuestion> {
        let type_ok = |s: &SeedQuestion| {
            request.question_types.is_empty() || request.question_types.contains(&s.question_type)
        };
        let eligible = self
            .seeds
            .iter()
            .filter(|s| s.suits_stage(request.stage) && s.suits_firm(&request.firm) && type_ok(s));
        let (mut specific, generic): (Vec<_>, Vec<_>) =
            eligible.partition(|s| s.is_for_firm(&request.firm));
        specific.extend(generic);
        specific
    }

    /// Build a plan with the thread-local RNG.
    pub fn plan(&self, request: &PlanRequest) -> CoreResult<PlanResponse> {
        self.plan_with_rng(request, &mut rand::thread_rng())
    }

    pub fn plan_with_rng<R: Rng + ?Sized>(
        &self,
        request: &PlanRequest,
        rng: &mut R,
    ) -> CoreResult<PlanResponse> {
        if request.num_questions == 0 {
            return Err(CoreError::InvalidSettings(
                "numQuestions must be at least 1".to_string(),
            ));
        }
        let matches = self.matching(request);
        if matches.is_empty() {
            let types: Vec<&str> = request.question_types.iter().map(|t| t.label()).collect();
            return Err(CoreError::NoSeedQuestions(format!(
                "firm={}, stage={}, types=[{}]",
                request.firm,
                request.stage.label(),
                types.join(", ")
            )));
        }
        let seed_count = matches.len();

        let (mut specific, mut generic): (Vec<_>, Vec<_>) =
            matches.into_iter().partition(|s| s.is_for_firm(&request.firm));
        if request.randomize {
            specific.shuffle(rng);
            generic.shuffle(rng);
        }
        specific.extend(generic);
        specific.truncate(request.num_questions);

        if !request.randomize {
            // Interview arc: rapport first, brainteasers last.
            specific.sort_by_key(|s| type_rank(s.question_type));
        }

        let plan: Vec<QuestionItem> = specific.iter().map(|s| s.to_item(&request.firm)).collect();
        debug!(seed_count, planned = plan.len(), "Plan built");
        Ok(PlanResponse { plan, seed_count })
    }
}

fn type_rank(t: QuestionType) -> u8 {
    match t {
        QuestionType::Behavioral => 0,
        QuestionType::Fit => 1,
        QuestionType::Technical => 2,
        QuestionType::Markets => 3,
        QuestionType::Brainteaser => 4,
    }
}
