//! Configuration for the gateway (`CoreConfig`, file + environment via the `config` crate)
//! and for the practice client (`PracticeConfig`, environment toggles).

use crate::error::CoreResult;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Which completion backend the gateway uses for grading and summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmMode {
    /// Rubric-coverage grading and feedback-derived summaries; no network.
    Mock,
    /// OpenRouter chat completions.
    Openrouter,
}

impl LlmMode {
    pub fn label(&self) -> &'static str {
        match self {
            LlmMode::Mock => "mock",
            LlmMode::Openrouter => "openrouter",
        }
    }
}

/// Gateway configuration.
///
/// Precedence: environment (`CHATBFC__PORT`, `CHATBFC__LLM_MODE`, ...) > file named by
/// `CHATBFC_CONFIG` (default `config/gateway.{toml}`) > defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub app_name: String,
    pub port: u16,
    pub llm_mode: LlmMode,
    /// Chat model used for grading and summaries in `openrouter` mode.
    pub llm_model: String,
    /// Optional JSON/TOML seed file; the built-in seed set is used when unset.
    #[serde(default)]
    pub question_bank_path: Option<String>,
    pub tts_model: String,
    pub tts_voice: String,
    /// Base URL of the OpenAI-compatible speech endpoint (without `/audio/speech`).
    pub tts_api_url: String,
}

impl CoreConfig {
    pub fn load() -> CoreResult<Self> {
        let config_path =
            std::env::var("CHATBFC_CONFIG").unwrap_or_else(|_| "config/gateway".to_string());
        let builder = config::Config::builder()
            .set_default("app_name", "ChatBFC Gateway")?
            .set_default("port", 8010_i64)?
            .set_default("llm_mode", "mock")?
            .set_default("llm_model", "meta-llama/llama-3.3-70b-instruct")?
            .set_default("tts_model", "tts-1")?
            .set_default("tts_voice", "alloy")?
            .set_default("tts_api_url", "https://api.openai.com/v1")?
            .add_source(config::File::with_name(&config_path).required(false))
            .add_source(config::Environment::with_prefix("CHATBFC").separator("__"));

        let built = builder.build()?;
        Ok(built.try_deserialize()?)
    }

    /// Completion API key: `CHATBFC_LLM_API_KEY` > `OPENROUTER_API_KEY`.
    pub fn llm_api_key() -> Option<String> {
        env_opt_string("CHATBFC_LLM_API_KEY").or_else(|| env_opt_string("OPENROUTER_API_KEY"))
    }

    /// Speech API key: `TTS_API_KEY` > `OPENAI_API_KEY`.
    pub fn tts_api_key() -> Option<String> {
        env_opt_string("TTS_API_KEY").or_else(|| env_opt_string("OPENAI_API_KEY"))
    }

    pub fn question_bank_path(&self) -> Option<&Path> {
        self.question_bank_path
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Path::new)
    }
}

/// Practice-client configuration loaded from environment.
///
/// | Env | Default | Description |
/// |-----|---------|-------------|
/// | CHATBFC_GATEWAY_URL | http://127.0.0.1:8010 | Base URL of the gateway. |
/// | CHATBFC_SILENCE_MS | 1000 | Quiet period after the last finalized chunk before the turn closes. |
/// | CHATBFC_SPEAK_CAP_CHARS | 280 | Hard cap on spoken interviewer text. |
/// | CHATBFC_RESTART_DELAY_MS | 300 | Delay before recognition restarts after a transient stop. |
/// | CHATBFC_SUMMARY_WINDOW | 20 | Conversation turns sent to the end-of-session summary. |
/// | CHATBFC_FOLLOW_UPS | true | Ask a same-question follow-up after a brief answer. |
/// | CHATBFC_FOLLOW_UP_MIN_WORDS | 12 | Answers shorter than this count as brief. |
/// | CHATBFC_MAX_FOLLOW_UPS | 1 | Follow-ups allowed per plan item. |
/// | CHATBFC_SIMILARITY_THRESHOLD | 0.75 | Jaccard score at which a follow-up counts as a repeat. |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticeConfig {
    pub gateway_url: String,
    pub silence_ms: u64,
    pub speak_cap_chars: usize,
    pub restart_delay_ms: u64,
    pub summary_window: usize,
    pub follow_ups_enabled: bool,
    pub follow_up_min_words: usize,
    pub max_follow_ups: usize,
    pub similarity_threshold: f32,
}

impl Default for PracticeConfig {
    fn default() -> Self {
        Self {
            gateway_url: "http://127.0.0.1:8010".to_string(),
            silence_ms: 1000,
            speak_cap_chars: 280,
            restart_delay_ms: 300,
            summary_window: 20,
            follow_ups_enabled: true,
            follow_up_min_words: 12,
            max_follow_ups: 1,
            similarity_threshold: 0.75,
        }
    }
}

impl PracticeConfig {
    /// Load from environment. Unset or invalid values fall back to defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            gateway_url: env_opt_string("CHATBFC_GATEWAY_URL")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(d.gateway_url),
            silence_ms: env_parse("CHATBFC_SILENCE_MS", d.silence_ms).clamp(200, 10_000),
            speak_cap_chars: env_parse("CHATBFC_SPEAK_CAP_CHARS", d.speak_cap_chars).max(40),
            restart_delay_ms: env_parse("CHATBFC_RESTART_DELAY_MS", d.restart_delay_ms),
            summary_window: env_parse("CHATBFC_SUMMARY_WINDOW", d.summary_window).max(1),
            follow_ups_enabled: env_bool("CHATBFC_FOLLOW_UPS", d.follow_ups_enabled),
            follow_up_min_words: env_parse("CHATBFC_FOLLOW_UP_MIN_WORDS", d.follow_up_min_words),
            max_follow_ups: env_parse("CHATBFC_MAX_FOLLOW_UPS", d.max_follow_ups),
            similarity_threshold: env_parse("CHATBFC_SIMILARITY_THRESHOLD", d.similarity_threshold)
                .clamp(0.0, 1.0),
        }
    }

    pub fn silence_period(&self) -> Duration {
        Duration::from_millis(self.silence_ms)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    /// Config with follow-ups switched off (every graded answer advances the plan).
    pub fn without_follow_ups(mut self) -> Self {
        self.follow_ups_enabled = false;
        self
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => {
            let v = v.trim();
            if v.is_empty() {
                default
            } else {
                v.eq_ignore_ascii_case("true") || v == "1"
            }
        }
        Err(_) => default,
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
