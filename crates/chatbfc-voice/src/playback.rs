//! **Playback Controller**: speak interviewer text and report when it has finished.
//!
//! Text is capped to a speakable length, synthesized through a `TtsBackend` and played on
//! one `AudioOutput` that is created on first use and reused afterwards. The completion
//! future of `speak` never fails: synthesis errors, a missing output device and an
//! interrupted playback all resolve to a `PlaybackOutcome` so the caller can always move on.

use crate::error::VoiceResult;
use async_trait::async_trait;
use futures::future::{self, AbortHandle, Abortable, BoxFuture};
use futures::FutureExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default hard cap on spoken interviewer text.
pub const DEFAULT_SPEAK_CAP: usize = 280;

/// Backend that turns text into audio bytes (MP3/WAV). Empty bytes mean nothing to play.
#[async_trait]
pub trait TtsBackend: Send + Sync {
    async fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>>;
}

/// Returns empty audio, so every `speak` resolves `Skipped`. For text-only runs.
#[derive(Debug, Default)]
pub struct PlaceholderTts;

#[async_trait]
impl TtsBackend for PlaceholderTts {
    async fn synthesize(&self, _text: &str) -> VoiceResult<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// How a playback request resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Audio played to the end.
    Ended,
    /// Superseded or stopped before the end.
    Stopped,
    /// Nothing to play (empty text or empty audio).
    Skipped,
    /// Synthesis or decoding failed.
    Failed(String),
    /// No output could be opened.
    Blocked(String),
}

impl PlaybackOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            PlaybackOutcome::Ended => "ended",
            PlaybackOutcome::Stopped => "stopped",
            PlaybackOutcome::Skipped => "skipped",
            PlaybackOutcome::Failed(_) => "failed",
            PlaybackOutcome::Blocked(_) => "blocked",
        }
    }
}

/// A sink that plays one clip at a time.
pub trait AudioOutput: Send + Sync {
    /// Play `audio`; the future resolves when playback ends or is stopped.
    fn play(&self, audio: Vec<u8>) -> BoxFuture<'static, PlaybackOutcome>;
    /// Stop whatever is playing.
    fn stop(&self);
}

/// Output with no device behind it: every clip "plays" instantly.
#[derive(Debug, Default)]
pub struct NullAudioOutput;

impl AudioOutput for NullAudioOutput {
    fn play(&self, _audio: Vec<u8>) -> BoxFuture<'static, PlaybackOutcome> {
        future::ready(PlaybackOutcome::Ended).boxed()
    }

    fn stop(&self) {}
}

/// Builds the audio output on first use.
pub type OutputFactory = Box<dyn Fn() -> VoiceResult<Arc<dyn AudioOutput>> + Send + Sync>;

pub fn null_output() -> OutputFactory {
    Box::new(|| Ok(Arc::new(NullAudioOutput) as Arc<dyn AudioOutput>))
}

/// Cap `text` at `limit` characters.
///
/// Text within the limit is returned trimmed. Longer text is cut after the last `.`, `!`
/// or `?` inside the limit when that boundary lies past 40% of the limit; otherwise it is
/// cut at a word boundary within `limit - 1` characters and `…` is appended.
pub fn cap_text(text: &str, limit: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= limit {
        return text.to_string();
    }
    if limit == 0 {
        return String::new();
    }

    let head: String = text.chars().take(limit).collect();
    let min_boundary = limit * 2 / 5;
    let sentence_end = head
        .char_indices()
        .filter(|(_, c)| matches!(c, '.' | '!' | '?'))
        .map(|(i, _)| i)
        .last();
    if let Some(i) = sentence_end {
        // Punctuation is ASCII so the byte after it starts the next char.
        if head[..i].chars().count() + 1 > min_boundary {
            return head[..=i].to_string();
        }
    }

    let room: String = text.chars().take(limit - 1).collect();
    let next_is_space = text
        .chars()
        .nth(limit - 1)
        .map(char::is_whitespace)
        .unwrap_or(false);
    let cut = if next_is_space {
        room.as_str()
    } else {
        match room.rfind(char::is_whitespace) {
            Some(i) if i > 0 => &room[..i],
            _ => room.as_str(),
        }
    };
    format!("{}…", cut.trim_end())
}

pub struct PlaybackController {
    tts: Arc<dyn TtsBackend>,
    factory: OutputFactory,
    output: Option<Arc<dyn AudioOutput>>,
    cap_chars: usize,
    token: u64,
    active: bool,
    abort: Option<AbortHandle>,
}

impl PlaybackController {
    pub fn new(tts: Arc<dyn TtsBackend>, factory: OutputFactory, cap_chars: usize) -> Self {
        Self {
            tts,
            factory,
            output: None,
            cap_chars,
            token: 0,
            active: false,
            abort: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    fn output(&mut self) -> VoiceResult<Arc<dyn AudioOutput>> {
        if let Some(out) = &self.output {
            return Ok(out.clone());
        }
        let out = (self.factory)()?;
        info!("Audio output ready");
        self.output = Some(out.clone());
        Ok(out)
    }

    /// Start speaking `text`, superseding any current playback.
    ///
    /// Returns the playback token and a future that resolves when playback is over.
    pub fn speak(&mut self, text: &str) -> (u64, BoxFuture<'static, PlaybackOutcome>) {
        self.stop();
        self.token += 1;
        self.active = true;
        let token = self.token;

        let spoken = cap_text(text, self.cap_chars);
        let output = match self.output() {
            Ok(out) => out,
            Err(e) => {
                warn!(error = %e, "Audio output unavailable");
                return (
                    token,
                    future::ready(PlaybackOutcome::Blocked(e.to_string())).boxed(),
                );
            }
        };
        let tts = self.tts.clone();
        let work = async move {
            if spoken.is_empty() {
                return PlaybackOutcome::Skipped;
            }
            match tts.synthesize(&spoken).await {
                Ok(audio) if audio.is_empty() => PlaybackOutcome::Skipped,
                Ok(audio) => output.play(audio).await,
                Err(e) => PlaybackOutcome::Failed(e.to_string()),
            }
        };
        let (handle, registration) = AbortHandle::new_pair();
        self.abort = Some(handle);
        debug!(token, "Playback requested");
        let fut = Abortable::new(work, registration)
            .map(|res| res.unwrap_or(PlaybackOutcome::Stopped))
            .boxed();
        (token, fut)
    }

    /// Stop playback immediately. The pending completion resolves `Stopped`.
    pub fn stop(&mut self) {
        if let Some(handle) = self.abort.take() {
            handle.abort();
        }
        if self.active {
            if let Some(out) = &self.output {
                out.stop();
            }
            self.active = false;
            self.token += 1;
            debug!("Playback stopped");
        }
    }

    /// Record completion of `token`. False when it was superseded or stopped.
    pub fn finish(&mut self, token: u64) -> bool {
        if self.active && token == self.token {
            self.active = false;
            self.abort = None;
            true
        } else {
            false
        }
    }

    /// Drop the output so the device is released.
    pub fn release(&mut self) {
        self.stop();
        self.output = None;
    }
}
