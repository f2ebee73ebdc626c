//! **Speech Capture**: the adapter around a streaming recognizer.
//!
//! A `Recognizer` produces `RecognizerSignal`s while started. `SpeechCapture` tags every
//! signal with the capture generation so the session can drop signals from a run it has
//! already stopped, and schedules the delayed restart after transient failures (the
//! underlying recognizers end on their own every so often).

use crate::error::{VoiceError, VoiceResult};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One recognition event. `final_text` covers this event only, not the whole turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecognitionEvent {
    pub final_text: String,
    pub interim_text: String,
}

/// Recognition failure kinds, named after the usual recognizer error codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    NoSpeech,
    Network,
    Aborted,
    NotAllowed,
    ServiceNotAllowed,
    AudioCapture,
    Unsupported,
    Other(String),
}

impl RecognitionError {
    /// Transient errors are recovered by restarting; everything else is a capability error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RecognitionError::NoSpeech | RecognitionError::Network | RecognitionError::Aborted
        )
    }

    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "no-speech" => RecognitionError::NoSpeech,
            "network" => RecognitionError::Network,
            "aborted" => RecognitionError::Aborted,
            "not-allowed" => RecognitionError::NotAllowed,
            "service-not-allowed" => RecognitionError::ServiceNotAllowed,
            "audio-capture" => RecognitionError::AudioCapture,
            "unsupported" => RecognitionError::Unsupported,
            other => RecognitionError::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            RecognitionError::NoSpeech => "no-speech",
            RecognitionError::Network => "network",
            RecognitionError::Aborted => "aborted",
            RecognitionError::NotAllowed => "not-allowed",
            RecognitionError::ServiceNotAllowed => "service-not-allowed",
            RecognitionError::AudioCapture => "audio-capture",
            RecognitionError::Unsupported => "unsupported",
            RecognitionError::Other(code) => code,
        }
    }

    /// Banner text for capability errors.
    pub fn describe(&self) -> String {
        match self {
            RecognitionError::NotAllowed | RecognitionError::ServiceNotAllowed => {
                "Microphone permission was denied".to_string()
            }
            RecognitionError::AudioCapture => "No microphone could be opened".to_string(),
            RecognitionError::Unsupported => {
                "Speech recognition is not supported here".to_string()
            }
            other => format!("Speech recognition failed ({})", other.code()),
        }
    }
}

impl fmt::Display for RecognitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerSignal {
    Result(RecognitionEvent),
    Error(RecognitionError),
    /// The recognizer stopped on its own.
    Ended,
}

/// A signal tagged with the capture generation that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSignal {
    pub generation: u64,
    pub signal: RecognizerSignal,
}

pub type SignalEmitter = Arc<dyn Fn(CaptureSignal) + Send + Sync>;

/// Handed to a recognizer on start; stamps each signal with the run's generation.
#[derive(Clone)]
pub struct SignalSink {
    generation: u64,
    emit: SignalEmitter,
}

impl SignalSink {
    pub fn new(generation: u64, emit: SignalEmitter) -> Self {
        Self { generation, emit }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn send(&self, signal: RecognizerSignal) {
        (self.emit)(CaptureSignal {
            generation: self.generation,
            signal,
        });
    }
}

impl fmt::Debug for SignalSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalSink")
            .field("generation", &self.generation)
            .finish()
    }
}

/// A continuous, interim-capable speech recognizer.
pub trait Recognizer: Send {
    /// Begin a run. Errors here are capability errors (no device, permission, unsupported).
    fn start(&mut self, sink: SignalSink) -> VoiceResult<()>;
    /// End the current run; must be safe to call when not started.
    fn stop(&mut self);
}

/// Owns the recognizer for one session.
pub struct SpeechCapture {
    recognizer: Box<dyn Recognizer>,
    generation: u64,
    active: bool,
    restart_delay: Duration,
    restart: Option<(u64, JoinHandle<()>)>,
}

impl SpeechCapture {
    pub fn new(recognizer: Box<dyn Recognizer>, restart_delay: Duration) -> Self {
        Self {
            recognizer,
            generation: 0,
            active: false,
            restart_delay,
            restart: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a new run. No-op when already active.
    pub fn start(&mut self, emit: SignalEmitter) -> VoiceResult<()> {
        self.cancel_restart();
        if self.active {
            return Ok(());
        }
        self.generation += 1;
        match self.recognizer.start(SignalSink::new(self.generation, emit)) {
            Ok(()) => {
                self.active = true;
                info!(generation = self.generation, "Speech capture started");
                Ok(())
            }
            Err(e) => {
                self.recognizer.stop();
                warn!(generation = self.generation, error = %e, "Speech capture failed to start");
                Err(match e {
                    VoiceError::Capability(_) => e,
                    other => VoiceError::Capability(other.to_string()),
                })
            }
        }
    }

    /// Stop the run and invalidate its signals. Also cancels a pending restart.
    pub fn stop(&mut self) {
        self.cancel_restart();
        if self.active {
            self.recognizer.stop();
            self.active = false;
            self.generation += 1;
            debug!(generation = self.generation, "Speech capture stopped");
        }
    }

    /// Whether a signal belongs to the live run.
    pub fn accepts(&self, signal: &CaptureSignal) -> bool {
        self.active && signal.generation == self.generation
    }

    /// The recognizer ended or failed on its own; later signals from that run are stale.
    pub fn mark_ended(&mut self) {
        if self.active {
            self.recognizer.stop();
            self.active = false;
            self.generation += 1;
        }
    }

    /// Call `notify(token)` after the restart delay. At most one restart is pending.
    pub fn schedule_restart<F>(&mut self, notify: F)
    where
        F: FnOnce(u64) + Send + 'static,
    {
        if self.restart.is_some() {
            return;
        }
        let token = self.generation;
        let delay = self.restart_delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            notify(token);
        });
        debug!(token, delay_ms = delay.as_millis() as u64, "Capture restart scheduled");
        self.restart = Some((token, handle));
    }

    /// Consume the pending restart if `token` is the one scheduled.
    pub fn take_restart(&mut self, token: u64) -> bool {
        match &self.restart {
            Some((pending, _)) if *pending == token => {
                self.restart = None;
                true
            }
            _ => false,
        }
    }

    pub fn restart_pending(&self) -> bool {
        self.restart.is_some()
    }

    fn cancel_restart(&mut self) {
        if let Some((_, handle)) = self.restart.take() {
            handle.abort();
        }
    }
}

impl Drop for SpeechCapture {
    fn drop(&mut self) {
        self.cancel_restart();
        self.recognizer.stop();
    }
}

#[derive(Default)]
struct FeedShared {
    sink: Mutex<Option<SignalSink>>,
    active: AtomicBool,
    starts: AtomicUsize,
}

/// Recognizer whose signals are pushed in by code: typed input, a remote transcriber,
/// or a test script. Signals pushed while it is not started are dropped.
pub struct ChannelRecognizer {
    shared: Arc<FeedShared>,
}

/// Producer side of a `ChannelRecognizer`.
#[derive(Clone)]
pub struct RecognitionFeed {
    shared: Arc<FeedShared>,
}

impl ChannelRecognizer {
    pub fn new() -> (Self, RecognitionFeed) {
        let shared = Arc::new(FeedShared::default());
        (
            Self {
                shared: shared.clone(),
            },
            RecognitionFeed { shared },
        )
    }
}

impl Recognizer for ChannelRecognizer {
    fn start(&mut self, sink: SignalSink) -> VoiceResult<()> {
        let mut slot = self
            .shared
            .sink
            .lock()
            .map_err(|e| VoiceError::Recognition(format!("feed lock poisoned: {}", e)))?;
        *slot = Some(sink);
        self.shared.active.store(true, Ordering::SeqCst);
        self.shared.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        if let Ok(mut slot) = self.shared.sink.lock() {
            *slot = None;
        }
        self.shared.active.store(false, Ordering::SeqCst);
    }
}

impl RecognitionFeed {
    /// Push a raw signal. Returns false when the recognizer is not started.
    pub fn push(&self, signal: RecognizerSignal) -> bool {
        let sink = match self.shared.sink.lock() {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        match sink {
            Some(sink) => {
                sink.send(signal);
                true
            }
            None => {
                debug!("Recognition input dropped: capture not active");
                false
            }
        }
    }

    /// A finalized chunk.
    pub fn final_text(&self, text: &str) -> bool {
        self.push(RecognizerSignal::Result(RecognitionEvent {
            final_text: text.to_string(),
            interim_text: String::new(),
        }))
    }

    pub fn interim(&self, text: &str) -> bool {
        self.push(RecognizerSignal::Result(RecognitionEvent {
            final_text: String::new(),
            interim_text: text.to_string(),
        }))
    }

    pub fn error(&self, error: RecognitionError) -> bool {
        self.push(RecognizerSignal::Error(error))
    }

    pub fn end(&self) -> bool {
        self.push(RecognizerSignal::Ended)
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// How many runs have been started.
    pub fn start_count(&self) -> usize {
        self.shared.starts.load(Ordering::SeqCst)
    }
}

/// Recognizer for environments with no speech capability; every start fails.
#[derive(Debug, Default)]
pub struct UnsupportedRecognizer;

impl Recognizer for UnsupportedRecognizer {
    fn start(&mut self, _sink: SignalSink) -> VoiceResult<()> {
        Err(VoiceError::Capability(RecognitionError::Unsupported.describe()))
    }

    fn stop(&mut self) {}
}
