//! # ChatBFC Voice - Interview Turn-Taking
//!
//! This crate implements the practice-session state machine: it speaks a question, listens
//! for the answer, decides when the answer is over, has it graded, and moves through the
//! plan, with pause/resume and hold-to-talk controls.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Session State Machine (task)               │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐       │
//! │  │ Speech       │→ │ Turn         │→ │ Turn         │       │
//! │  │ Capture      │  │ Detector     │  │ Finalizer    │       │
//! │  │ (recognizer) │  │ (quiet gap)  │  │ (grading)    │       │
//! │  └──────────────┘  └──────────────┘  └──────────────┘       │
//! │         ↑ restart only after playback ends    ↓             │
//! │  ┌──────────────┐                    ┌──────────────┐       │
//! │  │  Playback    │←───────────────────│ Next step    │       │
//! │  │ (TTS + out)  │   speak question   │ (plan ptr)   │       │
//! │  └──────────────┘                    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! With the `device-audio` feature the crate also provides a microphone recognizer
//! (cpal capture, WebRTC VAD segmentation, OpenAI-compatible transcription) and a rodio
//! speaker output.

pub mod capture;
pub mod collaborators;
pub mod detector;
pub mod error;
pub mod finalizer;
pub mod playback;
pub mod session;

#[cfg(feature = "device-audio")]
pub mod audio;
#[cfg(feature = "device-audio")]
pub mod mic;
#[cfg(feature = "device-audio")]
pub mod stt;
#[cfg(feature = "device-audio")]
pub mod vad;

pub use capture::{
    CaptureSignal, ChannelRecognizer, RecognitionError, RecognitionEvent, RecognitionFeed,
    Recognizer, RecognizerSignal, SignalSink, SpeechCapture, UnsupportedRecognizer,
};
pub use collaborators::{
    Collaborators, GatewayClient, GradingService, PlanningService, SummaryService,
};
pub use detector::TurnDetector;
pub use error::{VoiceError, VoiceResult};
pub use finalizer::{FollowUpPolicy, NextStep};
pub use playback::{
    cap_text, null_output, AudioOutput, NullAudioOutput, OutputFactory, PlaceholderTts,
    PlaybackController, PlaybackOutcome, TtsBackend, DEFAULT_SPEAK_CAP,
};
pub use session::{
    FeedbackRecord, PracticeSession, SessionHandle, SessionSnapshot, SessionStatus,
};

#[cfg(feature = "device-audio")]
pub use audio::{AudioCapture, AudioChunk, AudioConfig, RodioOutput};
#[cfg(feature = "device-audio")]
pub use mic::{MicConfig, MicRecognizer};
#[cfg(feature = "device-audio")]
pub use stt::{OpenAiStt, SttBackend};
#[cfg(feature = "device-audio")]
pub use vad::{SpeechSegmenter, VadConfig, VadDetector};
