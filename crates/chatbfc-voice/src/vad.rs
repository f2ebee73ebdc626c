//! Voice activity detection (WebRTC VAD) and gap-based segmentation of microphone audio.
//!
//! `SpeechSegmenter` turns per-chunk speech/silence decisions into utterance segments:
//! a segment opens on speech, stays open across short pauses and closes once the gap
//! reaches the configured length. Segments too short to be speech are dropped.

use crate::error::{VoiceError, VoiceResult};
use tracing::{debug, info};
use webrtc_vad::{SampleRate, Vad, VadMode};

#[derive(Debug, Clone)]
pub struct VadConfig {
    /// 8000, 16000, 32000 or 48000 Hz
    pub sample_rate: u32,

    /// Aggressiveness 0-3
    pub mode: u8,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            mode: 2,
        }
    }
}

fn build_vad(config: &VadConfig) -> VoiceResult<Vad> {
    let sample_rate = match config.sample_rate {
        8000 => SampleRate::Rate8kHz,
        16000 => SampleRate::Rate16kHz,
        32000 => SampleRate::Rate32kHz,
        48000 => SampleRate::Rate48kHz,
        other => {
            return Err(VoiceError::Config(format!(
                "WebRTC VAD only supports 8000, 16000, 32000, or 48000 Hz, got {}",
                other
            )))
        }
    };
    let mode = match config.mode {
        0 => VadMode::Quality,
        1 => VadMode::LowBitrate,
        2 => VadMode::Aggressive,
        3 => VadMode::VeryAggressive,
        other => return Err(VoiceError::Config(format!("VAD mode must be 0-3, got {}", other))),
    };
    let mut vad = Vad::new();
    vad.set_mode(mode);
    vad.set_sample_rate(sample_rate);
    Ok(vad)
}

pub struct VadDetector {
    vad: Vad,
    config: VadConfig,
    chunk_size: usize,
}

impl VadDetector {
    pub fn new(config: VadConfig) -> VoiceResult<Self> {
        let vad = build_vad(&config)?;
        // 30ms frames
        let chunk_size = (config.sample_rate as usize * 30) / 1000;
        info!(sample_rate = config.sample_rate, mode = config.mode, chunk_size, "VAD initialized");
        Ok(Self {
            vad,
            config,
            chunk_size,
        })
    }

    /// Whether this 30ms chunk contains speech.
    pub fn is_speech(&mut self, audio: &[f32]) -> VoiceResult<bool> {
        if audio.len() != self.chunk_size {
            return Err(VoiceError::Config(format!(
                "Expected {} samples, got {}",
                self.chunk_size,
                audio.len()
            )));
        }
        let pcm: Vec<i16> = audio
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
            .collect();
        self.vad
            .is_voice_segment(&pcm)
            .map_err(|_| VoiceError::Config("VAD rejected the frame".to_string()))
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    pub fn reset(&mut self) -> VoiceResult<()> {
        self.vad = build_vad(&self.config)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentState {
    Silence,
    Speech,
    Gap,
}

/// Gap logic over fixed-size chunks.
#[derive(Debug)]
pub struct SpeechSegmenter {
    gap_chunks: usize,
    min_speech_chunks: usize,
    max_chunks: usize,
    state: SegmentState,
    speech_chunks: usize,
    gap_run: usize,
    buffer: Vec<f32>,
}

impl SpeechSegmenter {
    pub fn new(chunk_ms: u64, gap_ms: u64, min_speech_ms: u64, max_segment_ms: u64) -> Self {
        let chunks = |ms: u64| ((ms + chunk_ms - 1) / chunk_ms.max(1)) as usize;
        Self {
            gap_chunks: chunks(gap_ms).max(1),
            min_speech_chunks: chunks(min_speech_ms),
            max_chunks: chunks(max_segment_ms).max(1),
            state: SegmentState::Silence,
            speech_chunks: 0,
            gap_run: 0,
            buffer: Vec::new(),
        }
    }

    /// Feed one chunk; returns a finished segment when the gap closes one.
    pub fn push(&mut self, is_speech: bool, chunk: &[f32]) -> Option<Vec<f32>> {
        match (self.state, is_speech) {
            (SegmentState::Silence, false) => return None,
            (SegmentState::Silence, true) => {
                self.state = SegmentState::Speech;
                self.buffer.clear();
                self.speech_chunks = 1;
                self.buffer.extend_from_slice(chunk);
            }
            (SegmentState::Speech, true) | (SegmentState::Gap, true) => {
                self.state = SegmentState::Speech;
                self.gap_run = 0;
                self.speech_chunks += 1;
                self.buffer.extend_from_slice(chunk);
            }
            (SegmentState::Speech, false) | (SegmentState::Gap, false) => {
                self.state = SegmentState::Gap;
                self.gap_run += 1;
                self.buffer.extend_from_slice(chunk);
                if self.gap_run >= self.gap_chunks {
                    return self.close();
                }
            }
        }
        if self.speech_chunks + self.gap_run >= self.max_chunks {
            debug!("Max segment length reached");
            return self.close();
        }
        None
    }

    fn close(&mut self) -> Option<Vec<f32>> {
        let speech = self.speech_chunks;
        self.state = SegmentState::Silence;
        self.speech_chunks = 0;
        self.gap_run = 0;
        let segment = std::mem::take(&mut self.buffer);
        if speech < self.min_speech_chunks {
            debug!(speech_chunks = speech, "Segment too short, dropped");
            return None;
        }
        Some(segment)
    }

    pub fn is_idle(&self) -> bool {
        self.state == SegmentState::Silence
    }
}
