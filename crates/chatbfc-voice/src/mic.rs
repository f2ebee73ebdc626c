//! Microphone recognizer: cpal capture, VAD segmentation, then transcription.
//!
//! The capture stream lives on its own thread for the length of a run. Closed segments
//! go to a tokio task that transcribes them and emits final results on the run's sink.

use crate::audio::{AudioCapture, AudioChunk, AudioConfig};
use crate::capture::{RecognitionError, RecognitionEvent, Recognizer, RecognizerSignal, SignalSink};
use crate::error::{VoiceError, VoiceResult};
use crate::stt::SttBackend;
use crate::vad::{SpeechSegmenter, VadConfig, VadDetector};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct MicConfig {
    pub sample_rate: u32,
    pub vad_mode: u8,
    /// Pause that closes a segment. Keep it well under the session's silence window.
    pub segment_gap_ms: u64,
    pub min_speech_ms: u64,
    pub max_segment_ms: u64,
}

impl Default for MicConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            vad_mode: 2,
            segment_gap_ms: 600,
            min_speech_ms: 250,
            max_segment_ms: 30_000,
        }
    }
}

struct MicRun {
    stop: Arc<AtomicBool>,
    worker: JoinHandle<()>,
}

pub struct MicRecognizer {
    config: MicConfig,
    stt: Arc<dyn SttBackend>,
    run: Option<MicRun>,
}

impl MicRecognizer {
    pub fn new(config: MicConfig, stt: Arc<dyn SttBackend>) -> Self {
        Self {
            config,
            stt,
            run: None,
        }
    }
}

impl Recognizer for MicRecognizer {
    fn start(&mut self, sink: SignalSink) -> VoiceResult<()> {
        self.stop();

        let stop = Arc::new(AtomicBool::new(false));
        let (segment_tx, mut segment_rx) = mpsc::unbounded_channel::<Vec<f32>>();
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let config = self.config.clone();
        let thread_stop = stop.clone();
        thread::Builder::new()
            .name("chatbfc-mic".to_string())
            .spawn(move || capture_thread(config, thread_stop, segment_tx, ready_tx))?;

        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                stop.store(true, Ordering::SeqCst);
                return Err(e);
            }
            Err(_) => {
                stop.store(true, Ordering::SeqCst);
                return Err(VoiceError::AudioDevice("microphone did not open".to_string()));
            }
        }

        let stt = self.stt.clone();
        let sample_rate = self.config.sample_rate;
        let worker = tokio::spawn(async move {
            while let Some(samples) = segment_rx.recv().await {
                sink.send(RecognizerSignal::Result(RecognitionEvent {
                    final_text: String::new(),
                    interim_text: "…".to_string(),
                }));
                match stt.transcribe(&samples, sample_rate).await {
                    Ok(text) if !text.is_empty() => {
                        sink.send(RecognizerSignal::Result(RecognitionEvent {
                            final_text: text,
                            interim_text: String::new(),
                        }));
                    }
                    Ok(_) => debug!("Segment had no speech"),
                    Err(e) => {
                        warn!(error = %e, "Transcription failed");
                        sink.send(RecognizerSignal::Error(RecognitionError::Network));
                        return;
                    }
                }
            }
            sink.send(RecognizerSignal::Ended);
        });

        info!("Microphone recognizer started");
        self.run = Some(MicRun { stop, worker });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(run) = self.run.take() {
            run.stop.store(true, Ordering::SeqCst);
            run.worker.abort();
            debug!("Microphone recognizer stopped");
        }
    }
}

impl Drop for MicRecognizer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_thread(
    config: MicConfig,
    stop: Arc<AtomicBool>,
    segments: mpsc::UnboundedSender<Vec<f32>>,
    ready: std_mpsc::Sender<VoiceResult<()>>,
) {
    let audio_config = AudioConfig {
        sample_rate: config.sample_rate,
        channels: 1,
        buffer_size: (config.sample_rate as usize * 30) / 1000,
    };
    let opened = VadDetector::new(VadConfig {
        sample_rate: config.sample_rate,
        mode: config.vad_mode,
    })
    .and_then(|vad| {
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel::<AudioChunk>();
        let stream = AudioCapture::new(audio_config)?.start_capture(chunk_tx)?;
        Ok((vad, stream, chunk_rx))
    });
    let (mut vad, _stream, mut chunks) = match opened {
        Ok(parts) => parts,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    let mut segmenter = SpeechSegmenter::new(
        30,
        config.segment_gap_ms,
        config.min_speech_ms,
        config.max_segment_ms,
    );
    while !stop.load(Ordering::SeqCst) {
        match chunks.try_recv() {
            Ok(chunk) => {
                let is_speech = match vad.is_speech(&chunk.samples) {
                    Ok(speech) => speech,
                    Err(e) => {
                        debug!(error = %e, "VAD skipped chunk");
                        continue;
                    }
                };
                if let Some(segment) = segmenter.push(is_speech, &chunk.samples) {
                    if segments.send(segment).is_err() {
                        break;
                    }
                }
            }
            Err(mpsc::error::TryRecvError::Empty) => thread::sleep(Duration::from_millis(10)),
            Err(mpsc::error::TryRecvError::Disconnected) => break,
        }
    }
    debug!("Microphone capture thread exiting");
}
