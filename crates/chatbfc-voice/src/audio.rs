//! Microphone capture (cpal) and speaker output (rodio).
//!
//! Both device handles are `!Send` on some platforms, so each lives on the thread that
//! opened it: capture is driven from the microphone recognizer's thread, and `RodioOutput`
//! runs a dedicated output thread that it talks to over a channel.

use crate::error::{VoiceError, VoiceResult};
use crate::playback::{AudioOutput, PlaybackOutcome};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use futures::future::BoxFuture;
use futures::FutureExt;
use rodio::{Decoder, OutputStream, Sink, Source};
use std::io::Cursor;
use std::sync::{mpsc as std_mpsc, Mutex};
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Audio configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Sample rate in Hz (default: 16000)
    pub sample_rate: u32,

    /// Number of channels (default: 1 for mono)
    pub channels: u16,

    /// Samples per chunk (default: 480, 30ms at 16kHz, the frame size the VAD wants)
    pub buffer_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            buffer_size: 480,
        }
    }
}

/// Audio chunk sent from the capture callback
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Samples (f32, -1.0..1.0)
    pub samples: Vec<f32>,
}

/// Microphone capture on the default input device
pub struct AudioCapture {
    config: AudioConfig,
    device: Device,
    stream_config: StreamConfig,
}

impl AudioCapture {
    pub fn new(config: AudioConfig) -> VoiceResult<Self> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| VoiceError::AudioDevice("No input device available".to_string()))?;
        info!(
            device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
            sample_rate = config.sample_rate,
            "Opening audio input"
        );
        let default_config = device.default_input_config()?;
        debug!(?default_config, "Default input config");

        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(config.buffer_size as u32),
        };
        Ok(Self {
            config,
            device,
            stream_config,
        })
    }

    /// Start the input stream; fixed-size chunks go to `chunk_tx`. Keep the stream alive.
    pub fn start_capture(self, chunk_tx: mpsc::UnboundedSender<AudioChunk>) -> VoiceResult<Stream> {
        let buffer_size = self.config.buffer_size;
        let mut sample_buffer = Vec::with_capacity(buffer_size);

        let stream = self.device.build_input_stream(
            &self.stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for &sample in data {
                    sample_buffer.push(sample);
                    if sample_buffer.len() >= buffer_size {
                        let chunk = AudioChunk {
                            samples: std::mem::replace(
                                &mut sample_buffer,
                                Vec::with_capacity(buffer_size),
                            ),
                        };
                        if chunk_tx.send(chunk).is_err() {
                            return;
                        }
                    }
                }
            },
            move |err| {
                warn!("Audio stream error: {}", err);
            },
            None,
        )?;
        stream.play()?;
        info!("Audio capture started");
        Ok(stream)
    }

    pub fn list_input_devices() -> VoiceResult<Vec<String>> {
        let devices = cpal::default_host().input_devices()?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }
}

enum OutputCommand {
    Play {
        audio: Vec<u8>,
        done: oneshot::Sender<PlaybackOutcome>,
    },
    Stop,
}

/// Speaker output on the default device, one clip at a time.
pub struct RodioOutput {
    commands: Mutex<std_mpsc::Sender<OutputCommand>>,
}

impl RodioOutput {
    pub fn new() -> VoiceResult<Self> {
        let (commands, rx) = std_mpsc::channel();
        let (ready_tx, ready_rx) = std_mpsc::channel();
        thread::Builder::new()
            .name("chatbfc-audio-out".to_string())
            .spawn(move || output_thread(rx, ready_tx))?;
        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("Audio output ready");
                Ok(Self {
                    commands: Mutex::new(commands),
                })
            }
            Ok(Err(message)) => Err(VoiceError::Playback(message)),
            Err(_) => Err(VoiceError::Playback("audio output thread exited".to_string())),
        }
    }

    fn send(&self, command: OutputCommand) -> bool {
        match self.commands.lock() {
            Ok(tx) => tx.send(command).is_ok(),
            Err(_) => false,
        }
    }
}

impl AudioOutput for RodioOutput {
    fn play(&self, audio: Vec<u8>) -> BoxFuture<'static, PlaybackOutcome> {
        let (done, finished) = oneshot::channel();
        if !self.send(OutputCommand::Play { audio, done }) {
            return futures::future::ready(PlaybackOutcome::Failed(
                "audio output thread exited".to_string(),
            ))
            .boxed();
        }
        async move { finished.await.unwrap_or(PlaybackOutcome::Stopped) }.boxed()
    }

    fn stop(&self) {
        self.send(OutputCommand::Stop);
    }
}

fn output_thread(
    rx: std_mpsc::Receiver<OutputCommand>,
    ready: std_mpsc::Sender<Result<(), String>>,
) {
    let (_stream, handle) = match OutputStream::try_default() {
        Ok(pair) => pair,
        Err(e) => {
            let _ = ready.send(Err(e.to_string()));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    let mut current: Option<(Sink, oneshot::Sender<PlaybackOutcome>)> = None;
    loop {
        match rx.recv_timeout(Duration::from_millis(20)) {
            Ok(OutputCommand::Play { audio, done }) => {
                if let Some((sink, previous)) = current.take() {
                    sink.stop();
                    let _ = previous.send(PlaybackOutcome::Stopped);
                }
                let source = match Decoder::new(Cursor::new(audio)) {
                    Ok(source) => source,
                    Err(e) => {
                        let _ = done.send(PlaybackOutcome::Failed(format!("decode failed: {}", e)));
                        continue;
                    }
                };
                match Sink::try_new(&handle) {
                    Ok(sink) => {
                        sink.append(source.convert_samples::<f32>());
                        current = Some((sink, done));
                    }
                    Err(e) => {
                        let _ = done.send(PlaybackOutcome::Blocked(e.to_string()));
                    }
                }
            }
            Ok(OutputCommand::Stop) => {
                if let Some((sink, done)) = current.take() {
                    sink.stop();
                    let _ = done.send(PlaybackOutcome::Stopped);
                }
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {}
            Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
        }

        if let Some((sink, done)) = current.take() {
            if sink.empty() {
                let _ = done.send(PlaybackOutcome::Ended);
            } else {
                current = Some((sink, done));
            }
        }
    }
    debug!("Audio output thread stopped");
}
