//! **Session State Machine**: owns the status, transcript and plan pointer of one practice
//! run and sequences capture, silence detection, playback and grading.
//!
//! The machine runs as a single task. Commands come in from a `SessionHandle`; every
//! asynchronous continuation (plan fetch, playback completion, silence timer, capture
//! restart, grade, summary) runs in a spawned task that posts a `SessionEvent` back and
//! never touches state itself. Continuations carry the session epoch (bumped by start and
//! end) and, where relevant, a playback token or capture/detector generation; the handler
//! re-reads the live status before acting, so a late result can never drive a transition
//! the session has already moved past.
//!
//! ```text
//! Idle ─start─▶ SpeakingIntro ─played─▶ Listening ─quiet─▶ Thinking ─graded─▶ Speaking
//!                                          ▲                                     │
//!                                          └──────────────played─────────────────┘
//! any active state ─pause─▶ Paused ─resume─▶ (pending step | Thinking | Listening)
//! ```

use crate::capture::{CaptureSignal, Recognizer, RecognizerSignal, SignalEmitter, SpeechCapture};
use crate::collaborators::Collaborators;
use crate::detector::TurnDetector;
use crate::error::{VoiceError, VoiceResult};
use crate::finalizer::{grade_request, next_step, FollowUpPolicy, NextStep, TurnContext};
use crate::playback::{OutputFactory, PlaybackController, PlaybackOutcome};
use chatbfc_core::{
    ConversationTurn, EndRequest, EndResponse, Feedback, PlanResponse, PracticeConfig,
    QuestionItem, Role, SessionSettings,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    SpeakingIntro,
    Listening,
    Thinking,
    Speaking,
    Paused,
}

impl SessionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::SpeakingIntro => "speaking_intro",
            SessionStatus::Listening => "listening",
            SessionStatus::Thinking => "thinking",
            SessionStatus::Speaking => "speaking",
            SessionStatus::Paused => "paused",
        }
    }

    pub fn is_speaking(&self) -> bool {
        matches!(self, SessionStatus::SpeakingIntro | SessionStatus::Speaking)
    }

    /// States `pause` applies to.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionStatus::SpeakingIntro
                | SessionStatus::Listening
                | SessionStatus::Thinking
                | SessionStatus::Speaking
        )
    }
}

/// Grading result for one answered turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub question_id: String,
    pub question_index: usize,
    pub answer: String,
    pub feedback: Feedback,
    pub recorded_at: DateTime<Utc>,
}

/// What the UI sees after every transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub conversation: Vec<ConversationTurn>,
    pub plan: Vec<QuestionItem>,
    pub current_index: usize,
    pub pending_next: bool,
    /// A plan request is outstanding. Status stays `Idle` meanwhile so a failed fetch
    /// leaves nothing to unwind; show a spinner off this flag rather than the status.
    pub loading: bool,
    /// Unfinalized recognizer text, for display only.
    pub interim_text: String,
    pub feedback: Option<Feedback>,
    pub feedback_history: Vec<FeedbackRecord>,
    pub error: Option<String>,
    /// Persistent banner for capture capability problems.
    pub capability_error: Option<String>,
    pub final_summary: Option<String>,
    pub capture_active: bool,
    pub playback_active: bool,
    pub hold_engaged: bool,
}

#[derive(Debug)]
enum Command {
    Start(SessionSettings),
    Pause,
    Resume,
    End,
    HoldStart,
    HoldEnd,
}

#[derive(Debug)]
enum SessionEvent {
    PlanReady {
        epoch: u64,
        result: VoiceResult<PlanResponse>,
    },
    PlaybackFinished {
        epoch: u64,
        token: u64,
        outcome: PlaybackOutcome,
    },
    Capture(CaptureSignal),
    SilenceElapsed {
        generation: u64,
    },
    CaptureRestart {
        token: u64,
    },
    GradeReady {
        epoch: u64,
        result: VoiceResult<Feedback>,
    },
    SummaryReady {
        epoch: u64,
        result: VoiceResult<EndResponse>,
    },
}

/// The state machine. Owned by its task; drive it through a `SessionHandle`.
pub struct PracticeSession {
    config: PracticeConfig,
    policy: FollowUpPolicy,
    collaborators: Collaborators,
    capture: SpeechCapture,
    detector: TurnDetector,
    playback: PlaybackController,

    status: SessionStatus,
    settings: Option<SessionSettings>,
    plan: Vec<QuestionItem>,
    current_index: usize,
    conversation: Vec<ConversationTurn>,
    accumulator: String,
    interim: String,
    pending: Option<NextStep>,
    finalize_in_flight: bool,
    follow_ups_asked: usize,
    hold_engaged: bool,
    loading: bool,
    epoch: u64,

    feedback: Option<Feedback>,
    feedback_history: Vec<FeedbackRecord>,
    error: Option<String>,
    capability_error: Option<String>,
    final_summary: Option<String>,

    events: mpsc::UnboundedSender<SessionEvent>,
    snapshot: watch::Sender<SessionSnapshot>,
}

impl PracticeSession {
    fn new(
        config: PracticeConfig,
        collaborators: Collaborators,
        recognizer: Box<dyn Recognizer>,
        output: OutputFactory,
    ) -> (
        Self,
        mpsc::UnboundedReceiver<SessionEvent>,
        watch::Receiver<SessionSnapshot>,
    ) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (snapshot, snapshot_rx) = watch::channel(SessionSnapshot::default());
        let session = Self {
            policy: FollowUpPolicy::from(&config),
            capture: SpeechCapture::new(recognizer, config.restart_delay()),
            detector: TurnDetector::new(config.silence_period()),
            playback: PlaybackController::new(
                collaborators.tts.clone(),
                output,
                config.speak_cap_chars,
            ),
            config,
            collaborators,
            status: SessionStatus::Idle,
            settings: None,
            plan: Vec::new(),
            current_index: 0,
            conversation: Vec::new(),
            accumulator: String::new(),
            interim: String::new(),
            pending: None,
            finalize_in_flight: false,
            follow_ups_asked: 0,
            hold_engaged: false,
            loading: false,
            epoch: 0,
            feedback: None,
            feedback_history: Vec::new(),
            error: None,
            capability_error: None,
            final_summary: None,
            events,
            snapshot,
        };
        (session, events_rx, snapshot_rx)
    }

    /// Spawn the state machine on the current runtime.
    pub fn spawn(
        config: PracticeConfig,
        collaborators: Collaborators,
        recognizer: Box<dyn Recognizer>,
        output: OutputFactory,
    ) -> SessionHandle {
        let (session, events_rx, snapshot_rx) =
            Self::new(config, collaborators, recognizer, output);
        let (commands, commands_rx) = mpsc::channel(32);
        let task = tokio::spawn(session.run(commands_rx, events_rx));
        SessionHandle {
            commands,
            snapshot: snapshot_rx,
            task,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        info!("Practice session task started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = events.recv() => self.handle_event(event),
            }
            self.publish();
        }
        self.shutdown();
        self.publish();
        info!("Practice session task stopped");
    }

    fn handle_command(&mut self, command: Command) {
        debug!(?command, status = self.status.label(), "Command");
        match command {
            Command::Start(settings) => self.start(settings),
            Command::Pause => self.pause(),
            Command::Resume => self.resume(),
            Command::End => self.end(),
            Command::HoldStart => self.hold_start(),
            Command::HoldEnd => self.hold_end(),
        }
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::PlanReady { epoch, result } => self.on_plan(epoch, result),
            SessionEvent::PlaybackFinished {
                epoch,
                token,
                outcome,
            } => self.on_playback_finished(epoch, token, outcome),
            SessionEvent::Capture(signal) => self.on_capture(signal),
            SessionEvent::SilenceElapsed { generation } => self.on_silence(generation),
            SessionEvent::CaptureRestart { token } => self.on_capture_restart(token),
            SessionEvent::GradeReady { epoch, result } => self.on_grade(epoch, result),
            SessionEvent::SummaryReady { epoch, result } => self.on_summary(epoch, result),
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            conversation: self.conversation.clone(),
            plan: self.plan.clone(),
            current_index: self.current_index,
            pending_next: self.pending.is_some(),
            loading: self.loading,
            interim_text: self.interim.clone(),
            feedback: self.feedback.clone(),
            feedback_history: self.feedback_history.clone(),
            error: self.error.clone(),
            capability_error: self.capability_error.clone(),
            final_summary: self.final_summary.clone(),
            capture_active: self.capture.is_active(),
            playback_active: self.playback.is_active(),
            hold_engaged: self.hold_engaged,
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(self.snapshot());
    }

    fn set_status(&mut self, status: SessionStatus) {
        if self.status != status {
            info!(
                from = self.status.label(),
                to = status.label(),
                epoch = self.epoch,
                index = self.current_index,
                "Session status"
            );
            self.status = status;
        }
    }

    fn hold_mode(&self) -> bool {
        self.settings.as_ref().map(|s| s.hold_to_talk).unwrap_or(false)
    }

    /// Capture is wanted only while listening (and, in hold mode, while the hold is engaged).
    fn should_capture(&self) -> bool {
        self.status == SessionStatus::Listening && (!self.hold_mode() || self.hold_engaged)
    }

    /// Stop every device-facing activity.
    fn silence_all(&mut self) {
        self.capture.stop();
        self.detector.clear();
        self.playback.stop();
        self.hold_engaged = false;
        self.interim.clear();
    }

    fn reset_session(&mut self) {
        self.silence_all();
        self.settings = None;
        self.plan.clear();
        self.current_index = 0;
        self.conversation.clear();
        self.accumulator.clear();
        self.pending = None;
        self.finalize_in_flight = false;
        self.follow_ups_asked = 0;
        self.loading = false;
        self.feedback = None;
        self.feedback_history.clear();
        self.error = None;
        self.capability_error = None;
        self.final_summary = None;
        self.epoch += 1;
        self.set_status(SessionStatus::Idle);
    }

    fn shutdown(&mut self) {
        self.silence_all();
        self.playback.release();
        self.epoch += 1;
    }

    // ── start ───────────────────────────────────────────────────────────

    fn start(&mut self, settings: SessionSettings) {
        self.reset_session();
        if let Err(e) = settings.validate() {
            self.error = Some(e.to_string());
            return;
        }
        info!(
            firm = %settings.firm,
            stage = settings.stage.label(),
            questions = settings.num_questions,
            hold_to_talk = settings.hold_to_talk,
            "Starting practice session"
        );
        let request = settings.plan_request();
        self.settings = Some(settings);
        self.loading = true;

        let epoch = self.epoch;
        let planning = self.collaborators.planning.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = planning.fetch_plan(&request).await;
            let _ = events.send(SessionEvent::PlanReady { epoch, result });
        });
    }

    fn on_plan(&mut self, epoch: u64, result: VoiceResult<PlanResponse>) {
        if epoch != self.epoch || !self.loading {
            debug!(epoch, current = self.epoch, "Stale plan ignored");
            return;
        }
        self.loading = false;
        let plan = match result {
            Ok(resp) if resp.plan.is_empty() => Err(VoiceError::PlanUnavailable(
                "the planner returned no questions".to_string(),
            )),
            other => other.map(|resp| resp.plan),
        };
        match plan {
            Ok(plan) => {
                info!(items = plan.len(), "Plan ready");
                self.plan = plan;
                self.current_index = 0;
                let question = self.plan[0].question.clone();
                self.conversation.push(ConversationTurn::interviewer(question.clone()));
                self.set_status(SessionStatus::SpeakingIntro);
                self.speak(&question);
            }
            Err(e) => {
                warn!(error = %e, "Plan unavailable");
                self.error = Some(e.to_string());
                self.settings = None;
                self.set_status(SessionStatus::Idle);
            }
        }
    }

    // ── playback ────────────────────────────────────────────────────────

    fn speak(&mut self, text: &str) {
        // The microphone must never hear the interviewer.
        self.capture.stop();
        self.detector.clear();
        let (token, done) = self.playback.speak(text);
        let epoch = self.epoch;
        let events = self.events.clone();
        tokio::spawn(async move {
            let outcome = done.await;
            let _ = events.send(SessionEvent::PlaybackFinished {
                epoch,
                token,
                outcome,
            });
        });
    }

    fn on_playback_finished(&mut self, epoch: u64, token: u64, outcome: PlaybackOutcome) {
        if epoch != self.epoch || !self.playback.finish(token) {
            debug!(token, outcome = outcome.label(), "Stale playback completion ignored");
            return;
        }
        match &outcome {
            PlaybackOutcome::Failed(reason) | PlaybackOutcome::Blocked(reason) => {
                warn!(outcome = outcome.label(), %reason, "Playback did not complete")
            }
            _ => debug!(outcome = outcome.label(), "Playback finished"),
        }
        if self.status.is_speaking() {
            self.begin_listening();
        }
    }

    // ── capture ─────────────────────────────────────────────────────────

    fn emitter(&self) -> SignalEmitter {
        let events = self.events.clone();
        Arc::new(move |signal| {
            let _ = events.send(SessionEvent::Capture(signal));
        })
    }

    fn begin_listening(&mut self) {
        self.set_status(SessionStatus::Listening);
        self.interim.clear();
        if self.hold_mode() {
            return;
        }
        if !self.accumulator.trim().is_empty() {
            self.rearm_detector();
        }
        self.start_capture();
    }

    fn start_capture(&mut self) {
        let emit = self.emitter();
        match self.capture.start(emit) {
            Ok(()) => self.capability_error = None,
            Err(e) => self.capability_fault(e.to_string()),
        }
    }

    /// Capture cannot run: surface a banner and hold the session in `Paused`.
    fn capability_fault(&mut self, message: String) {
        warn!(%message, "Speech capture unavailable");
        self.capture.stop();
        self.detector.clear();
        self.hold_engaged = false;
        self.capability_error = Some(message);
        self.set_status(SessionStatus::Paused);
    }

    fn rearm_detector(&mut self) {
        let events = self.events.clone();
        self.detector.rearm(move |generation| {
            let _ = events.send(SessionEvent::SilenceElapsed { generation });
        });
    }

    fn on_capture(&mut self, signal: CaptureSignal) {
        if !self.capture.accepts(&signal) {
            debug!(generation = signal.generation, "Stale capture signal ignored");
            return;
        }
        match signal.signal {
            RecognizerSignal::Result(event) => {
                if !self.should_capture() {
                    return;
                }
                let chunk = event.final_text.trim();
                if !chunk.is_empty() {
                    if !self.accumulator.is_empty() {
                        self.accumulator.push(' ');
                    }
                    self.accumulator.push_str(chunk);
                    if !self.hold_mode() {
                        self.rearm_detector();
                    }
                }
                self.interim = event.interim_text;
            }
            RecognizerSignal::Error(error) if error.is_transient() => {
                debug!(code = error.code(), "Transient recognition error");
                self.capture.mark_ended();
                self.schedule_capture_restart();
            }
            RecognizerSignal::Error(error) => {
                self.capability_fault(error.describe());
            }
            RecognizerSignal::Ended => {
                debug!("Recognizer ended");
                self.capture.mark_ended();
                self.schedule_capture_restart();
            }
        }
    }

    fn schedule_capture_restart(&mut self) {
        if !self.should_capture() {
            return;
        }
        let events = self.events.clone();
        self.capture.schedule_restart(move |token| {
            let _ = events.send(SessionEvent::CaptureRestart { token });
        });
    }

    fn on_capture_restart(&mut self, token: u64) {
        if !self.capture.take_restart(token) {
            debug!(token, "Stale capture restart ignored");
            return;
        }
        if self.should_capture() && !self.capture.is_active() {
            info!("Restarting speech capture");
            self.start_capture();
        }
    }

    fn on_silence(&mut self, generation: u64) {
        if !self.detector.take_fire(generation) {
            return;
        }
        if self.status == SessionStatus::Listening {
            self.finalize_turn();
        }
    }

    // ── hold-to-talk ────────────────────────────────────────────────────

    fn hold_start(&mut self) {
        if !self.hold_mode() || self.hold_engaged || self.status != SessionStatus::Listening {
            debug!(status = self.status.label(), "Hold ignored");
            return;
        }
        self.hold_engaged = true;
        self.start_capture();
    }

    fn hold_end(&mut self) {
        if !self.hold_engaged {
            return;
        }
        self.hold_engaged = false;
        self.capture.stop();
        if self.status == SessionStatus::Listening {
            self.finalize_turn();
        }
    }

    // ── finalize ────────────────────────────────────────────────────────

    /// Close the user's turn and send it for grading. Returns false when dropped.
    fn finalize_turn(&mut self) -> bool {
        if self.finalize_in_flight {
            debug!("Finalize dropped: grading already in flight");
            return false;
        }
        let answer = self.accumulator.trim().to_string();
        if answer.is_empty() {
            return false;
        }
        let (Some(settings), Some(item)) = (&self.settings, self.plan.get(self.current_index))
        else {
            return false;
        };
        let request = grade_request(settings, item, &answer);

        self.finalize_in_flight = true;
        self.accumulator.clear();
        self.interim.clear();
        self.detector.clear();
        self.conversation.push(ConversationTurn::user(answer));
        self.capture.stop();
        self.hold_engaged = false;
        self.set_status(SessionStatus::Thinking);

        let epoch = self.epoch;
        let grading = self.collaborators.grading.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = grading.grade(&request).await;
            let _ = events.send(SessionEvent::GradeReady { epoch, result });
        });
        true
    }

    fn last_turn(&self, role: Role) -> Option<&str> {
        self.conversation
            .iter()
            .rev()
            .find(|t| t.role == role)
            .map(|t| t.content.as_str())
    }

    fn on_grade(&mut self, epoch: u64, result: VoiceResult<Feedback>) {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "Stale grade ignored");
            return;
        }
        self.finalize_in_flight = false;
        let feedback = match result {
            Ok(feedback) => feedback,
            Err(e) => {
                warn!(error = %e, request_id = e.request_id(), "Grading failed");
                self.error = Some(e.to_string());
                self.pending = None;
                self.silence_all();
                self.set_status(SessionStatus::Idle);
                return;
            }
        };

        let answer = self.last_turn(Role::User).unwrap_or_default().to_string();
        if let Some(item) = self.plan.get(self.current_index) {
            info!(question = %item.id, score = feedback.score, "Answer graded");
            self.feedback_history.push(FeedbackRecord {
                question_id: item.id.clone(),
                question_index: self.current_index,
                answer: answer.clone(),
                feedback: feedback.clone(),
                recorded_at: Utc::now(),
            });
        }
        self.feedback = Some(feedback.clone());

        let ctx = TurnContext {
            plan_len: self.plan.len(),
            current_index: self.current_index,
            follow_ups_asked: self.follow_ups_asked,
            answer: &answer,
            last_interviewer: self.last_turn(Role::Interviewer),
        };
        let step = next_step(&self.policy, &ctx, &feedback);

        match step {
            NextStep::Complete => self.complete(),
            step if self.status == SessionStatus::Paused => {
                debug!(?step, "Graded while paused; step deferred");
                self.pending = Some(step);
            }
            step => self.apply_step(step),
        }
    }

    fn apply_step(&mut self, step: NextStep) {
        let text = match step {
            NextStep::Advance => {
                self.current_index += 1;
                self.follow_ups_asked = 0;
                match self.plan.get(self.current_index) {
                    Some(item) => item.question.clone(),
                    None => return self.complete(),
                }
            }
            NextStep::FollowUp(text) => {
                self.follow_ups_asked += 1;
                text
            }
            NextStep::Complete => return self.complete(),
        };
        self.conversation.push(ConversationTurn::interviewer(text.clone()));
        self.set_status(SessionStatus::Speaking);
        self.speak(&text);
    }

    fn complete(&mut self) {
        info!(answered = self.feedback_history.len(), "Plan complete");
        self.pending = None;
        self.silence_all();
        self.set_status(SessionStatus::Idle);
    }

    // ── pause / resume ──────────────────────────────────────────────────

    fn pause(&mut self) {
        if !self.status.is_active() {
            debug!(status = self.status.label(), "Pause ignored");
            return;
        }
        self.silence_all();
        self.set_status(SessionStatus::Paused);
    }

    fn resume(&mut self) {
        if self.status != SessionStatus::Paused {
            debug!(status = self.status.label(), "Resume ignored");
            return;
        }
        if let Some(step) = self.pending.take() {
            self.apply_step(step);
        } else if self.finalize_in_flight {
            self.set_status(SessionStatus::Thinking);
        } else {
            self.begin_listening();
        }
    }

    // ── end ─────────────────────────────────────────────────────────────

    fn end(&mut self) {
        let Some(settings) = self.settings.take() else {
            debug!("End ignored: no session");
            return;
        };
        self.silence_all();

        let leftover = self.accumulator.trim().to_string();
        self.accumulator.clear();
        if !leftover.is_empty() {
            self.conversation.push(ConversationTurn::user(leftover));
        }

        let asked_question_ids: Vec<String> = if self.plan.is_empty() {
            Vec::new()
        } else {
            let last = self.current_index.min(self.plan.len() - 1);
            self.plan[..=last].iter().map(|q| q.id.clone()).collect()
        };
        let window = self.config.summary_window;
        let skip = self.conversation.len().saturating_sub(window);
        let conversation: Vec<ConversationTurn> = self.conversation[skip..].to_vec();

        self.plan.clear();
        self.current_index = 0;
        self.pending = None;
        self.finalize_in_flight = false;
        self.follow_ups_asked = 0;
        self.loading = false;
        self.epoch += 1;
        self.set_status(SessionStatus::Idle);
        info!(asked = asked_question_ids.len(), turns = conversation.len(), "Session ended");

        if conversation.is_empty() {
            return;
        }
        let request = EndRequest {
            settings,
            asked_question_ids,
            conversation,
        };
        let epoch = self.epoch;
        let summary = self.collaborators.summary.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = summary.summarize(&request).await;
            let _ = events.send(SessionEvent::SummaryReady { epoch, result });
        });
    }

    fn on_summary(&mut self, epoch: u64, result: VoiceResult<EndResponse>) {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "Stale summary ignored");
            return;
        }
        match result {
            Ok(resp) => self.final_summary = Some(resp.final_summary),
            Err(e) => {
                warn!(error = %e, "Summary failed");
                self.error = Some(e.to_string());
            }
        }
    }
}

/// Client side of a running `PracticeSession`.
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    async fn send(&self, command: Command) -> VoiceResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|e| VoiceError::ChannelSend(e.to_string()))
    }

    pub async fn start(&self, settings: SessionSettings) -> VoiceResult<()> {
        self.send(Command::Start(settings)).await
    }

    pub async fn pause(&self) -> VoiceResult<()> {
        self.send(Command::Pause).await
    }

    pub async fn resume(&self) -> VoiceResult<()> {
        self.send(Command::Resume).await
    }

    pub async fn end(&self) -> VoiceResult<()> {
        self.send(Command::End).await
    }

    pub async fn hold_start(&self) -> VoiceResult<()> {
        self.send(Command::HoldStart).await
    }

    pub async fn hold_end(&self) -> VoiceResult<()> {
        self.send(Command::HoldEnd).await
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Wait until a published snapshot satisfies `predicate`.
    pub async fn wait_for<F>(&self, mut predicate: F) -> VoiceResult<SessionSnapshot>
    where
        F: FnMut(&SessionSnapshot) -> bool,
    {
        let mut rx = self.snapshot.clone();
        let snap = rx
            .wait_for(|s| predicate(s))
            .await
            .map_err(|e| VoiceError::ChannelSend(format!("session stopped: {}", e)))?;
        Ok(snap.clone())
    }

    /// Stop the task, releasing the recognizer and the audio output.
    pub async fn shutdown(self) {
        drop(self.commands);
        let _ = self.task.await;
    }
}
