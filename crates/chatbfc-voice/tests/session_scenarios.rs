//! End-to-end session scenarios against in-process collaborators.
//!
//! Time is paused, so the silence window and capture restarts elapse as soon as the
//! runtime is idle.

use async_trait::async_trait;
use chatbfc_core::{
    EndRequest, EndResponse, Feedback, GradeRequest, PlanRequest, PlanResponse, PracticeConfig,
    QuestionItem, QuestionType, Role, SessionSettings, Stage,
};
use chatbfc_voice::{
    null_output, AudioOutput, ChannelRecognizer, Collaborators, GradingService, OutputFactory,
    PlaceholderTts, PlanningService, PlaybackOutcome, PracticeSession, RecognitionError,
    RecognitionEvent, RecognitionFeed, RecognizerSignal, SessionHandle, SessionSnapshot,
    SessionStatus, SummaryService, TtsBackend, UnsupportedRecognizer, VoiceError, VoiceResult,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

struct FakePlanner {
    items: usize,
}

#[async_trait]
impl PlanningService for FakePlanner {
    async fn fetch_plan(&self, _request: &PlanRequest) -> VoiceResult<PlanResponse> {
        if self.items == 0 {
            return Err(VoiceError::PlanUnavailable("no seed questions".to_string()));
        }
        let plan = (1..=self.items)
            .map(|n| QuestionItem {
                id: format!("q{}", n),
                question_type: QuestionType::Technical,
                question: format!("Question number {}?", n),
                rubric: vec!["valuation".to_string()],
                ideal_answer_outline: vec![],
            })
            .collect();
        Ok(PlanResponse {
            plan,
            seed_count: self.items,
        })
    }
}

#[derive(Default)]
struct FakeGrader {
    gate: Option<Arc<Semaphore>>,
    fail: bool,
    calls: AtomicUsize,
    answers: Mutex<Vec<String>>,
}

#[async_trait]
impl GradingService for FakeGrader {
    async fn grade(&self, request: &GradeRequest) -> VoiceResult<Feedback> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers.lock().unwrap().push(request.user_answer.clone());
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if self.fail {
            return Err(VoiceError::Upstream {
                service: "grading",
                status: Some(500),
                message: "upstream exploded".to_string(),
                request_id: Some("req-42".to_string()),
            });
        }
        Ok(Feedback {
            score: 7,
            strengths: vec!["Clear structure".to_string()],
            gaps: vec!["Terminal value".to_string()],
            corrected_answer_outline: vec![],
            next_best_sentence: "Mention the exit multiple.".to_string(),
        })
    }
}

struct FakeSummary;

#[async_trait]
impl SummaryService for FakeSummary {
    async fn summarize(&self, request: &EndRequest) -> VoiceResult<EndResponse> {
        Ok(EndResponse {
            final_summary: format!(
                "Covered {} questions in {} turns",
                request.asked_question_ids.len(),
                request.conversation.len()
            ),
        })
    }
}

struct FixedTts;

#[async_trait]
impl TtsBackend for FixedTts {
    async fn synthesize(&self, _text: &str) -> VoiceResult<Vec<u8>> {
        Ok(vec![1, 2, 3])
    }
}

/// Output whose clips finish only when the test opens the gate.
#[derive(Default)]
struct GatedOutput {
    gate: Arc<Notify>,
    plays: AtomicUsize,
    stops: AtomicUsize,
}

impl AudioOutput for GatedOutput {
    fn play(&self, _audio: Vec<u8>) -> BoxFuture<'static, PlaybackOutcome> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.clone();
        async move {
            gate.notified().await;
            PlaybackOutcome::Ended
        }
        .boxed()
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

fn gated_factory(output: Arc<GatedOutput>) -> OutputFactory {
    Box::new(move || Ok(output.clone() as Arc<dyn AudioOutput>))
}

fn settings() -> SessionSettings {
    SessionSettings::new("Evercore", Stage::FirstRound).with_num_questions(3)
}

/// Route session logs to the test writer; set `RUST_LOG=chatbfc_voice=debug` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn spawn_with(
    config: PracticeConfig,
    planner: FakePlanner,
    grader: Arc<FakeGrader>,
    tts: Arc<dyn TtsBackend>,
    output: OutputFactory,
) -> (SessionHandle, RecognitionFeed) {
    init_tracing();
    let (recognizer, feed) = ChannelRecognizer::new();
    let collaborators = Collaborators {
        planning: Arc::new(planner),
        grading: grader,
        summary: Arc::new(FakeSummary),
        tts,
    };
    let handle = PracticeSession::spawn(
        config,
        collaborators,
        Box::new(recognizer),
        output,
    );
    (handle, feed)
}

/// Every graded answer advances the plan.
fn spawn_session(items: usize, grader: Arc<FakeGrader>) -> (SessionHandle, RecognitionFeed) {
    spawn_configured(PracticeConfig::default().without_follow_ups(), items, grader)
}

fn spawn_configured(
    config: PracticeConfig,
    items: usize,
    grader: Arc<FakeGrader>,
) -> (SessionHandle, RecognitionFeed) {
    spawn_with(
        config,
        FakePlanner { items },
        grader,
        Arc::new(PlaceholderTts),
        null_output(),
    )
}

/// Listening again after the interviewer's `turns`-th conversation entry was spoken.
async fn wait_listening_after(handle: &SessionHandle, turns: usize) -> SessionSnapshot {
    handle
        .wait_for(|s| {
            s.status == SessionStatus::Listening
                && s.capture_active
                && s.conversation.len() == turns
        })
        .await
        .unwrap()
}

async fn wait_listening(handle: &SessionHandle, index: usize) {
    handle
        .wait_for(|s| {
            s.status == SessionStatus::Listening && s.capture_active && s.current_index == index
        })
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn single_question_answer_completes_the_session() {
    let grader = Arc::new(FakeGrader::default());
    let (handle, feed) = spawn_session(1, grader.clone());

    handle.start(settings()).await.unwrap();
    wait_listening(&handle, 0).await;
    assert!(feed.final_text("I would start with unlevered free cash flow"));

    let snap = handle
        .wait_for(|s| s.status == SessionStatus::Idle && s.feedback.is_some())
        .await
        .unwrap();
    assert_eq!(snap.conversation.len(), 2);
    assert_eq!(snap.conversation[0].role, Role::Interviewer);
    assert_eq!(snap.conversation[1].role, Role::User);
    assert_eq!(
        snap.conversation[1].content,
        "I would start with unlevered free cash flow"
    );
    assert_eq!(snap.feedback.as_ref().map(|f| f.score), Some(7));
    assert_eq!(snap.feedback_history.len(), 1);
    assert_eq!(snap.feedback_history[0].question_id, "q1");
    assert!(snap.error.is_none());
    assert_eq!(grader.calls.load(Ordering::SeqCst), 1);

    // Nothing keeps running once the session is idle.
    assert!(!snap.capture_active);
    assert!(!snap.playback_active);
    assert!(!feed.final_text("anyone there?"));
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn brief_answer_to_the_final_item_still_completes() {
    let grader = Arc::new(FakeGrader::default());
    let (handle, feed) = spawn_configured(PracticeConfig::default(), 1, grader.clone());

    handle.start(settings()).await.unwrap();
    wait_listening(&handle, 0).await;
    assert!(feed.final_text("I would use a DCF"));

    let snap = handle
        .wait_for(|s| s.status == SessionStatus::Idle && s.feedback.is_some())
        .await
        .unwrap();
    assert_eq!(snap.conversation.len(), 2);
    assert_eq!(snap.conversation[1].role, Role::User);
    assert_eq!(grader.calls.load(Ordering::SeqCst), 1);

    // No follow-up gets spoken after completion.
    tokio::time::sleep(Duration::from_secs(5)).await;
    let later = handle.snapshot();
    assert_eq!(later.status, SessionStatus::Idle);
    assert_eq!(later.conversation.len(), 2);
    assert!(!later.playback_active);
    assert!(!later.capture_active);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn brief_answers_get_one_follow_up_per_item() {
    let grader = Arc::new(FakeGrader::default());
    let (handle, feed) = spawn_configured(PracticeConfig::default(), 3, grader.clone());

    handle.start(settings()).await.unwrap();
    wait_listening(&handle, 0).await;
    feed.final_text("It is a valuation");

    // Same item, follow-up drawn from the first grading gap.
    let snap = wait_listening_after(&handle, 3).await;
    assert_eq!(snap.current_index, 0);
    assert_eq!(grader.calls.load(Ordering::SeqCst), 1);
    let last = snap.conversation.last().unwrap();
    assert_eq!(last.role, Role::Interviewer);
    assert_eq!(last.content, "Could you say more about terminal value?");

    // The allowance for this item is spent, so a second brief answer advances.
    feed.final_text("Discounted cash flows");
    let snap = wait_listening_after(&handle, 5).await;
    assert_eq!(snap.current_index, 1);
    assert_eq!(grader.calls.load(Ordering::SeqCst), 2);
    assert_eq!(snap.conversation[4].content, "Question number 2?");
    assert_eq!(snap.feedback_history.len(), 2);
    assert!(snap.feedback_history.iter().all(|r| r.question_id == "q1"));

    // A fresh item gets a fresh allowance.
    feed.final_text("Comparable companies");
    let snap = wait_listening_after(&handle, 7).await;
    assert_eq!(snap.current_index, 1);
    assert_eq!(
        snap.conversation[6].content,
        "Could you say more about terminal value?"
    );

    feed.final_text(
        "I would pick a peer set on size and sector, then apply the median multiples to our metrics",
    );
    let snap = wait_listening_after(&handle, 9).await;
    assert_eq!(snap.current_index, 2);
    assert_eq!(grader.calls.load(Ordering::SeqCst), 4);

    feed.final_text("Accretion");
    let done = handle
        .wait_for(|s| s.status == SessionStatus::Idle && s.feedback_history.len() == 5)
        .await
        .unwrap();
    assert_eq!(done.conversation.len(), 10);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn repeated_follow_up_is_replaced_by_a_clarifier() {
    let config = PracticeConfig {
        max_follow_ups: 2,
        ..PracticeConfig::default()
    };
    let grader = Arc::new(FakeGrader::default());
    let (handle, feed) = spawn_configured(config, 2, grader);

    handle.start(settings()).await.unwrap();
    wait_listening(&handle, 0).await;
    feed.final_text("It is a valuation");
    let snap = wait_listening_after(&handle, 3).await;
    assert_eq!(
        snap.conversation[2].content,
        "Could you say more about terminal value?"
    );

    feed.final_text("Cash flows");
    let snap = wait_listening_after(&handle, 5).await;
    assert_eq!(snap.current_index, 0);
    assert_eq!(
        snap.conversation[4].content,
        "Could you expand on that with a specific example?"
    );
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn follow_up_graded_while_paused_is_asked_on_resume() {
    let gate = Arc::new(Semaphore::new(0));
    let grader = Arc::new(FakeGrader {
        gate: Some(gate.clone()),
        ..Default::default()
    });
    let (handle, feed) = spawn_configured(PracticeConfig::default(), 2, grader);

    handle.start(settings()).await.unwrap();
    wait_listening(&handle, 0).await;
    feed.final_text("It is a valuation");
    handle
        .wait_for(|s| s.status == SessionStatus::Thinking)
        .await
        .unwrap();
    handle.pause().await.unwrap();
    handle
        .wait_for(|s| s.status == SessionStatus::Paused)
        .await
        .unwrap();
    gate.add_permits(1);

    let paused = handle.wait_for(|s| s.pending_next).await.unwrap();
    assert_eq!(paused.status, SessionStatus::Paused);
    assert_eq!(paused.current_index, 0);
    assert_eq!(paused.conversation.len(), 2);

    handle.resume().await.unwrap();
    let resumed = wait_listening_after(&handle, 3).await;
    assert!(!resumed.pending_next);
    assert_eq!(resumed.current_index, 0);
    assert_eq!(
        resumed.conversation[2].content,
        "Could you say more about terminal value?"
    );
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn chunks_accumulate_until_the_silence_window_elapses() {
    let grader = Arc::new(FakeGrader::default());
    let (handle, feed) = spawn_session(1, grader.clone());

    handle.start(settings()).await.unwrap();
    wait_listening(&handle, 0).await;
    feed.final_text("First I would");
    tokio::time::sleep(Duration::from_millis(600)).await;
    feed.final_text("discount the cash flows");
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(grader.calls.load(Ordering::SeqCst), 0);

    let snap = handle
        .wait_for(|s| s.status == SessionStatus::Idle && s.feedback.is_some())
        .await
        .unwrap();
    assert_eq!(
        snap.conversation[1].content,
        "First I would discount the cash flows"
    );
    assert_eq!(grader.calls.load(Ordering::SeqCst), 1);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn pause_after_grading_defers_the_next_question() {
    let gate = Arc::new(Semaphore::new(0));
    let grader = Arc::new(FakeGrader {
        gate: Some(gate.clone()),
        ..Default::default()
    });
    let (handle, feed) = spawn_session(3, grader.clone());

    let overlap = Arc::new(AtomicBool::new(false));
    let mut rx = handle.subscribe();
    let seen = overlap.clone();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let snap = rx.borrow().clone();
            if snap.capture_active && snap.playback_active {
                seen.store(true, Ordering::SeqCst);
            }
        }
    });

    handle.start(settings()).await.unwrap();
    wait_listening(&handle, 0).await;
    feed.final_text("Answer to the first question");
    gate.add_permits(1);
    wait_listening(&handle, 1).await;

    feed.final_text("Answer to the second question");
    handle
        .wait_for(|s| s.status == SessionStatus::Thinking)
        .await
        .unwrap();
    handle.pause().await.unwrap();
    handle
        .wait_for(|s| s.status == SessionStatus::Paused)
        .await
        .unwrap();
    gate.add_permits(1);

    let paused = handle.wait_for(|s| s.pending_next).await.unwrap();
    assert_eq!(paused.status, SessionStatus::Paused);
    assert_eq!(paused.current_index, 1);
    assert_eq!(paused.feedback_history.len(), 2);
    assert!(!paused.capture_active);

    // Stays put while paused.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(handle.snapshot().status, SessionStatus::Paused);

    handle.resume().await.unwrap();
    let resumed = handle
        .wait_for(|s| s.status == SessionStatus::Listening && s.current_index == 2)
        .await
        .unwrap();
    assert!(!resumed.pending_next);
    let last = resumed.conversation.last().unwrap();
    assert_eq!(last.role, Role::Interviewer);
    assert_eq!(last.content, "Question number 3?");
    assert!(!overlap.load(Ordering::SeqCst));
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn grading_failure_returns_to_idle_with_the_answer_kept() {
    let grader = Arc::new(FakeGrader {
        fail: true,
        ..Default::default()
    });
    let (handle, feed) = spawn_session(2, grader);

    handle.start(settings()).await.unwrap();
    wait_listening(&handle, 0).await;
    feed.final_text("My answer before the outage");

    let snap = handle
        .wait_for(|s| s.status == SessionStatus::Idle && s.error.is_some())
        .await
        .unwrap();
    let error = snap.error.unwrap();
    assert!(error.contains("HTTP 500"), "{}", error);
    assert!(error.contains("req-42"), "{}", error);
    let last = snap.conversation.last().unwrap();
    assert_eq!(last.role, Role::User);
    assert_eq!(last.content, "My answer before the outage");
    assert!(snap.feedback.is_none());
    assert!(!snap.capture_active);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn no_speech_restarts_capture_without_an_error() {
    let grader = Arc::new(FakeGrader::default());
    let (handle, feed) = spawn_session(1, grader);

    handle.start(settings()).await.unwrap();
    wait_listening(&handle, 0).await;
    assert_eq!(feed.start_count(), 1);

    assert!(feed.error(RecognitionError::NoSpeech));
    tokio::time::sleep(Duration::from_millis(350)).await;

    assert_eq!(feed.start_count(), 2);
    let snap = handle.snapshot();
    assert_eq!(snap.status, SessionStatus::Listening);
    assert!(snap.capture_active);
    assert!(snap.error.is_none());
    assert!(snap.capability_error.is_none());

    // The recognizer ending on its own is handled the same way.
    assert!(feed.end());
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(feed.start_count(), 3);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn permission_denied_pauses_with_a_banner() {
    let grader = Arc::new(FakeGrader::default());
    let (handle, feed) = spawn_session(1, grader);

    handle.start(settings()).await.unwrap();
    wait_listening(&handle, 0).await;
    feed.error(RecognitionError::NotAllowed);

    let snap = handle
        .wait_for(|s| s.status == SessionStatus::Paused)
        .await
        .unwrap();
    assert_eq!(
        snap.capability_error.as_deref(),
        Some("Microphone permission was denied")
    );
    assert!(!snap.capture_active);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(feed.start_count(), 1);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unsupported_recognizer_surfaces_capability_error() {
    let collaborators = Collaborators {
        planning: Arc::new(FakePlanner { items: 1 }),
        grading: Arc::new(FakeGrader::default()),
        summary: Arc::new(FakeSummary),
        tts: Arc::new(PlaceholderTts),
    };
    let handle = PracticeSession::spawn(
        PracticeConfig::default(),
        collaborators,
        Box::new(UnsupportedRecognizer),
        null_output(),
    );
    handle.start(settings()).await.unwrap();
    let snap = handle
        .wait_for(|s| s.capability_error.is_some())
        .await
        .unwrap();
    assert_eq!(snap.status, SessionStatus::Paused);
    assert!(snap
        .capability_error
        .unwrap()
        .contains("not supported"));
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn microphone_stays_closed_while_the_interviewer_speaks() {
    let output = Arc::new(GatedOutput::default());
    let (handle, feed) = spawn_with(
        PracticeConfig::default().without_follow_ups(),
        FakePlanner { items: 2 },
        Arc::new(FakeGrader::default()),
        Arc::new(FixedTts),
        gated_factory(output.clone()),
    );

    handle.start(settings()).await.unwrap();
    let speaking = handle
        .wait_for(|s| s.status == SessionStatus::SpeakingIntro && s.playback_active)
        .await
        .unwrap();
    assert!(!speaking.capture_active);
    assert!(!feed.is_active());
    assert!(!feed.final_text("the interviewer's own voice"));

    output.gate.notify_one();
    wait_listening(&handle, 0).await;
    let snap = handle.snapshot();
    assert!(!snap.playback_active);
    assert_eq!(snap.conversation.len(), 1);
    assert_eq!(output.plays.load(Ordering::SeqCst), 1);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn pause_while_speaking_stops_playback_and_resume_listens() {
    let output = Arc::new(GatedOutput::default());
    let (handle, feed) = spawn_with(
        PracticeConfig::default().without_follow_ups(),
        FakePlanner { items: 1 },
        Arc::new(FakeGrader::default()),
        Arc::new(FixedTts),
        gated_factory(output.clone()),
    );

    handle.start(settings()).await.unwrap();
    handle
        .wait_for(|s| s.status == SessionStatus::SpeakingIntro && s.playback_active)
        .await
        .unwrap();
    handle.pause().await.unwrap();
    let paused = handle
        .wait_for(|s| s.status == SessionStatus::Paused)
        .await
        .unwrap();
    assert!(!paused.playback_active);
    assert!(!paused.capture_active);
    assert!(output.stops.load(Ordering::SeqCst) >= 1);

    handle.resume().await.unwrap();
    wait_listening(&handle, 0).await;
    assert!(output.plays.load(Ordering::SeqCst) <= 1);
    assert!(feed.is_active());
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn partial_answer_survives_pause_and_resume() {
    let grader = Arc::new(FakeGrader::default());
    let (handle, feed) = spawn_session(1, grader.clone());

    handle.start(settings()).await.unwrap();
    wait_listening(&handle, 0).await;
    feed.push(RecognizerSignal::Result(RecognitionEvent {
        final_text: "I would start with revenue".to_string(),
        interim_text: "and then".to_string(),
    }));
    handle
        .wait_for(|s| s.interim_text == "and then")
        .await
        .unwrap();

    handle.pause().await.unwrap();
    let paused = handle
        .wait_for(|s| s.status == SessionStatus::Paused)
        .await
        .unwrap();
    assert!(paused.interim_text.is_empty());
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(grader.calls.load(Ordering::SeqCst), 0);

    handle.resume().await.unwrap();
    let snap = handle
        .wait_for(|s| s.status == SessionStatus::Idle && s.feedback.is_some())
        .await
        .unwrap();
    assert_eq!(snap.conversation[1].content, "I would start with revenue");
    assert_eq!(grader.answers.lock().unwrap().len(), 1);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn hold_to_talk_finalizes_on_release() {
    let grader = Arc::new(FakeGrader::default());
    let (handle, feed) = spawn_session(1, grader.clone());

    handle
        .start(settings().with_hold_to_talk(true))
        .await
        .unwrap();
    let listening = handle
        .wait_for(|s| s.status == SessionStatus::Listening)
        .await
        .unwrap();
    assert!(!listening.capture_active);

    handle.hold_start().await.unwrap();
    handle
        .wait_for(|s| s.hold_engaged && s.capture_active)
        .await
        .unwrap();
    feed.final_text("Held answer");
    // No silence window in hold mode.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(grader.calls.load(Ordering::SeqCst), 0);

    handle.hold_end().await.unwrap();
    let snap = handle
        .wait_for(|s| s.status == SessionStatus::Idle && s.feedback.is_some())
        .await
        .unwrap();
    assert_eq!(snap.conversation[1].content, "Held answer");
    assert!(!snap.hold_engaged);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn end_requests_a_summary_of_the_session() {
    let grader = Arc::new(FakeGrader::default());
    let (handle, feed) = spawn_session(3, grader);

    handle.start(settings()).await.unwrap();
    wait_listening(&handle, 0).await;
    feed.final_text("First answer");
    wait_listening(&handle, 1).await;
    feed.push(RecognizerSignal::Result(RecognitionEvent {
        final_text: "Half an answer".to_string(),
        interim_text: "um".to_string(),
    }));
    handle.wait_for(|s| s.interim_text == "um").await.unwrap();
    handle.end().await.unwrap();

    let snap = handle
        .wait_for(|s| s.final_summary.is_some())
        .await
        .unwrap();
    assert_eq!(snap.status, SessionStatus::Idle);
    assert!(!snap.capture_active);
    assert_eq!(
        snap.final_summary.as_deref(),
        Some("Covered 2 questions in 4 turns")
    );
    assert!(!feed.final_text("late words"));
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn missing_plan_reports_an_error() {
    let (handle, _feed) = spawn_session(0, Arc::new(FakeGrader::default()));
    handle.start(settings()).await.unwrap();
    let snap = handle
        .wait_for(|s| s.error.is_some() && !s.loading)
        .await
        .unwrap();
    assert_eq!(snap.status, SessionStatus::Idle);
    assert!(snap.conversation.is_empty());
    handle.shutdown().await;
}
