//! Terminal practice runner: drives one ChatBFC session against the gateway.
//!
//! Typed lines are fed to the session as finalized speech; a pause longer than the
//! silence window closes the answer, exactly as with a microphone. Slash commands
//! control the session.

use anyhow::{bail, Context};
use chatbfc_core::{PracticeConfig, QuestionType, Role, SessionSettings, Stage, MAX_QUESTIONS};
use chatbfc_voice::{
    null_output, ChannelRecognizer, Collaborators, GatewayClient, OutputFactory, PlaceholderTts,
    PracticeSession, Recognizer, SessionHandle, SessionSnapshot, SessionStatus,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "\
Usage: chatbfc-practice [options]
  --firm <name>         Target firm (default: Evercore)
  --stage <stage>       coffee_chat | first_round | superday (default: first_round)
  --types <a,b>         Question types: behavioral,technical,fit,markets,brainteaser
  --questions <n>       Plan length, 1-15 (default: 5)
  --randomize           Shuffle eligible questions
  --hold                Hold-to-talk: /hold opens the mic, /hold again closes the answer
  --gateway <url>       Gateway base URL (default: CHATBFC_GATEWAY_URL)
  --no-follow-ups       Never ask a follow-up on the same question
  --speak               Play interviewer questions on the speakers (device-audio)
  --mic                 Answer through the microphone (device-audio)

Commands while running: /pause /resume /hold /end /status /quit";

#[derive(Debug, Clone, PartialEq)]
struct Options {
    settings: SessionSettings,
    gateway_url: Option<String>,
    follow_ups: bool,
    speak: bool,
    mic: bool,
}

fn parse_args<I>(args: I) -> anyhow::Result<Option<Options>>
where
    I: IntoIterator<Item = String>,
{
    let mut firm = "Evercore".to_string();
    let mut stage = Stage::FirstRound;
    let mut types = Vec::new();
    let mut questions = 5usize;
    let mut randomize = false;
    let mut hold = false;
    let mut gateway_url = None;
    let mut follow_ups = true;
    let mut speak = false;
    let mut mic = false;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .with_context(|| format!("{} needs a value", name))
        };
        match arg.as_str() {
            "--firm" => firm = value("--firm")?,
            "--stage" => {
                let raw = value("--stage")?;
                stage = Stage::parse(&raw).with_context(|| format!("unknown stage: {}", raw))?;
            }
            "--types" => {
                for raw in value("--types")?.split(',').filter(|s| !s.trim().is_empty()) {
                    let t = QuestionType::parse(raw)
                        .with_context(|| format!("unknown question type: {}", raw))?;
                    types.push(t);
                }
            }
            "--questions" => {
                let raw = value("--questions")?;
                questions = raw
                    .parse()
                    .with_context(|| format!("--questions expects a number, got {}", raw))?;
            }
            "--gateway" => gateway_url = Some(value("--gateway")?),
            "--randomize" => randomize = true,
            "--hold" => hold = true,
            "--no-follow-ups" => follow_ups = false,
            "--speak" => speak = true,
            "--mic" => mic = true,
            "-h" | "--help" => return Ok(None),
            other => bail!("unknown argument: {}\n\n{}", other, USAGE),
        }
    }
    if questions == 0 || questions > MAX_QUESTIONS {
        bail!("--questions must be between 1 and {}", MAX_QUESTIONS);
    }

    let settings = SessionSettings::new(firm, stage)
        .with_question_types(types)
        .with_num_questions(questions)
        .with_randomize(randomize)
        .with_hold_to_talk(hold);
    settings.validate()?;
    Ok(Some(Options {
        settings,
        gateway_url,
        follow_ups,
        speak,
        mic,
    }))
}

/// Prints what changed between two snapshots.
struct Printer {
    status: SessionStatus,
    turns: usize,
    graded: usize,
    error: Option<String>,
    banner: Option<String>,
    summary: Option<String>,
}

impl Printer {
    fn new() -> Self {
        Self {
            status: SessionStatus::Idle,
            turns: 0,
            graded: 0,
            error: None,
            banner: None,
            summary: None,
        }
    }

    fn show(&mut self, snap: &SessionSnapshot) {
        if snap.conversation.len() < self.turns {
            self.turns = 0;
            self.graded = 0;
        }
        for turn in &snap.conversation[self.turns..] {
            match turn.role {
                Role::Interviewer => println!("\nInterviewer: {}", turn.content),
                Role::User => println!("You: {}", turn.content),
            }
        }
        self.turns = snap.conversation.len();

        if snap.feedback_history.len() < self.graded {
            self.graded = 0;
        }
        for record in &snap.feedback_history[self.graded..] {
            let fb = &record.feedback;
            println!("  Score {}/10", fb.score);
            for s in &fb.strengths {
                println!("  + {}", s);
            }
            for g in &fb.gaps {
                println!("  - {}", g);
            }
            if !fb.next_best_sentence.is_empty() {
                println!("  Try: {}", fb.next_best_sentence);
            }
        }
        self.graded = snap.feedback_history.len();

        if snap.status != self.status {
            self.status = snap.status;
            match snap.status {
                SessionStatus::Listening if snap.capture_active => println!("[listening]"),
                SessionStatus::Listening => println!("[ready: /hold to answer]"),
                SessionStatus::Thinking => println!("[grading...]"),
                SessionStatus::Paused => println!("[paused: /resume to continue]"),
                _ => {}
            }
        }
        if snap.error != self.error {
            if let Some(e) = &snap.error {
                println!("! {}", e);
            }
            self.error = snap.error.clone();
        }
        if snap.capability_error != self.banner {
            if let Some(b) = &snap.capability_error {
                println!("! {}", b);
            }
            self.banner = snap.capability_error.clone();
        }
        if snap.final_summary != self.summary {
            if let Some(s) = &snap.final_summary {
                println!("\nSummary: {}", s);
            }
            self.summary = snap.final_summary.clone();
        }
    }
}

#[cfg(feature = "device-audio")]
fn audio_setup(
    options: &Options,
    collaborators: Collaborators,
    typed: ChannelRecognizer,
) -> anyhow::Result<(Collaborators, Box<dyn Recognizer>, OutputFactory)> {
    use chatbfc_voice::{AudioOutput, MicConfig, MicRecognizer, OpenAiStt, RodioOutput};

    let recognizer: Box<dyn Recognizer> = if options.mic {
        let stt = OpenAiStt::from_env()?;
        Box::new(MicRecognizer::new(MicConfig::default(), Arc::new(stt)))
    } else {
        Box::new(typed)
    };
    if options.speak {
        let output: OutputFactory =
            Box::new(|| Ok(Arc::new(RodioOutput::new()?) as Arc<dyn AudioOutput>));
        Ok((collaborators, recognizer, output))
    } else {
        Ok((
            collaborators.with_tts(Arc::new(PlaceholderTts)),
            recognizer,
            null_output(),
        ))
    }
}

#[cfg(not(feature = "device-audio"))]
fn audio_setup(
    options: &Options,
    collaborators: Collaborators,
    typed: ChannelRecognizer,
) -> anyhow::Result<(Collaborators, Box<dyn Recognizer>, OutputFactory)> {
    if options.speak || options.mic {
        bail!("--speak and --mic need a build with --features device-audio");
    }
    Ok((
        collaborators.with_tts(Arc::new(PlaceholderTts)),
        Box::new(typed),
        null_output(),
    ))
}

async fn run_commands(
    handle: &SessionHandle,
    feed: chatbfc_voice::RecognitionFeed,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut holding = false;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/pause" => handle.pause().await?,
            "/resume" => handle.resume().await?,
            "/end" => handle.end().await?,
            "/status" => {
                let snap = handle.snapshot();
                println!(
                    "[{} | question {}/{} | capture {} | playback {}]",
                    snap.status.label(),
                    (snap.current_index + 1).min(snap.plan.len()),
                    snap.plan.len(),
                    snap.capture_active,
                    snap.playback_active
                );
            }
            "/hold" => {
                if holding {
                    handle.hold_end().await?;
                } else {
                    handle.hold_start().await?;
                }
                holding = !holding;
            }
            text if text.starts_with('/') => println!("unknown command: {}", text),
            text => {
                if !feed.final_text(text) {
                    println!("(not listening right now)");
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[chatbfc-practice] .env not loaded: {} (using system environment)", e);
    }
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let Some(options) = parse_args(std::env::args().skip(1))? else {
        println!("{}", USAGE);
        return Ok(());
    };

    let mut config = PracticeConfig::from_env();
    if let Some(url) = &options.gateway_url {
        config.gateway_url = url.clone();
    }
    if !options.follow_ups {
        config = config.without_follow_ups();
    }
    info!(gateway = %config.gateway_url, silence_ms = config.silence_ms, "Practice config");

    let client = GatewayClient::new(&config.gateway_url)?;
    let (typed, feed) = ChannelRecognizer::new();
    let (collaborators, recognizer, output) =
        audio_setup(&options, Collaborators::gateway(client), typed)?;

    let handle = PracticeSession::spawn(config, collaborators, recognizer, output);
    let mut updates = handle.subscribe();
    let printer = tokio::spawn(async move {
        let mut printer = Printer::new();
        while updates.changed().await.is_ok() {
            let snap = updates.borrow_and_update().clone();
            printer.show(&snap);
        }
    });

    println!(
        "Practicing {} ({}), {} question(s). Type your answers; /quit to leave.",
        options.settings.firm,
        options.settings.stage.label(),
        options.settings.num_questions
    );
    handle.start(options.settings.clone()).await?;

    if let Err(e) = run_commands(&handle, feed).await {
        warn!(error = %e, "Input loop stopped");
    }

    // Ask for a summary before leaving when a session is still open.
    let snap = handle.snapshot();
    if !snap.plan.is_empty() && snap.final_summary.is_none() {
        handle.end().await?;
        let wait = handle.wait_for(|s| s.final_summary.is_some() || s.error.is_some());
        if tokio::time::timeout(std::time::Duration::from_secs(30), wait)
            .await
            .is_err()
        {
            warn!("Timed out waiting for the session summary");
        }
    }
    handle.shutdown().await;
    let _ = printer.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_match_a_first_round_session() {
        let options = parse_args(args(&[])).unwrap().unwrap();
        assert_eq!(options.settings.firm, "Evercore");
        assert_eq!(options.settings.stage, Stage::FirstRound);
        assert_eq!(options.settings.num_questions, 5);
        assert!(options.follow_ups);
        assert!(!options.settings.hold_to_talk);
    }

    #[test]
    fn flags_shape_the_settings() {
        let options = parse_args(args(&[
            "--firm", "Goldman Sachs", "--stage", "superday", "--types", "fit,technical",
            "--questions", "3", "--hold", "--no-follow-ups",
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(options.settings.firm, "Goldman Sachs");
        assert_eq!(options.settings.stage, Stage::Superday);
        assert_eq!(
            options.settings.question_types,
            vec![QuestionType::Fit, QuestionType::Technical]
        );
        assert_eq!(options.settings.num_questions, 3);
        assert!(options.settings.hold_to_talk);
        assert!(!options.follow_ups);
    }

    #[test]
    fn bad_arguments_are_rejected() {
        assert!(parse_args(args(&["--questions", "0"])).is_err());
        assert!(parse_args(args(&["--questions", "16"])).is_err());
        assert!(parse_args(args(&["--stage", "lunch"])).is_err());
        assert!(parse_args(args(&["--types", "trivia"])).is_err());
        assert!(parse_args(args(&["--firm"])).is_err());
        assert!(parse_args(args(&["--verbose"])).is_err());
        assert!(parse_args(args(&["--help"])).unwrap().is_none());
    }
}
