use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use nuvem_voice::voice::{
    MicRecognizer, SpeakOutcome, SpeakerOutput, SpeechCapture, SpeechPlayback, SpeechToText,
    TextToSpeech,
};
use nuvem_voice::{ChatService, Config, OpenAiTutor, TutorReply, VoiceSession};

/// Nuvem - voice tutor for programming and English
#[derive(Parser)]
#[command(name = "nuvem", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Talk to the tutor: press Enter to speak, or type a question
    Converse,
    /// Capture one utterance and print the transcript
    Listen,
    /// Speak text sentence by sentence
    Speak {
        /// Text to speak
        text: String,
    },
    /// Ask the tutor a typed question
    Ask {
        /// The question
        question: String,
        /// Print the reply without speaking it
        #[arg(long)]
        mute: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn,nuvem_voice=info",
        1 => "info,nuvem_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Converse) {
        Command::Converse => converse(&config).await,
        Command::Listen => listen(&config).await,
        Command::Speak { text } => speak(&config, &text).await,
        Command::Ask { question, mute } => ask(&config, &question, mute).await,
    }
}

/// Interactive loop of voice or typed turns
async fn converse(config: &Config) -> anyhow::Result<()> {
    let session = VoiceSession::new(
        build_capture(config)?,
        build_playback(config)?,
        Arc::new(build_tutor(config)?),
    );

    if session.capture().is_supported() {
        println!("Press Enter to speak, type a question, or Ctrl-D to quit.");
    } else {
        println!("Speech recognition unavailable: type a question, or Ctrl-D to quit.");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        let turn = async {
            if line.trim().is_empty() {
                println!("Listening...");
                session.listen_and_respond().await
            } else {
                session.ask(&line).await
            }
        };

        let result = interruptible(turn, || session.stop()).await;

        match result {
            Ok(turn) => {
                println!("You: {}", turn.transcript);
                print_reply(&turn.reply);
                if let SpeakOutcome::Cancelled { .. } = turn.playback {
                    println!("(playback stopped)");
                }
            }
            Err(e) => eprintln!("Error: {e}"),
        }
    }

    Ok(())
}

/// Capture one utterance
async fn listen(config: &Config) -> anyhow::Result<()> {
    let capture = build_capture(config)?;
    println!("Listening...");

    let transcript = interruptible(capture.start(), || capture.stop()).await?;
    println!("{transcript}");
    Ok(())
}

/// Speak text through the playback engine
async fn speak(config: &Config, text: &str) -> anyhow::Result<()> {
    let playback = build_playback(config)?;

    let outcome = interruptible(playback.speak(text), || playback.cancel()).await?;

    tracing::debug!(?outcome, "speak finished");
    Ok(())
}

/// Ask one typed question
async fn ask(config: &Config, question: &str, mute: bool) -> anyhow::Result<()> {
    let tutor = Arc::new(build_tutor(config)?);

    if mute {
        print_reply(&tutor.respond(question.trim()).await?);
        return Ok(());
    }

    let session = VoiceSession::new(
        SpeechCapture::unsupported(config.capture_config()),
        build_playback(config)?,
        tutor,
    );

    let turn = interruptible(session.ask(question), || session.stop()).await?;

    print_reply(&turn.reply);
    Ok(())
}

/// Drive `task` to completion, calling `stop` on every Ctrl-C
async fn interruptible<F: Future>(task: F, stop: impl Fn()) -> F::Output {
    tokio::pin!(task);

    loop {
        tokio::select! {
            output = &mut task => return output,
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => {
                    tracing::debug!("interrupted");
                    stop();
                }
                Err(e) => {
                    tracing::warn!(error = %e, "cannot listen for Ctrl-C");
                    return task.await;
                }
            },
        }
    }
}

fn print_reply(reply: &TutorReply) {
    match reply {
        TutorReply::Text { content } => println!("Tutor: {content}"),
        TutorReply::Code { content, language } => {
            println!("Tutor:");
            println!("```{}", language.as_deref().unwrap_or_default());
            println!("{content}");
            println!("```");
        }
        TutorReply::Image { content, image_url } => {
            println!("Tutor: {content}");
            if let Some(url) = image_url {
                println!("Image: {url}");
            }
        }
    }
}

fn build_tutor(config: &Config) -> anyhow::Result<OpenAiTutor> {
    Ok(OpenAiTutor::new(
        config.openai_key()?.to_string(),
        config.tutor.chat_model.clone(),
        config.tutor.image_model.clone(),
    )?)
}

/// Capture controller over the microphone, or an unsupported one
fn build_capture(config: &Config) -> anyhow::Result<SpeechCapture> {
    let stt = SpeechToText::new(
        config.openai_key()?.to_string(),
        config.voice.stt_model.clone(),
        &config.voice.language,
    )?;

    Ok(match MicRecognizer::new(stt) {
        Ok(recognizer) => SpeechCapture::new(Arc::new(recognizer), config.capture_config()),
        Err(e) => {
            tracing::warn!(error = %e, "speech recognition unavailable");
            SpeechCapture::unsupported(config.capture_config())
        }
    })
}

fn build_synthesizer(config: &Config) -> anyhow::Result<TextToSpeech> {
    Ok(TextToSpeech::from_config(
        config.openai_key()?.to_string(),
        &config.voice,
    )?)
}

fn build_playback(config: &Config) -> anyhow::Result<SpeechPlayback> {
    Ok(SpeechPlayback::new(
        Arc::new(build_synthesizer(config)?),
        Arc::new(SpeakerOutput::new()?),
    )
    .with_overlap(config.voice.overlap))
}
