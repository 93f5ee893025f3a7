//! Sequential playback integration tests
//!
//! Uses scripted synthesis and clips on a paused clock to check ordering,
//! pre-fetching, re-entrancy and cancellation.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep};

use nuvem_voice::Error;
use nuvem_voice::voice::{SpeakOutcome, SpeechPlayback};

mod common;

use common::{ClipFault, MockOutput, MockSynth};

const SYNTH_DELAY: Duration = Duration::from_millis(100);
const CLIP_LENGTH: Duration = Duration::from_secs(2);

fn engine(synth: &Arc<MockSynth>, output: &Arc<MockOutput>) -> SpeechPlayback {
    SpeechPlayback::new(synth.clone(), output.clone())
}

fn entries(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

#[tokio::test(start_paused = true)]
async fn test_sentences_play_in_order_without_gaps() {
    let synth = MockSynth::new(SYNTH_DELAY);
    let output = MockOutput::new(CLIP_LENGTH);
    let playback = engine(&synth, &output);

    let started = Instant::now();
    let outcome = playback.speak("Olá. Tudo bem? Vamos lá!").await.unwrap();

    assert_eq!(outcome, SpeakOutcome::Completed { sentences: 3 });
    assert_eq!(synth.calls(), entries(&["Olá.", "Tudo bem?", "Vamos lá!"]));

    // The next sentence is cued before the current one ends and never
    // starts before it
    assert_eq!(
        output.log(),
        entries(&[
            "load:Olá.",
            "start:Olá.",
            "load:Tudo bem?",
            "end:Olá.",
            "start:Tudo bem?",
            "load:Vamos lá!",
            "end:Tudo bem?",
            "start:Vamos lá!",
            "end:Vamos lá!",
        ])
    );

    // Only the first synthesis delays audio; the rest is pre-fetched
    assert_eq!(started.elapsed(), SYNTH_DELAY + CLIP_LENGTH * 3);
    assert!(!playback.is_speaking());
}

#[tokio::test(start_paused = true)]
async fn test_unknown_duration_cues_after_end() {
    let synth = MockSynth::new(SYNTH_DELAY);
    let output = MockOutput::without_duration(CLIP_LENGTH);
    let playback = engine(&synth, &output);

    let outcome = playback.speak("Um. Dois.").await.unwrap();

    assert_eq!(outcome, SpeakOutcome::Completed { sentences: 2 });
    assert_eq!(
        output.log(),
        entries(&["load:Um.", "start:Um.", "end:Um.", "load:Dois.", "start:Dois.", "end:Dois."])
    );
}

#[tokio::test(start_paused = true)]
async fn test_short_clip_cues_after_end() {
    let synth = MockSynth::new(SYNTH_DELAY);
    let output = MockOutput::new(Duration::from_millis(400));
    let playback = engine(&synth, &output);

    playback.speak("Sim. Não.").await.unwrap();

    assert_eq!(
        output.log(),
        entries(&["load:Sim.", "start:Sim.", "end:Sim.", "load:Não.", "start:Não.", "end:Não."])
    );
}

#[tokio::test(start_paused = true)]
async fn test_text_without_terminator_is_one_sentence() {
    let synth = MockSynth::new(SYNTH_DELAY);
    let output = MockOutput::new(CLIP_LENGTH);
    let playback = engine(&synth, &output);

    let outcome = playback.speak("sem pontuação aqui").await.unwrap();

    assert_eq!(outcome, SpeakOutcome::Completed { sentences: 1 });
    assert_eq!(synth.calls(), entries(&["sem pontuação aqui"]));
}

#[tokio::test(start_paused = true)]
async fn test_empty_text_makes_no_calls() {
    let synth = MockSynth::new(SYNTH_DELAY);
    let output = MockOutput::new(CLIP_LENGTH);
    let playback = engine(&synth, &output);

    assert_eq!(
        playback.speak("").await.unwrap(),
        SpeakOutcome::Completed { sentences: 0 }
    );
    assert!(synth.calls().is_empty());
    assert!(output.log().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_speak_while_draining_is_dropped() {
    let synth = MockSynth::new(SYNTH_DELAY);
    let output = MockOutput::new(CLIP_LENGTH);
    let playback = engine(&synth, &output);

    let (first, second) = tokio::join!(playback.speak("Um. Dois."), async {
        sleep(Duration::from_millis(500)).await;
        assert!(playback.is_speaking());
        playback.speak("Três.").await
    });

    assert_eq!(first.unwrap(), SpeakOutcome::Completed { sentences: 2 });
    assert_eq!(second.unwrap(), SpeakOutcome::Dropped);
    assert_eq!(synth.calls(), entries(&["Um.", "Dois."]));

    // Accepted again once the first sequence finished
    assert_eq!(
        playback.speak("Três.").await.unwrap(),
        SpeakOutcome::Completed { sentences: 1 }
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_halts_sequence() {
    let synth = MockSynth::new(SYNTH_DELAY);
    let output = MockOutput::new(CLIP_LENGTH);
    let playback = engine(&synth, &output);

    let (outcome, ()) = tokio::join!(playback.speak("Um. Dois. Três."), async {
        // Second sentence is playing at this point
        sleep(Duration::from_millis(2500)).await;
        playback.cancel();
    });

    assert_eq!(outcome.unwrap(), SpeakOutcome::Cancelled { played: 1 });
    assert!(!playback.is_speaking());

    // The halted clip never reports its end and nothing else starts
    sleep(Duration::from_secs(10)).await;
    let log = output.log();
    assert!(log.contains(&"start:Dois.".to_string()));
    assert!(!log.contains(&"end:Dois.".to_string()));
    assert!(!log.contains(&"start:Três.".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_before_first_clip() {
    let synth = MockSynth::new(SYNTH_DELAY);
    let output = MockOutput::new(CLIP_LENGTH);
    let playback = engine(&synth, &output);

    let (outcome, ()) = tokio::join!(playback.speak("Um. Dois."), async {
        playback.cancel();
    });

    assert_eq!(outcome.unwrap(), SpeakOutcome::Cancelled { played: 0 });
    assert!(output.log().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_synthesis_failure_aborts_remaining_sentences() {
    let synth = MockSynth::failing_on("Dois.", SYNTH_DELAY);
    let output = MockOutput::new(CLIP_LENGTH);
    let playback = engine(&synth, &output);

    let result = playback.speak("Um. Dois. Três.").await;

    assert!(matches!(result, Err(Error::Tts(_))));
    // The failed pre-fetch surfaces only after the current sentence ended
    assert_eq!(output.log(), entries(&["load:Um.", "start:Um.", "end:Um."]));
    assert_eq!(synth.calls(), entries(&["Um.", "Dois."]));
    assert!(!playback.is_speaking());

    // The engine is usable after a failure
    assert_eq!(
        playback.speak("Três.").await.unwrap(),
        SpeakOutcome::Completed { sentences: 1 }
    );
}

#[tokio::test(start_paused = true)]
async fn test_first_sentence_failure() {
    let synth = MockSynth::failing_on("Um.", SYNTH_DELAY);
    let output = MockOutput::new(CLIP_LENGTH);
    let playback = engine(&synth, &output);

    let result = playback.speak("Um. Dois.").await;

    assert!(matches!(result, Err(Error::Tts(_))));
    assert!(output.log().is_empty());
    assert_eq!(synth.calls(), entries(&["Um."]));
}

#[tokio::test(start_paused = true)]
async fn test_custom_overlap() {
    let synth = MockSynth::new(SYNTH_DELAY);
    let output = MockOutput::new(CLIP_LENGTH);
    let playback = engine(&synth, &output).with_overlap(Duration::from_secs(3));

    // Overlap longer than the clip degrades to cueing after the end
    playback.speak("Um. Dois.").await.unwrap();

    assert_eq!(
        output.log(),
        entries(&["load:Um.", "start:Um.", "end:Um.", "load:Dois.", "start:Dois.", "end:Dois."])
    );
}

#[tokio::test(start_paused = true)]
async fn test_load_failure_aborts_remaining_sentences() {
    let synth = MockSynth::new(SYNTH_DELAY);
    let output = MockOutput::faulty(CLIP_LENGTH, "Dois.", ClipFault::Load);
    let playback = engine(&synth, &output);

    let result = playback.speak("Um. Dois. Três.").await;

    assert!(matches!(result, Err(Error::Audio(_))));
    // The cue failed during the first sentence but surfaces after it ended
    assert_eq!(output.log(), entries(&["load:Um.", "start:Um.", "end:Um."]));
    assert!(!synth.calls().contains(&"Três.".to_string()));
    assert!(!playback.is_speaking());
}

#[tokio::test(start_paused = true)]
async fn test_play_failure_is_returned() {
    let synth = MockSynth::new(SYNTH_DELAY);
    let output = MockOutput::faulty(CLIP_LENGTH, "Um.", ClipFault::Play);
    let playback = engine(&synth, &output);

    let result = playback.speak("Um. Dois.").await;

    assert!(matches!(result, Err(Error::Playback(_))));
    assert_eq!(output.log(), entries(&["load:Um."]));
    assert!(!playback.is_speaking());
}

#[tokio::test(start_paused = true)]
async fn test_playback_error_aborts_without_waiting_for_cue() {
    let synth = MockSynth::new(SYNTH_DELAY);
    let output = MockOutput::faulty(CLIP_LENGTH, "Um.", ClipFault::Ended);
    let playback = engine(&synth, &output);

    let started = Instant::now();
    let result = playback.speak("Um. Dois. Três.").await;

    assert!(matches!(result, Err(Error::Playback(_))));
    // Fails halfway through, before the overlap point would cue "Dois."
    assert_eq!(started.elapsed(), SYNTH_DELAY + CLIP_LENGTH / 2);
    assert_eq!(output.log(), entries(&["load:Um.", "start:Um.", "fail:Um."]));
    assert!(!playback.is_speaking());

    // Nothing else starts later either
    sleep(Duration::from_secs(10)).await;
    assert_eq!(output.log().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_lost_ended_event_aborts_sequence() {
    let synth = MockSynth::new(SYNTH_DELAY);
    let output = MockOutput::faulty(CLIP_LENGTH, "Dois.", ClipFault::Lost);
    let playback = engine(&synth, &output);

    let started = Instant::now();
    let result = playback.speak("Um. Dois. Três.").await;

    assert!(matches!(result, Err(Error::Playback(_))));
    assert_eq!(started.elapsed(), SYNTH_DELAY + CLIP_LENGTH + CLIP_LENGTH / 2);

    let log = output.log();
    assert!(log.contains(&"start:Dois.".to_string()));
    assert!(!log.contains(&"end:Dois.".to_string()));
    assert!(!log.contains(&"start:Três.".to_string()));
    assert!(!playback.is_speaking());
}

#[tokio::test(start_paused = true)]
async fn test_early_end_starts_next_sentence_at_once() {
    let synth = MockSynth::new(SYNTH_DELAY);
    let output = MockOutput::faulty(CLIP_LENGTH, "Um.", ClipFault::Early);
    let playback = engine(&synth, &output);

    let started = Instant::now();
    let outcome = playback.speak("Um. Dois.").await.unwrap();

    assert_eq!(outcome, SpeakOutcome::Completed { sentences: 2 });
    assert_eq!(
        output.log(),
        entries(&["load:Um.", "start:Um.", "end:Um.", "load:Dois.", "start:Dois.", "end:Dois."])
    );
    // "Dois." follows the early end instead of waiting for the overlap point
    assert_eq!(started.elapsed(), SYNTH_DELAY + CLIP_LENGTH / 2 + CLIP_LENGTH);
}
