//! crates/lesson_core/src/speech.rs
//!
//! Narrates lesson text and stores the result on the media CDN.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info};

use crate::domain::{AudioFiles, AudioSlot, LessonContent, LessonId, VoiceOptions};
use crate::error::LessonError;
use crate::ports::TextToSpeechService;
use crate::store::MediaStore;

/// The spoken lines that are not taken verbatim from the lesson.
#[derive(Debug, Clone)]
pub struct Narration {
    /// `{title}` and `{description}` are substituted.
    pub intro: String,
    /// `{title}` is substituted.
    pub section_intro: String,
}

impl Default for Narration {
    fn default() -> Self {
        Self {
            intro: "Bienvenue dans cette leçon sur {title}. {description}".to_string(),
            section_intro: "Nous allons maintenant aborder {title}".to_string(),
        }
    }
}

/// One piece of lesson audio to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTask {
    pub slot: AudioSlot,
    pub text: String,
}

#[derive(Clone)]
pub struct SpeechSynthesizer {
    tts: Arc<dyn TextToSpeechService>,
    store: MediaStore,
    voice: VoiceOptions,
    narration: Narration,
    batch_size: usize,
}

impl SpeechSynthesizer {
    pub fn new(
        tts: Arc<dyn TextToSpeechService>,
        store: MediaStore,
        voice: VoiceOptions,
        narration: Narration,
        batch_size: usize,
    ) -> Self {
        Self {
            tts,
            store,
            voice,
            narration,
            batch_size: batch_size.max(1),
        }
    }

    /// Normalizes `text` and returns the raw mp3 bytes. `voice` overrides the
    /// configured voice.
    pub async fn synthesize(
        &self,
        text: &str,
        voice: Option<&VoiceOptions>,
    ) -> Result<Vec<u8>, LessonError> {
        let normalized = normalize_text(text);
        self.tts
            .generate_audio(&normalized, voice.unwrap_or(&self.voice))
            .await
            .map_err(LessonError::Synthesis)
    }

    /// Synthesizes `text` and uploads it as `lesson_{id}_{slot}`.
    pub async fn synthesize_to_url(
        &self,
        text: &str,
        lesson_id: LessonId,
        slot: AudioSlot,
    ) -> Result<String, LessonError> {
        let audio = self.synthesize(text, None).await?;
        self.store
            .store_audio(&audio, &format!("lesson_{}_{}", lesson_id, slot.key()))
            .await
    }

    /// Synthesizes and uploads arbitrary text, for on-demand narration.
    pub async fn synthesize_named(
        &self,
        text: &str,
        voice: Option<&VoiceOptions>,
        name_hint: &str,
    ) -> Result<String, LessonError> {
        let audio = self.synthesize(text, voice).await?;
        self.store.store_audio(&audio, name_hint).await
    }

    pub fn intro_text(&self, title: &str, description: &str) -> String {
        self.narration
            .intro
            .replace("{title}", title)
            .replace("{description}", description)
    }

    /// Every audio slot of `content`, in narration order. The conclusion is
    /// included only when it has text.
    pub fn audio_tasks(&self, content: &LessonContent) -> Vec<AudioTask> {
        let mut tasks = vec![AudioTask {
            slot: AudioSlot::Intro,
            text: self.intro_text(&content.title, &content.description),
        }];

        for (i, section) in content.sections.iter().enumerate() {
            tasks.push(AudioTask {
                slot: AudioSlot::SectionIntro(i),
                text: self.narration.section_intro.replace("{title}", &section.title),
            });
            for (j, sub) in section.subsections.iter().enumerate() {
                tasks.push(AudioTask {
                    slot: AudioSlot::Subsection(i, j),
                    text: sub.content.clone(),
                });
            }
        }

        if !content.conclusion.trim().is_empty() {
            tasks.push(AudioTask {
                slot: AudioSlot::Conclusion,
                text: content.conclusion.clone(),
            });
        }
        tasks
    }

    /// Runs `tasks` in sequential batches, concurrently within a batch. A failed
    /// slot is logged and left out of the result.
    pub async fn synthesize_tasks(&self, lesson_id: LessonId, tasks: Vec<AudioTask>) -> AudioFiles {
        let total_batches = tasks.len().div_ceil(self.batch_size);
        let mut files = AudioFiles::new();

        for (index, batch) in tasks.chunks(self.batch_size).enumerate() {
            let results = join_all(batch.iter().map(|task| async move {
                (task.slot, self.synthesize_to_url(&task.text, lesson_id, task.slot).await)
            }))
            .await;

            for (slot, result) in results {
                match result {
                    Ok(url) => {
                        files.insert(slot.key(), url);
                    }
                    Err(e) => error!(lesson_id, slot = %slot, error = %e, "Audio slot failed"),
                }
            }
            info!(lesson_id, batch = index + 1, total_batches, "Audio batch finished");
        }
        files
    }

    /// Narrates the whole lesson.
    pub async fn synthesize_lesson_audio(
        &self,
        lesson_id: LessonId,
        content: &LessonContent,
    ) -> AudioFiles {
        let tasks = self.audio_tasks(content);
        info!(lesson_id, count = tasks.len(), "Generating lesson audio");
        self.synthesize_tasks(lesson_id, tasks).await
    }
}

/// Straightens typographic quotes, collapses whitespace and removes spaces
/// before punctuation.
pub fn normalize_text(text: &str) -> String {
    let straightened: String = text
        .chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '`' => '\'',
            '\u{201C}' | '\u{201D}' | '«' | '»' => '"',
            other => other,
        })
        .collect();

    let collapsed = straightened.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut out = String::with_capacity(collapsed.len());
    for c in collapsed.chars() {
        if matches!(c, '.' | ',' | '!' | '?' | ';' | ':') && out.ends_with(' ') {
            out.pop();
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ContentSection, ContentSubsection};
    use crate::test_support::{FakeStorage, RecordingTts};
    use std::time::Duration;

    fn content(sections: usize, subsections: usize, conclusion: &str) -> LessonContent {
        LessonContent {
            title: "Optics".to_string(),
            description: "Light and lenses".to_string(),
            sections: (0..sections)
                .map(|i| ContentSection {
                    id: format!("s{i}"),
                    title: format!("Part {i}"),
                    check_understanding: false,
                    subsections: (0..subsections)
                        .map(|j| ContentSubsection {
                            title: format!("Sub {j}"),
                            content: format!("Content {i}.{j}"),
                            image_query: "lens".to_string(),
                            image: None,
                        })
                        .collect(),
                })
                .collect(),
            conclusion: conclusion.to_string(),
            audio_files: AudioFiles::new(),
        }
    }

    fn synthesizer(tts: Arc<RecordingTts>, storage: Arc<FakeStorage>) -> SpeechSynthesizer {
        SpeechSynthesizer::new(
            tts,
            MediaStore::new(storage),
            VoiceOptions::default(),
            Narration::default(),
            5,
        )
    }

    #[test]
    fn normalizes_quotes_spaces_and_punctuation() {
        assert_eq!(
            normalize_text("  L\u{2019}être  «vivant»   , dit-il !\n\tFin . "),
            "L'être \"vivant\", dit-il! Fin."
        );
    }

    #[test]
    fn tasks_cover_every_slot_in_order() {
        let speech = synthesizer(Arc::new(RecordingTts::default()), Arc::new(FakeStorage::default()));
        let keys: Vec<String> = speech
            .audio_tasks(&content(2, 1, "The end"))
            .iter()
            .map(|t| t.slot.key())
            .collect();
        assert_eq!(
            keys,
            vec![
                "intro",
                "section_0_intro",
                "section_0_subsection_0",
                "section_1_intro",
                "section_1_subsection_0",
                "conclusion"
            ]
        );
        let tasks = speech.audio_tasks(&content(1, 0, "  "));
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].text, "Bienvenue dans cette leçon sur Optics. Light and lenses");
        assert_eq!(tasks[1].text, "Nous allons maintenant aborder Part 0");
    }

    #[tokio::test(start_paused = true)]
    async fn batches_never_overlap() {
        let tts = Arc::new(RecordingTts::with_delay(Duration::from_millis(100)));
        let speech = synthesizer(tts.clone(), Arc::new(FakeStorage::default()));

        // intro + 2 section intros + 8 subsections + conclusion = 12 slots
        let lesson = content(2, 4, "The end");
        let tasks = speech.audio_tasks(&lesson);
        assert_eq!(tasks.len(), 12);

        let files = speech.synthesize_tasks(1, tasks).await;
        assert_eq!(files.len(), 12);

        let calls = tts.calls();
        assert_eq!(calls.len(), 12);
        let batch_starts: Vec<_> = [0usize, 5, 10].iter().map(|i| calls[*i].started).collect();
        for (index, call) in calls.iter().enumerate() {
            let batch = index / 5;
            assert_eq!(call.started, batch_starts[batch], "call {index} started outside its batch");
        }
        assert!(batch_starts[1] >= batch_starts[0] + Duration::from_millis(100));
        assert!(batch_starts[2] >= batch_starts[1] + Duration::from_millis(100));
    }

    #[tokio::test]
    async fn concurrent_lessons_never_share_audio_urls() {
        let storage = Arc::new(FakeStorage::default());
        let speech = synthesizer(Arc::new(RecordingTts::default()), storage.clone());
        let lesson = content(1, 1, "");

        let (first, second) = tokio::join!(
            speech.synthesize_lesson_audio(7, &lesson),
            speech.synthesize_lesson_audio(8, &lesson)
        );
        assert!(first["intro"].contains("/lesson_7_intro_"));
        assert!(second["intro"].contains("/lesson_8_intro_"));
        for key in first.keys() {
            assert_ne!(first[key], second[key], "slot {key} shared between lessons");
        }
        assert_eq!(storage.audio_uploads().len(), 6);
    }

    #[tokio::test]
    async fn failed_slots_are_omitted() {
        let tts = Arc::new(RecordingTts::default().failing_on("Content 0.1"));
        let speech = synthesizer(tts, Arc::new(FakeStorage::default()));

        let files = speech.synthesize_lesson_audio(1, &content(1, 2, "")).await;
        assert!(files.contains_key("intro"));
        assert!(files.contains_key("section_0_subsection_0"));
        assert!(!files.contains_key("section_0_subsection_1"));
        assert!(!files.contains_key("conclusion"));
    }
}
