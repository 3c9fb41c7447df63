//! Chapter detection over word timings
//!
//! Boundaries come from a pause-plus-target heuristic: once a segment has
//! enough words, a speech pause longer than two seconds or hitting the
//! target segment duration closes it. Chapter titles come from one
//! text-generation call, with a numbered local fallback.

use clipforge_common::job::{Chapter, WordTiming};
use clipforge_common::store::OutputWrite;
use clipforge_providers::TextRequest;
use tracing::{info, warn};

use crate::stage::{Stage, StageContext, StageError, StageKind, StageOutput};

/// A speech gap longer than this forces a chapter boundary
const PAUSE_GAP_SECS: f64 = 2.0;
/// A segment must hold at least this many words before it may close
const MIN_CHAPTER_WORDS: usize = 50;
/// Fraction of the even-split duration a segment aims for
const TARGET_FRACTION: f64 = 0.8;
/// Words of each chapter quoted in the titling prompt
const PROMPT_WORDS_PER_CHAPTER: usize = 30;

const COST_PER_CALL_USD: f64 = 0.002;

pub struct ChapterStage;

#[async_trait::async_trait]
impl Stage for ChapterStage {
    fn kind(&self) -> StageKind {
        StageKind::Chapters
    }

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let transcript = ctx
            .job
            .outputs
            .transcript
            .as_ref()
            .ok_or(StageError::Skipped("no transcript available"))?;
        if !transcript.has_timing() {
            return Err(StageError::Skipped("transcript has no word timing"));
        }

        let duration = ctx.job.input.duration_secs;
        let segments = detect_segments(&transcript.words, duration, ctx.config.max_chapters);
        if segments.is_empty() {
            info!(job_id = %ctx.job.id, "transcript too short for chapters");
            return Ok(StageOutput::new(OutputWrite::Chapters(Vec::new())));
        }

        let (titles, cost, attempts) = self.title_segments(ctx, &segments).await;

        let chapters: Vec<Chapter> = segments
            .into_iter()
            .enumerate()
            .map(|(i, seg)| Chapter {
                start_secs: seg.start_secs,
                end_secs: seg.end_secs,
                title: titles
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("Chapter {}", i + 1)),
            })
            .collect();

        info!(job_id = %ctx.job.id, chapters = chapters.len(), "chapter detection complete");

        Ok(StageOutput::new(OutputWrite::Chapters(chapters))
            .with_attempts(attempts)
            .with_cost(cost))
    }
}

impl ChapterStage {
    /// One titling call for all segments; local numbering on failure
    async fn title_segments(
        &self,
        ctx: &StageContext,
        segments: &[Segment],
    ) -> (
        Vec<String>,
        f64,
        Vec<clipforge_common::job::AttemptRecord>,
    ) {
        let prompt = titling_prompt(segments);
        let request = TextRequest::new(prompt).with_system(
            "You title video chapters. Answer with one short title per line, \
             in order, without numbering.",
        );

        let language = ctx
            .job
            .outputs
            .transcript
            .as_ref()
            .map(|t| t.detected_language.clone());

        match ctx.gateway.generate_text(language.as_deref(), &request).await {
            Ok(outcome) => {
                let titles: Vec<String> = outcome
                    .value
                    .lines()
                    .map(|l| l.trim().trim_matches('"').to_string())
                    .filter(|l| !l.is_empty())
                    .collect();
                (titles, COST_PER_CALL_USD, outcome.attempts)
            }
            Err(err) => {
                warn!(job_id = %ctx.job.id, error = %err, "chapter titling failed, using fallback");
                (Vec::new(), 0.0, err.attempts().to_vec())
            }
        }
    }
}

struct Segment {
    start_secs: f64,
    end_secs: f64,
    text: String,
}

/// Split timed words into chapter segments.
///
/// Returns an empty list when the transcript is too short to chapter
/// meaningfully (fewer than two segments detected).
fn detect_segments(words: &[WordTiming], duration_secs: f64, max_chapters: usize) -> Vec<Segment> {
    if words.is_empty() || max_chapters == 0 {
        return Vec::new();
    }

    let target_secs = (duration_secs / max_chapters as f64) * TARGET_FRACTION;
    let mut segments: Vec<Segment> = Vec::new();
    let mut start = words[0].start_secs;
    let mut text: Vec<&str> = Vec::new();
    let mut prev_end = words[0].start_secs;

    for word in words {
        let gap = word.start_secs - prev_end;
        let elapsed = prev_end - start;

        let closeable = text.len() >= MIN_CHAPTER_WORDS && segments.len() + 1 < max_chapters;
        if closeable && (gap > PAUSE_GAP_SECS || elapsed >= target_secs) {
            segments.push(Segment {
                start_secs: start,
                // The closed chapter runs up to where the next one begins
                end_secs: word.start_secs,
                text: text.join(" "),
            });
            start = word.start_secs;
            text.clear();
        }

        text.push(&word.word);
        prev_end = word.end_secs;
    }

    segments.push(Segment {
        start_secs: start,
        end_secs: duration_secs,
        text: text.join(" "),
    });

    if segments.len() < 2 {
        return Vec::new();
    }
    segments
}

fn titling_prompt(segments: &[Segment]) -> String {
    let mut prompt = String::from("Title each of these video chapter excerpts:\n");
    for (i, seg) in segments.iter().enumerate() {
        let excerpt: String = seg
            .text
            .split_whitespace()
            .take(PROMPT_WORDS_PER_CHAPTER)
            .collect::<Vec<_>>()
            .join(" ");
        prompt.push_str(&format!("\n{}. {}", i + 1, excerpt));
    }
    prompt
}
