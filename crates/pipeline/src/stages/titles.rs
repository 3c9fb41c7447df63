//! Title, description, tag, and summary generation
//!
//! One text-generation call per artifact kind. Titles are required for
//! the stage to succeed; descriptions, tags, and summary degrade to empty
//! on provider failure and only leave their attempts in the trail.

use clipforge_common::job::{AttemptRecord, MetadataOutput};
use clipforge_common::store::OutputWrite;
use clipforge_providers::gateway::GatewayError;
use clipforge_providers::TextRequest;
use regex_lite::Regex;
use tracing::{info, warn};

use crate::stage::{Stage, StageContext, StageError, StageKind, StageOutput};

/// Transcript excerpt length fed into prompts
const EXCERPT_CHARS: usize = 3000;
/// Generated titles below this length are discarded as junk
const MIN_TITLE_LEN: usize = 10;
/// Rough per-call text generation cost
const COST_PER_CALL_USD: f64 = 0.002;

const SYSTEM_PROMPT: &str =
    "You are a video metadata assistant. Answer with the requested items only, \
     one per line, without commentary.";

pub struct TitleStage;

#[async_trait::async_trait]
impl Stage for TitleStage {
    fn kind(&self) -> StageKind {
        StageKind::Titles
    }

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let transcript = ctx
            .job
            .outputs
            .transcript
            .as_ref()
            .ok_or(StageError::Skipped("no transcript available"))?;

        let excerpt = excerpt(&transcript.text);
        let language = Some(transcript.detected_language.as_str());
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut calls = 0u32;

        // Titles are the one artifact this stage must produce
        let title_req = TextRequest::new(title_prompt(ctx.config.title_count, &excerpt))
            .with_system(SYSTEM_PROMPT);
        let outcome = ctx.gateway.generate_text(language, &title_req).await?;
        attempts.extend(outcome.attempts.clone());
        calls += 1;

        let titles = parse_titles(&outcome.value, ctx.config.title_count);
        if titles.is_empty() {
            return Err(StageError::Fatal(
                "model returned no usable titles".to_string(),
            ));
        }
        let provider = outcome.provider;

        let descriptions = match self
            .optional_call(ctx, language, description_prompt(&excerpt), &mut attempts)
            .await
        {
            Some(text) => {
                calls += 1;
                parse_lines(&text, 2)
            }
            None => Vec::new(),
        };

        let tags = match self
            .optional_call(ctx, language, tag_prompt(ctx.config.tag_count, &excerpt), &mut attempts)
            .await
        {
            Some(text) => {
                calls += 1;
                parse_tags(&text, ctx.config.tag_count)
            }
            None => Vec::new(),
        };

        let summary = if ctx.job.stages.summary {
            match self
                .optional_call(ctx, language, summary_prompt(&excerpt), &mut attempts)
                .await
            {
                Some(text) => {
                    calls += 1;
                    Some(text.trim().to_string())
                }
                None => None,
            }
        } else {
            None
        };

        info!(
            job_id = %ctx.job.id,
            provider = %provider,
            titles = titles.len(),
            tags = tags.len(),
            "metadata generation complete"
        );

        let metadata = MetadataOutput {
            titles,
            descriptions,
            tags,
            summary,
            provider,
        };

        Ok(StageOutput::new(OutputWrite::Metadata(metadata))
            .with_attempts(attempts)
            .with_cost(calls as f64 * COST_PER_CALL_USD))
    }
}

impl TitleStage {
    /// Best-effort generation call; failure leaves the artifact empty
    async fn optional_call(
        &self,
        ctx: &StageContext,
        language: Option<&str>,
        prompt: String,
        attempts: &mut Vec<AttemptRecord>,
    ) -> Option<String> {
        let request = TextRequest::new(prompt).with_system(SYSTEM_PROMPT);
        match ctx.gateway.generate_text(language, &request).await {
            Ok(outcome) => {
                attempts.extend(outcome.attempts);
                Some(outcome.value)
            }
            Err(err) => {
                warn!(job_id = %ctx.job.id, error = %err, "optional metadata call failed");
                if let GatewayError::AllProvidersFailed {
                    attempts: failed, ..
                } = err
                {
                    attempts.extend(failed);
                }
                None
            }
        }
    }
}

fn excerpt(text: &str) -> String {
    if text.len() <= EXCERPT_CHARS {
        return text.to_string();
    }
    // Cut on a char boundary at or below the limit
    let mut end = EXCERPT_CHARS;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

fn title_prompt(count: usize, excerpt: &str) -> String {
    format!(
        "Generate {count} engaging, clickable titles for a video with this \
         transcript:\n\n{excerpt}"
    )
}

fn description_prompt(excerpt: &str) -> String {
    format!(
        "Write 2 short video descriptions (1-2 sentences each) for a video \
         with this transcript:\n\n{excerpt}"
    )
}

fn tag_prompt(count: usize, excerpt: &str) -> String {
    format!(
        "List {count} comma-separated search tags for a video with this \
         transcript:\n\n{excerpt}"
    )
}

fn summary_prompt(excerpt: &str) -> String {
    format!(
        "Summarize this video transcript in one paragraph:\n\n{excerpt}"
    )
}

/// Alternate separators models use when they pack titles into one line
const TITLE_DELIMITERS: &[char] = &[';', '|', '\u{2022}'];

/// Parse model output into a cleaned title list.
///
/// Strips list numbering and surrounding quotes and drops lines shorter
/// than the minimum. A single surviving line that carries alternate
/// delimiters is split on them; the delimiter pass never joins across
/// newlines.
pub fn parse_titles(raw: &str, max: usize) -> Vec<String> {
    let numbering = Regex::new(r"^\s*\d+[.)]\s*").unwrap();

    let mut titles: Vec<String> = raw
        .lines()
        .map(|line| clean_title(&numbering.replace(line, "")))
        .filter(|t| t.len() >= MIN_TITLE_LEN)
        .collect();

    let packed = match titles.as_slice() {
        [only] if only.contains(TITLE_DELIMITERS) => Some(only.clone()),
        [] if !raw.contains('\n') => Some(raw.to_string()),
        _ => None,
    };
    if let Some(line) = packed {
        let split: Vec<String> = line
            .split(TITLE_DELIMITERS)
            .map(clean_title)
            .filter(|t| t.len() >= MIN_TITLE_LEN)
            .collect();
        if !split.is_empty() {
            titles = split;
        }
    }

    titles.truncate(max);
    titles
}

fn clean_title(s: impl AsRef<str>) -> String {
    s.as_ref()
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '\u{201c}' || c == '\u{201d}')
        .trim()
        .to_string()
}

fn parse_lines(raw: &str, max: usize) -> Vec<String> {
    let numbering = Regex::new(r"^\s*\d+[.)]\s*").unwrap();
    let mut lines: Vec<String> = raw
        .lines()
        .map(|line| numbering.replace(line, "").trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    lines.truncate(max);
    lines
}

/// Normalize comma/newline separated tags: lowercase, no leading '#',
/// deduplicated, capped
pub fn parse_tags(raw: &str, max: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut tags = Vec::new();

    for piece in raw.split([',', '\n']) {
        let tag = piece.trim().trim_start_matches('#').to_lowercase();
        if tag.is_empty() || !seen.insert(tag.clone()) {
            continue;
        }
        tags.push(tag);
        if tags.len() == max {
            break;
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numbered_titles() {
        let raw = "1. How I Built a Video Pipeline\n2) Ten Lessons From Production\n3. Short";
        let titles = parse_titles(raw, 5);
        assert_eq!(
            titles,
            vec![
                "How I Built a Video Pipeline".to_string(),
                "Ten Lessons From Production".to_string(),
            ]
        );
    }

    #[test]
    fn test_parse_quoted_titles() {
        let raw = "\"The Complete Guide to Rust Pipelines\"\n'Another Great Video Title'";
        let titles = parse_titles(raw, 5);
        assert_eq!(titles[0], "The Complete Guide to Rust Pipelines");
        assert_eq!(titles[1], "Another Great Video Title");
    }

    #[test]
    fn test_parse_delimited_fallback() {
        let raw = "First Interesting Title; Second Interesting Title | Third One Here Too";
        let titles = parse_titles(raw, 5);
        assert_eq!(titles.len(), 3);
        assert_eq!(titles[2], "Third One Here Too");
    }

    #[test]
    fn test_minimum_length_filter() {
        // Multi-line junk stays empty; pieces are never joined across
        // newlines into a passing length
        assert!(parse_titles("short\ntiny\nok", 5).is_empty());
    }

    #[test]
    fn test_plain_single_line_is_one_title() {
        assert_eq!(
            parse_titles("One Perfectly Good Title", 5),
            vec!["One Perfectly Good Title".to_string()]
        );
    }

    #[test]
    fn test_delimited_line_without_usable_pieces_kept_whole() {
        // Splitting would only produce sub-minimum fragments
        assert_eq!(
            parse_titles("Tiny Bits | ab", 5),
            vec!["Tiny Bits | ab".to_string()]
        );
    }

    #[test]
    fn test_title_cap() {
        let raw = (1..=8)
            .map(|i| format!("{i}. A Perfectly Fine Title Number {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(parse_titles(&raw, 5).len(), 5);
    }

    #[test]
    fn test_parse_tags_normalizes() {
        let tags = parse_tags("#Rust, pipelines, RUST, async,, video\nencoding", 10);
        assert_eq!(
            tags,
            vec!["rust", "pipelines", "async", "video", "encoding"]
        );
    }

    #[test]
    fn test_parse_tags_cap() {
        assert_eq!(parse_tags("a, b, c, d", 2).len(), 2);
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        let text = "é".repeat(EXCERPT_CHARS);
        let cut = excerpt(&text);
        assert!(cut.len() <= EXCERPT_CHARS);
        assert!(cut.chars().all(|c| c == 'é'));
    }
}
