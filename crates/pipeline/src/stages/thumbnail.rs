//! Thumbnail stage: frame scoring plus AI-generated art
//!
//! Candidate frames are sampled from the media and scored locally by
//! sharpness, brightness, contrast, and colorfulness; the best ones are
//! kept alongside one AI-generated image. Either source may fail on its
//! own; the stage fails only when both produce nothing.

use clipforge_common::job::{AttemptRecord, ThumbnailRef};
use clipforge_common::store::OutputWrite;
use clipforge_providers::ImageRequest;
use tracing::{info, warn};

use crate::media::Frame;
use crate::stage::{Stage, StageContext, StageError, StageKind, StageOutput};

/// Rough per-image generation cost
const COST_PER_IMAGE_USD: f64 = 0.04;

const WEIGHT_SHARPNESS: f64 = 0.3;
const WEIGHT_BRIGHTNESS: f64 = 0.2;
const WEIGHT_CONTRAST: f64 = 0.25;
const WEIGHT_COLORFULNESS: f64 = 0.25;

pub struct ThumbnailStage;

#[async_trait::async_trait]
impl Stage for ThumbnailStage {
    fn kind(&self) -> StageKind {
        StageKind::Thumbnails
    }

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let mut refs: Vec<ThumbnailRef> = Vec::new();
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut cost = 0.0;

        // Extracted frames, best first
        match ctx
            .inspector
            .extract_frames(&ctx.job.input.source, ctx.config.frame_samples)
            .await
        {
            Ok(frames) => {
                let mut scored: Vec<(f64, Frame)> = frames
                    .into_iter()
                    .map(|f| (score_frame(&f), f))
                    .collect();
                scored.sort_by(|a, b| b.0.total_cmp(&a.0));

                for (score, frame) in scored.into_iter().take(ctx.config.thumbnail_count) {
                    let bytes = encode_ppm(&frame);
                    let stored = ctx
                        .storage
                        .store("thumbnails", "ppm", &bytes)
                        .await
                        .map_err(|e| StageError::Fatal(e.to_string()))?;
                    refs.push(ThumbnailRef {
                        storage_key: stored.key,
                        provider: "frame".into(),
                        score: Some(score),
                    });
                }
            }
            Err(err) => {
                warn!(job_id = %ctx.job.id, error = %err, "frame extraction failed");
            }
        }

        // One AI-generated candidate
        let prompt = thumbnail_prompt(ctx);
        match ctx
            .gateway
            .generate_image(&ImageRequest::thumbnail(prompt, "vibrant, high contrast"))
            .await
        {
            Ok(outcome) => {
                attempts.extend(outcome.attempts);
                cost += COST_PER_IMAGE_USD;
                let stored = ctx
                    .storage
                    .store("thumbnails", &outcome.value.format, &outcome.value.bytes)
                    .await
                    .map_err(|e| StageError::Fatal(e.to_string()))?;
                refs.push(ThumbnailRef {
                    storage_key: stored.key,
                    provider: outcome.provider,
                    score: None,
                });
            }
            Err(err) => {
                warn!(job_id = %ctx.job.id, error = %err, "AI thumbnail generation failed");
                attempts.extend(err.attempts().to_vec());
                if refs.is_empty() {
                    return Err(StageError::Provider(err));
                }
            }
        }

        if refs.is_empty() {
            return Err(StageError::Fatal(
                "no thumbnail candidates produced".to_string(),
            ));
        }

        info!(
            job_id = %ctx.job.id,
            candidates = refs.len(),
            "thumbnail stage complete"
        );

        Ok(StageOutput::new(OutputWrite::Thumbnails(refs))
            .with_attempts(attempts)
            .with_cost(cost))
    }
}

fn thumbnail_prompt(ctx: &StageContext) -> String {
    let subject = ctx
        .job
        .outputs
        .metadata
        .as_ref()
        .and_then(|m| m.titles.first().cloned())
        .unwrap_or_else(|| ctx.job.input.original_filename.clone());
    format!("Eye-catching video thumbnail for: {subject}")
}

/// Composite quality score in [0, 1]
pub fn score_frame(frame: &Frame) -> f64 {
    WEIGHT_SHARPNESS * sharpness(frame)
        + WEIGHT_BRIGHTNESS * brightness(frame)
        + WEIGHT_CONTRAST * contrast(frame)
        + WEIGHT_COLORFULNESS * colorfulness(frame)
}

/// Variance of the 4-neighbor Laplacian over luma, scaled into [0, 1]
fn sharpness(frame: &Frame) -> f64 {
    if frame.width < 3 || frame.height < 3 {
        return 0.0;
    }
    let mut values = Vec::with_capacity(((frame.width - 2) * (frame.height - 2)) as usize);
    for y in 1..frame.height - 1 {
        for x in 1..frame.width - 1 {
            let lap = 4.0 * frame.luma(x, y)
                - frame.luma(x - 1, y)
                - frame.luma(x + 1, y)
                - frame.luma(x, y - 1)
                - frame.luma(x, y + 1);
            values.push(lap);
        }
    }
    (variance(&values) / 1000.0).min(1.0)
}

/// Closeness of mean luma to mid-gray
fn brightness(frame: &Frame) -> f64 {
    let lumas = all_lumas(frame);
    let m = mean(&lumas);
    1.0 - ((m - 127.5).abs() / 127.5)
}

/// Luma standard deviation, scaled into [0, 1]
fn contrast(frame: &Frame) -> f64 {
    let lumas = all_lumas(frame);
    (variance(&lumas).sqrt() / 64.0).min(1.0)
}

/// Hasler-Suesstrunk colorfulness metric, scaled into [0, 1]
fn colorfulness(frame: &Frame) -> f64 {
    let mut rg = Vec::with_capacity((frame.width * frame.height) as usize);
    let mut yb = Vec::with_capacity((frame.width * frame.height) as usize);
    for y in 0..frame.height {
        for x in 0..frame.width {
            let (r, g, b) = frame.pixel(x, y);
            let (r, g, b) = (r as f64, g as f64, b as f64);
            rg.push(r - g);
            yb.push(0.5 * (r + g) - b);
        }
    }
    let std_root = (variance(&rg) + variance(&yb)).sqrt();
    let mean_root = (mean(&rg).powi(2) + mean(&yb).powi(2)).sqrt();
    ((std_root + 0.3 * mean_root) / 100.0).min(1.0)
}

fn all_lumas(frame: &Frame) -> Vec<f64> {
    let mut out = Vec::with_capacity((frame.width * frame.height) as usize);
    for y in 0..frame.height {
        for x in 0..frame.width {
            out.push(frame.luma(x, y));
        }
    }
    out
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// Binary PPM (P6) encoding of a raw RGB frame
fn encode_ppm(frame: &Frame) -> Vec<u8> {
    let header = format!("P6\n{} {}\n255\n", frame.width, frame.height);
    let mut out = Vec::with_capacity(header.len() + frame.rgb.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(&frame.rgb);
    out
}
