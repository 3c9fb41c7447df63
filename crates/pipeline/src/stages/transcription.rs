//! Transcription stage

use clipforge_common::job::TranscriptOutput;
use clipforge_common::store::OutputWrite;
use clipforge_providers::TranscribeRequest;
use tracing::info;

use crate::stage::{Stage, StageContext, StageError, StageKind, StageOutput};

/// Rough per-minute transcription cost used for job accounting
const COST_PER_MINUTE_USD: f64 = 0.006;

pub struct TranscriptionStage;

#[async_trait::async_trait]
impl Stage for TranscriptionStage {
    fn kind(&self) -> StageKind {
        StageKind::Transcription
    }

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let input = &ctx.job.input;
        let request = TranscribeRequest {
            media: input.source.clone(),
            language: input.language_hint.clone(),
            duration_secs: input.duration_secs,
        };

        let outcome = ctx.gateway.transcribe(&request).await?;

        info!(
            job_id = %ctx.job.id,
            provider = %outcome.provider,
            language = %outcome.value.language,
            words = outcome.value.words.len(),
            "transcription complete"
        );

        let transcript = TranscriptOutput {
            text: outcome.value.text,
            words: outcome.value.words,
            detected_language: outcome.value.language,
            confidence: outcome.value.confidence,
            provider: outcome.provider,
        };

        let cost = (input.duration_secs / 60.0) * COST_PER_MINUTE_USD;
        Ok(StageOutput::new(OutputWrite::Transcript(transcript))
            .with_attempts(outcome.attempts)
            .with_cost(cost))
    }
}
