//! Export stage: manifest packaging
//!
//! Writes a JSON manifest referencing every artifact the job produced.
//! Downstream delivery reads the manifest instead of poking at individual
//! output fields.

use chrono::Utc;
use clipforge_common::store::OutputWrite;
use serde::Serialize;
use tracing::info;

use crate::stage::{Stage, StageContext, StageError, StageKind, StageOutput};

#[derive(Serialize)]
struct Manifest<'a> {
    job_id: String,
    generated_at: String,
    source: &'a str,
    transcript_language: Option<&'a str>,
    transcript_text: Option<&'a str>,
    titles: Vec<&'a str>,
    descriptions: Vec<&'a str>,
    tags: Vec<&'a str>,
    summary: Option<&'a str>,
    thumbnail_keys: Vec<&'a str>,
    chapters: Vec<ManifestChapter<'a>>,
    warnings: Vec<&'a str>,
}

#[derive(Serialize)]
struct ManifestChapter<'a> {
    start_secs: f64,
    end_secs: f64,
    title: &'a str,
}

pub struct ExportStage;

#[async_trait::async_trait]
impl Stage for ExportStage {
    fn kind(&self) -> StageKind {
        StageKind::Export
    }

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let job = &ctx.job;
        let outputs = &job.outputs;

        let manifest = Manifest {
            job_id: job.id.to_string(),
            generated_at: Utc::now().to_rfc3339(),
            source: &job.input.source,
            transcript_language: outputs
                .transcript
                .as_ref()
                .map(|t| t.detected_language.as_str()),
            transcript_text: outputs.transcript.as_ref().map(|t| t.text.as_str()),
            titles: outputs
                .metadata
                .as_ref()
                .map(|m| m.titles.iter().map(String::as_str).collect())
                .unwrap_or_default(),
            descriptions: outputs
                .metadata
                .as_ref()
                .map(|m| m.descriptions.iter().map(String::as_str).collect())
                .unwrap_or_default(),
            tags: outputs
                .metadata
                .as_ref()
                .map(|m| m.tags.iter().map(String::as_str).collect())
                .unwrap_or_default(),
            summary: outputs
                .metadata
                .as_ref()
                .and_then(|m| m.summary.as_deref()),
            thumbnail_keys: outputs
                .thumbnails
                .iter()
                .map(|t| t.storage_key.as_str())
                .collect(),
            chapters: outputs
                .chapters
                .iter()
                .map(|c| ManifestChapter {
                    start_secs: c.start_secs,
                    end_secs: c.end_secs,
                    title: &c.title,
                })
                .collect(),
            warnings: job.warnings.iter().map(|w| w.message.as_str()).collect(),
        };

        let bytes = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| StageError::Fatal(format!("manifest serialization: {e}")))?;

        let stored = ctx
            .storage
            .store("exports", "json", &bytes)
            .await
            .map_err(|e| StageError::Fatal(e.to_string()))?;

        info!(job_id = %job.id, key = %stored.key, "export manifest written");

        Ok(StageOutput::new(OutputWrite::ExportManifest(stored.key)))
    }
}
