//! Progress weighting
//!
//! Progress percentages derive from a configurable per-stage weight table
//! normalized over the stages actually planned for the job, so a completed
//! job always reaches 100 no matter which optional stages were requested.

use clipforge_common::config::StageWeightsConfig;

use crate::stage::StageKind;

/// Cumulative progress targets for one job's stage plan
#[derive(Clone, Debug)]
pub struct ProgressPlan {
    stages: Vec<(StageKind, u32)>,
    total: u32,
}

impl ProgressPlan {
    pub fn new(weights: &StageWeightsConfig, planned: &[StageKind]) -> Self {
        let stages: Vec<(StageKind, u32)> = planned
            .iter()
            .map(|kind| {
                let weight = match kind {
                    StageKind::Transcription => weights.transcription,
                    StageKind::Titles => weights.titles,
                    StageKind::Thumbnails => weights.thumbnails,
                    StageKind::Chapters => weights.chapters,
                    StageKind::Export => weights.export,
                };
                (*kind, weight)
            })
            .collect();
        let total = stages.iter().map(|(_, w)| w).sum::<u32>().max(1);
        Self { stages, total }
    }

    /// Progress after the given stage has completed, in [0, 100]
    pub fn after(&self, kind: StageKind) -> u8 {
        let mut cumulative = 0u32;
        for (stage, weight) in &self.stages {
            cumulative += weight;
            if *stage == kind {
                return ((cumulative * 100) / self.total).min(100) as u8;
            }
        }
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights() -> StageWeightsConfig {
        StageWeightsConfig::default()
    }

    #[test]
    fn test_full_plan_reaches_100() {
        let plan = ProgressPlan::new(
            &weights(),
            &[
                StageKind::Transcription,
                StageKind::Titles,
                StageKind::Thumbnails,
                StageKind::Chapters,
                StageKind::Export,
            ],
        );
        assert_eq!(plan.after(StageKind::Export), 100);
        assert!(plan.after(StageKind::Transcription) < plan.after(StageKind::Titles));
    }

    #[test]
    fn test_partial_plan_renormalizes() {
        // Thumbnails-only job: unrequested stages consume no share
        let plan = ProgressPlan::new(&weights(), &[StageKind::Thumbnails, StageKind::Export]);
        assert_eq!(plan.after(StageKind::Export), 100);
        let mid = plan.after(StageKind::Thumbnails);
        assert!(mid > 0 && mid < 100);
    }

    #[test]
    fn test_unplanned_stage_is_zero() {
        let plan = ProgressPlan::new(&weights(), &[StageKind::Export]);
        assert_eq!(plan.after(StageKind::Chapters), 0);
        assert_eq!(plan.after(StageKind::Export), 100);
    }
}
