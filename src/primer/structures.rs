//! Leaf task checking a pair of sequences for unwanted dimers.

use async_trait::async_trait;
use serde::Serialize;

use crate::dimer::DimerSettings;
use crate::error::Result;
use crate::task::{Task, TaskContext, TaskOutput};
use crate::thermo::ParameterSet;
use crate::unwanted::{UnwantedThresholds, check_hetero_dimer, check_self_dimer};

/// One flagged structure, titled by what was checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnwantedSection {
    pub label: String,
    pub report: String,
}

/// A labeled sequence to check; empty sequences are skipped.
#[derive(Debug, Clone)]
pub struct Labeled {
    pub label: String,
    pub sequence: String,
}

impl Labeled {
    pub fn new(label: impl Into<String>, sequence: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            sequence: sequence.into(),
        }
    }
}

/// Self-dimer check of each non-empty side, plus a hetero-dimer check when
/// both sides are present. Only flagged structures make it into the output.
pub struct UnwantedStructuresTask {
    name: String,
    left: Labeled,
    right: Labeled,
    hetero_label: String,
    thresholds: UnwantedThresholds,
    params: ParameterSet,
    dimer: DimerSettings,
    sections: Vec<UnwantedSection>,
}

impl UnwantedStructuresTask {
    pub fn new(
        name: impl Into<String>,
        left: Labeled,
        right: Labeled,
        hetero_label: impl Into<String>,
        thresholds: UnwantedThresholds,
        params: ParameterSet,
        dimer: DimerSettings,
    ) -> Self {
        Self {
            name: name.into(),
            left,
            right,
            hetero_label: hetero_label.into(),
            thresholds,
            params,
            dimer,
            sections: Vec::new(),
        }
    }

    fn flag(&mut self, label: &str, unwanted: bool, report: String) {
        if unwanted {
            self.sections.push(UnwantedSection {
                label: label.to_string(),
                report,
            });
        }
    }
}

#[async_trait]
impl Task for UnwantedStructuresTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&mut self, _ctx: &mut TaskContext) -> Result<()> {
        let left = self.left.clone();
        let right = self.right.clone();

        for side in [&left, &right] {
            if side.sequence.is_empty() {
                continue;
            }
            let c = check_self_dimer(&side.sequence, &self.thresholds, &self.params, &self.dimer)?;
            self.flag(&side.label, c.unwanted, c.report);
        }

        if !left.sequence.is_empty() && !right.sequence.is_empty() {
            let c = check_hetero_dimer(&left.sequence, &right.sequence, &self.thresholds, &self.params, &self.dimer)?;
            let label = self.hetero_label.clone();
            self.flag(&label, c.unwanted, c.report);
        }
        Ok(())
    }

    fn take_output(&mut self) -> Option<TaskOutput> {
        Some(Box::new(std::mem::take(&mut self.sections)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;

    fn task(left: &str, right: &str) -> UnwantedStructuresTask {
        UnwantedStructuresTask::new(
            "check overhangs",
            Labeled::new("Left overhang", left),
            Labeled::new("Right overhang", right),
            "Connections between 5' and 3' backbones",
            UnwantedThresholds::default(),
            ParameterSet::default(),
            DimerSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_palindromic_overhang_is_flagged() {
        let mut report = Scheduler::default()
            .run(Box::new(task("GGGGCCCCGGGGCCCC", "")))
            .await
            .unwrap();
        assert!(report.is_finished());
        let sections = report.take_output::<Vec<UnwantedSection>>().unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].label, "Left overhang");
        assert!(sections[0].report.starts_with("Self-dimer:"));
    }

    #[tokio::test]
    async fn test_complementary_overhangs_flag_hetero_dimer() {
        // Each side is harmless alone but they pair along their full length.
        let mut report = Scheduler::default()
            .run(Box::new(task("AAAAAAAAAAAACCC", "GGGTTTTTTTTTTTT")))
            .await
            .unwrap();
        let sections = report.take_output::<Vec<UnwantedSection>>().unwrap();
        assert!(sections.iter().any(|s| s.label == "Connections between 5' and 3' backbones"));
        assert!(!sections.iter().any(|s| s.label == "Left overhang"));
    }

    #[tokio::test]
    async fn test_empty_sides_produce_nothing() {
        let mut report = Scheduler::default().run(Box::new(task("", ""))).await.unwrap();
        assert!(report.is_finished());
        assert!(report.take_output::<Vec<UnwantedSection>>().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_overhang_fails_task() {
        let report = Scheduler::default().run(Box::new(task("ACGU", ""))).await.unwrap();
        assert!(report.is_failed());
        assert!(report.error().unwrap().contains("Invalid nucleotide"));
    }
}
