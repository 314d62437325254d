//! Primer design for DNA assembly.
//!
//! [`PrimerDesignTask`] coordinates the run:
//! - overhangs and user-supplied primers are checked for unwanted dimers,
//! - a forward primer is searched in the left area and a reverse primer in
//!   the right area,
//! - once both primers are found the designed pair is checked as well.
//!
//! Unwanted structures are reported as warnings; they never fail the run.

mod search;
mod settings;
mod structures;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

pub use search::{PrimerCandidate, PrimerSearchTask, Strand};
pub use settings::{PrimerDesignSettings, ValueRange};
pub use structures::{Labeled, UnwantedSection, UnwantedStructuresTask};

use crate::error::Result;
use crate::sequence;
use crate::task::{Task, TaskContext, TaskFlags, TaskOutput, TaskReport};

pub const LEFT_OVERHANG: &str = "Left overhang";
pub const RIGHT_OVERHANG: &str = "Right overhang";
pub const OVERHANG_CONNECTIONS: &str = "Connections between 5' and 3' backbones";
pub const FORWARD_USER_PRIMER: &str = "Forward user primer";
pub const REVERSE_USER_PRIMER: &str = "Reverse user primer";
pub const USER_PRIMER_CONNECTIONS: &str = "Forward and reverse user primers";
pub const FORWARD_PRIMER: &str = "Forward primer";
pub const REVERSE_PRIMER: &str = "Reverse primer";
pub const PRIMER_PAIR: &str = "Designed primer pair";

/// Order sections appear in the combined report.
const SECTION_ORDER: [&str; 9] = [
    LEFT_OVERHANG,
    RIGHT_OVERHANG,
    OVERHANG_CONNECTIONS,
    FORWARD_USER_PRIMER,
    REVERSE_USER_PRIMER,
    USER_PRIMER_CONNECTIONS,
    FORWARD_PRIMER,
    REVERSE_PRIMER,
    PRIMER_PAIR,
];

fn section_rank(label: &str) -> usize {
    SECTION_ORDER
        .iter()
        .position(|l| *l == label)
        .unwrap_or(SECTION_ORDER.len())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrimerDesignResult {
    pub forward: Option<PrimerCandidate>,
    pub reverse: Option<PrimerCandidate>,
    pub unwanted_structures: Vec<UnwantedSection>,
}

impl PrimerDesignResult {
    pub fn has_unwanted_structures(&self) -> bool {
        !self.unwanted_structures.is_empty()
    }

    /// All flagged structures as one text, one titled section each.
    pub fn unwanted_report(&self) -> String {
        self.unwanted_structures
            .iter()
            .map(|s| format!("== {} ==\n\n{}", s.label, s.report))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Upper-case bases with surrounding whitespace removed; blank input is empty.
fn normalized(seq: &str) -> Result<String> {
    Ok(String::from_utf8_lossy(&sequence::normalize(seq)?).into_owned())
}

enum Role {
    Structures,
    Search(Strand),
}

/// Designs a primer pair over `target` and reports unwanted structures.
pub struct PrimerDesignTask {
    target: String,
    bases: Arc<Vec<u8>>,
    settings: Arc<PrimerDesignSettings>,
    roles: HashMap<String, Role>,
    searches_left: usize,
    forward: Option<PrimerCandidate>,
    reverse: Option<PrimerCandidate>,
    sections: Vec<UnwantedSection>,
}

impl PrimerDesignTask {
    pub fn new(target: impl Into<String>, settings: PrimerDesignSettings) -> Self {
        Self {
            target: target.into(),
            bases: Arc::new(Vec::new()),
            settings: Arc::new(settings),
            roles: HashMap::new(),
            searches_left: 0,
            forward: None,
            reverse: None,
            sections: Vec::new(),
        }
    }

    fn queue_structures(&mut self, ctx: &mut TaskContext, name: &str, left: Labeled, right: Labeled, hetero: &str) {
        let s = &self.settings;
        let task = UnwantedStructuresTask::new(
            name,
            left,
            right,
            hetero,
            s.unwanted.clone(),
            s.thermo.clone(),
            s.dimer.clone(),
        );
        let id = ctx.add_subtask(Box::new(task));
        self.roles.insert(id, Role::Structures);
    }

    fn queue_search(&mut self, ctx: &mut TaskContext, strand: Strand) {
        let area = match strand {
            Strand::Forward => self.settings.left_area,
            Strand::Reverse => self.settings.right_area,
        };
        let task = PrimerSearchTask::new(strand, self.bases.clone(), area, self.settings.clone());
        let id = ctx.add_subtask(Box::new(task));
        self.roles.insert(id, Role::Search(strand));
        self.searches_left += 1;
    }

    fn search_finished(&mut self, strand: Strand, found: Option<PrimerCandidate>, ctx: &mut TaskContext) {
        match strand {
            Strand::Forward => {
                if found.is_none() {
                    ctx.add_warning(format!("No forward primer found in the left area {}", self.settings.left_area));
                }
                self.forward = found;
            }
            Strand::Reverse => {
                if found.is_none() {
                    ctx.add_warning(format!("No reverse primer found in the right area {}", self.settings.right_area));
                }
                self.reverse = found;
            }
        }

        self.searches_left -= 1;
        if self.searches_left > 0 || ctx.should_stop() {
            return;
        }
        let (Some(forward), Some(reverse)) = (&self.forward, &self.reverse) else {
            return;
        };
        let left = Labeled::new(FORWARD_PRIMER, forward.sequence.clone());
        let right = Labeled::new(REVERSE_PRIMER, reverse.sequence.clone());
        self.queue_structures(ctx, "Check designed primers", left, right, PRIMER_PAIR);
    }
}

#[async_trait]
impl Task for PrimerDesignTask {
    fn name(&self) -> &str {
        "Primer design for DNA assembly"
    }

    fn flags(&self) -> TaskFlags {
        TaskFlags::composite()
    }

    fn prepare(&mut self, ctx: &mut TaskContext) -> Result<()> {
        let bases = sequence::normalize(&self.target)?;
        self.settings.validate(bases.len())?;
        self.bases = Arc::new(bases);

        let left_overhang = normalized(&self.settings.left_overhang)?;
        let right_overhang = normalized(&self.settings.right_overhang)?;
        if !left_overhang.is_empty() || !right_overhang.is_empty() {
            self.queue_structures(
                ctx,
                "Check overhangs",
                Labeled::new(LEFT_OVERHANG, left_overhang),
                Labeled::new(RIGHT_OVERHANG, right_overhang),
                OVERHANG_CONNECTIONS,
            );
        }

        let forward_user = normalized(self.settings.forward_user_primer.as_deref().unwrap_or_default())?;
        let reverse_user = normalized(self.settings.reverse_user_primer.as_deref().unwrap_or_default())?;
        if !forward_user.is_empty() || !reverse_user.is_empty() {
            self.queue_structures(
                ctx,
                "Check user primers",
                Labeled::new(FORWARD_USER_PRIMER, forward_user),
                Labeled::new(REVERSE_USER_PRIMER, reverse_user),
                USER_PRIMER_CONNECTIONS,
            );
        }

        self.queue_search(ctx, Strand::Forward);
        self.queue_search(ctx, Strand::Reverse);
        Ok(())
    }

    fn on_subtask_finished(&mut self, mut subtask: TaskReport, ctx: &mut TaskContext) -> Result<()> {
        let Some(role) = self.roles.remove(&subtask.id) else {
            log::warn!("[{}] unknown subtask {}", ctx.id(), subtask.id);
            return Ok(());
        };
        if !subtask.is_finished() {
            return Ok(());
        }

        match role {
            Role::Structures => {
                for section in subtask.take_output::<Vec<UnwantedSection>>().unwrap_or_default() {
                    ctx.add_warning(format!("Unwanted structures found: {}", section.label));
                    self.sections.push(section);
                }
            }
            Role::Search(strand) => {
                let found = subtask.take_output::<Option<PrimerCandidate>>().flatten();
                self.search_finished(strand, found, ctx);
            }
        }
        Ok(())
    }

    fn report(&mut self, ctx: &mut TaskContext) -> Result<()> {
        self.sections.sort_by_key(|s| section_rank(&s.label));
        log::info!(
            "[{}] forward {}, reverse {}, {} unwanted structures",
            ctx.id(),
            self.forward.as_ref().map_or("-", |p| p.sequence.as_str()),
            self.reverse.as_ref().map_or("-", |p| p.sequence.as_str()),
            self.sections.len()
        );
        Ok(())
    }

    fn take_output(&mut self) -> Option<TaskOutput> {
        Some(Box::new(PrimerDesignResult {
            forward: self.forward.take(),
            reverse: self.reverse.take(),
            unwanted_structures: std::mem::take(&mut self.sections),
        }))
    }
}
