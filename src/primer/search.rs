//! Leaf task searching one area of the target for a primer.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::primer::settings::PrimerDesignSettings;
use crate::sequence::{Region, reverse_complement};
use crate::task::{Task, TaskContext, TaskOutput};
use crate::thermo::{gibbs_free_energy_of, melting_temperature_of};
use crate::unwanted::check_self_dimer;

/// Strand a primer anneals to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strand {
    Forward,
    Reverse,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrimerCandidate {
    pub strand: Strand,
    /// Where the primer sits on the forward strand of the target
    pub region: Region,
    /// Primer sequence, 5'->3'
    pub sequence: String,
    pub melting_temperature: f64,
    pub delta_g: f64,
}

/// Finds the primer closest to the outer end of its area: the area start
/// for the forward strand, the area end for the reverse strand. At equal
/// distance the shorter primer wins.
pub struct PrimerSearchTask {
    name: String,
    strand: Strand,
    target: Arc<Vec<u8>>,
    area: Region,
    settings: Arc<PrimerDesignSettings>,
    found: Option<PrimerCandidate>,
}

impl PrimerSearchTask {
    pub fn new(strand: Strand, target: Arc<Vec<u8>>, area: Region, settings: Arc<PrimerDesignSettings>) -> Self {
        let name = match strand {
            Strand::Forward => format!("Search forward primer in {}", area),
            Strand::Reverse => format!("Search reverse primer in {}", area),
        };
        Self {
            name,
            strand,
            target,
            area,
            settings,
            found: None,
        }
    }

    /// Windows of the target in search order, produced lazily so the
    /// search can stop at the first hit.
    fn windows(&self) -> impl Iterator<Item = Region> + '_ {
        let (min, max) = (self.settings.primer_length.min, self.settings.primer_length.max);
        let (strand, area) = (self.strand, self.area);
        (0..area.length).flat_map(move |offset| {
            (min..=max)
                .take_while(move |&length| offset + length <= area.length)
                .map(move |length| {
                    let start = match strand {
                        Strand::Forward => area.start + offset,
                        Strand::Reverse => area.end() - offset - length,
                    };
                    Region::new(start, length)
                })
        })
    }

    fn evaluate(&self, window: Region) -> Result<Option<PrimerCandidate>> {
        let bases = &self.target[window.start..window.end()];
        let primer = match self.strand {
            Strand::Forward => bases.to_vec(),
            Strand::Reverse => reverse_complement(bases),
        };
        let s = &self.settings;

        let tm = melting_temperature_of(&primer, &s.thermo);
        if !s.melting_point.contains(tm) {
            return Ok(None);
        }
        let delta_g = gibbs_free_energy_of(&primer, &s.thermo);
        if !s.gibbs_free_energy.contains(delta_g) {
            return Ok(None);
        }

        let sequence = String::from_utf8_lossy(&primer).into_owned();
        if check_self_dimer(&sequence, &s.unwanted, &s.thermo, &s.dimer)?.unwanted {
            log::trace!("{}: {} rejected for self-dimer", self.name, sequence);
            return Ok(None);
        }

        Ok(Some(PrimerCandidate {
            strand: self.strand,
            region: window,
            sequence,
            melting_temperature: tm,
            delta_g,
        }))
    }
}

#[async_trait]
impl Task for PrimerSearchTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&mut self, ctx: &mut TaskContext) -> Result<()> {
        let mut last_start = None;
        let mut found = None;
        for window in self.windows() {
            if last_start != Some(window.start) {
                if ctx.is_canceled() {
                    log::debug!("{}: canceled at {}", self.name, window.start);
                    return Ok(());
                }
                last_start = Some(window.start);
                tokio::task::yield_now().await;
            }
            if let Some(candidate) = self.evaluate(window)? {
                log::debug!(
                    "{}: found {} at {} (Tm {:.1}, dG {:.1})",
                    self.name,
                    candidate.sequence,
                    candidate.region,
                    candidate.melting_temperature,
                    candidate.delta_g
                );
                found = Some(candidate);
                break;
            }
        }
        self.found = found;
        Ok(())
    }

    fn take_output(&mut self) -> Option<TaskOutput> {
        Some(Box::new(self.found.take()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primer::settings::ValueRange;
    use crate::scheduler::Scheduler;

    const TARGET: &str = "ATGACCATGATTACGCCAAGCTTGCATGCCTGCAGGTCGACTCTAGAGGATCCCCGGGTACCGAGCTCGAATTCACTGGCCGTCGTTTTACAACGTCGTGACTGGGAAAAC";

    fn relaxed() -> PrimerDesignSettings {
        let mut s = PrimerDesignSettings {
            gibbs_free_energy: ValueRange::new(-200.0, 0.0),
            melting_point: ValueRange::new(0.0, 200.0),
            primer_length: ValueRange::new(18, 20),
            ..PrimerDesignSettings::default()
        };
        s.unwanted.min_gibbs = -15.0;
        s
    }

    async fn search(target: &str, strand: Strand, area: Region, settings: PrimerDesignSettings) -> Option<PrimerCandidate> {
        let target = Arc::new(crate::sequence::normalize(target).unwrap());
        let task = PrimerSearchTask::new(strand, target, area, Arc::new(settings));
        let mut report = Scheduler::default().run(Box::new(task)).await.unwrap();
        assert!(report.is_finished());
        report.take_output::<Option<PrimerCandidate>>().unwrap()
    }

    #[tokio::test]
    async fn test_forward_primer_starts_at_area_start() {
        let found = search(TARGET, Strand::Forward, Region::new(0, 40), relaxed()).await.unwrap();
        assert_eq!(found.region, Region::new(0, 18));
        assert_eq!(found.sequence, &TARGET[..18]);
    }

    #[tokio::test]
    async fn test_reverse_primer_ends_at_area_end() {
        let area = Region::new(TARGET.len() - 40, 40);
        let found = search(TARGET, Strand::Reverse, area, relaxed()).await.unwrap();
        assert_eq!(found.region, Region::new(TARGET.len() - 18, 18));
        let expected = reverse_complement(TARGET[TARGET.len() - 18..].as_bytes());
        assert_eq!(found.sequence.as_bytes(), expected.as_slice());
    }

    #[tokio::test]
    async fn test_candidates_outside_tm_range_are_skipped() {
        let s = PrimerDesignSettings {
            melting_point: ValueRange::new(500.0, 600.0),
            ..relaxed()
        };
        assert!(search(TARGET, Strand::Forward, Region::new(0, 40), s).await.is_none());
    }

    #[tokio::test]
    async fn test_self_complementary_candidates_are_rejected() {
        let target = "GC".repeat(30);
        let s = PrimerDesignSettings {
            unwanted: Default::default(),
            ..relaxed()
        };
        assert!(search(&target, Strand::Forward, Region::new(0, 60), s).await.is_none());
    }

    #[tokio::test]
    async fn test_area_shorter_than_primer_finds_nothing() {
        assert!(search(TARGET, Strand::Forward, Region::new(0, 10), relaxed()).await.is_none());
    }

    #[test]
    fn test_windows_prefer_outer_end_then_shorter() {
        let target = Arc::new(vec![b'A'; 30]);
        let settings = Arc::new(PrimerDesignSettings {
            primer_length: ValueRange::new(2, 3),
            ..PrimerDesignSettings::default()
        });
        let fwd = PrimerSearchTask::new(Strand::Forward, target.clone(), Region::new(5, 4), settings.clone());
        assert_eq!(
            fwd.windows().collect::<Vec<_>>(),
            vec![
                Region::new(5, 2),
                Region::new(5, 3),
                Region::new(6, 2),
                Region::new(6, 3),
                Region::new(7, 2)
            ]
        );
        let rev = PrimerSearchTask::new(Strand::Reverse, target, Region::new(5, 4), settings);
        assert_eq!(
            rev.windows().collect::<Vec<_>>(),
            vec![
                Region::new(7, 2),
                Region::new(6, 3),
                Region::new(6, 2),
                Region::new(5, 3),
                Region::new(5, 2)
            ]
        );
    }

    #[test]
    fn test_windows_are_lazy_over_large_areas() {
        let target = Arc::new(vec![b'A'; 100_000]);
        let settings = Arc::new(PrimerDesignSettings {
            primer_length: ValueRange::new(18, 30),
            ..PrimerDesignSettings::default()
        });
        let task = PrimerSearchTask::new(Strand::Forward, target, Region::new(0, 100_000), settings);
        let first: Vec<Region> = task.windows().take(3).collect();
        assert_eq!(first, vec![Region::new(0, 18), Region::new(0, 19), Region::new(0, 20)]);
        assert_eq!(task.windows().last(), Some(Region::new(99_982, 18)));
    }
}
