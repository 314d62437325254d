use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use strandr::dimer::DimerSettings;
use strandr::primer::{PrimerDesignSettings, ValueRange};
use strandr::scheduler::SchedulerConfig;
use strandr::thermo::ParameterSet;
use strandr::unwanted::UnwantedThresholds;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub scheduler: SchedulerConfig,
    pub thermo: ParameterSet,
    pub dimer: DimerSettings,
    pub primer: PrimerConfig,
}

/// Defaults for `design` runs; areas and overhangs come from the command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimerConfig {
    pub gibbs_free_energy: ValueRange<f64>,
    pub melting_point: ValueRange<f64>,
    pub primer_length: ValueRange<usize>,
    pub unwanted: UnwantedThresholds,
}

impl Default for PrimerConfig {
    fn default() -> Self {
        let settings = PrimerDesignSettings::default();
        Self {
            gibbs_free_energy: settings.gibbs_free_energy,
            melting_point: settings.melting_point,
            primer_length: settings.primer_length,
            unwanted: settings.unwanted,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            scheduler: SchedulerConfig::default(),
            thermo: ParameterSet::default(),
            dimer: DimerSettings::default(),
            primer: PrimerConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Primer design settings seeded from this config.
    pub fn primer_settings(&self) -> PrimerDesignSettings {
        PrimerDesignSettings {
            gibbs_free_energy: self.primer.gibbs_free_energy,
            melting_point: self.primer.melting_point,
            primer_length: self.primer.primer_length,
            unwanted: self.primer.unwanted.clone(),
            thermo: self.thermo.clone(),
            dimer: self.dimer.clone(),
            ..PrimerDesignSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use strandr::thermo::TmMethod;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level.as_deref(), Some("info"));
        assert_eq!(config.thermo.method, TmMethod::NearestNeighbor);
        assert_eq!(config.primer.primer_length, ValueRange::new(18, 30));
        assert!(config.scheduler.max_parallel_runs >= 1);
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
log_level: debug
scheduler:
  max_parallel_runs: 2
thermo:
  method: rough
  na_mm: 100.0
primer:
  melting_point: {{ min: 55.0, max: 62.0 }}
  unwanted:
    max_tm: 25.0
"#
        )
        .unwrap();

        let config = Config::load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.scheduler.max_parallel_runs, 2);
        assert_eq!(config.thermo.method, TmMethod::Rough);
        assert_eq!(config.thermo.na_mm, 100.0);
        assert_eq!(config.thermo.temperature_c, 37.0);
        assert_eq!(config.primer.melting_point, ValueRange::new(55.0, 62.0));
        assert_eq!(config.primer.unwanted.max_tm, 25.0);
        assert_eq!(config.primer.unwanted.min_gibbs, -7.0);
        assert_eq!(config.dimer.noise_floor, 0.0);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yml");
        assert!(Config::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_load_malformed_file_fails() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "scheduler: [not, a, map]").unwrap();
        assert!(Config::load(Some(&file.path().to_path_buf())).is_err());
    }

    #[test]
    fn test_primer_settings_carry_config() {
        let mut config = Config::default();
        config.thermo = ParameterSet::rough();
        config.primer.primer_length = ValueRange::new(20, 24);
        let settings = config.primer_settings();
        assert_eq!(settings.thermo.method, TmMethod::Rough);
        assert_eq!(settings.primer_length, ValueRange::new(20, 24));
        assert!(settings.left_overhang.is_empty());
    }
}
