use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Tunables shared by the policies and the racing layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Worker bound for racing; `None` uses the available hardware parallelism.
    /// `Some(1)` runs every race inline on the calling thread.
    pub workers: Option<usize>,
    /// Minimum score of a first play.
    pub first_play_threshold: u32,
    /// Deadline for [`crate::StrategyRacer::race_with_deadline`].
    pub time_limit_ms: Option<u64>,
    /// Largest rack subset the subset racer will try.
    pub max_subset_size: Option<usize>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            workers: None,
            first_play_threshold: 30,
            time_limit_ms: None,
            max_subset_size: None,
        }
    }
}

impl SolverConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SolverConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == Some(0) {
            return Err(Error::InvalidConfig("workers must be at least 1".to_string()));
        }
        if self.first_play_threshold == 0 {
            return Err(Error::InvalidConfig(
                "first_play_threshold must be positive".to_string(),
            ));
        }
        if self.max_subset_size == Some(0) {
            return Err(Error::InvalidConfig(
                "max_subset_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolved worker count.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = SolverConfig::from_json(r#"{"workers": 2}"#).unwrap();
        assert_eq!(config.workers, Some(2));
        assert_eq!(config.first_play_threshold, 30);
        assert_eq!(config.time_limit_ms, None);
        assert_eq!(config.worker_count(), 2);
    }

    #[test]
    fn test_rejects_zero_workers() {
        assert!(matches!(
            SolverConfig::from_json(r#"{"workers": 0}"#),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            SolverConfig::from_json(r#"{"first_play_threshold": 0}"#),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(SolverConfig::from_json("{"), Err(Error::Json(_))));
    }

    #[test]
    fn test_default_worker_count_is_positive() {
        assert!(SolverConfig::default().worker_count() >= 1);
    }
}
