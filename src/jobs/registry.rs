//! Static, config-driven job registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;

use super::{CommandJob, Job, JobKind};
use crate::config::CampaignConfig;
use crate::error::{CadenceError, Result};

/// Ordered set of jobs, keyed by name.
#[derive(Default, Clone)]
pub struct JobRegistry {
    jobs: Vec<Arc<dyn Job>>,
    index: HashMap<String, usize>,
}

impl JobRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one [`CommandJob`] per configured job, in config order.
    pub fn from_config(config: &CampaignConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.device.command_timeout_secs);
        config.jobs.iter().try_fold(Self::new(), |registry, job| {
            registry.with_job(Arc::new(CommandJob::new(job, timeout)))
        })
    }

    /// Add a job at the end of the order.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::InvalidConfig`] if the name is taken.
    pub fn with_job(mut self, job: Arc<dyn Job>) -> Result<Self> {
        let name = job.name().to_string();
        if self.index.contains_key(&name) {
            return Err(CadenceError::invalid_config(
                "jobs",
                format!("job '{name}' is registered twice"),
            ));
        }
        self.index.insert(name, self.jobs.len());
        self.jobs.push(job);
        Ok(self)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Job>> {
        self.index.get(name).map(|&i| Arc::clone(&self.jobs[i]))
    }

    /// Jobs in configured order.
    #[must_use]
    pub fn ordered(&self) -> Vec<Arc<dyn Job>> {
        self.jobs.clone()
    }

    /// Jobs in a fresh random order.
    pub fn shuffled<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Arc<dyn Job>> {
        let mut jobs = self.jobs.clone();
        jobs.shuffle(rng);
        jobs
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.jobs.iter().map(|j| j.name()).collect()
    }

    #[must_use]
    pub fn count_of(&self, kind: JobKind) -> usize {
        self.jobs.iter().filter(|j| j.kind() == kind).count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.names())
            .finish()
    }
}
