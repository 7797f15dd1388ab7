// Copyright © 2026 Pathway

use std::time::Duration;

use log::warn;

use crate::env::{parse_env_flag, parse_env_var, Error as EnvError};
use crate::retry::RetryConfig;

const MAX_PARTITIONS: usize = 1024;
const DEFAULT_PARTITIONS: usize = 4;
const DEFAULT_MAP_RETRIES: usize = 2;
const DEFAULT_REDUCE_RETRIES: usize = 2;
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(10);
const DEFAULT_LAZY_BARRIER_SIZE: usize = 2500;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("can't run with no partitions")]
    NeedsPartitions,

    #[error("lazy barrier size must be positive")]
    EmptyLazyBarrier,

    #[error(transparent)]
    EnvError(#[from] EnvError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionConfig {
    pub share_paths: bool,
    pub partitions: usize,
    pub map_retries: usize,
    pub reduce_retries: usize,
    pub retry_backoff: Duration,
    pub lazy_barrier_size: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            share_paths: true,
            partitions: DEFAULT_PARTITIONS,
            map_retries: DEFAULT_MAP_RETRIES,
            reduce_retries: DEFAULT_REDUCE_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            lazy_barrier_size: DEFAULT_LAZY_BARRIER_SIZE,
        }
    }
}

impl ExecutionConfig {
    pub fn from_env() -> Result<Self, Error> {
        let defaults = Self::default();
        let share_paths = parse_env_flag("TRAVERSE_SHARE_PATHS")?.unwrap_or(defaults.share_paths);
        let mut partitions: usize =
            parse_env_var("TRAVERSE_PARTITIONS")?.unwrap_or(defaults.partitions);
        if partitions == 0 {
            return Err(Error::NeedsPartitions);
        }
        if partitions > MAX_PARTITIONS {
            warn!("{partitions} is greater than the maximum allowed number of partitions ({MAX_PARTITIONS}), reducing");
            partitions = MAX_PARTITIONS;
        }
        let map_retries = parse_env_var("TRAVERSE_MAP_RETRIES")?.unwrap_or(defaults.map_retries);
        let reduce_retries =
            parse_env_var("TRAVERSE_REDUCE_RETRIES")?.unwrap_or(defaults.reduce_retries);
        let retry_backoff = parse_env_var("TRAVERSE_RETRY_BACKOFF_MS")?
            .map_or(defaults.retry_backoff, Duration::from_millis);
        let lazy_barrier_size =
            parse_env_var("TRAVERSE_LAZY_BARRIER_SIZE")?.unwrap_or(defaults.lazy_barrier_size);
        if lazy_barrier_size == 0 {
            return Err(Error::EmptyLazyBarrier);
        }
        Ok(Self {
            share_paths,
            partitions,
            map_retries,
            reduce_retries,
            retry_backoff,
            lazy_barrier_size,
        })
    }

    #[must_use]
    pub fn with_share_paths(mut self, share_paths: bool) -> Self {
        self.share_paths = share_paths;
        self
    }

    pub fn with_partitions(mut self, partitions: usize) -> Result<Self, Error> {
        if partitions == 0 {
            return Err(Error::NeedsPartitions);
        }
        self.partitions = partitions;
        Ok(self)
    }

    #[must_use]
    pub fn with_retries(mut self, map_retries: usize, reduce_retries: usize) -> Self {
        self.map_retries = map_retries;
        self.reduce_retries = reduce_retries;
        self
    }

    #[must_use]
    pub fn with_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    pub fn with_lazy_barrier_size(mut self, lazy_barrier_size: usize) -> Result<Self, Error> {
        if lazy_barrier_size == 0 {
            return Err(Error::EmptyLazyBarrier);
        }
        self.lazy_barrier_size = lazy_barrier_size;
        Ok(self)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::with_initial_sleep(self.retry_backoff)
    }
}
