// Copyright © 2026 Pathway

use std::collections::BTreeMap;

use log::debug;

use super::map_reduce::{MapEmitter, MapReduce, Stage};
use crate::engine::error::{Error, Result};
use crate::engine::side_effects::TraversalSideEffects;
use crate::engine::step::StepContext;
use crate::engine::Value;
use crate::retry::{execute_with_retries, RetryConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobStage {
    Map,
    Combine,
    Reduce,
    Finalize,
    Done,
}

impl JobStage {
    /// The stage after this one; combine is skipped for jobs that don't allow it.
    #[must_use]
    pub fn next(self, combines: bool) -> Self {
        match self {
            Self::Map if combines => Self::Combine,
            Self::Map | Self::Combine => Self::Reduce,
            Self::Reduce => Self::Finalize,
            Self::Finalize | Self::Done => Self::Done,
        }
    }
}

/// Groups pairs by key, keeping the arrival order of the values.
pub(super) fn shuffle(
    pairs: impl IntoIterator<Item = (Value, Value)>,
) -> BTreeMap<Value, Vec<Value>> {
    let mut grouped: BTreeMap<Value, Vec<Value>> = BTreeMap::new();
    for (key, value) in pairs {
        grouped.entry(key).or_default().push(value);
    }
    grouped
}

/// Map and, if allowed, combine over one partition's side effects.
pub(super) fn map_partition(
    job: &dyn MapReduce,
    side_effects: &TraversalSideEffects,
    ctx: &mut StepContext<'_>,
) -> Result<Vec<(Value, Value)>> {
    let mut emitter = MapEmitter::new();
    job.map(side_effects, &mut emitter)?;
    if !job.do_stage(Stage::Combine) {
        return Ok(emitter.into_pairs());
    }
    let mut combiner = job.box_clone();
    shuffle(emitter.into_pairs())
        .into_iter()
        .map(|(key, values)| {
            let combined = combiner.combine(&key, &mut values.into_iter(), ctx)?;
            Ok((key, combined))
        })
        .collect()
}

/// Drives one job from the shuffled map output to its final side-effect value.
pub(super) struct JobRun {
    job: Box<dyn MapReduce>,
    stage: JobStage,
}

impl JobRun {
    pub(super) fn new(job: Box<dyn MapReduce>) -> Self {
        Self {
            job,
            stage: JobStage::Map,
        }
    }

    pub(super) fn job(&self) -> &dyn MapReduce {
        self.job.as_ref()
    }

    pub(super) fn stage(&self) -> JobStage {
        self.stage
    }

    fn advance(&mut self) {
        let next = self.stage.next(self.job.do_stage(Stage::Combine));
        debug!("job {}: {:?} -> {next:?}", self.job.job_id(), self.stage);
        self.stage = next;
    }

    /// Called once every partition has mapped (and combined) its input.
    pub(super) fn mapped(&mut self) {
        while self.stage < JobStage::Reduce {
            self.advance();
        }
    }

    /// Reduces every key and builds the final value. A key whose reduce fails
    /// is retried from its full list of values; nothing of a failed attempt is
    /// kept.
    pub(super) fn reduce_and_finalize(
        &mut self,
        shuffled: BTreeMap<Value, Vec<Value>>,
        retry_config: &RetryConfig,
        max_retries: usize,
        ctx: &mut StepContext<'_>,
    ) -> Result<Value> {
        let mut reduced = Vec::with_capacity(shuffled.len());
        for (key, values) in shuffled {
            let what = format!("reduce of key {key}");
            let (result, attempts) = execute_with_retries(
                || {
                    let mut reducer = self.job.box_clone();
                    reducer.reduce(&key, &mut values.iter().cloned(), ctx)
                },
                retry_config.clone(),
                max_retries,
                &what,
            );
            let value = result.map_err(|source| Error::ReduceFailed {
                key: key.clone(),
                attempts,
                source: Box::new(source),
            })?;
            reduced.push((key, value));
        }
        self.advance();
        let result = self.job.generate_final_result(reduced);
        self.advance();
        Ok(result)
    }
}
