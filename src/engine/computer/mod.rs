// Copyright © 2026 Pathway

//! In-process graph computer: runs a traversal over a partitioned input and
//! merges the side effects of the partitions with the steps' map-reduce jobs.

mod job;
mod map_reduce;
mod memory;

pub use job::JobStage;
pub use map_reduce::{JobDescriptor, MapEmitter, MapReduce, Stage};
pub use memory::Memory;

use std::collections::HashSet;

use arcstr::ArcStr;
use log::{debug, info};
use rayon::prelude::*;

use self::job::{map_partition, shuffle, JobRun};
use super::error::{Error, Result};
use super::side_effects::TraversalSideEffects;
use super::step::{Engine, StepContext};
use super::structure::Partition;
use super::traversal::Traversal;
use super::traverser::Traverser;
use super::Value;
use crate::config::ExecutionConfig;
use crate::retry::execute_with_retries;

/// How the input is split between partitions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Partitioning {
    /// Every partition runs over the graph vertices it owns.
    Graph { partitions: usize },
    /// Partition `i` is started with the `i`-th list of values.
    Seeds(Vec<Vec<Value>>),
}

impl Partitioning {
    pub fn count(&self) -> usize {
        match self {
            Self::Graph { partitions } => *partitions,
            Self::Seeds(seeds) => seeds.len(),
        }
    }
}

#[derive(Debug)]
pub struct ComputerResult {
    /// Side effects as the standard engine would have left them.
    pub side_effects: TraversalSideEffects,
    pub memory: Memory,
    /// Results of every partition, halted with the traversal's policy.
    pub halted: Vec<Traverser>,
}

struct PartitionOutput {
    side_effects: TraversalSideEffects,
    halted: Vec<Traverser>,
    emitted: Vec<Vec<(Value, Value)>>,
}

fn collect_jobs(traversal: &Traversal, jobs: &mut Vec<Box<dyn MapReduce>>) {
    for step in traversal.steps() {
        if let Some(job) = step.map_reduce() {
            jobs.push(job);
        }
        for child in step.local_children() {
            collect_jobs(child, jobs);
        }
    }
}

#[derive(Clone, Debug)]
pub struct GraphComputer {
    config: ExecutionConfig,
    partitioning: Partitioning,
}

impl GraphComputer {
    pub fn new(config: ExecutionConfig) -> Self {
        let partitioning = Partitioning::Graph {
            partitions: config.partitions,
        };
        Self {
            config,
            partitioning,
        }
    }

    pub fn with_partitioning(mut self, partitioning: Partitioning) -> Result<Self> {
        if partitioning.count() == 0 {
            return Err(Error::invalid_configuration(
                "the graph computer needs at least one partition",
            ));
        }
        self.partitioning = partitioning;
        Ok(self)
    }

    pub fn partitioning(&self) -> &Partitioning {
        &self.partitioning
    }

    /// Runs `traversal` on every partition and merges the results.
    ///
    /// The traversal itself is left untouched; each partition runs its own
    /// deep copy. A failing partition is rerun from its input, a failing key
    /// reduce is rerun from all of the key's values, and side effects are only
    /// produced once every job has finished.
    pub fn submit(&self, traversal: &Traversal) -> Result<ComputerResult> {
        let mut template = traversal.clone();
        if template.is_locked() && template.engine() != Engine::Computer {
            return Err(Error::TraversalLocked);
        }
        template.set_engine(Engine::Computer);
        template.prepare()?;

        let mut jobs = Vec::new();
        collect_jobs(&template, &mut jobs);
        let count = self.partitioning.count();
        debug!(
            "submitting traversal {template:?} over {count} partitions with {} jobs",
            jobs.len()
        );

        let outputs = (0..count)
            .into_par_iter()
            .map(|index| self.run_partition_with_retries(&template, &jobs, index))
            .collect::<Result<Vec<_>>>()?;

        let mut memory = Memory::new();
        let mut scratch = template.side_effects().clone();
        let mut ctx = StepContext {
            side_effects: &mut scratch,
            env: template.env(),
        };
        let retry_config = self.config.retry_config();
        for (index, job) in jobs.iter().enumerate() {
            let mut run = JobRun::new(job.box_clone());
            run.mapped();
            let shuffled = shuffle(
                outputs
                    .iter()
                    .flat_map(|output| output.emitted[index].iter().cloned()),
            );
            let result = run.reduce_and_finalize(
                shuffled,
                &retry_config,
                self.config.reduce_retries,
                &mut ctx,
            )?;
            debug!("job {} is {:?}", run.job().job_id(), run.stage());
            memory.set(run.job().memory_key().clone(), result);
        }

        let claimed: HashSet<ArcStr> = jobs.iter().map(|job| job.memory_key().clone()).collect();
        for output in &outputs {
            for key in output.side_effects.keys() {
                if claimed.contains(&key) {
                    continue;
                }
                if let Some(operator) = output.side_effects.merge_operator(&key) {
                    memory.register(key.clone(), operator.clone());
                    memory.add(&key, output.side_effects.get(&key)?)?;
                }
            }
        }

        let mut side_effects = template.side_effects().clone();
        memory.install_into(&mut side_effects);
        let halted: Vec<Traverser> = outputs
            .into_iter()
            .flat_map(|output| output.halted)
            .collect();
        info!(
            "graph computer finished: {count} partitions, {} jobs, {} halted traversers",
            jobs.len(),
            halted.len()
        );
        Ok(ComputerResult {
            side_effects,
            memory,
            halted,
        })
    }

    fn run_partition_with_retries(
        &self,
        template: &Traversal,
        jobs: &[Box<dyn MapReduce>],
        index: usize,
    ) -> Result<PartitionOutput> {
        let (result, attempts) = execute_with_retries(
            || self.run_partition(template, jobs, index),
            self.config.retry_config(),
            self.config.map_retries,
            &format!("partition {index}"),
        );
        result.map_err(|source| Error::PartitionFailed {
            partition: index,
            attempts,
            source: Box::new(source),
        })
    }

    /// One attempt at a partition, always from a fresh copy of the template.
    fn run_partition(
        &self,
        template: &Traversal,
        jobs: &[Box<dyn MapReduce>],
        index: usize,
    ) -> Result<PartitionOutput> {
        let mut traversal = scopeguard::guard(template.clone(), |mut traversal| traversal.close());
        match &self.partitioning {
            Partitioning::Graph { partitions } => traversal.set_partition(Some(Partition {
                index,
                count: *partitions,
            })),
            Partitioning::Seeds(seeds) => {
                traversal.add_starts(seeds.get(index).into_iter().flatten().cloned());
            }
        }
        let policy = traversal.halted_strategy();
        let halted = traversal
            .to_traversers()?
            .into_iter()
            .map(|traverser| policy.halt(traverser))
            .collect::<Result<Vec<_>>>()?;

        let mut side_effects = traversal.take_side_effects();
        side_effects.release_path_cache();
        let mut scratch = TraversalSideEffects::new();
        let mut ctx = StepContext {
            side_effects: &mut scratch,
            env: traversal.env(),
        };
        let emitted = jobs
            .iter()
            .map(|job| map_partition(job.as_ref(), &side_effects, &mut ctx))
            .collect::<Result<Vec<_>>>()?;
        Ok(PartitionOutput {
            side_effects,
            halted,
            emitted,
        })
    }
}
