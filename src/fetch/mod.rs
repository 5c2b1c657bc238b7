//! Request planning and execution.
//!
//! A fetch runs in three phases:
//!
//! 1. **Plan**: every requested time is checked against the schedule and
//!    its cycle index is loaded (once per time). Every `(time, variable)`
//!    pair becomes a [`Task`] holding the byte range of its message. All
//!    validation errors surface here, before any field is transferred.
//! 2. **Execute**: tasks run either on the calling thread in slot order, or
//!    on a scoped worker pool fed by a crossbeam channel. Workers only
//!    read, decode and conform fields; they never touch the output.
//! 3. **Assemble**: the calling thread writes each result into the grid at
//!    its slot. If tasks fail, the error of the lowest slot is returned, so
//!    the outcome does not depend on scheduling.

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use chrono::{DateTime, Utc};
use crossbeam::channel;
use tracing::{debug, trace};

use crate::IfsError;
use crate::cache::FieldCache;
use crate::grid::{self, Grid};
use crate::index::{CycleIndex, IndexEntry};
use crate::lexicon::{LexiconEntry, Modifier};
use crate::message;
use crate::schedule::{Cycle, Schedule, Unavailability};
use crate::store::{ObjectStore, StoreError};

/// One field to read: the `(t, v)` cell of the output grid.
#[derive(Debug, Clone)]
pub(crate) struct Task {
    /// Row-major position `t * n_variable + v`.
    pub slot: usize,
    pub t: usize,
    pub v: usize,
    pub variable: String,
    pub cycle: Cycle,
    pub entry: IndexEntry,
    pub modifier: Modifier,
}

/// Resolved request, ready to execute.
#[derive(Debug)]
pub(crate) struct Plan {
    pub times: Vec<DateTime<Utc>>,
    pub variables: Vec<String>,
    pub tasks: Vec<Task>,
}

/// Reads fields from a store through a cache.
pub(crate) struct Fetcher<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
    cache: &'a FieldCache,
}

impl<'a, S: ObjectStore + ?Sized> Fetcher<'a, S> {
    pub fn new(store: &'a S, cache: &'a FieldCache) -> Self {
        Self { store, cache }
    }

    // --------------------------------------------------------------------------------------------
    // Planning
    // --------------------------------------------------------------------------------------------

    /// Validates every time at instant `now` and resolves every
    /// `(time, variable)` to a byte range.
    ///
    /// `variables` pairs each requested name with its lexicon entry.
    pub fn plan(
        &self,
        schedule: &Schedule,
        now: DateTime<Utc>,
        times: Vec<DateTime<Utc>>,
        variables: Vec<(String, LexiconEntry)>,
    ) -> Result<Plan, IfsError> {
        let mut cycles = Vec::with_capacity(times.len());
        for &time in &times {
            let cycle = schedule
                .check(time, now)
                .map_err(|reason| IfsError::UnavailableTime { time, reason })?;
            cycles.push(cycle);
        }

        let mut tasks = Vec::with_capacity(times.len() * variables.len());
        for (t, cycle) in cycles.iter().enumerate() {
            let index = self.load_index(cycle)?;
            for (v, (name, lex)) in variables.iter().enumerate() {
                let entry = index
                    .find(&lex.field)
                    .ok_or_else(|| IfsError::MissingField {
                        variable: name.clone(),
                        field: lex.field.to_string(),
                        time: cycle.time(),
                    })?;
                tasks.push(Task {
                    slot: t * variables.len() + v,
                    t,
                    v,
                    variable: name.clone(),
                    cycle: *cycle,
                    entry: entry.clone(),
                    modifier: lex.modifier,
                });
            }
        }

        debug!(
            times = times.len(),
            variables = variables.len(),
            tasks = tasks.len(),
            "fetch planned"
        );

        Ok(Plan {
            times,
            variables: variables.into_iter().map(|(name, _)| name).collect(),
            tasks,
        })
    }

    /// Loads a cycle index from the cache, or from the store on a miss.
    ///
    /// A missing index object means the cycle is not published, even when
    /// a copy is cached, so a fetch succeeds exactly when `available` holds.
    fn load_index(&self, cycle: &Cycle) -> Result<CycleIndex, IfsError> {
        let not_published = || IfsError::UnavailableTime {
            time: cycle.time(),
            reason: Unavailability::NotPublished,
        };

        if let Some(index) = self.cache.get_index(cycle)? {
            if !self.store.exists(&cycle.index_key())? {
                return Err(not_published());
            }
            debug!(%cycle, "index cache hit");
            return Ok(index);
        }

        let raw = match self.store.get(&cycle.index_key()) {
            Ok(raw) => raw,
            Err(StoreError::NotFound(_)) => return Err(not_published()),
            Err(e) => return Err(e.into()),
        };
        let index = CycleIndex::decode(&raw)?;
        if index.time() != cycle.time() {
            return Err(IfsError::Internal(format!(
                "index {} describes cycle {}",
                cycle.index_key(),
                index.time()
            )));
        }

        self.cache.put_index(cycle, &raw)?;
        debug!(%cycle, fields = index.entries().len(), "index fetched");
        Ok(index)
    }

    // --------------------------------------------------------------------------------------------
    // Execution
    // --------------------------------------------------------------------------------------------

    /// Reads, decodes and conforms the field of one task.
    pub fn read_field(&self, task: &Task) -> Result<Vec<f32>, IfsError> {
        let id = &task.entry.id;
        let field = match self.cache.get_field(&task.cycle, id)? {
            Some(field) => {
                trace!(cycle = %task.cycle, field = %id, "field cache hit");
                field
            }
            None => {
                let range = task.entry.range();
                trace!(cycle = %task.cycle, field = %id, ?range, "range read");
                let raw = self.store.get_range(&task.cycle.data_key(), range)?;
                let field = message::decode_message(&raw)?;
                if &field.id != id || field.time != task.cycle.time() {
                    return Err(IfsError::Internal(format!(
                        "range {:?} of {} holds {} at {}, expected {id}",
                        task.entry.range(),
                        task.cycle.data_key(),
                        field.id,
                        field.time
                    )));
                }
                self.cache.put_field(&task.cycle, id, &raw)?;
                field
            }
        };

        let mut values =
            grid::conform(&field.grid, field.values).map_err(|reason| IfsError::GridMismatch {
                variable: task.variable.clone(),
                time: task.cycle.time(),
                reason,
            })?;
        task.modifier.apply(&mut values);

        if values.iter().any(|v| v.is_nan()) {
            return Err(IfsError::MissingValues {
                variable: task.variable.clone(),
                time: task.cycle.time(),
            });
        }
        Ok(values)
    }

    /// Executes a plan with up to `max_workers` threads (0 means the
    /// calling thread) and assembles the grid.
    pub fn execute(&self, plan: Plan, max_workers: usize) -> Result<Grid, IfsError> {
        let mut grid = Grid::zeros(plan.times, plan.variables);
        let workers = max_workers.min(plan.tasks.len());

        if workers == 0 {
            for task in &plan.tasks {
                let values = self.read_field(task)?;
                grid.set_field(task.t, task.v, &values);
            }
        } else {
            self.execute_pooled(&plan.tasks, workers, &mut grid)?;
        }

        debug!(tasks = plan.tasks.len(), workers, "fetch executed");
        Ok(grid)
    }

    fn execute_pooled(&self, tasks: &[Task], workers: usize, grid: &mut Grid) -> Result<(), IfsError> {
        let (task_tx, task_rx) = channel::unbounded::<&Task>();
        let (result_tx, result_rx) = channel::unbounded::<(usize, Result<Vec<f32>, IfsError>)>();

        for task in tasks {
            task_tx
                .send(task)
                .map_err(|_| IfsError::Internal("task channel closed".into()))?;
        }
        drop(task_tx);

        // Lowest slot that has failed so far; later slots can be skipped.
        let failed_at = AtomicUsize::new(usize::MAX);

        thread::scope(|scope| {
            for id in 0..workers {
                let rx = task_rx.clone();
                let tx = result_tx.clone();
                let failed_at = &failed_at;
                thread::Builder::new()
                    .name(format!("ifsfetch-worker-{id}"))
                    .spawn_scoped(scope, move || {
                        while let Ok(task) = rx.recv() {
                            if task.slot > failed_at.load(Ordering::Acquire) {
                                continue;
                            }
                            let result = self.read_field(task);
                            if result.is_err() {
                                failed_at.fetch_min(task.slot, Ordering::AcqRel);
                            }
                            if tx.send((task.slot, result)).is_err() {
                                break;
                            }
                        }
                    })
                    .map_err(|e| IfsError::Internal(format!("failed to spawn worker: {e}")))?;
            }
            drop(result_tx);

            let mut first_error: Option<(usize, IfsError)> = None;
            for (slot, result) in result_rx.iter() {
                match result {
                    Ok(values) => {
                        let task = &tasks[slot];
                        grid.set_field(task.t, task.v, &values);
                    }
                    Err(e) => {
                        if first_error.as_ref().is_none_or(|(s, _)| slot < *s) {
                            first_error = Some((slot, e));
                        }
                    }
                }
            }

            match first_error {
                Some((slot, e)) => {
                    debug!(slot, error = %e, "fetch failed");
                    Err(e)
                }
                None => Ok(()),
            }
        })
    }
}
