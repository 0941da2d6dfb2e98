//! Ordered racing of independent branches on a bounded worker pool.
//!
//! Branches are numbered by the order the task stream yields them; a lower
//! index is a more preferred branch. Each branch gets a private cancellation
//! token linked to the caller's. When a branch succeeds it takes the shared
//! lock, and if it beats the recorded best it becomes the new best and cancels
//! every in-flight branch it dominates. Branches that are dominated before
//! they start are skipped, and the task stream stops being pulled once every
//! remaining task is dominated.
//!
//! Under [`Acceptance::LowestIndex`] the result is the lowest index that
//! succeeds, whatever the thread timing. A success is only reported when every
//! lower index reached its own verdict; if the caller's token cuts a lower
//! branch short, the race has no result. [`Acceptance::FirstFinished`] keeps
//! whichever success lands first and cancels everything else.

use crate::{CancelToken, Result, SolverConfig};
use parking_lot::Mutex;
use rayon::iter::{ParallelBridge, ParallelIterator};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

const NONE: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// Keep the most preferred success; cancel only higher indices.
    LowestIndex,
    /// Keep the first success to complete; cancel all others.
    FirstFinished,
}

impl Acceptance {
    fn dominated(self, index: usize, best: usize) -> bool {
        match self {
            Acceptance::LowestIndex => best != NONE && index > best,
            Acceptance::FirstFinished => best != NONE,
        }
    }
}

/// Worker pool plus acceptance rule.
pub struct OrderedRace {
    pool: Option<rayon::ThreadPool>,
    workers: usize,
    acceptance: Acceptance,
}

struct Shared<R> {
    best: Mutex<Option<(usize, R)>>,
    best_index: AtomicUsize,
    /// Lowest index cancelled before reaching a verdict.
    abandoned: AtomicUsize,
    in_flight: Mutex<BTreeMap<usize, CancelToken>>,
    acceptance: Acceptance,
}

impl<R> Shared<R> {
    fn new(acceptance: Acceptance) -> Self {
        Shared {
            best: Mutex::new(None),
            best_index: AtomicUsize::new(NONE),
            abandoned: AtomicUsize::new(NONE),
            in_flight: Mutex::new(BTreeMap::new()),
            acceptance,
        }
    }

    fn dominated(&self, index: usize) -> bool {
        self.acceptance
            .dominated(index, self.best_index.load(Ordering::Acquire))
    }

    fn branch<T, F>(&self, index: usize, task: T, cancel: &CancelToken, f: &F)
    where
        F: Fn(T, &CancelToken) -> Option<R>,
    {
        let token = cancel.child();
        {
            let mut in_flight = self.in_flight.lock();
            if self.dominated(index) {
                return;
            }
            in_flight.insert(index, token.clone());
        }

        let outcome = if token.is_cancelled() {
            None
        } else {
            f(task, &token)
        };
        self.in_flight.lock().remove(&index);

        let Some(result) = outcome else {
            if token.is_cancelled() {
                self.abandoned.fetch_min(index, Ordering::AcqRel);
                search_log!("branch {index} cancelled");
            }
            return;
        };

        let mut best = self.best.lock();
        let improves = match self.acceptance {
            Acceptance::LowestIndex => best.as_ref().is_none_or(|(b, _)| index < *b),
            Acceptance::FirstFinished => best.is_none(),
        };
        if !improves {
            search_log!("branch {index} found but is dominated");
            return;
        }
        *best = Some((index, result));
        self.best_index.store(index, Ordering::Release);
        search_log!("branch {index} is the new best");

        let in_flight = self.in_flight.lock();
        for (&other, other_token) in in_flight.iter() {
            if self.acceptance.dominated(other, index) {
                other_token.cancel();
            }
        }
    }
}

impl OrderedRace {
    /// A race over `workers` threads; one worker runs branches inline on the
    /// caller's thread.
    pub fn new(workers: usize, acceptance: Acceptance) -> Result<Self> {
        let workers = workers.max(1);
        let pool = if workers > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .thread_name(|i| format!("race-{i}"))
                    .build()?,
            )
        } else {
            None
        };
        Ok(OrderedRace {
            pool,
            workers,
            acceptance,
        })
    }

    pub fn from_config(config: &SolverConfig, acceptance: Acceptance) -> Result<Self> {
        config.validate()?;
        Self::new(config.worker_count(), acceptance)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Race `f` over the tasks. Returns the accepted branch index and result,
    /// or `None` when no branch succeeded before cancellation or exhaustion.
    pub fn run<T, R, I, F>(&self, tasks: I, cancel: &CancelToken, f: F) -> Option<(usize, R)>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send,
        T: Send,
        R: Send,
        F: Fn(T, &CancelToken) -> Option<R> + Sync,
    {
        let shared = Shared::new(self.acceptance);
        search_log!("race start: {} workers, {:?}", self.workers, self.acceptance);

        match &self.pool {
            None => {
                for (index, task) in tasks.into_iter().enumerate() {
                    if shared.dominated(index) {
                        break;
                    }
                    if cancel.is_cancelled() {
                        shared.abandoned.fetch_min(index, Ordering::AcqRel);
                        break;
                    }
                    shared.branch(index, task, cancel, &f);
                }
            }
            Some(pool) => {
                let tasks = tasks.into_iter();
                let shared = &shared;
                let f = &f;
                pool.install(move || {
                    tasks
                        .enumerate()
                        .take_while(|(index, _)| !cancel.is_cancelled() && !shared.dominated(*index))
                        .par_bridge()
                        .for_each(|(index, task)| shared.branch(index, task, cancel, f));
                });
            }
        }

        let Shared { best, abandoned, .. } = shared;
        let best = best.into_inner();
        let abandoned = abandoned.into_inner();
        match best {
            Some((index, _)) if self.acceptance == Acceptance::LowestIndex && abandoned < index => {
                search_log!("branch {index} found, but branch {abandoned} was cut short");
                None
            }
            best => best,
        }
    }
}
