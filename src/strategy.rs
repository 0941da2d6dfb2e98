//! Turn-level solvers and racing between them.
//!
//! A [`PlaySolver`] answers one turn: given the board, the rack and whether the
//! player has already made a first play, which tiles go down. Two solvers with
//! different search shapes are raced by [`StrategyRacer`]; whichever reaches a
//! verdict first is kept and the other is cancelled.

use crate::engine::Workspace;
use crate::race::{Acceptance, OrderedRace};
use crate::{
    Board, CancelToken, Rack, Result, Search, SearchPolicy, Solution, SolverConfig, SubsetRacer,
    Tile, policy,
};
use serde::Serialize;
use std::sync::Arc;

/// Verdict of one solver for one turn. `found == false` means the search
/// finished and no legal play exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlayResult {
    pub source: String,
    pub found: bool,
    pub best_solution: Solution,
    pub tiles_to_play: Vec<Tile>,
    pub jokers_to_play: u8,
    /// The rack is emptied by this play.
    pub won: bool,
}

impl PlayResult {
    pub fn not_found(source: &str) -> Self {
        PlayResult {
            source: source.to_string(),
            ..PlayResult::default()
        }
    }

    fn from_solution(source: &str, solution: Solution, rack: &Rack) -> Self {
        let won = solution.played.len() + solution.jokers_played as usize == rack.len();
        PlayResult {
            source: source.to_string(),
            found: true,
            tiles_to_play: solution.played.clone(),
            jokers_to_play: solution.jokers_played,
            won,
            best_solution: solution,
        }
    }
}

/// Map a search outcome onto a verdict. A search that came back empty because
/// it was cancelled has no verdict.
fn verdict(
    source: &str,
    found: Option<Solution>,
    rack: &Rack,
    cancel: &CancelToken,
) -> Option<PlayResult> {
    match found {
        Some(solution) => Some(PlayResult::from_solution(source, solution, rack)),
        None if cancel.is_cancelled() => None,
        None => Some(PlayResult::not_found(source)),
    }
}

/// Anything that can solve a turn.
pub trait PlaySolver: Send + Sync {
    fn label(&self) -> &str;

    /// Returns `None` only when `cancel` fired before a verdict was reached.
    fn solve(
        &self,
        board: &Board,
        rack: &Rack,
        has_played: bool,
        cancel: &CancelToken,
    ) -> Option<PlayResult>;
}

fn first_play(source: &str, rack: &Rack, threshold: u32, cancel: &CancelToken) -> Option<PlayResult> {
    match policy::best_first_play(rack, threshold, cancel.clone()) {
        Some(play) => Some(PlayResult {
            source: source.to_string(),
            found: true,
            best_solution: play.solution,
            tiles_to_play: play.tiles_played,
            jokers_to_play: play.jokers_played,
            won: play.won,
        }),
        None if cancel.is_cancelled() => None,
        None => Some(PlayResult::not_found(source)),
    }
}

/// First play by maximum score, later turns by subset racing.
pub struct MeldEngine {
    label: String,
    threshold: u32,
    subsets: SubsetRacer,
}

impl MeldEngine {
    pub const LABEL: &'static str = "subset-race";

    pub fn new(config: &SolverConfig) -> Result<Self> {
        Ok(MeldEngine {
            label: Self::LABEL.to_string(),
            threshold: config.first_play_threshold,
            subsets: SubsetRacer::new(config)?,
        })
    }
}

impl PlaySolver for MeldEngine {
    fn label(&self) -> &str {
        &self.label
    }

    fn solve(
        &self,
        board: &Board,
        rack: &Rack,
        has_played: bool,
        cancel: &CancelToken,
    ) -> Option<PlayResult> {
        if !has_played {
            return first_play(&self.label, rack, self.threshold, cancel);
        }
        let found = self.subsets.solve(board, rack, cancel);
        verdict(&self.label, found, rack, cancel)
    }
}

/// One maximising search over board and rack together: board tiles must all
/// be placed again, rack tiles may stay behind, and the rack value laid down is
/// maximised.
pub struct MaxScoreEngine {
    label: String,
    threshold: u32,
}

impl MaxScoreEngine {
    pub const LABEL: &'static str = "max-score";

    pub fn new(config: &SolverConfig) -> Self {
        MaxScoreEngine {
            label: Self::LABEL.to_string(),
            threshold: config.first_play_threshold,
        }
    }
}

impl PlaySolver for MaxScoreEngine {
    fn label(&self) -> &str {
        &self.label
    }

    fn solve(
        &self,
        board: &Board,
        rack: &Rack,
        has_played: bool,
        cancel: &CancelToken,
    ) -> Option<PlayResult> {
        if !has_played {
            return first_play(&self.label, rack, self.threshold, cancel);
        }
        let ws = Workspace::merged(&board.tiles(), board.jokers(), &rack.tiles(), rack.jokers());
        let mut search = Search::new(ws, SearchPolicy::MaximizeScore(1), cancel.clone());
        let found = search.run();
        search_log!("max-score search visited {} nodes", search.nodes());
        verdict(&self.label, found, rack, cancel)
    }
}

/// How a race ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RaceOutcome {
    Completed(PlayResult),
    /// The deadline passed before any solver reached a verdict.
    TimedOut,
    /// The caller cancelled the race.
    Cancelled,
}

impl RaceOutcome {
    pub fn result(&self) -> Option<&PlayResult> {
        match self {
            RaceOutcome::Completed(result) => Some(result),
            _ => None,
        }
    }
}

/// Races solvers on identical input and keeps the first verdict.
pub struct StrategyRacer {
    solvers: Vec<Arc<dyn PlaySolver>>,
    race: OrderedRace,
    time_limit_ms: Option<u64>,
}

impl StrategyRacer {
    pub fn new(
        primary: Arc<dyn PlaySolver>,
        alternative: Arc<dyn PlaySolver>,
        config: &SolverConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(StrategyRacer {
            solvers: vec![primary, alternative],
            race: OrderedRace::new(config.worker_count().min(2), Acceptance::FirstFinished)?,
            time_limit_ms: config.time_limit_ms,
        })
    }

    /// [`MeldEngine`] raced against [`MaxScoreEngine`].
    pub fn from_config(config: &SolverConfig) -> Result<Self> {
        Self::new(
            Arc::new(MeldEngine::new(config)?),
            Arc::new(MaxScoreEngine::new(config)),
            config,
        )
    }

    pub fn labels(&self) -> Vec<&str> {
        self.solvers.iter().map(|s| s.label()).collect()
    }

    /// Race without a deadline.
    pub fn race(
        &self,
        board: &Board,
        rack: &Rack,
        has_played: bool,
        cancel: &CancelToken,
    ) -> RaceOutcome {
        match self.first_verdict(board, rack, has_played, cancel) {
            Some(result) => RaceOutcome::Completed(result),
            None => RaceOutcome::Cancelled,
        }
    }

    /// Race against a wall-clock deadline as well as the solvers.
    pub fn race_with_deadline(
        &self,
        board: &Board,
        rack: &Rack,
        has_played: bool,
        limit_ms: u64,
        cancel: &CancelToken,
    ) -> RaceOutcome {
        let timed = cancel.child_with_deadline(limit_ms);
        match self.first_verdict(board, rack, has_played, &timed) {
            Some(result) => RaceOutcome::Completed(result),
            None if cancel.is_cancelled() => RaceOutcome::Cancelled,
            None => {
                search_log!("deadline of {limit_ms}ms passed without a verdict");
                RaceOutcome::TimedOut
            }
        }
    }

    /// Race under the configured time limit, if any.
    pub fn run(
        &self,
        board: &Board,
        rack: &Rack,
        has_played: bool,
        cancel: &CancelToken,
    ) -> RaceOutcome {
        match self.time_limit_ms {
            Some(limit_ms) => self.race_with_deadline(board, rack, has_played, limit_ms, cancel),
            None => self.race(board, rack, has_played, cancel),
        }
    }

    fn first_verdict(
        &self,
        board: &Board,
        rack: &Rack,
        has_played: bool,
        cancel: &CancelToken,
    ) -> Option<PlayResult> {
        let (_, result) = self.race.run(self.solvers.iter(), cancel, |solver, token| {
            solver.solve(board, rack, has_played, token)
        })?;
        search_log!("strategy winner: {}", result.source);
        Some(result)
    }
}
