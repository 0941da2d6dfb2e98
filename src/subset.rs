//! Races exact-cover checks over subsets of the rack.
//!
//! Every branch asks one question: does the board plus this subset (and this
//! many rack jokers) still split exactly into melds? Branches are ordered from
//! most to least preferred, so the lowest index that succeeds is the play to
//! make: larger subsets first, then higher face value, then more jokers.

use crate::engine::KCombinations;
use crate::race::{Acceptance, OrderedRace};
use crate::{Board, CancelToken, Rack, Result, Search, Solution, SolverConfig, Tile};

/// Tiles and jokers one branch tries to add to the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsetPlan {
    pub tiles: Vec<Tile>,
    pub jokers: u8,
}

fn face_value(tiles: &[Tile]) -> u32 {
    tiles.iter().map(Tile::value).sum()
}

/// Branches in preference order. Subsets of equal size are ranked by face
/// value; duplicate tiles in the rack do not produce duplicate branches. Plans
/// made of jokers alone come last.
pub fn subset_plans(
    rack: &Rack,
    max_size: Option<usize>,
    cancel: CancelToken,
) -> impl Iterator<Item = SubsetPlan> + Send {
    let tiles = rack.tiles();
    let jokers = rack.jokers();
    let top = max_size.map_or(tiles.len(), |m| m.min(tiles.len()));

    let with_tiles = (1..=top).rev().flat_map(move |k| {
        let mut subsets: Vec<Vec<Tile>> = KCombinations::new(tiles.clone(), k)
            .with_cancel(cancel.clone())
            .collect();
        subsets.sort_by(|a, b| face_value(b).cmp(&face_value(a)).then_with(|| a.cmp(b)));
        subsets.dedup();
        subsets.into_iter().flat_map(move |subset| {
            (0..=jokers).rev().map(move |j| SubsetPlan {
                tiles: subset.clone(),
                jokers: j,
            })
        })
    });
    let jokers_only = (1..=jokers).rev().map(|j| SubsetPlan {
        tiles: Vec::new(),
        jokers: j,
    });
    with_tiles.chain(jokers_only)
}

/// Subset racing over a bounded worker pool.
pub struct SubsetRacer {
    race: OrderedRace,
    max_subset_size: Option<usize>,
}

impl SubsetRacer {
    pub fn new(config: &SolverConfig) -> Result<Self> {
        Ok(SubsetRacer {
            race: OrderedRace::from_config(config, Acceptance::LowestIndex)?,
            max_subset_size: config.max_subset_size,
        })
    }

    pub fn workers(&self) -> usize {
        self.race.workers()
    }

    /// The most preferred play that keeps `board` exactly covered. The
    /// solution's melds re-tile the whole table; `played` and `jokers_played`
    /// are the rack part. `None` when no subset fits or `cancel` fired first.
    pub fn solve(&self, board: &Board, rack: &Rack, cancel: &CancelToken) -> Option<Solution> {
        let plans = subset_plans(rack, self.max_subset_size, cancel.clone());
        let (index, solution) = self.race.run(plans, cancel, |plan, token| {
            let mut search = Search::exact_cover(board, &plan.tiles, plan.jokers, token.clone());
            let found = search.run();
            if found.is_some() {
                search_log!(
                    "cover for {} tiles + {} jokers after {} nodes",
                    plan.tiles.len(),
                    plan.jokers,
                    search.nodes()
                );
            }
            found
        })?;
        search_log!(
            "subset branch {index} accepted: {} tiles, {} jokers",
            solution.played.len(),
            solution.jokers_played
        );
        Some(solution)
    }
}
