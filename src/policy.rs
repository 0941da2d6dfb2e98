//! Depth-first meld search under one of three acceptance policies.
//!
//! All policies share the same recursion: take the first undecided tile as
//! anchor, try every candidate run through it (shortest first), then every
//! candidate group, and, when the policy allows leaving rack tiles behind,
//! finally try skipping the anchor. Only the acceptance test differs.

use crate::engine::{Backtrack, Candidate, Owner, Placement, Workspace};
use crate::{Board, CancelToken, MAX_NUMBER, Meld, MeldType, Rack, Tile};
use serde::{Deserialize, Serialize};

/// Acceptance rule for a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchPolicy {
    /// Every tile placed and every joker spent.
    ExactCover,
    /// First placement found whose rack score reaches the minimum.
    Threshold(u32),
    /// Highest rack score reaching the minimum, found in two passes.
    MaximizeScore(u32),
}

/// Melds accepted by a search, frozen once returned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    pub melds: Vec<Meld>,
    /// Value of the rack tiles (and rack jokers) the melds place.
    pub score: u32,
    pub valid: bool,
    /// Rack-owned real tiles placed.
    pub played: Vec<Tile>,
    /// Rack-owned jokers placed.
    pub jokers_played: u8,
}

impl Solution {
    pub fn tile_count(&self) -> usize {
        self.melds.iter().map(Meld::len).sum()
    }
}

/// Derived outputs of a first play.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FirstPlay {
    pub solution: Solution,
    pub tiles_played: Vec<Tile>,
    pub jokers_played: u8,
    /// The whole rack went down.
    pub won: bool,
}

#[derive(Debug)]
enum Mode {
    Cover,
    Threshold(u32),
    /// Full traversal recording the best reachable score.
    Discover { min: u32, best: Option<u32> },
    /// Stop at the first placement scoring exactly the target.
    Witness(u32),
}

/// One search invocation: a private working state plus the placement path.
pub struct Search {
    ws: Workspace,
    policy: SearchPolicy,
    cancel: CancelToken,
    path: Vec<Candidate>,
    score: u32,
    to_play: Vec<Tile>,
    jokers_to_play: u8,
    nodes: u64,
}

impl Backtrack for Search {
    fn apply(&mut self, candidate: &Candidate) {
        self.ws.mark_used(candidate);
        self.score = self.ws.rack_score();
        self.path.push(candidate.clone());
    }

    fn undo(&mut self, candidate: &Candidate) {
        self.path.pop();
        self.ws.mark_unused(candidate);
        self.score = self.ws.rack_score();
    }
}

impl Search {
    pub fn new(ws: Workspace, policy: SearchPolicy, cancel: CancelToken) -> Self {
        Search {
            ws,
            policy,
            cancel,
            path: Vec::new(),
            score: 0,
            to_play: Vec::new(),
            jokers_to_play: 0,
            nodes: 0,
        }
    }

    /// Exact cover of the board merged with the tiles a player intends to
    /// lay down. The intended tiles are kept aside as the play.
    pub fn exact_cover(board: &Board, play: &[Tile], jokers: u8, cancel: CancelToken) -> Self {
        let ws = Workspace::merged(&board.tiles(), board.jokers(), play, jokers);
        let mut search = Search::new(ws, SearchPolicy::ExactCover, cancel);
        search.to_play = play.to_vec();
        search.jokers_to_play = jokers;
        search
    }

    /// A search over the rack alone, as on a player's first play.
    pub fn first_play(rack: &Rack, policy: SearchPolicy, cancel: CancelToken) -> Self {
        let ws = Workspace::merged(&[], 0, &rack.tiles(), rack.jokers());
        Search::new(ws, policy, cancel)
    }

    pub fn workspace(&self) -> &Workspace {
        &self.ws
    }

    pub fn tiles_to_play(&self) -> &[Tile] {
        &self.to_play
    }

    pub fn jokers_to_play(&self) -> u8 {
        self.jokers_to_play
    }

    /// Nodes visited so far, across both passes of a maximising search.
    pub fn nodes(&self) -> u64 {
        self.nodes
    }

    /// Run the configured policy. `None` means no acceptable placement exists
    /// or the search was cancelled first.
    pub fn run(&mut self) -> Option<Solution> {
        match self.policy {
            SearchPolicy::ExactCover => self.explore(0, &mut Mode::Cover),
            SearchPolicy::Threshold(min) => self.explore(0, &mut Mode::Threshold(min)),
            SearchPolicy::MaximizeScore(min) => {
                let best = self.best_score(min)?;
                self.explore(0, &mut Mode::Witness(best))
            }
        }
    }

    /// First pass of the maximising policy: the highest score at least `min`
    /// over the whole tree.
    pub fn best_score(&mut self, min: u32) -> Option<u32> {
        let mut discover = Mode::Discover { min, best: None };
        self.explore(0, &mut discover);
        if self.cancel.is_cancelled() {
            return None;
        }
        match discover {
            Mode::Discover { best, .. } => best,
            _ => None,
        }
    }

    /// Upper bound on the score any completion of the current path reaches.
    fn reachable(&self, from: usize) -> u32 {
        let jokers = u32::from(self.ws.jokers().min(self.ws.rack_jokers()));
        self.score + self.ws.rack_value_from(from) + jokers * u32::from(MAX_NUMBER)
    }

    fn explore(&mut self, from: usize, mode: &mut Mode) -> Option<Solution> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.nodes += 1;

        let anchor = self.ws.first_unused(from);
        let settled = self.ws.board_settled();
        match mode {
            Mode::Cover => {
                if anchor.is_none() {
                    return (self.ws.jokers() == 0).then(|| self.snapshot());
                }
            }
            Mode::Threshold(min) => {
                if settled && self.score >= *min {
                    return Some(self.snapshot());
                }
                if self.reachable(from) < *min {
                    return None;
                }
            }
            Mode::Discover { min, best } => {
                if settled && self.score >= *min {
                    let score = best.map_or(self.score, |b| b.max(self.score));
                    *best = Some(score);
                }
                let bound = self.reachable(from);
                if bound < *min || best.is_some_and(|b| bound <= b) {
                    return None;
                }
            }
            Mode::Witness(target) => {
                if settled && self.score == *target {
                    return Some(self.snapshot());
                }
                if self.reachable(from) < *target {
                    return None;
                }
            }
        }
        let anchor = anchor?;

        let mut runs = self.ws.candidate_runs(anchor);
        while let Some(candidate) = runs.next(&self.ws, &self.cancel) {
            let mut placed = Placement::new(self, candidate);
            if let Some(found) = placed.explore(anchor, mode) {
                return Some(found);
            }
        }

        let mut groups = self.ws.candidate_groups(anchor);
        while let Some(candidate) = groups.next(&self.ws, &self.cancel) {
            let mut placed = Placement::new(self, candidate);
            if let Some(found) = placed.explore(anchor, mode) {
                return Some(found);
            }
        }

        // Rack tiles may stay behind; board tiles must be placed
        if !matches!(mode, Mode::Cover) && self.ws.owner(anchor) == Owner::Rack {
            return self.explore(anchor + 1, mode);
        }
        None
    }

    fn snapshot(&self) -> Solution {
        let melds: Vec<Meld> = self.path.iter().map(|c| c.meld.clone()).collect();
        let valid = melds
            .iter()
            .all(|m| m.is_valid() && (m.meld_type == MeldType::Run || m.len() >= 3));
        let played = self
            .path
            .iter()
            .flat_map(|c| c.slots.iter())
            .filter(|&&i| self.ws.owner(i) == Owner::Rack)
            .map(|&i| self.ws.tile(i))
            .collect();
        let jokers_spent = self.ws.initial_jokers() - self.ws.jokers();
        Solution {
            melds,
            score: self.score,
            valid,
            played,
            jokers_played: jokers_spent.saturating_sub(self.ws.board_jokers()),
        }
    }
}

/// Best first play from `rack` scoring at least `threshold`.
pub fn best_first_play(rack: &Rack, threshold: u32, cancel: CancelToken) -> Option<FirstPlay> {
    let mut search = Search::first_play(rack, SearchPolicy::MaximizeScore(threshold), cancel);
    let solution = search.run()?;
    let won = solution.played.len() == search.workspace().rack_len()
        && solution.jokers_played == rack.jokers();
    Some(FirstPlay {
        tiles_played: solution.played.clone(),
        jokers_played: solution.jokers_played,
        won,
        solution,
    })
}

/// One-shot check that `board` plus the given tiles re-tiles exactly.
pub fn validate_play(
    board: &Board,
    tiles: &[Tile],
    jokers: u8,
    cancel: CancelToken,
) -> Option<Solution> {
    Search::exact_cover(board, tiles, jokers, cancel).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Color;

    fn tiles(s: &str) -> Vec<Tile> {
        s.split_whitespace().map(|t| t.parse().unwrap()).collect()
    }

    fn rack(s: &str) -> Rack {
        Rack::from_notation(s).unwrap()
    }

    fn assert_pristine(search: &Search) {
        let ws = search.workspace();
        assert!(ws.used_mask().iter().all(|u| !u));
        assert_eq!(ws.jokers(), ws.initial_jokers());
    }

    fn assert_exact_cover(solution: &Solution, expected_tiles: usize) {
        assert!(solution.valid);
        assert!(solution.melds.iter().all(Meld::is_valid));
        assert_eq!(solution.tile_count(), expected_tiles);
    }

    #[test]
    fn test_exact_cover_run_and_group() {
        let ws = Workspace::from_tiles(tiles("r4 r5 r6 b10 k10 y10"));
        let mut search = Search::new(ws, SearchPolicy::ExactCover, CancelToken::new());
        let solution = search.run().unwrap();
        assert_exact_cover(&solution, 6);
        assert_eq!(solution.melds.len(), 2);
        assert_pristine(&search);
    }

    #[test]
    fn test_exact_cover_rejects_leftover_tile() {
        let ws = Workspace::from_tiles(tiles("r4 r5 r6 b9"));
        let mut search = Search::new(ws, SearchPolicy::ExactCover, CancelToken::new());
        assert!(search.run().is_none());
        assert_pristine(&search);
    }

    #[test]
    fn test_exact_cover_rejects_unspent_joker() {
        let ws = Workspace::from_tiles(tiles("r4 r5 r6 r7 r8 r9 w"));
        let mut search = Search::new(ws, SearchPolicy::ExactCover, CancelToken::new());
        // the joker has to go somewhere: r4..r9 plus w as r10 or r3
        let solution = search.run().unwrap();
        assert_exact_cover(&solution, 7);

        let ws = Workspace::from_tiles(tiles("r1 r2 r3 b7 k7 y7 r7 w w"));
        let mut search = Search::new(ws, SearchPolicy::ExactCover, CancelToken::new());
        let solution = search.run().unwrap();
        assert_exact_cover(&solution, 9);
    }

    #[test]
    fn test_joker_fills_one_interior_gap() {
        let board = Board::new();
        let found = validate_play(&board, &tiles("b3 b5 b6"), 1, CancelToken::new()).unwrap();
        assert_exact_cover(&found, 4);
        assert_eq!(found.melds[0].to_string(), "run[b3 w b5 b6]");

        // two values missing, one joker
        assert!(validate_play(&board, &tiles("b3 b6 b7"), 1, CancelToken::new()).is_none());
    }

    #[test]
    fn test_group_of_three_plus_joker() {
        let found = validate_play(&Board::new(), &tiles("r8 b8 k8"), 1, CancelToken::new()).unwrap();
        assert_exact_cover(&found, 4);
        assert_eq!(found.melds.len(), 1);
        assert_eq!(found.melds[0].meld_type, MeldType::Group);
        assert_eq!(found.score, 32);
        assert_eq!(found.jokers_played, 1);
    }

    #[test]
    fn test_validate_extends_board_run() {
        let board = Board::from_notation("r 1 2 3 4").unwrap();
        let mut search = Search::exact_cover(&board, &tiles("r5"), 0, CancelToken::new());
        let solution = search.run().unwrap();
        assert_exact_cover(&solution, 5);
        assert_eq!(solution.melds.len(), 1);
        assert_eq!(solution.played, tiles("r5"));
        assert_eq!(solution.score, 5);
        assert_eq!(search.tiles_to_play(), tiles("r5").as_slice());
    }

    #[test]
    fn test_board_rearrangement() {
        // r3 r4 r5 r6 splits to make room for a second run
        let board = Board::from_notation("r 3 4 5 6").unwrap();
        let solution = validate_play(&board, &tiles("r7 r8"), 0, CancelToken::new()).unwrap();
        assert_exact_cover(&solution, 6);
        let board = Board::from_notation("r 3 4 5 6; 6 b y k").unwrap();
        let solution = validate_play(&board, &tiles("r6 r7"), 0, CancelToken::new()).unwrap();
        assert_exact_cover(&solution, 9);
    }

    #[test]
    fn test_threshold_reaches_thirty() {
        let mut search = Search::first_play(
            &rack("r1 r2 r3 b10 y10 k10 k11 k12"),
            SearchPolicy::Threshold(30),
            CancelToken::new(),
        );
        let solution = search.run().unwrap();
        assert!(solution.score >= 30);
        assert!(solution.valid);
        assert_pristine(&search);
    }

    #[test]
    fn test_threshold_not_reachable() {
        let mut search = Search::first_play(
            &rack("r1 r2 r3 b4 y4 k4 b9"),
            SearchPolicy::Threshold(30),
            CancelToken::new(),
        );
        assert!(search.run().is_none());
        assert_pristine(&search);
    }

    #[test]
    fn test_threshold_prefers_runs_then_shortest() {
        // r10 r11 r12 alone scores 33, found before the longer run or the group
        let mut search = Search::first_play(
            &rack("r10 r11 r12 r13 b10 y10"),
            SearchPolicy::Threshold(30),
            CancelToken::new(),
        );
        let solution = search.run().unwrap();
        assert_eq!(solution.melds.len(), 1);
        assert_eq!(solution.melds[0].to_string(), "run[r10 r11 r12]");
        assert_eq!(solution.score, 33);
    }

    #[test]
    fn test_maximize_finds_best_over_first() {
        let rack = rack("r10 r11 r12 r13 b10 y10");
        let play = best_first_play(&rack, 30, CancelToken::new()).unwrap();
        // r11 r12 r13 + r10 b10 y10 uses everything: 36 + 30
        assert_eq!(play.solution.score, 66);
        assert!(play.won);
        assert_eq!(play.tiles_played.len(), 6);
    }

    #[test]
    fn test_maximize_none_below_threshold() {
        assert!(best_first_play(&rack("r1 r2 r3 b5 y5 k5"), 30, CancelToken::new()).is_none());
    }

    #[test]
    fn test_maximize_reports_leftovers() {
        let play = best_first_play(&rack("b11 b12 b13 r2 k7"), 30, CancelToken::new()).unwrap();
        assert_eq!(play.solution.score, 36);
        assert!(!play.won);
        assert_eq!(play.jokers_played, 0);
        assert_eq!(play.tiles_played, tiles("b11 b12 b13"));
    }

    #[test]
    fn test_cancelled_search_returns_nothing() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut search = Search::first_play(
            &rack("r10 r11 r12 r13 b10 y10"),
            SearchPolicy::MaximizeScore(30),
            cancel,
        );
        assert!(search.run().is_none());
        assert_pristine(&search);
    }

    // Brute force over every legal meld that fits the rack, in the style of
    // enumerating all runs and groups up front.
    fn all_fitting_melds(rack: &Rack) -> Vec<Meld> {
        let jokers = u32::from(rack.jokers());
        let mut melds = Vec::new();
        for color in Color::ALL {
            for start in 1..=11u8 {
                for len in 3..=(14 - start) {
                    for mask in 0u32..(1u32 << len) {
                        if mask.count_ones() > jokers || mask.count_ones() == u32::from(len) {
                            continue;
                        }
                        let tiles = (0..len)
                            .map(|i| {
                                if mask & (1u32 << i) != 0 {
                                    Tile::wild()
                                } else {
                                    Tile::new(color, start + i)
                                }
                            })
                            .collect();
                        melds.push(Meld::new(MeldType::Run, tiles));
                    }
                }
            }
        }
        for number in 1..=13u8 {
            for mask in 1u32..16 {
                for wild in 0..=jokers.min(3) {
                    if !(3..=4).contains(&(mask.count_ones() + wild)) {
                        continue;
                    }
                    let mut tiles: std::collections::VecDeque<Tile> = Color::ALL
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| mask & (1u32 << i) != 0)
                        .map(|(_, &c)| Tile::new(c, number))
                        .collect();
                    tiles.extend((0..wild).map(|_| Tile::wild()));
                    melds.push(Meld::new(MeldType::Group, tiles));
                }
            }
        }
        melds.retain(|m| fits(rack, m));
        melds
    }

    fn fits(rack: &Rack, meld: &Meld) -> bool {
        let mut left = rack.clone();
        meld.tiles.iter().all(|t| left.remove(t))
    }

    fn brute_best(rack: &mut Rack, melds: &[Meld], start: usize, score: u32, best: &mut Option<u32>) {
        if score >= 30 && best.is_none_or(|b| score > b) {
            *best = Some(score);
        }
        for i in start..melds.len() {
            if fits(rack, &melds[i]) {
                for t in &melds[i].tiles {
                    rack.remove(t);
                }
                brute_best(rack, melds, i, score + melds[i].score(), best);
                for t in &melds[i].tiles {
                    rack.add(*t).unwrap();
                }
            }
        }
    }

    #[test]
    fn test_maximize_matches_brute_force() {
        for notation in [
            "r10 r11 r12 r13 b10 y10",
            "r5 r6 r7 b6 k6 y6 w",
            "k13 r13 b13 w",
            "b1 b2 b3 b4 r4 y4 k4 b9",
            "y8 y9 y11 w r9 b9 k9",
            "r12 r13 w b2 b3",
            "r3 r4 r5 r5 r6 r7 b5 k5",
        ] {
            let mut rack = rack(notation);
            let melds = all_fitting_melds(&rack);
            let mut expected = None;
            brute_best(&mut rack, &melds, 0, 0, &mut expected);

            let got = best_first_play(&rack, 30, CancelToken::new()).map(|p| p.solution.score);
            assert_eq!(got, expected, "rack {notation}");
        }
    }
}
