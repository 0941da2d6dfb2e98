//! Working state of one search call and the candidate melds it can place.
//!
//! A [`Workspace`] holds the sorted, joker-stripped tile array, a parallel
//! used mask and the remaining joker budget. Candidates are generated lazily
//! by cursors that read the workspace only when asked for the next meld, so a
//! caller can place a candidate, recurse, and come back to the cursor once the
//! placement has been undone.
//!
//! Every mutation goes through [`Placement`], which applies a candidate on
//! creation and undoes it on drop. A frame that returns early, including with
//! an accepted solution, still leaves the workspace exactly as it found it.

use crate::{CancelToken, Color, MAX_NUMBER, Meld, MeldType, Tile};
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};

/// Who a working-array tile belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Owner {
    /// Already on the table; free to rearrange, scores nothing.
    Board,
    /// From the player's rack; scores when played.
    Rack,
}

/// A meld that can be placed at some anchor, with the working-array indices of
/// the real tiles it consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub meld: Meld,
    pub slots: Vec<usize>,
    joker_values: Vec<u32>,
}

impl Candidate {
    fn new(meld: Meld, slots: Vec<usize>) -> Self {
        let joker_values = meld
            .tiles
            .iter()
            .zip(meld.slot_values())
            .filter(|(tile, _)| tile.is_wild())
            .map(|(_, value)| value)
            .collect();
        Candidate {
            meld,
            slots,
            joker_values,
        }
    }

    pub fn jokers(&self) -> u8 {
        self.joker_values.len() as u8
    }
}

#[derive(Debug, Clone)]
pub struct Workspace {
    tiles: Vec<Tile>,
    owner: Vec<Owner>,
    used: Vec<bool>,
    jokers: u8,
    initial_jokers: u8,
    board_jokers: u8,
    board_left: usize,
    /// Value of the real rack tiles placed so far.
    rack_real: u32,
    /// Values stood for by every joker placed so far.
    placed_jokers: Vec<u32>,
}

impl Workspace {
    /// Build from a plain tile list, everything rack-owned. Jokers are sorted
    /// to the end and stripped into the budget.
    pub fn from_tiles(mut tiles: Vec<Tile>) -> Self {
        tiles.sort_unstable();
        let jokers = tiles.iter().rev().take_while(|t| t.is_wild()).count();
        tiles.truncate(tiles.len() - jokers);
        let entries = tiles.into_iter().map(|t| (t, Owner::Rack)).collect();
        Self::build(entries, 0, u8::try_from(jokers).unwrap_or(u8::MAX))
    }

    /// Board tiles merged with rack tiles, each index tagged with its owner.
    pub fn merged(board: &[Tile], board_jokers: u8, rack: &[Tile], rack_jokers: u8) -> Self {
        let mut entries: Vec<(Tile, Owner)> = board
            .iter()
            .map(|&t| (t, Owner::Board))
            .chain(rack.iter().map(|&t| (t, Owner::Rack)))
            .filter(|(t, _)| !t.is_wild())
            .collect();
        entries.sort_unstable();
        Self::build(entries, board_jokers, rack_jokers)
    }

    fn build(entries: Vec<(Tile, Owner)>, board_jokers: u8, rack_jokers: u8) -> Self {
        let board_left = entries.iter().filter(|(_, o)| *o == Owner::Board).count();
        let (tiles, owner): (Vec<Tile>, Vec<Owner>) = entries.into_iter().unzip();
        let jokers = board_jokers.saturating_add(rack_jokers);
        Workspace {
            used: vec![false; tiles.len()],
            tiles,
            owner,
            jokers,
            initial_jokers: jokers,
            board_jokers,
            board_left,
            rack_real: 0,
            placed_jokers: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn tile(&self, index: usize) -> Tile {
        self.tiles[index]
    }

    pub fn owner(&self, index: usize) -> Owner {
        self.owner[index]
    }

    pub fn is_used(&self, index: usize) -> bool {
        self.used[index]
    }

    pub fn used_mask(&self) -> &[bool] {
        &self.used
    }

    /// Remaining joker budget.
    pub fn jokers(&self) -> u8 {
        self.jokers
    }

    pub fn initial_jokers(&self) -> u8 {
        self.initial_jokers
    }

    pub fn rack_jokers(&self) -> u8 {
        self.initial_jokers - self.board_jokers
    }

    pub fn board_jokers(&self) -> u8 {
        self.board_jokers
    }

    /// Number of rack-owned real tiles.
    pub fn rack_len(&self) -> usize {
        self.owner.iter().filter(|&&o| o == Owner::Rack).count()
    }

    pub fn first_unused(&self, from: usize) -> Option<usize> {
        (from..self.tiles.len()).find(|&i| !self.used[i])
    }

    /// Every board tile and board joker is placed, so the table stays legal
    /// whatever happens to the remaining rack tiles.
    pub fn board_settled(&self) -> bool {
        self.board_left == 0 && self.initial_jokers - self.jokers >= self.board_jokers
    }

    /// Value of unused rack tiles at or after `from`.
    pub fn rack_value_from(&self, from: usize) -> u32 {
        (from..self.tiles.len())
            .filter(|&i| !self.used[i] && self.owner[i] == Owner::Rack)
            .map(|i| self.tiles[i].value())
            .sum()
    }

    pub fn candidate_runs(&self, anchor: usize) -> RunCursor {
        RunCursor::new(anchor)
    }

    pub fn candidate_groups(&self, anchor: usize) -> GroupCursor {
        GroupCursor::new(self, anchor)
    }

    fn rack_real_in(&self, candidate: &Candidate) -> u32 {
        candidate
            .slots
            .iter()
            .filter(|&&i| self.owner[i] == Owner::Rack)
            .map(|&i| self.tiles[i].value())
            .sum()
    }

    /// Value the current placement lays down for the rack. Once the board's
    /// own jokers are covered, every further joker belongs to the rack, and the
    /// rack is credited with the highest joker values on the table whatever
    /// order they were placed in.
    pub fn rack_score(&self) -> u32 {
        let credited = self
            .placed_jokers
            .len()
            .saturating_sub(self.board_jokers as usize);
        let jokers: u32 = if credited == 0 {
            0
        } else if credited == self.placed_jokers.len() {
            self.placed_jokers.iter().sum()
        } else {
            let mut values = self.placed_jokers.clone();
            values.sort_unstable_by(|a, b| b.cmp(a));
            values.iter().take(credited).sum()
        };
        self.rack_real + jokers
    }

    /// Consume the candidate's tiles and jokers.
    pub fn mark_used(&mut self, candidate: &Candidate) {
        for &i in &candidate.slots {
            debug_assert!(!self.used[i], "tile {i} placed twice");
            self.used[i] = true;
            if self.owner[i] == Owner::Board {
                self.board_left -= 1;
            }
        }
        self.jokers -= candidate.jokers();
        self.rack_real += self.rack_real_in(candidate);
        self.placed_jokers.extend_from_slice(&candidate.joker_values);
    }

    /// Exact inverse of [`mark_used`](Self::mark_used) for the same candidate.
    pub fn mark_unused(&mut self, candidate: &Candidate) {
        for &i in &candidate.slots {
            debug_assert!(self.used[i], "tile {i} released twice");
            self.used[i] = false;
            if self.owner[i] == Owner::Board {
                self.board_left += 1;
            }
        }
        self.jokers += candidate.jokers();
        self.rack_real -= self.rack_real_in(candidate);
        for value in &candidate.joker_values {
            if let Some(pos) = self.placed_jokers.iter().rposition(|v| v == value) {
                self.placed_jokers.swap_remove(pos);
            }
        }
    }
}

/// State that can take a candidate and give it back.
pub trait Backtrack {
    fn apply(&mut self, candidate: &Candidate);
    fn undo(&mut self, candidate: &Candidate);
}

impl Backtrack for Workspace {
    fn apply(&mut self, candidate: &Candidate) {
        self.mark_used(candidate);
    }

    fn undo(&mut self, candidate: &Candidate) {
        self.mark_unused(candidate);
    }
}

/// A candidate applied to some state for the lifetime of the guard.
pub struct Placement<'a, S: Backtrack> {
    state: &'a mut S,
    candidate: Candidate,
}

impl<'a, S: Backtrack> Placement<'a, S> {
    pub fn new(state: &'a mut S, candidate: Candidate) -> Self {
        state.apply(&candidate);
        Placement { state, candidate }
    }

    pub fn candidate(&self) -> &Candidate {
        &self.candidate
    }
}

impl<S: Backtrack> Deref for Placement<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.state
    }
}

impl<S: Backtrack> DerefMut for Placement<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.state
    }
}

impl<S: Backtrack> Drop for Placement<'_, S> {
    fn drop(&mut self) {
        self.state.undo(&self.candidate);
    }
}

#[derive(Debug, Clone)]
struct Chain {
    tiles: VecDeque<Tile>,
    slots: Vec<usize>,
    jokers: u8,
    next: u8,
    scan: usize,
    color: Color,
}

impl Chain {
    /// Append the next number: the first unused real tile if there is one,
    /// otherwise a joker if the budget allows.
    fn extend(&mut self, ws: &Workspace) -> bool {
        if self.next > MAX_NUMBER {
            return false;
        }
        while self.scan < ws.tiles.len() {
            let tile = ws.tiles[self.scan];
            if tile.color() != Some(self.color) {
                break;
            }
            let number = tile.number().unwrap_or(0);
            if number < self.next || (number == self.next && ws.used[self.scan]) {
                self.scan += 1;
                continue;
            }
            if number == self.next {
                self.tiles.push_back(tile);
                self.slots.push(self.scan);
                self.scan += 1;
                self.next += 1;
                return true;
            }
            break;
        }
        if self.jokers < ws.jokers {
            self.tiles.push_back(Tile::wild());
            self.jokers += 1;
            self.next += 1;
            return true;
        }
        false
    }

    fn candidate(&self) -> Candidate {
        Candidate::new(
            Meld::new(MeldType::Run, self.tiles.clone()),
            self.slots.clone(),
        )
    }
}

/// Runs through an anchor tile, shortest first.
///
/// Chains are tried with 0, 1, 2... leading jokers in front of the anchor;
/// each chain then grows one number at a time and every length from three up
/// is a separate candidate.
#[derive(Debug, Clone)]
pub struct RunCursor {
    anchor: usize,
    lead: u8,
    chain: Option<Chain>,
    done: bool,
}

impl RunCursor {
    fn new(anchor: usize) -> Self {
        RunCursor {
            anchor,
            lead: 0,
            chain: None,
            done: false,
        }
    }

    pub fn next(&mut self, ws: &Workspace, cancel: &CancelToken) -> Option<Candidate> {
        let anchor_tile = ws.tiles[self.anchor];
        let (Some(color), Some(number)) = (anchor_tile.color(), anchor_tile.number()) else {
            return None;
        };

        loop {
            if self.done || cancel.is_cancelled() {
                return None;
            }

            if self.chain.is_none() {
                if self.lead > ws.jokers || self.lead >= number {
                    self.done = true;
                    continue;
                }
                let mut tiles: VecDeque<Tile> = (0..self.lead).map(|_| Tile::wild()).collect();
                tiles.push_back(anchor_tile);
                let chain = Chain {
                    tiles,
                    slots: vec![self.anchor],
                    jokers: self.lead,
                    next: number + 1,
                    scan: self.anchor + 1,
                    color,
                };
                let ready = chain.tiles.len() >= Meld::MIN_RUN;
                let candidate = ready.then(|| chain.candidate());
                self.chain = Some(chain);
                if candidate.is_some() {
                    return candidate;
                }
                continue;
            }

            let extended = self.chain.as_mut().is_some_and(|chain| chain.extend(ws));
            if !extended {
                self.chain = None;
                self.lead += 1;
                continue;
            }
            if let Some(chain) = &self.chain {
                if chain.tiles.len() >= Meld::MIN_RUN {
                    return Some(chain.candidate());
                }
            }
        }
    }
}

/// Groups containing an anchor tile.
///
/// For every (jokers, real tiles) split totalling three or four, yields each
/// way of picking the other real tiles, padded with jokers that stand for the
/// anchor's number.
#[derive(Debug, Clone)]
pub struct GroupCursor {
    anchor: usize,
    others: Vec<usize>,
    plans: Vec<(u8, usize)>,
    plan: usize,
    combos: Option<KCombinations<usize>>,
}

impl GroupCursor {
    fn new(ws: &Workspace, anchor: usize) -> Self {
        let anchor_tile = ws.tiles[anchor];
        let mut others = Vec::new();
        if let (Some(color), Some(number)) = (anchor_tile.color(), anchor_tile.number()) {
            for other in Color::ALL.into_iter().filter(|&c| c != color) {
                let target = Tile::new(other, number);
                let start = ws.tiles.partition_point(|t| *t < target).max(anchor + 1);
                let found = (start..ws.tiles.len())
                    .take_while(|&i| ws.tiles[i] == target)
                    .find(|&i| !ws.used[i]);
                if let Some(i) = found {
                    others.push(i);
                }
            }
        }

        let mut plans = Vec::new();
        for total in 3..=Meld::MAX_GROUP {
            for jokers in 0..=ws.jokers.min(total as u8 - 1) {
                let picks = total - 1 - jokers as usize;
                if picks <= others.len() {
                    plans.push((jokers, picks));
                }
            }
        }

        GroupCursor {
            anchor,
            others,
            plans,
            plan: 0,
            combos: None,
        }
    }

    pub fn next(&mut self, ws: &Workspace, cancel: &CancelToken) -> Option<Candidate> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            let (jokers, picks) = *self.plans.get(self.plan)?;
            let combos = self
                .combos
                .get_or_insert_with(|| KCombinations::new(self.others.clone(), picks));

            let Some(pick) = combos.next() else {
                self.combos = None;
                self.plan += 1;
                continue;
            };

            let mut slots = Vec::with_capacity(pick.len() + 1);
            slots.push(self.anchor);
            slots.extend(pick);
            let mut tiles: VecDeque<Tile> = slots.iter().map(|&i| ws.tiles[i]).collect();
            tiles.extend((0..jokers).map(|_| Tile::wild()));
            return Some(Candidate::new(Meld::new(MeldType::Group, tiles), slots));
        }
    }
}

/// Lazy k-combinations of `items` in lexicographic index order.
#[derive(Debug, Clone)]
pub struct KCombinations<T> {
    items: Vec<T>,
    indices: Vec<usize>,
    first: bool,
    done: bool,
    cancel: Option<CancelToken>,
}

impl<T: Clone> KCombinations<T> {
    pub fn new(items: Vec<T>, k: usize) -> Self {
        KCombinations {
            done: k > items.len(),
            items,
            indices: (0..k).collect(),
            first: true,
            cancel: None,
        }
    }

    /// Stop yielding once `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn current(&self) -> Vec<T> {
        self.indices.iter().map(|&i| self.items[i].clone()).collect()
    }
}

impl<T: Clone> Iterator for KCombinations<T> {
    type Item = Vec<T>;

    fn next(&mut self) -> Option<Vec<T>> {
        if self.done {
            return None;
        }
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            self.done = true;
            return None;
        }
        if self.first {
            self.first = false;
            return Some(self.current());
        }

        // Find the rightmost index that can still move right
        let n = self.items.len();
        let k = self.indices.len();
        let mut i = k;
        loop {
            if i == 0 {
                self.done = true;
                return None;
            }
            i -= 1;
            if self.indices[i] < n - k + i {
                break;
            }
        }
        self.indices[i] += 1;
        for j in (i + 1)..k {
            self.indices[j] = self.indices[j - 1] + 1;
        }
        Some(self.current())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ws(s: &str) -> Workspace {
        Workspace::from_tiles(s.split_whitespace().map(|t| t.parse().unwrap()).collect())
    }

    fn runs(ws: &Workspace, anchor: usize) -> Vec<String> {
        let cancel = CancelToken::new();
        let mut cursor = ws.candidate_runs(anchor);
        let mut out = Vec::new();
        while let Some(c) = cursor.next(ws, &cancel) {
            out.push(c.meld.to_string());
        }
        out
    }

    fn groups(ws: &Workspace, anchor: usize) -> Vec<Candidate> {
        let cancel = CancelToken::new();
        let mut cursor = ws.candidate_groups(anchor);
        let mut out = Vec::new();
        while let Some(c) = cursor.next(ws, &cancel) {
            out.push(c);
        }
        out
    }

    #[test]
    fn test_from_tiles_strips_jokers() {
        let ws = ws("w r3 b1 w r1");
        assert_eq!(ws.len(), 3);
        assert_eq!(ws.jokers(), 2);
        assert!(ws.tiles().iter().all(|t| !t.is_wild()));
        assert!(ws.tiles().windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_runs_shortest_first() {
        let ws = ws("r1 r2 r3 r4 r5");
        assert_eq!(
            runs(&ws, 0),
            vec!["run[r1 r2 r3]", "run[r1 r2 r3 r4]", "run[r1 r2 r3 r4 r5]"]
        );
    }

    #[test]
    fn test_runs_stop_at_gap_and_color_change() {
        let ws = ws("r1 r2 r4 b3");
        assert!(runs(&ws, 0).is_empty());
    }

    #[test]
    fn test_runs_skip_duplicates_and_used() {
        let mut ws = ws("r1 r2 r2 r3");
        assert_eq!(runs(&ws, 0), vec!["run[r1 r2 r3]"]);
        ws.used[1] = true;
        assert_eq!(runs(&ws, 0), vec!["run[r1 r2 r3]"]);
    }

    #[test]
    fn test_joker_bridges_gap() {
        let ws = ws("r3 r5 r6 w");
        let found = runs(&ws, 0);
        assert!(found.contains(&"run[r3 w r5]".to_string()));
        assert!(found.contains(&"run[r3 w r5 r6]".to_string()));
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_leading_jokers_before_anchor() {
        let ws = ws("r12 r13 w");
        assert_eq!(runs(&ws, 0), vec!["run[w r12 r13]"]);
    }

    #[test]
    fn test_run_never_passes_thirteen() {
        let ws = ws("r12 r13 w w");
        let found = runs(&ws, 0);
        assert!(found.iter().all(|m| !m.ends_with("r13 w]")));
        assert!(found.contains(&"run[w w r12 r13]".to_string()));
    }

    #[test]
    fn test_groups_without_jokers() {
        let ws = ws("r5 b5 y5 k5");
        let found = groups(&ws, 0);
        // three 3-subsets containing the anchor plus the full set
        assert_eq!(found.len(), 4);
        assert!(found.iter().all(|c| c.slots[0] == 0 && c.meld.is_valid()));
        assert_eq!(found.iter().filter(|c| c.meld.len() == 4).count(), 1);
    }

    #[test]
    fn test_groups_with_joker_pad_anchor_number() {
        let ws = ws("k13 r13 b13 w");
        let found = groups(&ws, 0);
        let full = found
            .iter()
            .find(|c| c.meld.len() == 4 && c.jokers() == 1)
            .expect("3 real + joker group");
        assert_eq!(full.meld.score(), 52);
        assert!(found.iter().all(|c| c.meld.is_valid()));
        // a pair alone is never offered
        assert!(found.iter().all(|c| c.meld.len() >= 3));
    }

    #[test]
    fn test_groups_skip_duplicate_colors() {
        let ws = ws("r7 r7 b7");
        assert!(groups(&ws, 0).is_empty());
    }

    #[test]
    fn test_placement_restores_on_drop() {
        let mut ws = ws("r1 r2 w");
        let cancel = CancelToken::new();
        let candidate = ws.candidate_runs(0).next(&ws, &cancel).unwrap();
        let mask_before = ws.used_mask().to_vec();
        let jokers_before = ws.jokers();
        {
            let placed = Placement::new(&mut ws, candidate);
            assert!(placed.is_used(0) && placed.is_used(1));
            assert_eq!(placed.jokers(), 0);
        }
        assert_eq!(ws.used_mask(), mask_before.as_slice());
        assert_eq!(ws.jokers(), jokers_before);
    }

    #[test]
    fn test_board_jokers_spent_first() {
        let board = [Tile::new(Color::Red, 1), Tile::new(Color::Red, 2)];
        let rack = [Tile::new(Color::Red, 4)];
        let mut ws = Workspace::merged(&board, 1, &rack, 1);
        assert_eq!(ws.rack_jokers(), 1);
        assert!(!ws.board_settled());

        let cancel = CancelToken::new();
        let mut cursor = ws.candidate_runs(0);
        let mut candidate = None;
        while let Some(c) = cursor.next(&ws, &cancel) {
            if c.meld.to_string() == "run[r1 r2 w r4 w]" {
                candidate = Some(c);
            }
        }
        let candidate = candidate.unwrap();
        // r4 plus the higher joker (value 5) belong to the rack
        ws.mark_used(&candidate);
        assert_eq!(ws.rack_score(), 9);
        assert!(ws.board_settled());
        ws.mark_unused(&candidate);
        assert_eq!(ws.rack_score(), 0);
        assert!(!ws.board_settled());
    }

    fn find(cursor_melds: Vec<Candidate>, notation: &str) -> Candidate {
        cursor_melds
            .into_iter()
            .find(|c| c.meld.to_string() == notation)
            .unwrap()
    }

    #[test]
    fn test_rack_joker_credit_ignores_placement_order() {
        let board = [Tile::new(Color::Red, 1), Tile::new(Color::Red, 2)];
        let rack = [
            Tile::new(Color::Blue, 13),
            Tile::new(Color::Yellow, 13),
            Tile::new(Color::Black, 13),
        ];
        let mut ws = Workspace::merged(&board, 1, &rack, 1);
        let cancel = CancelToken::new();

        let mut groups = Vec::new();
        let mut cursor = ws.candidate_groups(2);
        while let Some(c) = cursor.next(&ws, &cancel) {
            groups.push(c);
        }
        let group = find(groups, "group[b13 y13 k13 w]");
        ws.mark_used(&group);
        // the only joker placed so far covers the board's joker
        assert_eq!(ws.rack_score(), 39);

        let mut runs = Vec::new();
        let mut cursor = ws.candidate_runs(0);
        while let Some(c) = cursor.next(&ws, &cancel) {
            runs.push(c);
        }
        let run = find(runs, "run[r1 r2 w]");
        ws.mark_used(&run);
        // the rack owns one of the two jokers and is credited the 13
        assert_eq!(ws.rack_score(), 52);

        ws.mark_unused(&run);
        assert_eq!(ws.rack_score(), 39);
        ws.mark_unused(&group);
        assert_eq!(ws.rack_score(), 0);
    }

    #[test]
    fn test_k_combinations() {
        let all: Vec<Vec<u8>> = KCombinations::new(vec![1, 2, 3, 4], 2).collect();
        assert_eq!(all.len(), 6);
        assert_eq!(all[0], vec![1, 2]);
        assert_eq!(all[5], vec![3, 4]);

        assert_eq!(KCombinations::new(vec![1, 2], 0).count(), 1);
        assert_eq!(KCombinations::new(vec![1, 2], 3).count(), 0);
    }

    #[test]
    fn test_k_combinations_cancel() {
        let cancel = CancelToken::new();
        let mut combos = KCombinations::new((0..10).collect::<Vec<u8>>(), 3).with_cancel(cancel.clone());
        assert!(combos.next().is_some());
        cancel.cancel();
        assert!(combos.next().is_none());
    }
}
