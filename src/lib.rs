//! Rummikub meld search with parallel racing.
//!
//! The crate answers one question per turn: which tiles from a rack can be laid
//! down, alone or merged into the board, so that everything on the table still
//! splits into valid runs and groups. The pieces, leaves first:
//!
//! - [`Tile`], [`Meld`], [`Rack`], [`Board`]: the tile model and its string notation
//! - [`engine`]: the sorted working array, candidate run/group generation and the
//!   scoped mark/unmark guard that keeps backtracking exact
//! - [`policy`]: one depth-first search parameterised by [`SearchPolicy`]
//!   (exact cover, first-play threshold, first-play maximum score)
//! - [`race`]: a bounded pool that runs ordered branches and keeps the lowest
//!   index that succeeds
//! - [`subset`]: races exact-cover checks over rack subsets
//! - [`strategy`]: races whole solvers against each other, optionally under a deadline

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;

/// Search diagnostics, compiled in only with the `debug_search` feature.
#[macro_export]
macro_rules! search_log {
    ($($arg:tt)*) => {{
        #[cfg(all(feature = "debug_search", not(target_arch = "wasm32")))]
        {
            eprintln!("[search] {}", format!($($arg)*));
        }
        #[cfg(all(feature = "debug_search", target_arch = "wasm32"))]
        {
            web_sys::console::log_1(&format!("[search] {}", format!($($arg)*)).into());
        }
        #[cfg(not(feature = "debug_search"))]
        {
            if false {
                let _ = format!($($arg)*);
            }
        }
    }};
}

pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod policy;
pub mod race;
pub mod strategy;
pub mod subset;
#[cfg(target_arch = "wasm32")]
pub mod wasm_api;

pub use cancel::CancelToken;
pub use config::SolverConfig;
pub use error::{Error, Result};
pub use policy::{FirstPlay, Search, SearchPolicy, Solution, validate_play};
pub use strategy::{MaxScoreEngine, MeldEngine, PlayResult, PlaySolver, RaceOutcome, StrategyRacer};
pub use subset::SubsetRacer;

/// Lowest tile number.
pub const MIN_NUMBER: u8 = 1;
/// Highest tile number.
pub const MAX_NUMBER: u8 = 13;

/// The four tile colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Color {
    Red,
    Blue,
    Yellow,
    Black,
}

impl Color {
    pub const ALL: [Color; 4] = [Color::Red, Color::Blue, Color::Yellow, Color::Black];

    fn index(self) -> u8 {
        self as u8
    }

    fn from_index(index: u8) -> Self {
        Self::ALL[(index & 0b11) as usize]
    }

    /// Single-letter notation: r, b, y, k
    pub fn letter(self) -> char {
        match self {
            Color::Red => 'r',
            Color::Blue => 'b',
            Color::Yellow => 'y',
            Color::Black => 'k',
        }
    }

    pub fn from_letter(s: &str) -> Option<Self> {
        match s {
            "r" => Some(Color::Red),
            "b" => Some(Color::Blue),
            "y" => Some(Color::Yellow),
            "k" => Some(Color::Black),
            _ => None,
        }
    }
}

/// A tile represented as a u8.
/// - Bits 4-5: Color
/// - Bits 0-3: Number (1-13)
/// - All 1s (0xFF): Joker
///
/// The layout makes the derived ordering sort by color, then number, with
/// jokers last. The search engine relies on that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tile(u8);

impl Tile {
    const NUMBER_MASK: u8 = 0b0000_1111;
    const COLOR_SHIFT: u8 = 4;
    const WILD: u8 = 0xFF;

    /// Create a new tile from a color and number (1-13)
    pub fn new(color: Color, number: u8) -> Self {
        assert!(
            (MIN_NUMBER..=MAX_NUMBER).contains(&number),
            "Number must be 1-13"
        );
        Tile((color.index() << Self::COLOR_SHIFT) | number)
    }

    /// Create a joker tile
    pub fn wild() -> Self {
        Tile(Self::WILD)
    }

    pub fn color(&self) -> Option<Color> {
        if self.is_wild() {
            None
        } else {
            Some(Color::from_index(self.0 >> Self::COLOR_SHIFT))
        }
    }

    pub fn number(&self) -> Option<u8> {
        if self.is_wild() {
            None
        } else {
            Some(self.0 & Self::NUMBER_MASK)
        }
    }

    /// Face value; 0 for a joker, whose value depends on the meld it sits in.
    pub fn value(&self) -> u32 {
        self.number().map_or(0, u32::from)
    }

    pub fn is_wild(&self) -> bool {
        self.0 == Self::WILD
    }

    /// Parse a tile from a string representation
    /// Format: "r13" (red 13), "b1" (blue 1), "y7" (yellow 7), "k9" (black 9), "w" (joker)
    pub fn from_string(s: &str) -> Result<Self> {
        if s == "w" {
            return Ok(Tile::wild());
        }
        if s.len() < 2 || !s.is_char_boundary(1) {
            return Err(Error::InvalidTile(s.to_string()));
        }

        let color = Color::from_letter(&s[0..1])
            .ok_or_else(|| Error::InvalidTile(format!("unknown color in '{s}'")))?;
        let number: u8 = s[1..]
            .parse()
            .map_err(|_| Error::InvalidTile(format!("bad number in '{s}'")))?;
        if !(MIN_NUMBER..=MAX_NUMBER).contains(&number) {
            return Err(Error::InvalidTile(format!("number must be 1-13, got {number}")));
        }

        Ok(Tile::new(color, number))
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.color(), self.number()) {
            (Some(color), Some(number)) => write!(f, "{}{}", color.letter(), number),
            _ => write!(f, "w"),
        }
    }
}

impl FromStr for Tile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Tile::from_string(s)
    }
}

impl Serialize for Tile {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Tile {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Tile::from_string(&s).map_err(serde::de::Error::custom)
    }
}

/// Type of meld
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeldType {
    /// Same number, pairwise distinct colors
    Group,
    /// Consecutive numbers, same color
    Run,
}

/// A run or group. Jokers sit in the slot whose value they stand for, so a
/// run's tiles are always in ascending value order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meld {
    #[serde(rename = "type")]
    pub meld_type: MeldType,
    pub tiles: VecDeque<Tile>,
}

impl Meld {
    pub const MIN_RUN: usize = 3;
    pub const MIN_GROUP: usize = 2;
    pub const MAX_GROUP: usize = 4;

    pub fn new(meld_type: MeldType, tiles: VecDeque<Tile>) -> Self {
        Meld { meld_type, tiles }
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn jokers(&self) -> usize {
        self.tiles.iter().filter(|t| t.is_wild()).count()
    }

    /// Number a run starts at, derived from its first real tile.
    fn run_start(&self) -> Option<i32> {
        self.tiles
            .iter()
            .enumerate()
            .find_map(|(i, t)| t.number().map(|n| i32::from(n) - i as i32))
    }

    fn group_number(&self) -> Option<u8> {
        self.tiles.iter().find_map(Tile::number)
    }

    /// Value each slot contributes, jokers included.
    pub fn slot_values(&self) -> Vec<u32> {
        match self.meld_type {
            MeldType::Run => {
                let start = self.run_start().unwrap_or(0);
                (0..self.tiles.len())
                    .map(|i| (start + i as i32).max(0) as u32)
                    .collect()
            }
            MeldType::Group => {
                let number = u32::from(self.group_number().unwrap_or(0));
                vec![number; self.tiles.len()]
            }
        }
    }

    /// Sum of tile values; a joker scores as the tile it substitutes.
    pub fn score(&self) -> u32 {
        self.slot_values().iter().sum()
    }

    /// Check the run/group predicate with joker substitution.
    pub fn is_valid(&self) -> bool {
        match self.meld_type {
            MeldType::Run => {
                if self.tiles.len() < Self::MIN_RUN {
                    return false;
                }
                let Some(start) = self.run_start() else {
                    return false;
                };
                let end = start + self.tiles.len() as i32 - 1;
                if start < i32::from(MIN_NUMBER) || end > i32::from(MAX_NUMBER) {
                    return false;
                }
                let color = self.tiles.iter().find_map(Tile::color);
                self.tiles.iter().enumerate().all(|(i, t)| {
                    t.is_wild()
                        || (t.color() == color && t.number().map(i32::from) == Some(start + i as i32))
                })
            }
            MeldType::Group => {
                if !(Self::MIN_GROUP..=Self::MAX_GROUP).contains(&self.tiles.len()) {
                    return false;
                }
                let Some(number) = self.group_number() else {
                    return false;
                };
                let mut seen = [false; 4];
                for tile in self.tiles.iter().filter(|t| !t.is_wild()) {
                    let (Some(color), Some(n)) = (tile.color(), tile.number()) else {
                        return false;
                    };
                    if n != number || seen[color.index() as usize] {
                        return false;
                    }
                    seen[color.index() as usize] = true;
                }
                true
            }
        }
    }

    /// Parse a meld from a string, auto-detecting type
    /// Formats:
    /// - Group: "5 r b k" (number followed by color letters)
    /// - Run: "y 6 7 8" (color letter followed by numbers)
    pub fn from_string(input: &str) -> Result<Self> {
        let tokens: Vec<&str> = input.split_whitespace().collect();
        let Some(first) = tokens.first() else {
            return Err(Error::InvalidMeld("empty meld string".to_string()));
        };

        let meld = if first.parse::<u8>().is_ok() {
            Self::parse_group(&tokens)?
        } else if Color::from_letter(first).is_some() {
            Self::parse_run(&tokens)?
        } else {
            return Err(Error::InvalidMeld(format!(
                "'{input}': use 'N c1 c2 c3' for a group or 'C n1 n2 n3' for a run"
            )));
        };

        if !meld.is_valid() {
            return Err(Error::InvalidMeld(format!("'{input}' is not a legal meld")));
        }
        Ok(meld)
    }

    fn parse_group(tokens: &[&str]) -> Result<Self> {
        let number: u8 = tokens[0]
            .parse()
            .map_err(|_| Error::InvalidMeld(format!("bad number: {}", tokens[0])))?;
        if !(MIN_NUMBER..=MAX_NUMBER).contains(&number) {
            return Err(Error::InvalidMeld(format!("number must be 1-13, got {number}")));
        }

        let mut tiles = VecDeque::new();
        for token in &tokens[1..] {
            if *token == "w" {
                tiles.push_back(Tile::wild());
                continue;
            }
            let color = Color::from_letter(token)
                .ok_or_else(|| Error::InvalidMeld(format!("bad color: {token}")))?;
            tiles.push_back(Tile::new(color, number));
        }
        Ok(Meld::new(MeldType::Group, tiles))
    }

    fn parse_run(tokens: &[&str]) -> Result<Self> {
        let color = Color::from_letter(tokens[0])
            .ok_or_else(|| Error::InvalidMeld(format!("bad color: {}", tokens[0])))?;

        let mut tiles = VecDeque::new();
        for token in &tokens[1..] {
            if *token == "w" {
                tiles.push_back(Tile::wild());
                continue;
            }
            let number: u8 = token
                .parse()
                .map_err(|_| Error::InvalidMeld(format!("bad number: {token}")))?;
            if !(MIN_NUMBER..=MAX_NUMBER).contains(&number) {
                return Err(Error::InvalidMeld(format!("number must be 1-13, got {number}")));
            }
            tiles.push_back(Tile::new(color, number));
        }
        Ok(Meld::new(MeldType::Run, tiles))
    }
}

impl fmt::Display for Meld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.meld_type {
            MeldType::Group => "group",
            MeldType::Run => "run",
        };
        write!(f, "{kind}[")?;
        for (i, tile) in self.tiles.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{tile}")?;
        }
        write!(f, "]")
    }
}

/// A player's tiles: a multiset of real tiles plus a joker count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rack {
    tiles: BTreeMap<Tile, u8>,
    jokers: u8,
}

impl Rack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tiles<I: IntoIterator<Item = Tile>>(tiles: I) -> Result<Self> {
        let mut rack = Rack::new();
        for tile in tiles {
            rack.add(tile)?;
        }
        Ok(rack)
    }

    /// Parse a whitespace separated tile list, e.g. "r4 r5 r6 w".
    pub fn from_notation(s: &str) -> Result<Self> {
        let tiles = s
            .split_whitespace()
            .map(Tile::from_string)
            .collect::<Result<Vec<_>>>()?;
        Rack::from_tiles(tiles)
    }

    /// Fails once a tile (or the joker) would pass 255 copies.
    pub fn add(&mut self, tile: Tile) -> Result<()> {
        let count = if tile.is_wild() {
            &mut self.jokers
        } else {
            self.tiles.entry(tile).or_insert(0)
        };
        *count = count
            .checked_add(1)
            .ok_or_else(|| Error::InvalidTile(format!("too many copies of {tile}")))?;
        Ok(())
    }

    pub fn remove(&mut self, tile: &Tile) -> bool {
        if tile.is_wild() {
            if self.jokers == 0 {
                return false;
            }
            self.jokers -= 1;
            return true;
        }
        if let Some(count) = self.tiles.get_mut(tile) {
            *count -= 1;
            if *count == 0 {
                self.tiles.remove(tile);
            }
            return true;
        }
        false
    }

    pub fn count(&self, tile: &Tile) -> u8 {
        if tile.is_wild() {
            return self.jokers;
        }
        self.tiles.get(tile).copied().unwrap_or(0)
    }

    pub fn jokers(&self) -> u8 {
        self.jokers
    }

    /// Real tiles with multiplicity, sorted.
    pub fn tiles(&self) -> Vec<Tile> {
        self.tiles
            .iter()
            .flat_map(|(&tile, &count)| std::iter::repeat_n(tile, count as usize))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Tile, &u8)> {
        self.tiles.iter()
    }

    /// Tile count including jokers.
    pub fn len(&self) -> usize {
        self.tiles.values().map(|&c| c as usize).sum::<usize>() + self.jokers as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Face value of the real tiles.
    pub fn total_value(&self) -> u32 {
        self.tiles
            .iter()
            .map(|(tile, &count)| tile.value() * u32::from(count))
            .sum()
    }
}

/// The melds currently on the table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board(Vec<Meld>);

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `;`-separated meld notation, e.g. "r 1 2 3; 5 r b k".
    pub fn from_notation(s: &str) -> Result<Self> {
        let melds = s
            .split(';')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(Meld::from_string)
            .collect::<Result<Vec<_>>>()?;
        Ok(Board(melds))
    }

    pub fn add_meld(&mut self, meld: Meld) {
        self.0.push(meld);
    }

    pub fn melds(&self) -> &[Meld] {
        &self.0
    }

    /// Real tiles across all melds, sorted.
    pub fn tiles(&self) -> Vec<Tile> {
        let mut tiles: Vec<Tile> = self
            .0
            .iter()
            .flat_map(|m| m.tiles.iter().copied())
            .filter(|t| !t.is_wild())
            .collect();
        tiles.sort_unstable();
        tiles
    }

    pub fn jokers(&self) -> u8 {
        let jokers: usize = self.0.iter().map(Meld::jokers).sum();
        u8::try_from(jokers).unwrap_or(u8::MAX)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Meld>> for Board {
    fn from(melds: Vec<Meld>) -> Self {
        Board(melds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_from_string() {
        assert_eq!(Tile::from_string("r13").unwrap(), Tile::new(Color::Red, 13));
        assert_eq!(Tile::from_string("b1").unwrap(), Tile::new(Color::Blue, 1));
        assert_eq!(Tile::from_string("y7").unwrap(), Tile::new(Color::Yellow, 7));
        assert_eq!(Tile::from_string("k9").unwrap(), Tile::new(Color::Black, 9));
        assert_eq!(Tile::from_string("w").unwrap(), Tile::wild());

        assert!(Tile::from_string("x5").is_err());
        assert!(Tile::from_string("r14").is_err());
        assert!(Tile::from_string("r0").is_err());
        assert!(Tile::from_string("").is_err());
        assert!(Tile::from_string("r").is_err());
    }

    #[test]
    fn test_tile_display() {
        assert_eq!(Tile::new(Color::Red, 13).to_string(), "r13");
        assert_eq!(Tile::new(Color::Black, 9).to_string(), "k9");
        assert_eq!(Tile::wild().to_string(), "w");
    }

    #[test]
    fn test_tile_order_color_then_number_jokers_last() {
        let mut tiles = vec![
            Tile::wild(),
            Tile::new(Color::Blue, 1),
            Tile::new(Color::Red, 13),
            Tile::new(Color::Red, 2),
        ];
        tiles.sort();
        assert_eq!(
            tiles,
            vec![
                Tile::new(Color::Red, 2),
                Tile::new(Color::Red, 13),
                Tile::new(Color::Blue, 1),
                Tile::wild(),
            ]
        );
    }

    #[test]
    fn test_tile_serde_uses_notation() {
        let json = serde_json::to_string(&vec![Tile::new(Color::Yellow, 7), Tile::wild()]).unwrap();
        assert_eq!(json, r#"["y7","w"]"#);
        let back: Vec<Tile> = serde_json::from_str(&json).unwrap();
        assert_eq!(back[0], Tile::new(Color::Yellow, 7));
        assert!(serde_json::from_str::<Tile>(r#""q3""#).is_err());
    }

    #[test]
    fn test_meld_parsing() {
        let group = Meld::from_string("5 r b k").unwrap();
        assert_eq!(group.meld_type, MeldType::Group);
        assert_eq!(group.score(), 15);

        let run = Meld::from_string("y 6 w 8").unwrap();
        assert_eq!(run.meld_type, MeldType::Run);
        assert_eq!(run.jokers(), 1);
        assert_eq!(run.score(), 21);

        assert!(Meld::from_string("r 1 2 4").is_err());
        assert!(Meld::from_string("5 r r b").is_err());
        assert!(Meld::from_string("q 1 2 3").is_err());
        assert!(Meld::from_string("").is_err());
    }

    #[test]
    fn test_run_validity() {
        let run = |s: &str| Meld::new(MeldType::Run, s.split(' ').map(|t| t.parse().unwrap()).collect());
        assert!(run("r1 r2 r3").is_valid());
        assert!(run("w r2 r3").is_valid());
        assert!(run("r11 r12 w").is_valid());
        assert!(!run("r12 r13 w").is_valid());
        assert!(!run("r1 r2").is_valid());
        assert!(!run("r1 b2 r3").is_valid());
        assert!(!run("w w w").is_valid());
    }

    #[test]
    fn test_group_scores_joker_as_number() {
        let group = Meld::from_string("13 r b y w").unwrap();
        assert!(group.is_valid());
        assert_eq!(group.score(), 52);
    }

    #[test]
    fn test_rack_tracks_jokers_separately() {
        let mut rack = Rack::from_notation("r4 r4 b9 w w").unwrap();
        assert_eq!(rack.jokers(), 2);
        assert_eq!(rack.count(&Tile::new(Color::Red, 4)), 2);
        assert_eq!(rack.len(), 5);
        assert_eq!(rack.total_value(), 17);
        assert_eq!(rack.tiles().len(), 3);

        assert!(rack.remove(&Tile::wild()));
        assert!(rack.remove(&Tile::new(Color::Blue, 9)));
        assert!(!rack.remove(&Tile::new(Color::Blue, 9)));
        assert_eq!(rack.len(), 3);
    }

    #[test]
    fn test_rack_rejects_too_many_copies() {
        let r4 = Tile::new(Color::Red, 4);
        let rack = Rack::from_tiles(std::iter::repeat_n(r4, 255)).unwrap();
        assert_eq!(rack.count(&r4), 255);

        assert!(matches!(
            Rack::from_tiles(std::iter::repeat_n(r4, 256)),
            Err(Error::InvalidTile(_))
        ));
        let mut jokers = Rack::from_tiles(std::iter::repeat_n(Tile::wild(), 255)).unwrap();
        assert!(matches!(jokers.add(Tile::wild()), Err(Error::InvalidTile(_))));
        assert_eq!(jokers.jokers(), 255);
    }

    #[test]
    fn test_board_notation() {
        let board = Board::from_notation("r 1 2 3 4; 5 r b w").unwrap();
        assert_eq!(board.len(), 2);
        assert_eq!(board.jokers(), 1);
        assert_eq!(board.tiles().len(), 6);
        assert!(Board::from_notation("r 1 2").is_err());
    }
}
