use crate::{
    Board, CancelToken, Error, PlayResult, RaceOutcome, Rack, Result, Solution, SolverConfig,
    StrategyRacer, Tile,
};
use serde::Serialize;
use wasm_bindgen::prelude::*;

/// Initialize panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

/// Reply to `solve_turn`
#[derive(Serialize)]
pub struct TurnResponse {
    pub success: bool,
    /// The deadline passed before either engine reached a verdict
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<PlayResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reply to `validate_play`
#[derive(Serialize)]
pub struct ValidateResponse {
    pub success: bool,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution: Option<Solution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|e| format!(r#"{{"success":false,"error":"Serialization error: {}"}}"#, e))
}

/// Solve one turn
///
/// # Arguments
/// * `board_json` - JSON array of melds (e.g., [{"type": "run", "tiles": ["r1", "r2", "r3"]}])
/// * `rack_json` - JSON array of tile strings (e.g., ["r1", "b5", "w"])
/// * `has_played` - Whether the player has already made a first play
/// * `config_json` - Solver config object, or an empty string for defaults
///
/// # Returns
/// JSON string with TurnResponse
#[wasm_bindgen]
pub fn solve_turn(board_json: &str, rack_json: &str, has_played: bool, config_json: &str) -> String {
    let response = solve_turn_internal(board_json, rack_json, has_played, config_json)
        .unwrap_or_else(|e| TurnResponse {
            success: false,
            timed_out: false,
            result: None,
            error: Some(e.to_string()),
        });
    to_json(&response)
}

fn solve_turn_internal(
    board_json: &str,
    rack_json: &str,
    has_played: bool,
    config_json: &str,
) -> Result<TurnResponse> {
    let board: Board = serde_json::from_str(board_json)?;
    let rack = Rack::from_tiles(serde_json::from_str::<Vec<Tile>>(rack_json)?)?;
    let mut config = if config_json.trim().is_empty() {
        SolverConfig::default()
    } else {
        SolverConfig::from_json(config_json)?
    };
    // No threads in the browser
    config.workers = Some(1);

    let racer = StrategyRacer::from_config(&config)?;
    let response = match racer.run(&board, &rack, has_played, &CancelToken::new()) {
        RaceOutcome::Completed(result) => TurnResponse {
            success: true,
            timed_out: false,
            result: Some(result),
            error: None,
        },
        RaceOutcome::TimedOut => TurnResponse {
            success: true,
            timed_out: true,
            result: None,
            error: None,
        },
        RaceOutcome::Cancelled => TurnResponse {
            success: false,
            timed_out: false,
            result: None,
            error: Some("search cancelled".to_string()),
        },
    };
    Ok(response)
}

/// Check that the board plus the given tiles can be re-tiled exactly
///
/// # Arguments
/// * `board_json` - JSON array of melds
/// * `tiles_json` - JSON array of tile strings the player wants to lay down
#[wasm_bindgen]
pub fn validate_play(board_json: &str, tiles_json: &str) -> String {
    let response = validate_internal(board_json, tiles_json).unwrap_or_else(|e| ValidateResponse {
        success: false,
        valid: false,
        solution: None,
        error: Some(e.to_string()),
    });
    to_json(&response)
}

fn validate_internal(board_json: &str, tiles_json: &str) -> Result<ValidateResponse> {
    let board: Board = serde_json::from_str(board_json)?;
    let tiles: Vec<Tile> = serde_json::from_str(tiles_json)?;
    let jokers = u8::try_from(tiles.iter().filter(|t| t.is_wild()).count())
        .map_err(|_| Error::InvalidTile("too many jokers".to_string()))?;
    let real: Vec<Tile> = tiles.into_iter().filter(|t| !t.is_wild()).collect();

    let solution = crate::validate_play(&board, &real, jokers, CancelToken::new());
    Ok(ValidateResponse {
        success: true,
        valid: solution.is_some(),
        solution,
        error: None,
    })
}

/// Get the git commit hash that this WASM module was built from
///
/// Returns the first 8 characters of the commit hash, or "unknown" if not available
#[wasm_bindgen]
pub fn get_build_commit() -> String {
    env!("BUILD_COMMIT").to_string()
}
