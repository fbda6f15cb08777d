// Payload types for match-insight sessions.
//
// The upstream generative process is asked for a single JSON object keyed by
// player name plus optional team and venue sections. These types are the
// final, trusted form of that object: constructed once by the repair
// pipeline (or the fallback generator) and never mutated afterwards.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Request parameters
// ---------------------------------------------------------------------------

/// Parameters for one insight-generation session, as received from the
/// client. Field names follow the wire convention of the frontend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightRequest {
    /// Players to analyze. Absent for team-only sports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_players: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team2: Option<String>,
    /// Venue name. Only meaningful for cricket.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
}

// ---------------------------------------------------------------------------
// Payload shape
// ---------------------------------------------------------------------------

/// Insights for a single player or team: three parallel lists of prose.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightSet {
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
}

/// Venue analysis. Present only for sports where the ground matters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VenueInsights {
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub characteristics: Vec<String>,
}

/// The complete payload delivered in the Final event of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightPayload {
    /// Per-player insights keyed by player name. May be empty.
    #[serde(default)]
    pub players: BTreeMap<String, InsightSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team1: Option<InsightSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team2: Option<InsightSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<VenueInsights>,
}

impl InsightPayload {
    /// The canonical all-empty payload substituted whenever repair or
    /// validation cannot produce a trustworthy result. Always passes
    /// [`is_valid_shape`].
    pub fn fallback() -> Self {
        Self {
            players: BTreeMap::new(),
            team1: Some(InsightSet::default()),
            team2: Some(InsightSet::default()),
            venue: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Structural validation
// ---------------------------------------------------------------------------

/// Check that a parsed value has the minimal shape of an insight payload.
///
/// Requires a top-level `players` object (which may be empty). `team1` and
/// `team2`, if present, must be objects, and their `insights`/`strengths`/
/// `weaknesses` keys, if present, must be lists. Missing optional keys are
/// valid; defaults are filled later by typed deserialization. Pure function,
/// never mutates its input.
pub fn is_valid_shape(value: &Value) -> bool {
    let Some(root) = value.as_object() else {
        return false;
    };
    match root.get("players") {
        Some(players) if players.is_object() => {}
        _ => return false,
    }
    for team_key in ["team1", "team2"] {
        if let Some(team) = root.get(team_key) {
            let Some(team) = team.as_object() else {
                return false;
            };
            for field in ["insights", "strengths", "weaknesses"] {
                if let Some(entry) = team.get(field) {
                    if !entry.is_array() {
                        return false;
                    }
                }
            }
        }
    }
    true
}
