//! Persisted simulation state.
//!
//! One JSON document captures, per agent, its kind tag, action-value table
//! and position, plus the run-level episode counter and the full per-episode
//! results history. Loading validates the whole document before touching the
//! simulation; a bad document never leaves a partially restored roster.

use std::{collections::HashMap, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    agent::{Agent, AgentKind},
    game::{EpisodeResult, Simulation},
    learner::ACTION_COUNT,
    position::Position,
};

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Failed to read or write state file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed state document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Saved {kind:?} position ({x}, {y}) is outside the world")]
    PositionOutOfBounds { kind: AgentKind, x: i32, y: i32 },
    #[error("Saved position ({x}, {y}) is used twice or sits on an obstacle")]
    PositionConflict { x: i32, y: i32 },
}

/// Persisted form of one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedAgent {
    pub agent_kind: AgentKind,
    pub state_table: HashMap<String, [f64; ACTION_COUNT]>,
    pub position: Position,
}

/// Persisted form of a whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedState {
    pub agents: Vec<SavedAgent>,
    pub episodes_played: u64,
    pub results: Vec<EpisodeResult>,
}

impl SavedState {
    /// Snapshot of the simulation's roster, tables and result history.
    pub fn capture(sim: &Simulation) -> Self {
        SavedState {
            agents: sim
                .world()
                .agents
                .iter()
                .map(|agent| SavedAgent {
                    agent_kind: agent.kind,
                    state_table: agent.learner.table().clone(),
                    position: agent.position,
                })
                .collect(),
            episodes_played: sim.episodes_played(),
            results: sim.results().to_vec(),
        }
    }

    pub fn to_json(&self) -> Result<String, StateError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(document: &str) -> Result<Self, StateError> {
        Ok(serde_json::from_str(document)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), StateError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, StateError> {
        SavedState::from_json(&fs::read_to_string(path)?)
    }
}

impl Simulation {
    /// Replaces the roster, tables, episode counter and result history with
    /// a previously captured state.
    ///
    /// Agents are rebuilt through the [`AgentKind`] factory; the stored tag
    /// is never a free-form type name. Validation happens up front: on any
    /// error the simulation is left exactly as it was.
    pub fn restore(&mut self, state: SavedState) -> Result<(), StateError> {
        let mut seen = std::collections::HashSet::new();
        for saved in &state.agents {
            let position = saved.position;
            if !self.world.in_bounds(position) {
                return Err(StateError::PositionOutOfBounds {
                    kind: saved.agent_kind,
                    x: position.x,
                    y: position.y,
                });
            }
            if !seen.insert(position) || self.world.obstacles().contains(&position) {
                return Err(StateError::PositionConflict {
                    x: position.x,
                    y: position.y,
                });
            }
        }

        self.world.agents = state
            .agents
            .into_iter()
            .map(|saved| {
                let mut agent = Agent::new(saved.agent_kind, saved.position);
                agent.learner.set_table(saved.state_table);
                agent
            })
            .collect();
        self.episodes_played = state.episodes_played;
        self.results = state.results;
        self.set_halted(false);
        Ok(())
    }
}
