//! Grid-world pursuit simulation with tabular reinforcement learning.
//!
//! Hunters chase victims on a bounded grid. Each hunter owns a state-action
//! table and learns a movement policy through an epsilon-greedy temporal
//! difference update; victims wander randomly or hold still. The
//! [`game::Simulation`] runner drives agents strictly one at a time and
//! restarts the world whenever a hunter catches its prey.

pub mod agent;
pub mod environment;
pub mod game;
pub mod learner;
pub mod position;
pub mod state;

pub use agent::{Agent, AgentKind};
pub use environment::{GridWorld, WorldError};
pub use game::{EpisodeResult, EpisodeStats, RunStats, Simulation};
pub use learner::{ACTION_COUNT, Learner};
pub use position::{Direction, Position, TieBreak};
pub use state::{SavedState, StateError};
