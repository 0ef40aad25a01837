use serde::{Deserialize, Serialize};

use crate::{learner::Learner, position::Position};

/// Sight range of the sensing hunter variants, in Manhattan distance.
pub const SENSING_RANGE: u32 = 10;

/// Variant tag selecting an agent's perception, reward and movement
/// behavior. All dispatch happens on this tag; there is no per-variant type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Learns from its own position only; rewarded next to a victim.
    Hunter,
    /// Hunter that also perceives the direction towards in-sight victims.
    SensingHunter,
    /// Sensing hunter that additionally perceives the distance magnitude.
    OptimizedSensingHunter,
    /// Sensing hunter that folds one teammate's perception into its own.
    TeamHunter,
    /// Moves uniformly at random, never learns.
    Victim,
    /// Ignores every requested move and stays in place.
    StillVictim,
    /// Externally driven; an opaque no-op for the simulation core.
    ManualVictim,
}

impl AgentKind {
    pub const ALL: [AgentKind; 7] = [
        AgentKind::Hunter,
        AgentKind::SensingHunter,
        AgentKind::OptimizedSensingHunter,
        AgentKind::TeamHunter,
        AgentKind::Victim,
        AgentKind::StillVictim,
        AgentKind::ManualVictim,
    ];

    /// True for every victim variant. Hunters treat all of these as prey.
    pub fn is_victim(self) -> bool {
        matches!(
            self,
            AgentKind::Victim | AgentKind::StillVictim | AgentKind::ManualVictim
        )
    }

    pub fn is_hunter(self) -> bool {
        !self.is_victim()
    }

    /// Whether this kind moves through its learner's policy.
    pub fn learns(self) -> bool {
        self.is_hunter()
    }

    /// Sight range for kinds that sense victims at a distance.
    pub fn sight(self) -> Option<u32> {
        match self {
            AgentKind::SensingHunter
            | AgentKind::OptimizedSensingHunter
            | AgentKind::TeamHunter => Some(SENSING_RANGE),
            _ => None,
        }
    }

    /// Whether a requested move actually commits a position change.
    pub fn moves(self) -> bool {
        !matches!(self, AgentKind::StillVictim | AgentKind::ManualVictim)
    }
}

/// A hunter or victim occupying one grid cell.
///
/// The position is owned by the world's roster and updated only during the
/// agent's own turn. The learner table persists across episodes and is only
/// dropped by a full reset.
#[derive(Debug)]
pub struct Agent {
    pub kind: AgentKind,
    pub position: Position,
    pub start_position: Position,
    pub goal_reached: bool,
    pub learner: Learner,
}

impl Agent {
    /// Factory for every kind; also the registry used when restoring a
    /// persisted state (the stored kind tag maps here, never to a type name).
    pub fn new(kind: AgentKind, position: Position) -> Self {
        Agent {
            kind,
            position,
            start_position: position,
            goal_reached: false,
            learner: Learner::new(),
        }
    }
}
