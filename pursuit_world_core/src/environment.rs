use std::collections::HashSet;

use rand::{Rng, rngs::StdRng};
use tracing::trace;

use crate::{
    agent::{Agent, AgentKind},
    position::{Direction, Position, TieBreak},
};

/// Errors raised by world construction and setup. A blocked move is *not* an
/// error; only contract violations are.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    #[error("World dimensions ({width}, {height}) must both be positive")]
    InvalidDimensions { width: i32, height: i32 },
    #[error("Position ({x}, {y}) is out of bounds for world size ({width}, {height})")]
    OutOfBounds {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },
    #[error("Position ({x}, {y}) is already occupied")]
    CellOccupied { x: i32, y: i32 },
    #[error("Map string is empty")]
    EmptyMap,
    #[error("Inconsistent map width at row {row}: expected {expected}, found {found}")]
    InconsistentRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Unknown map code '{token}' at position ({x}, {y})")]
    UnknownToken { token: String, x: usize, y: usize },
}

/// Bounded grid holding the obstacle set and the agent roster.
///
/// Roster order is the fixed turn order. Invariant: once a move has settled,
/// no two agents and no agent/obstacle pair share a cell.
#[derive(Debug)]
pub struct GridWorld {
    width: i32,
    height: i32,
    obstacles: HashSet<Position>,
    pub agents: Vec<Agent>,
    tie_break: TieBreak,
}

impl GridWorld {
    pub fn new(width: i32, height: i32) -> Result<Self, WorldError> {
        if width <= 0 || height <= 0 {
            return Err(WorldError::InvalidDimensions { width, height });
        }
        Ok(GridWorld {
            width,
            height,
            obstacles: HashSet::new(),
            agents: Vec::new(),
            tie_break: TieBreak::default(),
        })
    }

    /// Selects the tie-break policy used by perception hashing.
    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    pub fn obstacles(&self) -> &HashSet<Position> {
        &self.obstacles
    }

    #[inline]
    pub fn in_bounds(&self, position: Position) -> bool {
        position.x >= 0 && position.y >= 0 && position.x < self.width && position.y < self.height
    }

    /// Places an obstacle. Rejects out-of-bounds or already occupied cells.
    pub fn add_obstacle(&mut self, position: Position) -> Result<(), WorldError> {
        self.check_free(position)?;
        self.obstacles.insert(position);
        Ok(())
    }

    /// Adds an agent to the back of the roster and returns its index.
    pub fn add_agent(&mut self, kind: AgentKind, position: Position) -> Result<usize, WorldError> {
        self.check_free(position)?;
        self.agents.push(Agent::new(kind, position));
        Ok(self.agents.len() - 1)
    }

    fn check_free(&self, position: Position) -> Result<(), WorldError> {
        if !self.in_bounds(position) {
            return Err(WorldError::OutOfBounds {
                x: position.x,
                y: position.y,
                width: self.width,
                height: self.height,
            });
        }
        if self.is_occupied(position) {
            return Err(WorldError::CellOccupied {
                x: position.x,
                y: position.y,
            });
        }
        Ok(())
    }

    fn is_occupied(&self, position: Position) -> bool {
        self.obstacles.contains(&position) || self.agents.iter().any(|a| a.position == position)
    }

    /// Resolves a requested move: `desired` if it is in bounds and free of
    /// obstacles and agents, otherwise `current`. A blocked move is a
    /// defined no-op outcome that still consumes the turn.
    pub fn resolve_move(&self, current: Position, desired: Position) -> Position {
        if !self.in_bounds(desired) || self.is_occupied(desired) {
            current
        } else {
            desired
        }
    }

    /// Commits the requested action for an agent. Still agents ignore every
    /// request; for the rest the move is resolved against bounds, obstacles
    /// and the roster before the position updates.
    pub fn apply_action(&mut self, idx: usize, direction: Direction) {
        let agent = &self.agents[idx];
        if !agent.kind.moves() {
            return;
        }
        let current = agent.position;
        let resolved = self.resolve_move(current, current.step(direction));
        trace!(agent = idx, ?direction, ?resolved, "move resolved");
        self.agents[idx].position = resolved;
    }

    /// True iff every one of the four moves resolves back to the current
    /// cell.
    pub fn is_stuck(&self, idx: usize) -> bool {
        let current = self.agents[idx].position;
        Direction::ALL
            .iter()
            .all(|&d| self.resolve_move(current, current.step(d)) == current)
    }

    /// Proposes a uniformly random in-bounds cell and resolves it through
    /// the world. When the proposal is occupied the agent silently keeps its
    /// previous position. `ManualVictim` never reshuffles.
    pub fn shuffle_position(&mut self, idx: usize, rng: &mut StdRng) {
        if self.agents[idx].kind == AgentKind::ManualVictim {
            return;
        }
        let proposed = Position::new(
            rng.random_range(0..self.width),
            rng.random_range(0..self.height),
        );
        let current = self.agents[idx].position;
        self.agents[idx].position = self.resolve_move(current, proposed);
    }

    /// Roster indices of every victim-kind agent.
    pub fn victims(&self) -> impl Iterator<Item = usize> + '_ {
        self.agents
            .iter()
            .enumerate()
            .filter(|(_, a)| a.kind.is_victim())
            .map(|(i, _)| i)
    }

    /// The first TeamHunter in roster order other than `idx`, if any.
    pub fn other_team_hunter(&self, idx: usize) -> Option<usize> {
        self.agents
            .iter()
            .enumerate()
            .find(|&(i, a)| i != idx && a.kind == AgentKind::TeamHunter)
            .map(|(i, _)| i)
    }

    /// Direction from `observer` to `target` if the target lies within the
    /// observer's sight range. Kinds without sight sense nothing.
    pub fn sense(&self, observer: usize, target: usize, rng: &mut StdRng) -> Option<Direction> {
        let sight = self.agents[observer].kind.sight()?;
        let from = self.agents[observer].position;
        let to = self.agents[target].position;
        from.direction_to(to, sight, self.tie_break, rng)
    }

    /// State hash keying the agent's action-value table: the position hash
    /// plus whatever the kind perceives about in-sight victims.
    pub fn state_hash(&self, idx: usize, rng: &mut StdRng) -> String {
        let agent = &self.agents[idx];
        let mut hash = agent.position.hash();
        match agent.kind {
            AgentKind::Hunter
            | AgentKind::Victim
            | AgentKind::StillVictim
            | AgentKind::ManualVictim => {}
            AgentKind::SensingHunter => {
                for v in self.victims() {
                    if let Some(direction) = self.sense(idx, v, rng) {
                        hash.push('|');
                        hash.push(direction.label());
                    }
                }
            }
            AgentKind::OptimizedSensingHunter => {
                for v in self.victims() {
                    if let Some(direction) = self.sense(idx, v, rng) {
                        let distance = agent.position.distance(self.agents[v].position);
                        hash.push('|');
                        hash.push(direction.label());
                        hash.push_str(&distance.to_string());
                    }
                }
            }
            AgentKind::TeamHunter => {
                let peer = self.other_team_hunter(idx);
                for v in self.victims() {
                    if let Some(direction) = self.sense(idx, v, rng) {
                        hash.push('|');
                        hash.push(direction.label());
                        // Fold in the teammate's perception of the same
                        // victim; '-' when there is no teammate or it
                        // senses nothing.
                        let reported = peer.and_then(|p| self.sense(p, v, rng));
                        hash.push(reported.map_or('-', Direction::label));
                    }
                }
            }
        }
        hash
    }

    /// Reward for the agent's current situation. Pure read of world state;
    /// the only mutation is the agent's own `goal_reached` flag, and it is
    /// evaluated exactly once per learning step.
    pub fn evaluate_reward(&mut self, idx: usize) -> f64 {
        if self.agents[idx].kind.is_victim() {
            return 0.0;
        }
        let position = self.agents[idx].position;
        let caught = self
            .victims()
            .any(|v| position.distance(self.agents[v].position) <= 1);
        self.agents[idx].goal_reached = caught;
        if caught { 100.0 } else { -1.0 }
    }
}

/// Builds a world from a whitespace-token map string.
///
/// Tokens: `__` floor, `##` obstacle, `HU` hunter, `SH` sensing hunter,
/// `OH` optimized sensing hunter, `TH` team hunter, `VI` victim, `SV` still
/// victim, `MV` manual victim. Row length fixes the width; every row must
/// match.
pub fn load_world_from_string(map_string: &str) -> Result<GridWorld, WorldError> {
    let lines: Vec<&str> = map_string
        .trim()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        return Err(WorldError::EmptyMap);
    }

    let rows: Vec<Vec<&str>> = lines
        .iter()
        .map(|line| line.split_whitespace().collect())
        .collect();
    let width = rows[0].len();
    if width == 0 {
        return Err(WorldError::EmptyMap);
    }
    for (y, row) in rows.iter().enumerate() {
        if row.len() != width {
            return Err(WorldError::InconsistentRow {
                row: y,
                expected: width,
                found: row.len(),
            });
        }
    }

    let mut world = GridWorld::new(width as i32, rows.len() as i32)?;
    for (y, row) in rows.iter().enumerate() {
        for (x, token) in row.iter().enumerate() {
            let position = Position::new(x as i32, y as i32);
            let kind = match *token {
                "__" => continue,
                "##" => {
                    world.add_obstacle(position)?;
                    continue;
                }
                "HU" => AgentKind::Hunter,
                "SH" => AgentKind::SensingHunter,
                "OH" => AgentKind::OptimizedSensingHunter,
                "TH" => AgentKind::TeamHunter,
                "VI" => AgentKind::Victim,
                "SV" => AgentKind::StillVictim,
                "MV" => AgentKind::ManualVictim,
                unknown => {
                    return Err(WorldError::UnknownToken {
                        token: unknown.to_string(),
                        x,
                        y,
                    });
                }
            };
            world.add_agent(kind, position)?;
        }
    }
    Ok(world)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn rejects_non_positive_dimensions() {
        assert!(matches!(
            GridWorld::new(0, 5),
            Err(WorldError::InvalidDimensions { .. })
        ));
        assert!(matches!(
            GridWorld::new(5, -1),
            Err(WorldError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn resolve_move_keeps_agents_inside_and_off_occupied_cells() {
        let mut world = GridWorld::new(3, 3).unwrap();
        world.add_obstacle(Position::new(1, 0)).unwrap();
        world.add_agent(AgentKind::Hunter, Position::new(0, 0)).unwrap();
        world.add_agent(AgentKind::Victim, Position::new(0, 1)).unwrap();

        let current = Position::new(0, 0);
        // Out of bounds.
        assert_eq!(world.resolve_move(current, Position::new(-1, 0)), current);
        assert_eq!(world.resolve_move(current, Position::new(0, -1)), current);
        // Obstacle.
        assert_eq!(world.resolve_move(current, Position::new(1, 0)), current);
        // Other agent.
        assert_eq!(world.resolve_move(current, Position::new(0, 1)), current);
        // Free cell.
        assert_eq!(
            world.resolve_move(current, Position::new(1, 1)),
            Position::new(1, 1)
        );
    }

    #[test]
    fn two_by_two_scenario_from_origin() {
        let mut world = GridWorld::new(2, 2).unwrap();
        let idx = world.add_agent(AgentKind::Hunter, Position::new(0, 0)).unwrap();

        world.apply_action(idx, Direction::Up);
        assert_eq!(world.agents[idx].position, Position::new(0, 0));

        world.apply_action(idx, Direction::Right);
        assert_eq!(world.agents[idx].position, Position::new(1, 0));
    }

    #[test]
    fn blocked_move_is_a_no_op_not_an_error() {
        let mut world = GridWorld::new(1, 1).unwrap();
        let idx = world.add_agent(AgentKind::Hunter, Position::new(0, 0)).unwrap();
        for d in Direction::ALL {
            world.apply_action(idx, d);
            assert_eq!(world.agents[idx].position, Position::new(0, 0));
        }
        assert!(world.is_stuck(idx));
    }

    #[test]
    fn surrounded_agent_is_stuck() {
        let mut world = GridWorld::new(3, 3).unwrap();
        let idx = world.add_agent(AgentKind::Hunter, Position::new(1, 1)).unwrap();
        for p in [
            Position::new(1, 0),
            Position::new(2, 1),
            Position::new(1, 2),
            Position::new(0, 1),
        ] {
            world.add_obstacle(p).unwrap();
        }
        assert!(world.is_stuck(idx));
    }

    #[test]
    fn setup_rejects_occupied_or_out_of_bounds_cells() {
        let mut world = GridWorld::new(2, 2).unwrap();
        world.add_agent(AgentKind::Hunter, Position::new(0, 0)).unwrap();
        assert!(matches!(
            world.add_agent(AgentKind::Victim, Position::new(0, 0)),
            Err(WorldError::CellOccupied { .. })
        ));
        assert!(matches!(
            world.add_obstacle(Position::new(5, 0)),
            Err(WorldError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn still_victim_never_moves() {
        let mut world = GridWorld::new(4, 4).unwrap();
        let idx = world
            .add_agent(AgentKind::StillVictim, Position::new(2, 2))
            .unwrap();
        for d in Direction::ALL {
            world.apply_action(idx, d);
        }
        assert_eq!(world.agents[idx].position, Position::new(2, 2));
    }

    #[test]
    fn shuffle_stays_put_when_proposal_is_blocked() {
        // Single free cell: any shuffle proposal resolves back to it.
        let mut world = GridWorld::new(1, 1).unwrap();
        let idx = world.add_agent(AgentKind::Hunter, Position::new(0, 0)).unwrap();
        let mut rng = rng();
        world.shuffle_position(idx, &mut rng);
        assert_eq!(world.agents[idx].position, Position::new(0, 0));
    }

    #[test]
    fn shuffle_lands_in_bounds() {
        let mut world = GridWorld::new(6, 4).unwrap();
        let idx = world.add_agent(AgentKind::Victim, Position::new(0, 0)).unwrap();
        let mut rng = rng();
        for _ in 0..50 {
            world.shuffle_position(idx, &mut rng);
            assert!(world.in_bounds(world.agents[idx].position));
        }
    }

    #[test]
    fn hunter_reward_depends_on_victim_distance() {
        let mut world = GridWorld::new(8, 8).unwrap();
        let hunter = world.add_agent(AgentKind::Hunter, Position::new(0, 0)).unwrap();
        world.add_agent(AgentKind::Victim, Position::new(0, 1)).unwrap();

        assert_eq!(world.evaluate_reward(hunter), 100.0);
        assert!(world.agents[hunter].goal_reached);

        world.agents[hunter].position = Position::new(0, 3);
        assert_eq!(world.evaluate_reward(hunter), -1.0);
        assert!(!world.agents[hunter].goal_reached);
    }

    #[test]
    fn victim_reward_is_always_zero() {
        let mut world = GridWorld::new(4, 4).unwrap();
        world.add_agent(AgentKind::Hunter, Position::new(0, 0)).unwrap();
        let victim = world.add_agent(AgentKind::Victim, Position::new(0, 1)).unwrap();
        assert_eq!(world.evaluate_reward(victim), 0.0);
        assert!(!world.agents[victim].goal_reached);
    }

    #[test]
    fn plain_hunter_hashes_position_only() {
        let mut world = GridWorld::new(8, 8).unwrap();
        let hunter = world.add_agent(AgentKind::Hunter, Position::new(3, 4)).unwrap();
        world.add_agent(AgentKind::Victim, Position::new(5, 4)).unwrap();
        let mut rng = rng();
        assert_eq!(world.state_hash(hunter, &mut rng), "3:4");
    }

    #[test]
    fn sensing_hunter_hash_appends_direction_when_in_sight() {
        let mut world = GridWorld::new(20, 20).unwrap();
        let hunter = world
            .add_agent(AgentKind::SensingHunter, Position::new(0, 5))
            .unwrap();
        let victim = world.add_agent(AgentKind::Victim, Position::new(4, 5)).unwrap();
        let mut rng = rng();
        assert_eq!(world.state_hash(hunter, &mut rng), "0:5|R");

        // Beyond the sight range the hash degenerates to the position.
        world.agents[victim].position = Position::new(15, 5);
        assert_eq!(world.state_hash(hunter, &mut rng), "0:5");
    }

    #[test]
    fn optimized_hunter_hash_appends_distance() {
        let mut world = GridWorld::new(20, 20).unwrap();
        let hunter = world
            .add_agent(AgentKind::OptimizedSensingHunter, Position::new(0, 5))
            .unwrap();
        world.add_agent(AgentKind::StillVictim, Position::new(7, 5)).unwrap();
        let mut rng = rng();
        assert_eq!(world.state_hash(hunter, &mut rng), "0:5|R7");
    }

    #[test]
    fn team_hunter_hash_includes_peer_report() {
        let mut world = GridWorld::new(20, 20).unwrap()
            .with_tie_break(TieBreak::Deterministic);
        let first = world
            .add_agent(AgentKind::TeamHunter, Position::new(0, 5))
            .unwrap();
        world.add_agent(AgentKind::TeamHunter, Position::new(4, 9)).unwrap();
        world.add_agent(AgentKind::StillVictim, Position::new(4, 5)).unwrap();
        let mut rng = rng();
        // Own view: victim straight right. Peer at (4,9) sees it straight up.
        assert_eq!(world.state_hash(first, &mut rng), "0:5|RU");
    }

    #[test]
    fn lone_team_hunter_reports_placeholder() {
        let mut world = GridWorld::new(20, 20).unwrap();
        let hunter = world
            .add_agent(AgentKind::TeamHunter, Position::new(0, 5))
            .unwrap();
        world.add_agent(AgentKind::StillVictim, Position::new(4, 5)).unwrap();
        let mut rng = rng();
        assert_eq!(world.state_hash(hunter, &mut rng), "0:5|R-");
    }

    #[test]
    fn map_loader_places_obstacles_and_agents() {
        let world = load_world_from_string(
            "
            __ ## __
            SH __ VI
            ",
        )
        .unwrap();
        assert_eq!(world.width(), 3);
        assert_eq!(world.height(), 2);
        assert!(world.obstacles().contains(&Position::new(1, 0)));
        assert_eq!(world.agents.len(), 2);
        assert_eq!(world.agents[0].kind, AgentKind::SensingHunter);
        assert_eq!(world.agents[0].position, Position::new(0, 1));
        assert_eq!(world.agents[1].kind, AgentKind::Victim);
    }

    #[test]
    fn map_loader_rejects_bad_input() {
        assert!(matches!(
            load_world_from_string(""),
            Err(WorldError::EmptyMap)
        ));
        assert!(matches!(
            load_world_from_string("__ __\n__"),
            Err(WorldError::InconsistentRow { .. })
        ));
        assert!(matches!(
            load_world_from_string("__ XX"),
            Err(WorldError::UnknownToken { .. })
        ));
    }
}
