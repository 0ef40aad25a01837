use std::collections::HashMap;

use rand::{Rng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{environment::GridWorld, position::Direction};

/// Number of slots in an action-value row, one per [`Direction`].
pub const ACTION_COUNT: usize = 4;

const ZERO_ROW: [f64; ACTION_COUNT] = [0.0; ACTION_COUNT];

/// Per-agent action-value table with an epsilon-greedy policy.
///
/// Rows are keyed by the agent's perception hash and created lazily, zeroed,
/// the first time a hash is seen. The hyperparameters are fixed constants;
/// nothing decays over time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Learner {
    state_table: HashMap<String, [f64; ACTION_COUNT]>,
    alpha: f64,
    gamma: f64,
    epsilon: f64,
}

impl Default for Learner {
    fn default() -> Self {
        Learner::new()
    }
}

impl Learner {
    /// Learning rate 0.1, discount 0.9, exploration 0.1.
    pub fn new() -> Self {
        Learner {
            state_table: HashMap::new(),
            alpha: 0.1,
            gamma: 0.9,
            epsilon: 0.1,
        }
    }

    /// Creates the zeroed row for `hash` if it does not exist yet and
    /// returns a copy of the row.
    pub fn ensure_state(&mut self, hash: &str) -> [f64; ACTION_COUNT] {
        if let Some(row) = self.state_table.get(hash) {
            *row
        } else {
            self.state_table.insert(hash.to_string(), ZERO_ROW);
            ZERO_ROW
        }
    }

    /// Row for `hash`, zeroed when unseen. Read-only; does not create.
    pub fn values(&self, hash: &str) -> [f64; ACTION_COUNT] {
        self.state_table.get(hash).copied().unwrap_or(ZERO_ROW)
    }

    pub fn table_size(&self) -> usize {
        self.state_table.len()
    }

    pub fn table(&self) -> &HashMap<String, [f64; ACTION_COUNT]> {
        &self.state_table
    }

    /// Replaces the whole table. Used when restoring a persisted state.
    pub fn set_table(&mut self, table: HashMap<String, [f64; ACTION_COUNT]>) {
        self.state_table = table;
    }

    /// Epsilon-greedy selection over one row: with probability epsilon a
    /// uniformly random action index, otherwise a uniformly random pick
    /// among *all* indices tied for the maximum value. Ties are never
    /// resolved first-match.
    pub fn choose_action(&self, values: &[f64; ACTION_COUNT], rng: &mut StdRng) -> usize {
        if rng.random::<f64>() < self.epsilon {
            return rng.random_range(0..ACTION_COUNT);
        }
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let candidates: Vec<usize> = (0..ACTION_COUNT).filter(|&i| values[i] == max).collect();
        candidates[rng.random_range(0..candidates.len())]
    }

    /// Temporal-difference update for one observed transition.
    ///
    /// The next-state value bootstraps through an epsilon-greedy *sampled*
    /// action rather than the maximum; this reproduces the historical update
    /// rule exactly and is intentionally not the textbook Q-learning one.
    pub fn update(
        &mut self,
        state: &str,
        action: usize,
        reward: f64,
        next_state: &str,
        rng: &mut StdRng,
    ) {
        let next_values = self.ensure_state(next_state);
        let bootstrap = next_values[self.choose_action(&next_values, rng)];
        let (alpha, gamma) = (self.alpha, self.gamma);
        let row = self
            .state_table
            .entry(state.to_string())
            .or_insert(ZERO_ROW);
        row[action] += alpha * (reward + gamma * bootstrap - row[action]);
    }
}

#[cfg(test)]
impl Learner {
    pub(crate) fn set_epsilon(&mut self, epsilon: f64) {
        self.epsilon = epsilon;
    }
}

impl GridWorld {
    /// One learning step for the agent at `idx`, in the exact original
    /// sequencing: hash, choose, act, reward once, re-hash, update.
    pub fn learning_step(&mut self, idx: usize, rng: &mut StdRng) {
        let current_hash = self.state_hash(idx, rng);
        let values = self.agents[idx].learner.ensure_state(&current_hash);
        let action = self.agents[idx].learner.choose_action(&values, rng);

        self.apply_action(idx, Direction::from_index(action));
        let reward = self.evaluate_reward(idx);

        let new_hash = self.state_hash(idx, rng);
        debug!(
            agent = idx,
            %current_hash,
            %new_hash,
            action,
            reward,
            "learning step"
        );
        self.agents[idx]
            .learner
            .update(&current_hash, action, reward, &new_hash, rng);
    }
}
