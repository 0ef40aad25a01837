use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    agent::AgentKind,
    environment::GridWorld,
    learner::{ACTION_COUNT, Learner},
    position::Direction,
};

/// Outcome of one finished episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeResult {
    /// 1-based episode number.
    pub episode: u64,
    /// Full rounds needed until a goal was reached.
    pub steps: u64,
}

/// Aggregated run statistics. The averages are `None` until the first
/// episode has completed; they are never computed by dividing by zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub episodes_played: u64,
    pub average_steps: Option<u64>,
    pub median_steps: Option<u64>,
}

/// Payload handed to the episode-end observation hook.
#[derive(Debug, Clone, Copy)]
pub struct EpisodeStats {
    pub result: EpisodeResult,
    pub run: RunStats,
}

type StepHook = Box<dyn FnMut(&GridWorld)>;
type EpisodeHook = Box<dyn FnMut(&EpisodeStats)>;

/// Turn-based episode runner: exactly one agent acts per step, strictly
/// round-robin over the roster.
///
/// The runner is timer-free; interactive front ends inject their own pacing
/// between [`Simulation::step`] calls, and a batch run produces identical
/// results with no delay at all.
pub struct Simulation {
    pub(crate) world: GridWorld,
    rng: StdRng,
    steps_played: u64,
    pub(crate) episodes_played: u64,
    active_agent: usize,
    halted: bool,
    pub(crate) results: Vec<EpisodeResult>,
    on_step: Option<StepHook>,
    on_episode_end: Option<EpisodeHook>,
}

impl Simulation {
    /// Wraps a world in a runner. With `seed` the whole run is
    /// reproducible; without it the generator is seeded from entropy.
    pub fn new(world: GridWorld, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Simulation {
            world,
            rng,
            steps_played: 0,
            episodes_played: 0,
            active_agent: 0,
            halted: false,
            results: Vec::new(),
            on_step: None,
            on_episode_end: None,
        }
    }

    pub fn world(&self) -> &GridWorld {
        &self.world
    }

    pub fn steps_played(&self) -> u64 {
        self.steps_played
    }

    pub fn episodes_played(&self) -> u64 {
        self.episodes_played
    }

    pub fn active_agent(&self) -> usize {
        self.active_agent
    }

    pub fn results(&self) -> &[EpisodeResult] {
        &self.results
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Freezes or unfreezes stepping. Checked before each step; a step's
    /// effects are applied atomically, so there is never partial state to
    /// unwind.
    pub fn set_halted(&mut self, halted: bool) {
        self.halted = halted;
    }

    /// Observer called with the world after every completed step.
    pub fn on_step(&mut self, hook: impl FnMut(&GridWorld) + 'static) {
        self.on_step = Some(Box::new(hook));
    }

    /// Observer called once per finished episode.
    pub fn on_episode_end(&mut self, hook: impl FnMut(&EpisodeStats) + 'static) {
        self.on_episode_end = Some(Box::new(hook));
    }

    /// Advances the next agent in turn order by one move and reports
    /// whether the episode is over. A halted simulation reports `true`
    /// without moving anything.
    ///
    /// # Panics
    ///
    /// Panics when the roster is empty; stepping a world without agents is
    /// a programmer error.
    pub fn step(&mut self) -> bool {
        if self.halted {
            return true;
        }
        assert!(
            !self.world.agents.is_empty(),
            "Cannot step a simulation with an empty roster"
        );
        self.steps_played += 1;
        self.active_agent = (self.active_agent + 1) % self.world.agents.len();
        let idx = self.active_agent;

        let kind = self.world.agents[idx].kind;
        if kind.learns() {
            self.world.learning_step(idx, &mut self.rng);
        } else if kind == AgentKind::Victim {
            let action = self.rng.random_range(0..ACTION_COUNT);
            self.world.apply_action(idx, Direction::from_index(action));
        }
        // StillVictim and ManualVictim consume their turn without acting.

        if let Some(hook) = self.on_step.as_mut() {
            hook(&self.world);
        }

        if self.goal_reached() {
            let steps = self
                .steps_played
                .div_ceil(self.world.agents.len() as u64);
            let result = EpisodeResult {
                episode: self.episodes_played + 1,
                steps,
            };
            self.results.push(result);
            self.halted = true;
            debug!(episode = result.episode, steps, "episode finished");
            let stats = EpisodeStats {
                result,
                run: self.run_stats_inner(),
            };
            if let Some(hook) = self.on_episode_end.as_mut() {
                hook(&stats);
            }
            true
        } else {
            false
        }
    }

    fn goal_reached(&self) -> bool {
        self.world.agents.iter().any(|a| a.goal_reached)
    }

    /// Starts the next episode: zeroes the step counter, bumps the episode
    /// counter, reshuffles every agent to a random cell, clears all goal
    /// flags and unfreezes the runner. Learner tables persist.
    pub fn restart(&mut self) {
        self.steps_played = 0;
        self.episodes_played += 1;
        for idx in 0..self.world.agents.len() {
            self.world.shuffle_position(idx, &mut self.rng);
            self.world.agents[idx].goal_reached = false;
        }
        self.halted = false;
    }

    /// Runs steps back-to-back until the episode terminates, then restarts.
    /// No extra terminal move is granted to the remaining agents; the
    /// episode ends on the move that reached the goal.
    pub fn run_episode(&mut self) {
        while !self.step() {}
        self.restart();
    }

    /// Synchronous batch training: `count` episodes with no pacing.
    pub fn run_episodes(&mut self, count: u64) {
        for _ in 0..count {
            self.run_episode();
        }
    }

    /// Full reset: drops every learner table, all results and counters,
    /// then reshuffles for a fresh run.
    pub fn reset(&mut self) {
        for agent in &mut self.world.agents {
            agent.learner = Learner::new();
        }
        self.results.clear();
        self.episodes_played = 0;
        self.steps_played = 0;
        for idx in 0..self.world.agents.len() {
            self.world.shuffle_position(idx, &mut self.rng);
            self.world.agents[idx].goal_reached = false;
        }
        self.halted = false;
    }

    /// Aggregated statistics over all recorded episodes.
    pub fn stats(&self) -> RunStats {
        self.run_stats_inner()
    }

    fn run_stats_inner(&self) -> RunStats {
        let (average_steps, median_steps) = if self.results.is_empty() {
            (None, None)
        } else {
            let total: u64 = self.results.iter().map(|r| r.steps).sum();
            let average = total.div_ceil(self.results.len() as u64);

            let mut sorted: Vec<u64> = self.results.iter().map(|r| r.steps).collect();
            sorted.sort_unstable();
            let mid = sorted.len() / 2;
            let median = if sorted.len() % 2 == 1 {
                sorted[mid]
            } else {
                (sorted[mid - 1] + sorted[mid]).div_ceil(2)
            };
            (Some(average), Some(median))
        };
        RunStats {
            episodes_played: self.episodes_played,
            average_steps,
            median_steps,
        }
    }
}
