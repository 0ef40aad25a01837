//! End-to-end training run on a small obstacle course.

use std::{cell::RefCell, rc::Rc};

use pursuit_world_core::{
    AgentKind, Position, SavedState, Simulation, TieBreak,
    environment::load_world_from_string,
};

fn course() -> pursuit_world_core::GridWorld {
    load_world_from_string(
        "
        SH __ __ __ __ __
        __ ## ## __ __ __
        __ __ __ __ ## __
        __ ## __ __ __ __
        __ __ __ __ __ VI
        ",
    )
    .unwrap()
    .with_tie_break(TieBreak::Deterministic)
}

#[test]
fn seeded_training_run_upholds_world_invariants() {
    let mut sim = Simulation::new(course(), Some(2024));

    let violations: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&violations);
    sim.on_step(move |world| {
        let mut seen = std::collections::HashSet::new();
        for agent in &world.agents {
            if !world.in_bounds(agent.position) {
                sink.borrow_mut()
                    .push(format!("out of bounds: {:?}", agent.position));
            }
            if world.obstacles().contains(&agent.position) {
                sink.borrow_mut()
                    .push(format!("on obstacle: {:?}", agent.position));
            }
            if !seen.insert(agent.position) {
                sink.borrow_mut()
                    .push(format!("cell shared: {:?}", agent.position));
            }
        }
    });

    sim.run_episodes(25);

    assert!(violations.borrow().is_empty(), "{:?}", violations.borrow());
    assert_eq!(sim.results().len(), 25);
    assert_eq!(sim.episodes_played(), 25);

    let stats = sim.stats();
    assert!(stats.average_steps.is_some());
    assert!(stats.median_steps.is_some());

    // The hunter explored: its table covers more than its bare positions.
    assert!(sim.world().agents[0].learner.table_size() > 30);
    // The victim never learned anything.
    assert_eq!(sim.world().agents[1].learner.table_size(), 0);
}

#[test]
fn training_continues_after_a_state_round_trip() {
    let mut sim = Simulation::new(course(), Some(99));
    sim.run_episodes(10);
    let table_before = sim.world().agents[0].learner.table_size();
    let saved = SavedState::capture(&sim);

    let mut restored = Simulation::new(course(), Some(100));
    restored.restore(saved).unwrap();
    assert_eq!(restored.episodes_played(), 10);
    assert_eq!(
        restored.world().agents[0].learner.table_size(),
        table_before
    );

    restored.run_episodes(5);
    assert_eq!(restored.results().len(), 15);
    assert!(restored.world().agents[0].learner.table_size() >= table_before);
}

#[test]
fn hunters_eventually_beat_the_random_baseline_setup() {
    // Two team hunters against a still victim on an open field; mostly a
    // smoke test that multi-hunter rosters run to completion.
    let mut world = pursuit_world_core::GridWorld::new(6, 6).unwrap();
    world
        .add_agent(AgentKind::TeamHunter, Position::new(0, 0))
        .unwrap();
    world
        .add_agent(AgentKind::TeamHunter, Position::new(5, 0))
        .unwrap();
    world
        .add_agent(AgentKind::StillVictim, Position::new(3, 3))
        .unwrap();

    let mut sim = Simulation::new(world, Some(4));
    sim.run_episodes(10);
    assert_eq!(sim.results().len(), 10);
    for result in sim.results() {
        assert!(result.steps > 0);
    }
}
