use anyhow::Result;
use clap::{Parser, ValueEnum};
use pursuit_world_core::{
    AgentKind, GridWorld, Position, SavedState, Simulation, TieBreak,
    environment::load_world_from_string,
};
use ratatui::{
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use std::{
    io::{self, Stdout},
    path::PathBuf,
    time::{Duration, Instant},
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TieBreakArg {
    Random,
    Deterministic,
}

impl From<TieBreakArg> for TieBreak {
    fn from(arg: TieBreakArg) -> Self {
        match arg {
            TieBreakArg::Random => TieBreak::Random,
            TieBreakArg::Deterministic => TieBreak::Deterministic,
        }
    }
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Map file to load (token grid; `##` obstacle, `SH` sensing hunter, ...)
    #[arg(short, long, value_name = "MAP_FILE")]
    map: Option<PathBuf>,

    /// Grid width for the default scenario
    #[arg(long, default_value_t = 10)]
    width: i32,

    /// Grid height for the default scenario
    #[arg(long, default_value_t = 10)]
    height: i32,

    /// RNG seed for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Tie-break policy for perception hashing
    #[arg(long, value_enum, default_value = "random")]
    tie_break: TieBreakArg,

    /// Milliseconds between animation steps
    #[arg(long, default_value_t = 50)]
    tick_ms: u64,

    /// Run this many episodes headless and print the stats instead of
    /// opening the interactive view
    #[arg(long, value_name = "EPISODES")]
    train: Option<u64>,

    /// Restore a previously saved run before starting
    #[arg(long, value_name = "STATE_FILE")]
    load: Option<PathBuf>,

    /// Save the run to this file on exit
    #[arg(long, value_name = "STATE_FILE")]
    save: Option<PathBuf>,
}

struct App {
    sim: Simulation,
    paused: bool,
    should_quit: bool,
}

impl App {
    fn new(sim: Simulation) -> Self {
        App {
            sim,
            paused: false,
            should_quit: false,
        }
    }

    /// One animation step. Finished episodes roll straight into the next
    /// one; pacing only affects wall-clock time, never outcomes.
    fn tick(&mut self) {
        if self.paused {
            return;
        }
        if self.sim.step() {
            self.sim.restart();
        }
    }

    fn quit(&mut self) {
        self.should_quit = true;
    }
}

fn build_world(args: &Args) -> Result<GridWorld> {
    let world = match &args.map {
        Some(path) => {
            let map_string = std::fs::read_to_string(path)?;
            load_world_from_string(&map_string)?
        }
        None => {
            let mut world = GridWorld::new(args.width, args.height)?;
            world.add_agent(AgentKind::SensingHunter, Position::new(0, 0))?;
            world.add_agent(
                AgentKind::Victim,
                Position::new(args.width - 1, args.height - 1),
            )?;
            let mid_x = args.width / 2;
            for y in 1..(args.height - 1).min(4) {
                world.add_obstacle(Position::new(mid_x, y))?;
            }
            world
        }
    };
    Ok(world.with_tie_break(args.tie_break.into()))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let world = build_world(&args)?;
    let mut sim = Simulation::new(world, args.seed);
    if let Some(path) = &args.load {
        sim.restore(SavedState::load_from_file(path)?)?;
    }

    if let Some(episodes) = args.train {
        // Headless batch mode: logging goes to stderr, stats to stdout.
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
        sim.run_episodes(episodes);
        let stats = sim.stats();
        println!("episodes played: {}", stats.episodes_played);
        match (stats.average_steps, stats.median_steps) {
            (Some(average), Some(median)) => {
                println!("steps to goal: average {average}, median {median}");
            }
            _ => println!("no episode completed"),
        }
        for (idx, agent) in sim.world().agents.iter().enumerate() {
            println!(
                "agent {idx} ({:?}): {} states learned",
                agent.kind,
                agent.learner.table_size()
            );
        }
    } else {
        let mut terminal = setup_terminal()?;
        let mut app = App::new(sim);
        let result = run_app(&mut terminal, &mut app, Duration::from_millis(args.tick_ms));
        restore_terminal(&mut terminal)?;
        result?;
        sim = app.sim;
    }

    if let Some(path) = &args.save {
        SavedState::capture(&sim).save_to_file(path)?;
    }

    Ok(())
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Runs the main loop of the TUI application.
fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    tick_rate: Duration,
) -> Result<()> {
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => app.quit(),
                    KeyCode::Char(' ') => app.paused = !app.paused,
                    KeyCode::Char('r') => app.sim.restart(),
                    KeyCode::Char('R') => app.sim.reset(),
                    _ => {}
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.tick();
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

fn agent_glyph(kind: AgentKind) -> (&'static str, Style) {
    match kind {
        AgentKind::Hunter => ("H", Style::default().fg(Color::White).bold()),
        AgentKind::SensingHunter => ("S", Style::default().fg(Color::White).bold()),
        AgentKind::OptimizedSensingHunter => ("O", Style::default().fg(Color::White).bold()),
        AgentKind::TeamHunter => ("T", Style::default().fg(Color::Cyan).bold()),
        AgentKind::Victim => ("v", Style::default().fg(Color::Yellow)),
        AgentKind::StillVictim => ("s", Style::default().fg(Color::Yellow)),
        AgentKind::ManualVictim => ("m", Style::default().fg(Color::Yellow)),
    }
}

/// Renders the user interface.
fn ui(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(70),
            Constraint::Percentage(20),
            Constraint::Percentage(10),
        ])
        .split(frame.area());

    render_world(frame, main_layout[0], app.sim.world());
    render_stats(frame, main_layout[1], app);

    let help_text = Paragraph::new(
        "q: quit | space: pause | r: restart episode | R: full reset (drops learned tables)",
    )
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, main_layout[2]);
}

/// Renders the grid with obstacles and agents.
fn render_world(frame: &mut Frame, area: Rect, world: &GridWorld) {
    let mut lines: Vec<Line> = Vec::with_capacity(world.height() as usize);

    for y in 0..world.height() {
        let mut spans: Vec<Span> = Vec::with_capacity(world.width() as usize);
        for x in 0..world.width() {
            let position = Position::new(x, y);
            let agent = world.agents.iter().find(|a| a.position == position);
            let span = if let Some(agent) = agent {
                let (glyph, style) = agent_glyph(agent.kind);
                Span::styled(glyph, style)
            } else if world.obstacles().contains(&position) {
                Span::styled("#", Style::default().fg(Color::Red))
            } else {
                Span::styled(".", Style::default().fg(Color::DarkGray))
            };
            spans.push(span);
        }
        lines.push(Line::from(spans));
    }

    let world_paragraph = Paragraph::new(lines)
        .block(Block::default().title("Pursuit World").borders(Borders::ALL))
        .alignment(Alignment::Center);

    frame.render_widget(world_paragraph, area);
}

/// Renders run statistics and per-agent table sizes.
fn render_stats(frame: &mut Frame, area: Rect, app: &App) {
    let stats = app.sim.stats();
    let mut items: Vec<ListItem> = Vec::new();

    let header = format!(
        "episodes: {} | steps this episode: {} | avg: {} | median: {}{}",
        stats.episodes_played,
        app.sim.steps_played(),
        stats
            .average_steps
            .map_or("-".to_string(), |s| s.to_string()),
        stats
            .median_steps
            .map_or("-".to_string(), |s| s.to_string()),
        if app.paused { " | PAUSED" } else { "" },
    );
    items.push(ListItem::new(header));

    for (idx, agent) in app.sim.world().agents.iter().enumerate() {
        items.push(ListItem::new(format!(
            "agent {idx} {:?} at ({}, {}): {} states",
            agent.kind,
            agent.position.x,
            agent.position.y,
            agent.learner.table_size()
        )));
    }

    let stats_widget =
        List::new(items).block(Block::default().borders(Borders::ALL).title("Run"));
    frame.render_widget(stats_widget, area);
}
