//! # Metronome Headless Driver
//!
//! Runs the frame loop against a window that draws nothing.
//!
//! ## Usage
//!
//! ```bash
//! metronome_headless --config metronome.toml --frames 600
//! ```

use std::cell::Cell;
use std::error::Error as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use metronome_core::{
    HeadlessWindow, Lifetime, LoopStats, Runtime, RuntimeConfig, RuntimeError, RuntimeResult,
    Stage,
};

/// Frames run when `--frames` is not given.
const DEFAULT_FRAMES: u64 = 600;

/// Spawn one entity every this many frames while playing.
const SPAWN_INTERVAL: u64 = 30;

/// Counters shared between the demo systems and `main`.
#[derive(Default)]
struct DemoCounters {
    fixed_ticks: Cell<u64>,
    spawned: Cell<u64>,
    score: Cell<u64>,
    rendered: Cell<u64>,
    alpha_sum: Cell<f64>,
}

/// Score kept as a transient resource while playing.
struct Score(u64);

struct Args {
    config: Option<PathBuf>,
    frames: u64,
}

fn parse_args() -> Option<Args> {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args {
        config: None,
        frames: DEFAULT_FRAMES,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    parsed.config = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--frames" | "-f" => {
                if i + 1 < args.len() {
                    parsed.frames = args[i + 1].parse().unwrap_or(DEFAULT_FRAMES);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Usage: metronome_headless [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>    TOML runtime config (default: built-in)");
                println!("  -f, --frames <N>       Frames to run (default: {DEFAULT_FRAMES})");
                println!("  -h, --help             Show this help");
                return None;
            }
            other => eprintln!("ignoring unknown argument '{other}'"),
        }
        i += 1;
    }
    Some(parsed)
}

fn register_states(runtime: &mut Runtime) -> RuntimeResult<()> {
    let states = runtime.world_mut().states_mut();
    states.register("menu")?;
    states.register("playing")?;

    states.bind_enter("menu", |_| {
        tracing::info!("entered menu");
        Ok(())
    })?;
    states.bind_exit("menu", |_| {
        tracing::info!("leaving menu");
        Ok(())
    })?;
    states.bind_enter("playing", |world| {
        let player = world.spawn()?;
        tracing::info!("entered playing, player {}", player);
        Ok(())
    })?;
    Ok(())
}

fn register_systems(runtime: &mut Runtime, counters: &Rc<DemoCounters>) -> RuntimeResult<()> {
    runtime.add_system(Stage::Booting, "open_menu", |world| {
        world.states_mut().request("menu")
    })?;

    let spawner = Rc::clone(counters);
    runtime.add_system(Stage::Variable, "gameplay", move |world| {
        let frame = world.time()?.frame;
        if world.states().is_in("menu")? {
            if frame >= 2 {
                world.states_mut().request("playing")?;
                world.resources_mut().add(Score(0), Lifetime::Transient)?;
            }
            return Ok(());
        }

        if frame % SPAWN_INTERVAL == 0 {
            world.spawn()?;
            spawner.spawned.set(spawner.spawned.get() + 1);
            if let Some(score) = world.resources_mut().try_get_mut::<Score>()? {
                score.0 += 10;
                spawner.score.set(score.0);
            }
        }
        Ok(())
    })?;

    let ticker = Rc::clone(counters);
    runtime.add_system(Stage::FixedStep, "tick_counter", move |world| {
        let fixed_tick = world.time()?.fixed_tick;
        ticker.fixed_ticks.set(fixed_tick);
        Ok(())
    })?;

    let renderer = Rc::clone(counters);
    runtime.add_system(Stage::Rendering, "draw", move |world| {
        let alpha = world.time()?.alpha;
        if !(0.0..=1.0).contains(&alpha) {
            return Err(RuntimeError::CallbackFailed(format!("alpha {alpha} out of range")));
        }
        renderer.rendered.set(renderer.rendered.get() + 1);
        renderer.alpha_sum.set(renderer.alpha_sum.get() + alpha);
        Ok(())
    })?;

    runtime.add_system(Stage::Exiting, "farewell", |_| {
        tracing::info!("exiting");
        Ok(())
    })?;
    Ok(())
}

fn print_summary(stats: &LoopStats, counters: &DemoCounters, final_state: Option<&str>) {
    let rendered = counters.rendered.get();
    let avg_alpha = if rendered == 0 {
        0.0
    } else {
        counters.alpha_sum.get() / rendered as f64
    };

    println!("┌─ LOOP ─────────────────────────────────────────────────────────┐");
    println!("│ Frames:             {}", stats.frames);
    println!(
        "│ Average Frame:      {:.3} ms ({:.1} FPS)",
        stats.avg_frame_ms(),
        stats.avg_fps()
    );
    println!(
        "│ Fixed Steps:        {} ({:.2} per frame)",
        stats.fixed_steps,
        stats.avg_fixed_steps()
    );
    println!(
        "│ Spiral Clamps:      {} ({:.4} s shed)",
        stats.spiral_clamps, stats.shed_seconds
    );
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();
    println!("┌─ DEMO ─────────────────────────────────────────────────────────┐");
    println!("│ Final State:        {}", final_state.unwrap_or("<none>"));
    println!("│ Fixed Ticks Seen:   {}", counters.fixed_ticks.get());
    println!("│ Entities Spawned:   {}", counters.spawned.get());
    println!("│ Score:              {}", counters.score.get());
    println!("│ Average Alpha:      {avg_alpha:.3}");
    println!("└──────────────────────────────────────────────────────────────────┘");
}

fn run(args: &Args) -> RuntimeResult<()> {
    let config = match &args.config {
        Some(path) => RuntimeConfig::load(path)?,
        None => RuntimeConfig::default(),
    };

    println!("┌─ CONFIGURATION ─────────────────────────────────────────────────┐");
    println!(
        "│ Window:             {}x{} \"{}\"",
        config.window.width, config.window.height, config.window.title
    );
    println!("│ Fixed Step:         {:.4} s", config.timing.fixed_step);
    println!("│ Max Frame Delta:    {:.3} s", config.timing.max_frame_delta);
    println!("│ Max Fixed Steps:    {}", config.timing.max_fixed_steps);
    println!("│ Frames:             {}", args.frames);
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();

    let counters = Rc::new(DemoCounters::default());
    let mut runtime = Runtime::new(config)?;
    register_states(&mut runtime)?;
    register_systems(&mut runtime, &counters)?;

    let mut window = HeadlessWindow::new(Some(args.frames));
    let stats = runtime.run(&mut window)?;

    print_summary(&stats, &counters, runtime.world().states().current());
    Ok(())
}

fn main() -> ExitCode {
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         METRONOME HEADLESS                                       ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    let Some(args) = parse_args() else {
        return ExitCode::SUCCESS;
    };

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            let mut source = err.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}
