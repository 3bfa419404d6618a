use color_eyre::eyre::{ensure, Result};
use forkfan::config::{
    ITERATIONS_MAX, ITERATIONS_MIN, NUM_WORKERS, SLEEP_SECS_MAX, SLEEP_SECS_MIN,
};
use forkfan::fanout::{Launcher, WorkerSpec};
use forkfan::output::emit_line;
use std::env;

struct Options {
    workers: usize,
    iterations: (u32, u32),
    sleep_secs: (u64, u64),
}

// Positional overrides exist so the end-to-end tests can pin degenerate
// bounds; with no arguments the defaults from config.rs apply.
fn parse_args() -> Result<Options> {
    let mut args = env::args().skip(1);
    let mut opts = Options {
        workers: NUM_WORKERS,
        iterations: (ITERATIONS_MIN, ITERATIONS_MAX),
        sleep_secs: (SLEEP_SECS_MIN, SLEEP_SECS_MAX),
    };
    if let Some(workers) = args.next() {
        opts.workers = workers.parse()?;
    }
    if let Some(lo) = args.next() {
        opts.iterations.0 = lo.parse()?;
    }
    if let Some(hi) = args.next() {
        opts.iterations.1 = hi.parse()?;
    }
    if let Some(lo) = args.next() {
        opts.sleep_secs.0 = lo.parse()?;
    }
    if let Some(hi) = args.next() {
        opts.sleep_secs.1 = hi.parse()?;
    }
    ensure!(
        opts.iterations.0 <= opts.iterations.1,
        "iteration bounds are inverted"
    );
    ensure!(
        opts.sleep_secs.0 <= opts.sleep_secs.1,
        "sleep bounds are inverted"
    );
    Ok(opts)
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let opts = parse_args()?;
    let mut rng = rand::thread_rng();

    let specs: Vec<WorkerSpec> = (0..opts.workers)
        .map(|_| WorkerSpec::draw(&mut rng, opts.iterations, opts.sleep_secs))
        .collect();
    for (index, spec) in specs.iter().enumerate() {
        emit_line(format_args!(
            "child {} will run {} iterations",
            index + 1,
            spec.iterations
        ));
    }

    let mut launcher = Launcher::new();
    launcher.launch_all(&specs)?;
    launcher.join_all(|event| {
        emit_line(format_args!("child pid {} has completed", event.worker));
    })?;

    Ok(())
}
