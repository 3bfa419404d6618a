use color_eyre::eyre::Result;
use forkfan::config::COUNT_DEMO_ITERATIONS;
use forkfan::output::emit_line;
use nix::unistd::{fork, getpid};

// Fork once and let both sides run the same counter loop. The two pids'
// lines interleave; nothing synchronizes them.
fn main() -> Result<()> {
    color_eyre::install()?;
    let _ = unsafe { fork() }?;
    let pid = getpid();
    for value in 1..=COUNT_DEMO_ITERATIONS {
        emit_line(format_args!("this line is from pid {pid}, value = {value}"));
    }
    Ok(())
}
