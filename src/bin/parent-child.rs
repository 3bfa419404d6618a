use color_eyre::eyre::Result;
use forkfan::config::COUNT_DEMO_ITERATIONS;
use forkfan::output::emit_line;
use nix::unistd::{fork, ForkResult};

// Fork once and diverge: the child and parent each run their own loop and
// print a completion marker. The parent does not wait for the child.
fn main() -> Result<()> {
    color_eyre::install()?;
    match unsafe { fork() }? {
        ForkResult::Child => child_process(),
        ForkResult::Parent { .. } => parent_process(),
    }
    Ok(())
}

fn child_process() {
    for value in 1..=COUNT_DEMO_ITERATIONS {
        emit_line(format_args!(
            "   this line is from the child, value = {value}"
        ));
    }
    emit_line(format_args!("   *** child is done ***"));
}

fn parent_process() {
    for value in 1..=COUNT_DEMO_ITERATIONS {
        emit_line(format_args!("this line is from the parent, value = {value}"));
    }
    emit_line(format_args!("*** parent is done ***"));
}
