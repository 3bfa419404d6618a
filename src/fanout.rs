use crate::output::emit_line;
use nix::errno::Errno;
use nix::sys::wait::{wait, WaitStatus};
use nix::unistd::{fork, getpid, getppid, ForkResult, Pid};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use std::{fmt, thread};

/// Parameters for one worker, fixed before the fork. The iteration count
/// is drawn once and never re-rolled; only the sleep duration is re-drawn
/// each iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSpec {
    pub iterations: u32,
    pub sleep_min: u64,
    pub sleep_max: u64,
}

impl WorkerSpec {
    pub fn draw(rng: &mut impl Rng, iterations: (u32, u32), sleep_secs: (u64, u64)) -> Self {
        Self {
            iterations: rng.gen_range(iterations.0..=iterations.1),
            sleep_min: sleep_secs.0,
            sleep_max: sleep_secs.1,
        }
    }
}

/// Identifies a spawned worker. Owned by the launcher, only used to
/// correlate completion events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerHandle(Pid);

impl WorkerHandle {
    pub fn pid(&self) -> Pid {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionEvent {
    pub worker: Pid,
    pub status: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnError(pub Errno);

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to spawn worker: {}", self.0)
    }
}

impl std::error::Error for SpawnError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinError {
    /// `join_next` was called with nothing left to wait for. A caller bug,
    /// not a runtime fault; `join_all` never triggers it.
    NoOutstandingWork,
    Wait(Errno),
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinError::NoOutstandingWork => write!(f, "no outstanding workers to join"),
            JoinError::Wait(errno) => write!(f, "wait failed: {errno}"),
        }
    }
}

impl std::error::Error for JoinError {}

/// The spawn seam. Production code forks; tests script failures.
pub trait Spawner {
    fn spawn(&mut self, spec: &WorkerSpec) -> Result<WorkerHandle, SpawnError>;
}

/// Spawns workers with `fork(2)`. The child runs `worker_body` and exits
/// without returning to the launcher's call stack.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForkSpawner;

impl Spawner for ForkSpawner {
    fn spawn(&mut self, spec: &WorkerSpec) -> Result<WorkerHandle, SpawnError> {
        match unsafe { fork() } {
            Ok(ForkResult::Parent { child }) => Ok(WorkerHandle(child)),
            Ok(ForkResult::Child) => {
                worker_body(spec);
                unsafe { libc::_exit(0) }
            }
            Err(errno) => Err(SpawnError(errno)),
        }
    }
}

/// The bounded randomized workload run inside each worker process.
pub fn worker_body(spec: &WorkerSpec) {
    let pid = getpid();
    let ppid = getppid();
    let mut rng = StdRng::seed_from_u64(worker_seed(pid, unix_time_secs()));
    for _ in 1..=spec.iterations {
        emit_line(format_args!("child pid {pid} is going to sleep"));
        let secs = rng.gen_range(spec.sleep_min..=spec.sleep_max);
        thread::sleep(Duration::from_secs(secs));
        emit_line(format_args!("child pid {pid} is awake, parent is {ppid}"));
    }
}

fn unix_time_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// Siblings forked within the same second must not draw identical sleep
// sequences, so the pid goes into the seed alongside the clock.
fn worker_seed(pid: Pid, now: u64) -> u64 {
    now.wrapping_add(pid.as_raw() as u64)
}

/// Fans out worker processes and joins them in real termination order.
#[derive(Debug)]
pub struct Launcher<S = ForkSpawner> {
    spawner: S,
    outstanding: HashSet<WorkerHandle>,
}

impl Launcher<ForkSpawner> {
    pub fn new() -> Self {
        Self::with_spawner(ForkSpawner)
    }
}

impl Default for Launcher<ForkSpawner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Spawner> Launcher<S> {
    pub fn with_spawner(spawner: S) -> Self {
        Self {
            spawner,
            outstanding: HashSet::new(),
        }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub fn launch(&mut self, spec: &WorkerSpec) -> Result<WorkerHandle, SpawnError> {
        let handle = self.spawner.spawn(spec)?;
        self.outstanding.insert(handle);
        Ok(handle)
    }

    /// Launches every spec in order, stopping at the first failure. A
    /// failed spawn is fatal to the whole run; no retry.
    pub fn launch_all(&mut self, specs: &[WorkerSpec]) -> Result<Vec<WorkerHandle>, SpawnError> {
        specs.iter().map(|spec| self.launch(spec)).collect()
    }

    /// Blocks until any outstanding worker terminates and returns its
    /// identity and exit status. Completion order is whatever `wait`
    /// reports, not launch order.
    pub fn join_next(&mut self) -> Result<CompletionEvent, JoinError> {
        if self.outstanding.is_empty() {
            return Err(JoinError::NoOutstandingWork);
        }
        loop {
            match wait() {
                Ok(WaitStatus::Exited(pid, status)) => {
                    if self.outstanding.remove(&WorkerHandle(pid)) {
                        return Ok(CompletionEvent {
                            worker: pid,
                            status,
                        });
                    }
                }
                Ok(WaitStatus::Signaled(pid, signal, _)) => {
                    if self.outstanding.remove(&WorkerHandle(pid)) {
                        return Ok(CompletionEvent {
                            worker: pid,
                            status: 128 + signal as i32,
                        });
                    }
                }
                Ok(_) => {}
                Err(Errno::EINTR) => {}
                Err(errno) => return Err(JoinError::Wait(errno)),
            }
        }
    }

    /// Drains the outstanding set, handing each completion to `report` as
    /// soon as it is observed. Returns events in completion order; an
    /// empty set yields an empty vector without blocking.
    pub fn join_all(
        &mut self,
        mut report: impl FnMut(&CompletionEvent),
    ) -> Result<Vec<CompletionEvent>, JoinError> {
        let mut events = Vec::with_capacity(self.outstanding.len());
        while !self.outstanding.is_empty() {
            let event = self.join_next()?;
            report(&event);
            events.push(event);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedSpawner {
        spawned: i32,
        fail_after: i32,
    }

    impl Spawner for ScriptedSpawner {
        fn spawn(&mut self, _spec: &WorkerSpec) -> Result<WorkerHandle, SpawnError> {
            if self.spawned >= self.fail_after {
                return Err(SpawnError(Errno::EAGAIN));
            }
            self.spawned += 1;
            Ok(WorkerHandle(Pid::from_raw(1000 + self.spawned)))
        }
    }

    fn spec() -> WorkerSpec {
        WorkerSpec {
            iterations: 1,
            sleep_min: 0,
            sleep_max: 0,
        }
    }

    #[test]
    fn join_next_without_workers_is_an_error() {
        let mut launcher = Launcher::with_spawner(ScriptedSpawner {
            spawned: 0,
            fail_after: 0,
        });
        assert_eq!(launcher.join_next(), Err(JoinError::NoOutstandingWork));
    }

    #[test]
    fn join_all_with_no_workers_returns_nothing() {
        let mut launcher = Launcher::with_spawner(ScriptedSpawner {
            spawned: 0,
            fail_after: 0,
        });
        let mut reported = 0;
        let events = launcher.join_all(|_| reported += 1).unwrap();
        assert!(events.is_empty());
        assert_eq!(reported, 0);
    }

    #[test]
    fn launch_all_stops_at_first_spawn_failure() {
        let mut launcher = Launcher::with_spawner(ScriptedSpawner {
            spawned: 0,
            fail_after: 1,
        });
        let result = launcher.launch_all(&[spec(), spec()]);
        assert_eq!(result, Err(SpawnError(Errno::EAGAIN)));
        assert_eq!(launcher.outstanding(), 1);
    }

    #[test]
    fn drawn_iteration_counts_stay_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let spec = WorkerSpec::draw(&mut rng, (1, 20), (1, 5));
            assert!((1..=20).contains(&spec.iterations));
            assert_eq!((spec.sleep_min, spec.sleep_max), (1, 5));
        }
    }

    #[test]
    fn sibling_seeds_differ_within_the_same_second() {
        let now = 1_700_000_000;
        assert_ne!(
            worker_seed(Pid::from_raw(101), now),
            worker_seed(Pid::from_raw(102), now)
        );
    }
}
