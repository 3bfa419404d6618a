pub const NUM_WORKERS: usize = 2;

pub const ITERATIONS_MIN: u32 = 1;
pub const ITERATIONS_MAX: u32 = 20;

pub const SLEEP_SECS_MIN: u64 = 1;
pub const SLEEP_SECS_MAX: u64 = 5;

pub const COUNT_DEMO_ITERATIONS: u32 = 30;
