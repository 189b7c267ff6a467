use std::convert::TryInto;
use std::time::{Duration, Instant};

/// Accumulates wall time over repeated passes of some piece of work, e.g. one tessellation pass per frame.
#[derive(Clone, Debug, Default)]
pub struct WorkTimer {
    total_time: Duration,
    last_time: Duration,
    passes_completed: u32,
}

impl WorkTimer {
    pub fn total_time(&self) -> Duration {
        self.total_time
    }

    pub fn last_time(&self) -> Duration {
        self.last_time
    }

    pub fn passes_completed(&self) -> u32 {
        self.passes_completed
    }

    /// Runs `f`, recording how long it took as one completed pass.
    pub fn time<T>(&mut self, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.complete_pass(start.elapsed());
        out
    }

    pub fn complete_pass(&mut self, d: Duration) {
        self.total_time += d;
        self.last_time = d;
        self.passes_completed += 1;
    }

    pub fn average_time_us(&self) -> u32 {
        let total_us: u32 = self.total_time.as_micros().try_into().unwrap_or(u32::MAX);

        total_us / self.passes_completed.max(1)
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
