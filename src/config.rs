//! Worker configuration.
//!
//! Modeled after the teacher's `ListenerConfig` (`listener.rs` in the source
//! material), generalized to the keys this crate recognizes (§6) and stripped
//! of the TLS/port fields that belonged to the HTTP-specific listener.
//!
//! Loading these values from a file or environment is out of scope: the
//! parent I/O system is expected to hand the worker an already-populated,
//! already-validated `WorkerConfig`.

use std::time::Duration;

const KIB: usize = 1024;
const MIB: usize = 1024 * KIB;

/// Recognized configuration for one [`Worker`](crate::worker::Worker).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Worker count for the parent I/O system; this crate does not itself
    /// spawn workers, but carries the field so a parent reading `num-workers`
    /// has one place to find it.
    pub num_workers: usize,
    /// Selector poll ceiling. Default 1 ms.
    pub select_timeout: Duration,
    /// Period between idle sweeps.
    pub idle_check_frequency: Duration,
    /// Default per-connection idle ceiling. `None` means no timeout.
    pub max_idle_time: Option<Duration>,
    /// Per-worker read buffer size in bytes.
    pub read_buffer_size: usize,
    /// Per-worker dynamic output buffer ceiling in bytes.
    pub output_buffer_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            num_workers: num_cpus(),
            select_timeout: Duration::from_millis(1),
            idle_check_frequency: Duration::from_secs(5),
            max_idle_time: Some(Duration::from_secs(60)),
            read_buffer_size: 128 * KIB,
            output_buffer_size: 4 * MIB,
        }
    }
}

impl WorkerConfig {
    /// Validates the configuration, rejecting combinations that would make
    /// the worker unable to function (e.g. a zero-sized read buffer, which
    /// would make every read a no-op and livelock the loop).
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.read_buffer_size == 0 {
            return Err("read-buffer-size must be greater than zero");
        }
        if self.output_buffer_size == 0 {
            return Err("output-buffer-size must be greater than zero");
        }
        if self.idle_check_frequency.is_zero() {
            return Err("idle-check-frequency must be greater than zero");
        }
        Ok(())
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
