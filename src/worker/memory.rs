use sysinfo::{ProcessesToUpdate, System};
use tracing::{debug, info};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Resident set size of the current process in MB, if it can be read
pub fn current_rss_mb() -> Option<f64> {
    let pid = sysinfo::get_current_pid().ok()?;
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system
        .process(pid)
        .map(|process| process.memory() as f64 / BYTES_PER_MB)
}

/// Log the current memory usage under a checkpoint label
pub fn log_memory_checkpoint(label: &str) {
    match current_rss_mb() {
        Some(mb) => info!("Memory usage {}: {:.2} MB", label, mb),
        None => debug!("Memory usage {}: unavailable", label),
    }
}
