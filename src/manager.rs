use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::db::WordBattleDb;

/// Runtime sizing picked from the host at startup.
#[derive(Debug, Clone)]
pub struct SystemProfile {
    pub logical_cores: usize,
    pub worker_threads: usize,
    pub strict_durability: bool, // true = fsync every commit, false = OS buffer
}

impl SystemProfile {
    pub fn detect() -> Self {
        let cores = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);

        // Single core: requests are oracle-bound, keep one I/O thread spare
        // and skip fsync.
        if cores <= 1 {
            warn!(cores, "single core detected, disabling fsync");
            Self {
                logical_cores: cores,
                worker_threads: 2,
                strict_durability: false,
            }
        } else {
            Self {
                logical_cores: cores,
                worker_threads: cores,
                strict_durability: true,
            }
        }
    }
}

/// Compacts the store every `interval`, keeping only the latest entry per key.
pub fn start_compaction_thread(db: Arc<WordBattleDb>, interval: Duration) {
    thread::spawn(move || {
        info!(interval_secs = interval.as_secs(), "background compaction started");
        loop {
            thread::sleep(interval);
            if let Err(e) = db.compact() {
                warn!(error = %e, "compaction failed");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_has_at_least_one_worker() {
        let p = SystemProfile::detect();
        assert!(p.worker_threads >= 1);
        assert!(p.logical_cores >= 1);
    }
}
