//! Process lifecycle hooks

extern crate alloc;

use alloc::sync::Arc;

use log::{debug, warn};
use nos_api::ProcessId;

use crate::engine::SwapManager;
use crate::stats::ProcessPaging;

/// What [`SwapManager::on_process_destroyed`] released
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TeardownSummary {
    /// Resident-list records dropped
    pub resident_released: usize,
    /// Swap records dropped
    pub swapped_released: usize,
}

impl SwapManager {
    /// Registers a new process
    ///
    /// Counters start at zero, the swap list empty and the backing-store
    /// partition fresh. A stale registration under the same id is replaced.
    pub fn on_process_created(&self, pid: ProcessId) {
        let previous = self
            .processes
            .lock()
            .insert(pid, Arc::new(ProcessPaging::new()));
        if previous.is_some() {
            warn!("paging: {:?} registered twice, state reset", pid);
        }
        self.store.lock().create_partition(pid);
        debug!("paging: {:?} created", pid);
    }

    /// Forgets a process
    ///
    /// Its resident-list records go first so no eviction can pick one of its
    /// pages while the rest is torn down. Frames are left to the VM layer,
    /// which owns the address space being destroyed.
    pub fn on_process_destroyed(&self, pid: ProcessId) -> TeardownSummary {
        let resident_released = self.tracker.lock().remove_process(pid);

        let process = self.processes.lock().remove(&pid);
        let swapped_released = match process {
            Some(process) => process.swapped.lock().drain().len(),
            None => {
                warn!("paging: teardown of unknown {:?}", pid);
                0
            }
        };

        self.store.lock().destroy_partition(pid);

        let summary = TeardownSummary {
            resident_released,
            swapped_released,
        };
        debug!("paging: {:?} destroyed, {:?}", pid, summary);
        summary
    }
}
