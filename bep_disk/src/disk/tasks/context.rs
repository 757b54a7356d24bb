use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::sink::Wait;
use futures::sync::mpsc::Sender;
use futures::task::Task;
use futures::Sink;

use crate::disk::fs::cache::file_handle::FileHandleCache;
use crate::disk::fs::FileSystem;
use crate::disk::OFsMessage;

/// Shared state between the manager sink and the worker tasks.
pub struct FsManagerContext<F>
where
    F: FileSystem,
{
    out: Sender<OFsMessage>,
    fs: Arc<FileHandleCache<F>>,
    pending: Arc<AtomicUsize>,
    max_pending: usize,
    blocked: Arc<Mutex<Vec<Task>>>,
}

impl<F> FsManagerContext<F>
where
    F: FileSystem,
{
    pub fn new(
        out: Sender<OFsMessage>,
        fs: F,
        handle_capacity: usize,
        max_pending: usize,
    ) -> FsManagerContext<F> {
        FsManagerContext {
            out,
            fs: Arc::new(FileHandleCache::new(fs, handle_capacity)),
            pending: Arc::new(AtomicUsize::new(0)),
            max_pending,
            blocked: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn blocking_sender(&self) -> Wait<Sender<OFsMessage>> {
        self.out.clone().wait()
    }

    pub fn filesystem(&self) -> &FileHandleCache<F> {
        &self.fs
    }

    /// Try to reserve a pending-work slot; the write-request budget.
    pub fn try_submit_work(&self, task: Task) -> bool {
        let mut count = self.pending.load(Ordering::SeqCst);
        loop {
            if count >= self.max_pending {
                self.blocked
                    .lock()
                    .expect("bep_disk: Failed To Lock Blocked Tasks In try_submit_work")
                    .push(task.clone());

                // Re-check in case a slot freed while we stashed
                if self.pending.load(Ordering::SeqCst) >= self.max_pending {
                    return false;
                }
                count = self.pending.load(Ordering::SeqCst);
                continue;
            }

            match self.pending.compare_exchange(
                count,
                count + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(actual) => count = actual,
            }
        }
    }

    /// Release a pending-work slot and wake one blocked sender.
    pub fn complete_work(&self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);

        let notify = self
            .blocked
            .lock()
            .expect("bep_disk: Failed To Lock Blocked Tasks In complete_work")
            .pop();
        if let Some(task) = notify {
            task.notify();
        }
    }

    /// Pending-work slots currently in use.
    pub fn pending_work(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

impl<F> Clone for FsManagerContext<F>
where
    F: FileSystem,
{
    fn clone(&self) -> FsManagerContext<F> {
        FsManagerContext {
            out: self.out.clone(),
            fs: self.fs.clone(),
            pending: self.pending.clone(),
            max_pending: self.max_pending,
            blocked: self.blocked.clone(),
        }
    }
}
