//! Background worker plumbing: wake channel and request slots.

use std::sync::Arc;
use std::thread::JoinHandle;

use arc_swap::ArcSwapOption;
use crossbeam_channel::{bounded, Sender};
use parking_lot::{Condvar, Mutex};

/// A single-writer request slot: the pending request is published through
/// an atomic pointer; synchronous callers park on the completion condvar.
///
/// Abandoning a wait does not cancel the request; the worker always runs
/// it and flips the completion flag.
pub(crate) struct RequestSlot<T> {
    cell: ArcSwapOption<T>,
    done: Mutex<bool>,
    completed: Condvar,
}

impl<T> Default for RequestSlot<T> {
    fn default() -> Self {
        RequestSlot {
            cell: ArcSwapOption::empty(),
            done: Mutex::new(true),
            completed: Condvar::new(),
        }
    }
}

impl<T> RequestSlot<T> {
    /// Publish a request, replacing any not-yet-taken one.
    pub fn post(&self, request: T) -> Arc<T> {
        let request = Arc::new(request);
        *self.done.lock() = false;
        self.cell.store(Some(request.clone()));
        request
    }

    /// Claim the pending request, if any.
    pub fn take(&self) -> Option<Arc<T>> {
        self.cell.swap(None)
    }

    pub fn complete(&self) {
        *self.done.lock() = true;
        self.completed.notify_all();
    }

    /// Block until the most recent request completed.
    pub fn wait(&self) {
        let mut done = self.done.lock();
        while !*done {
            self.completed.wait(&mut done);
        }
    }
}

/// The worker thread: semaphore-woken, drains work through the `tick`
/// closure until the host drops.
pub(crate) struct Worker {
    wake: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn(name: &str, mut tick: impl FnMut() + Send + 'static) -> Worker {
        let (wake, wait) = bounded::<()>(1);
        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while wait.recv().is_ok() {
                    tick();
                }
            })
            .expect("failed to spawn worker thread");
        Worker {
            wake: Some(wake),
            thread: Some(thread),
        }
    }

    /// Wake the worker; idempotent while a wake is already pending.
    pub fn post(&self) {
        if let Some(wake) = &self.wake {
            let _ = wake.try_send(());
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // closing the channel ends the loop
        self.wake = None;
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_request_slot_roundtrip() {
        let slot: RequestSlot<u32> = RequestSlot::default();
        assert!(slot.take().is_none());

        slot.post(42);
        let taken = slot.take().unwrap();
        assert_eq!(*taken, 42);
        assert!(slot.take().is_none());
        slot.complete();
        slot.wait();
    }

    #[test]
    fn test_worker_runs_posted_work() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        let worker = Worker::spawn("test-worker", move || {
            hits2.fetch_add(1, Ordering::SeqCst);
        });

        worker.post();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while hits.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(hits.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_slot_wait_across_threads() {
        let slot: Arc<RequestSlot<String>> = Arc::new(RequestSlot::default());
        let slot2 = slot.clone();

        slot.post("work".to_string());
        let worker = std::thread::spawn(move || {
            let request = slot2.take().unwrap();
            assert_eq!(*request, "work");
            slot2.complete();
        });
        slot.wait();
        worker.join().unwrap();
    }
}
