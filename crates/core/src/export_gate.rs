use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Allows at most one export at a time.
///
/// Clones share the same state, so a gate can be handed to other threads.
#[derive(Debug, Clone, Default)]
pub struct ExportGate {
    busy: Arc<AtomicBool>,
}

impl ExportGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a permit, or `None` while another export holds one.
    pub fn try_acquire(&self) -> Option<ExportPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ExportPermit { busy: Arc::clone(&self.busy) })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Held for the duration of an export; dropping it reopens the gate.
#[derive(Debug)]
pub struct ExportPermit {
    busy: Arc<AtomicBool>,
}

impl Drop for ExportPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn second_acquire_fails_until_permit_drops() {
        let gate = ExportGate::new();

        let permit = gate.try_acquire().expect("gate starts open");
        assert!(gate.is_busy());
        assert!(gate.try_acquire().is_none());

        drop(permit);
        assert!(!gate.is_busy());
        assert!(gate.try_acquire().is_some());
    }

    #[test]
    fn only_one_thread_wins() {
        let gate = ExportGate::new();
        let barrier = Arc::new(Barrier::new(8));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let permit = gate.try_acquire();
                    barrier.wait();
                    permit.is_some()
                })
            })
            .collect();

        let winners = workers
            .into_iter()
            .map(|worker| worker.join().expect("worker joins"))
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
