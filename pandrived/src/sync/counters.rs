use std::sync::Mutex;

#[derive(Debug, Default)]
struct Counts {
    local_changed: u32,
    pan_changed: u32,
    action_pending: u32,
}

/// The three modification counters that let the differ and executor loops
/// sleep when there is provably no work. Walkers bump the folder counters on
/// every scan that observed change; each differ decrements once per complete
/// sweep, the executor once per empty drain attempt. Clamped at zero;
/// correctness never depends on exact values.
#[derive(Debug)]
pub struct ModificationCounters {
    inner: Mutex<Counts>,
}

impl ModificationCounters {
    /// Counters start at one so the first sweep after start always runs.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Counts {
                local_changed: 1,
                pan_changed: 1,
                action_pending: 1,
            }),
        }
    }

    pub fn add_local_changed(&self) {
        let mut counts = self.lock();
        counts.local_changed += 1;
    }

    pub fn sub_local_changed(&self) {
        let mut counts = self.lock();
        counts.local_changed = counts.local_changed.saturating_sub(1);
    }

    pub fn local_changed(&self) -> u32 {
        self.lock().local_changed
    }

    pub fn add_pan_changed(&self) {
        let mut counts = self.lock();
        counts.pan_changed += 1;
    }

    pub fn sub_pan_changed(&self) {
        let mut counts = self.lock();
        counts.pan_changed = counts.pan_changed.saturating_sub(1);
    }

    pub fn pan_changed(&self) -> u32 {
        self.lock().pan_changed
    }

    pub fn add_action_pending(&self) {
        let mut counts = self.lock();
        counts.action_pending += 1;
    }

    pub fn sub_action_pending(&self) {
        let mut counts = self.lock();
        counts.action_pending = counts.action_pending.saturating_sub(1);
    }

    pub fn action_pending(&self) -> u32 {
        self.lock().action_pending
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counts> {
        self.inner.lock().expect("counters mutex poisoned")
    }
}

impl Default for ModificationCounters {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_one() {
        let counters = ModificationCounters::new();
        assert_eq!(counters.local_changed(), 1);
        assert_eq!(counters.pan_changed(), 1);
        assert_eq!(counters.action_pending(), 1);
    }

    #[test]
    fn decrement_clamps_at_zero() {
        let counters = ModificationCounters::new();
        counters.sub_local_changed();
        counters.sub_local_changed();
        assert_eq!(counters.local_changed(), 0);

        counters.add_local_changed();
        assert_eq!(counters.local_changed(), 1);
    }
}
