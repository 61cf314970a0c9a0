/// A delayed reaction that has been initiated but not yet applied.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScheduledCompletion {
    pub time: f64,
    pub reaction: usize,
}

/// Pending delayed completions ordered by completion time.
///
/// Entries that share a completion time keep their insertion order.
#[derive(Clone, Debug, Default)]
pub struct DelaySchedule {
    entries: Vec<ScheduledCompletion>,
}

impl DelaySchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, time: f64, reaction: usize) {
        debug_assert!(time.is_finite());
        let pos = self.entries.partition_point(|entry| entry.time <= time);
        self.entries.insert(pos, ScheduledCompletion { time, reaction });
    }

    pub fn peek(&self) -> Option<&ScheduledCompletion> {
        self.entries.first()
    }

    /// Removes and returns the earliest completion at or before `until`.
    pub fn pop_due(&mut self, until: f64) -> Option<ScheduledCompletion> {
        match self.entries.first() {
            Some(entry) if entry.time <= until => Some(self.entries.remove(0)),
            _ => None,
        }
    }

    /// Completions in `(after, until]`, earliest first. Read-only view for
    /// callers inspecting what is still pending; the engine itself consumes
    /// entries through [`Self::pop_due`].
    pub fn within(&self, after: f64, until: f64) -> impl Iterator<Item = &ScheduledCompletion> {
        let start = self.entries.partition_point(|entry| entry.time <= after);
        self.entries[start..]
            .iter()
            .take_while(move |entry| entry.time <= until)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
