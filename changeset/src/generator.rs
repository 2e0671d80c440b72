use crate::{Change, ChangeSet};

/// Groups a stream of file changes into changesets.
///
/// Input changes must arrive in non-decreasing timestamp order; the metadata
/// store's timestamp-ordered iteration provides that. The generator keeps an
/// ordered set of open changesets and only emits a changeset once a later
/// change proves it has been quiet for at least `quiet_period` seconds, so a
/// commit that was still in flight when the CVS mirror was synced is never
/// emitted half-complete.
#[derive(Debug)]
pub struct ChangeSetGenerator {
    quiet_period: i64,
    open: Vec<ChangeSet>,
}

impl ChangeSetGenerator {
    pub fn new(quiet_period: i64) -> Self {
        Self {
            quiet_period,
            open: Vec::new(),
        }
    }

    /// Integrates one change and returns the changesets that its timestamp
    /// proved complete, in arrival order.
    pub fn integrate(&mut self, change: Change) -> Vec<ChangeSet> {
        // Close every open changeset that has been quiet long enough.
        let mut closed = Vec::new();
        let mut open = Vec::with_capacity(self.open.len());
        for cs in self.open.drain(..) {
            if change.timestamp - cs.end_time >= self.quiet_period {
                closed.push(cs);
            } else {
                open.push(cs);
            }
        }
        self.open = open;

        // First matching open changeset wins; deterministic given input
        // order.
        let mut change = change;
        for cs in self.open.iter_mut() {
            match cs.integrate(change) {
                Ok(()) => return closed,
                Err(rejected) => change = rejected,
            }
        }

        self.open.push(ChangeSet::new(change));
        closed
    }

    /// Emits all remaining open changesets in arrival order.
    pub fn flush(&mut self) -> Vec<ChangeSet> {
        self.open.drain(..).collect()
    }

    /// Emits the open changesets that have passed the quiet period relative
    /// to `now`, keeping the rest for a later run.
    ///
    /// The held-back changes stay free in the store and are re-grouped on the
    /// next pull, by which time the rest of their commit may have arrived.
    pub fn flush_quiescent(&mut self, now: i64) -> Vec<ChangeSet> {
        let mut closed = Vec::new();
        let mut open = Vec::with_capacity(self.open.len());
        for cs in self.open.drain(..) {
            if now - cs.end_time >= self.quiet_period {
                closed.push(cs);
            } else {
                log::debug!(
                    "holding back changeset by {} within the quiet period",
                    cs.author()
                );
                open.push(cs);
            }
        }
        self.open = open;
        closed
    }

    /// Number of changesets still open.
    pub fn pending(&self) -> usize {
        self.open.len()
    }
}
