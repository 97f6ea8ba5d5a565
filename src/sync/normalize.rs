//! Snapshot normalization
//!
//! Two observations of the same controller state differ in counters and
//! timestamps. The projections here strip those fields so that structural
//! equality of the results means "same decision input".
//!
//! * comparison projection: used for change detection and cross-controller
//!   agreement. Drops flow counters and the controller-assigned flow `id`,
//!   and the topology `time`.
//! * insertion projection: used before pushing state into a controller.
//!   Additionally drops `tableId` and `groupId` so the target assigns its own.
//!
//! Both projections are pure and idempotent.

use crate::model::{Divergence, FlowEntry, FlowSet, HostSet, TopologySnapshot};

pub trait Normalize: Sized {
    /// Comparison projection
    fn normalized(&self) -> Self;

    /// Insertion projection
    fn for_insertion(&self) -> Self;

    /// Describe how two already-normalized values differ, `None` if equal
    fn divergence(&self, other: &Self) -> Option<Divergence>;
}

/// `normalize(a) == normalize(b)`
pub fn semantically_equal<T: Normalize + PartialEq>(a: &T, b: &T) -> bool {
    a.normalized() == b.normalized()
}

fn strip_volatile(flow: &mut FlowEntry) {
    flow.life = None;
    flow.packets = None;
    flow.bytes = None;
    flow.last_seen = None;
    flow.id = None;
}

/// Order-sensitive comparison of two entry sequences
fn sequence_divergence<T: PartialEq>(primary: &[T], backup: &[T]) -> Option<Divergence> {
    if primary.len() != backup.len() {
        return Some(Divergence::LengthMismatch {
            primary: primary.len(),
            backup: backup.len(),
        });
    }
    primary
        .iter()
        .zip(backup)
        .position(|(a, b)| a != b)
        .map(|index| Divergence::EntryMismatch { index })
}

impl Normalize for FlowSet {
    fn normalized(&self) -> Self {
        let mut out = self.clone();
        out.flows.iter_mut().for_each(strip_volatile);
        out
    }

    fn for_insertion(&self) -> Self {
        let mut out = self.normalized();
        for flow in &mut out.flows {
            flow.table_id = None;
            flow.group_id = None;
        }
        out
    }

    fn divergence(&self, other: &Self) -> Option<Divergence> {
        sequence_divergence(&self.flows, &other.flows)
    }
}

impl Normalize for HostSet {
    fn normalized(&self) -> Self {
        self.clone()
    }

    fn for_insertion(&self) -> Self {
        self.clone()
    }

    fn divergence(&self, other: &Self) -> Option<Divergence> {
        sequence_divergence(&self.hosts, &other.hosts)
    }
}

impl Normalize for TopologySnapshot {
    fn normalized(&self) -> Self {
        Self {
            time: None,
            ..self.clone()
        }
    }

    fn for_insertion(&self) -> Self {
        self.normalized()
    }

    fn divergence(&self, other: &Self) -> Option<Divergence> {
        (self != other).then_some(Divergence::ContentMismatch)
    }
}
