//! Diff planning.
//!
//! A [`Plan`] is the ordered list of remote calls that moves a resource from its
//! prior canonical state to the desired state. Ordering is structural: the
//! builder keeps one bucket per phase and concatenates them, so a detach always
//! precedes an attach and tag updates always come last.

use std::collections::BTreeSet;
use std::fmt;

use crate::client::{AttachmentRef, AttachmentSpec};
use crate::field::{Allocation, Field};
use crate::resource::{Attribute, lookup};
use crate::set::UnorderedSet;
use crate::tags::{TagDelta, TagSet};

/// One remote mutating call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation<D> {
    Detach { attachment: AttachmentRef },
    Attach { parent_id: String, slot: u32 },
    Mutate(D),
    UpdateTags(TagDelta),
}

impl<D> Operation<D> {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Detach { .. } => "detach",
            Operation::Attach { .. } => "attach",
            Operation::Mutate(_) => "mutate",
            Operation::UpdateTags(_) => "update_tags",
        }
    }
}

impl<D: fmt::Display> fmt::Display for Operation<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Detach { attachment } => write!(
                f,
                "detach {} from {}",
                attachment.attachment_id, attachment.parent_id
            ),
            Operation::Attach { parent_id, slot } => {
                write!(f, "attach to {} at slot {}", parent_id, slot)
            }
            Operation::Mutate(delta) => write!(f, "{}", delta),
            Operation::UpdateTags(delta) => write!(
                f,
                "update tags (+{} -{})",
                delta.upsert.len(),
                delta.remove.len()
            ),
        }
    }
}

/// Ordered operations plus any attributes whose change forces replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan<D> {
    operations: Vec<Operation<D>>,
    replace: Vec<&'static str>,
}

impl<D> Plan<D> {
    pub fn builder() -> PlanBuilder<D> {
        PlanBuilder::default()
    }

    pub fn operations(&self) -> &[Operation<D>] {
        &self.operations
    }

    pub fn into_operations(self) -> Vec<Operation<D>> {
        self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// No calls and no replacement: the resource has converged.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty() && self.replace.is_empty()
    }

    pub fn requires_replacement(&self) -> &[&'static str] {
        &self.replace
    }
}

pub struct PlanBuilder<D> {
    detach: Vec<AttachmentRef>,
    attach: Vec<AttachmentSpec>,
    mutate: Vec<D>,
    tags: Option<TagDelta>,
    replace: Vec<&'static str>,
}

impl<D> Default for PlanBuilder<D> {
    fn default() -> Self {
        Self {
            detach: Vec::new(),
            attach: Vec::new(),
            mutate: Vec::new(),
            tags: None,
            replace: Vec::new(),
        }
    }
}

impl<D> PlanBuilder<D> {
    /// Record a change to a force-new attribute of `schema`. Changes to
    /// attributes without the flag are ignored here.
    pub fn replace_if(&mut self, schema: &'static [Attribute], name: &'static str, changed: bool) {
        let force_new = lookup(schema, name).is_some_and(|a| a.force_new);
        if changed && force_new && !self.replace.contains(&name) {
            self.replace.push(name);
        }
    }

    /// Plan the single-slot attachment relation: release the old one (if it no
    /// longer matches) before establishing the new one.
    pub fn attachment(&mut self, prior: Option<&AttachmentRef>, desired: Option<&AttachmentSpec>) {
        match (prior, desired) {
            (Some(current), Some(spec)) if current.satisfies(spec) => {}
            (current, spec) => {
                if let Some(current) = current {
                    self.detach.push(current.clone());
                }
                if let Some(spec) = spec {
                    self.attach.push(spec.clone());
                }
            }
        }
    }

    pub fn mutate(&mut self, delta: D) {
        self.mutate.push(delta);
    }

    pub fn mutate_all(&mut self, deltas: impl IntoIterator<Item = D>) {
        self.mutate.extend(deltas);
    }

    /// Plan a tag update from the prior effective tags to the new ones.
    pub fn tags(&mut self, prior_all: &TagSet, desired_all: &TagSet) {
        let delta = prior_all.delta_to(desired_all);
        self.tags = (!delta.is_empty()).then_some(delta);
    }

    pub fn build(self) -> Plan<D> {
        let mut operations = Vec::with_capacity(
            self.detach.len() + self.attach.len() + self.mutate.len() + 1,
        );
        operations.extend(
            self.detach
                .into_iter()
                .map(|attachment| Operation::Detach { attachment }),
        );
        operations.extend(self.attach.into_iter().map(|spec| Operation::Attach {
            parent_id: spec.parent_id,
            slot: spec.slot,
        }));
        operations.extend(self.mutate.into_iter().map(Operation::Mutate));
        operations.extend(self.tags.map(Operation::UpdateTags));
        Plan {
            operations,
            replace: self.replace,
        }
    }
}

/// Change to one list-or-count collection attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationChange {
    Unassign(Vec<String>),
    Assign(Vec<String>),
    AssignCount(u32),
}

/// Diff a collection attribute against its desired allocation.
///
/// An explicit list yields unassign-then-assign of the symmetric difference. A
/// count yields a single assign-N or unassign of the first N current members.
/// The two modes never mix: the desired value holds exactly one of them.
pub fn allocation_changes(
    current: &UnorderedSet<String>,
    desired: &Field<Allocation>,
) -> Vec<AllocationChange> {
    match desired {
        Field::Unset => Vec::new(),
        Field::Cleared => explicit_changes(current, &BTreeSet::new()),
        Field::Set(Allocation::Explicit(items)) => explicit_changes(current, items),
        Field::Set(Allocation::Derived(count)) => {
            let have = current.len();
            let want = *count as usize;
            if want > have {
                let missing = u32::try_from(want - have).unwrap_or(u32::MAX);
                vec![AllocationChange::AssignCount(missing)]
            } else if want < have {
                vec![AllocationChange::Unassign(current.first(have - want))]
            } else {
                Vec::new()
            }
        }
    }
}

fn explicit_changes(
    current: &UnorderedSet<String>,
    desired: &BTreeSet<String>,
) -> Vec<AllocationChange> {
    let mut changes = Vec::new();
    let removed = current.missing_from(desired);
    if !removed.is_empty() {
        changes.push(AllocationChange::Unassign(removed));
    }
    let added: Vec<String> = desired
        .iter()
        .filter(|item| !current.contains(item))
        .cloned()
        .collect();
    if !added.is_empty() {
        changes.push(AllocationChange::Assign(added));
    }
    changes
}
