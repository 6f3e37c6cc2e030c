use std::collections::{BTreeMap, HashMap};

use factions_schema::{RelationshipRecord, RelationshipStatus};

use crate::identity::FactionId;
use crate::permissions::Permissions;

/// One faction's view of another.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelationshipEdge {
    pub status: RelationshipStatus,
    pub permissions: Permissions,
}

impl RelationshipEdge {
    pub fn new(status: RelationshipStatus, permissions: Permissions) -> Self {
        Self {
            status,
            permissions,
        }
    }

    /// Neutral edges without grants carry no information and are not stored.
    #[inline]
    pub fn is_default(&self) -> bool {
        self.status == RelationshipStatus::Neutral && self.permissions.is_empty()
    }

    pub fn to_record(&self, target: FactionId) -> RelationshipRecord {
        RelationshipRecord {
            target: target.0,
            status: self.status,
            permissions: self.permissions.kinds(),
        }
    }

    pub fn from_record(record: &RelationshipRecord) -> (FactionId, Self) {
        (
            FactionId(record.target),
            Self::new(record.status, Permissions::from_kinds(&record.permissions)),
        )
    }
}

/// Directional edges between factions. Mutuality is derived by reading both
/// directions; it is never stored.
#[derive(Debug, Default)]
pub struct RelationshipGraph {
    edges: HashMap<FactionId, BTreeMap<FactionId, RelationshipEdge>>,
}

impl RelationshipGraph {
    /// Stored edge, or a synthesized Neutral edge with no permissions.
    pub fn get(&self, source: FactionId, target: FactionId) -> RelationshipEdge {
        self.edges
            .get(&source)
            .and_then(|targets| targets.get(&target))
            .copied()
            .unwrap_or_default()
    }

    #[inline]
    pub fn status(&self, source: FactionId, target: FactionId) -> RelationshipStatus {
        self.get(source, target).status
    }

    pub fn is_mutual(&self, a: FactionId, b: FactionId, status: RelationshipStatus) -> bool {
        self.status(a, b) == status && self.status(b, a) == status
    }

    /// Status both directions agree on, if they agree.
    pub fn mutual_status(&self, a: FactionId, b: FactionId) -> Option<RelationshipStatus> {
        let forward = self.status(a, b);
        (forward == self.status(b, a)).then_some(forward)
    }

    pub fn either_at_war(&self, a: FactionId, b: FactionId) -> bool {
        self.status(a, b) == RelationshipStatus::War || self.status(b, a) == RelationshipStatus::War
    }

    pub fn set(&mut self, source: FactionId, target: FactionId, edge: RelationshipEdge) {
        if edge.is_default() {
            if let Some(targets) = self.edges.get_mut(&source) {
                targets.remove(&target);
                if targets.is_empty() {
                    self.edges.remove(&source);
                }
            }
            return;
        }
        self.edges.entry(source).or_default().insert(target, edge);
    }

    /// Rewrites the status of `source -> target`, keeping its permissions.
    pub fn set_status(&mut self, source: FactionId, target: FactionId, status: RelationshipStatus) {
        let mut edge = self.get(source, target);
        edge.status = status;
        self.set(source, target, edge);
    }

    pub fn set_permissions(
        &mut self,
        source: FactionId,
        target: FactionId,
        permissions: Permissions,
    ) {
        let mut edge = self.get(source, target);
        edge.permissions = permissions;
        self.set(source, target, edge);
    }

    pub fn edges_from(
        &self,
        source: FactionId,
    ) -> impl Iterator<Item = (FactionId, RelationshipEdge)> + '_ {
        self.edges
            .get(&source)
            .into_iter()
            .flat_map(|targets| targets.iter().map(|(target, edge)| (*target, *edge)))
    }

    /// Every stored `(source, target)` pair.
    pub fn pairs(&self) -> Vec<(FactionId, FactionId)> {
        let mut pairs: Vec<_> = self
            .edges
            .iter()
            .flat_map(|(source, targets)| targets.keys().map(move |target| (*source, *target)))
            .collect();
        pairs.sort();
        pairs
    }

    pub fn remove(&mut self, source: FactionId, target: FactionId) -> Option<RelationshipEdge> {
        let targets = self.edges.get_mut(&source)?;
        let removed = targets.remove(&target);
        if targets.is_empty() {
            self.edges.remove(&source);
        }
        removed
    }

    /// Drops every edge pointing at `target`. Returns how many were removed.
    pub fn remove_edges_to(&mut self, target: FactionId) -> usize {
        let mut removed = 0;
        self.edges.retain(|_, targets| {
            if targets.remove(&target).is_some() {
                removed += 1;
            }
            !targets.is_empty()
        });
        removed
    }

    pub fn remove_edges_from(&mut self, source: FactionId) -> usize {
        self.edges.remove(&source).map_or(0, |targets| targets.len())
    }
}
