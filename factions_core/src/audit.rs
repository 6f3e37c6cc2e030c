//! Periodic reconciliation of data-integrity defects.
//!
//! Live requests never fail because of dangling references; the audit pass
//! repairs them instead and reports what it touched.

use std::collections::BTreeSet;

use factions_schema::Rank;
use serde::Serialize;

use crate::events::RealmEvent;
use crate::identity::{FactionId, UserId};
use crate::realm::Realm;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    /// Users whose faction no longer exists.
    pub cleared_memberships: Vec<UserId>,
    /// Factions disbanded because no member holds Owner rank.
    pub dissolved: Vec<FactionId>,
    pub dropped_edges: usize,
    pub dropped_claims: usize,
    pub cleared_homes: Vec<FactionId>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.cleared_memberships.is_empty()
            && self.dissolved.is_empty()
            && self.dropped_edges == 0
            && self.dropped_claims == 0
            && self.cleared_homes.is_empty()
    }
}

impl Realm {
    pub fn audit(&mut self) -> AuditReport {
        let mut report = AuditReport::default();

        for id in self.users.ids() {
            let dangling = self
                .users
                .get(id)
                .and_then(|user| user.faction())
                .filter(|faction| !self.factions.contains(*faction));
            if let Some(faction) = dangling {
                self.users.clear_membership(id);
                tracing::warn!(
                    target: "factions::audit",
                    user = %id,
                    faction = %faction,
                    "audit.membership_cleared"
                );
                report.cleared_memberships.push(id);
            }
        }

        let ownerless: Vec<FactionId> = self
            .factions
            .ids()
            .into_iter()
            .filter(|faction| {
                !self
                    .users
                    .members(*faction)
                    .any(|user| user.rank == Rank::Owner)
            })
            .collect();
        for faction in ownerless {
            tracing::warn!(
                target: "factions::audit",
                faction = %faction,
                "audit.ownerless_faction"
            );
            if self.dissolve(faction).is_some() {
                report.dissolved.push(faction);
            }
        }

        let referenced: BTreeSet<FactionId> = self
            .relationships
            .pairs()
            .into_iter()
            .flat_map(|(source, target)| [source, target])
            .collect();
        for faction in referenced {
            if self.factions.contains(faction) {
                continue;
            }
            let dropped = self.relationships.remove_edges_from(faction)
                + self.relationships.remove_edges_to(faction);
            tracing::warn!(
                target: "factions::audit",
                faction = %faction,
                dropped,
                "audit.dangling_edges_dropped"
            );
            report.dropped_edges += dropped;
        }

        let orphaned: Vec<(String, _)> = self
            .claims
            .entries()
            .into_iter()
            .filter(|(_, _, claim)| !self.factions.contains(claim.faction))
            .map(|(dimension, cell, _)| (dimension.to_string(), cell))
            .collect();
        for (dimension, cell) in orphaned {
            if let Some(claim) = self.claims.remove(&dimension, cell) {
                tracing::warn!(
                    target: "factions::audit",
                    dimension = %dimension,
                    cell = %cell,
                    faction = %claim.faction,
                    "audit.orphaned_claim_released"
                );
                self.emit(RealmEvent::ClaimRemoved {
                    dimension,
                    x: cell.x,
                    z: cell.z,
                    faction: None,
                });
                report.dropped_claims += 1;
            }
        }

        for faction in self.factions.ids() {
            let invalid_home = self
                .factions
                .get(faction)
                .and_then(|entry| entry.home.as_ref())
                .map_or(false, |home| {
                    !self.config().is_dimension_claimable(&home.dimension)
                });
            if !invalid_home {
                continue;
            }
            if let Some(entry) = self.factions.get_mut(faction) {
                entry.home = None;
            }
            tracing::warn!(
                target: "factions::audit",
                faction = %faction,
                "audit.home_cleared"
            );
            self.emit(RealmEvent::FactionModified { faction });
            report.cleared_homes.push(faction);
        }

        if !report.is_clean() {
            tracing::info!(
                target: "factions::audit",
                memberships = report.cleared_memberships.len(),
                dissolved = report.dissolved.len(),
                edges = report.dropped_edges,
                claims = report.dropped_claims,
                homes = report.cleared_homes.len(),
                "audit.completed"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use factions_schema::RelationshipStatus;

    use super::*;
    use crate::claims::Claim;
    use crate::config::FactionsConfig;
    use crate::directory::{Faction, Home};
    use crate::identity::CellPos;
    use crate::permissions::Permissions;

    fn realm_with(config: FactionsConfig) -> Realm {
        let mut realm = Realm::new(Arc::new(config));
        for (id, name) in [(FactionId(1), "north"), (FactionId(2), "south")] {
            realm
                .factions
                .insert(Faction::new(id, name, Permissions::empty()));
            realm.users.set_membership(UserId(u64::from(id.0)), id, Rank::Owner);
        }
        realm
    }

    fn home(dimension: &str) -> Home {
        Home {
            dimension: dimension.to_string(),
            x: 0.0,
            y: 64.0,
            z: 0.0,
            yaw: 0.0,
            pitch: 0.0,
        }
    }

    #[test]
    fn healthy_realm_is_untouched() {
        let mut realm = realm_with(FactionsConfig::default());
        realm
            .relationships
            .set_status(FactionId(1), FactionId(2), RelationshipStatus::Friendly);
        assert!(realm.audit().is_clean());
        assert!(realm.events.pending().is_empty());
    }

    #[test]
    fn ownerless_faction_is_dissolved() {
        let mut realm = realm_with(FactionsConfig::default());
        realm.users.set_membership(UserId(5), FactionId(2), Rank::Leader);
        realm.users.set_membership(UserId(2), FactionId(2), Rank::Leader);
        realm
            .claims
            .insert("overworld", CellPos::new(3, 3), Claim::new(FactionId(2)));
        realm
            .relationships
            .set_status(FactionId(1), FactionId(2), RelationshipStatus::War);

        let report = realm.audit();
        assert_eq!(report.dissolved, vec![FactionId(2)]);
        assert!(realm.faction(FactionId(2)).is_none());
        assert_eq!(realm.faction_of(UserId(5)), None);
        assert_eq!(realm.demesne(FactionId(2)), 0);
        assert!(realm.relationships.pairs().is_empty());
        assert!(realm
            .events
            .pending()
            .iter()
            .any(|event| matches!(event, RealmEvent::FactionDisbanded { .. })));
    }

    #[test]
    fn dangling_references_are_reconciled() {
        let mut realm = realm_with(FactionsConfig::default());
        let ghost = FactionId(40);
        realm.users.set_membership(UserId(7), ghost, Rank::Member);
        realm
            .relationships
            .set_status(FactionId(1), ghost, RelationshipStatus::Ally);
        realm
            .relationships
            .set_status(ghost, FactionId(2), RelationshipStatus::War);
        realm
            .claims
            .insert("overworld", CellPos::new(0, 0), Claim::new(ghost));

        let report = realm.audit();
        assert_eq!(report.cleared_memberships, vec![UserId(7)]);
        assert_eq!(report.dropped_edges, 2);
        assert_eq!(report.dropped_claims, 1);
        assert!(report.dissolved.is_empty());
        assert_eq!(realm.claims.owner("overworld", CellPos::new(0, 0)), None);
        assert!(realm.events.pending().contains(&RealmEvent::ClaimRemoved {
            dimension: "overworld".to_string(),
            x: 0,
            z: 0,
            faction: None,
        }));
        assert!(realm.audit().is_clean());
    }

    #[test]
    fn home_outside_claimable_dimensions_is_cleared() {
        let mut config = FactionsConfig::default();
        config.claim.allowed_dimensions = vec!["overworld".to_string()];
        let mut realm = realm_with(config);
        if let Some(faction) = realm.factions.get_mut(FactionId(1)) {
            faction.home = Some(home("the_end"));
        }
        if let Some(faction) = realm.factions.get_mut(FactionId(2)) {
            faction.home = Some(home("overworld"));
        }

        let report = realm.audit();
        assert_eq!(report.cleared_homes, vec![FactionId(1)]);
        assert!(realm.faction(FactionId(1)).and_then(|f| f.home.as_ref()).is_none());
        assert!(realm.faction(FactionId(2)).and_then(|f| f.home.as_ref()).is_some());
    }
}
