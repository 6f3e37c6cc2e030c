use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use bevy::prelude::Resource;
use factions_schema::{
    ClaimState, FactionRecord, FactionSummaryState, RealmRecords, RealmSnapshot, SnapshotHeader,
    UserRecord,
};
use thiserror::Error;

use crate::claims::{Claim, ClaimGrid};
use crate::config::FactionsConfig;
use crate::directory::{Faction, FactionDirectory, Home, User, UserDirectory};
use crate::events::{EventBus, RealmEvent};
use crate::identity::{CellPos, FactionId, FactionPair, Timestamp, UserId};
use crate::pending::{ClaimRequest, PeaceRequest, PendingActions, UnclaimRequest, WarRequest};
use crate::permissions::Permissions;
use crate::relationships::{RelationshipEdge, RelationshipGraph};

#[derive(Debug, Error)]
pub enum RecordsError {
    #[error("duplicate faction record {0}")]
    DuplicateFaction(u32),
    #[error("duplicate user record {0}")]
    DuplicateUser(u64),
    #[error("duplicate claim record at ({x}, {z}) in {dimension}")]
    DuplicateClaim { dimension: String, x: i32, z: i32 },
}

/// Every entity store of one factions world, plus the event bus that reports
/// changes to it. All mutation happens on the simulation step that owns this
/// resource.
#[derive(Resource, Debug)]
pub struct Realm {
    pub users: UserDirectory,
    pub factions: FactionDirectory,
    pub claims: ClaimGrid,
    pub relationships: RelationshipGraph,
    pub events: EventBus,
    pub(crate) pending_claims: PendingActions<UserId, ClaimRequest>,
    pub(crate) pending_unclaims: PendingActions<UserId, UnclaimRequest>,
    pub(crate) pending_wars: PendingActions<UserId, WarRequest>,
    pub(crate) pending_peace: PendingActions<FactionPair, PeaceRequest>,
    config: Arc<FactionsConfig>,
}

impl Realm {
    pub fn new(config: Arc<FactionsConfig>) -> Self {
        let ttl = config.pending_ttl_millis();
        Self {
            users: UserDirectory::new(config.power.player_start),
            factions: FactionDirectory::default(),
            claims: ClaimGrid::default(),
            relationships: RelationshipGraph::default(),
            events: EventBus::default(),
            pending_claims: PendingActions::new(ttl),
            pending_unclaims: PendingActions::new(ttl),
            pending_wars: PendingActions::new(ttl),
            pending_peace: PendingActions::new(ttl),
            config,
        }
    }

    pub fn config(&self) -> &FactionsConfig {
        &self.config
    }

    pub fn config_handle(&self) -> Arc<FactionsConfig> {
        Arc::clone(&self.config)
    }

    #[inline]
    pub(crate) fn emit(&mut self, event: RealmEvent) {
        self.events.publish(event);
    }

    pub fn user(&self, id: UserId) -> Option<&User> {
        self.users.get(id)
    }

    /// Looks the user up, creating them with starting power on first reference.
    pub fn user_or_create(&mut self, id: UserId) -> &User {
        self.users.get_or_create(id)
    }

    pub fn faction(&self, id: FactionId) -> Option<&Faction> {
        self.factions.get(id)
    }

    pub fn faction_of(&self, user: UserId) -> Option<FactionId> {
        self.users.get(user).and_then(User::faction)
    }

    /// Sum of member power plus the admin bonus.
    pub fn faction_power(&self, faction: FactionId) -> i32 {
        let admin = self.factions.get(faction).map_or(0, |f| f.admin_power);
        self.users
            .members(faction)
            .map(|user| user.power)
            .sum::<i32>()
            + admin
    }

    pub fn faction_max_power(&self, faction: FactionId) -> i32 {
        let admin = self.factions.get(faction).map_or(0, |f| f.admin_power);
        let members = self.users.member_count(faction) as i32;
        members * self.config.power.player_max + admin
    }

    pub fn demesne(&self, faction: FactionId) -> usize {
        self.claims.demesne(faction)
    }

    pub fn claims_by_dimension(&self, faction: FactionId) -> BTreeMap<String, Vec<CellPos>> {
        self.claims.claims_by_dimension(faction)
    }

    pub fn set_online(&mut self, user: UserId, online: bool) {
        self.users.get_or_create(user).online = online;
    }

    pub fn set_bypass(&mut self, user: UserId, bypass: bool) {
        self.users.get_or_create(user).bypass = bypass;
    }

    pub fn has_bypass(&self, user: UserId) -> bool {
        self.users.get(user).map_or(false, |user| user.bypass)
    }

    pub fn pending_peace_from(&self, requester: FactionId, target: FactionId, now: Timestamp) -> bool {
        self.pending_peace
            .get(&FactionPair::new(requester, target), now)
            .map_or(false, |request| request.requester == requester)
    }

    /// Full view for an observer joining mid-session.
    pub fn observer_snapshot(&self, tick: u64) -> bincode::Result<RealmSnapshot> {
        let factions: Vec<_> = self
            .factions
            .iter()
            .map(|faction| FactionSummaryState {
                id: faction.id.0,
                name: faction.name.clone(),
                color: faction.color.clone(),
                open: faction.open,
                power: self.faction_power(faction.id),
                max_power: self.faction_max_power(faction.id),
                demesne: self.claims.demesne(faction.id) as u32,
                members: self.users.member_count(faction.id) as u32,
            })
            .collect();
        let claims: Vec<_> = self
            .claims
            .entries()
            .into_iter()
            .map(|(dimension, cell, claim)| ClaimState {
                dimension: dimension.to_string(),
                x: cell.x,
                z: cell.z,
                faction: claim.faction.0,
            })
            .collect();

        RealmSnapshot {
            header: SnapshotHeader::new(tick, factions.len(), claims.len()),
            factions,
            claims,
        }
        .finalize()
    }

    pub fn to_records(&self) -> RealmRecords {
        let factions = self
            .factions
            .iter()
            .map(|faction| FactionRecord {
                id: faction.id.0,
                name: faction.name.clone(),
                description: faction.description.clone(),
                motd: faction.motd.clone(),
                color: faction.color.clone(),
                open: faction.open,
                admin_power: faction.admin_power,
                home: faction.home.as_ref().map(Home::to_record),
                invites: faction.invites.iter().map(|user| user.0).collect(),
                relationships: self
                    .relationships
                    .edges_from(faction.id)
                    .map(|(target, edge)| edge.to_record(target))
                    .collect(),
                guest_permissions: faction.guest_permissions.kinds(),
                unclaim_cooldown_expiry: faction.unclaim_cooldown_expiry.map(Timestamp::millis),
                first_claim_confirmed: faction.first_claim_confirmed,
            })
            .collect();

        let users = self
            .users
            .ids()
            .into_iter()
            .filter_map(|id| self.users.get(id))
            .map(|user| UserRecord {
                id: user.id.0,
                faction_id: user.faction().map(|faction| faction.0),
                rank: user.faction_rank(),
                power: user.power,
                radar: user.radar,
                chat: user.chat,
                sounds: user.sounds,
                home_cooldown: user.home_cooldown.map(Timestamp::millis),
            })
            .collect();

        RealmRecords {
            factions,
            users,
            claims: self.claims.to_records(),
        }
    }

    /// Rebuilds a realm from stored records. References to missing factions
    /// are loaded as-is and left for the audit pass to reconcile.
    pub fn from_records(
        config: Arc<FactionsConfig>,
        records: &RealmRecords,
    ) -> Result<Self, RecordsError> {
        let mut realm = Realm::new(config);

        for record in &records.factions {
            if realm.factions.contains(FactionId(record.id)) {
                return Err(RecordsError::DuplicateFaction(record.id));
            }
            let mut faction = Faction::new(
                FactionId(record.id),
                record.name.clone(),
                Permissions::from_kinds(&record.guest_permissions),
            );
            faction.description = record.description.clone();
            faction.motd = record.motd.clone();
            faction.color = record.color.clone();
            faction.open = record.open;
            faction.admin_power = record.admin_power;
            faction.home = record.home.as_ref().map(Home::from_record);
            faction.invites = record.invites.iter().copied().map(UserId).collect();
            faction.unclaim_cooldown_expiry = record.unclaim_cooldown_expiry.map(Timestamp);
            faction.first_claim_confirmed = record.first_claim_confirmed;
            realm.factions.insert(faction);

            for relationship in &record.relationships {
                let (target, edge) = RelationshipEdge::from_record(relationship);
                realm.relationships.set(FactionId(record.id), target, edge);
            }
        }

        let mut seen_users = HashSet::new();
        for record in &records.users {
            if !seen_users.insert(record.id) {
                return Err(RecordsError::DuplicateUser(record.id));
            }
            let max = realm.config.power.player_max;
            let mut user = User::new(UserId(record.id), record.power.clamp(0, max));
            user.radar = record.radar;
            user.chat = record.chat;
            user.sounds = record.sounds;
            user.home_cooldown = record.home_cooldown.map(Timestamp);
            realm.users.insert(user);
            if let Some(faction) = record.faction_id {
                let rank = record.rank.unwrap_or(factions_schema::Rank::Member);
                realm
                    .users
                    .set_membership(UserId(record.id), FactionId(faction), rank);
            }
        }

        for record in &records.claims {
            let cell = CellPos::new(record.x, record.z);
            if realm.claims.get(&record.dimension, cell).is_some() {
                return Err(RecordsError::DuplicateClaim {
                    dimension: record.dimension.clone(),
                    x: record.x,
                    z: record.z,
                });
            }
            realm.claims.insert(
                &record.dimension,
                cell,
                Claim {
                    faction: FactionId(record.faction_id),
                    access_level: record.access_level,
                },
            );
        }

        Ok(realm)
    }
}
