//! Faction lifecycle: founding, joining, leaving, ranks, profile and
//! dissolution.

use factions_schema::{PermissionKind, Rank};
use thiserror::Error;

use crate::directory::{Faction, Home};
use crate::events::RealmEvent;
use crate::identity::{FactionId, UserId};
use crate::permissions::Permissions;
use crate::realm::Realm;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MembershipError {
    #[error("faction {0} does not exist")]
    UnknownFaction(FactionId),
    #[error("you are not in a faction")]
    NotInFaction,
    #[error("you are already in a faction")]
    AlreadyInFaction,
    #[error("requires rank {required} or higher")]
    InsufficientRank { required: Rank },
    #[error("faction name cannot be empty")]
    NameEmpty,
    #[error("faction name is longer than {max} characters")]
    NameTooLong { max: usize },
    #[error("faction name `{0}` is not allowed")]
    NameBlacklisted(String),
    #[error("faction name `{0}` is already taken")]
    NameTaken(String),
    #[error("faction is invite only")]
    NotInvited,
    #[error("player is already invited")]
    AlreadyInvited,
    #[error("faction is full ({max} members)")]
    FactionFull { max: usize },
    #[error("player is not a member of your faction")]
    TargetNotMember,
    #[error("you cannot target yourself")]
    SelfTarget,
    #[error("target outranks you")]
    TargetOutranks,
    #[error("the owner must transfer ownership or disband")]
    OwnerCannotLeave,
    #[error("rank cannot be raised further")]
    CannotPromote,
    #[error("rank cannot be lowered further")]
    CannotDemote,
}

impl Realm {
    /// Faction and rank of `user`, if they belong to one.
    pub fn membership(&self, user: UserId) -> Option<(FactionId, Rank)> {
        let user = self.users.get(user)?;
        Some((user.faction()?, user.rank))
    }

    fn require_rank(&self, actor: UserId, required: Rank) -> Result<(FactionId, Rank), MembershipError> {
        let (faction, rank) = self
            .membership(actor)
            .ok_or(MembershipError::NotInFaction)?;
        if !rank.is_at_least(required) && !self.has_bypass(actor) {
            return Err(MembershipError::InsufficientRank { required });
        }
        Ok((faction, rank))
    }

    fn validate_name(&self, name: &str, renaming: Option<FactionId>) -> Result<String, MembershipError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MembershipError::NameEmpty);
        }
        let display = &self.config().display;
        if let Ok(max) = usize::try_from(display.name_max_length) {
            if name.chars().count() > max {
                return Err(MembershipError::NameTooLong { max });
            }
        }
        if display
            .name_blacklist
            .iter()
            .any(|banned| banned.eq_ignore_ascii_case(name))
        {
            return Err(MembershipError::NameBlacklisted(name.to_string()));
        }
        if let Some(existing) = self.factions.find_by_name(name) {
            if Some(existing.id) != renaming {
                return Err(MembershipError::NameTaken(name.to_string()));
            }
        }
        Ok(name.to_string())
    }

    /// Founds a faction with `founder` as its Owner.
    pub fn create_faction(&mut self, founder: UserId, name: &str) -> Result<FactionId, MembershipError> {
        if self.faction_of(founder).is_some() {
            return Err(MembershipError::AlreadyInFaction);
        }
        let name = self.validate_name(name, None)?;
        let id = self.factions.allocate_id();
        let guests = self.config().default_guest_permissions();
        self.factions.insert(Faction::new(id, name.clone(), guests));
        self.users.set_membership(founder, id, Rank::Owner);

        tracing::info!(
            target: "factions::membership",
            faction = %id,
            founder = %founder,
            name = %name,
            "faction.created"
        );
        self.emit(RealmEvent::FactionCreated { faction: id, founder });
        self.emit(RealmEvent::MemberJoined {
            faction: id,
            user: founder,
        });
        Ok(id)
    }

    pub fn join_faction(&mut self, user: UserId, faction: FactionId) -> Result<(), MembershipError> {
        if self.faction_of(user).is_some() {
            return Err(MembershipError::AlreadyInFaction);
        }
        let entry = self
            .factions
            .get(faction)
            .ok_or(MembershipError::UnknownFaction(faction))?;
        if !entry.open && !entry.invites.contains(&user) {
            return Err(MembershipError::NotInvited);
        }
        if let Some(max) = self.config().max_faction_size() {
            if self.users.member_count(faction) >= max {
                return Err(MembershipError::FactionFull { max });
            }
        }

        let old_power = self.faction_power(faction);
        if let Some(entry) = self.factions.get_mut(faction) {
            entry.invites.remove(&user);
        }
        self.users.set_membership(user, faction, Rank::Member);
        tracing::info!(target: "factions::membership", faction = %faction, user = %user, "member.joined");
        self.emit(RealmEvent::MemberJoined { faction, user });
        self.publish_power_change(faction, old_power);
        Ok(())
    }

    pub fn leave_faction(&mut self, user: UserId) -> Result<FactionId, MembershipError> {
        let (faction, rank) = self
            .membership(user)
            .ok_or(MembershipError::NotInFaction)?;
        if rank == Rank::Owner {
            return Err(MembershipError::OwnerCannotLeave);
        }
        self.remove_member(faction, user);
        Ok(faction)
    }

    /// Removes `target` from the actor's faction. The target must rank
    /// strictly below the actor.
    pub fn kick_member(&mut self, actor: UserId, target: UserId) -> Result<(), MembershipError> {
        let (faction, actor_rank) = self.require_rank(actor, Rank::Leader)?;
        if actor == target {
            return Err(MembershipError::SelfTarget);
        }
        let (target_faction, target_rank) = self
            .membership(target)
            .ok_or(MembershipError::TargetNotMember)?;
        if target_faction != faction {
            return Err(MembershipError::TargetNotMember);
        }
        if target_rank >= actor_rank && !self.has_bypass(actor) {
            return Err(MembershipError::TargetOutranks);
        }
        self.remove_member(faction, target);
        Ok(())
    }

    fn remove_member(&mut self, faction: FactionId, user: UserId) {
        let old_power = self.faction_power(faction);
        self.users.clear_membership(user);
        tracing::info!(target: "factions::membership", faction = %faction, user = %user, "member.left");
        self.emit(RealmEvent::MemberLeft { faction, user });
        self.publish_power_change(faction, old_power);
    }

    pub fn invite(&mut self, actor: UserId, target: UserId) -> Result<(), MembershipError> {
        let (faction, _) = self.require_rank(actor, Rank::Leader)?;
        if self.faction_of(target) == Some(faction) {
            return Err(MembershipError::AlreadyInFaction);
        }
        let entry = self
            .factions
            .get_mut(faction)
            .ok_or(MembershipError::UnknownFaction(faction))?;
        if !entry.invites.insert(target) {
            return Err(MembershipError::AlreadyInvited);
        }
        self.emit(RealmEvent::FactionModified { faction });
        Ok(())
    }

    pub fn revoke_invite(&mut self, actor: UserId, target: UserId) -> Result<(), MembershipError> {
        let (faction, _) = self.require_rank(actor, Rank::Leader)?;
        let entry = self
            .factions
            .get_mut(faction)
            .ok_or(MembershipError::UnknownFaction(faction))?;
        if !entry.invites.remove(&target) {
            return Err(MembershipError::NotInvited);
        }
        self.emit(RealmEvent::FactionModified { faction });
        Ok(())
    }

    /// Raises the target one rank. Promoting to Owner hands ownership over and
    /// drops the previous Owner to Leader.
    pub fn promote(&mut self, actor: UserId, target: UserId) -> Result<Rank, MembershipError> {
        let (faction, actor_rank, target_rank) = self.rank_change_parties(actor, target)?;
        let raised = target_rank.raised().ok_or(MembershipError::CannotPromote)?;
        if raised == Rank::Owner {
            if actor_rank != Rank::Owner {
                return Err(MembershipError::InsufficientRank {
                    required: Rank::Owner,
                });
            }
            self.users.set_membership(actor, faction, Rank::Leader);
        } else if raised >= actor_rank && !self.has_bypass(actor) {
            return Err(MembershipError::TargetOutranks);
        }
        self.users.set_membership(target, faction, raised);
        self.emit(RealmEvent::FactionModified { faction });
        Ok(raised)
    }

    pub fn demote(&mut self, actor: UserId, target: UserId) -> Result<Rank, MembershipError> {
        let (faction, _, target_rank) = self.rank_change_parties(actor, target)?;
        let lowered = target_rank.lowered().ok_or(MembershipError::CannotDemote)?;
        self.users.set_membership(target, faction, lowered);
        self.emit(RealmEvent::FactionModified { faction });
        Ok(lowered)
    }

    fn rank_change_parties(
        &self,
        actor: UserId,
        target: UserId,
    ) -> Result<(FactionId, Rank, Rank), MembershipError> {
        let (faction, actor_rank) = self.require_rank(actor, Rank::Leader)?;
        if actor == target {
            return Err(MembershipError::SelfTarget);
        }
        let (target_faction, target_rank) = self
            .membership(target)
            .ok_or(MembershipError::TargetNotMember)?;
        if target_faction != faction {
            return Err(MembershipError::TargetNotMember);
        }
        if target_rank >= actor_rank && !self.has_bypass(actor) {
            return Err(MembershipError::TargetOutranks);
        }
        Ok((faction, actor_rank, target_rank))
    }

    /// Dissolves the actor's faction. Only its Owner may do this.
    pub fn disband_faction(&mut self, actor: UserId) -> Result<(), MembershipError> {
        let (faction, _) = self.require_rank(actor, Rank::Owner)?;
        self.dissolve(faction);
        Ok(())
    }

    /// Removes a faction and everything that hangs off it: members are
    /// evicted, claims released, and every edge to or from it dropped.
    pub(crate) fn dissolve(&mut self, faction: FactionId) -> Option<Faction> {
        for user in self.users.member_ids(faction) {
            self.users.clear_membership(user);
            self.emit(RealmEvent::MemberLeft { faction, user });
        }
        for (dimension, cell) in self.claims.remove_faction(faction) {
            self.emit(RealmEvent::ClaimRemoved {
                dimension,
                x: cell.x,
                z: cell.z,
                faction: Some(faction),
            });
        }
        self.relationships.remove_edges_from(faction);
        self.relationships.remove_edges_to(faction);
        self.pending_claims.retain(|_, request| request.faction != faction);
        self.pending_unclaims.retain(|_, request| request.faction != faction);
        self.pending_wars
            .retain(|_, request| request.source != faction && request.target != faction);
        self.pending_peace.retain(|pair, _| !pair.contains(faction));

        let removed = self.factions.remove(faction)?;
        tracing::info!(
            target: "factions::membership",
            faction = %faction,
            name = %removed.name,
            "faction.disbanded"
        );
        self.emit(RealmEvent::FactionDisbanded {
            faction,
            name: removed.name.clone(),
        });
        Some(removed)
    }

    fn modify_profile<F>(&mut self, actor: UserId, apply: F) -> Result<FactionId, MembershipError>
    where
        F: FnOnce(&mut Faction),
    {
        let (faction, _) = self.require_rank(actor, Rank::Leader)?;
        let entry = self
            .factions
            .get_mut(faction)
            .ok_or(MembershipError::UnknownFaction(faction))?;
        apply(entry);
        Ok(faction)
    }

    pub fn set_name(&mut self, actor: UserId, name: &str) -> Result<(), MembershipError> {
        let (faction, _) = self.require_rank(actor, Rank::Leader)?;
        let name = self.validate_name(name, Some(faction))?;
        self.modify_profile(actor, |entry| entry.name = name)?;
        self.emit(RealmEvent::FactionModified { faction });
        Ok(())
    }

    pub fn set_description(&mut self, actor: UserId, description: &str) -> Result<(), MembershipError> {
        let faction = self.modify_profile(actor, |entry| entry.description = description.to_string())?;
        self.emit(RealmEvent::FactionModified { faction });
        Ok(())
    }

    pub fn set_motd(&mut self, actor: UserId, motd: &str) -> Result<(), MembershipError> {
        let faction = self.modify_profile(actor, |entry| entry.motd = motd.to_string())?;
        self.emit(RealmEvent::FactionModified { faction });
        Ok(())
    }

    pub fn set_color(&mut self, actor: UserId, color: &str) -> Result<(), MembershipError> {
        let faction = self.modify_profile(actor, |entry| entry.color = color.to_string())?;
        self.emit(RealmEvent::FactionModified { faction });
        Ok(())
    }

    pub fn set_open(&mut self, actor: UserId, open: bool) -> Result<(), MembershipError> {
        let faction = self.modify_profile(actor, |entry| entry.open = open)?;
        self.emit(RealmEvent::FactionModified { faction });
        Ok(())
    }

    pub fn set_home(&mut self, actor: UserId, home: Home) -> Result<(), MembershipError> {
        let faction = self.modify_profile(actor, |entry| entry.home = Some(home))?;
        self.emit(RealmEvent::HomeSet { faction });
        Ok(())
    }

    /// Grants or revokes a kind on the faction's guest set.
    pub fn set_guest_permission(
        &mut self,
        actor: UserId,
        kind: PermissionKind,
        granted: bool,
    ) -> Result<Permissions, MembershipError> {
        let mut updated = Permissions::empty();
        let faction = self.modify_profile(actor, |entry| {
            entry.guest_permissions.set(Permissions::from(kind), granted);
            updated = entry.guest_permissions;
        })?;
        self.emit(RealmEvent::FactionModified { faction });
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::FactionsConfig;
    use crate::claims::Claim;
    use crate::identity::CellPos;
    use factions_schema::RelationshipStatus;

    fn realm() -> Realm {
        Realm::new(Arc::new(FactionsConfig::default()))
    }

    #[test]
    fn founding_validates_names() {
        let mut realm = realm();
        let north = realm.create_faction(UserId(1), " North ").expect("created");
        assert_eq!(realm.faction(north).map(|f| f.name.as_str()), Some("North"));
        assert_eq!(realm.membership(UserId(1)), Some((north, Rank::Owner)));

        assert_eq!(
            realm.create_faction(UserId(2), "north"),
            Err(MembershipError::NameTaken("north".into()))
        );
        assert_eq!(
            realm.create_faction(UserId(2), "Wilderness"),
            Err(MembershipError::NameBlacklisted("Wilderness".into()))
        );
        assert_eq!(
            realm.create_faction(UserId(1), "south"),
            Err(MembershipError::AlreadyInFaction)
        );
    }

    #[test]
    fn joining_requires_invite_or_open_flag() {
        let mut realm = realm();
        let north = realm.create_faction(UserId(1), "north").expect("created");
        assert_eq!(
            realm.join_faction(UserId(2), north),
            Err(MembershipError::NotInvited)
        );

        realm.invite(UserId(1), UserId(2)).expect("invited");
        realm.join_faction(UserId(2), north).expect("joined");
        assert!(realm.faction(north).map_or(false, |f| f.invites.is_empty()));

        realm.set_open(UserId(1), true).expect("opened");
        realm.join_faction(UserId(3), north).expect("joined open faction");
        assert_eq!(realm.users.member_count(north), 3);
    }

    #[test]
    fn leaders_cannot_kick_equals() {
        let mut realm = realm();
        let north = realm.create_faction(UserId(1), "north").expect("created");
        realm.set_open(UserId(1), true).expect("opened");
        for user in [2, 3, 4] {
            realm.join_faction(UserId(user), north).expect("joined");
        }
        realm.promote(UserId(1), UserId(2)).expect("commander");
        realm.promote(UserId(1), UserId(2)).expect("leader");
        realm.promote(UserId(1), UserId(3)).expect("commander");
        realm.promote(UserId(1), UserId(3)).expect("leader");

        assert_eq!(
            realm.kick_member(UserId(2), UserId(3)),
            Err(MembershipError::TargetOutranks)
        );
        assert_eq!(
            realm.kick_member(UserId(2), UserId(1)),
            Err(MembershipError::TargetOutranks)
        );
        realm.kick_member(UserId(2), UserId(4)).expect("kicked member");
        assert_eq!(realm.faction_of(UserId(4)), None);
        assert_eq!(
            realm.kick_member(UserId(4), UserId(2)),
            Err(MembershipError::NotInFaction)
        );
    }

    #[test]
    fn promoting_to_owner_transfers_ownership() {
        let mut realm = realm();
        let north = realm.create_faction(UserId(1), "north").expect("created");
        realm.set_open(UserId(1), true).expect("opened");
        realm.join_faction(UserId(2), north).expect("joined");
        for _ in 0..3 {
            realm.promote(UserId(1), UserId(2)).expect("promoted");
        }
        assert_eq!(realm.membership(UserId(2)), Some((north, Rank::Owner)));
        assert_eq!(realm.membership(UserId(1)), Some((north, Rank::Leader)));
        assert_eq!(realm.leave_faction(UserId(2)), Err(MembershipError::OwnerCannotLeave));
        assert_eq!(realm.leave_faction(UserId(1)), Ok(north));
    }

    #[test]
    fn demotion_bottoms_out_at_guest() {
        let mut realm = realm();
        let north = realm.create_faction(UserId(1), "north").expect("created");
        realm.set_open(UserId(1), true).expect("opened");
        realm.join_faction(UserId(2), north).expect("joined");
        assert_eq!(realm.demote(UserId(1), UserId(2)), Ok(Rank::Guest));
        assert_eq!(
            realm.demote(UserId(1), UserId(2)),
            Err(MembershipError::CannotDemote)
        );
    }

    #[test]
    fn disbanding_releases_everything() {
        let mut realm = realm();
        let north = realm.create_faction(UserId(1), "north").expect("created");
        let south = realm.create_faction(UserId(2), "south").expect("created");
        realm
            .claims
            .insert("overworld", CellPos::new(0, 0), Claim::new(north));
        realm
            .relationships
            .set_status(south, north, RelationshipStatus::War);
        realm.events.drain();

        assert_eq!(
            realm.disband_faction(UserId(3)),
            Err(MembershipError::NotInFaction)
        );

        realm.disband_faction(UserId(1)).expect("disbanded");
        assert!(realm.faction(north).is_none());
        assert_eq!(realm.faction_of(UserId(1)), None);
        assert_eq!(realm.demesne(north), 0);
        assert!(realm.relationships.pairs().is_empty());
        let events = realm.events.drain();
        assert!(events
            .iter()
            .any(|event| matches!(event, RealmEvent::FactionDisbanded { faction, .. } if *faction == north)));
        assert!(events.iter().any(|event| matches!(
            event,
            RealmEvent::ClaimRemoved { faction: Some(owner), .. } if *owner == north
        )));
    }

    #[test]
    fn guest_permissions_toggle() {
        let mut realm = realm();
        realm.create_faction(UserId(1), "north").expect("created");
        let updated = realm
            .set_guest_permission(UserId(1), PermissionKind::BreakBlocks, true)
            .expect("granted");
        assert!(updated.allows(PermissionKind::BreakBlocks));
        assert!(updated.allows(PermissionKind::UseBlocks));
        let updated = realm
            .set_guest_permission(UserId(1), PermissionKind::UseBlocks, false)
            .expect("revoked");
        assert!(!updated.allows(PermissionKind::UseBlocks));
    }
}
