//! Relationship state machine between factions.
//!
//! Friendly and Ally are requested unilaterally and become mutual when the
//! other side already holds the same status. Neutral de-escalates, and
//! cascades to the other side only when the pair was mutually cordial. War
//! needs a confirmation from the declaring actor; leaving a war needs the
//! other side to accept a peace request.

use factions_schema::{PermissionKind, Rank, RelationshipStatus};
use thiserror::Error;

use crate::events::RealmEvent;
use crate::identity::{FactionId, FactionPair, Timestamp, UserId};
use crate::pending::{PeaceRequest, PendingError, WarRequest};
use crate::permissions::Permissions;
use crate::realm::Realm;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiplomacyError {
    #[error("you are not in a faction")]
    NotInFaction,
    #[error("requires rank {required} or higher")]
    InsufficientRank { required: Rank },
    #[error("cannot change relations with your own faction")]
    SameFaction,
    #[error("faction {0} does not exist")]
    UnknownFaction(FactionId),
    #[error("relationship is already mutually {0}")]
    AlreadyMutual(RelationshipStatus),
    #[error("you have already requested {0}")]
    AlreadyRequested(RelationshipStatus),
    #[error("{0} is not a cordial status")]
    NotCordial(RelationshipStatus),
    #[error("you are at war; make peace before changing relations")]
    AtWar,
    #[error("you are already neutral with this faction")]
    AlreadyNeutral,
    #[error("you are already mutually at war with this faction")]
    AlreadyAtWar,
    #[error("you are not at war with this faction")]
    NotAtWar,
    #[error("no pending peace offer from faction {0}")]
    NoPeaceRequest(FactionId),
    #[error("pending war declaration targets a different faction")]
    WarTargetMismatch,
    #[error(transparent)]
    Pending(#[from] PendingError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiplomacyOutcome {
    /// The source's edge was written. `mutual` reports whether both sides
    /// now agree.
    Declared { mutual: bool },
    PeaceRequested,
    PeaceAccepted,
    PeaceDeclined,
    WarConfirmationRequired,
    WarDeclared,
}

impl Realm {
    fn diplomacy_actor(&self, actor: UserId) -> Result<FactionId, DiplomacyError> {
        let (faction, rank) = self
            .membership(actor)
            .ok_or(DiplomacyError::NotInFaction)?;
        if !rank.is_at_least(Rank::Leader) && !self.has_bypass(actor) {
            return Err(DiplomacyError::InsufficientRank {
                required: Rank::Leader,
            });
        }
        Ok(faction)
    }

    fn check_pair(&self, source: FactionId, target: FactionId) -> Result<(), DiplomacyError> {
        if source == target {
            return Err(DiplomacyError::SameFaction);
        }
        for faction in [source, target] {
            if !self.factions.contains(faction) {
                return Err(DiplomacyError::UnknownFaction(faction));
            }
        }
        Ok(())
    }

    fn prior_cordial(&self, a: FactionId, b: FactionId) -> Option<RelationshipStatus> {
        self.relationships
            .mutual_status(a, b)
            .filter(RelationshipStatus::is_cordial)
    }

    fn write_status(&mut self, source: FactionId, target: FactionId, status: RelationshipStatus) {
        self.relationships.set_status(source, target, status);
        self.emit(RealmEvent::RelationshipDeclared {
            source,
            target,
            status,
        });
    }

    /// Entry point for an actor changing their faction's stance toward
    /// `target`. War is routed through the confirmation step.
    pub fn request_relationship(
        &mut self,
        actor: UserId,
        target: FactionId,
        status: RelationshipStatus,
        now: Timestamp,
    ) -> Result<DiplomacyOutcome, DiplomacyError> {
        let source = self.diplomacy_actor(actor)?;
        let result = match status {
            RelationshipStatus::Friendly | RelationshipStatus::Ally => {
                self.request_cordial(source, target, status)
            }
            RelationshipStatus::Neutral => self.request_neutral(source, target, now),
            RelationshipStatus::War => self.declare_war(actor, target, now),
        };
        if let Err(err) = &result {
            tracing::debug!(
                target: "factions::diplomacy",
                source = %source,
                target = %target,
                status = %status,
                error = %err,
                "relationship.rejected"
            );
        }
        result
    }

    /// Writes a Friendly or Ally edge from `source` to `target`.
    pub fn request_cordial(
        &mut self,
        source: FactionId,
        target: FactionId,
        status: RelationshipStatus,
    ) -> Result<DiplomacyOutcome, DiplomacyError> {
        self.check_pair(source, target)?;
        if !status.is_cordial() {
            return Err(DiplomacyError::NotCordial(status));
        }
        if self.relationships.is_mutual(source, target, status) {
            return Err(DiplomacyError::AlreadyMutual(status));
        }
        if self.relationships.status(source, target) == status {
            return Err(DiplomacyError::AlreadyRequested(status));
        }
        if self.relationships.either_at_war(source, target) {
            return Err(DiplomacyError::AtWar);
        }

        let prior = self.prior_cordial(source, target);
        self.write_status(source, target, status);

        if self.relationships.status(target, source) == status {
            tracing::info!(
                target: "factions::diplomacy",
                a = %source,
                b = %target,
                status = %status,
                "relationship.mutual_entered"
            );
            self.emit(RealmEvent::MutualEntered {
                a: source,
                b: target,
                status,
            });
            return Ok(DiplomacyOutcome::Declared { mutual: true });
        }
        if let Some(prior) = prior {
            self.emit(RealmEvent::MutualEnded {
                a: source,
                b: target,
                prior,
            });
        }
        Ok(DiplomacyOutcome::Declared { mutual: false })
    }

    /// Neutral request. Accepts a live peace offer from `target`, opens a
    /// peace request while at war, and otherwise writes a Neutral edge.
    pub fn request_neutral(
        &mut self,
        source: FactionId,
        target: FactionId,
        now: Timestamp,
    ) -> Result<DiplomacyOutcome, DiplomacyError> {
        self.check_pair(source, target)?;
        let pair = FactionPair::new(source, target);
        let offered_by = self.pending_peace.get(&pair, now).map(|request| request.requester);

        if offered_by == Some(target) {
            return self.accept_peace(source, target, now);
        }
        if self
            .relationships
            .is_mutual(source, target, RelationshipStatus::War)
        {
            if offered_by == Some(source) {
                return Err(DiplomacyError::AlreadyRequested(RelationshipStatus::Neutral));
            }
            self.pending_peace
                .put(pair, PeaceRequest { requester: source }, now);
            tracing::info!(
                target: "factions::diplomacy",
                requester = %source,
                target = %target,
                "peace.requested"
            );
            return Ok(DiplomacyOutcome::PeaceRequested);
        }
        if self
            .relationships
            .is_mutual(source, target, RelationshipStatus::Neutral)
        {
            return Err(DiplomacyError::AlreadyNeutral);
        }

        let prior = self.prior_cordial(source, target);
        self.write_status(source, target, RelationshipStatus::Neutral);
        if let Some(prior) = prior {
            self.write_status(target, source, RelationshipStatus::Neutral);
            tracing::info!(
                target: "factions::diplomacy",
                a = %source,
                b = %target,
                prior = %prior,
                "relationship.mutual_ended"
            );
            self.emit(RealmEvent::MutualEnded {
                a: source,
                b: target,
                prior,
            });
        }
        let mutual = self
            .relationships
            .is_mutual(source, target, RelationshipStatus::Neutral);
        Ok(DiplomacyOutcome::Declared { mutual })
    }

    /// `source` accepts the peace offer made by `requester`.
    pub fn accept_peace(
        &mut self,
        source: FactionId,
        requester: FactionId,
        now: Timestamp,
    ) -> Result<DiplomacyOutcome, DiplomacyError> {
        self.check_pair(source, requester)?;
        let pair = FactionPair::new(source, requester);
        match self.pending_peace.get(&pair, now) {
            Some(request) if request.requester == requester => {}
            _ => return Err(DiplomacyError::NoPeaceRequest(requester)),
        }
        self.pending_peace.remove(&pair);
        if !self
            .relationships
            .is_mutual(source, requester, RelationshipStatus::War)
        {
            return Err(DiplomacyError::NotAtWar);
        }

        self.write_status(source, requester, RelationshipStatus::Neutral);
        self.write_status(requester, source, RelationshipStatus::Neutral);
        tracing::info!(
            target: "factions::diplomacy",
            a = %source,
            b = %requester,
            "peace.accepted"
        );
        self.emit(RealmEvent::MutualEnded {
            a: source,
            b: requester,
            prior: RelationshipStatus::War,
        });
        Ok(DiplomacyOutcome::PeaceAccepted)
    }

    /// The actor's faction turns down `requester`'s peace offer; the war
    /// continues.
    pub fn decline_peace(
        &mut self,
        actor: UserId,
        requester: FactionId,
        now: Timestamp,
    ) -> Result<DiplomacyOutcome, DiplomacyError> {
        let source = self.diplomacy_actor(actor)?;
        self.check_pair(source, requester)?;
        let pair = FactionPair::new(source, requester);
        if self
            .pending_peace
            .get(&pair, now)
            .is_some_and(|request| request.requester != requester)
        {
            return Err(DiplomacyError::NoPeaceRequest(requester));
        }
        self.pending_peace.take(&pair, now)?;
        tracing::info!(
            target: "factions::diplomacy",
            decliner = %source,
            requester = %requester,
            "peace.declined"
        );
        Ok(DiplomacyOutcome::PeaceDeclined)
    }

    /// First step of a war declaration. The actor must confirm within the
    /// pending-action TTL.
    pub fn declare_war(
        &mut self,
        actor: UserId,
        target: FactionId,
        now: Timestamp,
    ) -> Result<DiplomacyOutcome, DiplomacyError> {
        let source = self.diplomacy_actor(actor)?;
        self.check_pair(source, target)?;
        if self
            .relationships
            .is_mutual(source, target, RelationshipStatus::War)
        {
            return Err(DiplomacyError::AlreadyAtWar);
        }
        self.pending_wars.put(actor, WarRequest { source, target }, now);
        Ok(DiplomacyOutcome::WarConfirmationRequired)
    }

    /// Second step: sets War on both sides regardless of prior state.
    pub fn confirm_war(
        &mut self,
        actor: UserId,
        target: FactionId,
        now: Timestamp,
    ) -> Result<DiplomacyOutcome, DiplomacyError> {
        let request = self.pending_wars.take(&actor, now)?;
        let source = self.diplomacy_actor(actor)?;
        if request.source != source || request.target != target {
            return Err(DiplomacyError::WarTargetMismatch);
        }
        self.check_pair(source, target)?;
        if self
            .relationships
            .is_mutual(source, target, RelationshipStatus::War)
        {
            return Err(DiplomacyError::AlreadyAtWar);
        }

        self.pending_peace.remove(&FactionPair::new(source, target));
        let prior = self.prior_cordial(source, target);
        self.write_status(source, target, RelationshipStatus::War);
        self.write_status(target, source, RelationshipStatus::War);
        tracing::info!(
            target: "factions::diplomacy",
            source = %source,
            target = %target,
            "war.declared"
        );
        self.emit(RealmEvent::MutualEntered {
            a: source,
            b: target,
            status: RelationshipStatus::War,
        });
        if let Some(prior) = prior {
            self.emit(RealmEvent::MutualEnded {
                a: source,
                b: target,
                prior,
            });
        }
        Ok(DiplomacyOutcome::WarDeclared)
    }

    pub fn has_pending_war(&self, actor: UserId, now: Timestamp) -> bool {
        self.pending_wars.contains(&actor, now)
    }

    /// Grants or revokes a permission kind on the actor's edge toward
    /// `target`.
    pub fn set_relationship_permission(
        &mut self,
        actor: UserId,
        target: FactionId,
        kind: PermissionKind,
        granted: bool,
    ) -> Result<Permissions, DiplomacyError> {
        let source = self.diplomacy_actor(actor)?;
        self.check_pair(source, target)?;
        let mut permissions = self.relationships.get(source, target).permissions;
        permissions.set(Permissions::from(kind), granted);
        self.relationships
            .set_permissions(source, target, permissions);
        self.emit(RealmEvent::FactionModified { faction: source });
        Ok(permissions)
    }
}
