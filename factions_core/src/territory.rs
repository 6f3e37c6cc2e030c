//! Claiming and releasing territory.
//!
//! A claim request is first turned into a [`ClaimPlan`] without touching any
//! state. Applying the plan stages every insertion against the current grid
//! and only commits once the whole batch is known to be consistent, so a
//! failed apply leaves the realm exactly as it was.

use std::collections::{HashMap, HashSet};

use factions_schema::{Rank, RelationshipStatus};
use thiserror::Error;

use crate::claims::Claim;
use crate::events::RealmEvent;
use crate::identity::{CellPos, FactionId, Timestamp, UserId};
use crate::pending::{ClaimRequest, PendingError, UnclaimRequest, UnclaimScope};
use crate::realm::Realm;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimError {
    #[error("you are not in a faction")]
    NotInFaction,
    #[error("faction {0} does not exist")]
    UnknownFaction(FactionId),
    #[error("requires rank {required} or higher")]
    InsufficientRank { required: Rank },
    #[error("claims are not allowed in {0}")]
    DimensionNotClaimable(String),
    #[error("claim size {size} is outside 1..={max}")]
    InvalidBatchSize { size: u32, max: u32 },
    #[error("your faction already owns {0}")]
    AlreadyOwned(CellPos),
    #[error("you must be in mutual war with faction {owner} to claim {cell}")]
    NotMutualWar { owner: FactionId, cell: CellPos },
    #[error("faction {owner} still has enough power to protect {cell}")]
    OwnerProtected { owner: FactionId, cell: CellPos },
    #[error("no new cells to claim")]
    NothingToClaim,
    #[error("not enough faction power: have {power}, need {required}")]
    InsufficientPower { power: i32, required: i64 },
    #[error("claims must be connected to your existing territory")]
    NotConnected,
    #[error("your faction changed since the request was made")]
    FactionChanged,
    #[error(transparent)]
    Pending(#[from] PendingError),
    #[error("cell {0} is not claimed")]
    Unclaimed(CellPos),
    #[error("cell {0} belongs to another faction")]
    ForeignClaim(CellPos),
    #[error("cannot change an access level at or above your own rank")]
    AccessAboveRank,
    #[error("access level is already at its maximum")]
    AccessAtMaximum,
    #[error("access level is already at its minimum")]
    AccessAtMinimum,
    /// A validated plan no longer fits the grid. Nothing was changed.
    #[error("claim plan for {cell} in {dimension} no longer matches the grid")]
    EngineInconsistency { dimension: String, cell: CellPos },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnclaimError {
    #[error("you are not in a faction")]
    NotInFaction,
    #[error("requires rank {required} or higher")]
    InsufficientRank { required: Rank },
    #[error("removal size {size} is outside 1..={max}")]
    InvalidBatchSize { size: u32, max: u32 },
    #[error("your faction can remove another claim in {remaining_secs}s")]
    OnCooldown { remaining_secs: u64 },
    #[error("cannot remove a claim on unclaimed cell {0}")]
    NotClaimed(CellPos),
    #[error("cannot remove a claim owned by another faction at {0}")]
    ForeignClaim(CellPos),
    #[error("there are no removable claims")]
    NothingToRemove,
    #[error("removing every claim at once is disabled")]
    RemoveAllDisabled,
    #[error("your faction changed since the request was made")]
    FactionChanged,
    #[error(transparent)]
    Pending(#[from] PendingError),
}

/// Validated batch of cells to claim for one faction. `cells` is in insertion
/// order; `captures` lists the enemy cells that will be released first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimPlan {
    pub faction: FactionId,
    pub dimension: String,
    pub size: u32,
    pub cells: Vec<CellPos>,
    pub captures: Vec<(CellPos, FactionId)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimOutcome {
    pub added: Vec<CellPos>,
    pub captured: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimResponse {
    Applied(ClaimOutcome),
    /// The faction's first claim was queued until the actor confirms it.
    ConfirmationRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnclaimResponse {
    Removed(usize),
    ConfirmationRequired,
}

/// Cell scheduled for release: dimension, cell and current owner.
type Removal = (String, CellPos, FactionId);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessChange {
    Raise,
    Lower,
}

impl Realm {
    pub fn compute_claim_plan(
        &self,
        faction: FactionId,
        dimension: &str,
        origin: CellPos,
        size: u32,
    ) -> Result<ClaimPlan, ClaimError> {
        if !self.factions.contains(faction) {
            return Err(ClaimError::UnknownFaction(faction));
        }
        let max = self.config().max_batch_size();
        if size == 0 || size > max {
            return Err(ClaimError::InvalidBatchSize { size, max });
        }
        if !self.config().is_dimension_claimable(dimension) {
            return Err(ClaimError::DimensionNotClaimable(dimension.to_string()));
        }

        let mut cells = Vec::new();
        let mut captures = Vec::new();
        let mut budgets: HashMap<FactionId, i64> = HashMap::new();

        for cell in origin.batch(size) {
            let Some(existing) = self.claims.get(dimension, cell) else {
                cells.push(cell);
                continue;
            };
            let owner = existing.faction;
            if owner == faction {
                if size == 1 {
                    return Err(ClaimError::AlreadyOwned(cell));
                }
                continue;
            }
            if !self.factions.contains(owner)
                || !self
                    .relationships
                    .is_mutual(faction, owner, RelationshipStatus::War)
            {
                return Err(ClaimError::NotMutualWar { owner, cell });
            }
            let budget = budgets.entry(owner).or_insert_with(|| {
                self.claims.demesne(owner) as i64 - i64::from(self.faction_power(owner))
            });
            if *budget <= 0 {
                return Err(ClaimError::OwnerProtected { owner, cell });
            }
            *budget -= 1;
            captures.push((cell, owner));
            cells.push(cell);
        }

        if cells.is_empty() {
            return Err(ClaimError::NothingToClaim);
        }
        let power = self.faction_power(faction);
        let required = (self.claims.demesne(faction) + cells.len()) as i64;
        if i64::from(power) < required {
            return Err(ClaimError::InsufficientPower { power, required });
        }
        if self.claims.count_in_dimension(faction, dimension) > 0 {
            let connecting = cells
                .iter()
                .position(|cell| self.claims.can_claim_connected(dimension, *cell, faction))
                .ok_or(ClaimError::NotConnected)?;
            cells.swap(0, connecting);
        }

        tracing::debug!(
            target: "factions::claims",
            faction = %faction,
            dimension,
            origin = %origin,
            size,
            cells = cells.len(),
            captures = captures.len(),
            "claim_plan.computed"
        );
        Ok(ClaimPlan {
            faction,
            dimension: dimension.to_string(),
            size,
            cells,
            captures,
        })
    }

    /// Commits a plan. Every cell is staged first; if any cell no longer
    /// fits, `EngineInconsistency` is returned and nothing changes.
    pub fn apply_claim_plan(&mut self, plan: &ClaimPlan) -> Result<ClaimOutcome, ClaimError> {
        if !self.factions.contains(plan.faction) {
            return Err(ClaimError::UnknownFaction(plan.faction));
        }
        let order = self.stage_claim_plan(plan).map_err(|cell| {
            tracing::error!(
                target: "factions::claims",
                faction = %plan.faction,
                dimension = %plan.dimension,
                cell = %cell,
                "claim_plan.inconsistent"
            );
            ClaimError::EngineInconsistency {
                dimension: plan.dimension.clone(),
                cell,
            }
        })?;

        for (cell, owner) in &plan.captures {
            self.claims.remove(&plan.dimension, *cell);
            self.emit(RealmEvent::ClaimRemoved {
                dimension: plan.dimension.clone(),
                x: cell.x,
                z: cell.z,
                faction: Some(*owner),
            });
        }
        for cell in &order {
            self.claims
                .insert(&plan.dimension, *cell, Claim::new(plan.faction));
            self.emit(RealmEvent::ClaimAdded {
                faction: plan.faction,
                dimension: plan.dimension.clone(),
                cell: *cell,
            });
        }
        if let Some(faction) = self.factions.get_mut(plan.faction) {
            faction.first_claim_confirmed = true;
        }

        tracing::info!(
            target: "factions::claims",
            faction = %plan.faction,
            dimension = %plan.dimension,
            added = order.len(),
            captured = plan.captures.len(),
            "claim_plan.applied"
        );
        Ok(ClaimOutcome {
            added: order,
            captured: plan.captures.len(),
        })
    }

    /// Works out an insertion order in which every cell touches the
    /// faction's territory as it stands at that point. Cells that cannot
    /// connect yet are retried after later cells land. Returns the first
    /// offending cell on failure.
    fn stage_claim_plan(&self, plan: &ClaimPlan) -> Result<Vec<CellPos>, CellPos> {
        let captures: HashMap<CellPos, FactionId> = plan.captures.iter().copied().collect();
        for cell in &plan.cells {
            match self.claims.owner(&plan.dimension, *cell) {
                None => {}
                Some(owner) if captures.get(cell) == Some(&owner) => {}
                Some(_) => return Err(*cell),
            }
        }
        let bootstrap = self
            .claims
            .count_in_dimension(plan.faction, &plan.dimension)
            == 0;
        let mut staged: HashSet<CellPos> = HashSet::new();
        let mut order = Vec::with_capacity(plan.cells.len());
        let mut remaining = plan.cells.clone();

        while !remaining.is_empty() {
            let before = remaining.len();
            let mut deferred = Vec::new();
            for cell in remaining {
                let connected = (bootstrap && staged.is_empty())
                    || staged.contains(&cell)
                    || cell.neighbours().into_iter().any(|neighbour| {
                        staged.contains(&neighbour)
                            || self.claims.owner(&plan.dimension, neighbour) == Some(plan.faction)
                    });
                if connected {
                    if staged.insert(cell) {
                        order.push(cell);
                    }
                } else {
                    deferred.push(cell);
                }
            }
            if deferred.len() == before {
                return Err(deferred[0]);
            }
            remaining = deferred;
        }
        Ok(order)
    }

    fn territory_actor(&self, actor: UserId, required: Rank) -> Result<FactionId, Rank> {
        let (faction, rank) = self.membership(actor).ok_or(required)?;
        if rank.is_at_least(required) || self.has_bypass(actor) {
            Ok(faction)
        } else {
            Err(required)
        }
    }

    fn claim_actor(&self, actor: UserId) -> Result<FactionId, ClaimError> {
        if self.faction_of(actor).is_none() {
            return Err(ClaimError::NotInFaction);
        }
        self.territory_actor(actor, Rank::Commander)
            .map_err(|required| ClaimError::InsufficientRank { required })
    }

    /// Claims a `(2 * size - 1)^2` square around `origin` for the actor's
    /// faction. A faction's very first claim may be held back for
    /// confirmation.
    pub fn claim(
        &mut self,
        actor: UserId,
        dimension: &str,
        origin: CellPos,
        size: u32,
        now: Timestamp,
    ) -> Result<ClaimResponse, ClaimError> {
        let faction = self.claim_actor(actor)?;
        let plan = self
            .compute_claim_plan(faction, dimension, origin, size)
            .map_err(|err| {
                tracing::debug!(target: "factions::claims", actor = %actor, error = %err, "claim.rejected");
                err
            })?;

        let first_claim = self
            .factions
            .get(faction)
            .map_or(false, |entry| !entry.first_claim_confirmed);
        if self.config().claim.require_first_confirmation
            && first_claim
            && self.claims.demesne(faction) == 0
        {
            self.pending_claims.put(
                actor,
                ClaimRequest {
                    faction,
                    dimension: dimension.to_string(),
                    origin,
                    size,
                },
                now,
            );
            tracing::debug!(target: "factions::claims", actor = %actor, faction = %faction, "claim.awaiting_confirmation");
            return Ok(ClaimResponse::ConfirmationRequired);
        }

        self.apply_claim_plan(&plan).map(ClaimResponse::Applied)
    }

    /// Confirms a queued first claim. The plan is recomputed against the
    /// current grid.
    pub fn confirm_claim(&mut self, actor: UserId, now: Timestamp) -> Result<ClaimOutcome, ClaimError> {
        let request = self.pending_claims.take(&actor, now)?;
        let faction = self.claim_actor(actor)?;
        if faction != request.faction {
            return Err(ClaimError::FactionChanged);
        }
        let plan =
            self.compute_claim_plan(faction, &request.dimension, request.origin, request.size)?;
        self.apply_claim_plan(&plan)
    }

    pub fn has_pending_claim(&self, actor: UserId, now: Timestamp) -> bool {
        self.pending_claims.contains(&actor, now)
    }

    /// Raises or lowers a claim's access level. The level must sit below the
    /// actor's own rank.
    pub fn change_claim_access(
        &mut self,
        actor: UserId,
        dimension: &str,
        cell: CellPos,
        change: AccessChange,
    ) -> Result<Rank, ClaimError> {
        let bypass = self.has_bypass(actor);
        let (faction, rank) = self.membership(actor).ok_or(ClaimError::NotInFaction)?;
        if !bypass && !rank.is_at_least(Rank::Leader) {
            return Err(ClaimError::InsufficientRank {
                required: Rank::Leader,
            });
        }
        let claim = *self
            .claims
            .get(dimension, cell)
            .ok_or(ClaimError::Unclaimed(cell))?;
        if claim.faction != faction && !bypass {
            return Err(ClaimError::ForeignClaim(cell));
        }
        if !bypass && claim.access_level >= rank {
            return Err(ClaimError::AccessAboveRank);
        }
        let updated = match change {
            AccessChange::Raise => claim.access_level.raised().ok_or(ClaimError::AccessAtMaximum)?,
            AccessChange::Lower => match claim.access_level {
                Rank::Member | Rank::Guest => return Err(ClaimError::AccessAtMinimum),
                level => level.lowered().ok_or(ClaimError::AccessAtMinimum)?,
            },
        };
        if let Some(entry) = self.claims.get_mut(dimension, cell) {
            entry.access_level = updated;
        }
        tracing::info!(
            target: "factions::claims",
            faction = %claim.faction,
            cell = %cell,
            access = %updated,
            "claim.access_changed"
        );
        self.emit(RealmEvent::FactionModified {
            faction: claim.faction,
        });
        Ok(updated)
    }

    fn unclaim_actor(&self, actor: UserId) -> Result<FactionId, UnclaimError> {
        if self.faction_of(actor).is_none() {
            return Err(UnclaimError::NotInFaction);
        }
        self.territory_actor(actor, Rank::Leader)
            .map_err(|required| UnclaimError::InsufficientRank { required })
    }

    fn check_unclaim_cooldown(&self, faction: FactionId, now: Timestamp) -> Result<(), UnclaimError> {
        match self.factions.get(faction) {
            Some(entry) if entry.unclaim_on_cooldown(now) => {
                let expiry = entry.unclaim_cooldown_expiry.unwrap_or(now);
                Err(UnclaimError::OnCooldown {
                    remaining_secs: now.millis_until(expiry).div_ceil(1_000),
                })
            }
            _ => Ok(()),
        }
    }

    fn collect_removable(
        &self,
        faction: FactionId,
        bypass: bool,
        scope: &UnclaimScope,
    ) -> Result<Vec<Removal>, UnclaimError> {
        let single = |dimension: &str, cell: CellPos| -> Result<Vec<Removal>, UnclaimError> {
            let claim = self
                .claims
                .get(dimension, cell)
                .ok_or(UnclaimError::NotClaimed(cell))?;
            if claim.faction != faction && !bypass {
                return Err(UnclaimError::ForeignClaim(cell));
            }
            Ok(vec![(dimension.to_string(), cell, claim.faction)])
        };

        let removable: Vec<_> = match scope {
            UnclaimScope::Cell { dimension, cell } => return single(dimension, *cell),
            UnclaimScope::Area {
                dimension,
                origin,
                size: 1,
            } => return single(dimension, *origin),
            UnclaimScope::Area {
                dimension,
                origin,
                size,
            } => origin
                .batch(*size)
                .filter_map(|cell| {
                    let claim = self.claims.get(dimension, cell)?;
                    (claim.faction == faction || bypass)
                        .then(|| (dimension.clone(), cell, claim.faction))
                })
                .collect(),
            UnclaimScope::All => self
                .claims
                .claims_by_dimension(faction)
                .into_iter()
                .flat_map(|(dimension, cells)| {
                    cells
                        .into_iter()
                        .map(move |cell| (dimension.clone(), cell, faction))
                })
                .collect(),
        };
        if removable.is_empty() {
            return Err(UnclaimError::NothingToRemove);
        }
        Ok(removable)
    }

    /// Releases claims for the actor's faction, subject to the unclaim
    /// cooldown and, when configured, a confirmation step.
    pub fn unclaim(
        &mut self,
        actor: UserId,
        scope: UnclaimScope,
        now: Timestamp,
    ) -> Result<UnclaimResponse, UnclaimError> {
        let faction = self.unclaim_actor(actor)?;
        match &scope {
            UnclaimScope::All if !self.config().claim.allow_remove_all => {
                return Err(UnclaimError::RemoveAllDisabled)
            }
            UnclaimScope::Area { size, .. } => {
                let max = self.config().max_batch_size();
                if *size == 0 || *size > max {
                    return Err(UnclaimError::InvalidBatchSize { size: *size, max });
                }
            }
            _ => {}
        }
        self.check_unclaim_cooldown(faction, now)?;
        let removable = self.collect_removable(faction, self.has_bypass(actor), &scope)?;

        if self.config().claim.require_unclaim_confirmation {
            self.pending_unclaims
                .put(actor, UnclaimRequest { faction, scope }, now);
            return Ok(UnclaimResponse::ConfirmationRequired);
        }
        Ok(UnclaimResponse::Removed(
            self.remove_claims(faction, removable, now),
        ))
    }

    pub fn unclaim_cell(
        &mut self,
        actor: UserId,
        dimension: &str,
        cell: CellPos,
        now: Timestamp,
    ) -> Result<UnclaimResponse, UnclaimError> {
        let scope = UnclaimScope::Cell {
            dimension: dimension.to_string(),
            cell,
        };
        self.unclaim(actor, scope, now)
    }

    pub fn unclaim_area(
        &mut self,
        actor: UserId,
        dimension: &str,
        origin: CellPos,
        size: u32,
        now: Timestamp,
    ) -> Result<UnclaimResponse, UnclaimError> {
        let scope = UnclaimScope::Area {
            dimension: dimension.to_string(),
            origin,
            size,
        };
        self.unclaim(actor, scope, now)
    }

    pub fn unclaim_all(&mut self, actor: UserId, now: Timestamp) -> Result<UnclaimResponse, UnclaimError> {
        self.unclaim(actor, UnclaimScope::All, now)
    }

    /// Confirms a queued removal. Removable cells are collected again.
    pub fn confirm_unclaim(&mut self, actor: UserId, now: Timestamp) -> Result<usize, UnclaimError> {
        let request = self.pending_unclaims.take(&actor, now)?;
        let faction = self.unclaim_actor(actor)?;
        if faction != request.faction {
            return Err(UnclaimError::FactionChanged);
        }
        self.check_unclaim_cooldown(faction, now)?;
        let removable = self.collect_removable(faction, self.has_bypass(actor), &request.scope)?;
        Ok(self.remove_claims(faction, removable, now))
    }

    pub fn has_pending_unclaim(&self, actor: UserId, now: Timestamp) -> bool {
        self.pending_unclaims.contains(&actor, now)
    }

    fn remove_claims(
        &mut self,
        faction: FactionId,
        removable: Vec<Removal>,
        now: Timestamp,
    ) -> usize {
        let mut removed = 0;
        for (dimension, cell, owner) in removable {
            if self.claims.remove(&dimension, cell).is_none() {
                continue;
            }
            removed += 1;
            self.emit(RealmEvent::ClaimRemoved {
                dimension,
                x: cell.x,
                z: cell.z,
                faction: Some(owner),
            });
        }
        if removed == 0 {
            return 0;
        }

        let cooldown = self.config().unclaim_cooldown_millis();
        let demesne = self.claims.demesne(faction);
        if let Some(entry) = self.factions.get_mut(faction) {
            entry.unclaim_cooldown_expiry = Some(now.plus_millis(cooldown));
            if demesne == 0 {
                entry.first_claim_confirmed = false;
            }
        }
        tracing::info!(
            target: "factions::claims",
            faction = %faction,
            removed,
            demesne,
            "claims.removed"
        );
        removed
    }
}
