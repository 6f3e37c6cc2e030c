//! Allow/deny decisions for world interactions.
//!
//! The resolver is an ordered table of rules; the first rule that returns a
//! decision wins and anything left over is denied. It only reads the realm
//! and never allocates.

use factions_schema::{PermissionKind, Rank, RelationshipStatus};

use crate::claims::Claim;
use crate::directory::{Faction, User};
use crate::identity::{CellPos, UserId};
use crate::permissions::Permissions;
use crate::realm::Realm;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allow)
    }

    fn from_bool(allowed: bool) -> Self {
        if allowed {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

/// One world interaction, already translated to a claim cell.
#[derive(Debug, Clone, Copy)]
pub struct PermissionQuery<'a> {
    pub actor: UserId,
    pub dimension: &'a str,
    pub cell: CellPos,
    pub kind: PermissionKind,
    /// Material identity for break/place checks in the wilderness.
    pub material: Option<&'a str>,
}

impl<'a> PermissionQuery<'a> {
    pub fn new(actor: UserId, dimension: &'a str, cell: CellPos, kind: PermissionKind) -> Self {
        Self {
            actor,
            dimension,
            cell,
            kind,
            material: None,
        }
    }

    pub fn with_material(mut self, material: &'a str) -> Self {
        self.material = Some(material);
        self
    }
}

struct Context<'r, 'q> {
    realm: &'r Realm,
    query: &'q PermissionQuery<'q>,
    user: Option<&'r User>,
    claim: Option<&'r Claim>,
}

impl<'r> Context<'r, '_> {
    fn claim_owner(&self) -> Option<&'r Faction> {
        self.claim
            .and_then(|claim| self.realm.factions.get(claim.faction))
    }

    /// Guest set of the owning faction; a claim whose owner is gone grants
    /// nothing.
    fn owner_guest_permissions(&self) -> Permissions {
        self.claim_owner()
            .map_or(Permissions::empty(), |faction| faction.guest_permissions)
    }

    fn default_access(&self) -> bool {
        self.claim
            .map_or(false, |claim| claim.access_level == Rank::Member)
    }
}

type Rule = fn(&Context<'_, '_>) -> Option<Decision>;

/// Evaluated top to bottom.
const RULES: [(&str, Rule); 6] = [
    ("protection_disabled", protection_disabled),
    ("bypass", bypass),
    ("wilderness", wilderness),
    ("factionless_actor", factionless_actor),
    ("own_territory", own_territory),
    ("foreign_territory", foreign_territory),
];

fn protection_disabled(ctx: &Context<'_, '_>) -> Option<Decision> {
    (!ctx.realm.config().claim_protection).then_some(Decision::Allow)
}

fn bypass(ctx: &Context<'_, '_>) -> Option<Decision> {
    ctx.user
        .map_or(false, |user| user.bypass)
        .then_some(Decision::Allow)
}

fn wilderness(ctx: &Context<'_, '_>) -> Option<Decision> {
    if ctx.claim.is_some() {
        return None;
    }
    let wilderness = &ctx.realm.config().wilderness;
    let allowlist = match ctx.query.kind {
        PermissionKind::BreakBlocks => &wilderness.break_allowlist,
        PermissionKind::PlaceBlocks => &wilderness.place_allowlist,
        _ => return Some(Decision::Allow),
    };
    let listed = ctx
        .query
        .material
        .map_or(false, |material| allowlist.contains(material));
    Some(Decision::from_bool(listed))
}

fn factionless_actor(ctx: &Context<'_, '_>) -> Option<Decision> {
    if ctx.user.and_then(User::faction).is_some() {
        return None;
    }
    Some(Decision::from_bool(
        ctx.owner_guest_permissions().allows(ctx.query.kind),
    ))
}

fn own_territory(ctx: &Context<'_, '_>) -> Option<Decision> {
    let (user, claim) = (ctx.user?, ctx.claim?);
    if user.faction() != Some(claim.faction) {
        return None;
    }
    let ranked = user.rank.is_at_least(claim.access_level);
    let guest = user.rank == Rank::Guest
        && ctx.default_access()
        && ctx.owner_guest_permissions().allows(ctx.query.kind);
    (ranked || guest).then_some(Decision::Allow)
}

fn foreign_territory(ctx: &Context<'_, '_>) -> Option<Decision> {
    let (user, claim) = (ctx.user?, ctx.claim?);
    let actor_faction = user.faction()?;
    if actor_faction == claim.faction || !ctx.default_access() {
        return None;
    }
    let relationships = &ctx.realm.relationships;
    let allied = ctx.realm.config().relationships.ally_overrides_permissions
        && relationships.is_mutual(claim.faction, actor_faction, RelationshipStatus::Ally);
    let granted = relationships
        .get(claim.faction, actor_faction)
        .permissions
        .allows(ctx.query.kind);
    (allied || granted).then_some(Decision::Allow)
}

impl Realm {
    pub fn check_permission(&self, query: &PermissionQuery<'_>) -> Decision {
        self.explain_permission(query).0
    }

    /// Decision plus the name of the rule that produced it (`"deny"` when no
    /// rule matched).
    pub fn explain_permission(&self, query: &PermissionQuery<'_>) -> (Decision, &'static str) {
        let ctx = Context {
            realm: self,
            query,
            user: self.users.get(query.actor),
            claim: self.claims.get(query.dimension, query.cell),
        };
        RULES
            .iter()
            .find_map(|(name, rule)| rule(&ctx).map(|decision| (decision, *name)))
            .unwrap_or((Decision::Deny, "deny"))
    }

    /// Whether `attacker` may hurt `target`. With friendly fire off, players
    /// of the same faction, mutual allies and factions not mutually at war
    /// are protected from each other; factionless players never are.
    pub fn can_damage(&self, attacker: UserId, target: UserId) -> bool {
        if self.config().friendly_fire {
            return true;
        }
        let (Some(source), Some(victim)) = (self.faction_of(attacker), self.faction_of(target))
        else {
            return true;
        };
        if source == victim {
            return false;
        }
        self.relationships
            .is_mutual(source, victim, RelationshipStatus::War)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::FactionsConfig;
    use crate::identity::FactionId;

    const OVERWORLD: &str = "overworld";
    const HOME: FactionId = FactionId(1);
    const OTHER: FactionId = FactionId(2);
    const OWNER: UserId = UserId(1);
    const STRANGER: UserId = UserId(9);
    const VISITOR: UserId = UserId(20);
    const CELL: CellPos = CellPos::new(0, 0);

    fn realm_with(config: FactionsConfig) -> Realm {
        let mut realm = Realm::new(Arc::new(config));
        realm.factions.insert(Faction::new(
            HOME,
            "north",
            Permissions::from(PermissionKind::UseEntities),
        ));
        realm
            .factions
            .insert(Faction::new(OTHER, "south", Permissions::empty()));
        realm.users.set_membership(OWNER, HOME, Rank::Owner);
        realm.users.set_membership(VISITOR, OTHER, Rank::Member);
        realm.claims.insert(OVERWORLD, CELL, Claim::new(HOME));
        realm
    }

    fn realm() -> Realm {
        realm_with(FactionsConfig::default())
    }

    fn query(actor: UserId, kind: PermissionKind) -> PermissionQuery<'static> {
        PermissionQuery::new(actor, OVERWORLD, CELL, kind)
    }

    fn explain(realm: &Realm, query: PermissionQuery<'_>) -> (Decision, &'static str) {
        realm.explain_permission(&query)
    }

    #[test]
    fn disabled_protection_allows_everything() {
        let mut config = FactionsConfig::default();
        config.claim_protection = false;
        let realm = realm_with(config);
        assert_eq!(
            explain(&realm, query(VISITOR, PermissionKind::BreakBlocks)),
            (Decision::Allow, "protection_disabled")
        );
    }

    #[test]
    fn bypass_allows_in_foreign_territory() {
        let mut realm = realm();
        realm.set_bypass(VISITOR, true);
        assert_eq!(
            explain(&realm, query(VISITOR, PermissionKind::BreakBlocks)),
            (Decision::Allow, "bypass")
        );
    }

    #[test]
    fn wilderness_restricts_only_break_and_place() {
        let mut config = FactionsConfig::default();
        config
            .wilderness
            .break_allowlist
            .insert("minecraft:dirt".to_string());
        let realm = realm_with(config);
        let open = PermissionQuery::new(VISITOR, OVERWORLD, CellPos::new(5, 5), PermissionKind::BreakBlocks);

        assert_eq!(realm.check_permission(&open), Decision::Deny);
        assert_eq!(
            realm.check_permission(&open.with_material("minecraft:dirt")),
            Decision::Allow
        );
        assert_eq!(
            realm.check_permission(&open.with_material("minecraft:stone")),
            Decision::Deny
        );
        let place = PermissionQuery {
            kind: PermissionKind::PlaceBlocks,
            ..open.with_material("minecraft:dirt")
        };
        assert_eq!(explain(&realm, place), (Decision::Deny, "wilderness"));
        let door = PermissionQuery {
            kind: PermissionKind::UseBlocks,
            ..open
        };
        assert_eq!(explain(&realm, door), (Decision::Allow, "wilderness"));
    }

    #[test]
    fn factionless_actors_use_guest_permissions() {
        let realm = realm();
        assert_eq!(
            explain(&realm, query(STRANGER, PermissionKind::UseEntities)),
            (Decision::Allow, "factionless_actor")
        );
        assert_eq!(
            explain(&realm, query(STRANGER, PermissionKind::BreakBlocks)),
            (Decision::Deny, "factionless_actor")
        );
    }

    #[test]
    fn own_territory_respects_access_level() {
        let mut realm = realm();
        realm.users.set_membership(UserId(2), HOME, Rank::Member);
        assert!(realm
            .check_permission(&query(UserId(2), PermissionKind::BreakBlocks))
            .is_allowed());

        if let Some(claim) = realm.claims.get_mut(OVERWORLD, CELL) {
            claim.access_level = Rank::Leader;
        }
        assert_eq!(
            realm.check_permission(&query(UserId(2), PermissionKind::BreakBlocks)),
            Decision::Deny
        );
        assert_eq!(
            explain(&realm, query(OWNER, PermissionKind::BreakBlocks)),
            (Decision::Allow, "own_territory")
        );
    }

    #[test]
    fn guests_need_default_access_and_guest_grant() {
        let mut realm = realm();
        realm.users.set_membership(UserId(3), HOME, Rank::Guest);
        assert!(realm
            .check_permission(&query(UserId(3), PermissionKind::UseEntities))
            .is_allowed());
        assert_eq!(
            explain(&realm, query(UserId(3), PermissionKind::BreakBlocks)),
            (Decision::Deny, "deny")
        );

        if let Some(claim) = realm.claims.get_mut(OVERWORLD, CELL) {
            claim.access_level = Rank::Commander;
        }
        assert_eq!(
            realm.check_permission(&query(UserId(3), PermissionKind::UseEntities)),
            Decision::Deny
        );
    }

    #[test]
    fn mutual_allies_override_on_default_claims() {
        let mut realm = realm();
        assert_eq!(
            realm.check_permission(&query(VISITOR, PermissionKind::BreakBlocks)),
            Decision::Deny
        );

        realm
            .relationships
            .set_status(HOME, OTHER, RelationshipStatus::Ally);
        assert_eq!(
            realm.check_permission(&query(VISITOR, PermissionKind::BreakBlocks)),
            Decision::Deny
        );
        realm
            .relationships
            .set_status(OTHER, HOME, RelationshipStatus::Ally);
        assert_eq!(
            explain(&realm, query(VISITOR, PermissionKind::BreakBlocks)),
            (Decision::Allow, "foreign_territory")
        );

        if let Some(claim) = realm.claims.get_mut(OVERWORLD, CELL) {
            claim.access_level = Rank::Commander;
        }
        assert_eq!(
            realm.check_permission(&query(VISITOR, PermissionKind::BreakBlocks)),
            Decision::Deny
        );
    }

    #[test]
    fn ally_override_can_be_disabled() {
        let mut config = FactionsConfig::default();
        config.relationships.ally_overrides_permissions = false;
        let mut realm = realm_with(config);
        realm
            .relationships
            .set_status(HOME, OTHER, RelationshipStatus::Ally);
        realm
            .relationships
            .set_status(OTHER, HOME, RelationshipStatus::Ally);
        assert_eq!(
            realm.check_permission(&query(VISITOR, PermissionKind::BreakBlocks)),
            Decision::Deny
        );
    }

    #[test]
    fn relationship_grants_apply_to_the_target_faction() {
        let mut realm = realm();
        realm.relationships.set_permissions(
            HOME,
            OTHER,
            Permissions::from(PermissionKind::UseInventories),
        );
        assert!(realm
            .check_permission(&query(VISITOR, PermissionKind::UseInventories))
            .is_allowed());
        assert_eq!(
            realm.check_permission(&query(VISITOR, PermissionKind::BreakBlocks)),
            Decision::Deny
        );
        // Edges granted by the visitor's own faction do not count.
        realm.relationships.set_permissions(
            OTHER,
            HOME,
            Permissions::from(PermissionKind::BreakBlocks),
        );
        assert_eq!(
            realm.check_permission(&query(VISITOR, PermissionKind::BreakBlocks)),
            Decision::Deny
        );
    }

    #[test]
    fn orphaned_claim_grants_nothing() {
        let mut realm = realm();
        realm
            .claims
            .insert(OVERWORLD, CellPos::new(1, 0), Claim::new(FactionId(77)));
        let orphan = PermissionQuery::new(STRANGER, OVERWORLD, CellPos::new(1, 0), PermissionKind::UseEntities);
        assert_eq!(realm.check_permission(&orphan), Decision::Deny);
    }

    #[test]
    fn friendly_fire_rules() {
        let mut realm = realm();
        realm.users.set_membership(UserId(2), HOME, Rank::Member);

        assert!(!realm.can_damage(OWNER, UserId(2)));
        assert!(!realm.can_damage(OWNER, VISITOR));
        assert!(realm.can_damage(OWNER, STRANGER));
        assert!(realm.can_damage(STRANGER, OWNER));

        realm
            .relationships
            .set_status(HOME, OTHER, RelationshipStatus::War);
        assert!(!realm.can_damage(OWNER, VISITOR));
        realm
            .relationships
            .set_status(OTHER, HOME, RelationshipStatus::War);
        assert!(realm.can_damage(OWNER, VISITOR));
    }

    #[test]
    fn friendly_fire_enabled_allows_all_damage() {
        let mut config = FactionsConfig::default();
        config.friendly_fire = true;
        let mut realm = realm_with(config);
        realm.users.set_membership(UserId(2), HOME, Rank::Member);
        assert!(realm.can_damage(OWNER, UserId(2)));
    }
}
