use bitflags::bitflags;
use factions_schema::PermissionKind;

bitflags! {
    /// Set of interaction kinds granted to guests or to another faction.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
    pub struct Permissions: u8 {
        const BREAK_BLOCKS = 1 << 0;
        const PLACE_BLOCKS = 1 << 1;
        const USE_BLOCKS = 1 << 2;
        const USE_ENTITIES = 1 << 3;
        const ATTACK_ENTITIES = 1 << 4;
        const USE_INVENTORIES = 1 << 5;
    }
}

impl Permissions {
    pub fn from_kinds(kinds: &[PermissionKind]) -> Self {
        kinds
            .iter()
            .fold(Permissions::empty(), |acc, kind| acc | Permissions::from(*kind))
    }

    #[inline]
    pub fn allows(self, kind: PermissionKind) -> bool {
        self.contains(Permissions::from(kind))
    }

    /// Kinds in the set, in declaration order.
    pub fn kinds(self) -> Vec<PermissionKind> {
        PermissionKind::ALL
            .into_iter()
            .filter(|kind| self.allows(*kind))
            .collect()
    }
}

impl From<PermissionKind> for Permissions {
    fn from(kind: PermissionKind) -> Self {
        match kind {
            PermissionKind::BreakBlocks => Permissions::BREAK_BLOCKS,
            PermissionKind::PlaceBlocks => Permissions::PLACE_BLOCKS,
            PermissionKind::UseBlocks => Permissions::USE_BLOCKS,
            PermissionKind::UseEntities => Permissions::USE_ENTITIES,
            PermissionKind::AttackEntities => Permissions::ATTACK_ENTITIES,
            PermissionKind::UseInventories => Permissions::USE_INVENTORIES,
        }
    }
}
