//! Data contracts shared by the factions engine and anything that stores or
//! observes its state.
//!
//! Record field names are part of the on-disk contract and must not change
//! between versions; new fields are added with `#[serde(default)]`.

use ahash::RandomState;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{BuildHasher, Hasher};

/// Membership rank inside a faction. Also used as the access level of a claim.
///
/// Ordering follows seniority: `Owner > Leader > Commander > Member > Guest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rank {
    Owner,
    Leader,
    Commander,
    Member,
    Guest,
}

/// Seniority of every rank, indexed by discriminant.
pub const RANK_SENIORITY: [(Rank, i8); 5] = [
    (Rank::Owner, 3),
    (Rank::Leader, 2),
    (Rank::Commander, 1),
    (Rank::Member, 0),
    (Rank::Guest, -1),
];

impl Rank {
    pub const ALL: [Rank; 5] = [
        Rank::Owner,
        Rank::Leader,
        Rank::Commander,
        Rank::Member,
        Rank::Guest,
    ];

    #[inline]
    pub fn seniority(self) -> i8 {
        RANK_SENIORITY[self as usize].1
    }

    /// True when `self` is as senior as `required` or more.
    #[inline]
    pub fn is_at_least(self, required: Rank) -> bool {
        self.seniority() >= required.seniority()
    }

    /// Next rank up, used when raising a claim's access level.
    pub fn raised(self) -> Option<Rank> {
        match self {
            Rank::Owner => None,
            Rank::Leader => Some(Rank::Owner),
            Rank::Commander => Some(Rank::Leader),
            Rank::Member => Some(Rank::Commander),
            Rank::Guest => Some(Rank::Member),
        }
    }

    /// Next rank down. Returns `None` at the bottom of the ladder.
    pub fn lowered(self) -> Option<Rank> {
        match self {
            Rank::Owner => Some(Rank::Leader),
            Rank::Leader => Some(Rank::Commander),
            Rank::Commander => Some(Rank::Member),
            Rank::Member => Some(Rank::Guest),
            Rank::Guest => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rank::Owner => "owner",
            Rank::Leader => "leader",
            Rank::Commander => "commander",
            Rank::Member => "member",
            Rank::Guest => "guest",
        }
    }
}

impl PartialOrd for Rank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rank {
    fn cmp(&self, other: &Self) -> Ordering {
        self.seniority().cmp(&other.seniority())
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One direction of a relationship between two factions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipStatus {
    #[default]
    Neutral,
    Friendly,
    Ally,
    War,
}

impl RelationshipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipStatus::Neutral => "neutral",
            RelationshipStatus::Friendly => "friendly",
            RelationshipStatus::Ally => "ally",
            RelationshipStatus::War => "war",
        }
    }

    /// Friendly and Ally are the statuses that can be requested unilaterally.
    pub fn is_cordial(&self) -> bool {
        matches!(self, RelationshipStatus::Friendly | RelationshipStatus::Ally)
    }
}

impl fmt::Display for RelationshipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of world interaction that claims protect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionKind {
    BreakBlocks,
    PlaceBlocks,
    UseBlocks,
    UseEntities,
    AttackEntities,
    UseInventories,
}

impl PermissionKind {
    pub const ALL: [PermissionKind; 6] = [
        PermissionKind::BreakBlocks,
        PermissionKind::PlaceBlocks,
        PermissionKind::UseBlocks,
        PermissionKind::UseEntities,
        PermissionKind::AttackEntities,
        PermissionKind::UseInventories,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionKind::BreakBlocks => "break_blocks",
            PermissionKind::PlaceBlocks => "place_blocks",
            PermissionKind::UseBlocks => "use_blocks",
            PermissionKind::UseEntities => "use_entities",
            PermissionKind::AttackEntities => "attack_entities",
            PermissionKind::UseInventories => "use_inventories",
        }
    }
}

impl fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatMode {
    Focus,
    Faction,
    #[default]
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SoundMode {
    None,
    Warnings,
    Faction,
    #[default]
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomeRecord {
    #[serde(rename = "Level")]
    pub dimension: String,
    #[serde(rename = "X")]
    pub x: f64,
    #[serde(rename = "Y")]
    pub y: f64,
    #[serde(rename = "Z")]
    pub z: f64,
    #[serde(rename = "Yaw")]
    pub yaw: f32,
    #[serde(rename = "Pitch")]
    pub pitch: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    #[serde(rename = "Target")]
    pub target: u32,
    #[serde(rename = "Status")]
    pub status: RelationshipStatus,
    #[serde(rename = "Permissions", default)]
    pub permissions: Vec<PermissionKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactionRecord {
    #[serde(rename = "ID")]
    pub id: u32,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Description", default)]
    pub description: String,
    #[serde(rename = "MOTD", default)]
    pub motd: String,
    #[serde(rename = "Color", default)]
    pub color: String,
    #[serde(rename = "Open", default)]
    pub open: bool,
    #[serde(rename = "AdminPower", default)]
    pub admin_power: i32,
    #[serde(rename = "Home", default)]
    pub home: Option<HomeRecord>,
    #[serde(rename = "Invites", default)]
    pub invites: Vec<u64>,
    #[serde(rename = "Relationships", default)]
    pub relationships: Vec<RelationshipRecord>,
    #[serde(rename = "GuestPermissions", default)]
    pub guest_permissions: Vec<PermissionKind>,
    #[serde(rename = "UnclaimCooldownExpiry", default)]
    pub unclaim_cooldown_expiry: Option<u64>,
    #[serde(rename = "FirstClaimConfirmed", default)]
    pub first_claim_confirmed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(rename = "ID")]
    pub id: u64,
    #[serde(rename = "FactionID", default)]
    pub faction_id: Option<u32>,
    #[serde(rename = "Rank", default)]
    pub rank: Option<Rank>,
    #[serde(rename = "Power")]
    pub power: i32,
    #[serde(rename = "Radar", default)]
    pub radar: bool,
    #[serde(rename = "Chat", default)]
    pub chat: ChatMode,
    #[serde(rename = "Sounds", default)]
    pub sounds: SoundMode,
    #[serde(rename = "HomeCooldown", default)]
    pub home_cooldown: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    #[serde(rename = "X")]
    pub x: i32,
    #[serde(rename = "Z")]
    pub z: i32,
    #[serde(rename = "Level")]
    pub dimension: String,
    #[serde(rename = "FactionID")]
    pub faction_id: u32,
    #[serde(rename = "AccessLevel")]
    pub access_level: Rank,
}

/// Every persisted entity, grouped by record name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RealmRecords {
    #[serde(rename = "Faction", default)]
    pub factions: Vec<FactionRecord>,
    #[serde(rename = "User", default)]
    pub users: Vec<UserRecord>,
    #[serde(rename = "Claim", default)]
    pub claims: Vec<ClaimRecord>,
}

pub fn encode_records(records: &RealmRecords) -> bincode::Result<Vec<u8>> {
    bincode::serialize(records)
}

pub fn decode_records(bytes: &[u8]) -> bincode::Result<RealmRecords> {
    bincode::deserialize(bytes)
}

pub fn records_to_json(records: &RealmRecords) -> serde_json::Result<String> {
    serde_json::to_string_pretty(records)
}

pub fn records_from_json(json: &str) -> serde_json::Result<RealmRecords> {
    serde_json::from_str(json)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub tick: u64,
    pub faction_count: u32,
    pub claim_count: u32,
    pub hash: u64,
}

impl SnapshotHeader {
    pub fn new(tick: u64, faction_count: usize, claim_count: usize) -> Self {
        Self {
            tick,
            faction_count: faction_count as u32,
            claim_count: claim_count as u32,
            hash: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactionSummaryState {
    pub id: u32,
    pub name: String,
    pub color: String,
    pub open: bool,
    pub power: i32,
    pub max_power: i32,
    pub demesne: u32,
    pub members: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimState {
    pub dimension: String,
    pub x: i32,
    pub z: i32,
    pub faction: u32,
}

/// Full view handed to an observer that joins mid-session. Subsequent changes
/// reach it through the engine's event stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealmSnapshot {
    pub header: SnapshotHeader,
    pub factions: Vec<FactionSummaryState>,
    pub claims: Vec<ClaimState>,
}

impl RealmSnapshot {
    pub fn finalize(mut self) -> bincode::Result<Self> {
        self.header.hash = hash_snapshot(&self)?;
        Ok(self)
    }
}

/// Deterministic content hash; the header hash itself is excluded.
pub fn hash_snapshot(snapshot: &RealmSnapshot) -> bincode::Result<u64> {
    let mut clone = snapshot.clone();
    clone.header.hash = 0;
    let encoded = bincode::serialize(&clone)?;
    let mut hasher = RandomState::with_seeds(0, 0, 0, 0).build_hasher();
    hasher.write(&encoded);
    Ok(hasher.finish())
}

pub fn encode_snapshot(snapshot: &RealmSnapshot) -> bincode::Result<Vec<u8>> {
    bincode::serialize(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seniority_table_is_indexed_by_discriminant() {
        for (index, (rank, _)) in RANK_SENIORITY.iter().enumerate() {
            assert_eq!(*rank as usize, index);
        }
    }

    #[test]
    fn rank_ordering_is_exhaustive() {
        // Row rank is at least column rank.
        let expected = [
            [true, true, true, true, true],
            [false, true, true, true, true],
            [false, false, true, true, true],
            [false, false, false, true, true],
            [false, false, false, false, true],
        ];
        for (row, actor) in Rank::ALL.iter().enumerate() {
            for (col, required) in Rank::ALL.iter().enumerate() {
                assert_eq!(
                    actor.is_at_least(*required),
                    expected[row][col],
                    "{actor} vs {required}"
                );
                assert_eq!(
                    *actor >= *required,
                    expected[row][col],
                    "ordering {actor} vs {required}"
                );
            }
        }
    }

    #[test]
    fn raise_and_lower_walk_the_ladder() {
        assert_eq!(Rank::Member.raised(), Some(Rank::Commander));
        assert_eq!(Rank::Owner.raised(), None);
        assert_eq!(Rank::Commander.lowered(), Some(Rank::Member));
        assert_eq!(Rank::Guest.lowered(), None);
        for rank in Rank::ALL {
            if let Some(up) = rank.raised() {
                assert!(up > rank);
                assert_eq!(up.lowered(), Some(rank));
            }
        }
    }

    #[test]
    fn record_field_names_are_stable() {
        let records = RealmRecords {
            factions: vec![FactionRecord {
                id: 7,
                name: "Northwatch".into(),
                description: String::new(),
                motd: String::new(),
                color: "red".into(),
                open: false,
                admin_power: 0,
                home: None,
                invites: vec![],
                relationships: vec![RelationshipRecord {
                    target: 9,
                    status: RelationshipStatus::Ally,
                    permissions: vec![PermissionKind::UseBlocks],
                }],
                guest_permissions: vec![PermissionKind::UseEntities],
                unclaim_cooldown_expiry: Some(1_000),
                first_claim_confirmed: true,
            }],
            users: vec![UserRecord {
                id: 42,
                faction_id: Some(7),
                rank: Some(Rank::Owner),
                power: 10,
                radar: false,
                chat: ChatMode::Global,
                sounds: SoundMode::All,
                home_cooldown: None,
            }],
            claims: vec![ClaimRecord {
                x: 1,
                z: -2,
                dimension: "overworld".into(),
                faction_id: 7,
                access_level: Rank::Member,
            }],
        };

        let json = records_to_json(&records).expect("records encode");
        for field in [
            "\"Faction\"",
            "\"User\"",
            "\"Claim\"",
            "\"ID\"",
            "\"MOTD\"",
            "\"GuestPermissions\"",
            "\"UnclaimCooldownExpiry\"",
            "\"FirstClaimConfirmed\"",
            "\"FactionID\"",
            "\"AccessLevel\"",
            "\"USE_BLOCKS\"",
            "\"ALLY\"",
            "\"OWNER\"",
        ] {
            assert!(json.contains(field), "missing {field} in {json}");
        }

        let decoded = records_from_json(&json).expect("records decode");
        assert_eq!(decoded, records);

        let bytes = encode_records(&records).expect("bincode encode");
        assert_eq!(decode_records(&bytes).expect("bincode decode"), records);
    }

    #[test]
    fn missing_optional_fields_take_defaults() {
        let json = r#"{"User":[{"ID":3,"Power":5}]}"#;
        let records = records_from_json(json).expect("partial records parse");
        let user = &records.users[0];
        assert_eq!(user.faction_id, None);
        assert_eq!(user.chat, ChatMode::Global);
        assert_eq!(user.sounds, SoundMode::All);
        assert!(records.factions.is_empty());
    }

    #[test]
    fn snapshot_hash_tracks_content() {
        let base = RealmSnapshot {
            header: SnapshotHeader::new(4, 1, 1),
            factions: vec![FactionSummaryState {
                id: 1,
                name: "A".into(),
                color: "white".into(),
                open: false,
                power: 10,
                max_power: 20,
                demesne: 1,
                members: 1,
            }],
            claims: vec![ClaimState {
                dimension: "overworld".into(),
                x: 0,
                z: 0,
                faction: 1,
            }],
        };

        let first = base.clone().finalize().expect("hash");
        let second = base.clone().finalize().expect("hash");
        assert_eq!(first.header.hash, second.header.hash);
        assert_ne!(first.header.hash, 0);

        let mut moved = base;
        moved.claims[0].x = 1;
        let moved = moved.finalize().expect("hash");
        assert_ne!(moved.header.hash, first.header.hash);
    }
}
