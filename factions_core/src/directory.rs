use std::collections::{BTreeMap, BTreeSet, HashMap};

use factions_schema::{ChatMode, HomeRecord, Rank, SoundMode};

use crate::identity::{FactionId, Timestamp, UserId};
use crate::permissions::Permissions;

#[derive(Debug, Clone, PartialEq)]
pub struct Home {
    pub dimension: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
}

impl Home {
    pub fn from_record(record: &HomeRecord) -> Self {
        Self {
            dimension: record.dimension.clone(),
            x: record.x,
            y: record.y,
            z: record.z,
            yaw: record.yaw,
            pitch: record.pitch,
        }
    }

    pub fn to_record(&self) -> HomeRecord {
        HomeRecord {
            dimension: self.dimension.clone(),
            x: self.x,
            y: self.y,
            z: self.z,
            yaw: self.yaw,
            pitch: self.pitch,
        }
    }
}

/// A player as seen by the engine. Membership is managed by [`UserDirectory`]
/// so the per-faction member index stays in step.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    faction: Option<FactionId>,
    pub rank: Rank,
    pub power: i32,
    pub radar: bool,
    pub chat: ChatMode,
    pub sounds: SoundMode,
    pub home_cooldown: Option<Timestamp>,
    /// Transient host state; neither field is persisted.
    pub online: bool,
    pub bypass: bool,
}

impl User {
    pub fn new(id: UserId, power: i32) -> Self {
        Self {
            id,
            faction: None,
            rank: Rank::Member,
            power,
            radar: false,
            chat: ChatMode::default(),
            sounds: SoundMode::default(),
            home_cooldown: None,
            online: false,
            bypass: false,
        }
    }

    #[inline]
    pub fn faction(&self) -> Option<FactionId> {
        self.faction
    }

    /// Rank inside the user's faction, `None` when factionless.
    #[inline]
    pub fn faction_rank(&self) -> Option<Rank> {
        self.faction.map(|_| self.rank)
    }
}

#[derive(Debug, Clone)]
pub struct Faction {
    pub id: FactionId,
    pub name: String,
    pub description: String,
    pub motd: String,
    pub color: String,
    pub open: bool,
    pub admin_power: i32,
    pub home: Option<Home>,
    pub invites: BTreeSet<UserId>,
    pub guest_permissions: Permissions,
    pub unclaim_cooldown_expiry: Option<Timestamp>,
    pub first_claim_confirmed: bool,
}

impl Faction {
    pub fn new(id: FactionId, name: impl Into<String>, guest_permissions: Permissions) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            motd: String::new(),
            color: "white".to_string(),
            open: false,
            admin_power: 0,
            home: None,
            invites: BTreeSet::new(),
            guest_permissions,
            unclaim_cooldown_expiry: None,
            first_claim_confirmed: false,
        }
    }

    pub fn unclaim_on_cooldown(&self, now: Timestamp) -> bool {
        self.unclaim_cooldown_expiry
            .map_or(false, |expiry| now < expiry)
    }
}

/// Users keyed by id, created on first reference.
#[derive(Debug, Default)]
pub struct UserDirectory {
    users: HashMap<UserId, User>,
    members: HashMap<FactionId, BTreeSet<UserId>>,
    start_power: i32,
}

impl UserDirectory {
    pub fn new(start_power: i32) -> Self {
        Self {
            users: HashMap::new(),
            members: HashMap::new(),
            start_power,
        }
    }

    pub fn get(&self, id: UserId) -> Option<&User> {
        self.users.get(&id)
    }

    pub fn get_mut(&mut self, id: UserId) -> Option<&mut User> {
        self.users.get_mut(&id)
    }

    pub fn get_or_create(&mut self, id: UserId) -> &mut User {
        let start_power = self.start_power;
        self.users
            .entry(id)
            .or_insert_with(|| User::new(id, start_power))
    }

    /// Inserts a fully formed user, typically restored from a record.
    pub fn insert(&mut self, user: User) {
        if let Some(previous) = self.users.get(&user.id).and_then(User::faction) {
            self.unindex(previous, user.id);
        }
        if let Some(faction) = user.faction {
            self.members.entry(faction).or_default().insert(user.id);
        }
        self.users.insert(user.id, user);
    }

    pub fn set_membership(&mut self, id: UserId, faction: FactionId, rank: Rank) {
        let previous = {
            let user = self.get_or_create(id);
            let previous = user.faction.replace(faction);
            user.rank = rank;
            previous
        };
        if let Some(previous) = previous.filter(|previous| *previous != faction) {
            self.unindex(previous, id);
        }
        self.members.entry(faction).or_default().insert(id);
    }

    /// Detaches the user from their faction. Returns the faction they left.
    pub fn clear_membership(&mut self, id: UserId) -> Option<FactionId> {
        let user = self.users.get_mut(&id)?;
        let previous = user.faction.take();
        user.rank = Rank::Member;
        if let Some(previous) = previous {
            self.unindex(previous, id);
        }
        previous
    }

    pub fn members(&self, faction: FactionId) -> impl Iterator<Item = &User> + '_ {
        self.members
            .get(&faction)
            .into_iter()
            .flat_map(|ids| ids.iter())
            .filter_map(|id| self.users.get(id))
    }

    pub fn member_ids(&self, faction: FactionId) -> Vec<UserId> {
        self.members
            .get(&faction)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn member_count(&self, faction: FactionId) -> usize {
        self.members.get(&faction).map_or(0, BTreeSet::len)
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn ids(&self) -> Vec<UserId> {
        let mut ids: Vec<_> = self.users.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    fn unindex(&mut self, faction: FactionId, id: UserId) {
        if let Some(ids) = self.members.get_mut(&faction) {
            ids.remove(&id);
            if ids.is_empty() {
                self.members.remove(&faction);
            }
        }
    }
}

/// Factions keyed by id. Iteration is ordered by id.
#[derive(Debug, Default)]
pub struct FactionDirectory {
    factions: BTreeMap<FactionId, Faction>,
    next_id: u32,
}

impl FactionDirectory {
    pub fn allocate_id(&mut self) -> FactionId {
        while self.factions.contains_key(&FactionId(self.next_id)) {
            self.next_id = self.next_id.wrapping_add(1);
        }
        let id = FactionId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    pub fn insert(&mut self, faction: Faction) {
        self.next_id = self.next_id.max(faction.id.0.wrapping_add(1));
        self.factions.insert(faction.id, faction);
    }

    pub fn remove(&mut self, id: FactionId) -> Option<Faction> {
        self.factions.remove(&id)
    }

    pub fn get(&self, id: FactionId) -> Option<&Faction> {
        self.factions.get(&id)
    }

    pub fn get_mut(&mut self, id: FactionId) -> Option<&mut Faction> {
        self.factions.get_mut(&id)
    }

    pub fn contains(&self, id: FactionId) -> bool {
        self.factions.contains_key(&id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Faction> {
        self.factions
            .values()
            .find(|faction| faction.name.eq_ignore_ascii_case(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Faction> {
        self.factions.values()
    }

    pub fn ids(&self) -> Vec<FactionId> {
        self.factions.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.factions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factions.is_empty()
    }
}
