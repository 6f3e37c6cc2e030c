#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Once;

use bevy::prelude::{App, Events};
use factions_core::{FactionId, Realm, RealmEvent, Timestamp, UserId};

static INIT: Once = Once::new();

pub const OVERWORLD: &str = "overworld";
pub const NOW: Timestamp = Timestamp::from_secs(1_000);

pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("test_factions_config.json");

        debug_assert!(
            config_path.exists(),
            "missing test factions config at {}",
            config_path.display()
        );

        std::env::set_var("FACTIONS_CONFIG_PATH", &config_path);
    });
}

pub fn realm_mut(app: &mut App) -> bevy::prelude::Mut<'_, Realm> {
    app.world.resource_mut::<Realm>()
}

pub fn realm(app: &App) -> &Realm {
    app.world.resource::<Realm>()
}

/// Founds a faction and moves its aggregate power to `power` through the
/// admin bonus.
pub fn found(app: &mut App, owner: UserId, name: &str, power: i32) -> FactionId {
    let mut realm = realm_mut(app);
    let faction = realm.create_faction(owner, name).expect("faction founded");
    let current = realm.faction_power(faction);
    realm
        .add_admin_power(faction, power - current)
        .expect("admin power applied");
    faction
}

/// Every realm event currently held by the Bevy event queue.
pub fn delivered_events(app: &App) -> Vec<RealmEvent> {
    let events = app.world.resource::<Events<RealmEvent>>();
    let mut reader = events.get_reader();
    reader.read(events).cloned().collect()
}
