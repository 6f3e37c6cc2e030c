use bevy::prelude::*;

use crate::config::FactionsConfigHandle;
use crate::events::RealmEvent;
use crate::realm::Realm;

/// Simulation steps elapsed since the realm was hosted.
#[derive(Resource, Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealmTick(pub u64);

impl RealmTick {
    /// True on every `interval`-th tick. A zero interval never fires.
    pub fn is_multiple_of(self, interval: u64) -> bool {
        interval > 0 && self.0 > 0 && self.0 % interval == 0
    }
}

pub fn advance_realm_tick(mut tick: ResMut<RealmTick>) {
    tick.0 = tick.0.wrapping_add(1);
}

/// Passive power regeneration for online users.
pub fn regenerate_power(
    tick: Res<RealmTick>,
    config: Res<FactionsConfigHandle>,
    mut realm: ResMut<Realm>,
) {
    let power = &config.config().power;
    if !tick.is_multiple_of(power.regen_interval_ticks) || power.regen_reward == 0 {
        return;
    }
    let visited = realm.regenerate_online();
    tracing::debug!(
        target: "factions::power",
        tick = tick.0,
        users = visited,
        "power.regenerated"
    );
}

pub fn audit_realm(
    tick: Res<RealmTick>,
    config: Res<FactionsConfigHandle>,
    mut realm: ResMut<Realm>,
) {
    if tick.is_multiple_of(config.config().audit_interval_ticks) {
        realm.audit();
    }
}

/// Moves this step's realm events into the Bevy event queue.
pub fn flush_realm_events(mut realm: ResMut<Realm>, mut writer: EventWriter<RealmEvent>) {
    if realm.events.pending().is_empty() {
        return;
    }
    writer.send_batch(realm.events.drain());
}
