//! Per-user power with faction-level aggregation.
//!
//! Every change funnels through [`Realm::set_power`] so that clamping and
//! aggregate notifications behave the same for commands, combat and the
//! passive regeneration step.

use crate::events::RealmEvent;
use crate::identity::{FactionId, UserId};
use crate::membership::MembershipError;
use crate::realm::Realm;

impl Realm {
    /// Adds `delta` to the user's power, clamped to `[0, playerMax]`.
    /// Returns the user's resulting power.
    pub fn adjust_power(&mut self, user: UserId, delta: i32) -> i32 {
        let current = self.users.get_or_create(user).power;
        self.set_power(user, current.saturating_add(delta))
    }

    /// Sets the user's power, clamped to `[0, playerMax]`. A value equal to
    /// the current one changes nothing and publishes nothing.
    pub fn set_power(&mut self, user: UserId, value: i32) -> i32 {
        let max = self.config().power.player_max.max(0);
        let clamped = value.clamp(0, max);
        let (current, faction) = {
            let entry = self.users.get_or_create(user);
            (entry.power, entry.faction())
        };
        if clamped == current {
            return current;
        }

        let old_aggregate = faction.map(|faction| self.faction_power(faction));
        if let Some(entry) = self.users.get_mut(user) {
            entry.power = clamped;
        }
        tracing::debug!(
            target: "factions::power",
            user = %user,
            old = current,
            new = clamped,
            "power.user_changed"
        );
        if let (Some(faction), Some(old_power)) = (faction, old_aggregate) {
            self.publish_power_change(faction, old_power);
        }
        clamped
    }

    /// Changes the faction's admin bonus. Returns the new aggregate power.
    pub fn add_admin_power(&mut self, faction: FactionId, delta: i32) -> Result<i32, MembershipError> {
        let old_power = self.faction_power(faction);
        let entry = self
            .factions
            .get_mut(faction)
            .ok_or(MembershipError::UnknownFaction(faction))?;
        entry.admin_power = entry.admin_power.saturating_add(delta);
        tracing::info!(
            target: "factions::power",
            faction = %faction,
            delta,
            "power.admin_adjusted"
        );
        self.publish_power_change(faction, old_power);
        Ok(self.faction_power(faction))
    }

    /// Applies the death penalty to `victim` and the kill reward to `killer`.
    pub fn record_death(&mut self, victim: UserId, killer: Option<UserId>) {
        let penalty = self.config().power.death_penalty;
        let reward = self.config().power.kill_reward;
        self.adjust_power(victim, -penalty);
        if let Some(killer) = killer.filter(|killer| *killer != victim) {
            self.adjust_power(killer, reward);
        }
    }

    /// Grants the regeneration reward to every online user. Returns how many
    /// users were visited.
    pub fn regenerate_online(&mut self) -> usize {
        let reward = self.config().power.regen_reward;
        let online: Vec<UserId> = self
            .users
            .ids()
            .into_iter()
            .filter(|id| self.users.get(*id).map_or(false, |user| user.online))
            .collect();
        for user in &online {
            self.adjust_power(*user, reward);
        }
        online.len()
    }

    pub(crate) fn publish_power_change(&mut self, faction: FactionId, old_power: i32) {
        let new_power = self.faction_power(faction);
        if new_power != old_power {
            self.emit(RealmEvent::PowerChanged {
                faction,
                old_power,
                new_power,
            });
        }
    }
}
