//! Territory, power and diplomacy engine for persistent multiplayer factions.
//!
//! The whole world lives in the [`Realm`] resource. Commands mutate it
//! directly; the periodic passive step (power regeneration, integrity audit,
//! event flush) runs when [`run_step`] is invoked on an app built by
//! [`build_headless_app`].

mod audit;
mod claims;
pub mod config;
mod diplomacy;
mod directory;
mod events;
mod identity;
mod membership;
mod pending;
mod permissions;
mod power;
mod realm;
mod relationships;
mod resolver;
mod systems;
mod territory;

use std::sync::Arc;

use bevy::prelude::*;

pub use audit::AuditReport;
pub use claims::{Claim, ClaimGrid};
pub use config::{
    load_factions_config_from_env, FactionsConfig, FactionsConfigError, FactionsConfigHandle,
};
pub use diplomacy::{DiplomacyError, DiplomacyOutcome};
pub use directory::{Faction, FactionDirectory, Home, User, UserDirectory};
pub use events::{EventBus, RealmEvent, RealmEventHandler};
pub use identity::{CellPos, FactionId, FactionPair, Timestamp, UserId};
pub use membership::MembershipError;
pub use pending::{
    ClaimRequest, PeaceRequest, PendingActions, PendingError, UnclaimRequest, UnclaimScope,
    WarRequest,
};
pub use permissions::Permissions;
pub use realm::{Realm, RecordsError};
pub use relationships::{RelationshipEdge, RelationshipGraph};
pub use resolver::{Decision, PermissionQuery};
pub use systems::RealmTick;
pub use territory::{
    AccessChange, ClaimError, ClaimOutcome, ClaimPlan, ClaimResponse, UnclaimError,
    UnclaimResponse,
};

/// Hosts a [`Realm`] and its per-step systems
/// (tick → regeneration → audit → event flush).
pub struct FactionsPlugin {
    config: Arc<FactionsConfig>,
}

impl FactionsPlugin {
    pub fn new(config: Arc<FactionsConfig>) -> Self {
        Self { config }
    }
}

impl Plugin for FactionsPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(FactionsConfigHandle::new(Arc::clone(&self.config)))
            .insert_resource(Realm::new(Arc::clone(&self.config)))
            .insert_resource(RealmTick::default())
            .add_event::<RealmEvent>()
            .add_systems(
                Update,
                (
                    systems::advance_realm_tick,
                    systems::regenerate_power,
                    systems::audit_realm,
                    systems::flush_realm_events,
                )
                    .chain(),
            );
    }
}

/// Construct a headless Bevy [`App`] hosting an empty realm, configured from
/// `FACTIONS_CONFIG_PATH` or the builtin document.
pub fn build_headless_app() -> App {
    let (config, _) = load_factions_config_from_env();
    build_headless_app_with(config)
}

pub fn build_headless_app_with(config: Arc<FactionsConfig>) -> App {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins)
        .add_plugins(FactionsPlugin::new(config));
    app
}

/// Execute one simulation step.
///
/// Commands issued against the [`Realm`] between steps are reported as
/// Bevy [`RealmEvent`]s after the step's flush.
pub fn run_step(app: &mut App) {
    app.update();
}
