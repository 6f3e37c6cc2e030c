mod common;

use factions_core::{build_headless_app, run_step, RealmTick};

#[test]
fn app_initializes() {
    common::ensure_test_config();
    let mut app = build_headless_app();
    run_step(&mut app);

    assert_eq!(*app.world.resource::<RealmTick>(), RealmTick(1));
    let realm = common::realm(&app);
    assert!(realm.factions.is_empty());
    assert_eq!(realm.config().power.regen_interval_ticks, 3);
    assert_eq!(realm.config().max_batch_size(), 3);
}
