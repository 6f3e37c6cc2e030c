mod common;

use anyhow::Result;
use common::{found, realm, realm_mut, NOW, OVERWORLD};
use factions_core::{build_headless_app, CellPos, FactionId, Realm, UserId};
use factions_schema::{
    decode_records, encode_records, records_from_json, records_to_json, PermissionKind,
    RelationshipStatus,
};

fn populated_app() -> bevy::prelude::App {
    common::ensure_test_config();
    let mut app = build_headless_app();
    let north = found(&mut app, UserId(1), "north", 15);
    let south = found(&mut app, UserId(2), "south", 10);
    {
        let mut realm = realm_mut(&mut app);
        realm.set_open(UserId(1), true).expect("opened");
        realm.join_faction(UserId(3), north).expect("joined");
        realm
            .claim(UserId(1), OVERWORLD, CellPos::new(0, 0), 2, NOW)
            .expect("claimed");
        realm
            .request_relationship(UserId(1), south, RelationshipStatus::Ally, NOW)
            .expect("ally requested");
        realm
            .set_relationship_permission(UserId(2), north, PermissionKind::UseInventories, true)
            .expect("granted");
        realm.unclaim_cell(UserId(1), OVERWORLD, CellPos::new(1, 1), NOW).expect("unclaimed");
    }
    app
}

#[test]
fn records_survive_json_round_trip() -> Result<()> {
    let app = populated_app();
    let source = realm(&app);
    let records = source.to_records();

    let json = records_to_json(&records)?;
    let restored = Realm::from_records(source.config_handle(), &records_from_json(&json)?)?;

    assert_eq!(restored.to_records(), records);
    assert_eq!(restored.demesne(FactionId(0)), 8);
    assert_eq!(
        restored.observer_snapshot(7)?.header.hash,
        source.observer_snapshot(7)?.header.hash
    );
    Ok(())
}

#[test]
fn records_survive_binary_round_trip() -> Result<()> {
    let app = populated_app();
    let records = realm(&app).to_records();
    let decoded = decode_records(&encode_records(&records)?)?;
    assert_eq!(decoded, records);
    Ok(())
}

#[test]
fn stored_field_names_are_stable() -> Result<()> {
    let app = populated_app();
    let json = records_to_json(&realm(&app).to_records())?;
    for field in [
        "\"Faction\"",
        "\"User\"",
        "\"Claim\"",
        "\"ID\"",
        "\"FactionID\"",
        "\"UnclaimCooldownExpiry\"",
        "\"FirstClaimConfirmed\"",
    ] {
        assert!(json.contains(field), "missing {field} in stored records");
    }
    Ok(())
}
