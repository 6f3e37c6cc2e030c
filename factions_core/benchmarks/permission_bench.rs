use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use factions_core::{
    CellPos, Claim, Faction, FactionId, FactionsConfig, PermissionQuery, Permissions, Realm,
    UserId,
};
use factions_schema::{PermissionKind, Rank, RelationshipStatus};

const OVERWORLD: &str = "overworld";

/// `factions` factions, each owning a `side`×`side` block of claims laid out
/// along the x axis, with alternating alliances between neighbours.
fn populated_realm(factions: u32, side: i32) -> Realm {
    let mut realm = Realm::new(Arc::new(FactionsConfig::default()));
    for index in 0..factions {
        let id = FactionId(index);
        realm.factions.insert(Faction::new(
            id,
            format!("faction-{index}"),
            Permissions::from(PermissionKind::UseBlocks),
        ));
        realm
            .users
            .set_membership(UserId(u64::from(index)), id, Rank::Member);
        let x0 = index as i32 * side;
        for x in x0..x0 + side {
            for z in 0..side {
                realm.claims.insert(OVERWORLD, CellPos::new(x, z), Claim::new(id));
            }
        }
        if index % 2 == 1 {
            let neighbour = FactionId(index - 1);
            realm
                .relationships
                .set_status(id, neighbour, RelationshipStatus::Ally);
            realm
                .relationships
                .set_status(neighbour, id, RelationshipStatus::Ally);
        }
    }
    realm
}

fn queries(factions: u32, side: i32) -> Vec<(UserId, CellPos, PermissionKind)> {
    let span = factions as i32 * side;
    (0..256)
        .map(|i: i32| {
            let actor = UserId((i as u64) % u64::from(factions));
            let cell = CellPos::new((i * 7) % (span + 8) - 4, (i * 3) % side);
            (actor, cell, PermissionKind::ALL[i as usize % PermissionKind::ALL.len()])
        })
        .collect()
}

fn bench_permission_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("permission_resolution");

    for factions in [4u32, 32, 128] {
        let side = 16;
        let realm = populated_realm(factions, side);
        let batch = queries(factions, side);
        group.bench_with_input(BenchmarkId::new("mixed", factions), &batch, |b, batch| {
            b.iter(|| {
                let mut allowed = 0usize;
                for (actor, cell, kind) in batch {
                    let query = PermissionQuery::new(*actor, OVERWORLD, *cell, *kind)
                        .with_material("minecraft:dirt");
                    if realm.check_permission(black_box(&query)).is_allowed() {
                        allowed += 1;
                    }
                }
                allowed
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_permission_resolution);
criterion_main!(benches);
