use std::collections::{BTreeMap, HashMap};

use factions_schema::{ClaimRecord, Rank};

use crate::identity::{CellPos, FactionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
    pub faction: FactionId,
    pub access_level: Rank,
}

impl Claim {
    pub fn new(faction: FactionId) -> Self {
        Self {
            faction,
            access_level: Rank::Member,
        }
    }
}

#[derive(Debug, Default)]
struct DimensionClaims {
    cells: HashMap<CellPos, Claim>,
    counts: HashMap<FactionId, usize>,
}

/// Authoritative `(dimension, cell) -> claim` map with per-faction counts.
#[derive(Debug, Default)]
pub struct ClaimGrid {
    dimensions: HashMap<String, DimensionClaims>,
    demesne: HashMap<FactionId, usize>,
}

impl ClaimGrid {
    #[inline]
    pub fn get(&self, dimension: &str, cell: CellPos) -> Option<&Claim> {
        self.dimensions.get(dimension)?.cells.get(&cell)
    }

    pub fn get_mut(&mut self, dimension: &str, cell: CellPos) -> Option<&mut Claim> {
        self.dimensions.get_mut(dimension)?.cells.get_mut(&cell)
    }

    #[inline]
    pub fn owner(&self, dimension: &str, cell: CellPos) -> Option<FactionId> {
        self.get(dimension, cell).map(|claim| claim.faction)
    }

    /// Writes a claim without connectivity checks. Returns the claim it replaced.
    pub fn insert(&mut self, dimension: &str, cell: CellPos, claim: Claim) -> Option<Claim> {
        let previous = self.remove(dimension, cell);
        let claims = self.dimensions.entry(dimension.to_string()).or_default();
        claims.cells.insert(cell, claim);
        *claims.counts.entry(claim.faction).or_default() += 1;
        *self.demesne.entry(claim.faction).or_default() += 1;
        previous
    }

    pub fn remove(&mut self, dimension: &str, cell: CellPos) -> Option<Claim> {
        let claims = self.dimensions.get_mut(dimension)?;
        let removed = claims.cells.remove(&cell)?;
        decrement(&mut claims.counts, removed.faction);
        decrement(&mut self.demesne, removed.faction);
        if claims.cells.is_empty() {
            self.dimensions.remove(dimension);
        }
        Some(removed)
    }

    /// Total claimed cells across every dimension.
    #[inline]
    pub fn demesne(&self, faction: FactionId) -> usize {
        self.demesne.get(&faction).copied().unwrap_or(0)
    }

    pub fn count_in_dimension(&self, faction: FactionId, dimension: &str) -> usize {
        self.dimensions
            .get(dimension)
            .and_then(|claims| claims.counts.get(&faction))
            .copied()
            .unwrap_or(0)
    }

    /// True when the faction holds nothing in the dimension yet, when the
    /// cell is already its own, or when an orthogonal neighbour is its own.
    pub fn can_claim_connected(&self, dimension: &str, cell: CellPos, faction: FactionId) -> bool {
        if self.count_in_dimension(faction, dimension) == 0 {
            return true;
        }
        self.owner(dimension, cell) == Some(faction)
            || cell
                .neighbours()
                .into_iter()
                .any(|neighbour| self.owner(dimension, neighbour) == Some(faction))
    }

    /// Cells owned by `faction`, grouped by dimension and sorted.
    pub fn claims_by_dimension(&self, faction: FactionId) -> BTreeMap<String, Vec<CellPos>> {
        let mut grouped = BTreeMap::new();
        for (dimension, claims) in &self.dimensions {
            if !claims.counts.contains_key(&faction) {
                continue;
            }
            let mut cells: Vec<CellPos> = claims
                .cells
                .iter()
                .filter(|(_, claim)| claim.faction == faction)
                .map(|(cell, _)| *cell)
                .collect();
            cells.sort();
            grouped.insert(dimension.clone(), cells);
        }
        grouped
    }

    /// Removes every claim of `faction`. Returns the released cells.
    pub fn remove_faction(&mut self, faction: FactionId) -> Vec<(String, CellPos)> {
        let mut released = Vec::new();
        for (dimension, cells) in self.claims_by_dimension(faction) {
            for cell in cells {
                self.remove(&dimension, cell);
                released.push((dimension.clone(), cell));
            }
        }
        released
    }

    /// Every claim, ordered by dimension then cell.
    pub fn entries(&self) -> Vec<(&str, CellPos, Claim)> {
        let mut entries: Vec<_> = self
            .dimensions
            .iter()
            .flat_map(|(dimension, claims)| {
                claims
                    .cells
                    .iter()
                    .map(move |(cell, claim)| (dimension.as_str(), *cell, *claim))
            })
            .collect();
        entries.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        entries
    }

    pub fn len(&self) -> usize {
        self.dimensions.values().map(|claims| claims.cells.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    pub fn to_records(&self) -> Vec<ClaimRecord> {
        self.entries()
            .into_iter()
            .map(|(dimension, cell, claim)| ClaimRecord {
                x: cell.x,
                z: cell.z,
                dimension: dimension.to_string(),
                faction_id: claim.faction.0,
                access_level: claim.access_level,
            })
            .collect()
    }
}

fn decrement(counts: &mut HashMap<FactionId, usize>, faction: FactionId) {
    if let Some(count) = counts.get_mut(&faction) {
        *count -= 1;
        if *count == 0 {
            counts.remove(&faction);
        }
    }
}
