use std::fmt;

use bevy::prelude::Event;
use factions_schema::RelationshipStatus;

use crate::identity::{CellPos, FactionId, UserId};

/// Notification published by the realm whenever observable state changes.
#[derive(Event, Debug, Clone, PartialEq)]
pub enum RealmEvent {
    FactionCreated {
        faction: FactionId,
        founder: UserId,
    },
    FactionModified {
        faction: FactionId,
    },
    PowerChanged {
        faction: FactionId,
        old_power: i32,
        new_power: i32,
    },
    ClaimAdded {
        faction: FactionId,
        dimension: String,
        cell: CellPos,
    },
    /// `faction` is the previous owner, if the cell was owned.
    ClaimRemoved {
        dimension: String,
        x: i32,
        z: i32,
        faction: Option<FactionId>,
    },
    RelationshipDeclared {
        source: FactionId,
        target: FactionId,
        status: RelationshipStatus,
    },
    MutualEntered {
        a: FactionId,
        b: FactionId,
        status: RelationshipStatus,
    },
    MutualEnded {
        a: FactionId,
        b: FactionId,
        prior: RelationshipStatus,
    },
    MemberJoined {
        faction: FactionId,
        user: UserId,
    },
    MemberLeft {
        faction: FactionId,
        user: UserId,
    },
    HomeSet {
        faction: FactionId,
    },
    FactionDisbanded {
        faction: FactionId,
        name: String,
    },
}

pub type RealmEventHandler = Box<dyn FnMut(&RealmEvent) + Send + Sync>;

/// In-process publish/subscribe channel. Handlers run synchronously in
/// registration order; every event is also kept in an outbox until drained.
#[derive(Default)]
pub struct EventBus {
    handlers: Vec<RealmEventHandler>,
    outbox: Vec<RealmEvent>,
}

impl EventBus {
    pub fn subscribe<F>(&mut self, handler: F)
    where
        F: FnMut(&RealmEvent) + Send + Sync + 'static,
    {
        self.handlers.push(Box::new(handler));
    }

    pub fn publish(&mut self, event: RealmEvent) {
        for handler in self.handlers.iter_mut() {
            handler(&event);
        }
        self.outbox.push(event);
    }

    pub fn pending(&self) -> &[RealmEvent] {
        &self.outbox
    }

    pub fn drain(&mut self) -> Vec<RealmEvent> {
        std::mem::take(&mut self.outbox)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handlers.len())
            .field("outbox", &self.outbox.len())
            .finish()
    }
}
