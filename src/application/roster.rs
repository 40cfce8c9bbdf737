use std::sync::RwLock;

use tracing::warn;

use crate::adapter::{RosterDatabase, StaffEntry};

/// Authorization roster: one fixed owner plus delegated staff. Staff lookups
/// fail open to `false`; removing an identity revokes its privilege
/// immediately. Persistence failures are logged and never interrupt the
/// calling command.
pub struct StaffRoster {
    owner_id: u64,
    db: RwLock<RosterDatabase>,
}

impl StaffRoster {
    pub fn new(owner_id: u64, db: RosterDatabase) -> Self {
        Self {
            owner_id,
            db: RwLock::new(db),
        }
    }

    pub fn owner_id(&self) -> u64 {
        self.owner_id
    }

    pub fn is_owner(&self, id: u64) -> bool {
        id == self.owner_id
    }

    pub fn is_staff(&self, id: u64) -> bool {
        self.db.read().unwrap().staff.contains_key(&id)
    }

    pub fn is_privileged(&self, id: u64) -> bool {
        self.is_owner(id) || self.is_staff(id)
    }

    pub fn add_staff(&self, entry: StaffEntry) {
        let mut db = self.db.write().unwrap();
        db.staff.insert(entry.id, entry);
        if let Err(e) = db.save() {
            warn!("Could not persist roster: {}", e);
        }
    }

    /// Removing an unknown id is a no-op.
    pub fn remove_staff(&self, id: u64) {
        let mut db = self.db.write().unwrap();
        if db.staff.remove(&id).is_none() {
            return;
        }
        if let Err(e) = db.save() {
            warn!("Could not persist roster: {}", e);
        }
    }

    /// Snapshot sorted by id so prompt serialization stays deterministic.
    pub fn list_staff(&self) -> Vec<StaffEntry> {
        let mut entries: Vec<StaffEntry> =
            self.db.read().unwrap().staff.values().cloned().collect();
        entries.sort_by_key(|entry| entry.id);
        entries
    }
}
