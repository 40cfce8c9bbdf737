use std::{
    collections::HashMap,
    env,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::warn;

const FILE_NAME: &str = "staff_db.json";
const FILE_DB_PATH_ENV: &str = "ROSTER_DB_PATH";

/// A delegated staff identity. At most one entry per user id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StaffEntry {
    pub id: u64,
    pub display_name: String,
}

impl StaffEntry {
    pub fn new(id: u64, display_name: &str) -> Self {
        Self {
            id,
            display_name: display_name.to_string(),
        }
    }
}

/// File-backed staff store. A missing or unreadable file starts an empty
/// roster rather than failing startup; save errors are reported by callers.
#[derive(Clone, Debug, Default)]
pub struct RosterDatabase {
    dir: PathBuf,
    pub staff: HashMap<u64, StaffEntry>,
}

impl RosterDatabase {
    pub fn try_init() -> Self {
        let dir = env::var(FILE_DB_PATH_ENV).unwrap_or_else(|_| "./".to_string());
        Self::load(dir)
    }

    pub fn load(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let staff = match File::open(dir.join(FILE_NAME)) {
            Ok(file) => {
                let reader = BufReader::new(file);
                match serde_json::from_reader(reader) {
                    Ok(staff) => staff,
                    Err(e) => {
                        warn!("Could not parse roster file, starting empty: {}", e);
                        HashMap::new()
                    }
                }
            }
            Err(_) => HashMap::new(),
        };
        Self { dir, staff }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let file = File::create(self.dir.join(FILE_NAME))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &self.staff)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod roster_repository_test {
    use super::*;

    #[test]
    fn should_round_trip_staff_entries_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = RosterDatabase::load(dir.path());
        db.staff.insert(7, StaffEntry::new(7, "mod-seven"));
        db.staff.insert(9, StaffEntry::new(9, "mod-nine"));
        db.save().unwrap();

        let reloaded = RosterDatabase::load(dir.path());
        assert_eq!(reloaded.staff.len(), 2);
        assert_eq!(reloaded.staff.get(&7).unwrap().display_name, "mod-seven");
    }

    #[test]
    fn should_start_empty_when_file_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let db = RosterDatabase::load(dir.path());
        assert!(db.staff.is_empty());
    }
}
