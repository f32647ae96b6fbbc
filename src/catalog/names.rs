//! Display Name Registries
//!
//! Key -> display-name tables backing the progress projector's lookups.
//! NPC names come from the dialogue registry; item and character names
//! come from the record catalogs, consulted in a fixed priority order.

use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::ports::{NpcNames, RecordNames};

/// Record catalogs consulted for Object/Kill display names, in priority
/// order. Content teams can reorder this without touching the projector.
pub const DEFAULT_RECORD_CATALOGS: &[&str] = &["items", "characters"];

/// Display-name lookup tables loaded from TOML
pub struct NameDirectory {
    /// Dialogue NPC registry (talk objectives)
    npcs: HashMap<String, String>,
    /// Named record catalogs in priority order
    records: Vec<(String, HashMap<String, String>)>,
}

impl NameDirectory {
    pub fn empty() -> Self {
        Self {
            npcs: HashMap::new(),
            records: Vec::new(),
        }
    }

    /// Load name tables from the data directory.
    ///
    /// Expects `npcs.toml` plus one file per record catalog named in
    /// `catalogs` (e.g. `items.toml`, `characters.toml`), each a flat
    /// `key = "Display Name"` table. Missing files load empty.
    pub fn load(data_dir: &Path, catalogs: &[&str]) -> Self {
        let npcs = load_name_table(&data_dir.join("npcs.toml"));

        let records = catalogs
            .iter()
            .map(|name| {
                let table = load_name_table(&data_dir.join(format!("{}.toml", name)));
                (name.to_string(), table)
            })
            .collect();

        let dir = Self { npcs, records };
        info!(
            "Loaded {} NPC names and {} record catalog(s)",
            dir.npcs.len(),
            dir.records.len()
        );
        dir
    }

    #[cfg(test)]
    pub fn with_tables(
        npcs: HashMap<String, String>,
        records: Vec<(String, HashMap<String, String>)>,
    ) -> Self {
        Self { npcs, records }
    }
}

fn load_name_table(path: &Path) -> HashMap<String, String> {
    if !path.exists() {
        return HashMap::new();
    }

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read name table {:?}: {}", path, e);
            return HashMap::new();
        }
    };

    match toml::from_str(&content) {
        Ok(table) => table,
        Err(e) => {
            warn!("Failed to parse name table {:?}: {}", path, e);
            HashMap::new()
        }
    }
}

impl NpcNames for NameDirectory {
    fn npc_name(&self, key: &str) -> String {
        self.npcs.get(key).cloned().unwrap_or_default()
    }
}

impl RecordNames for NameDirectory {
    fn record_name(&self, key: &str) -> Option<String> {
        // First catalog with the key wins
        self.records
            .iter()
            .find_map(|(_, table)| table.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_and_lookup() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("npcs.toml"),
            "innkeeper = \"Maren the Innkeeper\"\n",
        )
        .unwrap();
        std::fs::write(temp_dir.path().join("items.toml"), "herb_01 = \"Kingsfoil\"\n").unwrap();
        std::fs::write(temp_dir.path().join("characters.toml"), "wolf = \"Grey Wolf\"\n").unwrap();

        let dir = NameDirectory::load(temp_dir.path(), DEFAULT_RECORD_CATALOGS);

        assert_eq!(dir.npc_name("innkeeper"), "Maren the Innkeeper");
        assert_eq!(dir.npc_name("nobody"), "");
        assert_eq!(dir.record_name("herb_01").as_deref(), Some("Kingsfoil"));
        assert_eq!(dir.record_name("wolf").as_deref(), Some("Grey Wolf"));
        assert_eq!(dir.record_name("nothing"), None);
    }

    #[test]
    fn test_catalog_priority_order() {
        let mut items = HashMap::new();
        items.insert("wolf".to_string(), "Wolf Pelt".to_string());
        let mut characters = HashMap::new();
        characters.insert("wolf".to_string(), "Grey Wolf".to_string());

        let dir = NameDirectory::with_tables(
            HashMap::new(),
            vec![
                ("items".to_string(), items),
                ("characters".to_string(), characters),
            ],
        );

        // Items catalog is consulted before characters
        assert_eq!(dir.record_name("wolf").as_deref(), Some("Wolf Pelt"));
    }
}
