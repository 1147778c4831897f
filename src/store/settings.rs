//! User-tunable settings.

use serde_json::json;

use super::{KvStore, KvTable, TABLE_SETTINGS};

const KEY_N: &str = "N";
const DEFAULT_N: u32 = 2;

/// Settings table wrapper; currently only the hop radius `N` used by the
/// news-path search.
#[derive(Clone)]
pub struct Settings {
    table: KvTable,
}

impl Settings {
    pub fn new(store: &KvStore) -> Self {
        Self {
            table: store.table(TABLE_SETTINGS),
        }
    }

    /// Hop radius for news-path searches; defaults to 2 when unset.
    pub fn get_n(&self) -> u32 {
        self.table
            .get(KEY_N)
            .and_then(|v| v.get("value").cloned())
            .and_then(|v| v.as_u64())
            .map(|v| v as u32)
            .unwrap_or(DEFAULT_N)
    }

    pub fn set_n(&self, n: u32) {
        let _ = self.table.put(KEY_N, &json!({ "value": n }), None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn n_defaults_to_two_and_updates() {
        let store = KvStore::in_memory();
        let settings = Settings::new(&store);
        assert_eq!(settings.get_n(), 2);
        settings.set_n(4);
        assert_eq!(settings.get_n(), 4);
    }
}
