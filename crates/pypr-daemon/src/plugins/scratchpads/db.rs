//! Single storage for every scratchpad with O(1) lookups by uid, pid and
//! window address, plus logical state sets (`respawned`, `configured`).

use std::collections::{HashMap, HashSet};

use super::object::Scratch;

#[derive(Default)]
pub struct ScratchDb {
    scratches: HashMap<String, Scratch>,
    by_pid: HashMap<i64, String>,
    /// Short (no `0x`) address to uid.
    by_addr: HashMap<String, String>,
    states: HashMap<&'static str, HashSet<String>>,
}

impl ScratchDb {
    #[must_use]
    pub fn get(&self, uid: &str) -> Option<&Scratch> {
        self.scratches.get(uid)
    }

    #[must_use]
    pub fn get_mut(&mut self, uid: &str) -> Option<&mut Scratch> {
        self.scratches.get_mut(uid)
    }

    #[must_use]
    pub fn contains(&self, uid: &str) -> bool {
        self.scratches.contains_key(uid)
    }

    #[must_use]
    pub fn uid_by_pid(&self, pid: i64) -> Option<&String> {
        self.by_pid.get(&pid)
    }

    /// Lookup by short address (no `0x` prefix).
    #[must_use]
    pub fn uid_by_addr(&self, addr: &str) -> Option<&String> {
        self.by_addr.get(addr)
    }

    #[must_use]
    pub fn uids(&self) -> Vec<String> {
        self.scratches.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Scratch)> {
        self.scratches.iter()
    }

    /// Insert a new scratch, indexing its uid.
    pub fn insert(&mut self, scratch: Scratch) {
        self.scratches.insert(scratch.uid.clone(), scratch);
    }

    pub fn remove(&mut self, uid: &str) -> Option<Scratch> {
        let scratch = self.scratches.remove(uid)?;
        self.by_pid.retain(|_, v| v != uid);
        self.by_addr.retain(|_, v| v != uid);
        for set in self.states.values_mut() {
            set.remove(uid);
        }
        Some(scratch)
    }

    pub fn register_pid(&mut self, uid: &str, pid: i64) {
        self.by_pid.insert(pid, uid.to_string());
    }

    /// Index the scratch by its current pid and address.
    pub fn reindex(&mut self, uid: &str) {
        let Some(scratch) = self.scratches.get(uid) else {
            return;
        };
        let pid = scratch.pid;
        let addr = scratch.short_address();
        if pid > 0 {
            self.by_pid.insert(pid, uid.to_string());
        }
        if !addr.is_empty() {
            self.by_addr.insert(addr, uid.to_string());
        }
    }

    /// Drop the pid/address index entries of a scratch (before respawn).
    pub fn unregister(&mut self, uid: &str) {
        self.by_pid.retain(|_, v| v != uid);
        self.by_addr.retain(|_, v| v != uid);
    }

    pub fn clear_pid(&mut self, pid: i64) {
        self.by_pid.remove(&pid);
    }

    // State sets

    pub fn set_state(&mut self, state: &'static str, uid: &str) {
        self.states.entry(state).or_default().insert(uid.to_string());
    }

    pub fn clear_state(&mut self, state: &str, uid: &str) {
        if let Some(set) = self.states.get_mut(state) {
            set.remove(uid);
        }
    }

    #[must_use]
    pub fn get_by_state(&self, state: &str) -> Vec<String> {
        self.states
            .get(state)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear_state_all(&mut self, state: &str) {
        if let Some(set) = self.states.get_mut(state) {
            set.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pypr_types::{ClientInfo, VersionInfo};
    use serde_json::json;

    fn scratch(uid: &str) -> Scratch {
        let config = json!({uid: {"command": "kitty"}});
        Scratch::new(uid, config.as_object().unwrap(), VersionInfo::new(0, 48, 0))
    }

    #[test]
    fn test_uid_index_consistency() {
        let mut db = ScratchDb::default();
        db.insert(scratch("term"));
        assert_eq!(db.get("term").unwrap().uid, "term");
        assert!(db.get("other").is_none());
    }

    #[test]
    fn test_pid_and_addr_indices() {
        let mut db = ScratchDb::default();
        let mut s = scratch("term");
        s.pid = 4242;
        s.client_info = Some(ClientInfo {
            address: "0xabc123def456".into(),
            ..ClientInfo::default()
        });
        db.insert(s);
        db.reindex("term");

        assert_eq!(db.uid_by_pid(4242).unwrap(), "term");
        assert_eq!(db.uid_by_addr("abc123def456").unwrap(), "term");
        // Indices point only to registered scratches.
        assert!(db.uid_by_pid(1).is_none());
    }

    #[test]
    fn test_unregister_clears_secondary_indices() {
        let mut db = ScratchDb::default();
        let mut s = scratch("term");
        s.pid = 10;
        db.insert(s);
        db.reindex("term");
        db.unregister("term");

        assert!(db.uid_by_pid(10).is_none());
        // The scratch itself stays registered by uid.
        assert!(db.contains("term"));
    }

    #[test]
    fn test_remove_purges_everything() {
        let mut db = ScratchDb::default();
        let mut s = scratch("term");
        s.pid = 10;
        db.insert(s);
        db.reindex("term");
        db.set_state("respawned", "term");

        db.remove("term");
        assert!(!db.contains("term"));
        assert!(db.uid_by_pid(10).is_none());
        assert!(db.get_by_state("respawned").is_empty());
    }

    #[test]
    fn test_state_sets() {
        let mut db = ScratchDb::default();
        db.insert(scratch("a"));
        db.insert(scratch("b"));
        db.set_state("configured", "a");
        db.set_state("configured", "b");
        db.clear_state("configured", "a");

        assert_eq!(db.get_by_state("configured"), vec!["b".to_string()]);

        db.clear_state_all("configured");
        assert!(db.get_by_state("configured").is_empty());
    }

    #[test]
    fn test_at_most_one_scratch_per_pid() {
        let mut db = ScratchDb::default();
        let mut a = scratch("a");
        a.pid = 5;
        let mut b = scratch("b");
        b.pid = 5;
        db.insert(a);
        db.insert(b);
        db.reindex("a");
        db.reindex("b");
        // Last registration wins; the index never yields two scratches.
        assert_eq!(db.uid_by_pid(5).unwrap(), "b");
    }
}
