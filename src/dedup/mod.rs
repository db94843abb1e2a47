use std::collections::HashSet;

/// Keys already seen in this session. Owned by one loop, never persisted.
#[derive(Debug, Default)]
pub struct DedupStore {
    seen: HashSet<String>,
}

impl DedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `key` and returns `true` the first time it is offered,
    /// `false` on every later call.
    pub fn admit(&mut self, key: &str) -> bool {
        if self.seen.contains(key) {
            return false;
        }
        self.seen.insert(key.to_owned())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
