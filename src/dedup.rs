use std::collections::HashSet;

/// Seen-set gate in front of the sink.
///
/// Ids come from the run state and, on resume, from the output file itself,
/// so a crash between appending a page and checkpointing it does not produce
/// duplicate rows when the page is replayed.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<String>,
    skipped: usize,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            seen: ids.into_iter().map(Into::into).collect(),
            skipped: 0,
        }
    }

    /// Adds ids found elsewhere (e.g. already in the output file).
    pub fn extend<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.seen.extend(ids.into_iter().map(Into::into));
    }

    /// Whether a record for `listing_id` still needs writing. Counts a skip
    /// when it does not.
    pub fn should_emit(&mut self, listing_id: &str) -> bool {
        if self.seen.contains(listing_id) {
            self.skipped += 1;
            false
        } else {
            true
        }
    }

    pub fn mark_emitted(&mut self, listing_id: &str) {
        self.seen.insert(listing_id.to_owned());
    }

    pub fn contains(&self, listing_id: &str) -> bool {
        self.seen.contains(listing_id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn duplicates_skipped(&self) -> usize {
        self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_each_id_once() {
        let mut dedup = Deduplicator::new();
        assert!(dedup.should_emit("1"));
        dedup.mark_emitted("1");
        assert!(!dedup.should_emit("1"));
        assert!(dedup.should_emit("2"));
        assert_eq!(dedup.duplicates_skipped(), 1);
    }

    #[test]
    fn seeded_ids_are_never_emitted() {
        let mut dedup = Deduplicator::seeded(["a", "b"]);
        dedup.extend(vec!["c".to_string()]);
        assert_eq!(dedup.len(), 3);
        assert!(!dedup.should_emit("c"));
        assert!(dedup.contains("a"));
    }
}
