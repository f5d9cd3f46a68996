//! Drops candidates the knowledge store already holds.

use tracing::{debug, warn};

use crate::models::{truncate_chars, PaperRecord};
use crate::store::KnowledgeStore;

/// Length of the title prefix used for store lookups.
pub const LOOKUP_PREFIX_CHARS: usize = 30;

/// First candidate, in the given order, whose title prefix the store does not
/// know. Lookup errors count as "not known"; without a store nothing is known.
pub async fn first_unknown(
    candidates: &[PaperRecord],
    store: Option<&dyn KnowledgeStore>,
) -> Option<PaperRecord> {
    let Some(store) = store else {
        return candidates.first().cloned();
    };

    for paper in candidates {
        let prefix = truncate_chars(&paper.title, LOOKUP_PREFIX_CHARS);
        match store.exists(&prefix).await {
            Ok(true) => debug!(title = %paper.title, "Already in knowledge store"),
            Ok(false) => return Some(paper.clone()),
            Err(e) => {
                warn!(title = %paper.title, error = %e, "Knowledge store lookup failed; treating as new");
                return Some(paper.clone());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::error::StoreError;
    use crate::models::EnrichedPaperRecord;
    use crate::store::AppendMetadata;

    #[derive(Default)]
    struct RecordingStore {
        known: Vec<&'static str>,
        fail: bool,
        lookups: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl KnowledgeStore for RecordingStore {
        async fn exists(&self, title_prefix: &str) -> Result<bool, StoreError> {
            self.lookups.lock().unwrap().push(title_prefix.to_string());
            if self.fail {
                return Err(StoreError::Malformed("down".to_string()));
            }
            Ok(self.known.iter().any(|k| k.contains(title_prefix)))
        }

        async fn append(&self, _r: &EnrichedPaperRecord, _m: &AppendMetadata) -> Result<String, StoreError> {
            unreachable!()
        }
    }

    fn papers(titles: &[&str]) -> Vec<PaperRecord> {
        titles.iter().map(|t| PaperRecord::try_new(t, "test").unwrap()).collect()
    }

    #[tokio::test]
    async fn test_no_store_returns_first() {
        let c = papers(&["A", "B"]);
        assert_eq!(first_unknown(&c, None).await.unwrap().title, "A");
        assert!(first_unknown(&[], None).await.is_none());
    }

    #[tokio::test]
    async fn test_skips_known_titles_using_prefix() {
        let store = RecordingStore {
            known: vec!["Detecting Hallucinations in LLM Code Review"],
            ..Default::default()
        };
        let c = papers(&["Detecting Hallucinations in LLM Code Review", "Unrelated Paper"]);
        let picked = first_unknown(&c, Some(&store)).await.unwrap();
        assert_eq!(picked.title, "Unrelated Paper");

        let lookups = store.lookups.lock().unwrap();
        assert_eq!(lookups[0], "Detecting Hallucinations in LL");
        assert_eq!(lookups[0].chars().count(), 30);
    }

    #[tokio::test]
    async fn test_all_known_is_none() {
        let store = RecordingStore { known: vec!["A", "B"], ..Default::default() };
        assert!(first_unknown(&papers(&["A", "B"]), Some(&store)).await.is_none());
    }

    #[tokio::test]
    async fn test_lookup_error_fails_open() {
        let store = RecordingStore { fail: true, ..Default::default() };
        let picked = first_unknown(&papers(&["Top", "Second"]), Some(&store)).await.unwrap();
        assert_eq!(picked.title, "Top");
        assert_eq!(store.lookups.lock().unwrap().len(), 1);
    }
}
