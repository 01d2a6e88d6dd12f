//! Paginated text search
//!
//! Text is pulled from a [`PageTextSource`] one item at a time the first time
//! a search needs it and cached for the lifetime of the open document.
//! Matching is case-insensitive substring containment.

use async_trait::async_trait;
use docket_preview_scheduler::Generation;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SearchError {
    /// The document was replaced while text was being extracted
    #[error("search superseded by a newer file")]
    Superseded,

    #[error("text extraction failed for item {item}: {reason}")]
    Extraction { item: usize, reason: String },
}

/// Per-item text provider for a paginated document
#[async_trait]
pub trait PageTextSource: Send + Sync {
    fn page_count(&self) -> usize;

    /// Extract the text of one item; may suspend
    async fn extract_text(&self, item: usize) -> Result<String, SearchError>;
}

/// One matched item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub item: usize,
    /// Non-overlapping occurrences of the query in the item
    pub occurrences: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchState {
    pub query: String,
    /// Matched items in ascending item order
    pub hits: Vec<SearchHit>,
    /// Index into `hits`; `None` exactly when `hits` is empty
    pub cursor: Option<usize>,
}

impl SearchState {
    pub fn current_hit(&self) -> Option<&SearchHit> {
        self.cursor.and_then(|cursor| self.hits.get(cursor))
    }

    /// 1-based position of the cursor, 0 with no matches
    pub fn current_match(&self) -> usize {
        self.cursor.map_or(0, |cursor| cursor + 1)
    }

    pub fn total_matches(&self) -> usize {
        self.hits.len()
    }

    /// Sum of occurrences over every matched item
    pub fn total_occurrences(&self) -> usize {
        self.hits.iter().map(|hit| hit.occurrences).sum()
    }
}

/// Search over the items of one open document
#[derive(Debug)]
pub struct PaginatedSearchIndex {
    generation: Generation,
    /// Lowercased text per extracted item
    cache: HashMap<usize, String>,
    state: SearchState,
}

impl PaginatedSearchIndex {
    pub fn new(generation: Generation) -> Self {
        Self {
            generation,
            cache: HashMap::new(),
            state: SearchState::default(),
        }
    }

    pub fn generation(&self) -> &Generation {
        &self.generation
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    /// Number of items whose text is cached
    pub fn cached_items(&self) -> usize {
        self.cache.len()
    }

    /// Run `query` over every item of `source`
    ///
    /// Missing item text is extracted first. If the owning generation is
    /// superseded while extraction is suspended, nothing is recorded and
    /// [`SearchError::Superseded`] is returned. An empty query clears the
    /// results but keeps cached text.
    pub async fn search<S>(&mut self, source: &S, query: &str) -> Result<&[SearchHit], SearchError>
    where
        S: PageTextSource + ?Sized,
    {
        if query.is_empty() {
            self.clear();
            return Ok(&self.state.hits);
        }
        if self.generation.is_stale() {
            return Err(SearchError::Superseded);
        }

        let total = source.page_count();
        let mut extracted = HashMap::new();
        for item in (0..total).filter(|item| !self.cache.contains_key(item)) {
            let text = source.extract_text(item).await?;
            if self.generation.is_stale() {
                tracing::debug!(item, "discarding text extracted for a superseded document");
                return Err(SearchError::Superseded);
            }
            extracted.insert(item, text.to_lowercase());
        }

        if !extracted.is_empty() {
            tracing::debug!(count = extracted.len(), "cached extracted item text");
            self.cache.extend(extracted);
        }

        let needle = query.to_lowercase();
        let hits: Vec<SearchHit> = (0..total)
            .filter_map(|item| {
                let occurrences = self.cache.get(&item)?.matches(needle.as_str()).count();
                (occurrences > 0).then_some(SearchHit { item, occurrences })
            })
            .collect();

        self.state = SearchState {
            query: query.to_string(),
            cursor: if hits.is_empty() { None } else { Some(0) },
            hits,
        };

        Ok(&self.state.hits)
    }

    /// Advance to the next match, wrapping; returns the item to jump to
    pub fn next_match(&mut self) -> Option<usize> {
        let len = self.state.hits.len();
        let cursor = self.state.cursor?;
        self.move_cursor((cursor + 1) % len)
    }

    /// Step back to the previous match, wrapping; returns the item to jump to
    pub fn previous_match(&mut self) -> Option<usize> {
        let len = self.state.hits.len();
        let cursor = self.state.cursor?;
        self.move_cursor((cursor + len - 1) % len)
    }

    fn move_cursor(&mut self, cursor: usize) -> Option<usize> {
        self.state.cursor = Some(cursor);
        self.state.current_hit().map(|hit| hit.item)
    }

    /// Drop the query and results; extracted text stays cached
    pub fn clear(&mut self) {
        self.state = SearchState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docket_preview_scheduler::GenerationCounter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MemorySource {
        pages: Vec<String>,
        extractions: AtomicUsize,
        supersede_on: Option<(usize, GenerationCounter)>,
    }

    impl MemorySource {
        fn new(pages: &[&str]) -> Self {
            Self {
                pages: pages.iter().map(|page| page.to_string()).collect(),
                extractions: AtomicUsize::new(0),
                supersede_on: None,
            }
        }

        fn extractions(&self) -> usize {
            self.extractions.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PageTextSource for MemorySource {
        fn page_count(&self) -> usize {
            self.pages.len()
        }

        async fn extract_text(&self, item: usize) -> Result<String, SearchError> {
            self.extractions.fetch_add(1, Ordering::SeqCst);
            if let Some((page, counter)) = &self.supersede_on {
                if *page == item {
                    counter.advance();
                }
            }
            self.pages.get(item).cloned().ok_or(SearchError::Extraction {
                item,
                reason: "no such page".into(),
            })
        }
    }

    fn index() -> (GenerationCounter, PaginatedSearchIndex) {
        let counter = GenerationCounter::new();
        let index = PaginatedSearchIndex::new(counter.advance());
        (counter, index)
    }

    #[tokio::test]
    async fn test_case_insensitive_matches_in_item_order() {
        let source = MemorySource::new(&["Motion to Dismiss", "nothing here", "motion granted; MOTION denied"]);
        let (_counter, mut index) = index();

        let hits = index.search(&source, "MoTiOn").await.unwrap().to_vec();

        assert_eq!(
            hits,
            vec![
                SearchHit { item: 0, occurrences: 1 },
                SearchHit { item: 2, occurrences: 2 },
            ]
        );
        assert_eq!(index.state().cursor, Some(0));
        assert_eq!(index.state().total_occurrences(), 3);
    }

    #[tokio::test]
    async fn test_text_extracted_once_and_cached() {
        let source = MemorySource::new(&["alpha", "beta", "gamma"]);
        let (_counter, mut index) = index();

        index.search(&source, "a").await.unwrap();
        index.search(&source, "beta").await.unwrap();

        assert_eq!(source.extractions(), 3);
        assert_eq!(index.cached_items(), 3);
    }

    #[tokio::test]
    async fn test_next_match_wraps_after_match_count_calls() {
        let source = MemorySource::new(&["exhibit", "none", "exhibit a", "exhibit b"]);
        let (_counter, mut index) = index();
        index.search(&source, "exhibit").await.unwrap();

        let first = index.state().current_hit().cloned();
        let count = index.state().total_matches();
        assert_eq!(count, 3);

        let visited: Vec<_> = (0..count).filter_map(|_| index.next_match()).collect();
        assert_eq!(visited, vec![2, 3, 0]);
        assert_eq!(index.state().current_hit().cloned(), first);
    }

    #[tokio::test]
    async fn test_previous_match_wraps_backwards() {
        let source = MemorySource::new(&["x", "x", "x"]);
        let (_counter, mut index) = index();
        index.search(&source, "x").await.unwrap();

        assert_eq!(index.previous_match(), Some(2));
        assert_eq!(index.previous_match(), Some(1));
        assert_eq!(index.state().current_match(), 2);
    }

    #[tokio::test]
    async fn test_no_matches_leaves_cursor_empty() {
        let source = MemorySource::new(&["affidavit"]);
        let (_counter, mut index) = index();

        assert!(index.search(&source, "subpoena").await.unwrap().is_empty());
        assert_eq!(index.state().cursor, None);
        assert_eq!(index.next_match(), None);
        assert_eq!(index.previous_match(), None);
        assert_eq!(index.state().current_match(), 0);
    }

    #[tokio::test]
    async fn test_empty_query_clears_results_but_keeps_cache() {
        let source = MemorySource::new(&["one", "two"]);
        let (_counter, mut index) = index();
        index.search(&source, "one").await.unwrap();

        assert!(index.search(&source, "").await.unwrap().is_empty());
        assert_eq!(index.state(), &SearchState::default());
        assert_eq!(index.cached_items(), 2);

        index.search(&source, "two").await.unwrap();
        assert_eq!(source.extractions(), 2);
    }

    #[tokio::test]
    async fn test_superseded_during_extraction_discards_result() {
        let counter = GenerationCounter::new();
        let mut index = PaginatedSearchIndex::new(counter.advance());
        let mut source = MemorySource::new(&["term", "term", "term"]);
        source.supersede_on = Some((1, counter.clone()));

        let result = index.search(&source, "term").await;

        assert_eq!(result.unwrap_err(), SearchError::Superseded);
        assert_eq!(index.state(), &SearchState::default());
        assert_eq!(index.cached_items(), 0);
    }

    #[tokio::test]
    async fn test_extraction_failure_keeps_previous_results() {
        struct Broken;

        #[async_trait]
        impl PageTextSource for Broken {
            fn page_count(&self) -> usize {
                1
            }

            async fn extract_text(&self, item: usize) -> Result<String, SearchError> {
                Err(SearchError::Extraction {
                    item,
                    reason: "corrupt text layer".into(),
                })
            }
        }

        let (_counter, mut index) = index();
        let err = index.search(&Broken, "x").await.unwrap_err();

        assert!(matches!(err, SearchError::Extraction { item: 0, .. }));
        assert_eq!(index.state().cursor, None);
    }
}
