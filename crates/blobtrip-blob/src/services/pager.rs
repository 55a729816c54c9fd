//! Cursor-driven blob listing as a pull iterator
//!
//! [`BlobPager`] walks the continuation-token protocol one page at a time:
//!
//! ```text
//! Start --fetch--> Buffered --drain, cursor present--> Buffered ...
//!                      \--drain, no cursor--> Exhausted
//! ```
//!
//! Page boundaries belong to the service. The pager never reorders entries
//! and stops for good on the first error.

use std::collections::{HashSet, VecDeque};
use std::mem;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, Stream};
use tracing::{debug, warn};

use super::container::Container;
use super::store::{BlobDescriptor, BlobStore, Cursor, ListOptions, ListPage};
use crate::error::BlobError;

/// Hard cap on pages fetched by one pager
pub const DEFAULT_MAX_PAGES: usize = 100_000;

/// Anything that can hand out listing pages
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, cursor: Option<Cursor>) -> Result<ListPage, BlobError>;
}

/// Pages straight from a [`BlobStore`] container listing
pub struct StorePageSource {
    store: Arc<dyn BlobStore>,
    container: Container,
    options: ListOptions,
}

impl StorePageSource {
    pub fn new(store: Arc<dyn BlobStore>, container: Container, options: ListOptions) -> Self {
        Self {
            store,
            container,
            options,
        }
    }
}

#[async_trait]
impl PageSource for StorePageSource {
    async fn fetch_page(&self, cursor: Option<Cursor>) -> Result<ListPage, BlobError> {
        self.container.ensure_live()?;
        self.store
            .list_blobs(self.container.name(), &self.options, cursor)
            .await
    }
}

enum PagerState {
    Start,
    Buffered {
        items: VecDeque<BlobDescriptor>,
        next: Option<Cursor>,
    },
    Exhausted,
}

/// Lazy, finite sequence of every blob a [`PageSource`] lists
pub struct BlobPager {
    source: Box<dyn PageSource>,
    state: PagerState,
    pages_fetched: usize,
    max_pages: usize,
    sent_cursors: HashSet<Cursor>,
}

impl BlobPager {
    pub fn new(source: impl PageSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            state: PagerState::Start,
            pages_fetched: 0,
            max_pages: DEFAULT_MAX_PAGES,
            sent_cursors: HashSet::new(),
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, PagerState::Exhausted)
    }

    /// Next blob, fetching pages as needed. `None` once the listing is done.
    pub async fn next(&mut self) -> Option<Result<BlobDescriptor, BlobError>> {
        loop {
            match mem::replace(&mut self.state, PagerState::Exhausted) {
                PagerState::Exhausted => return None,
                PagerState::Start => {
                    if let Err(e) = self.fetch(None).await {
                        return Some(Err(e));
                    }
                }
                PagerState::Buffered { mut items, next } => {
                    if let Some(item) = items.pop_front() {
                        self.state = PagerState::Buffered { items, next };
                        return Some(Ok(item));
                    }
                    match next {
                        Some(cursor) => {
                            if let Err(e) = self.fetch(Some(cursor)).await {
                                return Some(Err(e));
                            }
                        }
                        None => return None,
                    }
                }
            }
        }
    }

    /// Next page as the service returned it, possibly empty.
    /// Entries already handed out by [`Self::next`] are not repeated.
    pub async fn next_page(&mut self) -> Option<Result<Vec<BlobDescriptor>, BlobError>> {
        let cursor = match mem::replace(&mut self.state, PagerState::Exhausted) {
            PagerState::Exhausted => return None,
            PagerState::Start => None,
            PagerState::Buffered { items, next } if !items.is_empty() => {
                self.state = PagerState::Buffered {
                    items: VecDeque::new(),
                    next,
                };
                return Some(Ok(items.into()));
            }
            PagerState::Buffered { next: None, .. } => return None,
            PagerState::Buffered { next: Some(c), .. } => Some(c),
        };

        if let Err(e) = self.fetch(cursor).await {
            return Some(Err(e));
        }

        match mem::replace(&mut self.state, PagerState::Exhausted) {
            PagerState::Buffered { items, next } => {
                self.state = PagerState::Buffered {
                    items: VecDeque::new(),
                    next,
                };
                Some(Ok(items.into()))
            }
            _ => None,
        }
    }

    /// Drain the rest of the listing into a vector
    pub async fn collect_all(mut self) -> Result<Vec<BlobDescriptor>, BlobError> {
        let mut blobs = Vec::new();
        while let Some(item) = self.next().await {
            blobs.push(item?);
        }
        Ok(blobs)
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<BlobDescriptor, BlobError>> + Send {
        stream::unfold(self, |mut pager| async move {
            pager.next().await.map(|item| (item, pager))
        })
    }

    /// Fetch one page into the buffer. On error the state stays `Exhausted`.
    async fn fetch(&mut self, cursor: Option<Cursor>) -> Result<(), BlobError> {
        if self.pages_fetched >= self.max_pages {
            warn!(
                "Listing gave up after {} pages; the service keeps returning cursors",
                self.pages_fetched
            );
            return Err(BlobError::PageLimitExceeded(self.max_pages));
        }

        let page = self.source.fetch_page(cursor.clone()).await?;
        self.pages_fetched += 1;

        if let Some(sent) = cursor {
            self.sent_cursors.insert(sent);
        }
        if let Some(received) = &page.next_cursor {
            if self.sent_cursors.contains(received) {
                warn!("Listing handed back cursor {:?} it already used", received);
                return Err(BlobError::CursorLoop(received.as_str().to_string()));
            }
        }

        debug!(
            "Page {}: {} blobs, more={}",
            self.pages_fetched,
            page.blobs.len(),
            page.next_cursor.is_some()
        );

        self.state = PagerState::Buffered {
            items: page.blobs.into(),
            next: page.next_cursor,
        };
        Ok(())
    }
}

/// Lists every blob in a container
#[derive(Clone)]
pub struct BlobEnumerator {
    store: Arc<dyn BlobStore>,
    options: ListOptions,
}

impl BlobEnumerator {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            options: ListOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ListOptions) -> Self {
        self.options = options;
        self
    }

    /// A fresh pager starting from the first page. Each call restarts the
    /// listing and reflects the container as it is when pages are pulled.
    pub fn list_all(&self, container: &Container) -> BlobPager {
        BlobPager::new(StorePageSource::new(
            self.store.clone(),
            container.clone(),
            self.options.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::container::ContainerManager;
    use crate::services::memory_store::{MemoryBlobStore, StoreOperation};
    use futures::StreamExt;
    use std::sync::Mutex;

    /// Replays canned pages and records the cursors it was asked for
    struct ScriptedSource {
        pages: Mutex<VecDeque<Result<ListPage, BlobError>>>,
        requests: Arc<Mutex<Vec<Option<Cursor>>>>,
    }

    impl ScriptedSource {
        fn new(pages: Vec<Result<ListPage, BlobError>>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                requests: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl PageSource for ScriptedSource {
        async fn fetch_page(&self, cursor: Option<Cursor>) -> Result<ListPage, BlobError> {
            self.requests.lock().unwrap().push(cursor);
            self.pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(BlobError::Service("script exhausted".into())))
        }
    }

    fn blob(name: &str) -> BlobDescriptor {
        BlobDescriptor {
            name: name.to_string(),
            uri: format!("memory://c/{}", name),
            size: None,
            last_modified: None,
        }
    }

    fn page(names: &[&str], next: Option<&str>) -> Result<ListPage, BlobError> {
        Ok(ListPage {
            blobs: names.iter().map(|n| blob(n)).collect(),
            next_cursor: next.map(Cursor::new),
        })
    }

    fn names(blobs: &[BlobDescriptor]) -> Vec<&str> {
        blobs.iter().map(|b| b.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_walks_all_pages_in_service_order() {
        let source = ScriptedSource::new(vec![
            page(&["b", "a"], Some("t1")),
            page(&["d", "c"], Some("t2")),
            page(&["e"], None),
        ]);
        let requests = source.requests.clone();

        let blobs = BlobPager::new(source).collect_all().await.unwrap();
        assert_eq!(names(&blobs), vec!["b", "a", "d", "c", "e"]);
        assert_eq!(
            *requests.lock().unwrap(),
            vec![None, Some(Cursor::new("t1")), Some(Cursor::new("t2"))]
        );
    }

    #[tokio::test]
    async fn test_empty_listing() {
        let mut pager = BlobPager::new(ScriptedSource::new(vec![page(&[], None)]));
        assert!(pager.next().await.is_none());
        assert!(pager.is_exhausted());
        assert_eq!(pager.pages_fetched(), 1);
        assert!(pager.next().await.is_none());
        assert_eq!(pager.pages_fetched(), 1);
    }

    #[tokio::test]
    async fn test_empty_page_with_cursor_keeps_pulling() {
        let source = ScriptedSource::new(vec![
            page(&["a"], Some("t1")),
            page(&[], Some("t2")),
            page(&["b"], None),
        ]);
        let blobs = BlobPager::new(source).collect_all().await.unwrap();
        assert_eq!(names(&blobs), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_self_referential_cursor_is_an_error() {
        let source = ScriptedSource::new(vec![page(&["a"], Some("t1")), page(&["b"], Some("t1"))]);
        let mut pager = BlobPager::new(source);

        assert_eq!(pager.next().await.unwrap().unwrap().name, "a");
        let err = pager.next().await.unwrap().unwrap_err();
        assert!(matches!(err, BlobError::CursorLoop(ref t) if t == "t1"));
        assert!(pager.next().await.is_none());
    }

    #[tokio::test]
    async fn test_cursor_cycle_is_an_error() {
        let source = ScriptedSource::new(vec![
            page(&["a"], Some("t1")),
            page(&["b"], Some("t2")),
            page(&["c"], Some("t1")),
            page(&["never"], None),
        ]);
        let requests = source.requests.clone();
        let mut pager = BlobPager::new(source);

        assert_eq!(pager.next().await.unwrap().unwrap().name, "a");
        assert_eq!(pager.next().await.unwrap().unwrap().name, "b");
        let err = pager.next().await.unwrap().unwrap_err();
        assert!(matches!(err, BlobError::CursorLoop(ref t) if t == "t1"));
        assert!(pager.next().await.is_none());
        assert_eq!(requests.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_page_cap() {
        let source = ScriptedSource::new(vec![
            page(&["a"], Some("t1")),
            page(&["b"], Some("t2")),
            page(&["c"], Some("t3")),
        ]);
        let mut pager = BlobPager::new(source).with_max_pages(2);

        assert_eq!(pager.next().await.unwrap().unwrap().name, "a");
        assert_eq!(pager.next().await.unwrap().unwrap().name, "b");
        let err = pager.next().await.unwrap().unwrap_err();
        assert!(matches!(err, BlobError::PageLimitExceeded(2)));
        assert!(pager.next().await.is_none());
    }

    #[tokio::test]
    async fn test_error_ends_iteration() {
        let source = ScriptedSource::new(vec![
            page(&["a"], Some("t1")),
            Err(BlobError::Service("500 Internal Server Error".into())),
            page(&["never"], None),
        ]);
        let mut pager = BlobPager::new(source);

        assert!(pager.next().await.unwrap().is_ok());
        assert!(pager.next().await.unwrap().is_err());
        assert!(pager.next().await.is_none());
    }

    #[tokio::test]
    async fn test_next_page_returns_raw_pages() {
        let source = ScriptedSource::new(vec![
            page(&["a", "b"], Some("t1")),
            page(&[], Some("t2")),
            page(&["c"], None),
        ]);
        let mut pager = BlobPager::new(source);

        assert_eq!(names(&pager.next_page().await.unwrap().unwrap()), vec!["a", "b"]);
        assert!(pager.next_page().await.unwrap().unwrap().is_empty());
        assert_eq!(names(&pager.next_page().await.unwrap().unwrap()), vec!["c"]);
        assert!(pager.next_page().await.is_none());
    }

    #[tokio::test]
    async fn test_next_page_after_partial_drain() {
        let source = ScriptedSource::new(vec![page(&["a", "b", "c"], Some("t1")), page(&["d"], None)]);
        let mut pager = BlobPager::new(source);

        assert_eq!(pager.next().await.unwrap().unwrap().name, "a");
        assert_eq!(names(&pager.next_page().await.unwrap().unwrap()), vec!["b", "c"]);
        assert_eq!(names(&pager.next_page().await.unwrap().unwrap()), vec!["d"]);
        assert!(pager.next_page().await.is_none());
    }

    #[tokio::test]
    async fn test_into_stream() {
        let source = ScriptedSource::new(vec![page(&["a"], Some("t1")), page(&["b"], None)]);
        let items: Vec<_> = BlobPager::new(source).into_stream().collect().await;
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn test_enumerator_lists_more_than_one_page() {
        let store = Arc::new(MemoryBlobStore::with_page_size(3));
        let manager = ContainerManager::new(store.clone());
        let container = manager.create("quickstartblobs").await.unwrap();
        for i in 0..10 {
            store
                .seed_blob(container.name(), &format!("blob-{:02}", i), vec![i as u8])
                .unwrap();
        }

        let enumerator = BlobEnumerator::new(store.clone());
        let mut pager = enumerator.list_all(&container);
        let mut seen = Vec::new();
        while let Some(item) = pager.next().await {
            seen.push(item.unwrap().name);
        }
        assert_eq!(pager.pages_fetched(), 4);
        let expected: Vec<String> = (0..10).map(|i| format!("blob-{:02}", i)).collect();
        let mut sorted = seen.clone();
        sorted.sort();
        assert_eq!(sorted, expected);

        // Restartable: a second call starts over
        let again = enumerator.list_all(&container).collect_all().await.unwrap();
        assert_eq!(again.len(), 10);
    }

    #[tokio::test]
    async fn test_enumerator_prefix_and_empty_container() {
        let store = Arc::new(MemoryBlobStore::new());
        let manager = ContainerManager::new(store.clone());
        let container = manager.create("quickstartblobs").await.unwrap();

        let enumerator = BlobEnumerator::new(store.clone());
        assert!(enumerator.list_all(&container).collect_all().await.unwrap().is_empty());

        store.seed_blob(container.name(), "logs/a", "1").unwrap();
        store.seed_blob(container.name(), "data/b", "2").unwrap();
        let filtered = enumerator
            .with_options(ListOptions {
                prefix: Some("logs/".to_string()),
                page_size_hint: None,
            })
            .list_all(&container)
            .collect_all()
            .await
            .unwrap();
        assert_eq!(names(&filtered), vec!["logs/a"]);
    }

    #[tokio::test]
    async fn test_enumerator_surfaces_service_failure() {
        let store = Arc::new(MemoryBlobStore::new());
        let manager = ContainerManager::new(store.clone());
        let container = manager.create("quickstartblobs").await.unwrap();
        store.fail_next(StoreOperation::ListBlobs, "throttled");

        let err = BlobEnumerator::new(store)
            .list_all(&container)
            .collect_all()
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::Service(_)));
    }
}
