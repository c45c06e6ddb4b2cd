//! Paginated List Controller.
//!
//! One `PageSource` seam with two implementations: server-backed (uses the
//! envelope's pagination metadata verbatim, slices client-side when the
//! backend answers with a bare array) and client-backed (slices the last
//! known full collection). The controller selects between them: server
//! first, client fallback on request failure. Degrading to the cached
//! collection on a flaky endpoint is deliberate — the list view stays
//! usable, it is not an error state.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::{Arc, RwLock};

use crate::auth::AuthSession;
use crate::gateway::{decode_records, extract_page_meta, extract_records_lenient, GatewayError};

// ============================================================================
// Page types
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PageQuery {
    pub page: usize,
    pub size: usize,
    pub status: Option<String>,
    pub mentor_id: Option<i64>,
    pub sort_by: Option<String>,
    pub direction: Option<String>,
}

impl PageQuery {
    pub fn new(page: usize, size: usize) -> Self {
        Self {
            page,
            size,
            ..Self::default()
        }
    }

    fn query_string(&self) -> String {
        let mut parts = vec![format!("page={}", self.page), format!("size={}", self.size)];
        if let Some(status) = &self.status {
            parts.push(format!("status={}", status));
        }
        if let Some(mentor_id) = self.mentor_id {
            parts.push(format!("mentorId={}", mentor_id));
        }
        if let Some(sort_by) = &self.sort_by {
            parts.push(format!("sortBy={}", sort_by));
        }
        if let Some(direction) = &self.direction {
            parts.push(format!("direction={}", direction));
        }
        parts.join("&")
    }
}

/// Slice a full collection into one page. Pages never overlap and their
/// union (up to the final partial page) reconstructs the collection.
pub fn slice_page<T: Clone>(items: &[T], page: usize, size: usize) -> Page<T> {
    let total_items = items.len();
    let total_pages = if size == 0 {
        0
    } else {
        total_items.div_ceil(size)
    };
    let start = page.saturating_mul(size).min(total_items);
    let end = start.saturating_add(size).min(total_items);
    Page {
        items: items[start..end].to_vec(),
        page,
        total_items,
        total_pages,
    }
}

// ============================================================================
// PageSource implementations
// ============================================================================

#[async_trait]
pub trait PageSource<T>: Send + Sync {
    async fn load_page(&self, query: &PageQuery) -> Result<Page<T>, GatewayError>;
}

/// Server-backed source. Remembers every full collection it sees (a
/// bare-array response) in a shared cache so the client-backed fallback has
/// something to slice.
pub struct ServerPageSource<T> {
    auth: AuthSession,
    path: String,
    cache: Arc<RwLock<Vec<T>>>,
    post_filter: Option<Box<dyn Fn(&T) -> bool + Send + Sync>>,
}

impl<T> ServerPageSource<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(auth: AuthSession, path: impl Into<String>, cache: Arc<RwLock<Vec<T>>>) -> Self {
        Self {
            auth,
            path: path.into(),
            cache,
            post_filter: None,
        }
    }

    /// Classification the server cannot be trusted with (e.g. mentor-role
    /// filtering over the dual role encoding) is applied client-side after
    /// decode.
    pub fn with_post_filter(
        mut self,
        filter: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.post_filter = Some(Box::new(filter));
        self
    }

    fn apply_filter(&self, items: Vec<T>) -> Vec<T> {
        match &self.post_filter {
            Some(filter) => items.into_iter().filter(|t| filter(t)).collect(),
            None => items,
        }
    }
}

#[async_trait]
impl<T> PageSource<T> for ServerPageSource<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    async fn load_page(&self, query: &PageQuery) -> Result<Page<T>, GatewayError> {
        let path = format!("{}?{}", self.path, query.query_string());
        let client = self.auth.client().clone();
        let value = self
            .auth
            .with_auth_retry(|| {
                let client = client.clone();
                let path = path.clone();
                async move { client.get(&path).await }
            })
            .await?;

        let meta = extract_page_meta(&value);
        let items = self.apply_filter(decode_records(extract_records_lenient(&value)));

        match meta {
            // Envelope metadata means the server already paged this
            // response. Use its totals verbatim; the post filter only trims
            // the visible page and must never re-slice by the absolute page
            // number (the items at hand are page `meta.current_page`, not
            // the whole collection).
            Some(meta) => Ok(Page {
                items,
                page: query.page,
                total_items: meta.total_items,
                total_pages: meta.total_pages,
            }),
            // Bare array: the full collection — remember it and slice
            // client-side.
            None => {
                *self.cache.write().unwrap_or_else(|e| e.into_inner()) = items.clone();
                Ok(slice_page(&items, query.page, query.size))
            }
        }
    }
}

/// Client-backed source over the last known full collection.
pub struct ClientPageSource<T> {
    cache: Arc<RwLock<Vec<T>>>,
}

impl<T> ClientPageSource<T> {
    pub fn new(cache: Arc<RwLock<Vec<T>>>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl<T> PageSource<T> for ClientPageSource<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn load_page(&self, query: &PageQuery) -> Result<Page<T>, GatewayError> {
        let items = self
            .cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        Ok(slice_page(&items, query.page, query.size))
    }
}

// ============================================================================
// ListController
// ============================================================================

/// Owns the strategy: server first, cached-collection fallback on failure.
/// Instantiated three times — sessions, mentors, payments.
pub struct ListController<T> {
    server: ServerPageSource<T>,
    fallback: ClientPageSource<T>,
    query: PageQuery,
}

impl<T> ListController<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(auth: AuthSession, path: impl Into<String>, page_size: usize) -> Self {
        let cache = Arc::new(RwLock::new(Vec::new()));
        Self {
            server: ServerPageSource::new(auth, path, cache.clone()),
            fallback: ClientPageSource::new(cache),
            query: PageQuery::new(0, page_size),
        }
    }

    pub fn with_post_filter(
        mut self,
        filter: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.server = self.server.with_post_filter(filter);
        self
    }

    pub fn query_mut(&mut self) -> &mut PageQuery {
        &mut self.query
    }

    /// Changing the page size always snaps back to the first page so an
    /// out-of-range page is never displayed.
    pub fn set_page_size(&mut self, size: usize) {
        self.query.size = size;
        self.query.page = 0;
    }

    pub fn set_page(&mut self, page: usize) {
        self.query.page = page;
    }

    pub async fn load_current(&self) -> Page<T> {
        self.load(&self.query).await
    }

    pub async fn load(&self, query: &PageQuery) -> Page<T> {
        match self.server.load_page(query).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(error = %e, path = %self.server.path, "server page fetch failed, falling back to cached collection");
                self.fallback
                    .load_page(query)
                    .await
                    .unwrap_or_else(|_| slice_page(&[], query.page, query.size))
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
