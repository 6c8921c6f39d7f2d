//! Per-call execution context

use crate::client::ExecutionClient;
use crate::feed::Feed;
use crate::progress::ProgressObserver;
use canopy_table::Scalar;
use std::fmt;
use std::sync::Arc;

/// Transient settings of one `compute`/`future` call
///
/// Nothing here is stored in the graph. Without a client, `compute` runs on
/// the calling thread.
#[derive(Clone, Default)]
pub struct RunContext {
    client: Option<Arc<dyn ExecutionClient>>,
    feed: Feed,
    progress: Option<Arc<dyn ProgressObserver>>,
}

impl RunContext {
    /// Local execution, no overrides, no progress
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit work through `client`
    #[must_use]
    pub fn with_client(mut self, client: Arc<dyn ExecutionClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Replace the feed
    #[must_use]
    pub fn with_feed(mut self, feed: Feed) -> Self {
        self.feed = feed;
        self
    }

    /// Add one scalar override
    #[must_use]
    pub fn with_override(mut self, place: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.feed.insert(place, value);
        self
    }

    /// Report progress to `observer`
    #[must_use]
    pub fn with_progress(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.progress = Some(observer);
        self
    }

    /// Execution client, if any
    #[inline]
    #[must_use]
    pub fn client(&self) -> Option<&Arc<dyn ExecutionClient>> {
        self.client.as_ref()
    }

    /// Overrides of this call
    #[inline]
    #[must_use]
    pub fn feed(&self) -> &Feed {
        &self.feed
    }

    /// Progress observer, if any
    #[inline]
    #[must_use]
    pub fn progress(&self) -> Option<&Arc<dyn ProgressObserver>> {
        self.progress.as_ref()
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("client", &self.client)
            .field("feed", &self.feed)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}
