//! Content provider trait: the black-box source of items to index.
//!
//! Implement this trait to feed a corpus into the retrieval strategy. The
//! provider owns fetching and text extraction; the strategy owns chunking,
//! embedding, and storage.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use groundwork_core::content::ContentProvider;
//! use groundwork_core::error::{RagError, Result};
//! use groundwork_core::models::ContentItem;
//!
//! struct Fixed(Vec<ContentItem>);
//!
//! #[async_trait]
//! impl ContentProvider for Fixed {
//!     async fn fetch_all_items(&self) -> Result<Vec<ContentItem>> {
//!         Ok(self.0.clone())
//!     }
//!
//!     async fn fetch_item(&self, reference: &str) -> Result<ContentItem> {
//!         self.0
//!             .iter()
//!             .find(|i| i.reference == reference)
//!             .cloned()
//!             .ok_or_else(|| RagError::NotFound(reference.to_string()))
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::Result;
use crate::models::ContentItem;

#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Fetch every item in the corpus.
    async fn fetch_all_items(&self) -> Result<Vec<ContentItem>>;

    /// Fetch one item by reference.
    ///
    /// Fails with [`RagError::NotFound`](crate::error::RagError::NotFound)
    /// when the reference is unknown.
    async fn fetch_item(&self, reference: &str) -> Result<ContentItem>;

    /// Text to chunk for `item`. Defaults to the raw body.
    fn extract_item_content(&self, item: &ContentItem) -> String {
        item.body.clone()
    }

    /// Stable reference for `item`. Defaults to [`ContentItem::reference`].
    fn item_ref(&self, item: &ContentItem) -> String {
        item.reference.clone()
    }

    /// Whether the item has supplementary documentation.
    async fn has_supplementary_docs(&self, _reference: &str) -> Result<bool> {
        Ok(false)
    }

    /// Supplementary documentation text, if any.
    async fn fetch_supplementary_docs(&self, _reference: &str) -> Result<Option<String>> {
        Ok(None)
    }
}
