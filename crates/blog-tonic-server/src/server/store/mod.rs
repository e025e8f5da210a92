//! Document store seam.
//!
//! Handlers only see [`BlogStore`]. Production wires in
//! [`mongo::MongoStore`]; tests substitute the in-memory store.
//!
//! Implementations report faults as [`Error::Store`] (or [`Error::Decode`] for
//! a stored document of the wrong shape). "No such document" is not an error at
//! this layer: lookups return `None`, and writes return how many documents they
//! touched, leaving the NOT_FOUND decision to the handler.

pub mod mongo;

#[cfg(test)]
pub mod memory;

use blog_tonic_core::{
    Error,
    types::{BlogId, BlogPost, NewBlogPost},
};
use core::pin::Pin;
use futures::Stream;

/// Incremental view over the whole collection.
///
/// Dropping the cursor releases it on the store side.
pub type BlogCursor = Pin<Box<dyn Stream<Item = Result<BlogPost, Error>> + Send>>;

#[tonic::async_trait]
pub trait BlogStore: Send + Sync + 'static {
    /// Inserts a new document and returns the id the store assigned.
    async fn insert(&self, post: NewBlogPost) -> Result<BlogId, Error>;

    async fn find(&self, id: BlogId) -> Result<Option<BlogPost>, Error>;

    /// Replaces the document with `post.id`; returns the matched count.
    async fn replace(&self, post: &BlogPost) -> Result<u64, Error>;

    /// Deletes the document with `id`; returns the deleted count.
    async fn delete(&self, id: BlogId) -> Result<u64, Error>;

    /// Opens a cursor over every document, in store order.
    async fn list(&self) -> Result<BlogCursor, Error>;
}
