//! In-memory [`BlogStore`] used by the tests.
//!
//! Besides plain storage it can inject faults (every operation failing, a
//! corrupt document in the listing, a cursor that stalls, a record deleted
//! under an update) and it counts store
//! accesses and open cursors so tests can check what a handler did or did not
//! touch.

use super::{BlogCursor, BlogStore};
use blog_tonic_core::{
    Error,
    types::{BlogId, BlogPost, NewBlogPost},
};
use core::{
    pin::Pin,
    task::{Context, Poll},
};
use futures::Stream;
use parking_lot::Mutex;
use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

#[derive(Default)]
pub struct MemoryStore {
    // Insertion order doubles as the "natural" store order.
    posts: Mutex<Vec<BlogPost>>,
    corrupt: Mutex<HashSet<BlogId>>,
    failure: Mutex<Option<Error>>,
    stall_after: Mutex<Option<usize>>,
    vanish_before_replace: Mutex<bool>,
    accesses: AtomicUsize,
    open_cursors: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following operation fail with `err` (or succeed again with
    /// `None`).
    pub fn fail_with(&self, err: Option<Error>) {
        *self.failure.lock() = err;
    }

    /// Makes the listing yield a decode fault in place of `id`.
    pub fn corrupt(&self, id: BlogId) {
        self.corrupt.lock().insert(id);
    }

    /// Makes cursors stop producing (without finishing) after `n` items.
    pub fn stall_after(&self, n: usize) {
        *self.stall_after.lock() = Some(n);
    }

    /// Makes the next `replace` find its target already deleted, as if a
    /// concurrent delete landed between an update's lookup and its write.
    pub fn vanish_before_replace(&self) {
        *self.vanish_before_replace.lock() = true;
    }

    /// Number of operations that reached the store.
    pub fn accesses(&self) -> usize {
        self.accesses.load(Ordering::SeqCst)
    }

    /// Number of cursors handed out and not yet dropped.
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Vec<BlogPost> {
        self.posts.lock().clone()
    }

    fn access(&self) -> Result<(), Error> {
        self.accesses.fetch_add(1, Ordering::SeqCst);
        match self.failure.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[tonic::async_trait]
impl BlogStore for MemoryStore {
    async fn insert(&self, post: NewBlogPost) -> Result<BlogId, Error> {
        self.access()?;
        let id = BlogId::new();
        self.posts.lock().push(post.with_id(id));
        Ok(id)
    }

    async fn find(&self, id: BlogId) -> Result<Option<BlogPost>, Error> {
        self.access()?;
        Ok(self.posts.lock().iter().find(|p| p.id == id).cloned())
    }

    async fn replace(&self, post: &BlogPost) -> Result<u64, Error> {
        self.access()?;
        let mut posts = self.posts.lock();
        if core::mem::take(&mut *self.vanish_before_replace.lock()) {
            posts.retain(|p| p.id != post.id);
        }
        match posts.iter_mut().find(|p| p.id == post.id) {
            Some(slot) => {
                *slot = post.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete(&self, id: BlogId) -> Result<u64, Error> {
        self.access()?;
        let mut posts = self.posts.lock();
        let before = posts.len();
        posts.retain(|p| p.id != id);
        Ok((before - posts.len()) as u64)
    }

    async fn list(&self) -> Result<BlogCursor, Error> {
        self.access()?;
        let corrupt = self.corrupt.lock().clone();
        let items: Vec<_> = self
            .posts
            .lock()
            .iter()
            .map(|p| {
                if corrupt.contains(&p.id) {
                    Err(Error::decode(format!("document {} is corrupt", p.id)))
                } else {
                    Ok(p.clone())
                }
            })
            .collect();

        self.open_cursors.fetch_add(1, Ordering::SeqCst);
        Ok(Box::pin(MemoryCursor {
            items: items.into_iter(),
            remaining_before_stall: *self.stall_after.lock(),
            open_cursors: Arc::clone(&self.open_cursors),
        }))
    }
}

struct MemoryCursor {
    items: std::vec::IntoIter<Result<BlogPost, Error>>,
    remaining_before_stall: Option<usize>,
    open_cursors: Arc<AtomicUsize>,
}

impl Stream for MemoryCursor {
    type Item = Result<BlogPost, Error>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match &mut this.remaining_before_stall {
            // Never woken: the consumer is expected to give up on its own.
            Some(0) => Poll::Pending,
            Some(n) => {
                *n -= 1;
                Poll::Ready(this.items.next())
            }
            None => Poll::Ready(this.items.next()),
        }
    }
}

impl Drop for MemoryCursor {
    fn drop(&mut self) {
        self.open_cursors.fetch_sub(1, Ordering::SeqCst);
    }
}
