//! # Blog Domain Types
//!
//! Shared between the server, its stores and the client driver:
//!
//! - [`BlogId`] - a parsed, store-assigned `ObjectId`. The only way to build
//!   one from client input is [`str::parse`], so every id that reaches a store
//!   is well-formed.
//! - [`NewBlogPost`] - the three caller-supplied fields, before the store
//!   assigns an id.
//! - [`BlogPost`] - a stored record.
//!
//! The wire format of an id is its 24 character lowercase hex rendering.
//! Parsing accepts either case.

use crate::{Error, proto};
use bson::oid::ObjectId;
use core::{fmt, str::FromStr};

/// Length of an id rendered as hex.
pub const BLOG_ID_HEX_LEN: usize = 24;

/// Opaque identifier of a stored blog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlogId(ObjectId);

impl BlogId {
    /// Generates a fresh id the same way the store would.
    pub fn new() -> Self {
        Self(ObjectId::new())
    }

    pub const fn from_object_id(oid: ObjectId) -> Self {
        Self(oid)
    }

    pub const fn as_object_id(&self) -> ObjectId {
        self.0
    }
}

impl Default for BlogId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ObjectId> for BlogId {
    fn from(oid: ObjectId) -> Self {
        Self(oid)
    }
}

impl FromStr for BlogId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != BLOG_ID_HEX_LEN {
            return Err(Error::InvalidId {
                id: s.to_string(),
                reason: format!("expected {BLOG_ID_HEX_LEN} hex characters, got {}", s.len()),
            });
        }
        ObjectId::parse_str(s).map(Self).map_err(|e| Error::InvalidId {
            id: s.to_string(),
            reason: e.to_string(),
        })
    }
}

impl fmt::Display for BlogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_hex())
    }
}

/// Caller-supplied fields of a blog that has not been stored yet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewBlogPost {
    pub author_id: String,
    pub title: String,
    pub content: String,
}

impl NewBlogPost {
    /// Attaches the id the store assigned.
    pub fn with_id(self, id: BlogId) -> BlogPost {
        BlogPost {
            id,
            author_id: self.author_id,
            title: self.title,
            content: self.content,
        }
    }
}

/// A stored blog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlogPost {
    pub id: BlogId,
    pub author_id: String,
    pub title: String,
    pub content: String,
}

/// Drops the wire `id`; create requests never choose their own.
impl From<proto::Blog> for NewBlogPost {
    fn from(blog: proto::Blog) -> Self {
        Self {
            author_id: blog.author_id,
            title: blog.title,
            content: blog.content,
        }
    }
}

impl TryFrom<proto::Blog> for BlogPost {
    type Error = Error;

    fn try_from(blog: proto::Blog) -> Result<Self, Self::Error> {
        let id = blog.id.parse()?;
        Ok(NewBlogPost::from(blog).with_id(id))
    }
}

impl From<BlogPost> for proto::Blog {
    fn from(post: BlogPost) -> Self {
        Self {
            id: post.id.to_string(),
            author_id: post.author_id,
            title: post.title,
            content: post.content,
        }
    }
}
