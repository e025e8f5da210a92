#![doc = include_str!("../README.md")]

mod common;
pub use common::*;
// Public re-export so downstream crates build `ObjectId` filters against the
// same `bson` version as `blog_tonic_core::types`.
pub use bson;
