pub mod error;
pub mod types;

pub use error::{Error, Result};

/// gRPC service and message definitions generated from `proto/blog.proto`.
///
/// ## Service
///
/// - `BlogService` - create, read, update and delete single blogs, and stream
///   the whole collection with `ListBlog`.
///
/// ## Messages
///
/// Every response wraps a [`proto::Blog`], whose `id` is the lowercase 24
/// character hex rendering of the store `ObjectId`.
pub mod proto {
    tonic::include_proto!("blog");

    /// Encoded file descriptor set, registered with the reflection service.
    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("blog_descriptor");
}
