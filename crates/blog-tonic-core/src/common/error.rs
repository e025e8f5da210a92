//! Error types for the blog service.
//!
//! This module defines the central `Error` enum, which captures every failure a
//! handler can report. It implements `From<Error>` for `tonic::Status` so
//! handlers can propagate with `?` and clients receive a status code and a
//! human readable message.
//!
//! ## Error Cases
//! - `InvalidId`: The supplied blog id is not a 24 character hex `ObjectId`.
//! - `NotFound`: No blog exists with the supplied id.
//! - `Store`: The document store failed (connection loss, timeout, write
//!   error).
//! - `Decode`: A stored document could not be turned into a blog.
//! - `ChannelError`: The response stream could not be fed, typically because
//!   the client went away mid-stream.
//! - `ServiceShutdown`: The call arrived, or was still running, while the
//!   service was shutting down.

use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the blog service.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The client sent an id that does not parse as an `ObjectId`.
    #[error("Invalid blog id {id:?}: {reason}")]
    InvalidId { id: String, reason: String },

    /// No document matched the id.
    #[error("Blog {id} not found")]
    NotFound { id: String },

    /// The document store reported a fault.
    #[error("Store error: {context}")]
    Store { context: String },

    /// A stored document is missing fields or has the wrong shape.
    #[error("Decode error: {context}")]
    Decode { context: String },

    /// The outbound stream channel is closed.
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl Error {
    /// Shorthand for a [`Error::Store`] built from any displayable fault.
    pub fn store(context: impl core::fmt::Display) -> Self {
        Self::Store {
            context: context.to_string(),
        }
    }

    /// Shorthand for a [`Error::Decode`] built from any displayable fault.
    pub fn decode(context: impl core::fmt::Display) -> Self {
        Self::Decode {
            context: context.to_string(),
        }
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidId { id, reason } => {
                Status::invalid_argument(format!("Cannot parse blog id {id:?}: {reason}"))
            }
            Error::NotFound { id } => Status::not_found(format!("Cannot find blog with id {id}")),
            Error::Store { context } => Status::internal(format!("Store error: {context}")),
            Error::Decode { context } => {
                Status::internal(format!("Error decoding blog: {context}"))
            }
            Error::ChannelError { context } => {
                Status::unknown(format!("Error sending data over the stream: {context}"))
            }
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}
