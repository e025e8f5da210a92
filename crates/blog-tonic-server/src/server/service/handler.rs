//! gRPC service implementation for blog CRUD.
//!
//! This module defines [`BlogHandler`], the concrete implementation of the
//! [`BlogService`] gRPC service. Every unary call performs exactly one logical
//! store operation (update performs a lookup and a replace) and maps its
//! outcome to a response or a status; `ListBlog` streams the collection from a
//! background task.
//!
//! ## Responsibilities
//!
//! - Parse and validate blog ids before any store access.
//! - Translate store outcomes into `NOT_FOUND`, `INTERNAL`, and friends.
//! - Admit calls through the [`ServiceLifecycle`] so shutdown can drain them.
//! - Emit logs and metrics per operation.

use crate::server::{
    config::ServerConfig,
    lifecycle::ServiceLifecycle,
    store::BlogStore,
    streaming::list::forward_blogs,
    telemetry::{
        decrement_streams_inflight, increment_errors, increment_requests,
        increment_streams_inflight, record_stream_duration,
    },
};
use blog_tonic_core::{
    Error,
    proto::{
        CreateBlogRequest, CreateBlogResponse, DeleteBlogRequest, DeleteBlogResponse,
        ListBlogRequest, ListBlogResponse, ReadBlogRequest, ReadBlogResponse, UpdateBlogRequest,
        UpdateBlogResponse, blog_service_server::BlogService,
    },
    types::{BlogId, BlogPost, NewBlogPost},
};
use core::{future::Future, pin::Pin};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tonic::{Request, Response, Status};
use tracing::Instrument;

/// gRPC handler set for blog posts.
///
/// Cheap to clone: the store handle and the lifecycle are shared.
pub struct BlogHandler<S> {
    store: Arc<S>,
    lifecycle: ServiceLifecycle,
    stream_buffer_size: usize,
}

impl<S> Clone for BlogHandler<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            lifecycle: self.lifecycle.clone(),
            stream_buffer_size: self.stream_buffer_size,
        }
    }
}

impl<S: BlogStore> BlogHandler<S> {
    /// Creates a handler set over an already connected store.
    pub fn new(store: Arc<S>, config: &ServerConfig) -> Self {
        Self {
            store,
            lifecycle: ServiceLifecycle::new(config.shutdown_timeout),
            stream_buffer_size: config.stream_buffer_size,
        }
    }

    pub fn lifecycle(&self) -> &ServiceLifecycle {
        &self.lifecycle
    }

    /// Refuses new calls, drains in-flight ones and aborts stragglers.
    pub async fn shutdown(&self) {
        if !self.lifecycle.stop().await {
            tracing::warn!("Some calls were aborted during shutdown");
        }
    }

    /// Admits a unary call, runs `op` against the abort token and records the
    /// outcome.
    async fn call<T, F>(&self, operation: &'static str, op: F) -> Result<T, Status>
    where
        F: Future<Output = Result<T, Error>>,
    {
        increment_requests(operation);
        let result = match self.lifecycle.enter() {
            Ok(_guard) => self.lifecycle.run(op).await,
            Err(e) => Err(e),
        };
        result.map_err(|e| {
            increment_errors(operation);
            tracing::warn!(operation, error = %e, "Request failed");
            e.into()
        })
    }

    async fn read(&self, blog_id: &str) -> Result<BlogPost, Error> {
        let id: BlogId = blog_id.parse()?;
        self.store
            .find(id)
            .await?
            .ok_or_else(|| Error::NotFound { id: id.to_string() })
    }

    async fn update(&self, post: BlogPost) -> Result<BlogPost, Error> {
        // Existence check only; last write wins.
        if self.store.find(post.id).await?.is_none() {
            return Err(Error::NotFound {
                id: post.id.to_string(),
            });
        }
        match self.store.replace(&post).await? {
            // Deleted between the lookup and the replace.
            0 => Err(Error::NotFound {
                id: post.id.to_string(),
            }),
            _ => Ok(post),
        }
    }

    async fn delete(&self, blog_id: &str) -> Result<BlogId, Error> {
        let id: BlogId = blog_id.parse()?;
        match self.store.delete(id).await? {
            0 => Err(Error::NotFound { id: id.to_string() }),
            _ => Ok(id),
        }
    }
}

#[tonic::async_trait]
impl<S: BlogStore> BlogService for BlogHandler<S> {
    type ListBlogStream = Pin<Box<dyn Stream<Item = Result<ListBlogResponse, Status>> + Send>>;

    #[tracing::instrument(skip_all)]
    async fn create_blog(
        &self,
        req: Request<CreateBlogRequest>,
    ) -> Result<Response<CreateBlogResponse>, Status> {
        let post = NewBlogPost::from(req.into_inner().blog.unwrap_or_default());
        tracing::info!("Creating blog");

        let created = self
            .call("create", async {
                let id = self.store.insert(post.clone()).await?;
                Ok(post.with_id(id))
            })
            .await?;

        tracing::info!(id = %created.id, "Blog created");
        Ok(Response::new(CreateBlogResponse {
            blog: Some(created.into()),
        }))
    }

    #[tracing::instrument(skip_all, fields(id = %req.get_ref().blog_id))]
    async fn read_blog(
        &self,
        req: Request<ReadBlogRequest>,
    ) -> Result<Response<ReadBlogResponse>, Status> {
        let blog_id = req.into_inner().blog_id;
        tracing::info!("Reading blog");

        let post = self.call("read", self.read(&blog_id)).await?;

        Ok(Response::new(ReadBlogResponse {
            blog: Some(post.into()),
        }))
    }

    #[tracing::instrument(skip_all, fields(id = tracing::field::Empty))]
    async fn update_blog(
        &self,
        req: Request<UpdateBlogRequest>,
    ) -> Result<Response<UpdateBlogResponse>, Status> {
        let blog = req.into_inner().blog.unwrap_or_default();
        tracing::Span::current().record("id", blog.id.as_str());
        tracing::info!("Updating blog");

        let updated = self
            .call("update", async {
                let post = BlogPost::try_from(blog)?;
                self.update(post).await
            })
            .await?;

        tracing::info!("Successfully updated blog");
        Ok(Response::new(UpdateBlogResponse {
            blog: Some(updated.into()),
        }))
    }

    #[tracing::instrument(skip_all, fields(id = %req.get_ref().blog_id))]
    async fn delete_blog(
        &self,
        req: Request<DeleteBlogRequest>,
    ) -> Result<Response<DeleteBlogResponse>, Status> {
        let blog_id = req.into_inner().blog_id;
        tracing::info!("Deleting blog");

        let id = self.call("delete", self.delete(&blog_id)).await?;

        tracing::info!("Blog deleted");
        Ok(Response::new(DeleteBlogResponse {
            blog_id: id.to_string(),
        }))
    }

    /// Streams every stored blog.
    ///
    /// Opening the cursor happens inline, so a store fault at that point fails
    /// the call itself. Iteration runs on a spawned task that owns the cursor
    /// and a [`CallGuard`](crate::server::lifecycle::CallGuard), feeding a
    /// bounded channel of `stream_buffer_size` messages.
    #[tracing::instrument(skip_all)]
    async fn list_blog(
        &self,
        _req: Request<ListBlogRequest>,
    ) -> Result<Response<Self::ListBlogStream>, Status> {
        tracing::info!("Listing all blogs");
        increment_requests("list");

        let opened = match self.lifecycle.enter() {
            Ok(guard) => self
                .lifecycle
                .run(self.store.list())
                .await
                .map(|cursor| (guard, cursor)),
            Err(e) => Err(e),
        };
        let (guard, cursor) = opened.map_err(|e| {
            increment_errors("list");
            tracing::warn!(error = %e, "Failed to open cursor");
            Status::from(e)
        })?;

        let start = std::time::Instant::now();
        let (resp_tx, resp_rx) =
            mpsc::channel::<Result<ListBlogResponse, Status>>(self.stream_buffer_size);
        let abort = self.lifecycle.abort_token();

        increment_streams_inflight();
        let fut = async move {
            let _guard = guard;
            match forward_blogs(cursor, resp_tx, abort).await {
                Ok(sent) => tracing::info!(sent, "Finished listing blogs"),
                Err(e) => {
                    increment_errors("list");
                    tracing::warn!(error = %e, "List stream ended early");
                }
            }
            decrement_streams_inflight();
            record_stream_duration(start.elapsed().as_millis() as f64);
        };
        tokio::spawn(fut.instrument(tracing::info_span!("streaming")));

        Ok(Response::new(Box::pin(ReceiverStream::new(resp_rx))))
    }
}
