//! MongoDB-backed [`BlogStore`].
//!
//! One [`mongodb::Client`] is created at startup and shared by every call; the
//! driver pools connections internally and is safe for concurrent use.

use super::{BlogCursor, BlogStore};
use crate::server::config::ServerConfig;
use anyhow::Context;
use blog_tonic_core::{
    Error,
    types::{BlogId, BlogPost, NewBlogPost},
};
use futures::StreamExt;
use mongodb::{
    Client, Collection,
    bson::{doc, oid::ObjectId},
    error::ErrorKind,
    options::ClientOptions,
};
use serde::{Deserialize, Serialize};

/// On-disk shape of a blog.
#[derive(Debug, Serialize, Deserialize)]
struct BlogDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    author_id: String,
    title: String,
    content: String,
}

impl From<NewBlogPost> for BlogDocument {
    fn from(post: NewBlogPost) -> Self {
        Self {
            id: None,
            author_id: post.author_id,
            title: post.title,
            content: post.content,
        }
    }
}

impl From<&BlogPost> for BlogDocument {
    fn from(post: &BlogPost) -> Self {
        Self {
            id: Some(post.id.as_object_id()),
            author_id: post.author_id.clone(),
            title: post.title.clone(),
            content: post.content.clone(),
        }
    }
}

impl TryFrom<BlogDocument> for BlogPost {
    type Error = Error;

    fn try_from(doc: BlogDocument) -> Result<Self, Self::Error> {
        let id = doc
            .id
            .ok_or_else(|| Error::decode("document has no `_id`"))?;
        Ok(Self {
            id: BlogId::from_object_id(id),
            author_id: doc.author_id,
            title: doc.title,
            content: doc.content,
        })
    }
}

/// Deserialization faults are the document's fault, everything else is the
/// store's.
fn classify(err: mongodb::error::Error) -> Error {
    if let ErrorKind::BsonDeserialization(e) = err.kind.as_ref() {
        return Error::decode(e);
    }
    Error::store(err)
}

#[derive(Clone, Debug)]
pub struct MongoStore {
    client: Client,
    collection: Collection<BlogDocument>,
}

impl MongoStore {
    /// Connects to the deployment named by `config.mongo_uri` and verifies it
    /// with a `ping`.
    ///
    /// # Errors
    ///
    /// Fails if the URI is invalid or no server answers the ping within the
    /// connect timeout. Both are fatal at startup.
    pub async fn connect(config: &ServerConfig) -> anyhow::Result<Self> {
        let mut options = ClientOptions::parse(&config.mongo_uri)
            .await
            .context("invalid MONGO_URI")?;
        options.app_name = Some(env!("CARGO_PKG_NAME").to_string());
        options.connect_timeout = Some(config.connect_timeout);
        options.server_selection_timeout = Some(config.connect_timeout);

        let client = Client::with_options(options).context("failed to build MongoDB client")?;

        tracing::info!("Pinging MongoDB");
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .context("MongoDB did not answer ping")?;
        tracing::info!("Connection to MongoDB successful");

        let collection = client
            .database(&config.database)
            .collection::<BlogDocument>(&config.collection);

        Ok(Self { client, collection })
    }

    /// Closes every pooled connection. Waits for outstanding cursors to be
    /// dropped first.
    pub async fn disconnect(&self) {
        tracing::info!("Disconnecting client from MongoDB");
        self.client.clone().shutdown().await;
    }
}

#[tonic::async_trait]
impl BlogStore for MongoStore {
    async fn insert(&self, post: NewBlogPost) -> Result<BlogId, Error> {
        let res = self
            .collection
            .insert_one(BlogDocument::from(post))
            .await
            .map_err(classify)?;

        res.inserted_id
            .as_object_id()
            .map(BlogId::from_object_id)
            .ok_or_else(|| Error::store(format!("inserted id {} is not an ObjectId", res.inserted_id)))
    }

    async fn find(&self, id: BlogId) -> Result<Option<BlogPost>, Error> {
        self.collection
            .find_one(doc! { "_id": id.as_object_id() })
            .await
            .map_err(classify)?
            .map(BlogPost::try_from)
            .transpose()
    }

    async fn replace(&self, post: &BlogPost) -> Result<u64, Error> {
        let res = self
            .collection
            .replace_one(doc! { "_id": post.id.as_object_id() }, BlogDocument::from(post))
            .await
            .map_err(classify)?;
        Ok(res.matched_count)
    }

    async fn delete(&self, id: BlogId) -> Result<u64, Error> {
        let res = self
            .collection
            .delete_one(doc! { "_id": id.as_object_id() })
            .await
            .map_err(classify)?;
        Ok(res.deleted_count)
    }

    async fn list(&self) -> Result<BlogCursor, Error> {
        let cursor = self.collection.find(doc! {}).await.map_err(classify)?;
        Ok(Box::pin(cursor.map(|res| {
            res.map_err(classify).and_then(BlogPost::try_from)
        })))
    }
}
