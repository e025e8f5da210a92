//! Drives the service over a real HTTP/2 connection.

use crate::server::{
    config::{CliArgs, ServerConfig},
    service::handler::BlogHandler,
    store::memory::MemoryStore,
};
use blog_tonic_core::proto::{
    Blog, CreateBlogRequest, DeleteBlogRequest, ListBlogRequest, ReadBlogRequest,
    UpdateBlogRequest, blog_service_client::BlogServiceClient,
    blog_service_server::BlogServiceServer,
};
use clap::Parser;
use std::sync::Arc;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tokio_stream::{StreamExt, wrappers::TcpListenerStream};
use tonic::{Code, transport::Channel};

struct TestServer {
    client: BlogServiceClient<Channel>,
    handler: BlogHandler<MemoryStore>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<Result<(), tonic::transport::Error>>,
}

async fn start() -> TestServer {
    let args = CliArgs::try_parse_from(["blog-tonic-server", "--shutdown-timeout-secs", "1"])
        .unwrap();
    let config = ServerConfig::try_from(args).unwrap();
    let handler = BlogHandler::new(Arc::new(MemoryStore::new()), &config);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();

    let service = handler.clone();
    let task = tokio::spawn(
        tonic::transport::Server::builder()
            .add_service(BlogServiceServer::new(handler.clone()))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                let _ = stopped.await;
                service.shutdown().await;
            }),
    );

    let client = BlogServiceClient::connect(format!("http://{addr}"))
        .await
        .unwrap();

    TestServer {
        client,
        handler,
        stop,
        task,
    }
}

fn blog(id: &str, author_id: &str, title: &str, content: &str) -> Blog {
    Blog {
        id: id.into(),
        author_id: author_id.into(),
        title: title.into(),
        content: content.into(),
    }
}

#[tokio::test]
async fn crud_walkthrough_over_the_wire() {
    let TestServer {
        mut client,
        handler,
        stop,
        task,
    } = start().await;

    let created = client
        .create_blog(CreateBlogRequest {
            blog: Some(blog("", "a1", "T", "C")),
        })
        .await
        .unwrap()
        .into_inner()
        .blog
        .unwrap();
    let id = created.id.clone();
    assert_eq!(id.len(), 24);

    let read = client
        .read_blog(ReadBlogRequest {
            blog_id: id.clone(),
        })
        .await
        .unwrap()
        .into_inner()
        .blog
        .unwrap();
    assert_eq!(read, blog(&id, "a1", "T", "C"));

    let updated = client
        .update_blog(UpdateBlogRequest {
            blog: Some(blog(&id, "a2", "T2", "C2")),
        })
        .await
        .unwrap()
        .into_inner()
        .blog
        .unwrap();
    assert_eq!(updated, blog(&id, "a2", "T2", "C2"));

    let listed: Vec<_> = client
        .list_blog(ListBlogRequest {})
        .await
        .unwrap()
        .into_inner()
        .map(|item| item.unwrap().blog.unwrap())
        .collect()
        .await;
    assert_eq!(listed, vec![updated]);

    let deleted = client
        .delete_blog(DeleteBlogRequest {
            blog_id: id.clone(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(deleted.blog_id, id);

    let status = client
        .read_blog(ReadBlogRequest { blog_id: id })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::NotFound);

    let status = client
        .read_blog(ReadBlogRequest {
            blog_id: "not-an-id".into(),
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    stop.send(()).unwrap();
    task.await.unwrap().unwrap();
    assert_eq!(handler.lifecycle().inflight(), 0);
}

#[tokio::test]
async fn list_streams_many_records_through_a_small_buffer() {
    let TestServer {
        mut client,
        stop,
        task,
        ..
    } = start().await;

    for i in 0..50 {
        client
            .create_blog(CreateBlogRequest {
                blog: Some(blog("", "author", &format!("post {i}"), "body")),
            })
            .await
            .unwrap();
    }

    let mut stream = client
        .list_blog(ListBlogRequest {})
        .await
        .unwrap()
        .into_inner();
    let mut count = 0;
    while let Some(item) = stream.next().await {
        item.unwrap();
        count += 1;
    }
    assert_eq!(count, 50);

    stop.send(()).unwrap();
    task.await.unwrap().unwrap();
}
