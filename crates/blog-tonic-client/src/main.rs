use blog_tonic_core::proto::{
    Blog, CreateBlogRequest, DeleteBlogRequest, ListBlogRequest, ReadBlogRequest,
    UpdateBlogRequest, blog_service_client::BlogServiceClient,
};
use clap::Parser;
use tokio_stream::StreamExt;
use tonic::{codec::CompressionEncoding, transport::Channel};

#[derive(Parser, Debug)]
#[command(
    name = "blog-tonic-client",
    version,
    about = "Exercises every blog service RPC once"
)]
struct CliArgs {
    /// Endpoint of the blog service.
    ///
    /// Environment variable: `BLOG_SERVER_URL`
    #[arg(long, env = "BLOG_SERVER_URL", default_value_t = String::from("http://127.0.0.1:50051"))]
    server_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();

    let channel = Channel::from_shared(args.server_url)?.connect().await?;
    let mut client = BlogServiceClient::new(channel)
        .send_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Zstd);

    println!("=== Creating the blog ===");
    let created = client
        .create_blog(CreateBlogRequest {
            blog: Some(Blog {
                id: String::new(),
                author_id: "Stephane".into(),
                title: "My First Blog".into(),
                content: "Content of the first blog".into(),
            }),
        })
        .await;
    let blog_id = match created {
        Ok(res) => {
            let blog = res.into_inner().blog.unwrap_or_default();
            println!("Blog has been created: {blog:?}");
            blog.id
        }
        Err(status) => {
            println!("Unexpected error: {status}");
            String::new()
        }
    };

    println!("=== Reading the blog ===");
    let missing = client
        .read_blog(ReadBlogRequest {
            blog_id: "5bdc29e661b75adcac496cf4".into(),
        })
        .await;
    match missing {
        Ok(res) => println!("Unexpectedly found: {:?}", res.into_inner().blog),
        Err(status) => println!("Error happened while reading: {status}"),
    }
    read(&mut client, &blog_id).await;

    println!("=== Updating the blog ===");
    let updated = client
        .update_blog(UpdateBlogRequest {
            blog: Some(Blog {
                id: blog_id.clone(),
                author_id: "Changed Author".into(),
                title: "My First Blog (edited)".into(),
                content: "Content of the first blog, with some awesome additions!".into(),
            }),
        })
        .await;
    match updated {
        Ok(res) => println!("Blog was updated: {:?}", res.into_inner().blog),
        Err(status) => println!("Error happened while updating: {status}"),
    }
    read(&mut client, &blog_id).await;

    println!("=== Deleting the blog ===");
    match client
        .delete_blog(DeleteBlogRequest {
            blog_id: blog_id.clone(),
        })
        .await
    {
        Ok(res) => println!("Blog was deleted: {}", res.into_inner().blog_id),
        Err(status) => println!("Error happened while deleting: {status}"),
    }

    println!("=== Listing the blogs ===");
    match client.list_blog(ListBlogRequest {}).await {
        Ok(res) => {
            let mut stream = res.into_inner();
            while let Some(item) = stream.next().await {
                match item {
                    Ok(msg) => println!("{:?}", msg.blog),
                    Err(status) => {
                        println!("Something happened: {status}");
                        break;
                    }
                }
            }
        }
        Err(status) => println!("Error happened while listing: {status}"),
    }

    Ok(())
}

async fn read(client: &mut BlogServiceClient<Channel>, blog_id: &str) {
    match client
        .read_blog(ReadBlogRequest {
            blog_id: blog_id.to_owned(),
        })
        .await
    {
        Ok(res) => println!("Blog was read: {:?}", res.into_inner().blog),
        Err(status) => println!("Error happened while reading: {status}"),
    }
}
