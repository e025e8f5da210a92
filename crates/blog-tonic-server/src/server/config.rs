use anyhow::bail;
use clap::Parser;
use core::time::Duration;

/// Runtime configuration for the `blog-tonic-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a `.env`
/// file is loaded first), with defaults that match a local MongoDB.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "blog-tonic-server",
    version,
    about = "A gRPC service for blog posts stored in MongoDB"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/blog-uds.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Connection string of the MongoDB deployment holding the blogs.
    ///
    /// Environment variable: `MONGO_URI`
    #[arg(long, env = "MONGO_URI", default_value_t = String::from("mongodb://localhost:27017"))]
    pub mongo_uri: String,

    /// Database holding the blog collection.
    ///
    /// Environment variable: `MONGO_DATABASE`
    #[arg(long, env = "MONGO_DATABASE", default_value_t = String::from("mydb"))]
    pub database: String,

    /// Collection holding one document per blog.
    ///
    /// Environment variable: `MONGO_COLLECTION`
    #[arg(long, env = "MONGO_COLLECTION", default_value_t = String::from("blog"))]
    pub collection: String,

    /// Seconds allowed for connecting to the store and selecting a server.
    ///
    /// Also bounds how long any single store operation waits for a usable
    /// server, so a dead store fails calls instead of hanging them.
    ///
    /// Environment variable: `CONNECT_TIMEOUT_SECS`
    #[arg(long, env = "CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    pub connect_timeout_secs: u64,

    /// Upper bound, in seconds, on any unary call. Clients may set a shorter
    /// deadline with `grpc-timeout`.
    ///
    /// Environment variable: `REQUEST_TIMEOUT_SECS`
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Capacity of the channel between the list cursor and the gRPC stream.
    ///
    /// Lower values apply backpressure to the cursor sooner; higher values let
    /// the cursor run further ahead of a slow client.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 8)]
    pub stream_buffer_size: usize,

    /// Seconds to wait for in-flight calls to finish on shutdown before they
    /// are aborted.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECS`
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 3)]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub mongo_uri: String,
    pub database: String,
    pub collection: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub stream_buffer_size: usize,
    pub shutdown_timeout: Duration,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if !(args.mongo_uri.starts_with("mongodb://") || args.mongo_uri.starts_with("mongodb+srv://"))
        {
            bail!("MONGO_URI must start with mongodb:// or mongodb+srv://");
        }

        if args.database.trim().is_empty() {
            bail!("MONGO_DATABASE must not be empty");
        }

        if args.collection.trim().is_empty() {
            bail!("MONGO_COLLECTION must not be empty");
        }

        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        if args.connect_timeout_secs == 0 {
            bail!("CONNECT_TIMEOUT_SECS must be greater than 0");
        }

        if args.request_timeout_secs == 0 {
            bail!("REQUEST_TIMEOUT_SECS must be greater than 0");
        }

        if args.shutdown_timeout_secs == 0 {
            bail!("SHUTDOWN_TIMEOUT_SECS must be greater than 0");
        }

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            mongo_uri: args.mongo_uri,
            database: args.database,
            collection: args.collection,
            connect_timeout: Duration::from_secs(args.connect_timeout_secs),
            request_timeout: Duration::from_secs(args.request_timeout_secs),
            stream_buffer_size: args.stream_buffer_size,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs),
        })
    }
}
