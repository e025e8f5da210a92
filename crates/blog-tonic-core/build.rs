/// Builds the gRPC client and server code for `proto/blog.proto` using
/// `tonic-prost-build`.
///
/// Besides the message types and the `BlogService` client/server bindings, a
/// serialized file descriptor set is written to `OUT_DIR` so the server can
/// expose gRPC reflection.
///
/// Generated code is accessible via:
///
/// ```rust
/// pub mod blog {
///     tonic::include_proto!("blog");
/// }
/// ```
///
/// # Panics
///
/// Panics if code generation fails (for example when `protoc` is missing).
use std::env;
use std::path::PathBuf;

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("blog_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();
    config.file_descriptor_set_path(&descriptor_path);

    println!("cargo:rerun-if-changed=proto/blog.proto");

    tonic_prost_build::configure()
        .compile_with_config(config, &["proto/blog.proto"], &["proto"])
        .unwrap();
}
