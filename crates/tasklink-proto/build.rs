// ABOUTME: Build script for generating Rust code from tasklink.proto.
// ABOUTME: Uses tonic-build to compile protobuf definitions into Rust types.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Server stubs are generated too so tests can run an in-process coordinator
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto-src/tasklink.proto"], &["proto-src"])?;

    println!("cargo:rerun-if-changed=proto-src/tasklink.proto");

    Ok(())
}
