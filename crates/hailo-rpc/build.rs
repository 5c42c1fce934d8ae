fn main() -> Result<(), Box<dyn std::error::Error>> {
    let proto_root = "proto";
    let api_proto = format!("{proto_root}/deviceplugin/v1beta1/api.proto");

    // Tell Cargo to rerun if the proto file changes
    println!("cargo:rerun-if-changed={api_proto}");
    println!("cargo:rerun-if-env-changed=PROTOC");

    // Fall back to the vendored protoc so builds don't depend on a system install
    if std::env::var_os("PROTOC").is_none() {
        let protoc = protoc_bin_vendored::protoc_bin_path()?;
        // SAFETY: the build script is single-threaded and nothing else reads the environment yet.
        unsafe { std::env::set_var("PROTOC", protoc) };
    }

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&[&api_proto], &[proto_root])?;

    Ok(())
}
