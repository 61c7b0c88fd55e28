const PROTO_DIR: &str = "proto";
const TRANSACTION_PROTO: &str = "transaction.proto";

fn main() {
    compile_protos();
}

fn compile_protos() {
    println!("cargo:rerun-if-changed={PROTO_DIR}/{TRANSACTION_PROTO}");

    // protox keeps the build free of a system protoc
    let file_descriptors = protox::compile([TRANSACTION_PROTO], [PROTO_DIR])
        .unwrap_or_else(|e| panic!("Failed to parse {TRANSACTION_PROTO}: {e}"));

    prost_build::Config::new()
        .compile_fds(file_descriptors)
        .unwrap_or_else(|e| panic!("Failed to generate transaction types: {e}"));
}
