//! The main function of the Shelf command line client
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    shelf_lib::run().await
}
