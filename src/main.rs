use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match plate_reader_lib::run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
