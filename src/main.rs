use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env before reading any configuration
    let _ = dotenvy::dotenv();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match voxlink::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Fatal: {}", e);
            ExitCode::FAILURE
        }
    }
}
