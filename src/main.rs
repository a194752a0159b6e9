use douyin_resolver::config::Config;
use douyin_resolver::logger::init_logger;
use douyin_resolver::server::{serve, App};
use std::io;
use std::net::TcpListener;
use std::sync::Arc;
use tracing::info;

fn main() -> io::Result<()> {
    // a missing .env is fine; the real environment still applies
    let _ = dotenvy::dotenv();
    init_logger();

    let config = Config::from_env();
    let listener = TcpListener::bind(config.addr())?;
    info!(addr = %config.addr(), "douyin resolver listening");
    if !config.transcribe_enabled() {
        info!("VOLC_APP_ID / VOLC_ACCESS_TOKEN not set, transcription disabled");
    }
    if !config.summarize_enabled() {
        info!("ARK_API_KEY not set, transcript summarization disabled");
    }

    let app = Arc::new(App::new(&config));
    serve(listener, app, config.workers)
}
