use mock_server::{Backend, DEFAULT_ANON_KEY};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt::init();
    let port = std::env::var("PORT").unwrap_or_else(|_| "54321".to_string());
    let anon_key = std::env::var("MOCK_ANON_KEY").unwrap_or_else(|_| DEFAULT_ANON_KEY.to_string());
    let mut backend = Backend::new(&anon_key);
    if std::env::var("MOCK_AUTOCONFIRM").is_ok_and(|v| v == "1" || v == "true") {
        backend = backend.with_autoconfirm();
    }
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "mock backend listening");
    mock_server::serve(listener, backend).await
}
