use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(*fn_config::LOG_FILTER))
        .with_target(false);
    if *fn_config::LOG_JSON {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    let app = fn_gate::app();
    let listener = TcpListener::bind(fn_config::GATE_ADDR.as_str()).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
