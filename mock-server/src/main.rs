use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let line_port = std::env::var("LINE_PORT").unwrap_or_else(|_| "19534".to_string());
    let addr = format!("127.0.0.1:{port}");
    let line_addr = format!("127.0.0.1:{line_port}");

    let listener = TcpListener::bind(&addr).await?;
    let line_listener = TcpListener::bind(&line_addr).await?;
    log::info!("http on {addr}, line protocol on {line_addr}");

    tokio::try_join!(mock_server::run(listener), mock_server::run_line(line_listener))?;
    Ok(())
}
