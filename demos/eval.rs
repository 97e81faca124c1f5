//! Send one expression to an evaluation service and print the reply.
//!
//! Usage:
//!
//! ```text
//! cargo run --example eval -- ws://127.0.0.1:8080 "1 + 1"
//! ```

use anyhow::Result;
use playground_client::Session;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let endpoint = args
        .next()
        .unwrap_or_else(|| "ws://127.0.0.1:8080".to_string());
    let source = args.next().unwrap_or_else(|| "1 + 1".to_string());

    let session = Session::builder().endpoint(&endpoint).open()?;
    session.wait_connected().await?;

    let reply = session.eval(source).await?;
    println!("{reply}");

    session.close();
    Ok(())
}
