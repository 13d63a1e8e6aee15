//! Logs in with credentials from the environment, prints account data and
//! follows the keep-alive stream for a few seconds.
//!
//! ```sh
//! XAPI_USER_ID=10000 XAPI_PASSWORD=secret cargo run --example stream_demo
//! ```

use std::time::Duration;

use anyhow::Context;
use xapi_client::logging::{init_logging, LogConfig};
use xapi_client::{Client, ClientConfig, Credentials, TradingMode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging(&LogConfig::development());

    let credentials = Credentials::new(
        std::env::var("XAPI_USER_ID").context("XAPI_USER_ID is not set")?,
        std::env::var("XAPI_PASSWORD").context("XAPI_PASSWORD is not set")?,
    )
    .with_app_name("xapi-rs demo");

    let client = Client::connect(ClientConfig::new(TradingMode::Demo), credentials).await?;
    println!("stream session: {:?}", client.stream_session_id().await);

    let user_data = client.get_current_user_data().await?;
    println!("account: {user_data:?}");

    let (mut keep_alive, subscription) = client.subscribe_keep_alive().await?;
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        println!("unsubscribe");
        subscription.unsubscribe();
    });

    while let Some(tick) = keep_alive.recv().await {
        println!("stream: {tick:?}");
    }

    client.logout().await?;
    client.close().await;
    Ok(())
}
