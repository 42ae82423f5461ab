use std::env;

use tracing_subscriber::EnvFilter;

use nba_scraper::{NbaClient, RenderMode, StatStore, DEFAULT_DATABASE};

#[tokio::main]
async fn main() -> nba_scraper::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = env::args().skip(1);
    let player_id: u32 = args
        .next()
        .and_then(|id| id.parse().ok())
        .unwrap_or(2544);
    let mode: RenderMode = args
        .next()
        .and_then(|mode| mode.parse().ok())
        .unwrap_or_default();

    let client = NbaClient::connect(StatStore::open(DEFAULT_DATABASE)).await?;
    println!("Using {}", client.renderer().capability().browser());

    let stored = client.scrape_player(player_id, mode).await?;
    println!("Stored {stored} rows for player {player_id}");

    for row in client.store().rows(player_id).await? {
        println!("{}", serde_json::to_string(&row).unwrap_or_default());
    }
    Ok(())
}
