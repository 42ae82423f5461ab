use tracing::{debug, instrument};

use crate::browser::webdriver::WebDriverLauncher;
use crate::browser::{Driver, Resolver};
use crate::error::Result;
use crate::model::{RenderMode, StatTable};
use crate::render::Renderer;
use crate::store::StatStore;

/// URL of a player's career stats page.
pub fn career_url(player_id: u32) -> String {
    format!("https://stats.nba.com/player/{player_id}/career")
}

/// The main entry point: renders a player's career page and stores its
/// tables.
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> nba_scraper::Result<()> {
/// use nba_scraper::{NbaClient, RenderMode, StatStore};
///
/// let client = NbaClient::connect(StatStore::open("data.db")).await?;
/// let rows = client.scrape_player(2544, RenderMode::Both).await?;
/// println!("Stored {rows} rows");
/// # Ok(())
/// # }
/// ```
pub struct NbaClient<D = WebDriverLauncher> {
    renderer: Renderer<D>,
    store: StatStore,
}

impl NbaClient<WebDriverLauncher> {
    /// Pick the best installed browser and build a client around it.
    pub async fn connect(store: StatStore) -> Result<Self> {
        let mut resolver = Resolver::new(WebDriverLauncher::new());
        let capability = resolver.resolve().await?;
        Ok(Self::with_parts(
            Renderer::new(resolver.into_driver(), capability),
            store,
        ))
    }
}

impl<D: Driver> NbaClient<D> {
    pub fn with_parts(renderer: Renderer<D>, store: StatStore) -> Self {
        Self { renderer, store }
    }

    pub fn renderer(&self) -> &Renderer<D> {
        &self.renderer
    }

    pub fn store(&self) -> &StatStore {
        &self.store
    }

    /// Render a player's career tables without storing them.
    #[instrument(skip(self))]
    pub async fn player_tables(&self, player_id: u32, mode: RenderMode) -> Result<Vec<StatTable>> {
        self.renderer.render(&career_url(player_id), mode).await
    }

    /// Render a player's career tables and ingest each one with its
    /// playoffs flag. Returns the number of rows stored.
    #[instrument(skip(self))]
    pub async fn scrape_player(&self, player_id: u32, mode: RenderMode) -> Result<usize> {
        let tables = self.player_tables(player_id, mode).await?;

        let mut stored = 0;
        for (table, &playoffs) in tables.iter().zip(mode.playoff_flags()) {
            stored += self.store.ingest(table, player_id, playoffs).await?;
        }

        debug!(player_id, stored, "scraped player");
        Ok(stored)
    }
}
