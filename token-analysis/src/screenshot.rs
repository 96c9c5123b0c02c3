use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use fantoccini::{Client, ClientBuilder, Locator};
use tokio::process::Command;
use tokio::sync::{Mutex, MutexGuard};

use bubblebot_common::chains::ChainEntry;
use bubblebot_common::utils::bubblemaps;

const DEFAULT_PORTS: std::ops::Range<u16> = 4444..4448;

/// The map is animated after load; give it time to settle before capturing.
const RENDER_SETTLE: Duration = Duration::from_secs(4);

/// Bounded pool of WebDriver ports. Each capture spawns its own geckodriver
/// on a free port and kills it when done, so a hung browser never outlives
/// one request.
pub struct ScreenshotPool {
    ports: Vec<(u16, Arc<Mutex<()>>)>,
}

impl ScreenshotPool {
    pub fn from_env() -> Self {
        let ports: Vec<u16> = std::env::var("WEBDRIVER_PORTS")
            .ok()
            .map(|list| {
                list.split(',')
                    .filter_map(|port| port.trim().parse().ok())
                    .collect()
            })
            .filter(|ports: &Vec<u16>| !ports.is_empty())
            .unwrap_or_else(|| DEFAULT_PORTS.collect());
        log::info!("Screenshot worker ports: {ports:?}");
        Self {
            ports: ports
                .into_iter()
                .map(|port| (port, Arc::new(Mutex::new(()))))
                .collect(),
        }
    }

    /// Captures the Bubblemaps page for a token as PNG bytes.
    pub async fn capture(
        &self,
        chain: &ChainEntry,
        address: &str,
    ) -> Result<Vec<u8>, anyhow::Error> {
        let mut acquired: Option<(u16, MutexGuard<()>)> = None;
        for (port, lock) in &self.ports {
            if let Ok(guard) = lock.try_lock() {
                acquired = Some((*port, guard));
                break;
            }
        }
        let (port, _guard) = match acquired {
            Some(acquired) => acquired,
            None => {
                // All workers busy, queue behind one of them.
                let mut hasher = DefaultHasher::new();
                address.hash(&mut hasher);
                let (port, lock) =
                    &self.ports[(hasher.finish() % self.ports.len() as u64) as usize];
                (*port, lock.lock().await)
            }
        };

        let mut driver = Command::new("geckodriver")
            .arg(format!("--port={port}"))
            .arg("--log=fatal")
            .kill_on_drop(true)
            .spawn()?;
        let result = capture_on_port(port, chain, address).await;
        if let Err(err) = driver.kill().await {
            log::error!("Failed to kill geckodriver: {err:?}");
        }
        result
    }
}

async fn capture_on_port(
    port: u16,
    chain: &ChainEntry,
    address: &str,
) -> Result<Vec<u8>, anyhow::Error> {
    let mut connection_attempt = 0;
    let client = loop {
        let mut builder = ClientBuilder::rustls()
            .map_err(|err| anyhow::anyhow!("Rustls initialization failed: {err:?}"))?;
        builder.capabilities({
            let mut capabilities = serde_json::map::Map::new();
            let options = serde_json::json!({
                "args": ["--headless", "--width=1200", "--height=800"]
            });
            capabilities.insert("moz:firefoxOptions".to_string(), options);
            capabilities
        });
        match builder.connect(&format!("http://localhost:{port}")).await {
            Ok(client) => break client,
            Err(err) => {
                if connection_attempt >= 50 {
                    anyhow::bail!("Failed to connect to geckodriver on port {port}: {err:?}");
                }
                connection_attempt += 1;
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    };

    let url = bubblemaps::map_page_url(chain, address);
    let result = screenshot_page(&client, &url).await;
    if let Err(err) = client.close().await {
        log::error!("Failed to close browser session: {err:?}");
    }
    result
}

async fn screenshot_page(client: &Client, url: &str) -> Result<Vec<u8>, anyhow::Error> {
    client.goto(url).await?;
    // The map svg may never appear for broken tokens; capture whatever the
    // page shows in that case.
    let _ = client
        .wait()
        .at_most(Duration::from_secs(15))
        .for_element(Locator::Css("svg"))
        .await;
    tokio::time::sleep(RENDER_SETTLE).await;
    Ok(client.screenshot().await?)
}
