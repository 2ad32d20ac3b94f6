mod supervisor;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use hearth_dhcp::{server, Config, DhcpConfig, UdpLink};
use supervisor::spawn_supervised;
use tracing::info;

fn load_config(path: &Path) -> Result<DhcpConfig> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    } else {
        info!("No config file at {}, using defaults", path.display());
        Ok(DhcpConfig::default())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let verbosity =
        std::env::var("HEARTHD_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&verbosity)
                .unwrap_or_else(|_| "info".parse().unwrap()),
        )
        .init();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/etc/hearth/dhcp.json"));

    let config: Arc<Config> = Arc::new(load_config(&path)?.resolve()?);
    if config.subnets.is_empty() {
        anyhow::bail!("no subnets configured in {}", path.display());
    }
    info!(
        "hearthd starting as '{}' with {} subnet(s)",
        config.hostname,
        config.subnets.len()
    );

    let mut tasks = Vec::new();
    for subnet in &config.subnets {
        let name = format!("dhcp-{}", subnet.interface.name);
        let config = Arc::clone(&config);
        let subnet = subnet.clone();
        tasks.push(spawn_supervised(name, move || {
            let config = Arc::clone(&config);
            let subnet = subnet.clone();
            async move {
                let link = UdpLink::bind(&subnet.interface.name)?;
                server::run_subnet(&config, subnet, link).await
            }
        }));
    }

    for task in tasks {
        task.await?;
    }
    Ok(())
}
