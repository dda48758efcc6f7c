use anyhow::{Result, anyhow};
use log::{Level, info};
use tokio::runtime::Builder;

use crate::aws::imds::ImdsClient;
use crate::config::Config;
use crate::host::LinuxHost;
use crate::logger::init_logger;
use crate::network::configure_network;

pub fn initialize() -> Result<()> {
    init_logger(Level::Info).map_err(|e| anyhow!("unable to initialize logger: {}", e))?;

    // Handle::block_on cannot drive IO on a current-thread runtime, so keep
    // one worker to run the netlink connection and the IMDS client.
    let rt = Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .map_err(|e| anyhow!("unable to start async runtime: {}", e))?;
    let _guard = rt.enter();

    let imds_client = ImdsClient::new(
        rt.handle().clone(),
        aws_config::imds::Client::builder().build(),
    );
    let host = LinuxHost::new(rt.handle().clone())?;

    let reports = configure_network(&host, &imds_client, &Config::default())?;
    for report in &reports {
        info!(
            "{}: {} via {}, {} aliases{}",
            report.name,
            report.primary,
            report.gateway,
            report.aliases.len(),
            if report.newly_configured {
                ", policy routing installed"
            } else {
                ""
            }
        );
    }
    Ok(())
}
