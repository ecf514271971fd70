use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use gridbatch::config::ControlConfig;
use gridbatch::control::ControlPlane;
use gridbatch::partition::FixedSizePartitioner;
use gridbatch::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "gridbatch")]
#[command(version)]
#[command(about = "Control plane for a distributed map/reduce batch cluster")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the control plane
    Server(ServerArgs),
}

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Port for the read-only status dashboard (disabled when omitted)
    #[arg(long)]
    dashboard_port: Option<u16>,

    /// Seconds between executor heartbeat sweeps
    #[arg(long, default_value = "10")]
    heartbeat_interval_secs: u64,

    /// Heartbeat age in seconds before an executor is considered offline
    #[arg(long, default_value = "30")]
    executor_timeout_secs: u64,

    /// Seconds an offline executor is retained before deregistration
    #[arg(long, default_value = "60")]
    offline_retention_secs: u64,

    /// Seconds between scheduling passes
    #[arg(long, default_value = "2")]
    scheduling_interval_secs: u64,

    /// Seconds before an in-flight task is reassigned (also the sweep cadence)
    #[arg(long, default_value = "300")]
    task_timeout_secs: u64,

    /// Seconds between job progress checks
    #[arg(long, default_value = "5")]
    progress_interval_secs: u64,

    /// Admission ceiling on concurrently active jobs
    #[arg(long, default_value = "10")]
    max_jobs: usize,

    /// Reassignment attempts before a task is failed for good
    #[arg(long, default_value = "3")]
    max_retries: u32,

    /// Target partition size in MB for deriving map-task counts
    #[arg(long, default_value = "64")]
    partition_size_mb: u64,
}

impl ServerArgs {
    fn to_config(&self) -> ControlConfig {
        let mut config = ControlConfig {
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            executor_timeout: Duration::from_secs(self.executor_timeout_secs),
            offline_retention: Duration::from_secs(self.offline_retention_secs),
            scheduling_interval: Duration::from_secs(self.scheduling_interval_secs),
            task_timeout: Duration::from_secs(self.task_timeout_secs),
            progress_interval: Duration::from_secs(self.progress_interval_secs),
            max_concurrent_jobs: self.max_jobs,
            max_task_retries: self.max_retries,
            partition_size_mb: self.partition_size_mb,
            ..Default::default()
        };
        if let Some(port) = self.dashboard_port {
            let addr: SocketAddr = ([0, 0, 0, 0], port).into();
            config = config.with_dashboard_addr(addr);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    match args.command {
        Commands::Server(server_args) => {
            let config = server_args.to_config();
            config.validate()?;

            let partitioner = Arc::new(FixedSizePartitioner::new(config.partition_size_mb));
            let control = Arc::new(ControlPlane::new(config, partitioner));

            let shutdown = install_shutdown_handler();
            tracing::info!("Control plane starting");
            control.run(shutdown).await;
        }
    }
    Ok(())
}
