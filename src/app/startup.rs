//! Process startup and runtime lifecycle
//!
//! Containers are built from the configuration file against the in-process
//! broker, registered with the process-wide registry and started. The first
//! shutdown signal (or the end of `--run-for`) drains them; the final
//! statistics are printed as JSON.

use crate::app::args::Args;
use crate::app::config::{load_config, FileConfig};
use crate::broker::api::{BrokerError, InMemoryBroker, Message};
use crate::container::api::{
    BlockingTaskExecutor, ContainerDiagnostics, HandlerError, MessageContainer, MessageHandler,
};
use crate::core::error_handling::log_error_with_context;
use crate::core::logging::init_logging;
use crate::core::shutdown::ShutdownCoordinator;
use crate::registry::api::{container_manager, RegistryError};
use clap::Parser;
use colored::Colorize;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// Logs every message it is handed
struct LoggingHandler;

impl MessageHandler for LoggingHandler {
    fn on_message(&self, message: &Message) -> Result<(), HandlerError> {
        log::info!(
            "Received message {} on {}: {}",
            message.message_id(),
            message.header.destination,
            message.body
        );
        Ok(())
    }
}

fn log_broker_exception(destination: &str, error: &BrokerError) {
    log::warn!("Broker failure on {}: {}", destination, error);
}

/// Parse arguments, run until shutdown and report the exit status
pub fn startup() -> ExitCode {
    let args = Args::parse();
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("brokerpool")
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: could not start the runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };
    runtime.block_on(run(args))
}

async fn run(args: Args) -> ExitCode {
    let (mut file_config, config_path) = match load_config(args.config_file.as_deref()).await {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let logging = match file_config.logging_options(&args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = init_logging(&logging) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    log::info!("brokerpool {} starting", crate::long_version());
    match &config_path {
        Some(path) => log::info!("Configuration read from {}", path.display()),
        None => log::debug!("No configuration file found"),
    }
    if file_config.containers.is_empty() {
        log::warn!("No containers configured; running the demo queue");
        file_config.containers = FileConfig::demo().containers;
    }

    let broker = InMemoryBroker::new();
    let executor = Arc::new(BlockingTaskExecutor::current(file_config.executor_capacity()));
    log::debug!("Task executor sized for {} tasks", executor.capacity());

    if let Err(e) = register_containers(&file_config, &broker, &executor) {
        log_error_with_context(&e, "Building containers");
        return ExitCode::FAILURE;
    }

    let start = tokio::task::spawn_blocking(|| container_manager().start()).await;
    match start {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            log_error_with_context(&e, "Starting containers");
            shutdown_containers().await;
            return ExitCode::FAILURE;
        }
        Err(e) => {
            log::error!("FATAL: container start task failed: {}", e);
            return ExitCode::FAILURE;
        }
    }

    if let Some(count) = args.demo_messages {
        publish_demo_messages(&broker, count);
    }

    wait_for_shutdown(args.run_for()).await;

    let diagnostics = shutdown_containers().await;
    executor.close();
    print_statistics(&diagnostics, logging.color);
    log::info!("brokerpool stopped");
    ExitCode::SUCCESS
}

fn register_containers(
    config: &FileConfig,
    broker: &InMemoryBroker,
    executor: &Arc<BlockingTaskExecutor>,
) -> Result<(), RegistryError> {
    let manager = container_manager();
    for container_config in &config.containers {
        let container = MessageContainer::builder(
            container_config.clone(),
            Arc::new(broker.clone()),
            Arc::new(LoggingHandler),
            executor.clone(),
        )
        .exception_listener(Arc::new(log_broker_exception))
        .build()
        .map_err(|source| RegistryError::Container {
            destination: container_config.destination.clone(),
            source,
        })?;
        manager.register(container)?;
    }
    Ok(())
}

fn publish_demo_messages(broker: &InMemoryBroker, count: usize) {
    for destination in container_manager().destinations() {
        let Some(container) = container_manager().get(&destination) else {
            continue;
        };
        for n in 1..=count {
            broker.send(container.destination(), format!("demo message {}", n));
        }
        log::info!("Published {} demo message(s) to {}", count, destination);
    }
}

async fn wait_for_shutdown(run_for: Option<Duration>) {
    let (coordinator, mut shutdown_rx) = ShutdownCoordinator::new();
    coordinator.install_signal_handlers();

    let deadline = async {
        match run_for {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        _ = shutdown_rx.recv() => log::info!("Shutdown requested"),
        _ = deadline => log::info!("Run time elapsed"),
    }
}

/// Drain every container on a blocking thread; returns their final diagnostics
async fn shutdown_containers() -> Vec<ContainerDiagnostics> {
    let drained = tokio::task::spawn_blocking(|| {
        let manager = container_manager();
        let containers: Vec<MessageContainer> = manager
            .destinations()
            .iter()
            .filter_map(|destination| manager.get(destination))
            .collect();
        manager.shutdown();
        containers
            .iter()
            .map(MessageContainer::diagnostics)
            .collect::<Vec<_>>()
    })
    .await;
    drained.unwrap_or_else(|e| {
        log::error!("Container shutdown task failed: {}", e);
        Vec::new()
    })
}

fn print_statistics(diagnostics: &[ContainerDiagnostics], color: bool) {
    match serde_json::to_string_pretty(diagnostics) {
        Ok(json) if color => println!("{}\n{}", "Container statistics".bold(), json),
        Ok(json) => println!("Container statistics\n{}", json),
        Err(e) => log::error!("Could not render statistics: {}", e),
    }
}
