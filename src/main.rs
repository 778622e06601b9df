use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use sots_input_router::config::InputRouterConfig;
use sots_input_router::console;
use sots_input_router::handler::drain_intents;
use sots_input_router::layer::InputLayerRegistry;
use sots_input_router::router::backend::RecordingBackend;
use sots_input_router::router::InputRouter;
use sots_input_router::script::{self, Script};
use sots_input_router::GameplayTag;
use std::path::{Path, PathBuf};
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(about = "Layered input router playground", version)]
struct Args {
    /// Router config; defaults to the user config directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Push layers and print the router state
    Dump {
        /// Layer tags to push; all registered layers if empty
        #[arg(long = "push")]
        layers: Vec<String>,
    },
    /// Run a TOML input script against an in-memory backend
    Replay { script: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;
    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => InputRouterConfig::default_path()?,
    };
    let config = InputRouterConfig::load_or_default(&config_path)?;

    match args.command {
        Command::Dump { layers } => run_dump(&config, layers).await,
        Command::Replay { script } => run_replay(&config, &script).await,
    }
}

fn build_router(config: &InputRouterConfig) -> (InputRouter, InputLayerRegistry) {
    let mut router = InputRouter::from_config(config).with_backend(RecordingBackend::new(1));
    router.initialize_router();
    let registry = InputLayerRegistry::from_settings(&config.registry);
    (router, registry)
}

async fn run_dump(config: &InputRouterConfig, layers: Vec<String>) -> Result<()> {
    let (mut router, mut registry) = build_router(config);

    let tags: Vec<GameplayTag> = if layers.is_empty() {
        registry.registered_tags()
    } else {
        layers.into_iter().map(GameplayTag::new).collect()
    };

    // first pass queues async loads, second pushes what landed
    for tag in &tags {
        router.push_layer_by_tag(&mut registry, tag);
    }
    if registry.is_async_loads_enabled() {
        registry.wait_for_pending().await;
        let missing: Vec<&GameplayTag> = tags.iter().filter(|tag| !router.is_layer_active(tag)).collect();
        for tag in missing {
            router.push_layer_by_tag(&mut registry, tag);
        }
    }

    for line in console::dump_lines(&router) {
        println!("{}", line);
    }
    Ok(())
}

async fn run_replay(config: &InputRouterConfig, path: &Path) -> Result<()> {
    let script = Script::from_file(path)?;
    if script.steps.is_empty() {
        return Err(eyre!("Script {:?} has no steps", path));
    }
    info!("Replaying {} steps from {:?}", script.steps.len(), path);

    let (mut router, mut registry) = build_router(config);

    let intents = router.subscribe_intents();
    let intent_printer = tokio::spawn(drain_intents(intents, |intent| {
        println!(
            "Intent {} ({}) value={:?}",
            intent.intent_tag, intent.trigger_event, intent.value
        );
    }));

    let mut devices = router.subscribe_device_changes();
    let device_logger = tokio::spawn(async move {
        while devices.changed().await.is_ok() {
            let device = *devices.borrow_and_update();
            info!("Active input device: {}", device);
        }
    });

    let output = script::run_script(&mut router, &mut registry, &script).await;
    for line in output {
        println!("{}", line);
    }

    // closing the router closes both channels
    drop(router);
    let intent_count = intent_printer.await?;
    device_logger.await?;
    debug!("Replay finished, {} intents", intent_count);
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
