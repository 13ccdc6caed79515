//! homefleet - Entry Point
//!
//! Provisions self-hosted services on a fleet of home servers over SSH and
//! keeps an eye on their health.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use tracing::{error, info};

use homefleet::app::options::AppOptions;
use homefleet::app::run::run;
use homefleet::app::state::AppState;
use homefleet::errors::FleetError;
use homefleet::fanout::sink::{ConsoleSink, ProgressSink};
use homefleet::filesys::file::File;
use homefleet::logs::{init_logging, LogOptions};
use homefleet::models::host::{HostId, Service};
use homefleet::storage::inventory::HostStore;
use homefleet::storage::layout::StorageLayout;
use homefleet::storage::settings::Settings;
use homefleet::utils::version_info;
use homefleet::validation::validate_hosts;
use homefleet::workers::refresh::RefreshInterval;

const USAGE: &str = "\
Usage: homefleet [--home=DIR] <command>

Commands:
  --init                                   write default settings
  --add-host --address=ADDR --user=USER --secret=SECRET [--service=NAME]
  --add-host --range=CIDR --user=USER --secret=SECRET [--service=NAME]
  --remove-host --id=ID
  --list                                   list hosts
  --validate                               check every host entry
  --deploy [--ids=1,2]                     deploy and wait for the summary
  --health [--export=FILE]                 refresh health once and print it
  --watch [--interval=30s]                 refresh health on a timer
  --serve                                  run the local control API
  --version";

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    if cli_args.contains_key("version") {
        let version = version_info();
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", version.version),
        }
        return;
    }

    if cli_args.is_empty() || cli_args.contains_key("help") {
        println!("{}", USAGE);
        return;
    }

    let layout = match cli_args.get("home") {
        Some(dir) => StorageLayout::new(dir),
        None => StorageLayout::default(),
    };

    // Retrieve the settings file
    let settings = match Settings::load(&layout.settings_file()).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level,
        json_format: settings.log_json,
        log_dir: settings
            .log_file
            .then(|| layout.logs_dir().path().to_path_buf()),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    if let Err(e) = dispatch(&cli_args, layout, settings).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn dispatch(
    cli_args: &HashMap<String, String>,
    layout: StorageLayout,
    settings: Settings,
) -> anyhow::Result<()> {
    if cli_args.contains_key("init") {
        return init(&layout, &settings).await;
    }
    if cli_args.contains_key("add-host") {
        return add_host(cli_args, &layout).await;
    }
    if cli_args.contains_key("remove-host") {
        return remove_host(cli_args, &layout).await;
    }
    if cli_args.contains_key("list") {
        return list(&layout).await;
    }
    if cli_args.contains_key("validate") {
        return validate(&layout).await;
    }

    let options = AppOptions::from_settings(layout, &settings);

    if cli_args.contains_key("deploy") {
        return deploy(cli_args, options).await;
    }
    if cli_args.contains_key("health") {
        return health(cli_args, options).await;
    }
    if cli_args.contains_key("watch") {
        return watch(cli_args, options).await;
    }
    if cli_args.contains_key("serve") {
        info!("Running homefleet with options: {:?}", options);
        return Ok(run(options, await_shutdown_signal()).await?);
    }

    bail!("Unknown command\n\n{}", USAGE)
}

fn required<'a>(cli_args: &'a HashMap<String, String>, key: &str) -> anyhow::Result<&'a str> {
    cli_args
        .get(key)
        .map(String::as_str)
        .filter(|v| *v != "true")
        .ok_or_else(|| anyhow!("--{}=<value> is required", key))
}

fn parse_ids(raw: &str) -> anyhow::Result<Vec<HostId>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<HostId>().with_context(|| format!("Invalid host id '{}'", s)))
        .collect()
}

async fn init(layout: &StorageLayout, settings: &Settings) -> anyhow::Result<()> {
    layout.setup().await?;
    let file = layout.settings_file();
    if file.exists().await {
        println!("Settings already exist at {}", file.path().display());
    } else {
        settings.save(&file).await?;
        println!("Wrote default settings to {}", file.path().display());
    }
    Ok(())
}

async fn add_host(cli_args: &HashMap<String, String>, layout: &StorageLayout) -> anyhow::Result<()> {
    let file = layout.hosts_file();
    let store = HostStore::load(&file).await?;
    let user = required(cli_args, "user")?;
    let secret = required(cli_args, "secret")?;
    let service = cli_args.get("service").map(|name| Service::parse(name));

    let added = match cli_args.get("range") {
        Some(cidr) => store.add_range(cidr, user, secret, service)?,
        None => vec![store.add(required(cli_args, "address")?, user, secret, service)?],
    };
    store.save(&file).await?;

    for host in &added {
        println!("Added {}", host.label());
    }
    Ok(())
}

async fn remove_host(cli_args: &HashMap<String, String>, layout: &StorageLayout) -> anyhow::Result<()> {
    let file = layout.hosts_file();
    let store = HostStore::load(&file).await?;
    let id: HostId = required(cli_args, "id")?
        .parse()
        .context("--id must be a number")?;
    let host = store.remove(id)?;
    store.save(&file).await?;
    println!("Removed {}", host.label());
    Ok(())
}

async fn list(layout: &StorageLayout) -> anyhow::Result<()> {
    let store = HostStore::load(&layout.hosts_file()).await?;
    if store.is_empty() {
        println!("No hosts yet, add one with --add-host");
        return Ok(());
    }
    for host in store.snapshot() {
        let service = host.service.map(|s| s.display_name()).unwrap_or("-");
        println!("{:>4}  {:<24} {:<12} {}", host.id, host.address, host.user, service);
    }
    Ok(())
}

async fn validate(layout: &StorageLayout) -> anyhow::Result<()> {
    let store = HostStore::load(&layout.hosts_file()).await?;
    match validate_hosts(&store.snapshot()) {
        Ok(()) => {
            println!("{} host(s) valid", store.len());
            Ok(())
        }
        Err(issues) => {
            for issue in &issues {
                println!("{}", issue);
            }
            bail!("{} validation issue(s)", issues.len())
        }
    }
}

async fn deploy(cli_args: &HashMap<String, String>, options: AppOptions) -> anyhow::Result<()> {
    let state = AppState::init(options).await?;
    let ids = match cli_args.get("ids") {
        Some(raw) => parse_ids(raw)?,
        None => Vec::new(),
    };
    let hosts = state.select_hosts(&ids)?;

    let mut run = match state.deployments.deployer().submit(hosts) {
        Ok(run) => run,
        Err(FleetError::ValidationFailed(issues)) => {
            for issue in &issues {
                println!("{}", issue);
            }
            bail!("{} validation issue(s), nothing was deployed", issues.len());
        }
        Err(e) => return Err(e.into()),
    };
    info!("Deployment {} started for {} host(s)", run.id(), run.hosts().len());

    let mut sink = ConsoleSink::new(run.hosts());
    let summary = run.wait(&mut sink).await;
    println!("\n{}", summary.to_report_text());

    if summary.failed > 0 {
        bail!("{} host(s) failed", summary.failed);
    }
    Ok(())
}

async fn health(cli_args: &HashMap<String, String>, options: AppOptions) -> anyhow::Result<()> {
    let state = AppState::init(options).await?;
    if state.hosts.is_empty() {
        bail!("No hosts to check");
    }
    start_refresh(&state)?;
    state.health.wait_for_refresh().await;

    let report = state.health.export_text();
    match cli_args.get("export").filter(|path| path.as_str() != "true") {
        Some(path) => {
            File::new(path).write_string(&report).await?;
            println!("Health report written to {}", path);
        }
        None => println!("{}", report),
    }
    Ok(())
}

fn start_refresh(state: &AppState) -> anyhow::Result<()> {
    match state.health.refresh() {
        Ok(_) => Ok(()),
        Err(FleetError::ValidationFailed(issues)) => {
            for issue in &issues {
                println!("{}", issue);
            }
            bail!("{} validation issue(s), no host was queried", issues.len());
        }
        Err(e) => Err(e.into()),
    }
}

async fn watch(cli_args: &HashMap<String, String>, options: AppOptions) -> anyhow::Result<()> {
    let interval = match cli_args.get("interval") {
        Some(raw) => raw.parse::<RefreshInterval>().map_err(|e| anyhow!(e))?,
        None => options.auto_refresh.unwrap_or(RefreshInterval::ThirtySeconds),
    };
    let state = AppState::init(options).await?;
    let mut sink = ConsoleSink::new(&state.hosts.snapshot());
    let events = state.health.events();
    let mut cursor = 0;

    start_refresh(&state)?;
    state.health.enable_auto_refresh(interval);
    println!("Refreshing every {}, Ctrl+C to stop", interval);

    let shutdown = await_shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(Duration::from_millis(500)) => {
                let (batch, next) = events.since(cursor);
                cursor = next;
                for event in batch {
                    sink.on_event(event);
                }
            }
        }
    }

    state.health.shutdown().await;
    Ok(())
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            _ => {
                error!("Unable to install signal handlers, falling back to Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
