//! Application orchestrator.
//! Loads config, initializes logging, installs the signal handler, builds the
//! stores a subcommand needs and runs it.

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info};

use datamover_store::cli::{Args, Command};
use datamover_store::config::{ensure_default_config_exists, load_config_from_xml_path, CONFIG_ENV_VAR};
use datamover_store::highwater::HighwaterMarkEvent;
use datamover_store::output as out;
use datamover_store::{resolve_config_path, shutdown, Config, FileStore, StoreFactory, StoreItem, RemoteSettings};

use crate::logging::init_tracing;

/// Run the CLI application.
pub fn run(args: Args) -> Result<()> {
    let Some(cfg_path) = resolve_config_path(args.config.as_deref()) else {
        bail!("Cannot determine a config path; pass --config or set {CONFIG_ENV_VAR}");
    };

    if args.command == Command::PrintConfig {
        return print_config(&cfg_path);
    }

    if !cfg_path.exists() {
        if args.config.is_none()
            && let Some(created) = ensure_default_config_exists()
        {
            out::print_success(&format!("A template config was written to: {}", created.display()));
            out::print_info("Add your <store> entries, then re-run this command.");
            return Ok(());
        }
        bail!("Config file not found: {}", cfg_path.display());
    }

    let mut cfg = load_config_from_xml_path(&cfg_path)?;
    args.apply_overrides(&mut cfg);

    let guard = init_tracing(&cfg.log_level, cfg.log_file.as_deref(), args.json).inspect_err(|e| {
        out::print_error(&format!("Failed to initialize logging: {e}"));
    })?;

    // Dropping the guard on Ctrl-C flushes the file appender.
    let guard_slot = Arc::new(Mutex::new(guard));
    {
        let guard_slot = Arc::clone(&guard_slot);
        ctrlc::set_handler(move || {
            shutdown::request();
            out::print_warn("Received interrupt; shutting down gracefully...");
            if let Ok(mut g) = guard_slot.lock() {
                let _ = g.take();
            }
        })
        .context("install signal handler")?;
    }

    debug!(config = %cfg_path.display(), command = ?args.command, "Starting datamover_store");
    let result = cfg
        .validate()
        .map_err(anyhow::Error::from)
        .and_then(|()| dispatch(&cfg, &args.command));

    if let Err(e) = &result {
        error!(error = %e, "Command failed");
    }
    if let Ok(mut g) = guard_slot.lock() {
        let _ = g.take();
    }
    result
}

fn print_config(cfg_path: &std::path::Path) -> Result<()> {
    if std::env::var_os(CONFIG_ENV_VAR).is_some() {
        out::print_info(&format!("Using {CONFIG_ENV_VAR}:\n  {}", cfg_path.display()));
    } else {
        out::print_info(&format!("Config path:\n  {}", cfg_path.display()));
    }
    if !cfg_path.exists() {
        out::print_info("No config file exists there yet. Run any other command to create a template.");
        return Ok(());
    }
    let cfg = load_config_from_xml_path(cfg_path)?;
    for store in &cfg.stores {
        let mark = store.highwater_mark_kb.map(|kb| format!(" >{kb} KB")).unwrap_or_default();
        let mounted = if store.mounted { " (mounted)" } else { "" };
        out::print_user(&format!("{}: {}{}{} - {}", store.name, store.target, mark, mounted, store.description));
    }
    Ok(())
}

fn open(factory: &StoreFactory, cfg: &Config, name: &str) -> Result<Arc<dyn FileStore>> {
    Ok(factory.create(cfg.store(name)?)?)
}

fn dispatch(cfg: &Config, command: &Command) -> Result<()> {
    let factory = StoreFactory::new(RemoteSettings::from_config(cfg));
    match command {
        Command::PrintConfig => Ok(()),
        Command::Check => check_all(cfg, &factory),
        Command::List { store } => {
            let store = open(&factory, cfg, store)?;
            let Some(items) = store.try_list_sort_by_last_modified() else {
                bail!("Listing of {} failed; try again later", store.descriptor());
            };
            for item in items {
                out::print_user(item.name());
            }
            Ok(())
        }
        Command::Exists { store, item } => {
            let store = open(&factory, cfg, store)?;
            let item = StoreItem::try_new(item.as_str())?;
            let status = store.exists(&item);
            out::print_boolean(item.name(), &status);
            if let Some(f) = status.failure() {
                bail!("existence check failed: {f}");
            }
            Ok(())
        }
        Command::LastChanged { store, item, younger_than } => {
            let store = open(&factory, cfg, store)?;
            let item = StoreItem::try_new(item.as_str())?;
            let status = match younger_than {
                Some(secs) => store.last_changed_relative(&item, Duration::from_secs(*secs))?,
                None => store.last_changed(&item, SystemTime::now())?,
            };
            out::print_date(item.name(), &status);
            if let Some(f) = status.failure() {
                bail!("last change not determined: {f}");
            }
            Ok(())
        }
        Command::FreeSpace { store } => {
            let store = open(&factory, cfg, store)?;
            let watcher = store.highwater_mark_watcher();
            match watcher.state()? {
                Some(state) => out::print_user(&state.to_string()),
                None => out::print_user(&format!(
                    "{}: {} KB free, no high-water mark",
                    watcher.path().display(),
                    watcher.free_space_kb()?
                )),
            }
            Ok(())
        }
        Command::ProbeOverwrite { source, destination } => {
            let copier = factory.store_copier(open(&factory, cfg, source)?, open(&factory, cfg, destination)?);
            out::print_user(&format!("{:?}", copier.strategy()));
            Ok(())
        }
        Command::Copy { source, destination, items } => {
            let items = items
                .iter()
                .map(|i| StoreItem::try_new(i.as_str()))
                .collect::<Result<Vec<_>, _>>()?;
            let copier = factory.store_copier(open(&factory, cfg, source)?, open(&factory, cfg, destination)?);
            let mut failed = 0usize;
            for (done, item) in items.iter().enumerate() {
                if shutdown::is_requested() {
                    bail!("Interrupted after {done} of {} items", items.len());
                }
                let status = copier.copy(item);
                out::print_status(item.name(), &status);
                if status.is_error() {
                    failed += 1;
                }
            }
            if failed > 0 {
                bail!("{failed} of {} items failed to copy", items.len());
            }
            info!(count = items.len(), strategy = ?copier.strategy(), "Copy finished");
            Ok(())
        }
        Command::Watch { store, interval } => {
            let store = open(&factory, cfg, store)?;
            let watcher = store.highwater_mark_watcher();
            if !watcher.mark().is_enabled() {
                bail!("{} has no high-water mark", store.descriptor());
            }
            watcher.add_listener(|event| match event {
                HighwaterMarkEvent::DroppedBelow(s) => out::print_warn(&format!("below high-water mark: {s}")),
                HighwaterMarkEvent::Recovered(s) => out::print_success(&format!("recovered: {s}")),
            });
            let interval = Duration::from_secs((*interval).max(1));
            loop {
                match watcher.poll() {
                    Ok(Some(state)) => debug!(state = %state, "Polled free space"),
                    Ok(None) => {}
                    Err(e) if e.is_environment_failure() => return Err(e.into()),
                    Err(e) => out::print_warn(&e.to_string()),
                }
                if !shutdown::sleep_unless_requested(interval) {
                    return Ok(());
                }
            }
        }
    }
}

fn check_all(cfg: &Config, factory: &StoreFactory) -> Result<()> {
    let results: Vec<(String, Option<String>)> = cfg
        .stores
        .par_iter()
        .map(|sc| {
            let problem = match factory.create(sc) {
                Ok(store) => store.try_check_directory_fully_accessible(cfg.quick_timeout),
                Err(e) => Some(e.to_string()),
            };
            (sc.name.clone(), problem)
        })
        .collect();

    let mut failed = 0usize;
    for (name, problem) in &results {
        match problem {
            None => out::print_success(name),
            Some(msg) => {
                failed += 1;
                out::print_error(&format!("{name}: {msg}"));
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} stores are not accessible", results.len());
    }
    Ok(())
}
