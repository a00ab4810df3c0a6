mod commands;
mod logging;
mod progress;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands, DestinationCommand, IgnoreCommand};
use dotenv::dotenv;
use filewarden_core::coordinator::Registration;
use filewarden_core::storage::Database;
use filewarden_core::{
    AppConfig, BackupKind, CancelToken, ChangeNotifier, NoopNotifier, PassOutcome, Poller,
    SyncCoordinator, UdpNotifier,
};
use progress::CliReporter;
use tracing::{error, info, warn};

type Coordinator = SyncCoordinator<Database, Box<dyn ChangeNotifier>>;

fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match filewarden_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();
    let Some(command) = args.command else {
        Cli::command().print_long_help()?;
        return Ok(());
    };

    let coordinator = Arc::new(open_coordinator(&config)?);
    if let Err(err) = run(command, &coordinator) {
        error!("Error: {:#}", err);
        process::exit(1);
    }
    Ok(())
}

fn open_coordinator(config: &AppConfig) -> anyhow::Result<Coordinator> {
    let db = Database::open(&config.db_path)
        .with_context(|| format!("opening registry {}", config.db_path))?;
    let notifier: Box<dyn ChangeNotifier> = if config.notify_enabled {
        Box::new(UdpNotifier::new(config.notify_addr.clone()))
    } else {
        Box::new(NoopNotifier)
    };
    Ok(SyncCoordinator::new(db, notifier, config.clone()))
}

fn run(command: Commands, coordinator: &Arc<Coordinator>) -> anyhow::Result<()> {
    match command {
        Commands::AddFile { paths } => {
            let paths: Vec<PathBuf> = paths.iter().map(PathBuf::as_path).map(absolute).collect();
            let registration = coordinator.add_files(&paths)?;
            print_registration(&registration);
        }
        Commands::AddFolder { path, depth, yes } => {
            let path = fs::canonicalize(&path)
                .with_context(|| format!("resolving {}", path.display()))?;
            let recursive = match depth.choice() {
                Some(recursive) => recursive,
                None => coordinator.include_all_subfolders()?,
            };
            let preview = coordinator.preview_folder(&path, recursive)?;
            let prompt = format!(
                "Track {} files from {} folders under {}?",
                preview.files.len(),
                preview.directories,
                path.display()
            );
            if !yes && !prompt_confirm(&prompt, Some(true))? {
                return Ok(());
            }
            let (folder, registration) = coordinator.add_folder(&path, recursive)?;
            println!(
                "Folder {} {}",
                format!("#{}", folder.id).cyan(),
                folder.path.display()
            );
            print_registration(&registration);
        }
        Commands::RemoveFile { ids } => {
            let removed = coordinator.remove_files(&ids)?;
            println!("Removed {} files", removed.to_string().yellow());
        }
        Commands::RemoveFolder { ids, yes } => {
            let members = coordinator
                .files()?
                .iter()
                .filter(|f| f.origin_folder_id.is_some_and(|id| ids.contains(&id)))
                .count();
            let prompt = format!(
                "This removes {} file(s) from {} folder(s). Continue?",
                members,
                ids.len()
            );
            if !yes && !prompt_confirm(&prompt, Some(false))? {
                return Ok(());
            }
            let removed = coordinator.remove_folders(&ids)?;
            println!("Removed {} folders", removed.to_string().yellow());
        }
        Commands::List => print_listing(coordinator)?,
        Commands::Check => run_check(coordinator)?,
        Commands::PurgeMissing { yes } => {
            let missing = coordinator.files()?.into_iter().filter(|f| f.is_missing).count();
            if missing == 0 {
                println!("No missing files");
                return Ok(());
            }
            let prompt = format!("Stop tracking {} moved or missing files?", missing);
            if !yes && !prompt_confirm(&prompt, Some(false))? {
                return Ok(());
            }
            for file in coordinator.purge_missing()? {
                println!("  {} {}", "-".red(), file.path.display());
            }
        }
        Commands::Backup { kind } => {
            let kind = if kind.full {
                BackupKind::Full
            } else {
                BackupKind::Updated
            };
            run_backup(coordinator, kind)?;
        }
        Commands::Destination(command) => run_destination(coordinator, command)?,
        Commands::Ignore(command) => run_ignore(coordinator, command)?,
        Commands::Set { key, value } => {
            coordinator.set_setting(&key.replace('-', "_"), value)?;
            println!("{} = {}", key, value.to_string().green());
        }
        Commands::Watch => {
            let interval = coordinator.config().poll_interval();
            let poller = Poller::start(Arc::clone(coordinator), interval);
            let token = poller.cancel_token();
            ctrlc::set_handler(move || token.cancel()).context("installing Ctrl-C handler")?;
            info!("Watching; press Ctrl-C to stop");
            poller.join();
            info!("Stopped watching");
        }
        Commands::PrintConfig => {
            println!("{}", toml::to_string_pretty(coordinator.config())?);
        }
    }
    Ok(())
}

fn run_check(coordinator: &Coordinator) -> anyhow::Result<()> {
    let reporter = CliReporter::new();
    let result = match coordinator.reconcile(&reporter)? {
        PassOutcome::Completed(result) => result,
        PassOutcome::Skipped => {
            warn!("Another pass is running; try again shortly");
            return Ok(());
        }
    };

    println!();
    for file in &result.new_files {
        println!("  {} {}", "new".green(), file.path.display());
    }
    for file in &result.modified {
        println!("  {} {}", "modified".yellow(), file.path.display());
    }
    for file in &result.moved_or_missing {
        println!("  {} {}", "moved or missing".red(), file.path.display());
    }
    for file in &result.detached {
        println!("  {} {}", "gone from folder".red(), file.path.display());
    }
    for destination in &result.missing_destinations {
        println!(
            "  {} {}",
            "destination missing".red(),
            destination.path.display()
        );
    }
    for err in &result.errors {
        warn!("{}", err);
    }
    info!(
        "{} unchanged, {} modified, {} moved or missing",
        result.unchanged.to_string().green(),
        result.modified.len().to_string().yellow(),
        result.moved_or_missing.len().to_string().red(),
    );
    if !result.moved_or_missing.is_empty() {
        info!("Run `filewarden purge-missing` to stop tracking missing files");
    }
    Ok(())
}

fn run_backup(coordinator: &Coordinator, kind: BackupKind) -> anyhow::Result<()> {
    let reporter = CliReporter::new();
    let run = coordinator.backup(kind, &CancelToken::new(), &reporter)?;

    for (destination, report) in &run.destinations {
        for failure in report.failures() {
            warn!("{}", failure);
        }
        match report.clone().into_result() {
            Ok(report) => info!(
                "{}: {} files into {}",
                destination.display(),
                report.entries.len().to_string().green(),
                report.run_dir.display()
            ),
            Err(err) => warn!("{}: {}", destination.display(), err.to_string().red()),
        }
    }
    if let Some(baseline) = &run.baseline {
        for err in &baseline.errors {
            warn!("Baseline not reset: {}", err);
        }
    }
    if run.failed_count() > 0 {
        bail!("{} copies failed", run.failed_count());
    }
    Ok(())
}

fn run_destination(coordinator: &Coordinator, command: DestinationCommand) -> anyhow::Result<()> {
    match command {
        DestinationCommand::Add { path } => match coordinator.add_destination(&absolute(&path))? {
            Some(destination) => println!(
                "Destination {} {}",
                format!("#{}", destination.id).cyan(),
                destination.path.display()
            ),
            None => println!("{} is already a destination", path.display()),
        },
        DestinationCommand::Select { id } => coordinator.select_destination(id, true)?,
        DestinationCommand::Deselect { id } => coordinator.select_destination(id, false)?,
        DestinationCommand::Remove { ids } => {
            let removed = coordinator.remove_destinations(&ids)?;
            println!("Removed {} destinations", removed);
        }
        DestinationCommand::List => {
            for destination in coordinator.destinations()? {
                let marker = if destination.is_selected {
                    "[x]".green()
                } else {
                    "[ ]".normal()
                };
                let gone = if destination.path.is_dir() {
                    "".normal()
                } else {
                    " (missing)".red()
                };
                println!(
                    "{} {:>4} {}{}",
                    marker,
                    destination.id,
                    destination.path.display(),
                    gone
                );
            }
        }
    }
    Ok(())
}

fn run_ignore(coordinator: &Coordinator, command: IgnoreCommand) -> anyhow::Result<()> {
    match command {
        IgnoreCommand::Add { name } => match coordinator.add_ignorable(&name)? {
            Some(ignorable) => println!("Ignoring {} (#{})", ignorable.name.cyan(), ignorable.id),
            None => println!("{} is already ignored", name),
        },
        IgnoreCommand::Remove { ids } => {
            let removed = coordinator.remove_ignorables(&ids)?;
            println!("Removed {} ignorable names", removed);
        }
        IgnoreCommand::List => {
            for ignorable in coordinator.ignorables()? {
                println!("{:>4} {}", ignorable.id, ignorable.name);
            }
        }
    }
    Ok(())
}

fn print_listing(coordinator: &Coordinator) -> anyhow::Result<()> {
    let status = coordinator.status()?;
    for folder in coordinator.folders()? {
        let depth = if folder.monitor_all_subfolders {
            "recursive"
        } else {
            "top-level"
        };
        println!(
            "{} {:>4} {} ({})",
            "dir ".cyan(),
            folder.id,
            folder.path.display(),
            depth
        );
    }
    for file in coordinator.files()? {
        let state = if file.is_missing {
            "missing ".red()
        } else if file.is_modified {
            "modified".yellow()
        } else {
            "ok      ".green()
        };
        println!("{} {:>4} {}", state, file.id, file.path.display());
    }
    info!(
        "{} files, {} modified, {} missing, {} folders, {}/{} destinations selected",
        status.tracked_files,
        status.modified,
        status.missing,
        status.folders,
        status.selected_destinations,
        status.destinations
    );
    Ok(())
}

fn print_registration(registration: &Registration) {
    for file in &registration.added {
        println!("  {} {}", "+".green(), file.path.display());
    }
    for path in &registration.skipped {
        println!("  {} {} (skipped)", "=".yellow(), path.display());
    }
    for err in &registration.errors {
        warn!("{}", err);
    }
}

/// Resolve to an absolute path; a path that does not exist is kept as given
/// so the core reports it.
fn absolute(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(default.unwrap_or(false));
        }

        match input.trim().to_uppercase().as_str() {
            "Y" | "YES" => return Ok(true),
            "N" | "NO" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
