use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "filewarden")]
#[command(about = "Tracks files for changes and backs them up", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Track individual files
    AddFile {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Track a folder and every file in it
    AddFolder {
        path: PathBuf,
        #[command(flatten)]
        depth: Depth,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Stop tracking files by id
    RemoveFile {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    /// Stop tracking folders (and their files) by id
    RemoveFolder {
        #[arg(required = true)]
        ids: Vec<i64>,
        #[arg(short, long)]
        yes: bool,
    },
    /// List tracked folders and files
    List,
    /// Run one reconciliation pass
    Check,
    /// Remove every file the last pass could not find
    PurgeMissing {
        #[arg(short, long)]
        yes: bool,
    },
    /// Copy tracked files to the selected destinations
    Backup {
        #[command(flatten)]
        kind: BackupMode,
    },
    /// Manage backup destinations
    #[command(subcommand)]
    Destination(DestinationCommand),
    /// Manage ignorable directory names
    #[command(subcommand)]
    Ignore(IgnoreCommand),
    /// Persist a setting: overwrite-updated-files or include-all-subfolders
    Set {
        key: String,
        #[arg(action = clap::ArgAction::Set)]
        value: bool,
    },
    /// Reconcile periodically until interrupted
    Watch,
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Args)]
#[group(multiple = false)]
pub struct Depth {
    /// Include every subfolder
    #[arg(long)]
    pub recursive: bool,
    /// Only files directly inside the folder
    #[arg(long)]
    pub top_level: bool,
}

impl Depth {
    /// `None` when neither flag was given.
    pub fn choice(&self) -> Option<bool> {
        match (self.recursive, self.top_level) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct BackupMode {
    /// Every tracked file, into a new timestamped folder
    #[arg(long)]
    pub full: bool,
    /// Only modified files, into the Updated folder
    #[arg(long)]
    pub updated: bool,
}

#[derive(Debug, Subcommand)]
pub enum DestinationCommand {
    Add { path: PathBuf },
    Select { id: i64 },
    Deselect { id: i64 },
    Remove {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    List,
}

#[derive(Debug, Subcommand)]
pub enum IgnoreCommand {
    Add { name: String },
    Remove {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    List,
}
