// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use ccconfig::{
    archive::{read_entries, EntryKind, TreeExtractor},
    config::Config,
    format_size, path,
    snapshot::{Snapshot, Step},
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::Confirm;
use std::{path::PathBuf, process::exit, time::Duration};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "ccconfig [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to settings file.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Path to backup repository.
    #[arg(short, long, global = true, value_name = "path")]
    pub repo: Option<PathBuf>,

    /// Path to assistant configuration directory.
    #[arg(long, global = true, value_name = "path")]
    pub claude_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let config = match self.config {
            Some(path) => Config::load(path)?,
            None => Config::load(path::default_config_file()?)?,
        };
        let settings = config.settings;

        // INVARIANT: Command line beats settings file beats defaults.
        let claude_dir = match self.claude_dir.or(settings.claude_dir) {
            Some(dir) => dir,
            None => path::claude_dir()?,
        };
        let repo_path = match self.repo.or(settings.repo_path) {
            Some(dir) => dir,
            None => path::default_repo_dir()?,
        };
        let snapshot =
            Snapshot::new(claude_dir, repo_path).with_compression(settings.compression_level);

        match self.command {
            Command::Backup(opts) => run_backup(&snapshot, opts, settings.skip_skills),
            Command::Restore(opts) => run_restore(&snapshot, opts, settings.skip_skills),
            Command::Clean(opts) => run_clean(&snapshot, opts),
            Command::List => run_list(&snapshot),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Back up skills and plugin cache into backup repository.
    #[command(override_usage = "ccconfig backup [options]")]
    Backup(BackupOptions),

    /// Restore skills and plugin cache from backup repository.
    #[command(override_usage = "ccconfig restore [options]")]
    Restore(RestoreOptions),

    /// Delete plugin cache artifacts from backup repository.
    #[command(override_usage = "ccconfig clean [options]")]
    Clean(CleanOptions),

    /// List plugin cache artifacts and container contents.
    #[command(override_usage = "ccconfig list [options]")]
    List,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct BackupOptions {
    /// Do not back up custom skills.
    #[arg(long)]
    pub skip_skills: bool,

    /// Do not back up plugin cache.
    #[arg(long)]
    pub skip_cache: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RestoreOptions {
    /// Do not restore custom skills.
    #[arg(long)]
    pub skip_skills: bool,

    /// Do not restore plugin cache.
    #[arg(long)]
    pub skip_cache: bool,

    /// Reapply stored permission bits to restored plugin cache files.
    #[arg(long)]
    pub preserve_modes: bool,

    /// Do not ask for confirmation.
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct CleanOptions {
    /// Do not ask for confirmation.
    #[arg(short, long)]
    pub yes: bool,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn run_backup(snapshot: &Snapshot, opts: BackupOptions, skip_skills: bool) -> Result<()> {
    info!("back up into {:?}", snapshot.repo_path().display());
    report_skills(snapshot.backup_skills(opts.skip_skills || skip_skills)?);

    if opts.skip_cache {
        info!("plugin cache skipped");
        return Ok(());
    }

    let bar = spinner("packing plugin cache")?;
    let step = snapshot.backup_cache();
    bar.finish_and_clear();

    match step? {
        Step::Done(backup) => {
            for plugin in &backup.plugins {
                info!("  • {} ({})", plugin.name, format_size(plugin.size));
            }
            info!(
                "packed {} files into {:?} ({})",
                backup.summary.files,
                backup.container.display(),
                format_size(backup.size)
            );
        }
        Step::Skipped => info!("plugin cache skipped"),
        Step::Missing(path) => warn!("no plugin cache at {:?}, skipping", path.display()),
    }

    Ok(())
}

fn run_restore(snapshot: &Snapshot, opts: RestoreOptions, skip_skills: bool) -> Result<()> {
    let prompt = format!(
        "Restore {:?} into {:?}?",
        snapshot.repo_path().display(),
        snapshot.claude_dir().display()
    );
    if !opts.yes && !confirm(&prompt)? {
        info!("restore cancelled");
        return Ok(());
    }

    report_skills(snapshot.restore_skills(opts.skip_skills || skip_skills)?);

    if opts.skip_cache {
        info!("plugin cache skipped");
        return Ok(());
    }

    let extractor = TreeExtractor::new().preserve_file_modes(opts.preserve_modes);
    let bar = spinner("extracting plugin cache")?;
    let step = snapshot.restore_cache(&extractor);
    bar.finish_and_clear();

    match step? {
        Step::Done(restore) => info!(
            "restored {} files from {:?} ({})",
            restore.summary.files,
            restore.container.display(),
            format_size(restore.size)
        ),
        Step::Skipped => info!("plugin cache skipped"),
        Step::Missing(path) => warn!("no plugin cache backup at {:?}, skipping", path.display()),
    }

    Ok(())
}

fn run_clean(snapshot: &Snapshot, opts: CleanOptions) -> Result<()> {
    let store = snapshot.store();
    let prompt = format!("Delete every artifact in {:?}?", store.artifact_dir().display());
    if !opts.yes && !confirm(&prompt)? {
        info!("clean cancelled");
        return Ok(());
    }

    let report = snapshot.clean_cache()?;
    for artifact in &report.artifacts {
        info!("  • {} ({})", artifact.name, format_size(artifact.size));
    }
    info!("freed {}", format_size(report.freed));

    Ok(())
}

fn run_list(snapshot: &Snapshot) -> Result<()> {
    let store = snapshot.store();
    let artifacts = store.list()?;
    if artifacts.is_empty() {
        info!("no artifacts in {:?}", store.artifact_dir().display());
        return Ok(());
    }

    for artifact in &artifacts {
        info!("{} ({})", artifact.name, format_size(artifact.size));
    }

    let container = snapshot.container_path();
    if container.exists() {
        for entry in read_entries(&container)? {
            let kind = match entry.kind {
                EntryKind::Directory => 'd',
                EntryKind::File => '-',
            };
            info!(
                "  {kind} {:04o} {:>8} {}",
                entry.mode,
                format_size(entry.size),
                entry.path
            );
        }
    }

    Ok(())
}

fn report_skills(step: Step<usize>) {
    match step {
        Step::Done(count) => info!("copied {count} skills"),
        Step::Skipped => info!("skills skipped"),
        Step::Missing(path) => warn!("no skills directory at {:?}, skipping", path.display()),
    }
}

fn confirm(message: &str) -> Result<bool> {
    Ok(Confirm::new(message).with_default(false).prompt()?)
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let style = ProgressStyle::with_template("{elapsed_precise:.green}  {spinner:.yellow} {msg}")?;
    let bar = ProgressBar::new_spinner();
    bar.set_style(style);
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    Ok(bar)
}
