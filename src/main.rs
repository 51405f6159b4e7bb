/*
 * slurpy - Arch User Repository search/download/update helper.
 * Copyright (C) 2025  slurpy contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use anyhow::{Context, Result};
use clap::{ArgAction, ArgGroup, Parser};
use console::style;
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, warn};

mod aur;
mod config;
mod error;
mod logging;
mod output;
mod pacman;
mod search;
mod updater;

use aur::{AurBuilder, AurClient, AurPackage, Downloader, SearchField};
use config::{ColorChoice, Config, SortKey};
use error::SlurpyError;
use search::SearchQuery;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\n",
    "License GPLv3+: GNU GPL version 3 or later <https://gnu.org/licenses/gpl.html>\n\n",
    "This is free software; you are free to change and redistribute it.\n",
    "There is NO WARRANTY, to the extent permitted by law."
);

#[derive(Parser, Debug)]
#[command(name = "slurpy")]
#[command(version, long_version = LONG_VERSION)]
#[command(about = "An Arch User Repository (AUR) search/download/update helper.")]
#[command(group(
    ArgGroup::new("operation")
        .required(true)
        .multiple(true)
        .args(["search", "info", "download", "update"])
))]
struct Cli {
    /// Search the AUR for packages matching all terms
    #[arg(short = 's', long)]
    search: bool,
    /// Show detailed information about packages
    #[arg(short = 'i', long)]
    info: bool,
    /// Download package snapshots (with -u: download available updates)
    #[arg(short = 'd', long)]
    download: bool,
    /// Check installed AUR packages for updates
    #[arg(short = 'u', long)]
    update: bool,
    /// Build and install downloaded packages with makepkg
    #[arg(short = 'b', long)]
    build: bool,
    /// Open each PKGBUILD in an editor after downloading
    #[arg(short = 'e', long)]
    edit: bool,
    /// Overwrite existing package directories
    #[arg(short = 'f', long)]
    force: bool,
    /// Field the search term is matched against
    #[arg(long, value_enum, default_value_t = SearchField::NameDesc)]
    by: SearchField,
    /// Order of search results
    #[arg(long, value_enum)]
    sort: Option<SortKey>,
    /// Directory to download packages into
    #[arg(short = 't', long, value_name = "DIR")]
    save_to: Option<PathBuf>,
    /// Skip a package when checking for updates (repeatable, comma separated)
    #[arg(long, value_name = "PKG", value_delimiter = ',')]
    ignore: Vec<String>,
    /// Colorize output
    #[arg(short = 'c', long, value_enum, value_name = "WHEN")]
    color: Option<ColorChoice>,
    /// Bypass any confirmation prompts
    #[arg(long)]
    noconfirm: bool,
    /// Show less output
    #[arg(short = 'q', long, conflicts_with = "verbose")]
    quiet: bool,
    /// Show more output; repeat for debug logging
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,
    /// Use an alternate configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    #[arg(value_name = "TARGETS")]
    targets: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Search,
    Info,
    Download,
    Update { download: bool },
}

impl Cli {
    /// Resolve the single requested operation
    fn operation(&self) -> Result<Operation, SlurpyError> {
        let selected = [self.search, self.info, self.download, self.update]
            .iter()
            .filter(|s| **s)
            .count();

        let operation = if self.update {
            if selected > 1 && !(selected == 2 && self.download) {
                return Err(SlurpyError::invalid_args(
                    "--update can only be combined with --download",
                ));
            }
            Operation::Update { download: self.download }
        } else if selected != 1 {
            return Err(SlurpyError::invalid_args("only one operation may be used at a time"));
        } else if self.search {
            Operation::Search
        } else if self.info {
            Operation::Info
        } else {
            Operation::Download
        };

        if !matches!(operation, Operation::Update { .. }) && self.targets.is_empty() {
            return Err(SlurpyError::invalid_args("no targets specified"));
        }

        let downloads = matches!(operation, Operation::Download | Operation::Update { download: true });
        if (self.build || self.edit || self.force) && !downloads {
            return Err(SlurpyError::invalid_args(
                "--build, --edit and --force only apply when downloading",
            ));
        }

        Ok(operation)
    }

    /// Command-line flags take precedence over every config source
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(color) = self.color {
            config.color = color;
        }
        if let Some(dir) = &self.save_to {
            config.save_to = dir.clone();
        }
        if let Some(sort) = self.sort {
            config.sort = sort;
        }
        for name in &self.ignore {
            let name = name.trim();
            if !name.is_empty() && !config.ignore.iter().any(|i| i == name) {
                config.ignore.push(name.to_string());
            }
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let operation = cli.operation()?;

    let mut config = logging::bootstrap(|| Config::load(cli.config.as_deref()))
        .context("failed to load configuration")?;
    cli.apply_overrides(&mut config);

    output::apply_color(config.color);
    let level = logging::level_for_verbosity(cli.verbose, &config.logging.level);
    logging::init(&level, config.logging.file.as_deref(), output::stderr_colors());
    debug!(?operation, "starting");

    let client = AurClient::new(&config.aur)?;

    match operation {
        Operation::Search => handle_search(&cli, &config, &client).await,
        Operation::Info => handle_info(&cli, &config, &client).await,
        Operation::Download => handle_download(&cli, &config, &client).await,
        Operation::Update { download } => handle_update(&cli, &config, &client, download).await,
    }
}

async fn handle_search(cli: &Cli, config: &Config, client: &AurClient) -> Result<()> {
    let query = SearchQuery::new(cli.targets.clone(), cli.by, config.sort)?;
    let results = search::search(client, &query).await?;
    output::print_search_results(&results, cli.quiet, cli.verbose > 0);
    Ok(())
}

/// Look up targets, reporting the ones the AUR does not know
async fn lookup_targets(client: &AurClient, targets: &[String]) -> Result<(Vec<AurPackage>, Vec<String>)> {
    let results = client.info(targets).await?;
    let (found, missing) = aur::client::partition_requested(targets, results);
    for name in &missing {
        eprintln!("{} package '{}' was not found", style("error:").red().bold(), name);
    }
    Ok((found, missing))
}

async fn handle_info(cli: &Cli, config: &Config, client: &AurClient) -> Result<()> {
    let (found, missing) = lookup_targets(client, &cli.targets).await?;
    output::print_info(&found, &config.aur.base_url);

    if !missing.is_empty() {
        return Err(SlurpyError::PackagesNotFound { packages: missing }.into());
    }
    Ok(())
}

async fn handle_download(cli: &Cli, config: &Config, client: &AurClient) -> Result<()> {
    let (found, missing) = lookup_targets(client, &cli.targets).await?;
    let downloaded = download_packages(cli, config, found).await;

    if !missing.is_empty() {
        return Err(SlurpyError::PackagesNotFound { packages: missing }.into());
    }
    downloaded
}

async fn handle_update(cli: &Cli, config: &Config, client: &AurClient, download: bool) -> Result<()> {
    let (installed, unknown) = updater::restrict_to_targets(pacman::foreign_packages()?, &cli.targets);
    for target in &unknown {
        warn!("{} is not an installed foreign package", target);
    }

    let report = updater::check_updates(client, installed, &config.ignore).await?;
    output::print_update_report(&report, cli.quiet, cli.verbose > 0);

    if download && !report.is_up_to_date() {
        let packages = report.outdated.into_iter().map(|u| u.remote).collect();
        download_packages(cli, config, packages).await?;
    }
    Ok(())
}

/// Download (and optionally edit/build) each package base once, sequentially.
/// A failing package does not stop the rest.
async fn download_packages(cli: &Cli, config: &Config, packages: Vec<AurPackage>) -> Result<()> {
    let downloader = Downloader::new(config, cli.force, cli.quiet)?;
    let builder = AurBuilder::new(config.resolve_editor(), cli.noconfirm);

    let mut seen = HashSet::new();
    let mut total = 0;
    let mut failed = 0;

    for pkg in packages {
        if !seen.insert(pkg.package_base.clone()) {
            debug!(package = %pkg.name, base = %pkg.package_base, "package base already handled");
            continue;
        }
        total += 1;

        if !cli.quiet {
            println!(
                "{} {} {}",
                style("::").cyan().bold(),
                style(&pkg.package_base).yellow().bold(),
                style(&pkg.version).green()
            );
        }

        if let Err(e) = process_package(cli, &downloader, &builder, &pkg).await {
            eprintln!("{} {}: {:#}", style("error:").red().bold(), pkg.name, e);
            failed += 1;
        }
    }

    if failed > 0 {
        return Err(SlurpyError::PartialFailure { failed, total }.into());
    }
    Ok(())
}

async fn process_package(
    cli: &Cli,
    downloader: &Downloader,
    builder: &AurBuilder,
    pkg: &AurPackage,
) -> Result<()> {
    let dir = downloader.fetch(pkg).await?;

    if cli.edit {
        builder.edit_pkgbuild(&dir)?;
        if cli.build && !output::confirm(&format!("continue building {}?", pkg.name), cli.noconfirm)? {
            println!("   {} skipping build of {}", style("->").yellow(), pkg.name);
            return Ok(());
        }
    }

    if cli.build {
        builder
            .build(&dir, &pkg.name)
            .with_context(|| format!("building {}", pkg.name))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("slurpy").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_operation_selection() {
        assert_eq!(parse(&["-s", "vim"]).operation().unwrap(), Operation::Search);
        assert_eq!(parse(&["-i", "yay"]).operation().unwrap(), Operation::Info);
        assert_eq!(parse(&["-d", "yay"]).operation().unwrap(), Operation::Download);
        assert_eq!(parse(&["-u"]).operation().unwrap(), Operation::Update { download: false });
        assert_eq!(parse(&["-ud"]).operation().unwrap(), Operation::Update { download: true });
    }

    #[test]
    fn test_operation_required() {
        assert!(Cli::try_parse_from(["slurpy", "yay"]).is_err());
    }

    #[test]
    fn test_conflicting_operations() {
        assert!(parse(&["-s", "-i", "yay"]).operation().is_err());
        assert!(parse(&["-u", "-s", "yay"]).operation().is_err());
        assert!(parse(&["-u", "-d", "-i"]).operation().is_err());
    }

    #[test]
    fn test_targets_required() {
        assert!(parse(&["-s"]).operation().is_err());
        assert!(parse(&["-d"]).operation().is_err());
    }

    #[test]
    fn test_build_flags_need_download() {
        assert!(parse(&["-s", "-b", "vim"]).operation().is_err());
        assert!(parse(&["-u", "-f"]).operation().is_err());
        assert!(parse(&["-d", "-b", "-e", "yay"]).operation().is_ok());
        assert!(parse(&["-u", "-d", "-b"]).operation().is_ok());
    }

    #[test]
    fn test_overrides() {
        let cli = parse(&["-u", "--ignore", "a,b", "--ignore", "c", "-t", "/tmp/x", "-c", "never", "--sort", "votes"]);
        let mut config = Config::default();
        config.ignore = vec!["a".to_string()];
        cli.apply_overrides(&mut config);

        assert_eq!(config.ignore, vec!["a", "b", "c"]);
        assert_eq!(config.save_to, PathBuf::from("/tmp/x"));
        assert_eq!(config.color, ColorChoice::Never);
        assert_eq!(config.sort, SortKey::Votes);
    }

    #[test]
    fn test_search_field_values() {
        assert_eq!(parse(&["-s", "--by", "makedepends", "go"]).by, SearchField::MakeDepends);
        assert_eq!(parse(&["-s", "vim"]).by, SearchField::NameDesc);
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["slurpy", "-s", "-q", "-v", "vim"]).is_err());
    }
}
