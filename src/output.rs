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

//! Terminal presentation of search results, package details and updates.

use chrono::{DateTime, Utc};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use console::style;
use std::fmt::Write as _;
use std::io::{self, Write};

use crate::aur::AurPackage;
use crate::config::ColorChoice;
use crate::updater::UpdateReport;

/// Apply the color preference to stdout and stderr
pub fn apply_color(choice: ColorChoice) {
    match choice {
        ColorChoice::Always => {
            console::set_colors_enabled(true);
            console::set_colors_enabled_stderr(true);
        }
        ColorChoice::Never => {
            console::set_colors_enabled(false);
            console::set_colors_enabled_stderr(false);
        }
        ColorChoice::Auto => {}
    }
}

/// Whether stderr output should carry ANSI escapes
pub fn stderr_colors() -> bool {
    console::colors_enabled_stderr()
}

/// Unix timestamp as a readable UTC date
pub fn format_timestamp(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "None".to_string()
    } else {
        items.join("  ")
    }
}

/// One search hit: header line plus indented description
pub fn format_search_result(pkg: &AurPackage, verbose: bool) -> String {
    let mut out = String::new();

    let mut markers = String::new();
    if pkg.is_out_of_date() {
        markers.push_str(&style(" [out of date]").red().to_string());
    }
    if pkg.is_orphan() {
        markers.push_str(&style(" [orphan]").red().to_string());
    }

    let _ = writeln!(
        out,
        "{}/{} {}{}",
        style("aur").magenta().bold(),
        style(&pkg.name).white().bold(),
        style(&pkg.version).green(),
        markers
    );

    if let Some(desc) = &pkg.description {
        let _ = writeln!(out, "    {}", desc);
    }

    if verbose {
        let _ = writeln!(
            out,
            "    Votes: {}  Popularity: {:.2}  Maintainer: {}",
            style(pkg.num_votes).cyan(),
            pkg.popularity,
            pkg.maintainer.as_deref().unwrap_or("None")
        );
    }

    out
}

pub fn print_search_results(results: &[AurPackage], quiet: bool, verbose: bool) {
    for pkg in results {
        if quiet {
            println!("{}", pkg.name);
        } else {
            print!("{}", format_search_result(pkg, verbose));
        }
    }
}

/// Detailed record in `Label : value` form
pub fn format_info(pkg: &AurPackage, base_url: &str) -> String {
    let out_of_date = match pkg.out_of_date {
        Some(ts) => style(format!("Yes (since {})", format_timestamp(ts))).red().to_string(),
        None => "No".to_string(),
    };

    let rows: Vec<(&str, String)> = vec![
        ("Repository", style("aur").magenta().bold().to_string()),
        ("Name", style(&pkg.name).white().bold().to_string()),
        ("Package Base", pkg.package_base.clone()),
        ("Version", style(&pkg.version).green().to_string()),
        ("Description", pkg.description.clone().unwrap_or_else(|| "None".to_string())),
        ("URL", pkg.url.clone().unwrap_or_else(|| "None".to_string())),
        ("AUR Page", pkg.aur_page(base_url)),
        ("Licenses", join_or_none(&pkg.license)),
        ("Groups", join_or_none(&pkg.groups)),
        ("Provides", join_or_none(&pkg.provides)),
        ("Depends On", join_or_none(&pkg.depends)),
        ("Make Deps", join_or_none(&pkg.make_depends)),
        ("Check Deps", join_or_none(&pkg.check_depends)),
        ("Optional Deps", join_or_none(&pkg.opt_depends)),
        ("Conflicts With", join_or_none(&pkg.conflicts)),
        ("Replaces", join_or_none(&pkg.replaces)),
        ("Keywords", join_or_none(&pkg.keywords)),
        ("Maintainer", pkg.maintainer.clone().unwrap_or_else(|| "None".to_string())),
        ("Submitter", pkg.submitter.clone().unwrap_or_else(|| "None".to_string())),
        ("Votes", pkg.num_votes.to_string()),
        ("Popularity", format!("{:.2}", pkg.popularity)),
        ("Out Of Date", out_of_date),
        ("First Submitted", format_timestamp(pkg.first_submitted)),
        ("Last Modified", format_timestamp(pkg.last_modified)),
    ];

    let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
    let mut out = String::new();
    for (label, value) in rows {
        let _ = writeln!(out, "{:<width$} : {}", label, value, width = width);
    }
    out
}

pub fn print_info(packages: &[AurPackage], base_url: &str) {
    for pkg in packages {
        println!("{}", format_info(pkg, base_url));
    }
}

/// Table of outdated packages; quiet mode prints bare names for scripting
pub fn print_update_report(report: &UpdateReport, quiet: bool, verbose: bool) {
    if quiet {
        for update in &report.outdated {
            println!("{}", update.name);
        }
        return;
    }

    if verbose {
        for name in &report.missing {
            println!("{} {} is not in the AUR", style("::").yellow().bold(), style(name).white().bold());
        }
        for (name, local, remote) in &report.newer_locally {
            println!(
                "{} {} local version {} is newer than AUR version {}",
                style("::").yellow().bold(),
                style(name).white().bold(),
                style(local).green(),
                style(remote).yellow()
            );
        }
        for name in &report.ignored {
            println!("{} {} ignored", style("::").dim(), name);
        }
        println!("{} checked {} package(s)", style("::").dim(), report.checked);
    }

    if report.is_up_to_date() {
        println!("{} all AUR packages are up to date", style("::").green().bold());
        return;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Package").fg(Color::Cyan),
        Cell::new("Installed").fg(Color::Cyan),
        Cell::new("AUR").fg(Color::Cyan),
        Cell::new("Notes").fg(Color::Cyan),
    ]);

    for update in &report.outdated {
        let mut notes = Vec::new();
        if update.remote.is_out_of_date() {
            notes.push("out of date");
        }
        if update.remote.is_orphan() {
            notes.push("orphan");
        }
        table.add_row(vec![
            Cell::new(&update.name).fg(Color::White),
            Cell::new(&update.local_version).fg(Color::Red),
            Cell::new(&update.remote.version).fg(Color::Green),
            Cell::new(notes.join(", ")).fg(Color::Yellow),
        ]);
    }

    println!(
        "{} {} update(s) available",
        style("::").cyan().bold(),
        style(report.outdated.len()).white().bold()
    );
    println!("{}", table);
}

/// Ask a yes/no question on the terminal; `noconfirm` answers yes
pub fn confirm(question: &str, noconfirm: bool) -> io::Result<bool> {
    if noconfirm {
        return Ok(true);
    }
    print!("{} {} [Y/n] ", style("::").cyan().bold(), question);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(parse_answer(&input))
}

/// Empty input means yes
fn parse_answer(input: &str) -> bool {
    let answer = input.trim().to_lowercase();
    answer.is_empty() || answer.starts_with('y')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aur::client::tests::sample_package;

    fn plain(s: &str) -> String {
        console::strip_ansi_codes(s).to_string()
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00 UTC");
        assert_eq!(format_timestamp(1700000000), "2023-11-14 22:13 UTC");
    }

    #[test]
    fn test_search_line_markers() {
        let mut pkg = sample_package("foo", "1.0-1");
        pkg.maintainer = None;
        pkg.out_of_date = Some(1);

        let text = plain(&format_search_result(&pkg, false));
        assert_eq!(text, "aur/foo 1.0-1 [out of date] [orphan]\n    foo description\n");
    }

    #[test]
    fn test_search_line_verbose() {
        let mut pkg = sample_package("foo", "1.0-1");
        pkg.num_votes = 12;
        pkg.popularity = 0.5;

        let text = plain(&format_search_result(&pkg, true));
        assert!(text.starts_with("aur/foo 1.0-1\n"));
        assert!(text.contains("Votes: 12  Popularity: 0.50  Maintainer: someone"));
    }

    #[test]
    fn test_format_info() {
        let mut pkg = sample_package("foo", "1.0-1");
        pkg.depends = vec!["glibc".to_string(), "zlib".to_string()];
        pkg.maintainer = None;

        let text = plain(&format_info(&pkg, "https://aur.archlinux.org"));
        assert!(text.contains("Name            : foo\n"));
        assert!(text.contains("Depends On      : glibc  zlib\n"));
        assert!(text.contains("Make Deps       : None\n"));
        assert!(text.contains("Maintainer      : None\n"));
        assert!(text.contains("AUR Page        : https://aur.archlinux.org/packages/foo\n"));
        assert!(text.contains("Out Of Date     : No\n"));
    }

    #[test]
    fn test_parse_answer() {
        assert!(parse_answer("\n"));
        assert!(parse_answer("Y\n"));
        assert!(parse_answer("yes"));
        assert!(!parse_answer("n\n"));
        assert!(!parse_answer("nope"));
    }
}
