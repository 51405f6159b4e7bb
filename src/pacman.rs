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

//! Queries against the local pacman database.

use std::process::Command;
use tracing::{debug, warn};

use crate::error::{SlurpyError, SlurpyResult};

/// A package installed on this system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
}

/// Parse `pacman -Q` style output (`name version` per line)
pub fn parse_query_output(stdout: &str) -> Vec<InstalledPackage> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(name), Some(version)) => Some(InstalledPackage {
                    name: name.to_string(),
                    version: version.to_string(),
                }),
                (Some(name), None) => {
                    warn!("skipping pacman entry without version: {}", name);
                    None
                }
                _ => None,
            }
        })
        .collect()
}

/// Installed packages that no sync repository provides (`pacman -Qm`)
pub fn foreign_packages() -> SlurpyResult<Vec<InstalledPackage>> {
    let pacman = which::which("pacman").map_err(|e| SlurpyError::PacmanQuery {
        reason: format!("pacman not found in PATH: {}", e),
    })?;

    let output = Command::new(&pacman)
        .arg("-Qm")
        .env("LC_ALL", "C")
        .output()
        .map_err(|e| SlurpyError::PacmanQuery {
            reason: format!("failed to run {}: {}", pacman.display(), e),
        })?;

    let stdout = String::from_utf8(output.stdout).map_err(|_| SlurpyError::PacmanQuery {
        reason: "pacman output contained invalid UTF-8".to_string(),
    })?;

    if !output.status.success() {
        // pacman exits 1 with no output when nothing matches
        if output.status.code() == Some(1) && stdout.trim().is_empty() {
            debug!("no foreign packages installed");
            return Ok(Vec::new());
        }
        return Err(SlurpyError::PacmanQuery {
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(parse_query_output(&stdout))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_output() {
        let out = "yay 12.4.2-1\nneovim-git 0.11.0.r12.g1234abc-1\n\nbroken\n";
        let pkgs = parse_query_output(out);
        assert_eq!(
            pkgs,
            vec![
                InstalledPackage { name: "yay".into(), version: "12.4.2-1".into() },
                InstalledPackage { name: "neovim-git".into(), version: "0.11.0.r12.g1234abc-1".into() },
            ]
        );
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_query_output("").is_empty());
    }
}
