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

//! Reconciles installed foreign packages against AUR metadata.

use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::aur::version::vercmp;
use crate::aur::{AurClient, AurPackage};
use crate::error::SlurpyResult;
use crate::pacman::InstalledPackage;

/// An installed package with a newer AUR version
#[derive(Debug, Clone)]
pub struct Update {
    pub name: String,
    pub local_version: String,
    pub remote: AurPackage,
}

/// Outcome of comparing local and remote versions
#[derive(Debug, Default)]
pub struct UpdateReport {
    /// Installed packages the AUR has a newer version of
    pub outdated: Vec<Update>,
    /// Foreign packages the AUR does not know
    pub missing: Vec<String>,
    /// (name, local, remote) where the local build is ahead
    pub newer_locally: Vec<(String, String, String)>,
    /// Skipped because of the ignore list
    pub ignored: Vec<String>,
    /// Number of packages checked against the AUR
    pub checked: usize,
}

impl UpdateReport {
    pub fn is_up_to_date(&self) -> bool {
        self.outdated.is_empty()
    }
}

/// Narrow `installed` to the named targets; no targets keeps everything.
/// Also returns the targets that are not installed foreign packages.
pub fn restrict_to_targets(
    mut installed: Vec<InstalledPackage>,
    targets: &[String],
) -> (Vec<InstalledPackage>, Vec<String>) {
    if targets.is_empty() {
        return (installed, Vec::new());
    }

    let unknown = targets
        .iter()
        .filter(|t| !installed.iter().any(|p| &p.name == *t))
        .cloned()
        .collect();
    installed.retain(|p| targets.contains(&p.name));
    (installed, unknown)
}

/// Split off packages listed in `ignore`
pub fn filter_ignored(
    installed: Vec<InstalledPackage>,
    ignore: &[String],
) -> (Vec<InstalledPackage>, Vec<String>) {
    let mut kept = Vec::with_capacity(installed.len());
    let mut ignored = Vec::new();
    for pkg in installed {
        if ignore.iter().any(|i| i == &pkg.name) {
            ignored.push(pkg.name);
        } else {
            kept.push(pkg);
        }
    }
    (kept, ignored)
}

/// Compare installed versions with AUR records
pub fn reconcile(installed: &[InstalledPackage], remote: Vec<AurPackage>) -> UpdateReport {
    let mut by_name: HashMap<String, AurPackage> =
        remote.into_iter().map(|p| (p.name.clone(), p)).collect();

    let mut report = UpdateReport {
        checked: installed.len(),
        ..Default::default()
    };

    for local in installed {
        let Some(remote) = by_name.remove(&local.name) else {
            report.missing.push(local.name.clone());
            continue;
        };

        match vercmp(&remote.version, &local.version) {
            Ordering::Greater => report.outdated.push(Update {
                name: local.name.clone(),
                local_version: local.version.clone(),
                remote,
            }),
            Ordering::Less => report.newer_locally.push((
                local.name.clone(),
                local.version.clone(),
                remote.version.clone(),
            )),
            Ordering::Equal => {}
        }
    }

    report.outdated.sort_by(|a, b| a.name.cmp(&b.name));
    report
}

/// Check `installed` against the AUR, skipping anything in `ignore`
pub async fn check_updates(
    client: &AurClient,
    installed: Vec<InstalledPackage>,
    ignore: &[String],
) -> SlurpyResult<UpdateReport> {
    let (installed, ignored) = filter_ignored(installed, ignore);
    if !ignored.is_empty() {
        debug!(packages = ?ignored, "ignoring packages");
    }

    let names: Vec<String> = installed.iter().map(|p| p.name.clone()).collect();
    info!(count = names.len(), "checking foreign packages against the AUR");
    let remote = client.info(&names).await?;

    let mut report = reconcile(&installed, remote);
    report.ignored = ignored;
    Ok(report)
}
