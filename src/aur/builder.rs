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

//! PKGBUILD review and makepkg build/install with privilege handling.

use console::style;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, info};

use crate::error::{SlurpyError, SlurpyResult};

/// Runs the local build tool on extracted snapshots
pub struct AurBuilder {
    /// Editor command line for PKGBUILD review
    editor: String,
    /// Pass --noconfirm to makepkg
    noconfirm: bool,
}

impl AurBuilder {
    pub fn new(editor: impl Into<String>, noconfirm: bool) -> Self {
        Self {
            editor: editor.into(),
            noconfirm,
        }
    }

    /// Editor invocation for `file`; the editor setting may carry arguments ("code -w")
    pub fn editor_command(&self, file: &Path) -> SlurpyResult<Command> {
        let mut parts = self.editor.split_whitespace();
        let program = parts.next().ok_or_else(|| SlurpyError::ConfigError {
            message: "editor command is empty".to_string(),
        })?;

        let mut cmd = Command::new(program);
        cmd.args(parts);
        cmd.arg(file);
        Ok(cmd)
    }

    /// Open the PKGBUILD in the configured editor and wait for it to exit
    pub fn edit_pkgbuild(&self, build_dir: &Path) -> SlurpyResult<()> {
        let pkgbuild = build_dir.join("PKGBUILD");
        if !pkgbuild.is_file() {
            return Err(SlurpyError::FileSystem {
                path: pkgbuild,
                message: "PKGBUILD not found".to_string(),
                source: None,
            });
        }

        let mut cmd = self.editor_command(&pkgbuild)?;
        debug!(editor = %self.editor, "opening PKGBUILD");
        let status = cmd
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| SlurpyError::filesystem(&pkgbuild, format!("cannot run editor '{}'", self.editor), e))?;

        if !status.success() {
            return Err(SlurpyError::invalid_args(format!(
                "editor '{}' exited with {}",
                self.editor, status
            )));
        }
        Ok(())
    }

    /// makepkg invocation for `build_dir`.
    ///
    /// makepkg refuses to run as root, so under sudo the build is handed back
    /// to the invoking user; plain root has nobody to hand it to.
    pub fn makepkg_command(
        &self,
        build_dir: &Path,
        is_root: bool,
        sudo_user: Option<&str>,
    ) -> SlurpyResult<Command> {
        let mut makepkg_args = vec!["-si"];
        if self.noconfirm {
            makepkg_args.push("--noconfirm");
        }

        let mut cmd = match build_user(is_root, sudo_user)? {
            Some(user) => {
                let mut cmd = Command::new("sudo");
                cmd.args(["-u", user, "makepkg"]);
                cmd
            }
            None => Command::new("makepkg"),
        };

        cmd.args(&makepkg_args);
        cmd.current_dir(build_dir);
        Ok(cmd)
    }

    /// Build and install the package in `build_dir`
    pub fn build(&self, build_dir: &Path, package: &str) -> SlurpyResult<()> {
        let is_root = unsafe { libc::getuid() } == 0;
        let sudo_user = std::env::var("SUDO_USER").ok();

        if let Some(user) = build_user(is_root, sudo_user.as_deref())? {
            println!("   {} dropping privileges to {}...", style("->").yellow(), style(user).cyan());
            hand_over(build_dir, user)?;
        }

        let mut cmd = self.makepkg_command(build_dir, is_root, sudo_user.as_deref())?;
        info!(package, dir = %build_dir.display(), "running makepkg");

        let status = cmd
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| SlurpyError::filesystem(build_dir, "failed to run makepkg", e))?;

        if !status.success() {
            return Err(SlurpyError::BuildFailed {
                package: package.to_string(),
                exit_code: status.code(),
            });
        }

        println!("   {} {} installed", style("->").green(), style(package).white().bold());
        Ok(())
    }
}

/// User makepkg runs as when it cannot run as the current one.
/// `None` means the current user builds.
fn build_user(is_root: bool, sudo_user: Option<&str>) -> SlurpyResult<Option<&str>> {
    if !is_root {
        return Ok(None);
    }
    sudo_user.filter(|u| !u.is_empty()).map(Some).ok_or_else(|| {
        SlurpyError::invalid_args(
            "cannot build AUR packages as root without SUDO_USER set; \
             run slurpy as a normal user or through sudo",
        )
    })
}

fn chown_command(build_dir: &Path, user: &str) -> Command {
    let mut cmd = Command::new("chown");
    cmd.arg("-R").arg(format!("{}:", user)).arg(build_dir);
    cmd
}

/// Give the extracted tree to `user` so makepkg can write into it
fn hand_over(build_dir: &Path, user: &str) -> SlurpyResult<()> {
    let status = chown_command(build_dir, user)
        .status()
        .map_err(|e| SlurpyError::filesystem(build_dir, "failed to run chown", e))?;

    if !status.success() {
        return Err(SlurpyError::FileSystem {
            path: build_dir.to_path_buf(),
            message: format!("chown to {} exited with {}", user, status),
            source: None,
        });
    }
    debug!(user, dir = %build_dir.display(), "build directory handed over");
    Ok(())
}
