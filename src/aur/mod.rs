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

//! AUR (Arch User Repository) support module.
//!
//! This module provides:
//! - RPC client with rate limiting and retries
//! - pacman-compatible version comparison
//! - Snapshot download and extraction
//! - makepkg build/install step

pub mod builder;
pub mod client;
pub mod download;
pub mod version;

pub use builder::AurBuilder;
pub use client::{AurClient, AurPackage, SearchField};
pub use download::Downloader;

use serde::Deserialize;

/// AUR RPC API response wrapper
#[derive(Debug, Clone, Deserialize)]
pub struct AurRpcResponse {
    #[serde(default)]
    pub version: u32,
    #[serde(rename = "type")]
    pub response_type: String,
    #[serde(default)]
    pub resultcount: usize,
    #[serde(default)]
    pub results: Vec<AurPackage>,
    pub error: Option<String>,
}
