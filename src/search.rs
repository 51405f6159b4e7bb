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

//! Multi-term AUR search.
//!
//! The RPC interface takes a single term, so the longest term goes to the
//! server and every term is then required locally.

use std::cmp::Ordering;
use tracing::debug;

use crate::aur::{AurClient, AurPackage, SearchField};
use crate::config::SortKey;
use crate::error::{SlurpyError, SlurpyResult};

/// Shortest term the AUR accepts
const MIN_TERM_LEN: usize = 2;

#[derive(Debug, Clone)]
pub struct SearchQuery {
    terms: Vec<String>,
    field: SearchField,
    sort: SortKey,
}

impl SearchQuery {
    pub fn new(terms: Vec<String>, field: SearchField, sort: SortKey) -> SlurpyResult<Self> {
        let terms: Vec<String> = terms
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        if terms.is_empty() {
            return Err(SlurpyError::invalid_args("no search terms given"));
        }

        let query = Self { terms, field, sort };
        if query.primary_term().chars().count() < MIN_TERM_LEN {
            return Err(SlurpyError::invalid_args(format!(
                "search term '{}' is too short (at least {} characters)",
                query.primary_term(),
                MIN_TERM_LEN
            )));
        }
        Ok(query)
    }

    /// The term sent to the AUR: the longest, first one on ties
    pub fn primary_term(&self) -> &str {
        let mut best = &self.terms[0];
        for term in &self.terms[1..] {
            if term.chars().count() > best.chars().count() {
                best = term;
            }
        }
        best
    }

    pub fn field(&self) -> SearchField {
        self.field
    }

    /// All terms, joined for messages
    pub fn display(&self) -> String {
        self.terms.join(" ")
    }

    /// Whether a result satisfies every term locally
    pub fn matches(&self, pkg: &AurPackage) -> bool {
        let name = pkg.name.to_lowercase();
        let description = pkg.description.as_deref().unwrap_or("").to_lowercase();
        let primary = self.primary_term();

        self.terms.iter().all(|term| {
            let needle = term.to_lowercase();
            match self.field {
                SearchField::Name => name.contains(&needle),
                SearchField::NameDesc => name.contains(&needle) || description.contains(&needle),
                // the server already matched the primary term on its own field
                _ if term == primary => true,
                _ => name.contains(&needle) || description.contains(&needle),
            }
        })
    }

    /// Filter and order raw server results
    pub fn apply(&self, results: Vec<AurPackage>) -> Vec<AurPackage> {
        let mut kept: Vec<AurPackage> = results.into_iter().filter(|p| self.matches(p)).collect();
        sort_packages(&mut kept, self.sort);
        kept
    }
}

/// Order packages by `key`, ties broken by name
pub fn sort_packages(pkgs: &mut [AurPackage], key: SortKey) {
    pkgs.sort_by(|a, b| {
        let primary = match key {
            SortKey::Name => Ordering::Equal,
            SortKey::Votes => b.num_votes.cmp(&a.num_votes),
            SortKey::Popularity => b
                .popularity
                .partial_cmp(&a.popularity)
                .unwrap_or(Ordering::Equal),
            SortKey::Modified => b.last_modified.cmp(&a.last_modified),
        };
        primary.then_with(|| a.name.cmp(&b.name))
    });
}

/// Run a search against the AUR
pub async fn search(client: &AurClient, query: &SearchQuery) -> SlurpyResult<Vec<AurPackage>> {
    let raw = client.search(query.field(), query.primary_term()).await?;
    let raw_count = raw.len();
    let results = query.apply(raw);
    debug!(raw = raw_count, kept = results.len(), "search results filtered");

    if results.is_empty() {
        return Err(SlurpyError::NoResults {
            query: query.display(),
        });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aur::client::tests::sample_package;

    fn pkg(name: &str, desc: &str, votes: u32, popularity: f64) -> AurPackage {
        let mut p = sample_package(name, "1.0-1");
        p.description = Some(desc.to_string());
        p.num_votes = votes;
        p.popularity = popularity;
        p
    }

    fn terms(t: &[&str]) -> Vec<String> {
        t.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_primary_term_is_longest() {
        let q = SearchQuery::new(terms(&["vim", "plugin", "colors"]), SearchField::NameDesc, SortKey::Name).unwrap();
        assert_eq!(q.primary_term(), "plugin");
    }

    #[test]
    fn test_rejects_short_and_empty_terms() {
        assert!(SearchQuery::new(terms(&["x"]), SearchField::NameDesc, SortKey::Name).is_err());
        assert!(SearchQuery::new(terms(&[" ", ""]), SearchField::NameDesc, SortKey::Name).is_err());
        // a short extra term is fine as long as the server term is long enough
        assert!(SearchQuery::new(terms(&["x", "vim"]), SearchField::NameDesc, SortKey::Name).is_ok());
    }

    #[test]
    fn test_all_terms_must_match() {
        let q = SearchQuery::new(terms(&["vim", "Theme"]), SearchField::NameDesc, SortKey::Name).unwrap();
        assert!(q.matches(&pkg("vim-gruvbox", "A retro groove color theme", 0, 0.0)));
        assert!(!q.matches(&pkg("vim-fugitive", "Git wrapper", 0, 0.0)));
    }

    #[test]
    fn test_name_field_ignores_description() {
        let q = SearchQuery::new(terms(&["theme"]), SearchField::Name, SortKey::Name).unwrap();
        assert!(!q.matches(&pkg("vim-gruvbox", "A retro groove color theme", 0, 0.0)));
        assert!(q.matches(&pkg("gtk-theme-foo", "", 0, 0.0)));
    }

    #[test]
    fn test_other_fields_trust_server_for_primary() {
        let q = SearchQuery::new(terms(&["someone", "vim"]), SearchField::Maintainer, SortKey::Name).unwrap();
        assert!(q.matches(&pkg("vim-foo", "", 0, 0.0)));
        assert!(!q.matches(&pkg("emacs-foo", "", 0, 0.0)));
    }

    #[test]
    fn test_sorting() {
        let mut pkgs = vec![
            pkg("b", "", 10, 0.5),
            pkg("a", "", 10, 2.0),
            pkg("c", "", 50, 0.1),
        ];

        sort_packages(&mut pkgs, SortKey::Name);
        let names: Vec<_> = pkgs.iter().map(|p| p.name.clone()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);

        sort_packages(&mut pkgs, SortKey::Votes);
        let names: Vec<_> = pkgs.iter().map(|p| p.name.clone()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);

        sort_packages(&mut pkgs, SortKey::Popularity);
        let names: Vec<_> = pkgs.iter().map(|p| p.name.clone()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_apply_filters_then_sorts() {
        let q = SearchQuery::new(terms(&["lib"]), SearchField::NameDesc, SortKey::Votes).unwrap();
        let results = q.apply(vec![
            pkg("zlib-ng", "", 5, 0.0),
            pkg("other", "unrelated", 100, 0.0),
            pkg("libfoo", "", 20, 0.0),
        ]);
        let names: Vec<_> = results.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["libfoo", "zlib-ng"]);
    }
}
