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

//! Package version comparison with the same ordering as pacman's `vercmp`.
//!
//! A version is `[epoch:]pkgver[-pkgrel]`. Epochs win outright, then
//! pkgver is compared segment by segment, and pkgrel only breaks ties when
//! both sides carry one.

use std::cmp::Ordering;

/// Split `[epoch:]version[-release]`
fn parse_evr(evr: &str) -> (&str, &str, Option<&str>) {
    let digits = evr.bytes().take_while(|b| b.is_ascii_digit()).count();

    let (epoch, rest) = if evr.as_bytes().get(digits) == Some(&b':') {
        let epoch = &evr[..digits];
        (if epoch.is_empty() { "0" } else { epoch }, &evr[digits + 1..])
    } else {
        ("0", evr)
    };

    match rest.rfind('-') {
        Some(pos) => (epoch, &rest[..pos], Some(&rest[pos + 1..])),
        None => (epoch, rest, None),
    }
}

/// Segment comparison used for each of epoch, pkgver and pkgrel
fn rpmvercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let one = a.as_bytes();
    let two = b.as_bytes();
    let (mut i, mut j) = (0, 0);
    // end of the previous segment on each side
    let (mut prev_i, mut prev_j) = (0, 0);

    while i < one.len() && j < two.len() {
        while i < one.len() && !one[i].is_ascii_alphanumeric() {
            i += 1;
        }
        while j < two.len() && !two[j].is_ascii_alphanumeric() {
            j += 1;
        }

        if i >= one.len() || j >= two.len() {
            break;
        }

        // differing separator runs decide on their own
        let (sep_one, sep_two) = (i - prev_i, j - prev_j);
        if sep_one != sep_two {
            return sep_one.cmp(&sep_two);
        }

        let (start_i, start_j) = (i, j);
        let numeric = one[i].is_ascii_digit();
        if numeric {
            while i < one.len() && one[i].is_ascii_digit() {
                i += 1;
            }
            while j < two.len() && two[j].is_ascii_digit() {
                j += 1;
            }
        } else {
            while i < one.len() && one[i].is_ascii_alphabetic() {
                i += 1;
            }
            while j < two.len() && two[j].is_ascii_alphabetic() {
                j += 1;
            }
        }
        prev_i = i;
        prev_j = j;

        // segment types differ: numeric beats alpha
        if start_j == j {
            return if numeric { Ordering::Greater } else { Ordering::Less };
        }

        let mut seg_one = &one[start_i..i];
        let mut seg_two = &two[start_j..j];

        if numeric {
            while seg_one.len() > 1 && seg_one[0] == b'0' {
                seg_one = &seg_one[1..];
            }
            while seg_two.len() > 1 && seg_two[0] == b'0' {
                seg_two = &seg_two[1..];
            }
            if seg_one.len() != seg_two.len() {
                return seg_one.len().cmp(&seg_two.len());
            }
        }

        match seg_one.cmp(seg_two) {
            Ordering::Equal => {}
            other => return other,
        }
    }

    let rest_one = &one[i..];
    let rest_two = &two[j..];
    if rest_one.is_empty() && rest_two.is_empty() {
        return Ordering::Equal;
    }

    // A trailing alpha segment never beats running out ("1.0a" < "1.0"),
    // anything else left over is newer ("1.0.1" > "1.0").
    let one_alpha = rest_one.first().map_or(false, |c| c.is_ascii_alphabetic());
    let two_alpha = rest_two.first().map_or(false, |c| c.is_ascii_alphabetic());
    if (rest_one.is_empty() && !two_alpha) || one_alpha {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

/// Compare two full package versions
pub fn vercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let (epoch_a, ver_a, rel_a) = parse_evr(a);
    let (epoch_b, ver_b, rel_b) = parse_evr(b);

    rpmvercmp(epoch_a, epoch_b)
        .then_with(|| rpmvercmp(ver_a, ver_b))
        .then_with(|| match (rel_a, rel_b) {
            (Some(ra), Some(rb)) => rpmvercmp(ra, rb),
            _ => Ordering::Equal,
        })
}
