//! Parser for the server's long (`LIST`) directory format.
//!
//! The mirror answers with fixed-width Unix-style lines. Only two columns
//! matter: the size field at characters 29..41 and the name from character 54
//! to the end of the line.

use tracing::{debug, warn};

use crate::inventory::SizeMap;

const SIZE_COLUMNS: std::ops::Range<usize> = 29..41;
const NAME_START: usize = 54;

/// Parse a long listing into a filename → size map.
///
/// Zero-sized entries (directories on this server) are left out. Lines whose
/// size field is not an integer are skipped.
pub fn parse_size_listing(listing: &str) -> SizeMap {
    let mut sizes = SizeMap::new();

    for line in listing.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let chars: Vec<char> = line.chars().collect();
        let size_field = column(&chars, SIZE_COLUMNS.start, SIZE_COLUMNS.end);
        let name = column(&chars, NAME_START, chars.len());

        let size: u64 = match size_field.parse() {
            Ok(size) => size,
            Err(_) => {
                warn!(line, "skipping listing line without a numeric size field");
                continue;
            }
        };
        if size == 0 || name.is_empty() {
            debug!(line, "skipping empty listing entry");
            continue;
        }
        sizes.insert(name, size);
    }

    sizes
}

fn column(chars: &[char], start: usize, end: usize) -> String {
    let end = end.min(chars.len());
    if start >= end {
        return String::new();
    }
    chars[start..end].iter().collect::<String>().trim().to_string()
}
