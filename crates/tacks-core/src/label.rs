//! Deterministic label coloring: hash the label name into a fixed palette so
//! the same name resolves to the same color on any run, even after a full
//! state loss. No persisted name-to-color table exists or is needed.

use sha2::{Digest, Sha256};

/// The Trello label palette, in bucket order. The order is part of the
/// contract: `hash(name)[0] % PALETTE.len()` must stay stable across
/// releases or existing boards would recolor on upgrade.
pub const PALETTE: [&str; 10] = [
    "green", "yellow", "orange", "red", "purple", "blue", "sky", "lime", "pink", "black",
];

/// Pick the color for a label name.
#[must_use]
pub fn color_for(name: &str) -> &'static str {
    let digest = Sha256::digest(name.as_bytes());
    PALETTE[digest[0] as usize % PALETTE.len()]
}
