// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Human readable byte counts.

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;

/// Scale byte count to the largest fitting binary unit.
///
/// Plain bytes are printed without a fractional part, while KB, MB, and GB
/// get exactly one decimal place, e.g., `1536` becomes `"1.5KB"`.
pub fn format_size(bytes: u64) -> String {
    match bytes {
        b if b >= GB => format!("{:.1}GB", b as f64 / GB as f64),
        b if b >= MB => format!("{:.1}MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.1}KB", b as f64 / KB as f64),
        b => format!("{b}B"),
    }
}
