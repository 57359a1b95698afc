//! String formatting utilities.
//!
//! Helpers for rendering hashes and addresses in log lines and UI summaries.

/// Truncates an identifier for display, keeping the first 10 characters.
///
/// Long enough to keep the 0x prefix and the start of a hash recognizable
/// in log output.
pub fn truncate_id(id: &str) -> String {
	if id.len() <= 10 {
		id.to_string()
	} else {
		format!("{}..", &id[..10])
	}
}

/// Adds a "0x" prefix to a hex string if it doesn't already have one.
pub fn with_0x_prefix(hex_str: &str) -> String {
	if hex_str.len() >= 2 && hex_str[..2].eq_ignore_ascii_case("0x") {
		hex_str.to_string()
	} else {
		format!("0x{}", hex_str)
	}
}
