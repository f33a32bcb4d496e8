// SPDX-License-Identifier: GPL-3.0-only

use crate::error::{PartError, Result};

/// Extract the 0-based table slot from a partition path such as "/dev/sda3".
///
/// The trailing run of digits and dashes is read like `atoi` would: an
/// optional leading dash, then digits up to the first non-digit. Numbers that
/// come out as zero or negative are rejected, as are paths without digits.
pub fn partition_slot(partition_path: &str) -> Result<usize> {
    let invalid = || {
        PartError::InvalidInput(format!(
            "Invalid partition path given: '{}'. Cannot extract partition number",
            partition_path
        ))
    };

    let tail_len = partition_path
        .bytes()
        .rev()
        .take_while(|b| b.is_ascii_digit() || *b == b'-')
        .count();
    let tail = &partition_path[partition_path.len() - tail_len..];

    let (negative, digits) = match tail.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, tail),
    };
    let digits: String = digits.chars().take_while(char::is_ascii_digit).collect();

    let number: u64 = digits.parse().map_err(|_| invalid())?;
    if negative || number == 0 {
        return Err(invalid());
    }

    usize::try_from(number - 1).map_err(|_| invalid())
}
