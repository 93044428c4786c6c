pub mod protocols;
pub mod report;
pub mod run;

use std::str::FromStr;

use shotbench_core::ProtocolKind;

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Parse a comma-separated list, ignoring empty items.
pub fn parse_list<T: FromStr>(raw: &str, what: &str) -> Result<Vec<T>, String>
where
    T::Err: std::fmt::Display,
{
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<T>().map_err(|e| format!("invalid {what} '{s}': {e}")))
        .collect()
}

/// Parse a protocol filter: "all" or comma-separated ids.
pub fn parse_protocols(raw: &str) -> Result<Vec<ProtocolKind>, String> {
    if raw.trim().eq_ignore_ascii_case("all") {
        return Ok(ProtocolKind::ALL.to_vec());
    }
    parse_list(raw, "protocol")
}

/// Format a possibly undefined number for tables.
pub fn fmt_num(value: f64, precision: usize) -> String {
    if value.is_finite() {
        format!("{value:.precision$}")
    } else {
        "—".to_string()
    }
}

pub fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| "—".to_string(), |v| fmt_num(v, precision))
}
