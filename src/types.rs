use std::str::FromStr;
use serde::Deserialize;

/// Built-in strategy used to decide whether a task's outputs are current.
///
/// - `Hash`: compare content hashes of every dependency, target and
///   generated file against the previous run (default).
/// - `Timestamp`: compare modification times; no file is read, but the
///   result is only as reliable as the filesystem clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpToDatePolicy {
    Hash,
    Timestamp,
}

impl Default for UpToDatePolicy {
    fn default() -> Self {
        UpToDatePolicy::Hash
    }
}

impl FromStr for UpToDatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hash" => Ok(UpToDatePolicy::Hash),
            "timestamp" | "mtime" => Ok(UpToDatePolicy::Timestamp),
            other => Err(format!(
                "invalid up_to_date policy: {other} (expected \"hash\" or \"timestamp\")"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_policy_names() {
        assert_eq!("hash".parse::<UpToDatePolicy>(), Ok(UpToDatePolicy::Hash));
        assert_eq!(" MTime ".parse::<UpToDatePolicy>(), Ok(UpToDatePolicy::Timestamp));
        assert!("sometimes".parse::<UpToDatePolicy>().is_err());
    }
}
