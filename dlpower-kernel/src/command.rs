//! Intents and the vendor command language
//!
//! The `uom` tool addresses outlets purely by position, so every command is
//! built from a relay's index in the current inventory.

use crate::error::UsageError;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

/// Fixed query listing every outlet as JSON
pub const LIST_OUTLETS: &str = "uom get relay/outlets";

/// What the operator asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Intent {
    #[default]
    Query,
    On,
    Off,
    Cycle,
}

impl FromStr for Intent {
    type Err = UsageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "query" => Ok(Intent::Query),
            "on" => Ok(Intent::On),
            "off" => Ok(Intent::Off),
            "cycle" => Ok(Intent::Cycle),
            other => Err(UsageError::UnknownIntent(other.to_string())),
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Intent::Query => "query",
            Intent::On => "on",
            Intent::Off => "off",
            Intent::Cycle => "cycle",
        })
    }
}

impl Intent {
    /// Remote command for the outlet at `index`; `None` for a query
    pub fn command_for(self, index: usize) -> Option<String> {
        let path = format!("relay/outlets/{}", index);
        let words: Vec<String> = match self {
            Intent::Query => return None,
            Intent::On => vec!["uom".into(), "set".into(), format!("{}/transient_state", path), "true".into()],
            Intent::Off => vec!["uom".into(), "set".into(), format!("{}/transient_state", path), "false".into()],
            Intent::Cycle => vec!["uom".into(), "invoke".into(), format!("{}/cycle", path)],
        };
        Some(shell_words::join(words))
    }
}

/// Relay-name filter: filter terms OR-ed into one regular expression
#[derive(Debug, Clone)]
pub struct NameFilter {
    regex: Regex,
}

impl NameFilter {
    /// No terms matches every name
    pub fn from_terms<S: AsRef<str>>(terms: &[S]) -> Result<Self, UsageError> {
        let pattern = if terms.is_empty() {
            ".*".to_string()
        } else {
            terms.iter().map(AsRef::as_ref).collect::<Vec<_>>().join("|")
        };

        let regex = Regex::new(&pattern).map_err(|source| UsageError::InvalidFilter {
            pattern: pattern.clone(),
            source,
        })?;
        Ok(Self { regex })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_parsing() {
        assert_eq!("on".parse::<Intent>().unwrap(), Intent::On);
        assert_eq!("off".parse::<Intent>().unwrap(), Intent::Off);
        assert_eq!("cycle".parse::<Intent>().unwrap(), Intent::Cycle);
        assert_eq!("query".parse::<Intent>().unwrap(), Intent::Query);
        assert!(matches!("reboot".parse::<Intent>(), Err(UsageError::UnknownIntent(s)) if s == "reboot"));
    }

    #[test]
    fn test_commands_use_index() {
        assert_eq!(
            Intent::On.command_for(3).as_deref(),
            Some("uom set relay/outlets/3/transient_state true")
        );
        assert_eq!(
            Intent::Off.command_for(0).as_deref(),
            Some("uom set relay/outlets/0/transient_state false")
        );
        assert_eq!(Intent::Cycle.command_for(7).as_deref(), Some("uom invoke relay/outlets/7/cycle"));
        assert_eq!(Intent::Query.command_for(1), None);
    }

    #[test]
    fn test_empty_filter_matches_all() {
        let filter = NameFilter::from_terms::<&str>(&[]).unwrap();
        assert!(filter.matches("t510"));
        assert!(filter.matches(""));
        assert_eq!(filter.as_str(), ".*");
    }

    #[test]
    fn test_terms_are_alternation() {
        let filter = NameFilter::from_terms(&["a", "b"]).unwrap();
        assert!(filter.matches("lab"));
        assert!(filter.matches("bench"));
        assert!(filter.matches("a"));
        assert!(!filter.matches("t510"));
        assert!(!filter.matches("router"));
    }

    #[test]
    fn test_terms_are_regexes() {
        let filter = NameFilter::from_terms(&["^t5[0-9]+$"]).unwrap();
        assert!(filter.matches("t510"));
        assert!(!filter.matches("xt510"));
    }

    #[test]
    fn test_invalid_filter() {
        let err = NameFilter::from_terms(&["(unclosed"]).unwrap_err();
        assert!(matches!(err, UsageError::InvalidFilter { .. }));
    }
}
