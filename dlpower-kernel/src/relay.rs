//! Relay model for PDU outlets
//!
//! One `Relay` per outlet, built fresh on every discovery pass. The remote
//! tool replies with a JSON array of outlet records (or a bare object when
//! the PDU has a single outlet); `host` and `index` are stamped locally.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// One switchable outlet as reported by a PDU
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Relay {
    /// PDU alias that owns this outlet (not part of the remote reply)
    #[serde(skip_deserializing)]
    pub host: String,
    /// Position in the host's outlet list for the current discovery pass
    #[serde(skip_deserializing)]
    pub index: usize,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// Persistent (configured) state
    #[serde(default, deserialize_with = "null_as_default")]
    pub state: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub physical_state: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub transient_state: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub locked: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub critical: bool,
    /// Empty means no delay
    #[serde(default, deserialize_with = "delay_or_empty")]
    pub cycle_delay: String,
}

// null leaves the zero value, like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

// cycle_delay arrives as a string, null, or occasionally a bare number
fn delay_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}

/// Parse a "list outlets" reply and stamp each record with its host and
/// array position. A bare object is read as a one-outlet list.
pub fn parse_outlets(host: &str, raw: &[u8]) -> Result<Vec<Relay>, serde_json::Error> {
    let records = match raw.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'{') => vec![serde_json::from_slice::<Relay>(raw)?],
        _ => serde_json::from_slice::<Vec<Relay>>(raw)?,
    };

    Ok(records
        .into_iter()
        .enumerate()
        .map(|(index, mut relay)| {
            relay.host = host.to_string();
            relay.index = index;
            relay
        })
        .collect())
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}

impl Relay {
    pub fn cycle_delay_or_zero(&self) -> &str {
        if self.cycle_delay.is_empty() { "0" } else { &self.cycle_delay }
    }
}

/// Summary line: `pdu "t510" 0: state on physical on transient on locked off delay 0`
impl fmt::Display for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:?} {}: state {} physical {} transient {} locked {} delay {}",
            self.host,
            self.name,
            self.index,
            on_off(self.state),
            on_off(self.physical_state),
            on_off(self.transient_state),
            on_off(self.locked),
            self.cycle_delay_or_zero(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T510: &str = r#"[{"name":"t510","state":true,"physical_state":true,"transient_state":true,"locked":false,"critical":false,"cycle_delay":null}]"#;

    #[test]
    fn test_parse_single_outlet_array() {
        let relays = parse_outlets("pdu", T510.as_bytes()).unwrap();
        assert_eq!(relays.len(), 1);

        let relay = &relays[0];
        assert_eq!(relay.host, "pdu");
        assert_eq!(relay.index, 0);
        assert_eq!(relay.name, "t510");
        assert!(relay.state);
        assert!(relay.physical_state);
        assert!(!relay.locked);
        assert_eq!(relay.cycle_delay, "");
        assert_eq!(relay.cycle_delay_or_zero(), "0");
    }

    #[test]
    fn test_parse_bare_object() {
        let relays = parse_outlets("pdu2", br#"{"name":"lamp","locked":true,"cycle_delay":"5"}"#).unwrap();
        assert_eq!(relays.len(), 1);
        assert_eq!(relays[0].host, "pdu2");
        assert_eq!(relays[0].index, 0);
        assert!(relays[0].locked);
        assert!(!relays[0].state);
        assert_eq!(relays[0].cycle_delay, "5");
    }

    #[test]
    fn test_missing_and_unknown_fields_default() {
        let relays = parse_outlets("pdu", br#"[{"name":"a","firmware":"1.10"},{}]"#).unwrap();
        assert_eq!(relays.len(), 2);
        assert_eq!(relays[1].name, "");
        assert_eq!(relays[1].index, 1);
        assert!(!relays[1].critical);
    }

    #[test]
    fn test_numeric_cycle_delay() {
        let relays = parse_outlets("pdu", br#"[{"name":"a","cycle_delay":3}]"#).unwrap();
        assert_eq!(relays[0].cycle_delay, "3");
    }

    #[test]
    fn test_index_follows_array_position() {
        let raw = br#"[{"name":"x"},{"name":"y"},{"name":"x"}]"#;
        let relays = parse_outlets("pdu", raw).unwrap();
        let indices: Vec<usize> = relays.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_malformed_reply_is_an_error() {
        assert!(parse_outlets("pdu", b"uom: command not found").is_err());
        assert!(parse_outlets("pdu", br#"[{"name":5}]"#).is_err());
    }

    #[test]
    fn test_null_fields_take_zero_value() {
        let relays = parse_outlets("pdu", br#"[{"name":"a","locked":null},{"name":"b"}]"#).unwrap();
        assert_eq!(relays.len(), 2);
        assert!(!relays[0].locked);
        assert_eq!(relays[1].name, "b");

        let relays = parse_outlets("pdu", br#"[{"name":null,"state":true,"critical":null}]"#).unwrap();
        assert_eq!(relays[0].name, "");
        assert!(relays[0].state);
        assert!(!relays[0].critical);

        let relays = parse_outlets("pdu", br#" {"name":"lamp","transient_state":null}"#).unwrap();
        assert_eq!(relays[0].name, "lamp");
        assert!(!relays[0].transient_state);
    }

    #[test]
    fn test_parse_error_keeps_cause() {
        let err = parse_outlets("pdu", br#"[{"name":"a"},{"name":5}]"#).unwrap_err();
        assert!(err.to_string().contains("invalid type"), "{}", err);

        let err = parse_outlets("pdu", br#"{"locked":"yes"}"#).unwrap_err();
        assert!(err.to_string().contains("expected a boolean"), "{}", err);
    }

    #[test]
    fn test_render_is_stable() {
        let relays = parse_outlets("pdu", T510.as_bytes()).unwrap();
        let line = relays[0].to_string();
        assert_eq!(
            line,
            r#"pdu "t510" 0: state on physical on transient on locked off delay 0"#
        );

        let again: Vec<String> = parse_outlets("pdu", T510.as_bytes())
            .unwrap()
            .iter()
            .map(|r| r.to_string())
            .collect();
        assert_eq!(again, vec![line]);
    }
}
