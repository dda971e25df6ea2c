/*!
Builders de réponses `uom get relay/outlets`

Produit des enregistrements d'outlets au format JSON du PDU pour alimenter
le `MockSessionProvider` :

```ignore
let reply = outlets(&[outlet("t510").on().build(), outlet("fan").locked().build()]);
```
*/

use serde_json::{json, Map, Value};

/// One outlet record as the PDU reports it
#[derive(Debug, Clone)]
pub struct OutletBuilder {
    fields: Map<String, Value>,
}

/// Outlet record with every flag off and no cycle delay
pub fn outlet(name: &str) -> OutletBuilder {
    let mut fields = Map::new();
    fields.insert("name".into(), json!(name));
    for flag in ["state", "physical_state", "transient_state", "locked", "critical"] {
        fields.insert(flag.into(), json!(false));
    }
    fields.insert("cycle_delay".into(), Value::Null);
    OutletBuilder { fields }
}

impl OutletBuilder {
    /// Persistent, transient and physical state all on
    pub fn on(self) -> Self {
        self.flag("state", true)
            .flag("transient_state", true)
            .flag("physical_state", true)
    }

    pub fn locked(self) -> Self {
        self.flag("locked", true)
    }

    pub fn critical(self) -> Self {
        self.flag("critical", true)
    }

    pub fn cycle_delay(mut self, delay: &str) -> Self {
        self.fields.insert("cycle_delay".into(), json!(delay));
        self
    }

    pub fn flag(mut self, field: &str, value: bool) -> Self {
        self.fields.insert(field.into(), json!(value));
        self
    }

    /// Drop a field to mimic older firmware
    pub fn without(mut self, field: &str) -> Self {
        self.fields.remove(field);
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.fields)
    }
}

/// JSON array reply for a whole PDU
pub fn outlets(records: &[Value]) -> Value {
    Value::Array(records.to_vec())
}

/// Reply with `names.len()` outlets named in order, all off
pub fn named_outlets(names: &[&str]) -> Value {
    outlets(&names.iter().map(|n| outlet(n).build()).collect::<Vec<_>>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outlet_defaults() {
        let record = outlet("t510").build();
        assert_eq!(record["name"], "t510");
        assert_eq!(record["state"], false);
        assert!(record["cycle_delay"].is_null());
    }

    #[test]
    fn test_outlet_flags() {
        let record = outlet("fan").on().locked().cycle_delay("5").without("critical").build();
        assert_eq!(record["state"], true);
        assert_eq!(record["physical_state"], true);
        assert_eq!(record["locked"], true);
        assert_eq!(record["cycle_delay"], "5");
        assert!(record.get("critical").is_none());
    }

    #[test]
    fn test_named_outlets() {
        let reply = named_outlets(&["a", "b"]);
        assert_eq!(reply.as_array().map(Vec::len), Some(2));
        assert_eq!(reply[1]["name"], "b");
    }
}
