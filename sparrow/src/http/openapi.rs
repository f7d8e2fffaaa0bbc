//! Assembles the `/v1alpha1/openapi` document from each live probe's
//! [`Probe::schema`](crate::probe::Probe::schema).

use std::collections::HashMap;

use common::ProbeKind;
use serde_json::{json, Value};

pub fn document(schemas: &HashMap<ProbeKind, Value>) -> Value {
    let mut paths = serde_json::Map::new();
    for (kind, schema) in schemas {
        paths.insert(
            format!("/checks/{kind}"),
            json!({
                "get": {
                    "summary": format!("Most recent result for the {kind} check"),
                    "responses": {
                        "200": {
                            "description": "Most recent result",
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "type": "object",
                                        "properties": {
                                            "data": schema,
                                            "timestamp": { "type": "string", "format": "date-time" },
                                            "error": { "type": "string", "nullable": true }
                                        },
                                        "required": ["data", "timestamp"]
                                    }
                                }
                            }
                        },
                        "404": { "description": "No result has ever been stored for this check" }
                    }
                }
            }),
        );
    }

    json!({
        "openapi": "3.0.3",
        "info": { "title": "Sparrow check results", "version": "v1alpha1" },
        "paths": Value::Object(paths)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_schema_map_still_produces_a_valid_shell() {
        let doc = document(&HashMap::new());
        assert_eq!(doc["openapi"], "3.0.3");
        assert!(doc["paths"].as_object().unwrap().is_empty());
    }

    #[test]
    fn one_probe_yields_one_path() {
        let mut schemas = HashMap::new();
        schemas.insert(ProbeKind::Health, json!({"type": "object"}));
        let doc = document(&schemas);
        assert!(doc["paths"].as_object().unwrap().contains_key("/checks/health"));
    }
}
