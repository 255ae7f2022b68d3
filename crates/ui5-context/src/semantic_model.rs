//
// semantic_model.rs
//
// Framework type model built from api.json library descriptors
//

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use serde_json::Value;

use crate::version::framework::Framework;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryInfo {
    pub name: String,
    pub version: Option<String>,
    pub symbol_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Member {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: Option<String>,
    pub deprecated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSymbol {
    pub name: String,
    pub library: String,
    pub extends: Option<String>,
    pub is_abstract: bool,
    pub properties: Vec<Member>,
    pub aggregations: Vec<Member>,
    pub associations: Vec<Member>,
    pub events: Vec<Member>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnumSymbol {
    pub name: String,
    pub library: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NamespaceSymbol {
    pub name: String,
    pub library: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticModel {
    pub framework: Framework,
    pub version: String,
    pub is_fallback: bool,
    pub is_incorrect_version: bool,
    pub libraries: BTreeMap<String, LibraryInfo>,
    pub classes: BTreeMap<String, ClassSymbol>,
    pub enums: BTreeMap<String, EnumSymbol>,
    pub namespaces: BTreeMap<String, NamespaceSymbol>,
}

impl SemanticModel {
    pub fn class(&self, name: &str) -> Option<&ClassSymbol> {
        self.classes.get(name)
    }

    /// The class followed by its ancestors, stopping at the first unknown or
    /// already visited name.
    pub fn ancestry(&self, name: &str) -> Vec<&ClassSymbol> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.classes.get(name);
        while let Some(class) = current {
            if !seen.insert(class.name.as_str()) {
                break;
            }
            chain.push(class);
            current = class
                .extends
                .as_deref()
                .and_then(|parent| self.classes.get(parent));
        }
        chain
    }

    /// Own and inherited properties, nearest declaration first.
    pub fn all_properties(&self, name: &str) -> Vec<&Member> {
        self.ancestry(name)
            .into_iter()
            .flat_map(|class| class.properties.iter())
            .collect()
    }
}

/// Inputs for one model build
#[derive(Debug, Clone, Default)]
pub struct ModelInput {
    pub framework: Framework,
    pub version: String,
    pub is_fallback: bool,
    pub is_incorrect_version: bool,
    /// (library name, api.json content)
    pub descriptors: Vec<(String, Value)>,
}

/// Build the model from whatever descriptors were obtained. Never fails;
/// unknown symbol kinds and malformed entries are skipped.
pub fn build_semantic_model(input: ModelInput) -> SemanticModel {
    let mut model = SemanticModel {
        framework: input.framework,
        version: input.version,
        is_fallback: input.is_fallback,
        is_incorrect_version: input.is_incorrect_version,
        ..Default::default()
    };

    for (library, descriptor) in &input.descriptors {
        let symbols = descriptor
            .get("symbols")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        model.libraries.insert(
            library.clone(),
            LibraryInfo {
                name: library.clone(),
                version: descriptor
                    .get("version")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                symbol_count: symbols.len(),
            },
        );

        for symbol in symbols {
            let (Some(kind), Some(name)) = (
                symbol.get("kind").and_then(Value::as_str),
                symbol.get("name").and_then(Value::as_str),
            ) else {
                continue;
            };
            match kind {
                "class" => {
                    model
                        .classes
                        .insert(name.to_string(), class_symbol(name, library, symbol));
                }
                "enum" => {
                    model.enums.insert(
                        name.to_string(),
                        EnumSymbol {
                            name: name.to_string(),
                            library: library.clone(),
                            values: symbol
                                .get("properties")
                                .and_then(Value::as_array)
                                .map(|values| {
                                    values
                                        .iter()
                                        .filter_map(|v| v.get("name").and_then(Value::as_str))
                                        .map(str::to_string)
                                        .collect()
                                })
                                .unwrap_or_default(),
                        },
                    );
                }
                "namespace" => {
                    model.namespaces.insert(
                        name.to_string(),
                        NamespaceSymbol {
                            name: name.to_string(),
                            library: library.clone(),
                        },
                    );
                }
                _ => {}
            }
        }
    }

    log::debug!(
        "Built {} {} model: {} libraries, {} classes, {} enums",
        model.framework,
        model.version,
        model.libraries.len(),
        model.classes.len(),
        model.enums.len()
    );
    model
}

fn class_symbol(name: &str, library: &str, symbol: &Value) -> ClassSymbol {
    let metadata = symbol.get("ui5-metadata");
    let members = |key: &str| -> Vec<Member> {
        metadata
            .and_then(|m| m.get(key))
            .and_then(Value::as_array)
            .map(|entries| entries.iter().filter_map(member).collect())
            .unwrap_or_default()
    };
    ClassSymbol {
        name: name.to_string(),
        library: library.to_string(),
        extends: symbol
            .get("extends")
            .and_then(Value::as_str)
            .map(str::to_string),
        is_abstract: symbol
            .get("abstract")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        properties: members("properties"),
        aggregations: members("aggregations"),
        associations: members("associations"),
        events: members("events"),
    }
}

fn member(entry: &Value) -> Option<Member> {
    Some(Member {
        name: entry.get("name")?.as_str()?.to_string(),
        type_name: entry
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string),
        deprecated: entry.get("deprecated").is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn core_descriptor() -> Value {
        json!({
            "library": "sap.ui.core",
            "version": "1.120.0",
            "symbols": [
                {"kind": "namespace", "name": "sap.ui.core"},
                {
                    "kind": "class",
                    "name": "sap.ui.core.Control",
                    "abstract": true,
                    "ui5-metadata": {
                        "properties": [{"name": "visible", "type": "boolean"}],
                        "aggregations": [{"name": "tooltip", "type": "sap.ui.core.TooltipBase"}]
                    }
                }
            ]
        })
    }

    fn m_descriptor() -> Value {
        json!({
            "library": "sap.m",
            "symbols": [
                {
                    "kind": "class",
                    "name": "sap.m.Button",
                    "extends": "sap.ui.core.Control",
                    "ui5-metadata": {
                        "properties": [
                            {"name": "text", "type": "string"},
                            {"name": "activeIcon", "type": "sap.ui.core.URI", "deprecated": {"since": "1.30"}}
                        ],
                        "events": [{"name": "press"}]
                    }
                },
                {
                    "kind": "enum",
                    "name": "sap.m.ButtonType",
                    "properties": [{"name": "Accept"}, {"name": "Reject"}]
                },
                {"kind": "typedef", "name": "sap.m.Ignored"},
                {"name": "no.kind"}
            ]
        })
    }

    #[test]
    fn test_build_collects_symbols() {
        let model = build_semantic_model(ModelInput {
            framework: Framework::SapUi5,
            version: "1.120.0".into(),
            descriptors: vec![
                ("sap.ui.core".into(), core_descriptor()),
                ("sap.m".into(), m_descriptor()),
            ],
            ..Default::default()
        });

        assert_eq!(model.libraries.len(), 2);
        assert_eq!(model.libraries["sap.ui.core"].version.as_deref(), Some("1.120.0"));
        assert_eq!(model.classes.len(), 2);
        assert!(model.class("sap.ui.core.Control").unwrap().is_abstract);
        assert_eq!(model.enums["sap.m.ButtonType"].values, vec!["Accept", "Reject"]);
        assert!(model.namespaces.contains_key("sap.ui.core"));

        let button = model.class("sap.m.Button").unwrap();
        assert_eq!(button.events[0].name, "press");
        assert!(button.properties[1].deprecated);
    }

    #[test]
    fn test_inherited_properties() {
        let model = build_semantic_model(ModelInput {
            descriptors: vec![
                ("sap.ui.core".into(), core_descriptor()),
                ("sap.m".into(), m_descriptor()),
            ],
            ..Default::default()
        });
        let names: Vec<_> = model
            .all_properties("sap.m.Button")
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["text", "activeIcon", "visible"]);
    }

    #[test]
    fn test_cyclic_extends_terminates() {
        let descriptor = json!({"symbols": [
            {"kind": "class", "name": "a.A", "extends": "a.B"},
            {"kind": "class", "name": "a.B", "extends": "a.A"}
        ]});
        let model = build_semantic_model(ModelInput {
            descriptors: vec![("a".into(), descriptor)],
            ..Default::default()
        });
        assert_eq!(model.ancestry("a.A").len(), 2);
    }

    #[test]
    fn test_partial_descriptor_set_still_builds() {
        let model = build_semantic_model(ModelInput {
            framework: Framework::OpenUi5,
            version: "1.96.0".into(),
            is_incorrect_version: true,
            descriptors: vec![("sap.m".into(), json!({}))],
            ..Default::default()
        });
        assert_eq!(model.libraries["sap.m"].symbol_count, 0);
        assert!(model.is_incorrect_version);
        assert!(model.classes.is_empty());
    }
}
