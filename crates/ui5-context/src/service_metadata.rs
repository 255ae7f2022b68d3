//
// service_metadata.rs
//
// OData metadata engine: parse EDMX metadata, merge annotation files and
// convert the result into the service model consumed by editor features
//

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde::Serialize;

/// Converted OData service model for one data source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDetails {
    /// Unified service path (`/segment/.../`)
    pub path: String,
    pub converted_metadata: ConvertedMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertedMetadata {
    pub namespace: String,
    pub odata_version: String,
    /// Keyed by fully qualified name
    pub entity_types: BTreeMap<String, EntityType>,
    pub entity_sets: BTreeMap<String, EntitySet>,
    /// target -> fully qualified term -> value
    pub annotations: BTreeMap<String, BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityType {
    pub name: String,
    pub fully_qualified_name: String,
    pub keys: Vec<String>,
    pub properties: Vec<Property>,
    pub navigation_properties: Vec<NavigationProperty>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub name: String,
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationProperty {
    pub name: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySet {
    pub name: String,
    pub entity_type: String,
}

/// Inputs of one service merge
pub struct ServiceInput<'a> {
    pub path: &'a str,
    pub metadata_content: Option<&'a str>,
    /// (source file, content) in declaration order
    pub annotation_contents: &'a [(PathBuf, String)],
}

/// Attributes that carry an annotation's constant value, in lookup order.
const VALUE_ATTRIBUTES: &[&str] = &[
    "String",
    "Bool",
    "EnumMember",
    "Path",
    "PropertyPath",
    "AnnotationPath",
    "Int",
    "Decimal",
];

/// Parse metadata, merge annotation files and convert.
///
/// Returns `None` when no metadata content is available or it cannot be
/// parsed. A malformed annotation file is logged and skipped.
pub fn parse_and_merge_service(input: ServiceInput<'_>) -> Option<ServiceDetails> {
    let content = input.metadata_content?;
    let mut converted = match parse_metadata(content) {
        Ok(converted) => converted,
        Err(message) => {
            log::warn!("Failed to parse metadata for service {}: {}", input.path, message);
            return None;
        }
    };

    for (source, annotation_content) in input.annotation_contents {
        match parse_annotations(annotation_content) {
            Ok(annotations) => merge_annotations(&mut converted.annotations, annotations),
            Err(message) => {
                log::warn!("Skipping annotation file {}: {}", source.display(), message);
            }
        }
    }

    Some(ServiceDetails {
        path: input.path.to_string(),
        converted_metadata: converted,
    })
}

fn merge_annotations(
    target: &mut BTreeMap<String, BTreeMap<String, String>>,
    source: BTreeMap<String, BTreeMap<String, String>>,
) {
    for (annotated, terms) in source {
        target.entry(annotated).or_default().extend(terms);
    }
}

fn parse_metadata(content: &str) -> Result<ConvertedMetadata, String> {
    let doc = roxmltree::Document::parse(content).map_err(|e| e.to_string())?;
    let root = doc.root_element();
    if root.tag_name().name() != "Edmx" {
        return Err(format!("expected Edmx root, found {}", root.tag_name().name()));
    }

    let aliases = collect_aliases(&doc);
    let mut converted = ConvertedMetadata {
        odata_version: root.attribute("Version").unwrap_or("4.0").to_string(),
        ..ConvertedMetadata::default()
    };

    for schema in doc.descendants().filter(|n| is_element(n, "Schema")) {
        let namespace = schema.attribute("Namespace").unwrap_or_default();
        if converted.namespace.is_empty() {
            converted.namespace = namespace.to_string();
        }

        for entity_type in schema.children().filter(|n| is_element(n, "EntityType")) {
            let parsed = parse_entity_type(&entity_type, namespace);
            converted
                .entity_types
                .insert(parsed.fully_qualified_name.clone(), parsed);
        }

        for container in schema.children().filter(|n| is_element(n, "EntityContainer")) {
            for set in container.children().filter(|n| is_element(n, "EntitySet")) {
                let Some(name) = set.attribute("Name") else {
                    continue;
                };
                let entity_type = expand_alias(set.attribute("EntityType").unwrap_or_default(), &aliases);
                converted.entity_sets.insert(
                    name.to_string(),
                    EntitySet {
                        name: name.to_string(),
                        entity_type,
                    },
                );
            }
        }
    }

    converted.annotations = annotations_of(&doc, &aliases);
    Ok(converted)
}

fn parse_annotations(content: &str) -> Result<BTreeMap<String, BTreeMap<String, String>>, String> {
    let doc = roxmltree::Document::parse(content).map_err(|e| e.to_string())?;
    let aliases = collect_aliases(&doc);
    Ok(annotations_of(&doc, &aliases))
}

fn parse_entity_type(node: &roxmltree::Node<'_, '_>, namespace: &str) -> EntityType {
    let name = node.attribute("Name").unwrap_or_default().to_string();
    let keys = node
        .children()
        .filter(|n| is_element(n, "Key"))
        .flat_map(|key| key.children().filter(|n| is_element(n, "PropertyRef")))
        .filter_map(|prop_ref| prop_ref.attribute("Name").map(str::to_string))
        .collect();
    let properties = node
        .children()
        .filter(|n| is_element(n, "Property"))
        .filter_map(|prop| {
            Some(Property {
                name: prop.attribute("Name")?.to_string(),
                type_name: prop.attribute("Type").unwrap_or_default().to_string(),
            })
        })
        .collect();
    let navigation_properties = node
        .children()
        .filter(|n| is_element(n, "NavigationProperty"))
        .filter_map(|nav| {
            Some(NavigationProperty {
                name: nav.attribute("Name")?.to_string(),
                // V4 carries Type, V2 carries ToRole
                target: nav
                    .attribute("Type")
                    .or_else(|| nav.attribute("ToRole"))
                    .unwrap_or_default()
                    .to_string(),
            })
        })
        .collect();

    EntityType {
        fully_qualified_name: if namespace.is_empty() {
            name.clone()
        } else {
            format!("{namespace}.{name}")
        },
        name,
        keys,
        properties,
        navigation_properties,
    }
}

fn annotations_of(
    doc: &roxmltree::Document<'_>,
    aliases: &HashMap<String, String>,
) -> BTreeMap<String, BTreeMap<String, String>> {
    let mut result: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    for block in doc.descendants().filter(|n| is_element(n, "Annotations")) {
        let Some(target) = block.attribute("Target") else {
            continue;
        };
        let target = expand_alias(target, aliases);
        for annotation in block.children().filter(|n| is_element(n, "Annotation")) {
            let Some(term) = annotation.attribute("Term") else {
                continue;
            };
            let mut term = expand_alias(term, aliases);
            if let Some(qualifier) = annotation.attribute("Qualifier") {
                term = format!("{term}#{qualifier}");
            }
            result
                .entry(target.clone())
                .or_default()
                .insert(term, annotation_value(&annotation));
        }
    }
    result
}

fn annotation_value(node: &roxmltree::Node<'_, '_>) -> String {
    VALUE_ATTRIBUTES
        .iter()
        .find_map(|attr| node.attribute(*attr))
        .map(str::to_string)
        .or_else(|| {
            node.text()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_default()
}

/// Alias -> namespace from `edmx:Include` and `Schema Alias=...` declarations.
fn collect_aliases(doc: &roxmltree::Document<'_>) -> HashMap<String, String> {
    doc.descendants()
        .filter(|n| is_element(n, "Include") || is_element(n, "Schema"))
        .filter_map(|n| {
            Some((
                n.attribute("Alias")?.to_string(),
                n.attribute("Namespace")?.to_string(),
            ))
        })
        .collect()
}

/// `UI.LineItem` -> `com.sap.vocabularies.UI.v1.LineItem`; `SALES.Order/Id` likewise.
fn expand_alias(name: &str, aliases: &HashMap<String, String>) -> String {
    let (head, rest) = match name.find(['.', '/']) {
        Some(idx) if name[idx..].starts_with('.') => (&name[..idx], &name[idx..]),
        _ => return name.to_string(),
    };
    match aliases.get(head) {
        Some(namespace) => format!("{namespace}{rest}"),
        None => name.to_string(),
    }
}

fn is_element(node: &roxmltree::Node<'_, '_>, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name
}

#[cfg(test)]
mod tests {
    use super::*;

    const METADATA: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<edmx:Edmx Version="4.0" xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx">
  <edmx:Reference Uri="https://sap.github.io/odata-vocabularies/vocabularies/UI.xml">
    <edmx:Include Namespace="com.sap.vocabularies.UI.v1" Alias="UI"/>
  </edmx:Reference>
  <edmx:DataServices>
    <Schema Namespace="SalesService" Alias="Sales" xmlns="http://docs.oasis-open.org/odata/ns/edm">
      <EntityContainer Name="EntityContainer">
        <EntitySet Name="Orders" EntityType="SalesService.Orders"/>
      </EntityContainer>
      <EntityType Name="Orders">
        <Key><PropertyRef Name="ID"/></Key>
        <Property Name="ID" Type="Edm.Guid" Nullable="false"/>
        <Property Name="amount" Type="Edm.Decimal"/>
        <NavigationProperty Name="customer" Type="SalesService.Customers"/>
      </EntityType>
      <Annotations Target="Sales.Orders/amount">
        <Annotation Term="Common.Label" String="Amount"/>
      </Annotations>
    </Schema>
  </edmx:DataServices>
</edmx:Edmx>"#;

    const ANNOTATIONS: &str = r#"<edmx:Edmx Version="4.0" xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx">
  <edmx:Reference Uri="/vocabularies/UI.xml">
    <edmx:Include Namespace="com.sap.vocabularies.UI.v1" Alias="UI"/>
  </edmx:Reference>
  <edmx:DataServices>
    <Schema xmlns="http://docs.oasis-open.org/odata/ns/edm" Namespace="local">
      <Annotations Target="SalesService.Orders">
        <Annotation Term="UI.HeaderInfo" Qualifier="main"/>
        <Annotation Term="UI.Hidden" Bool="true"/>
      </Annotations>
      <Annotations Target="SalesService.Orders/amount">
        <Annotation Term="Common.Label" String="Total"/>
      </Annotations>
    </Schema>
  </edmx:DataServices>
</edmx:Edmx>"#;

    #[test]
    fn test_parse_metadata_entities() {
        let details = parse_and_merge_service(ServiceInput {
            path: "/sales/",
            metadata_content: Some(METADATA),
            annotation_contents: &[],
        })
        .unwrap();
        let metadata = details.converted_metadata;
        assert_eq!(metadata.namespace, "SalesService");
        assert_eq!(metadata.odata_version, "4.0");
        let orders = metadata.entity_types.get("SalesService.Orders").unwrap();
        assert_eq!(orders.keys, vec!["ID".to_string()]);
        assert_eq!(orders.properties.len(), 2);
        assert_eq!(orders.navigation_properties[0].target, "SalesService.Customers");
        assert_eq!(
            metadata.entity_sets.get("Orders").unwrap().entity_type,
            "SalesService.Orders"
        );
        // Schema alias expanded
        assert_eq!(
            metadata.annotations["SalesService.Orders/amount"]["Common.Label"],
            "Amount"
        );
    }

    #[test]
    fn test_annotation_files_merge_and_override() {
        let annotations = vec![(PathBuf::from("annotation0.xml"), ANNOTATIONS.to_string())];
        let details = parse_and_merge_service(ServiceInput {
            path: "/sales/",
            metadata_content: Some(METADATA),
            annotation_contents: &annotations,
        })
        .unwrap();
        let annotations = details.converted_metadata.annotations;
        let orders = &annotations["SalesService.Orders"];
        assert!(orders.contains_key("com.sap.vocabularies.UI.v1.HeaderInfo#main"));
        assert_eq!(orders["com.sap.vocabularies.UI.v1.Hidden"], "true");
        assert_eq!(annotations["SalesService.Orders/amount"]["Common.Label"], "Total");
    }

    #[test]
    fn test_malformed_annotation_file_is_skipped() {
        let annotations = vec![
            (PathBuf::from("broken.xml"), "<edmx:Edmx".to_string()),
            (PathBuf::from("ok.xml"), ANNOTATIONS.to_string()),
        ];
        let details = parse_and_merge_service(ServiceInput {
            path: "/sales/",
            metadata_content: Some(METADATA),
            annotation_contents: &annotations,
        })
        .unwrap();
        assert!(details
            .converted_metadata
            .annotations
            .contains_key("SalesService.Orders"));
    }

    #[test]
    fn test_absent_metadata_returns_none() {
        let annotations = vec![(PathBuf::from("ok.xml"), ANNOTATIONS.to_string())];
        assert!(parse_and_merge_service(ServiceInput {
            path: "/sales/",
            metadata_content: None,
            annotation_contents: &annotations,
        })
        .is_none());
    }

    #[test]
    fn test_non_edmx_metadata_returns_none() {
        assert!(parse_and_merge_service(ServiceInput {
            path: "/sales/",
            metadata_content: Some("<html/>"),
            annotation_contents: &[],
        })
        .is_none());
    }
}
