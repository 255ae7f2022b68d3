//! Deterministic fixture workspace generator for tests.
//!
//! Writes UI5 apps and CAP projects laid out the way the UI5 and CDS tooling
//! generate them. All output is deterministic so tests can assert on exact
//! paths, ids and service contents.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::project::cds::CompiledServices;

/// EDMX of the sample service
pub const SALES_METADATA: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<edmx:Edmx Version="4.0" xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx">
  <edmx:DataServices>
    <Schema Namespace="SalesService" xmlns="http://docs.oasis-open.org/odata/ns/edm">
      <EntityContainer Name="EntityContainer">
        <EntitySet Name="Orders" EntityType="SalesService.Orders"/>
      </EntityContainer>
      <EntityType Name="Orders">
        <Key><PropertyRef Name="ID"/></Key>
        <Property Name="ID" Type="Edm.Guid" Nullable="false"/>
        <Property Name="amount" Type="Edm.Decimal"/>
      </EntityType>
    </Schema>
  </edmx:DataServices>
</edmx:Edmx>"#;

/// Local annotation file for the sample service
pub const SALES_ANNOTATIONS: &str = r#"<edmx:Edmx Version="4.0" xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx">
  <edmx:DataServices>
    <Schema Namespace="local" xmlns="http://docs.oasis-open.org/odata/ns/edm">
      <Annotations Target="SalesService.Orders/amount">
        <Annotation Term="Common.Label" String="Amount"/>
      </Annotations>
    </Schema>
  </edmx:DataServices>
</edmx:Edmx>"#;

/// EDMX the CDS compiler would produce for the catalog service
pub const CATALOG_METADATA: &str = r#"<edmx:Edmx Version="4.0" xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx">
  <edmx:DataServices>
    <Schema Namespace="CatalogService" xmlns="http://docs.oasis-open.org/odata/ns/edm">
      <EntityContainer Name="EntityContainer">
        <EntitySet Name="Books" EntityType="CatalogService.Books"/>
      </EntityContainer>
      <EntityType Name="Books">
        <Key><PropertyRef Name="ID"/></Key>
        <Property Name="ID" Type="Edm.Int32" Nullable="false"/>
        <Property Name="title" Type="Edm.String"/>
      </EntityType>
    </Schema>
  </edmx:DataServices>
</edmx:Edmx>"#;

pub const CATALOG_SERVICE_PATH: &str = "/odata/v4/catalog/";
pub const SALES_SERVICE_PATH: &str = "/sap/opu/odata/sap/SALES_SRV/";

const MAIN_VIEW: &str = r#"<mvc:View controllerName="{app}.controller.Main" xmlns:mvc="sap.ui.core.mvc" xmlns="sap.m">
  <Page id="page" title="Main">
    <Button id="save" text="Save"/>
  </Page>
</mvc:View>
"#;

const CUSTOM_VIEW: &str = r#"<mvc:View xmlns:mvc="sap.ui.core.mvc" xmlns="sap.m">
  <Panel id="customPanel"/>
</mvc:View>
"#;

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .unwrap_or_else(|e| panic!("Failed to create {}: {}", parent.display(), e));
    }
    std::fs::write(path, content)
        .unwrap_or_else(|e| panic!("Failed to write fixture file {}: {}", path.display(), e));
}

/// Paths of a generated UI5 app
#[derive(Debug, Clone)]
pub struct Ui5AppFixture {
    pub root: PathBuf,
    pub app_id: String,
    pub manifest: PathBuf,
    pub yaml: PathBuf,
    pub metadata: PathBuf,
    pub annotation: PathBuf,
    pub main_view: PathBuf,
    pub custom_view: PathBuf,
}

fn ui5_manifest(app_id: &str, service_uri: &str, local: bool) -> String {
    let local_settings = if local {
        r#", "localUri": "localService/metadata.xml", "annotations": ["annotation"]"#
    } else {
        ""
    };
    format!(
        r#"{{
  "_version": "1.49.0",
  "sap.app": {{
    "id": "{app_id}",
    "type": "application",
    "dataSources": {{
      "mainService": {{
        "uri": "{service_uri}",
        "type": "OData",
        "settings": {{ "odataVersion": "4.0"{local_settings} }}
      }},
      "annotation": {{
        "type": "ODataAnnotation",
        "uri": "annotations/annotation.xml",
        "settings": {{ "localUri": "annotations/annotation.xml" }}
      }}
    }}
  }},
  "sap.ui5": {{
    "flexEnabled": true,
    "dependencies": {{ "minUI5Version": "1.108.0" }},
    "models": {{ "": {{ "dataSource": "mainService" }} }},
    "routing": {{
      "targets": {{
        "OrdersCustom": {{
          "type": "Component",
          "id": "OrdersCustom",
          "name": "sap.fe.core.fpm",
          "options": {{
            "settings": {{
              "viewName": "{app_id}.ext.view.Custom",
              "entitySet": "Orders"
            }}
          }}
        }}
      }}
    }}
  }}
}}
"#
    )
}

/// Generate a standalone UI5 app named `name` under `dir`.
///
/// `ui5_version` is written to `ui5.yaml` when given.
pub fn write_ui5_app(dir: &Path, name: &str, ui5_version: Option<&str>) -> Ui5AppFixture {
    let root = dir.join(name);
    let webapp = root.join("webapp");
    let app_id = format!("sample.{}", name.replace('-', ""));

    write(
        &root.join("package.json"),
        &format!(r#"{{"name": "{name}", "devDependencies": {{"@ui5/cli": "^3"}}}}"#),
    );

    let yaml = root.join("ui5.yaml");
    let mut yaml_content = format!("specVersion: \"3.0\"\nmetadata:\n  name: {name}\ntype: application\n");
    if let Some(version) = ui5_version {
        yaml_content.push_str(&format!("framework:\n  name: SAPUI5\n  version: \"{version}\"\n"));
    }
    write(&yaml, &yaml_content);

    let manifest = webapp.join("manifest.json");
    write(&manifest, &ui5_manifest(&app_id, SALES_SERVICE_PATH, true));

    let metadata = webapp.join("localService/metadata.xml");
    write(&metadata, SALES_METADATA);
    let annotation = webapp.join("annotations/annotation.xml");
    write(&annotation, SALES_ANNOTATIONS);

    let main_view = webapp.join("view/Main.view.xml");
    write(&main_view, &MAIN_VIEW.replace("{app}", &app_id));
    let custom_view = webapp.join("ext/view/Custom.view.xml");
    write(&custom_view, CUSTOM_VIEW);

    Ui5AppFixture {
        root,
        app_id,
        manifest,
        yaml,
        metadata,
        annotation,
        main_view,
        custom_view,
    }
}

/// Paths of a generated CAP project
#[derive(Debug, Clone)]
pub struct CapFixture {
    pub root: PathBuf,
    pub service_definition: PathBuf,
    pub package_json: PathBuf,
    /// (app root, manifest path, main view path) per app, in `apps` order
    pub apps: Vec<(PathBuf, PathBuf, PathBuf)>,
}

/// Generate a Node.js CAP project with one app per entry of `apps`, each
/// bound to the catalog service.
pub fn write_cap_project(dir: &Path, name: &str, apps: &[&str]) -> CapFixture {
    let root = dir.join(name);
    let package_json = root.join("package.json");
    write(
        &package_json,
        &format!(r#"{{"name": "{name}", "dependencies": {{"@sap/cds": "^7"}}}}"#),
    );
    let service_definition = root.join("srv/cat-service.cds");
    write(
        &service_definition,
        "using { sap.capire.bookshop as my } from '../db/schema';\nservice CatalogService {\n  entity Books as projection on my.Books;\n}\n",
    );

    let apps = apps
        .iter()
        .map(|app| {
            let app_root = root.join("app").join(app);
            let webapp = app_root.join("webapp");
            let app_id = format!("{}.{}", name.replace('-', ""), app);
            let manifest = webapp.join("manifest.json");
            write(&manifest, &ui5_manifest(&app_id, "odata/v4/catalog/", false));
            let main_view = webapp.join("view/Main.view.xml");
            write(&main_view, &MAIN_VIEW.replace("{app}", &app_id));
            (app_root, manifest, main_view)
        })
        .collect();

    CapFixture {
        root,
        service_definition,
        package_json,
        apps,
    }
}

/// Services the CDS compiler would report for a generated CAP project.
pub fn catalog_services() -> CompiledServices {
    let mut services = CompiledServices::default();
    services
        .services
        .insert(CATALOG_SERVICE_PATH.to_string(), CATALOG_METADATA.to_string());
    services
}

/// A temporary multi-app workspace: one standalone UI5 app pinned to a
/// framework version, and one CAP project with two apps.
pub struct FixtureWorkspace {
    pub dir: TempDir,
    pub ui5: Ui5AppFixture,
    pub cap: CapFixture,
}

impl FixtureWorkspace {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Returns a workspace that is removed when dropped.
pub fn create_fixture_workspace(ui5_version: Option<&str>) -> FixtureWorkspace {
    let dir = TempDir::new().expect("Failed to create temp directory for fixture workspace");
    let ui5 = write_ui5_app(dir.path(), "sales", ui5_version);
    let cap = write_cap_project(dir.path(), "bookshop", &["admin", "browse"]);
    FixtureWorkspace { dir, ui5, cap }
}
