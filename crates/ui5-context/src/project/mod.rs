//
// project/mod.rs
//
// Project and app resolution
//

pub mod cds;
pub mod discovery;
pub mod loader;
pub mod types;

pub use loader::ProjectLoader;
pub use types::{App, CapKind, CapProject, Project, ProjectInfo, ProjectKind, Ui5Project};
