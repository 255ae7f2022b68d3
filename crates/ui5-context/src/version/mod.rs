//
// version/mod.rs
//
// Framework version negotiation and descriptor retrieval
//

pub mod fetch;
pub mod framework;
pub mod library;
pub mod negotiator;
pub mod version_map;

pub use framework::{Framework, DEFAULT_UI5_VERSION};
pub use negotiator::{NegotiatedVersion, VersionNegotiator};
