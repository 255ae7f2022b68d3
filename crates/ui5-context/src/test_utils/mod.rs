//
// test_utils/mod.rs
//
// Scripted collaborators and fixture workspaces for tests
//

pub mod fixture_workspace;
pub mod mock_fetcher;
pub mod static_compiler;

pub use fixture_workspace::{
    create_fixture_workspace, write_cap_project, write_ui5_app, CapFixture, FixtureWorkspace,
    Ui5AppFixture,
};
pub use mock_fetcher::MockFetcher;
pub use static_compiler::StaticCompiler;
