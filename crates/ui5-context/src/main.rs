//
// main.rs
//
// Stdio language server entry point
//

use std::env;

fn print_usage() {
    println!(
        "ui5-context {}, a context engine for UI5 editor tooling.",
        env!("CARGO_PKG_VERSION")
    );
    print!(
        r#"
Usage: ui5-context [OPTIONS]

Available options:

--stdio                      Start the LSP server using stdio transport
--version                    Print the version
--help                       Print this help message

Set UI5_CONTEXT_PERF=1 (or verbose) to log timings of expensive operations.

"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut argv = env::args();
    argv.next(); // skip executable name

    let mut use_stdio = false;

    for arg in argv {
        match arg.as_str() {
            "--stdio" => use_stdio = true,
            "--version" => {
                println!("ui5-context {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" => {
                print_usage();
                return Ok(());
            }
            other => {
                return Err(anyhow::anyhow!("Unknown argument: '{other}'"));
            }
        }
    }

    if !use_stdio {
        print_usage();
        return Ok(());
    }

    env_logger::init();

    ui5_context::backend::start_lsp().await
}
