//! Extract Sandbox CLI
//!
//! Single-shot mode:
//!   extract-sandbox <resource-path> [public-path]
//!
//! Reads the generated unit at <resource-path>, resolves its requires from
//! the surrounding directory and prints the extracted string to stdout.
//! Registered dependencies are listed on stderr.

use anyhow::{anyhow, Result};
use extract_sandbox::{extract, ExtractOptions, FsLoaderContext};

fn print_usage() {
    eprintln!("Extract Sandbox - extracts exported strings from generated JS modules");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  extract-sandbox <resource-path> [public-path]");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  extract-sandbox ./dist/main.css.js");
    eprintln!("  extract-sandbox ./dist/main.css.js /assets/");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        return Err(anyhow!("Missing required arguments"));
    }

    let resource_path = &args[1];
    let public_path = args.get(2).map(|s| s.as_str()).unwrap_or("");

    let content = std::fs::read_to_string(resource_path)
        .map_err(|e| anyhow!("Failed to read '{}': {}", resource_path, e))?;

    let ctx = FsLoaderContext::new(resource_path, ExtractOptions::default())
        .with_default_public_path(public_path);

    let result = extract(&content, &ctx).await?;

    for dependency in ctx.dependencies() {
        eprintln!("[extract-sandbox] dependency: {}", dependency.display());
    }

    println!("{}", result);

    Ok(())
}
