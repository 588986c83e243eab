//! # Extract Sandbox
//!
//! A transformation stage for module-bundling pipelines: takes generated
//! JavaScript that evaluates to a string, runs it in a sandboxed V8 isolate
//! via deno_core, resolves every module the code requires through the
//! host's loading facility, and produces the final flat string.
//!
//! ## Isolation guarantees
//!
//! - **Fresh isolate per evaluation**: nothing is shared between units
//! - **No filesystem access**: only css-loader helper files are readable
//! - **No network, env, or shell access**: the sandbox exposes a single op
//! - **Nested modules cannot import**: the second sandbox level has no
//!   `require` at all
//!
//! ## Usage
//!
//! ```rust,ignore
//! use extract_sandbox::{extract, ExtractOptions, FsLoaderContext};
//!
//! #[tokio::main]
//! async fn main() {
//!     let ctx = FsLoaderContext::new("./dist/main.css.js", ExtractOptions::default())
//!         .with_default_public_path("/assets/");
//!     let content = std::fs::read_to_string("./dist/main.css.js").unwrap();
//!
//!     let flat = extract(&content, &ctx).await.unwrap();
//!     println!("{flat}");
//! }
//! ```

mod context;
mod error;
mod extractor;
mod placeholder;
mod runtime;

pub use context::{ExtractOptions, FsLoaderContext, LoaderContext};
pub use error::ExtractError;
pub use extractor::{extract, reduce};
