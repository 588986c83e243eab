//! Top-level extractor and nested reducer.
//!
//! `extract` runs the generated unit once, loads everything the unit
//! deferred (dispatched in parallel, joined in request order), reduces each
//! loaded module to a string and substitutes the results into the exported
//! text. `reduce` is the per-module reduction step; it is synchronous and
//! offers no import mechanism at all.

use crate::context::LoaderContext;
use crate::error::ExtractError;
use crate::placeholder::PlaceholderToken;
use crate::runtime;
use futures::future::try_join_all;

/// Transforms one generated unit into its final flat string.
///
/// Fails with the first error encountered at any stage; no partial result
/// is ever produced.
pub async fn extract<C>(content: &str, ctx: &C) -> Result<String, ExtractError>
where
    C: LoaderContext + ?Sized,
{
    let public_path = match &ctx.options().public_path {
        Some(path) => path.clone(),
        None => ctx.default_public_path().to_string(),
    };
    ctx.cacheable();

    let token = PlaceholderToken::new();
    let unit = runtime::evaluate_unit(content, ctx.resource_path(), token.clone()).map_err(
        |source| ExtractError::Evaluation {
            file: ctx.resource_path().display().to_string(),
            source,
        },
    )?;

    // Helper files imported natively are not seen by load_module, so the
    // host's watcher has to be told about them here.
    for path in &unit.helper_dependencies {
        ctx.add_dependency(path);
    }

    // All loads are dispatched at once; completion order is irrelevant
    // because try_join_all yields results in request order.
    let sources = try_join_all(unit.requests.iter().map(|request| async move {
        ctx.load_module(request)
            .await
            .map_err(|source| ExtractError::Load {
                request: request.clone(),
                source,
            })
    }))
    .await?;

    let results = sources
        .iter()
        .zip(&unit.requests)
        .map(|(source, request)| reduce(source, request, &public_path))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(token.substitute(&unit.exported, &results))
}

/// Reduces one loaded module to its exported string.
///
/// Modules at this level are contractually self-contained: there is no
/// `require` in scope, so any further import attempt throws. `filename` is
/// only used for diagnostics.
pub fn reduce(source: &str, filename: &str, public_path: &str) -> Result<String, ExtractError> {
    runtime::evaluate_module(source, public_path).map_err(|source| ExtractError::Reduction {
        request: filename.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExtractOptions;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::cell::{Cell, RefCell};
    use std::collections::{HashMap, VecDeque};
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    enum Load {
        Source { source: String, delay_ms: u64 },
        Fail(String),
    }

    struct MockContext {
        resource_path: PathBuf,
        options: ExtractOptions,
        default_public_path: String,
        loads: RefCell<HashMap<String, VecDeque<Load>>>,
        requested: RefCell<Vec<String>>,
        dependencies: RefCell<Vec<PathBuf>>,
        cacheable: Cell<bool>,
    }

    impl MockContext {
        fn new() -> Self {
            Self {
                resource_path: PathBuf::from("/project/src/main.css.js"),
                options: ExtractOptions::default(),
                default_public_path: String::new(),
                loads: RefCell::new(HashMap::new()),
                requested: RefCell::new(Vec::new()),
                dependencies: RefCell::new(Vec::new()),
                cacheable: Cell::new(false),
            }
        }

        fn with_module(self, request: &str, source: &str) -> Self {
            self.with_delayed_module(request, source, 0)
        }

        fn with_delayed_module(self, request: &str, source: &str, delay_ms: u64) -> Self {
            self.loads
                .borrow_mut()
                .entry(request.to_string())
                .or_default()
                .push_back(Load::Source {
                    source: source.to_string(),
                    delay_ms,
                });
            self
        }

        fn with_failing_module(self, request: &str, message: &str) -> Self {
            self.loads
                .borrow_mut()
                .entry(request.to_string())
                .or_default()
                .push_back(Load::Fail(message.to_string()));
            self
        }
    }

    #[async_trait(?Send)]
    impl LoaderContext for MockContext {
        fn cacheable(&self) {
            self.cacheable.set(true);
        }

        fn resource_path(&self) -> &Path {
            &self.resource_path
        }

        fn options(&self) -> &ExtractOptions {
            &self.options
        }

        fn default_public_path(&self) -> &str {
            &self.default_public_path
        }

        fn add_dependency(&self, path: &Path) {
            self.dependencies.borrow_mut().push(path.to_path_buf());
        }

        async fn load_module(&self, request: &str) -> Result<String> {
            self.requested.borrow_mut().push(request.to_string());
            let load = self
                .loads
                .borrow_mut()
                .get_mut(request)
                .and_then(|queue| queue.pop_front())
                .ok_or_else(|| anyhow!("unexpected load: {}", request))?;
            match load {
                Load::Source { source, delay_ms } => {
                    if delay_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    }
                    Ok(source)
                }
                Load::Fail(message) => Err(anyhow!(message)),
            }
        }
    }

    #[tokio::test]
    async fn passes_plain_strings_through_untouched() {
        let ctx = MockContext::new();

        let result = extract("module.exports = \"body { color: red; }\";", &ctx)
            .await
            .unwrap();

        assert_eq!(result, "body { color: red; }");
        assert!(ctx.cacheable.get());
        assert!(ctx.requested.borrow().is_empty());
    }

    #[tokio::test]
    async fn substitutes_a_single_import() {
        let ctx = MockContext::new().with_module("./x.css", "module.exports = \"X\";");

        let result = extract(
            "module.exports = \"pre-\" + require(\"./x.css\") + \"-post\";",
            &ctx,
        )
        .await
        .unwrap();

        assert_eq!(result, "pre-X-post");
    }

    #[tokio::test]
    async fn keeps_request_order_when_loads_finish_out_of_order() {
        let ctx = MockContext::new()
            .with_delayed_module("./r1.css", "module.exports = \"one\";", 50)
            .with_module("./r2.css", "module.exports = \"two\";");

        let result = extract(
            "module.exports = require(\"./r1.css\") + \"|\" + require(\"./r2.css\");",
            &ctx,
        )
        .await
        .unwrap();

        assert_eq!(result, "one|two");
    }

    #[tokio::test]
    async fn repeated_requests_load_and_reduce_independently() {
        let ctx = MockContext::new()
            .with_module("./x.css", "module.exports = \"first\";")
            .with_module("./x.css", "module.exports = \"second\";");

        let result = extract(
            "module.exports = require(\"./x.css\") + require(\"./x.css\");",
            &ctx,
        )
        .await
        .unwrap();

        assert_eq!(result, "firstsecond");
        assert_eq!(*ctx.requested.borrow(), vec!["./x.css", "./x.css"]);
    }

    #[tokio::test]
    async fn css_loader_helpers_bypass_the_load_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let helper_dir = dir.path().join("node_modules/css-loader/lib");
        std::fs::create_dir_all(&helper_dir).unwrap();
        std::fs::write(
            helper_dir.join("css-base.js"),
            "module.exports = function (path) { return \"<\" + path + \">\"; };",
        )
        .unwrap();

        let mut ctx = MockContext::new();
        ctx.resource_path = dir.path().join("main.css.js");

        let result = extract(
            "var toUrl = require(\"./node_modules/css-loader/lib/css-base.js\");\nmodule.exports = toUrl(\"a.png\");",
            &ctx,
        )
        .await
        .unwrap();

        assert_eq!(result, "<a.png>");
        assert!(ctx.requested.borrow().is_empty());
        assert_eq!(ctx.dependencies.borrow().len(), 1);
    }

    #[tokio::test]
    async fn evaluation_failures_fail_the_whole_extraction() {
        let ctx = MockContext::new();

        let err = extract("throw new Error(\"bad generated code\");", &ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractError::Evaluation { .. }));
        assert!(err.to_string().contains("bad generated code"));
    }

    #[tokio::test]
    async fn load_failures_fail_the_whole_extraction() {
        let ctx = MockContext::new()
            .with_module("./good.css", "module.exports = \"ok\";")
            .with_failing_module("./bad.css", "module not found: ./bad.css");

        let err = extract(
            "module.exports = require(\"./good.css\") + require(\"./bad.css\");",
            &ctx,
        )
        .await
        .unwrap_err();

        match err {
            ExtractError::Load { request, source } => {
                assert_eq!(request, "./bad.css");
                assert!(source.to_string().contains("module not found"));
            }
            other => panic!("expected a load error, got: {other}"),
        }
    }

    #[tokio::test]
    async fn reduction_failures_fail_the_whole_extraction() {
        let ctx =
            MockContext::new().with_module("./broken.css", "throw new Error(\"broken module\");");

        let err = extract("module.exports = require(\"./broken.css\");", &ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractError::Reduction { .. }));
        assert!(err.to_string().contains("./broken.css"));
    }

    #[tokio::test]
    async fn nested_modules_cannot_defer_further_imports() {
        let ctx = MockContext::new()
            .with_module("./outer.css", "module.exports = require(\"./inner.css\");");

        let err = extract("module.exports = require(\"./outer.css\");", &ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractError::Reduction { .. }));
    }

    #[tokio::test]
    async fn option_overrides_the_default_public_path() {
        let mut ctx = MockContext::new().with_module(
            "./img.css",
            "module.exports = __webpack_public_path__ + \"logo.png\";",
        );
        ctx.default_public_path = "/default/".to_string();
        ctx.options.public_path = Some("/cdn/".to_string());

        let result = extract("module.exports = require(\"./img.css\");", &ctx)
            .await
            .unwrap();

        assert_eq!(result, "/cdn/logo.png");
    }

    #[tokio::test]
    async fn falls_back_to_the_pipeline_public_path() {
        let mut ctx = MockContext::new().with_module(
            "./img.css",
            "module.exports = __webpack_public_path__ + \"logo.png\";",
        );
        ctx.default_public_path = "/default/".to_string();

        let result = extract("module.exports = require(\"./img.css\");", &ctx)
            .await
            .unwrap();

        assert_eq!(result, "/default/logo.png");
    }

    #[test]
    fn reduce_returns_the_exported_string() {
        let result = reduce("module.exports = \"plain\";", "./plain.css", "").unwrap();
        assert_eq!(result, "plain");
    }
}
