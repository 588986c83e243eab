//! Sandbox runtime - evaluates generated JS in fresh V8 isolates.
//!
//! Two sandbox shapes:
//! - top level: `module`, `exports` and a `require` hook that either defers
//!   the import (returning a placeholder) or runs a css-loader helper
//!   natively inside the same isolate
//! - nested: `module` and the `__webpack_public_path__` global only, with
//!   no `require` at all
//!
//! Every evaluation owns its isolate exclusively and drops it on return.
//! Nothing from the host is reachable besides the require op.

use crate::placeholder::PlaceholderToken;
use anyhow::{anyhow, Error};
use deno_core::{op2, JsRuntime, OpState, RuntimeOptions};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Requires that resolve into css-loader's helper files are executed
/// natively instead of being deferred. Requests carrying a loader prefix
/// (anything with a `!`) never match.
static CSS_HELPER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[^!]*node_modules[/\\]css-loader[/\\].*\.js$")
        .expect("css-loader helper pattern is valid")
});

/// Outcome of one top-level evaluation.
#[derive(Debug)]
pub(crate) struct EvaluatedUnit {
    /// `module.exports.toString()` with placeholders still in place.
    pub exported: String,
    /// Deferred requests, as written, in encounter order. Not deduplicated:
    /// each occurrence maps to one placeholder.
    pub requests: Vec<String>,
    /// css-loader helper files imported natively during evaluation.
    pub helper_dependencies: Vec<PathBuf>,
}

/// Per-evaluation state behind the require op.
struct RequireState {
    resource_dir: PathBuf,
    token: PlaceholderToken,
    requests: Vec<String>,
    helper_dependencies: Vec<PathBuf>,
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum RequireOutcome {
    /// Import deferred; the placeholder stands in for the result.
    Deferred { placeholder: String },
    /// css-loader helper; the sandbox executes `source` immediately.
    Native { source: String },
}

#[op2]
#[serde]
fn op_require(state: &mut OpState, #[string] request: &str) -> Result<RequireOutcome, Error> {
    let state = state.borrow_mut::<RequireState>();
    let resolved = state.resource_dir.join(request);
    let resolved = resolved.to_string_lossy();
    let resolved = resolved.split('?').next().unwrap_or_default();

    if CSS_HELPER.is_match(resolved) {
        let path = PathBuf::from(resolved);
        let source = std::fs::read_to_string(&path)
            .map_err(|e| anyhow!("cannot import css-loader helper '{}': {}", path.display(), e))?;
        state.helper_dependencies.push(path);
        return Ok(RequireOutcome::Native { source });
    }

    let placeholder = state.token.for_index(state.requests.len());
    state.requests.push(request.to_string());
    Ok(RequireOutcome::Deferred { placeholder })
}

deno_core::extension!(extract_runtime, ops = [op_require]);

// CommonJS-style wrapper for the top level. The require binding goes
// through op_require; helper sources returned by the op are executed in
// place so the generated code receives the helper's real exports.
const UNIT_OPEN: &str = r#"(() => {
    const __extract_require__ = (request) => {
        const outcome = Deno.core.ops.op_require(String(request));
        if (outcome.kind === "native") {
            const helper = { exports: {} };
            new Function("module", "exports", "require", outcome.source)(
                helper,
                helper.exports,
                __extract_require__,
            );
            return helper.exports;
        }
        return outcome.placeholder;
    };
    const module = { exports: {} };
    (function (module, exports, require) {
"#;

const UNIT_CLOSE: &str = r#"
    })(module, module.exports, __extract_require__);
    return module.exports.toString();
})()"#;

// Wrapper for nested modules: `module` only. `exports` and `require` are
// deliberately unbound so any further import attempt throws.
const MODULE_OPEN: &str = r#"(() => {
    const module = {};
    (function (module) {
"#;

const MODULE_CLOSE: &str = r#"
    })(module);
    return module.exports.toString();
})()"#;

/// Runs a generated unit in the import-interceptable sandbox and returns
/// the exported string together with everything the require hook recorded.
pub(crate) fn evaluate_unit(
    content: &str,
    resource_path: &Path,
    token: PlaceholderToken,
) -> Result<EvaluatedUnit, Error> {
    let resource_dir = resource_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    let mut runtime = JsRuntime::new(RuntimeOptions {
        extensions: vec![extract_runtime::init_ops()],
        ..Default::default()
    });
    runtime.op_state().borrow_mut().put(RequireState {
        resource_dir,
        token,
        requests: Vec::new(),
        helper_dependencies: Vec::new(),
    });

    let exported = run_to_string(&mut runtime, format!("{UNIT_OPEN}{content}{UNIT_CLOSE}"))?;

    let state = runtime.op_state().borrow_mut().take::<RequireState>();
    Ok(EvaluatedUnit {
        exported,
        requests: state.requests,
        helper_dependencies: state.helper_dependencies,
    })
}

/// Runs a loaded module in the stricter sandbox. Modules at this level are
/// required to reduce to a plain string without further imports.
pub(crate) fn evaluate_module(source: &str, public_path: &str) -> Result<String, Error> {
    let mut runtime = JsRuntime::new(RuntimeOptions::default());

    let prelude = format!(
        "globalThis.__webpack_public_path__ = {};",
        serde_json::to_string(public_path)?
    );
    runtime.execute_script("<extract:prelude>", prelude)?;

    run_to_string(&mut runtime, format!("{MODULE_OPEN}{source}{MODULE_CLOSE}"))
}

fn run_to_string(runtime: &mut JsRuntime, script: String) -> Result<String, Error> {
    let value = runtime.execute_script("<extract>", script)?;
    let scope = &mut runtime.handle_scope();
    let local = deno_core::v8::Local::new(scope, value);
    if local.is_string() {
        Ok(local.to_rust_string_lossy(scope))
    } else {
        Err(anyhow!("module did not evaluate to a string export"))
    }
}
