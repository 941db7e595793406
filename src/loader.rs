//! Browser loader scripts for compiled modules.

const LOADER_TEMPLATE: &str = include_str!("runtime/js/loader.js");
const URL_PLACEHOLDER: &str = "\"__WASM_URL__\"";
const MODULE_PLACEHOLDER: &str = "\"__MODULE_ID__\"";

/// The dev-mode client that applies reload messages in the page.
pub const HMR_RUNTIME: &str = include_str!("runtime/js/hmr-runtime.js");

/// Registry key under which the loader records a module.
pub fn registry_key(wasm_url: &str) -> String {
    wasm_url.replace('/', "_")
}

/// File name of the loader for `hash`.
pub fn loader_file_name(hash: &str) -> String {
    format!("script-{}-loader.js", hash)
}

fn js_string(value: &str) -> String {
    // A JSON string is a valid JS string literal; `</` is split so the
    // value cannot close an inline script tag.
    serde_json::to_string(value)
        .unwrap_or_else(|_| "\"\"".to_string())
        .replace("</", "<\\/")
}

/// Loader script for the module served at `wasm_url`.
///
/// The script returns early when the registry already holds the module,
/// instantiates it with a cache-busting query (fetched relative to the
/// loader's own URL when the page exposes it), runs it with the runtime
/// glue, and records `instance`, `glue` and a `cleanup` hook under
/// [`registry_key`].
pub fn loader(wasm_url: &str, module_id: &str) -> String {
    LOADER_TEMPLATE
        .replacen(URL_PLACEHOLDER, &js_string(wasm_url), 1)
        .replacen(MODULE_PLACEHOLDER, &js_string(module_id), 1)
}
