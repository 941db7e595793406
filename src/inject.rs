//! Splices page assets into rendered HTML.
//!
//! Every rule is a single replacement at the first literal occurrence of its
//! anchor (`<body>`, `</head>` or `</body>`). HTML outside those points is
//! left untouched, and a missing anchor leaves the page unchanged for that
//! rule.

use serde::{Deserialize, Serialize};

/// Default URL of the runtime glue.
pub const GLUE_URL: &str = "/wasm_exec.js";

/// URL of the dev-mode HMR client.
pub const HMR_CLIENT_URL: &str = "/__hmr/client.js";

/// Attribute prefix for scoped styles: `data-<prefix>-<scope>`.
pub const SCOPE_PREFIX: &str = "islet";

/// One compiled module as referenced from a page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WasmAsset {
    pub hash: String,
    /// URL of the `.wasm` artifact.
    pub wasm_path: String,
    /// URL of the loader script.
    pub loader_path: String,
}

#[derive(Debug, Clone)]
pub struct AssetInjector {
    pub dev: bool,
    pub glue_url: String,
    pub scope_prefix: String,
}

impl Default for AssetInjector {
    fn default() -> Self {
        Self {
            dev: false,
            glue_url: GLUE_URL.to_string(),
            scope_prefix: SCOPE_PREFIX.to_string(),
        }
    }
}

/// Inserts `tag` and a newline right before the first `anchor`.
pub fn insert_before(html: &str, anchor: &str, tag: &str) -> String {
    html.replacen(anchor, &format!("{}\n{}", tag, anchor), 1)
}

pub fn script_tag(src: &str) -> String {
    format!(r#"<script src="{}"></script>"#, src)
}

pub fn module_script_tag(src: &str) -> String {
    format!(r#"<script type="module" src="{}"></script>"#, src)
}

pub fn stylesheet_tag(href: &str) -> String {
    format!(r#"<link rel="stylesheet" href="{}">"#, href)
}

/// Drops repeated loaders, keeping first occurrences in order.
pub fn dedup_assets(assets: &[WasmAsset]) -> Vec<&WasmAsset> {
    let mut seen = std::collections::HashSet::new();
    assets
        .iter()
        .filter(|asset| seen.insert(asset.loader_path.as_str()))
        .collect()
}

impl AssetInjector {
    pub fn new(dev: bool) -> Self {
        Self {
            dev,
            ..Self::default()
        }
    }

    pub fn with_glue_url(mut self, url: impl Into<String>) -> Self {
        self.glue_url = url.into();
        self
    }

    pub fn scope_attr(&self, scope_id: &str) -> String {
        format!("data-{}-{}", self.scope_prefix, scope_id)
    }

    pub fn inject(
        &self,
        html: &str,
        css_url: Option<&str>,
        js_url: Option<&str>,
        scope_id: Option<&str>,
        wasm_assets: &[WasmAsset],
    ) -> String {
        let mut html = html.to_string();

        if let Some(scope_id) = scope_id.filter(|s| !s.is_empty()) {
            html = html.replacen("<body>", &format!("<body {}>", self.scope_attr(scope_id)), 1);
        }

        if self.dev {
            html = insert_before(&html, "</head>", &script_tag(HMR_CLIENT_URL));
        }

        if let Some(css_url) = css_url.filter(|s| !s.is_empty()) {
            html = insert_before(&html, "</head>", &stylesheet_tag(css_url));
        }

        let loaders = dedup_assets(wasm_assets);
        if !loaders.is_empty() {
            html = insert_before(&html, "</body>", &script_tag(&self.glue_url));
            for asset in loaders {
                html = insert_before(&html, "</body>", &script_tag(&asset.loader_path));
            }
        }

        if let Some(js_url) = js_url.filter(|s| !s.is_empty()) {
            html = insert_before(&html, "</body>", &module_script_tag(js_url));
        }

        html
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PAGE: &str = "<html><head><title>t</title></head><body><h1>Hi</h1></body></html>";

    fn asset(hash: &str) -> WasmAsset {
        WasmAsset {
            hash: hash.to_string(),
            wasm_path: format!("/_assets/wasm/script-{}.wasm", hash),
            loader_path: format!("/_assets/script-{}-loader.js", hash),
        }
    }

    #[test]
    fn test_no_assets_leaves_html_unchanged() {
        let injector = AssetInjector::default();
        assert_eq!(injector.inject(PAGE, None, None, None, &[]), PAGE);
    }

    #[test]
    fn test_full_injection_order() {
        let injector = AssetInjector::new(true);
        let html = injector.inject(
            PAGE,
            Some("/_assets/styles-1.css"),
            Some("/_assets/script-2.js"),
            Some("abc123"),
            &[asset("aaaaaaaa"), asset("bbbbbbbb")],
        );
        let expected = concat!(
            "<html><head><title>t</title>",
            "<script src=\"/__hmr/client.js\"></script>\n",
            "<link rel=\"stylesheet\" href=\"/_assets/styles-1.css\">\n",
            "</head><body data-islet-abc123><h1>Hi</h1>",
            "<script src=\"/wasm_exec.js\"></script>\n",
            "<script src=\"/_assets/script-aaaaaaaa-loader.js\"></script>\n",
            "<script src=\"/_assets/script-bbbbbbbb-loader.js\"></script>\n",
            "<script type=\"module\" src=\"/_assets/script-2.js\"></script>\n",
            "</body></html>"
        );
        assert_eq!(html, expected);
    }

    #[test]
    fn test_duplicate_loader_is_emitted_once() {
        let injector = AssetInjector::default();
        let html = injector.inject(PAGE, None, None, None, &[asset("aaaaaaaa"), asset("aaaaaaaa")]);
        assert_eq!(html.matches("script-aaaaaaaa-loader.js").count(), 1);
        assert_eq!(html.matches("wasm_exec.js").count(), 1);
    }

    #[test]
    fn test_only_first_anchor_is_used() {
        let html = "<head></head><body>a</body><template><body></body></template>";
        let injector = AssetInjector::default();
        let out = injector.inject(html, None, None, Some("s1"), &[asset("cccccccc")]);
        assert_eq!(out.matches("data-islet-s1").count(), 1);
        assert!(out.ends_with("<template><body></body></template>"));
    }

    #[test]
    fn test_missing_anchor_is_a_noop() {
        let injector = AssetInjector::default();
        let html = "<p>fragment</p>";
        assert_eq!(injector.inject(html, Some("/a.css"), Some("/a.js"), Some("x"), &[asset("a")]), html);
    }

    #[test]
    fn test_custom_glue_url() {
        let injector = AssetInjector::default().with_glue_url("../wasm_exec.js");
        let html = injector.inject(PAGE, None, None, None, &[asset("dddddddd")]);
        assert!(html.contains("<script src=\"../wasm_exec.js\"></script>"));
    }
}
