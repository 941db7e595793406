//! Page sources as seen by the pipeline.
//!
//! Full page parsing and rendering belong to the framework; the pipeline only
//! needs the frontmatter, the template, and the `<style>` and `<script>`
//! blocks. [`TagParser`] extracts those with regular expressions.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::LazyLock;

use crate::error::Result;

/// Language tag of scripts compiled to WebAssembly.
pub const SYSTEMS_LANGUAGE: &str = "go";

/// Language tag of scripts bundled as JavaScript.
pub const SCRIPT_LANGUAGE: &str = "javascript";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Script {
    pub language: String,
    pub content: String,
    pub is_module: bool,
}

impl Script {
    pub fn new(language: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            content: content.into(),
            is_module: false,
        }
    }

    pub fn is_wasm(&self) -> bool {
        self.language == SYSTEMS_LANGUAGE
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Style {
    pub content: String,
    pub scoped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Import {
    pub path: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Component {
    pub frontmatter: String,
    pub template: String,
    pub styles: Vec<Style>,
    pub scripts: Vec<Script>,
    pub imports: Vec<Import>,
}

impl Component {
    pub fn wasm_scripts(&self) -> impl Iterator<Item = &Script> {
        self.scripts.iter().filter(|s| s.is_wasm())
    }

    pub fn has_wasm(&self) -> bool {
        self.wasm_scripts().next().is_some()
    }
}

/// A page or endpoint known to the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// URL pattern, e.g. `/blog/post`.
    pub pattern: String,
    pub file_path: PathBuf,
    pub is_endpoint: bool,
}

impl Route {
    pub fn page(pattern: impl Into<String>, file_path: impl Into<PathBuf>) -> Self {
        Self {
            pattern: pattern.into(),
            file_path: file_path.into(),
            is_endpoint: false,
        }
    }
}

/// Turns page source text into a [`Component`].
pub trait PageParser: Send + Sync {
    fn parse(&self, source: &str) -> Result<Component>;
}

static FRONTMATTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\A---\r?\n(.*?)\r?\n---\r?\n?").expect("valid regex"));
static SCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<script(?:\s+([^>]*))?>(.+?)</script>").expect("valid regex")
});
static STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<style(?:\s+([^>]*))?>(.+?)</style>").expect("valid regex")
});
static IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"import\s+(?:(\w+)\s+from\s+)?['"](.*?)['"]"#).expect("valid regex")
});
static ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(\w[\w-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex")
});
static GO_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*import\s+(?:\(\s*$|(?:\w+\s+)?"[^"]+"\s*$)"#).expect("valid regex")
});

fn attr<'a>(attrs: &'a str, name: &str) -> Option<&'a str> {
    ATTR.captures_iter(attrs).find_map(|caps| {
        (caps.get(1)?.as_str() == name)
            .then(|| caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str()))
            .flatten()
    })
}

/// Guesses the language of an untagged script.
pub fn detect_language(content: &str) -> &'static str {
    if content.contains("js.Global")
        || content.contains(":=")
        || GO_IMPORT.is_match(content)
    {
        return SYSTEMS_LANGUAGE;
    }

    let js_score = ["import ", "export ", "const ", "let ", "console.log", "=>"]
        .iter()
        .filter(|p| content.contains(*p))
        .count();
    let go_score = ["func ", "package "]
        .iter()
        .filter(|p| content.contains(*p))
        .count();

    if js_score > go_score {
        SCRIPT_LANGUAGE
    } else {
        SYSTEMS_LANGUAGE
    }
}

/// Extracts frontmatter, scripts and styles with regular expressions.
///
/// A script's language comes from a `lang` attribute, then from
/// `type="module"` or `type="javascript"`, then from [`detect_language`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TagParser;

impl TagParser {
    fn imports(frontmatter: &str) -> Vec<Import> {
        frontmatter
            .lines()
            .filter(|line| line.trim_start().starts_with("import"))
            .filter_map(|line| {
                let caps = IMPORT.captures(line)?;
                Some(Import {
                    path: caps.get(2)?.as_str().to_string(),
                    alias: caps.get(1).map(|m| m.as_str().to_string()),
                })
            })
            .collect()
    }
}

impl PageParser for TagParser {
    fn parse(&self, source: &str) -> Result<Component> {
        let mut component = Component::default();
        let mut rest = source.to_string();

        if let Some(caps) = FRONTMATTER.captures(source) {
            component.frontmatter = caps[1].trim().to_string();
            component.imports = Self::imports(&component.frontmatter);
            rest = FRONTMATTER.replace(source, "").into_owned();
        }

        for caps in SCRIPT.captures_iter(&rest) {
            let attrs = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let content = caps[2].trim().to_string();
            let kind = attr(attrs, "type");
            let is_module = kind == Some("module");
            let language = match attr(attrs, "lang") {
                Some(lang) => lang.to_string(),
                None if is_module || kind == Some("javascript") => SCRIPT_LANGUAGE.to_string(),
                None => detect_language(&content).to_string(),
            };
            component.scripts.push(Script { language, content, is_module });
        }
        rest = SCRIPT.replace_all(&rest, "").into_owned();

        for caps in STYLE.captures_iter(&rest) {
            let attrs = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            component.styles.push(Style {
                content: caps[2].trim().to_string(),
                scoped: attrs.split_whitespace().any(|a| a == "scoped" || a.starts_with("scoped=")),
            });
        }
        rest = STYLE.replace_all(&rest, "").into_owned();

        component.template = rest.trim().to_string();
        Ok(component)
    }
}
