//! Turns a loose inline script into a complete, compilable program.
//!
//! A script body may mix imports, a stray `package` clause, package-level
//! declarations, helper functions and bare statements. When the body has no
//! entry function of its own, the bare statements are moved into a
//! re-runnable `__isletRun` function and a synthesized entry point calls it,
//! registers it as the default hot-reload handler and then parks forever so
//! exported interop callbacks stay alive.
//!
//! Splitting is line based: braces and parentheses are counted per line and
//! string or comment contents are not inspected. A body that puts unbalanced
//! delimiters inside a literal can therefore be split wrongly. Only the entry
//! detection uses the literal-aware scanner in [`crate::scan`].

pub mod helpers;

use regex::Regex;
use std::sync::LazyLock;

use crate::scan;
use crate::toolchain::Backend;

pub use helpers::{helper_block, quote, HELPER_NAMES, MANUAL_FLAG};

/// Import path of the host interop package.
pub const INTEROP_MODULE: &str = "syscall/js";

/// Name of the synthesized, re-runnable function holding the bare statements.
pub const ENTRY_RUN: &str = "__isletRun";

static IMPORT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*import\s+(.+?)\s*$").expect("valid regex"));

static PACKAGE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*package\s+\w+\s*$").expect("valid regex"));

static INTEROP_USE: LazyLock<Regex> = LazyLock::new(|| {
    let helpers = HELPER_NAMES.join("|");
    Regex::new(&format!(r"\bjs\.|\b(?:{})\b", helpers)).expect("valid regex")
});

#[derive(Debug, Clone, Copy)]
pub struct PrepareOptions<'a> {
    /// Key for hot-reload state, usually the page file name.
    pub module_id: &'a str,
    /// Content hash of the raw script.
    pub hash: &'a str,
    pub backend: Backend,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedProgram {
    pub source: String,
    /// The body declared its own entry function and was emitted verbatim.
    pub user_entry: bool,
    /// The program imports the interop package and carries the HMR helpers.
    pub interop: bool,
}

/// Buckets of a body without its own entry function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitBody {
    pub variables: Vec<String>,
    pub functions: Vec<String>,
    pub executable: Vec<String>,
}

/// Separates import specs from the rest of the body.
///
/// Both single-line `import "x"` forms and grouped `import ( ... )` blocks
/// are recognized. Specs keep their original order.
pub fn extract_imports(script: &str) -> (Vec<String>, String) {
    let mut imports = Vec::new();
    let mut body = Vec::new();
    let mut in_group = false;

    for line in script.lines() {
        let trimmed = line.trim();
        if in_group {
            if trimmed == ")" {
                in_group = false;
            } else if !trimmed.is_empty() && !trimmed.starts_with("//") {
                imports.push(trimmed.to_string());
            }
            continue;
        }

        if let Some(caps) = IMPORT_LINE.captures(line) {
            let rest = caps[1].trim();
            if rest == "(" {
                in_group = true;
            } else if let Some(inner) = rest.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
                imports.extend(
                    inner
                        .split(';')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string),
                );
            } else {
                imports.push(rest.to_string());
            }
            continue;
        }

        body.push(line);
    }

    (imports, body.join("\n"))
}

/// Drops any `package <ident>` clause; the generated program always lives
/// in the synthesized package.
pub fn remove_package_decl(body: &str) -> String {
    body.lines()
        .filter(|line| !PACKAGE_LINE.is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Whether `body` touches host interop or any HMR helper.
pub fn needs_interop(body: &str) -> bool {
    INTEROP_USE.is_match(body)
}

fn names_interop(spec: &str) -> bool {
    spec.contains(&format!("\"{}\"", INTEROP_MODULE))
}

fn dedup_imports(imports: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    imports
        .into_iter()
        .filter(|spec| seen.insert(spec.clone()))
        .collect()
}

/// Which pair of delimiters closes a multi-line declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Delimiter {
    Brace,
    Paren,
}

/// Net depth change of `line` for `delimiter`, skipping string, rune and
/// line-comment contents. Raw strings spanning lines are not tracked.
fn delimiter_delta(line: &str, delimiter: Delimiter) -> i64 {
    let (open, close) = match delimiter {
        Delimiter::Brace => ('{', '}'),
        Delimiter::Paren => ('(', ')'),
    };
    let mut depth = 0;
    let mut quote: Option<char> = None;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            if c == '\\' && q != '`' {
                chars.next();
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '/' if chars.peek() == Some(&'/') => break,
            c if c == open => depth += 1,
            c if c == close => depth -= 1,
            _ => {}
        }
    }
    depth
}

/// Grouped `var (`, `const (` and `type (` blocks close on parentheses;
/// everything else follows braces.
fn block_delimiter(trimmed: &str, bucket: Bucket) -> Delimiter {
    let grouped = trimmed.strip_prefix(match bucket {
        Bucket::Variables if trimmed.starts_with("const") => "const",
        Bucket::Variables => "var",
        Bucket::Functions => "type",
    });
    match grouped {
        Some(rest) if rest.trim_start().starts_with('(') => Delimiter::Paren,
        _ => Delimiter::Brace,
    }
}

fn starts_with_keyword(trimmed: &str, keyword: &str) -> bool {
    trimmed
        .strip_prefix(keyword)
        .is_some_and(|rest| rest.starts_with(' ') || rest.starts_with('\t') || rest.starts_with('('))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Variables,
    Functions,
}

/// Splits a body into hoisted declarations and executable statements.
///
/// `var`/`const` lines go to variables, `func`/`type` declarations go to
/// functions (multi-line blocks are followed until their braces, or the
/// parentheses of a grouped declaration, balance), and every other
/// non-blank line is executable.
pub fn split_body(body: &str) -> SplitBody {
    let mut split = SplitBody::default();
    let mut open: Option<(Bucket, Delimiter, Vec<&str>, i64)> = None;

    let flush = |split: &mut SplitBody, bucket: Bucket, lines: Vec<&str>| {
        let block = lines.join("\n");
        match bucket {
            Bucket::Variables => split.variables.push(block),
            Bucket::Functions => split.functions.push(block),
        }
    };

    for line in body.lines() {
        if let Some((bucket, delimiter, mut lines, depth)) = open.take() {
            lines.push(line);
            let depth = depth + delimiter_delta(line, delimiter);
            if depth <= 0 {
                flush(&mut split, bucket, lines);
            } else {
                open = Some((bucket, delimiter, lines, depth));
            }
            continue;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let bucket = if trimmed.starts_with("func ") || starts_with_keyword(trimmed, "type") {
            Bucket::Functions
        } else if starts_with_keyword(trimmed, "var") || starts_with_keyword(trimmed, "const") {
            Bucket::Variables
        } else {
            split.executable.push(line.to_string());
            continue;
        };

        let delimiter = block_delimiter(trimmed, bucket);
        let depth = delimiter_delta(line, delimiter);
        if depth > 0 {
            open = Some((bucket, delimiter, vec![line], depth));
        } else {
            flush(&mut split, bucket, vec![line]);
        }
    }

    // An unbalanced trailing block is hoisted as written.
    if let Some((bucket, _, lines, _)) = open {
        flush(&mut split, bucket, lines);
    }

    split
}

/// Indents every non-blank line by one tab.
pub fn indent_code(code: &str) -> String {
    code.trim()
        .lines()
        .map(|line| {
            if line.trim().is_empty() {
                line.to_string()
            } else {
                format!("\t{}", line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Builds the complete program for one script.
///
/// A failed entry scan is not fatal: the body is treated as having no entry
/// function of its own.
pub fn prepare(script: &str, options: &PrepareOptions<'_>) -> PreparedProgram {
    let (imports, body) = extract_imports(script);
    let body = remove_package_decl(&body);

    let interop = needs_interop(&body);
    let mut imports = dedup_imports(imports);
    if !interop {
        // An unused import does not compile.
        imports.retain(|spec| !names_interop(spec));
    } else if !imports.iter().any(|spec| names_interop(spec)) {
        imports.insert(0, quote(INTEROP_MODULE));
    }

    let user_entry = match scan::declares_entry(&body) {
        Ok(found) => found,
        Err(err) => {
            tracing::warn!(module_id = options.module_id, %err, "entry scan failed, synthesizing entry");
            false
        }
    };
    tracing::debug!(
        module_id = options.module_id,
        hash = options.hash,
        user_entry,
        interop,
        imports = imports.len(),
        "preparing script"
    );

    let mut out = String::new();
    out.push_str(&format!(
        "// Code generated by islet for script {} ({} backend). DO NOT EDIT.\n\n",
        options.hash,
        options.backend.as_str()
    ));
    out.push_str("package main\n\n");

    if !imports.is_empty() {
        out.push_str("import (\n");
        for spec in &imports {
            out.push('\t');
            out.push_str(spec);
            out.push('\n');
        }
        out.push_str(")\n\n");
    }

    if interop {
        out.push_str(&helper_block(options.module_id));
        out.push('\n');
    }

    if user_entry {
        out.push_str(body.trim());
        out.push('\n');
        return PreparedProgram { source: out, user_entry, interop };
    }

    let split = split_body(&body);

    for var in &split.variables {
        out.push_str(var);
        out.push('\n');
    }
    if !split.variables.is_empty() {
        out.push('\n');
    }

    for func in &split.functions {
        out.push_str(func);
        out.push_str("\n\n");
    }

    out.push_str(&format!("func {}() {{\n", ENTRY_RUN));
    if !split.executable.is_empty() {
        out.push_str(&indent_code(&split.executable.join("\n")));
        out.push('\n');
    }
    out.push_str("}\n\n");

    out.push_str("func main() {\n");
    out.push_str(&format!("\t{}()\n", ENTRY_RUN));
    if interop {
        out.push_str(&format!("\tif !{} {{\n", MANUAL_FLAG));
        out.push_str(&format!("\t\thmrAccept({})\n", ENTRY_RUN));
        out.push_str("\t}\n");
    }
    out.push_str("\tselect {}\n");
    out.push_str("}\n");

    PreparedProgram { source: out, user_entry, interop }
}
