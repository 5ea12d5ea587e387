//! Save-time auto formatting.
//!
//! Formatting here is intentionally shallow: whitespace normalization plus a few
//! per-language rewrites. It never fails. Input that cannot be understood (for
//! example invalid JSON) comes back unchanged.

use once_cell::sync::Lazy;
use regex::Regex;

static KEYWORD_PAREN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(if|for|while|switch|catch)\(").expect("valid regex"));
static PAREN_BRACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\)\{").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Jsx,
    Tsx,
    Json,
    Css,
    Html,
    Markdown,
    Yaml,
    Toml,
    Shell,
    Text,
}

impl Language {
    pub fn detect(filename: &str) -> Self {
        let ext = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();
        Self::from_extension(&ext)
    }

    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "rs" => Language::Rust,
            "py" => Language::Python,
            "js" | "mjs" | "cjs" => Language::JavaScript,
            "ts" | "mts" | "cts" => Language::TypeScript,
            "jsx" => Language::Jsx,
            "tsx" => Language::Tsx,
            "json" => Language::Json,
            "css" | "scss" | "sass" | "less" => Language::Css,
            "html" | "htm" => Language::Html,
            "md" | "markdown" => Language::Markdown,
            "yaml" | "yml" => Language::Yaml,
            "toml" => Language::Toml,
            "sh" | "bash" | "zsh" => Language::Shell,
            _ => Language::Text,
        }
    }

    /// Map a code fence info string (`js`, `typescript`, `py`, ...) to a language.
    pub fn from_fence(info: &str) -> Option<Self> {
        let tag = info.split_whitespace().next()?.to_lowercase();
        let lang = match tag.as_str() {
            "rust" => Language::Rust,
            "python" => Language::Python,
            "javascript" | "node" => Language::JavaScript,
            "typescript" => Language::TypeScript,
            "shell" | "console" | "terminal" => Language::Shell,
            "markdown" => Language::Markdown,
            other => match Self::from_extension(other) {
                Language::Text => return None,
                lang => lang,
            },
        };
        Some(lang)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Language::Rust => "rs",
            Language::Python => "py",
            Language::JavaScript => "js",
            Language::TypeScript => "ts",
            Language::Jsx => "jsx",
            Language::Tsx => "tsx",
            Language::Json => "json",
            Language::Css => "css",
            Language::Html => "html",
            Language::Markdown => "md",
            Language::Yaml => "yml",
            Language::Toml => "toml",
            Language::Shell => "sh",
            Language::Text => "txt",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Jsx => "jsx",
            Language::Tsx => "tsx",
            Language::Json => "json",
            Language::Css => "css",
            Language::Html => "html",
            Language::Markdown => "markdown",
            Language::Yaml => "yaml",
            Language::Toml => "toml",
            Language::Shell => "shell",
            Language::Text => "text",
        }
    }

    pub fn is_script(&self) -> bool {
        matches!(
            self,
            Language::JavaScript | Language::TypeScript | Language::Jsx | Language::Tsx
        )
    }
}

/// Format `content` according to the language detected from `filename`.
pub fn format_content(filename: &str, content: &str) -> String {
    if content.is_empty() {
        return String::new();
    }
    match Language::detect(filename) {
        Language::Json => format_json(content),
        lang if lang.is_script() => format_script(content),
        Language::Css => format_css(content),
        Language::Python => format_python(content),
        _ => finish(content.lines().map(|l| l.trim_end().to_string()).collect()),
    }
}

fn format_json(content: &str) -> String {
    let value: serde_json::Value = match serde_json::from_str(content) {
        Ok(v) => v,
        Err(e) => {
            log::debug!("leaving invalid JSON untouched: {}", e);
            return content.to_string();
        }
    };
    match serde_json::to_string_pretty(&value) {
        Ok(pretty) => format!("{}\n", pretty),
        Err(_) => content.to_string(),
    }
}

fn format_script(content: &str) -> String {
    let lines = content
        .lines()
        .map(|line| {
            let line = expand_leading_tabs(line, 2);
            let line = KEYWORD_PAREN.replace_all(&line, "$1 (");
            PAREN_BRACE.replace_all(&line, ") {").trim_end().to_string()
        })
        .collect();
    finish(collapse_blank_runs(lines, 1))
}

fn format_python(content: &str) -> String {
    let lines = content
        .lines()
        .map(|line| expand_leading_tabs(line, 4).trim_end().to_string())
        .collect();
    finish(collapse_blank_runs(lines, 2))
}

/// One declaration per line. Separators inside strings and parentheses
/// (`url(data:...;base64,...)`) are content, not structure.
fn format_css(content: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    let mut in_comment = false;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut parens = 0usize;

    let indent = |depth: usize| "  ".repeat(depth);

    for ch in content.chars() {
        if in_comment {
            current.push(ch);
            if current.ends_with("*/") {
                lines.push(format!("{}{}", indent(depth), current.trim()));
                current.clear();
                in_comment = false;
            }
            continue;
        }

        if let Some(open) = quote {
            current.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == open {
                quote = None;
            }
            continue;
        }

        if parens > 0 {
            match ch {
                '(' => parens += 1,
                ')' => parens -= 1,
                '"' | '\'' => quote = Some(ch),
                _ => {}
            }
            current.push(if ch.is_whitespace() { ' ' } else { ch });
            continue;
        }

        match ch {
            '"' | '\'' => {
                quote = Some(ch);
                current.push(ch);
            }
            '(' => {
                parens = 1;
                current.push(ch);
            }
            '{' => {
                let selector = current.trim();
                if selector.is_empty() {
                    lines.push(format!("{}{{", indent(depth)));
                } else {
                    lines.push(format!("{}{} {{", indent(depth), selector));
                }
                depth += 1;
                current.clear();
            }
            ';' => {
                let decl = current.trim();
                if !decl.is_empty() {
                    lines.push(format!("{}{};", indent(depth), css_declaration(decl, depth)));
                }
                current.clear();
            }
            '}' => {
                let decl = current.trim();
                if !decl.is_empty() {
                    lines.push(format!("{}{};", indent(depth), css_declaration(decl, depth)));
                }
                depth = depth.saturating_sub(1);
                lines.push(format!("{}}}", indent(depth)));
                if depth == 0 {
                    lines.push(String::new());
                }
                current.clear();
            }
            '\n' | '\r' | '\t' => {
                if !current.is_empty() && !current.ends_with(' ') {
                    current.push(' ');
                }
            }
            _ => {
                current.push(ch);
                if current.trim_start() == "/*" {
                    current = "/*".to_string();
                    in_comment = true;
                }
            }
        }
    }

    let rest = current.trim();
    if !rest.is_empty() {
        lines.push(rest.to_string());
    }
    finish(collapse_blank_runs(lines, 1))
}

fn css_declaration(decl: &str, depth: usize) -> String {
    if depth == 0 || decl.starts_with('@') {
        return decl.to_string();
    }
    match decl.split_once(':') {
        Some((prop, value)) => format!("{}: {}", prop.trim(), value.trim()),
        None => decl.to_string(),
    }
}

fn expand_leading_tabs(line: &str, width: usize) -> String {
    let tabs = line.chars().take_while(|c| *c == '\t').count();
    if tabs == 0 {
        return line.to_string();
    }
    format!("{}{}", " ".repeat(tabs * width), &line[tabs..])
}

fn collapse_blank_runs(lines: Vec<String>, max_run: usize) -> Vec<String> {
    let mut out = Vec::with_capacity(lines.len());
    let mut run = 0;
    for line in lines {
        if line.is_empty() {
            run += 1;
            if run > max_run {
                continue;
            }
        } else {
            run = 0;
        }
        out.push(line);
    }
    out
}

fn finish(mut lines: Vec<String>) -> String {
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    if lines.is_empty() {
        return String::new();
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}
