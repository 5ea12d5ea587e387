//! Heuristic phase: map unlabeled code blocks to filenames.
//!
//! Each block gets its filename from the first source that answers:
//!
//! | Source | Confidence |
//! |---|---|
//! | filename comment on the first line (`// file: x.ts`), removed from content | High |
//! | fence label (```` ```tsx src/App.tsx ````) | High |
//! | hint right before the block (`for App.tsx`, `App.tsx:`) | High |
//! | next unused filename mentioned in the prose, by position | Medium |
//! | name sniffed from the content | Low |
//!
//! Shell blocks and empty blocks never become commands.

use super::lexer::Token;
use super::{as_filename, AiCommand, CommandKind, Confidence};
use crate::format::Language;
use crate::model::basename;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

const SHELL_LANGUAGES: &[&str] = &[
    "bash", "sh", "shell", "zsh", "console", "terminal", "cmd", "powershell", "ps1",
];

const HINT_WORDS: &[&str] = &["for", "in", "untuk", "di", "file", "berkas"];

static COMMENT_FILENAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?://|#|--|;|/\*|<!--)\s*(?:(?:file(?:name)?|path)\s*:\s*)?(\S+\.[a-z][a-z0-9]{0,9})\s*(?:\*/|-->)?\s*$",
    )
    .expect("valid regex")
});

static JSX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[\s(>{=?:])<[A-Za-z][\w.]*(?:\s[^<>]*)?/?>|</[A-Za-z][\w.]*>")
        .expect("valid regex")
});

static TYPE_HINTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^\s*(?:export\s+)?(?:interface|type)\s+[A-Z]\w*|:\s*(?:string|number|boolean|any|void|unknown)\b|React\.FC\b",
    )
    .expect("valid regex")
});

static COMPONENT_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:export\s+(?:default\s+)?)?(?:function|const|class)\s+([A-Z][A-Za-z0-9]*)")
        .expect("valid regex")
});

static HOOK_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:function|const)\s+(use[A-Z]\w*)").expect("valid regex")
});

static CLASS_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bclass\s+([A-Z]\w*)").expect("valid regex"));

static TYPE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:interface|type)\s+([A-Z]\w*)").expect("valid regex"));

static FUNCTION_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:function\s+([A-Za-z_]\w*)|const\s+([A-Za-z_]\w*)\s*=\s*(?:async\s*)?(?:\([^)]*\)|\w+)\s*=>)")
        .expect("valid regex")
});

struct Block<'a> {
    index: usize,
    language: Option<&'a str>,
    content: String,
    filename: Option<(String, Confidence)>,
}

pub(super) fn infer_commands(tokens: &[Token], existing_files: &[String]) -> Vec<AiCommand> {
    let mut blocks: Vec<Block> = tokens
        .iter()
        .enumerate()
        .filter_map(|(index, token)| match token {
            Token::CodeBlock {
                language,
                label,
                content,
            } => {
                let language = language.as_deref();
                if language.is_some_and(|l| SHELL_LANGUAGES.contains(&l)) || content.trim().is_empty()
                {
                    return None;
                }
                let mut block = Block {
                    index,
                    language,
                    content: content.clone(),
                    filename: None,
                };
                if let Some((name, rest)) = filename_comment(content) {
                    block.content = rest;
                    block.filename = Some((name, Confidence::High));
                } else if let Some(name) = label.as_ref().and_then(|l| label_filename(l)) {
                    block.filename = Some((name, Confidence::High));
                } else if let Some(name) = hint_before(tokens, index) {
                    block.filename = Some((name, Confidence::High));
                }
                Some(block)
            }
            _ => None,
        })
        .collect();

    if blocks.is_empty() {
        return Vec::new();
    }

    let mut taken: HashSet<String> = blocks
        .iter()
        .filter_map(|b| b.filename.as_ref().map(|(n, _)| n.clone()))
        .collect();

    let unused: Vec<String> = mentioned_filenames(tokens)
        .into_iter()
        .filter(|name| !taken.contains(name))
        .collect();
    let mut mentions = unused.into_iter();
    for block in blocks.iter_mut().filter(|b| b.filename.is_none()) {
        match mentions.next() {
            Some(name) => {
                taken.insert(name.clone());
                block.filename = Some((name, Confidence::Medium));
            }
            None => break,
        }
    }

    for block in blocks.iter_mut().filter(|b| b.filename.is_none()) {
        let sniffed = sniff_filename(block.language, &block.content);
        let name = unique_name(&sniffed, &mut taken);
        log::debug!("block at token {} named {} from its content", block.index, name);
        block.filename = Some((name, Confidence::Low));
    }

    blocks
        .into_iter()
        .filter_map(|block| {
            let (filename, confidence) = block.filename?;
            let language = block
                .language
                .map(str::to_string)
                .unwrap_or_else(|| Language::detect(&filename).name().to_string());
            let kind = match resolve_existing(&filename, existing_files) {
                Some(existing) => CommandKind::Edit {
                    filename: existing,
                    language,
                    content: block.content,
                },
                None => CommandKind::Create {
                    filename,
                    language,
                    content: block.content,
                },
            };
            Some(AiCommand::inferred(kind, confidence))
        })
        .collect()
}

/// `// file: x.ts` style first line. Returns the name and the content without it.
fn filename_comment(content: &str) -> Option<(String, String)> {
    let (first, rest) = match content.split_once('\n') {
        Some((first, rest)) => (first, rest),
        None => (content, ""),
    };
    let caps = COMMENT_FILENAME.captures(first)?;
    let name = as_filename(&Token::Word(caps[1].to_string()))?;
    Some((name, rest.to_string()))
}

fn label_filename(label: &str) -> Option<String> {
    label
        .split_whitespace()
        .map(|part| {
            let part = part
                .strip_prefix("title=")
                .or_else(|| part.strip_prefix("filename="))
                .unwrap_or(part);
            part.trim_matches(['"', '\''])
        })
        .find_map(|part| as_filename(&Token::Word(part.to_string())))
}

fn hint_before(tokens: &[Token], block_index: usize) -> Option<String> {
    let mut j = block_index;
    let mut saw_colon = false;
    while j > 0 {
        match tokens[j - 1] {
            Token::Colon => saw_colon = true,
            Token::Break => {}
            _ => break,
        }
        j -= 1;
    }
    if j == 0 {
        return None;
    }
    let name = as_filename(&tokens[j - 1])?;
    if saw_colon || (j >= 2 && tokens[j - 2].is_keyword(HINT_WORDS)) {
        return Some(name);
    }
    None
}

fn mentioned_filenames(tokens: &[Token]) -> Vec<String> {
    let mut seen = HashSet::new();
    tokens
        .iter()
        .filter_map(as_filename)
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

fn resolve_existing(filename: &str, existing_files: &[String]) -> Option<String> {
    if existing_files.iter().any(|f| f == filename) {
        return Some(filename.to_string());
    }
    let base = basename(filename);
    let mut matches = existing_files.iter().filter(|f| basename(f) == base);
    match (matches.next(), matches.next()) {
        (Some(only), None) => Some(only.clone()),
        _ => None,
    }
}

/// Guess a filename from the code itself.
fn sniff_filename(language: Option<&str>, content: &str) -> String {
    let fence = language.and_then(Language::from_fence);
    let default_for = |lang: Language| -> Option<&'static str> {
        Some(match lang {
            Language::Python => "main.py",
            Language::Css => "styles.css",
            Language::Html => "index.html",
            Language::Json => "data.json",
            Language::Rust => "main.rs",
            Language::Markdown => "README.md",
            Language::Yaml => "config.yml",
            Language::Toml => "config.toml",
            Language::Shell => "script.sh",
            _ => return None,
        })
    };
    if let Some(name) = fence.and_then(default_for) {
        return name.to_string();
    }

    let jsx = matches!(fence, Some(Language::Jsx | Language::Tsx)) || JSX.is_match(content);
    let typed = match fence {
        Some(Language::JavaScript | Language::Jsx) => TYPE_HINTS.is_match(content),
        _ => true,
    };
    let ext = match (jsx, typed) {
        (true, true) => "tsx",
        (true, false) => "jsx",
        (false, true) => "ts",
        (false, false) => "js",
    };

    let component = if jsx {
        first_capture(&COMPONENT_NAME, content)
    } else {
        None
    };
    let stem = component
        .or_else(|| first_capture(&HOOK_NAME, content))
        .or_else(|| first_capture(&CLASS_NAME, content))
        .or_else(|| first_capture(&TYPE_NAME, content))
        .or_else(|| first_capture(&FUNCTION_NAME, content));

    match stem {
        Some(stem) => format!("{}.{}", stem, ext),
        None if jsx => format!("Component.{}", ext),
        None => format!("script.{}", ext),
    }
}

fn first_capture(re: &Regex, content: &str) -> Option<String> {
    let caps = re.captures(content)?;
    caps.iter()
        .skip(1)
        .flatten()
        .next()
        .map(|m| m.as_str().to_string())
}

fn unique_name(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{}", ext)),
        _ => (name, String::new()),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}{}", stem, n, ext);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
