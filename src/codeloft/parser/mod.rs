//! # AI Command Parser
//!
//! Turns a free-text AI response into structured file commands.
//!
//! Parsing runs in two phases over the token stream produced by [`lexer::tokenize`]:
//!
//! 1. **Explicit**: a small bilingual (English/Indonesian) grammar of direct
//!    instructions. Every match is `is_explicit = true` with [`Confidence::High`].
//!
//!    ```text
//!    create := (create|make|add|buat|buatkan) FILLER* (file|berkas) FILLER* NAME CONTENT* CODE
//!    edit   := (edit|update|modify|change|ubah|perbarui) [file|berkas] NAME CONTENT* CODE
//!    replace:= (replace|ganti) (in|di) [file|berkas] NAME [text|teks] QUOTED (with|dengan) QUOTED
//!            | (replace|ganti) [text|teks] QUOTED (with|dengan) QUOTED (in|di) [file|berkas] NAME
//!    delete := (delete|remove|hapus) [file|berkas] NAME
//!    rename := rename [file|berkas] NAME (to|as|menjadi) NAME
//!            | (ganti|ubah) nama [file|berkas] NAME (menjadi|jadi|ke|to) NAME
//!    ```
//!
//! 2. **Heuristic**: only when phase 1 found nothing. Unlabeled code blocks are
//!    matched to filenames (see [`infer`]); the [`Confidence`] of each result says how
//!    the filename was found.
//!
//! Parsing never fails. Text with no recognizable intent yields no commands.

mod infer;
pub mod lexer;

use crate::format::Language;
use lexer::Token;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

pub use lexer::tokenize;

static FILENAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[\w@\-]+/)*[\w@\-][\w@.\-]*\.[A-Za-z][A-Za-z0-9]{0,9}$|^(?:[\w@\-]+/)*\.[A-Za-z][\w.\-]*$")
        .expect("valid regex")
});

/// Dotted words that read like filenames but are almost always prose.
const NOT_FILENAMES: &[&str] = &[
    "e.g", "i.e", "node.js", "next.js", "vue.js", "nuxt.js", "react.js", "express.js",
    "three.js", "d3.js", "chart.js", "socket.io",
];

const FILE_WORDS: &[&str] = &["file", "berkas"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CommandKind {
    Create {
        filename: String,
        language: String,
        content: String,
    },
    Edit {
        filename: String,
        language: String,
        content: String,
    },
    Replace {
        filename: String,
        old_text: String,
        new_text: String,
    },
    Delete {
        filename: String,
    },
    Rename {
        old_name: String,
        new_name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AiCommand {
    #[serde(flatten)]
    pub kind: CommandKind,
    pub is_explicit: bool,
    pub confidence: Confidence,
}

impl AiCommand {
    pub fn explicit(kind: CommandKind) -> Self {
        Self {
            kind,
            is_explicit: true,
            confidence: Confidence::High,
        }
    }

    pub fn inferred(kind: CommandKind, confidence: Confidence) -> Self {
        Self {
            kind,
            is_explicit: false,
            confidence,
        }
    }

    /// The file this command acts on (the source name for renames).
    pub fn filename(&self) -> &str {
        match &self.kind {
            CommandKind::Create { filename, .. }
            | CommandKind::Edit { filename, .. }
            | CommandKind::Replace { filename, .. }
            | CommandKind::Delete { filename } => filename,
            CommandKind::Rename { old_name, .. } => old_name,
        }
    }

    pub fn action(&self) -> &'static str {
        match self.kind {
            CommandKind::Create { .. } => "create",
            CommandKind::Edit { .. } => "edit",
            CommandKind::Replace { .. } => "replace",
            CommandKind::Delete { .. } => "delete",
            CommandKind::Rename { .. } => "rename",
        }
    }
}

/// Parse `text` into commands. `existing_files` decides create vs edit for
/// inferred commands.
pub fn parse_ai_command(text: &str, existing_files: &[String]) -> Vec<AiCommand> {
    let tokens = tokenize(text);

    let explicit = parse_explicit(&tokens);
    if !explicit.is_empty() {
        log::debug!("parsed {} explicit command(s)", explicit.len());
        return explicit;
    }

    let inferred = infer::infer_commands(&tokens, existing_files);
    log::debug!("inferred {} command(s) from code blocks", inferred.len());
    inferred
}

/// Normalized filename for a prose token, if it looks like one.
pub(crate) fn as_filename(token: &Token) -> Option<String> {
    let text = token.text()?.trim();
    let text = text.strip_prefix("./").unwrap_or(text);
    if text.len() > 255 || !FILENAME.is_match(text) {
        return None;
    }
    if NOT_FILENAMES.contains(&text.to_lowercase().as_str()) {
        return None;
    }
    Some(text.to_string())
}

fn parse_explicit(tokens: &[Token]) -> Vec<AiCommand> {
    let rules: [fn(Cursor) -> Option<(CommandKind, usize)>; 5] =
        [rename, replace, create, edit, delete];

    let mut commands = Vec::new();
    let mut pos = 0;
    'scan: while pos < tokens.len() {
        for rule in rules {
            if let Some((kind, end)) = rule(Cursor { tokens, pos }) {
                commands.push(AiCommand::explicit(kind));
                pos = end;
                continue 'scan;
            }
        }
        pos += 1;
    }
    commands
}

#[derive(Clone, Copy)]
struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    /// Consume one word from `words`.
    fn keyword(&mut self, words: &[&str]) -> bool {
        match self.peek() {
            Some(t) if t.is_keyword(words) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    /// Consume any run of filler words, colons and line breaks.
    fn skip(&mut self, words: &[&str]) {
        while let Some(t) = self.peek() {
            if t.is_keyword(words) || matches!(t, Token::Colon | Token::Break) {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    /// Consume filler words only, stopping at structure.
    fn skip_words(&mut self, words: &[&str]) {
        while self.keyword(words) {}
    }

    fn name(&mut self) -> Option<String> {
        let name = as_filename(self.peek()?)?;
        self.pos += 1;
        Some(name)
    }

    fn quoted(&mut self) -> Option<String> {
        match self.peek()? {
            Token::Quoted(s) => {
                self.pos += 1;
                Some(s.clone())
            }
            _ => None,
        }
    }

    fn code_block(&mut self) -> Option<(Option<String>, String)> {
        match self.peek()? {
            Token::CodeBlock {
                language, content, ..
            } => {
                self.pos += 1;
                Some((language.clone(), content.clone()))
            }
            _ => None,
        }
    }
}

fn block_language(language: Option<String>, filename: &str) -> String {
    language.unwrap_or_else(|| Language::detect(filename).name().to_string())
}

fn create(mut c: Cursor) -> Option<(CommandKind, usize)> {
    if !c.keyword(&["create", "make", "add", "buat", "buatkan"]) {
        return None;
    }
    c.skip_words(&["a", "an", "new", "the", "baru", "sebuah"]);
    if !c.keyword(FILE_WORDS) {
        return None;
    }
    c.skip_words(&["baru", "new", "called", "named", "bernama"]);
    let filename = c.name()?;
    c.skip(&[
        "containing", "contains", "with", "content", "contents", "berisi", "dengan", "isi",
        "the", "following", "code", "kode",
    ]);
    let (language, content) = c.code_block()?;
    let language = block_language(language, &filename);
    Some((
        CommandKind::Create {
            filename,
            language,
            content,
        },
        c.pos,
    ))
}

fn edit(mut c: Cursor) -> Option<(CommandKind, usize)> {
    if !c.keyword(&["edit", "update", "modify", "change", "ubah", "perbarui"]) {
        return None;
    }
    c.skip_words(&["the"]);
    c.keyword(FILE_WORDS);
    let filename = c.name()?;
    c.skip(&[
        "to", "with", "into", "menjadi", "dengan", "the", "following", "content", "contents",
        "code", "isi", "as", "follows",
    ]);
    let (language, content) = c.code_block()?;
    let language = block_language(language, &filename);
    Some((
        CommandKind::Edit {
            filename,
            language,
            content,
        },
        c.pos,
    ))
}

fn replace(mut c: Cursor) -> Option<(CommandKind, usize)> {
    if !c.keyword(&["replace", "ganti"]) {
        return None;
    }

    let mut target = c;
    if target.keyword(&["in", "di"]) {
        target.skip_words(&["the"]);
        target.keyword(FILE_WORDS);
        let filename = target.name()?;
        target.skip_words(&["text", "teks", "the"]);
        let old_text = target.quoted()?;
        if !target.keyword(&["with", "dengan", "by"]) {
            return None;
        }
        target.skip_words(&["text", "teks"]);
        let new_text = target.quoted()?;
        return Some((
            CommandKind::Replace {
                filename,
                old_text,
                new_text,
            },
            target.pos,
        ));
    }

    c.skip_words(&["text", "teks", "the"]);
    let old_text = c.quoted()?;
    if !c.keyword(&["with", "dengan", "by"]) {
        return None;
    }
    c.skip_words(&["text", "teks"]);
    let new_text = c.quoted()?;
    if !c.keyword(&["in", "di"]) {
        return None;
    }
    c.skip_words(&["the"]);
    c.keyword(FILE_WORDS);
    let filename = c.name()?;
    Some((
        CommandKind::Replace {
            filename,
            old_text,
            new_text,
        },
        c.pos,
    ))
}

fn delete(mut c: Cursor) -> Option<(CommandKind, usize)> {
    if !c.keyword(&["delete", "remove", "hapus"]) {
        return None;
    }
    c.skip_words(&["the"]);
    c.keyword(FILE_WORDS);
    let filename = c.name()?;
    Some((CommandKind::Delete { filename }, c.pos))
}

fn rename(mut c: Cursor) -> Option<(CommandKind, usize)> {
    let english = c.keyword(&["rename"]);
    if !english && !(c.keyword(&["ganti", "ubah"]) && c.keyword(&["nama"])) {
        return None;
    }
    c.skip_words(&["the"]);
    c.keyword(FILE_WORDS);
    let old_name = c.name()?;
    let joiners: &[&str] = if english {
        &["to", "as", "into"]
    } else {
        &["menjadi", "jadi", "ke", "to"]
    };
    if !c.keyword(joiners) {
        return None;
    }
    c.keyword(FILE_WORDS);
    let new_name = c.name()?;
    Some((CommandKind::Rename { old_name, new_name }, c.pos))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Vec<AiCommand> {
        parse_ai_command(text, &[])
    }

    #[test]
    fn explicit_create_with_fence_mid_line() {
        let commands = parse("create file foo.js containing ```js\nconsole.log(1)\n```");
        assert_eq!(
            commands,
            vec![AiCommand {
                kind: CommandKind::Create {
                    filename: "foo.js".into(),
                    language: "js".into(),
                    content: "console.log(1)".into(),
                },
                is_explicit: true,
                confidence: Confidence::High,
            }]
        );
    }

    #[test]
    fn indonesian_create_without_fence_language() {
        let commands = parse("Buat file baru utils/math.ts berisi:\n```\nexport const one = 1;\n```");
        assert_eq!(commands.len(), 1);
        match &commands[0].kind {
            CommandKind::Create {
                filename, language, ..
            } => {
                assert_eq!(filename, "utils/math.ts");
                assert_eq!(language, "typescript");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn explicit_edit() {
        let commands = parse("Update the file `src/App.tsx` to:\n```tsx\nexport default 1\n```");
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].action(), "edit");
        assert_eq!(commands[0].filename(), "src/App.tsx");
    }

    #[test]
    fn replace_both_word_orders() {
        let commands = parse(r#"replace in file App.tsx text "Hello" with "Hi""#);
        assert_eq!(
            commands[0].kind,
            CommandKind::Replace {
                filename: "App.tsx".into(),
                old_text: "Hello".into(),
                new_text: "Hi".into(),
            }
        );

        let commands = parse(r#"ganti "a" dengan "b" di file x.js"#);
        assert_eq!(
            commands[0].kind,
            CommandKind::Replace {
                filename: "x.js".into(),
                old_text: "a".into(),
                new_text: "b".into(),
            }
        );
    }

    #[test]
    fn delete_and_rename_in_both_languages() {
        let commands = parse("hapus file old.js. Then rename file a.js to b.js");
        assert_eq!(
            commands.iter().map(|c| c.kind.clone()).collect::<Vec<_>>(),
            vec![
                CommandKind::Delete {
                    filename: "old.js".into()
                },
                CommandKind::Rename {
                    old_name: "a.js".into(),
                    new_name: "b.js".into()
                },
            ]
        );

        let commands = parse("ganti nama file a.js menjadi b.js");
        assert_eq!(
            commands[0].kind,
            CommandKind::Rename {
                old_name: "a.js".into(),
                new_name: "b.js".into()
            }
        );
    }

    #[test]
    fn prose_without_intent_yields_nothing() {
        assert!(parse("I think we should create a new file for the tests later.").is_empty());
        assert!(parse("Node.js is great, e.g. for servers.").is_empty());
    }

    #[test]
    fn explicit_commands_suppress_heuristics() {
        let text = "delete file a.js\n\n```ts\n// file: b.ts\nexport {}\n```";
        let commands = parse(text);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].action(), "delete");
    }

    #[test]
    fn fence_label_separated_by_nbsp() {
        let commands = parse("Here you go:\n```tsx\u{a0}src/App.tsx\nexport default 1\n```");
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].filename(), "src/App.tsx");
        assert!(!commands[0].is_explicit);
    }

    #[test]
    fn filename_detection() {
        let name = |s: &str| as_filename(&Token::Word(s.into()));
        assert_eq!(name("./src/App.tsx").as_deref(), Some("src/App.tsx"));
        assert_eq!(name(".env").as_deref(), Some(".env"));
        assert_eq!(name("App.test.tsx").as_deref(), Some("App.test.tsx"));
        assert_eq!(name("1.2.3"), None);
        assert_eq!(name("hello"), None);
        assert_eq!(name("Next.js"), None);
    }

    #[test]
    fn commands_serialize_with_type_tag() {
        let cmd = AiCommand::explicit(CommandKind::Delete {
            filename: "a.js".into(),
        });
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], "delete");
        assert_eq!(json["filename"], "a.js");
        assert_eq!(json["confidence"], "high");
    }
}
