//! Applies parsed [`AiCommand`]s to a [`Workspace`].
//!
//! Every command either succeeds or is refused with a warning; refusals never
//! mutate the workspace. Refusals:
//!
//! - deleting the last remaining file, or a file that does not exist
//! - renaming onto an existing name, or renaming a missing file
//! - replacing in a missing file, or text that does not occur
//!
//! `edit` on a file that does not exist degrades to `create`.
//!
//! New files without a folder are placed by [`smart_folder_path`].

use crate::commands::CmdMessage;
use crate::model::{basename, Workspace};
use crate::parser::{AiCommand, CommandKind};
use once_cell::sync::Lazy;
use regex::Regex;

static JSX_CONTENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[\s(>{=?:])<[A-Za-z][\w.]*(?:\s[^<>]*)?/?>|</[A-Za-z][\w.]*>")
        .expect("valid regex")
});
static TYPE_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:export\s+)?(?:declare\s+)?(?:interface|type|enum)\s+\w+")
        .expect("valid regex")
});
static RUNTIME_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:function|class|const|let|var)\b").expect("valid regex"));
static FUNCTION_EXPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^export\s+(?:async\s+)?function\b|^export\s+const\s+\w+\s*=\s*(?:async\s*)?(?:\(|\w+\s*=>|function\b)")
        .expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Component,
    Hook,
    Type,
    Test,
    Style,
    Util,
    Config,
    Other,
}

impl FileKind {
    /// Conventional folder name, if this kind lives in one.
    pub fn folder(&self) -> Option<&'static str> {
        match self {
            FileKind::Component => Some("components"),
            FileKind::Hook => Some("hooks"),
            FileKind::Type => Some("types"),
            FileKind::Util => Some("utils"),
            FileKind::Style => Some("styles"),
            FileKind::Test => Some("tests"),
            FileKind::Config | FileKind::Other => None,
        }
    }
}

pub fn classify(filename: &str, content: &str) -> FileKind {
    let name = basename(filename);
    let lower = name.to_lowercase();
    let (stem, ext) = match lower.rsplit_once('.') {
        Some((stem, ext)) => (stem, ext),
        None => (lower.as_str(), ""),
    };
    let script = matches!(ext, "js" | "jsx" | "ts" | "tsx" | "mjs" | "cjs");

    if lower.contains(".test.") || lower.contains(".spec.") {
        return FileKind::Test;
    }
    if lower.starts_with('.')
        || lower.contains(".config.")
        || matches!(
            lower.as_str(),
            "package.json" | "tsconfig.json" | "jsconfig.json" | "cargo.toml"
        )
    {
        return FileKind::Config;
    }
    if matches!(ext, "css" | "scss" | "sass" | "less") {
        return FileKind::Style;
    }
    if !script {
        return FileKind::Other;
    }
    if lower.ends_with(".d.ts")
        || stem == "types"
        || (TYPE_DECL.is_match(content) && !RUNTIME_CODE.is_match(content))
    {
        return FileKind::Type;
    }
    if is_hook_name(name) {
        return FileKind::Hook;
    }
    let capitalised = name.chars().next().is_some_and(|c| c.is_ascii_uppercase());
    if (matches!(ext, "jsx" | "tsx") && capitalised) || JSX_CONTENT.is_match(content) {
        return FileKind::Component;
    }
    if matches!(stem, "utils" | "util" | "helpers" | "helper" | "lib") || only_function_exports(content)
    {
        return FileKind::Util;
    }
    FileKind::Other
}

fn is_hook_name(name: &str) -> bool {
    name.strip_prefix("use")
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_ascii_uppercase())
}

fn only_function_exports(content: &str) -> bool {
    let mut exports = content
        .lines()
        .map(str::trim_start)
        .filter(|l| l.starts_with("export "))
        .peekable();
    exports.peek().is_some() && exports.all(|l| FUNCTION_EXPORT.is_match(l))
}

/// Where a new file should live.
///
/// Names that already carry a folder are kept. Otherwise the file goes into the
/// conventional folder for its [`FileKind`]: an existing folder with that name
/// (shallowest first), else `src/<folder>` when `src` exists, else `<folder>`.
pub fn smart_folder_path(filename: &str, content: &str, workspace: &Workspace) -> String {
    if filename.contains('/') || workspace.contains(filename) {
        return filename.to_string();
    }
    let Some(folder) = classify(filename, content).folder() else {
        return filename.to_string();
    };

    let existing = workspace
        .folders()
        .iter()
        .filter(|f| basename(f) == folder)
        .min_by_key(|f| (f.matches('/').count(), f.as_str()));
    let dir = match existing {
        Some(dir) => dir.clone(),
        None if workspace.folders().contains("src") => format!("src/{}", folder),
        None => folder.to_string(),
    };
    format!("{}/{}", dir, filename)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Created(String),
    Updated(String),
    Replaced { path: String, count: usize },
    Deleted(String),
    Renamed { from: String, to: String },
}

impl Outcome {
    /// The file whose content changed, if any.
    pub fn written_path(&self) -> Option<&str> {
        match self {
            Outcome::Created(path) | Outcome::Updated(path) => Some(path),
            Outcome::Replaced { path, .. } => Some(path),
            Outcome::Renamed { to, .. } => Some(to),
            Outcome::Deleted(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedCommand {
    pub command: AiCommand,
    pub outcome: Outcome,
}

#[derive(Debug, Default)]
pub struct ExecResult {
    pub executed: Vec<ExecutedCommand>,
    pub messages: Vec<CmdMessage>,
}

/// Apply `commands` in order.
pub fn execute(commands: &[AiCommand], workspace: &mut Workspace) -> ExecResult {
    let mut result = ExecResult::default();
    for command in commands {
        match apply(command, workspace) {
            Ok(outcome) => {
                result
                    .messages
                    .push(CmdMessage::success(describe(command, &outcome)));
                result.executed.push(ExecutedCommand {
                    command: command.clone(),
                    outcome,
                });
            }
            Err(reason) => {
                log::warn!("skipped {} of {}: {}", command.action(), command.filename(), reason);
                result.messages.push(CmdMessage::warning(format!("⚠️ {}", reason)));
            }
        }
    }
    result
}

fn apply(command: &AiCommand, ws: &mut Workspace) -> std::result::Result<Outcome, String> {
    match &command.kind {
        CommandKind::Create {
            filename, content, ..
        } => Ok(write(ws, filename, content)),
        CommandKind::Edit {
            filename, content, ..
        } => match ws.resolve(filename) {
            Some(path) => {
                ws.insert_file(&path, content.clone());
                open(ws, &path);
                Ok(Outcome::Updated(path))
            }
            None => {
                log::debug!("{} does not exist, creating it instead", filename);
                Ok(write(ws, filename, content))
            }
        },
        CommandKind::Replace {
            filename,
            old_text,
            new_text,
        } => {
            let path = ws
                .resolve(filename)
                .ok_or_else(|| format!("Cannot replace in {}: file not found", filename))?;
            let current = ws.content(&path).unwrap_or_default();
            let count = if old_text.is_empty() {
                0
            } else {
                current.matches(old_text.as_str()).count()
            };
            if count == 0 {
                return Err(format!("Text \"{}\" not found in {}", old_text, path));
            }
            let updated = current.replace(old_text.as_str(), new_text);
            ws.insert_file(&path, updated);
            open(ws, &path);
            Ok(Outcome::Replaced { path, count })
        }
        CommandKind::Delete { filename } => {
            let path = ws
                .resolve(filename)
                .ok_or_else(|| format!("Cannot delete {}: file not found", filename))?;
            ws.remove_file(&path).map_err(|e| e.to_string())?;
            Ok(Outcome::Deleted(path))
        }
        CommandKind::Rename { old_name, new_name } => {
            let from = ws
                .resolve(old_name)
                .ok_or_else(|| format!("Cannot rename {}: file not found", old_name))?;
            // A bare new name stays next to the old file.
            let to = match (new_name.contains('/'), from.rsplit_once('/')) {
                (false, Some((dir, _))) => format!("{}/{}", dir, new_name),
                _ => new_name.clone(),
            };
            ws.rename_file(&from, &to).map_err(|e| e.to_string())?;
            Ok(Outcome::Renamed { from, to })
        }
    }
}

fn write(ws: &mut Workspace, filename: &str, content: &str) -> Outcome {
    let path = smart_folder_path(filename, content, ws);
    let existed = ws.insert_file(&path, content);
    open(ws, &path);
    if existed {
        Outcome::Updated(path)
    } else {
        Outcome::Created(path)
    }
}

fn open(ws: &mut Workspace, path: &str) {
    ws.open_tab(path);
    ws.select(path);
}

fn describe(command: &AiCommand, outcome: &Outcome) -> String {
    let text = match outcome {
        Outcome::Created(path) => format!("Created {}", path),
        Outcome::Updated(path) => format!("Updated {}", path),
        Outcome::Replaced { path, count } => format!(
            "Replaced {} occurrence{} in {}",
            count,
            if *count == 1 { "" } else { "s" },
            path
        ),
        Outcome::Deleted(path) => format!("Deleted {}", path),
        Outcome::Renamed { from, to } => format!("Renamed {} to {}", from, to),
    };
    if command.is_explicit {
        format!("✅ {}", text)
    } else {
        format!("🤖 {} (confidence: {})", text, command.confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::MessageLevel;
    use crate::model::FileEntry;
    use crate::parser::Confidence;

    fn ws(files: &[&str]) -> Workspace {
        Workspace::from_entries(files.iter().map(|f| FileEntry::new(*f, "x")))
    }

    fn explicit(kind: CommandKind) -> AiCommand {
        AiCommand::explicit(kind)
    }

    fn create(filename: &str, content: &str) -> AiCommand {
        explicit(CommandKind::Create {
            filename: filename.into(),
            language: String::new(),
            content: content.into(),
        })
    }

    #[test]
    fn deleting_the_only_file_is_a_noop() {
        let mut workspace = ws(&["index.js"]);
        let before = workspace.clone();
        let result = execute(
            &[explicit(CommandKind::Delete {
                filename: "index.js".into(),
            })],
            &mut workspace,
        );
        assert!(result.executed.is_empty());
        assert_eq!(workspace, before);
        assert!(matches!(result.messages[0].level, MessageLevel::Warning));
    }

    #[test]
    fn rename_onto_existing_is_a_noop() {
        let mut workspace = ws(&["a.js", "b.js"]);
        let before = workspace.clone();
        let result = execute(
            &[explicit(CommandKind::Rename {
                old_name: "a.js".into(),
                new_name: "b.js".into(),
            })],
            &mut workspace,
        );
        assert!(result.executed.is_empty());
        assert_eq!(workspace, before);
    }

    #[test]
    fn rename_keeps_folder_for_bare_target() {
        let mut workspace = ws(&["src/a.js", "b.js"]);
        let result = execute(
            &[explicit(CommandKind::Rename {
                old_name: "src/a.js".into(),
                new_name: "c.js".into(),
            })],
            &mut workspace,
        );
        assert_eq!(
            result.executed[0].outcome,
            Outcome::Renamed {
                from: "src/a.js".into(),
                to: "src/c.js".into()
            }
        );
        assert!(workspace.contains("src/c.js"));
    }

    #[test]
    fn components_follow_existing_folders() {
        let mut workspace = ws(&["src/components/Nav.tsx"]);
        execute(&[create("Button.tsx", "export const Button = () => null")], &mut workspace);
        assert!(workspace.contains("src/components/Button.tsx"));
        assert_eq!(workspace.selected(), Some("src/components/Button.tsx"));
        assert!(workspace
            .open_tabs()
            .contains(&"src/components/Button.tsx".to_string()));
    }

    #[test]
    fn placement_prefers_src_then_root() {
        let with_src = ws(&["src/main.ts"]);
        assert_eq!(
            smart_folder_path("useAuth.ts", "export function useAuth() {}", &with_src),
            "src/hooks/useAuth.ts"
        );

        let bare = ws(&["index.html"]);
        assert_eq!(
            smart_folder_path("theme.css", "body{}", &bare),
            "styles/theme.css"
        );
        assert_eq!(smart_folder_path("package.json", "{}", &bare), "package.json");
        assert_eq!(smart_folder_path("lib/x.ts", "", &bare), "lib/x.ts");
    }

    #[test]
    fn classification() {
        assert_eq!(classify("App.test.tsx", ""), FileKind::Test);
        assert_eq!(classify("vite.config.ts", ""), FileKind::Config);
        assert_eq!(classify(".eslintrc", ""), FileKind::Config);
        assert_eq!(classify("user.ts", "export interface User { id: string }"), FileKind::Type);
        assert_eq!(classify("api.d.ts", ""), FileKind::Type);
        assert_eq!(classify("card.js", "return <div className=\"card\"/>"), FileKind::Component);
        assert_eq!(
            classify("math.ts", "export function add() {}\nexport const sub = (a, b) => a - b;"),
            FileKind::Util
        );
        assert_eq!(classify("main.ts", "console.log(1)"), FileKind::Other);
        assert_eq!(classify("notes.md", ""), FileKind::Other);
    }

    #[test]
    fn edit_of_missing_file_creates_it() {
        let mut workspace = ws(&["index.js"]);
        let result = execute(
            &[explicit(CommandKind::Edit {
                filename: "server.js".into(),
                language: "javascript".into(),
                content: "listen()".into(),
            })],
            &mut workspace,
        );
        assert_eq!(result.executed[0].outcome, Outcome::Created("server.js".into()));
        assert_eq!(workspace.content("server.js"), Some("listen()"));
    }

    #[test]
    fn edit_resolves_by_basename() {
        let mut workspace = ws(&["src/app.js", "index.js"]);
        execute(
            &[explicit(CommandKind::Edit {
                filename: "app.js".into(),
                language: "javascript".into(),
                content: "new".into(),
            })],
            &mut workspace,
        );
        assert_eq!(workspace.content("src/app.js"), Some("new"));
        assert!(!workspace.contains("app.js"));
    }

    #[test]
    fn replace_is_literal_and_global() {
        let mut workspace = Workspace::from_entries(vec![FileEntry::new("a.js", "a.b a.b axb")]);
        let result = execute(
            &[explicit(CommandKind::Replace {
                filename: "a.js".into(),
                old_text: "a.b".into(),
                new_text: "c".into(),
            })],
            &mut workspace,
        );
        assert_eq!(workspace.content("a.js"), Some("c c axb"));
        assert_eq!(
            result.executed[0].outcome,
            Outcome::Replaced {
                path: "a.js".into(),
                count: 2
            }
        );
    }

    #[test]
    fn replace_of_missing_text_warns() {
        let mut workspace = ws(&["a.js"]);
        let result = execute(
            &[explicit(CommandKind::Replace {
                filename: "a.js".into(),
                old_text: "nope".into(),
                new_text: "c".into(),
            })],
            &mut workspace,
        );
        assert!(result.executed.is_empty());
        assert_eq!(workspace.content("a.js"), Some("x"));
    }

    #[test]
    fn messages_mark_explicit_and_inferred() {
        let mut workspace = ws(&["index.js"]);
        let inferred = AiCommand::inferred(
            CommandKind::Create {
                filename: "notes.md".into(),
                language: "markdown".into(),
                content: "hi".into(),
            },
            Confidence::Medium,
        );
        let result = execute(&[create("a.md", "x"), inferred], &mut workspace);
        assert_eq!(result.messages[0].content, "✅ Created a.md");
        assert_eq!(
            result.messages[1].content,
            "🤖 Created notes.md (confidence: medium)"
        );
    }
}
