//! Dispatch for the `codeloft` binary.
//!
//! `run()` builds the context (data dir, config, store), opens the API with the
//! current time, calls one `handle_*` and then either closes the API (final
//! flush) or just persists the autosave session.
//!
//! Panics are caught by the recovery panic hook and appended to the stored error
//! log, so `codeloft health` shows them on the next run.

use super::print::{
    print_commands, print_commands_json, print_config, print_conflicts, print_diff,
    print_executed, print_file, print_files, print_health, print_history, print_last_message,
    print_messages, print_session, print_sessions,
};
use super::setup::{AiCommands, ChatCommands, Cli, Commands, FileCommands, MiscCommands, SaveCommands};
use chrono::{DateTime, Utc};
use clap::Parser;
use codeloft::api::LoftApi;
use codeloft::commands::config::ConfigAction;
use codeloft::commands::{CmdResult, LoftPaths};
use codeloft::config::LoftConfig;
use codeloft::error::{LoftError, Result};
use codeloft::recovery::deployment::{DeploymentMonitor, StoreProbe};
use codeloft::recovery::{install_panic_hook, ErrorMonitor, ErrorRecord};
use codeloft::store::fs::FileStore;
use codeloft::store::{KeyValueStore, ERROR_LOG_KEY};
use directories::ProjectDirs;
use std::io::{IsTerminal, Read};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const PROJECT_DIR: &str = ".codeloft";
const DATA_ENV: &str = "CODELOFT_DATA";

struct AppContext {
    api: LoftApi<FileStore>,
    data_dir: PathBuf,
    now: DateTime<Utc>,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let data_dir = data_dir(cli.global)?;
    let crashes = Arc::new(Mutex::new(ErrorMonitor::new()));
    install_panic_hook(Arc::clone(&crashes));

    match panic::catch_unwind(AssertUnwindSafe(|| dispatch(cli, &data_dir))) {
        Ok(result) => result,
        Err(_) => {
            save_crash_records(&data_dir, &crashes)?;
            Err(LoftError::Api(
                "Internal error, recorded in the error log".to_string(),
            ))
        }
    }
}

/// Append what the panic hook caught to the stored error log.
fn save_crash_records(data_dir: &Path, crashes: &Mutex<ErrorMonitor>) -> Result<()> {
    let Ok(crashes) = crashes.lock() else {
        return Ok(());
    };
    let store = FileStore::new(data_dir);
    let mut records: Vec<ErrorRecord> = match store.get(ERROR_LOG_KEY)? {
        Some(raw) => serde_json::from_str(&raw).unwrap_or_default(),
        None => Vec::new(),
    };
    records.extend(crashes.log().records().cloned());
    store.set(ERROR_LOG_KEY, &serde_json::to_string(&records)?)
}

fn dispatch(cli: Cli, data_dir: &Path) -> Result<()> {
    let mut ctx = init_context(data_dir)?;
    let flush_on_exit = flushes_on_exit(&cli.command);

    match cli.command {
        Some(Commands::File(cmd)) => handle_file(&mut ctx, cmd)?,
        Some(Commands::Ai(cmd)) => handle_ai(&mut ctx, cmd)?,
        Some(Commands::Save(cmd)) => handle_save(&mut ctx, cmd)?,
        Some(Commands::Chat(cmd)) => handle_chat(&mut ctx, cmd)?,
        Some(Commands::Misc(cmd)) => handle_misc(&mut ctx, cmd)?,
        None => handle_file(&mut ctx, FileCommands::Ls)?,
    }

    let now = Utc::now();
    if flush_on_exit {
        let result = ctx.api.close(now)?;
        print_messages(&result.messages);
    } else {
        ctx.api.persist(now)?;
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// Edits end the session, like closing an editor. `write --defer` keeps them pending.
fn flushes_on_exit(command: &Option<Commands>) -> bool {
    match command {
        Some(Commands::File(FileCommands::Write { defer, .. })) => !defer,
        Some(Commands::File(FileCommands::Format { .. })) => true,
        Some(Commands::Ai(AiCommands::Apply { dry_run, .. })) => !dry_run,
        Some(Commands::Save(SaveCommands::Resolve { .. }))
        | Some(Commands::Save(SaveCommands::Undo { .. })) => true,
        Some(Commands::Chat(ChatCommands::Reply { apply, .. })) => *apply,
        _ => false,
    }
}

fn data_dir(global: bool) -> Result<PathBuf> {
    if !global {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        return Ok(cwd.join(PROJECT_DIR));
    }
    if let Some(dir) = std::env::var_os(DATA_ENV) {
        return Ok(PathBuf::from(dir));
    }
    ProjectDirs::from("dev", "codeloft", "codeloft")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| LoftError::Config("Could not determine the global data directory".into()))
}

fn init_context(data_dir: &Path) -> Result<AppContext> {
    let data_dir = data_dir.to_path_buf();
    let config = LoftConfig::load(&data_dir).unwrap_or_else(|e| {
        log::warn!("using default config: {}", e);
        LoftConfig::default()
    });
    let now = Utc::now();
    let store = FileStore::new(&data_dir);
    let api = LoftApi::open(store, LoftPaths::new(&data_dir), config, now)?;
    log::debug!("opened workspace at {}", data_dir.display());

    Ok(AppContext { api, data_dir, now })
}

/// The argument when given, otherwise piped stdin.
fn text_or_stdin(arg: Option<String>, what: &str) -> Result<String> {
    if let Some(text) = arg {
        return Ok(text);
    }
    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Err(LoftError::Api(format!("No {} given (pass it or pipe it in)", what)));
    }
    let mut buffer = String::new();
    stdin.read_to_string(&mut buffer)?;
    Ok(buffer)
}

fn read_input(path: Option<PathBuf>) -> Result<String> {
    match path {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => text_or_stdin(None, "AI reply"),
    }
}

fn handle_file(ctx: &mut AppContext, cmd: FileCommands) -> Result<()> {
    match cmd {
        FileCommands::Ls => {
            let result = ctx.api.list_files()?;
            print_files(&result.files);
            print_messages(&result.messages);
        }
        FileCommands::Show { file } => {
            let result = ctx.api.read_file(&file)?;
            if let Some(entry) = &result.file {
                print_file(entry);
            }
            print_messages(&result.messages);
        }
        FileCommands::Write {
            file, content, at, ..
        } => {
            let content = text_or_stdin(content, "content")?;
            let result = ctx.api.write_file(&file, &content, at.unwrap_or(ctx.now))?;
            print_messages(&result.messages);
        }
        FileCommands::Format { file } => {
            let result = ctx.api.format_file(&file, ctx.now)?;
            print_messages(&result.messages);
        }
    }
    Ok(())
}

fn handle_ai(ctx: &mut AppContext, cmd: AiCommands) -> Result<()> {
    match cmd {
        AiCommands::Apply { input, dry_run } => {
            let text = read_input(input)?;
            let result = ctx.api.apply_response(&text, dry_run, ctx.now)?;
            print_executed(&result.executed);
            print_messages(&result.messages);
        }
        AiCommands::Parse { input, json } => {
            let text = read_input(input)?;
            let result = ctx.api.parse_response(&text)?;
            if json {
                print_commands_json(&result.commands)?;
            } else {
                print_commands(&result.commands);
                print_messages(&result.messages);
            }
        }
    }
    Ok(())
}

fn handle_save(ctx: &mut AppContext, cmd: SaveCommands) -> Result<()> {
    let result = match cmd {
        SaveCommands::Flush => ctx.api.flush(ctx.now)?,
        SaveCommands::Tick => ctx.api.tick(ctx.now)?,
        SaveCommands::Conflicts => {
            let result = ctx.api.conflicts()?;
            print_conflicts(&result.conflicts);
            result
        }
        SaveCommands::Resolve { file, resolution } => {
            ctx.api.resolve_conflict(&file, resolution, ctx.now)?
        }
        SaveCommands::History { file } => {
            let result = ctx.api.history(&file)?;
            print_history(&result.history);
            result
        }
        SaveCommands::Diff { file, from, to } => {
            let result = ctx.api.diff_versions(&file, from, to)?;
            if let Some(diff) = &result.diff {
                print_diff(diff);
            }
            result
        }
        SaveCommands::Undo { file, version } => ctx.api.restore_version(&file, version, ctx.now)?,
    };
    print_messages(&result.messages);
    Ok(())
}

fn handle_chat(ctx: &mut AppContext, cmd: ChatCommands) -> Result<()> {
    let now = ctx.now;
    let result = match cmd {
        ChatCommands::New { title } => ctx.api.chat_new(title.as_deref(), now)?,
        ChatCommands::List => {
            let result = ctx.api.chat_list()?;
            let current = ctx.api.current_chat()?;
            print_sessions(&result.sessions, current.as_deref());
            result
        }
        ChatCommands::Show { id } => {
            let result = ctx.api.chat_show(id.as_deref())?;
            for session in &result.sessions {
                print_session(session);
            }
            result
        }
        ChatCommands::Switch { id } => ctx.api.chat_switch(&id)?,
        ChatCommands::Say { message, session } => {
            let message = text_or_stdin(message, "message")?;
            let result = ctx.api.chat_say(session.as_deref(), &message, now)?;
            print_last_messages(&result);
            result
        }
        ChatCommands::Reply {
            message,
            session,
            apply,
        } => {
            let message = text_or_stdin(message, "reply")?;
            let result = ctx.api.chat_reply(session.as_deref(), &message, apply, now)?;
            print_last_messages(&result);
            print_executed(&result.executed);
            result
        }
        ChatCommands::Rename { id, title } => ctx.api.chat_rename(&id, &title, now)?,
        ChatCommands::Delete { id } => ctx.api.chat_delete(&id)?,
        ChatCommands::Clear => ctx.api.chat_clear()?,
        ChatCommands::Search { query } => {
            let result = ctx.api.chat_search(&query)?;
            let current = ctx.api.current_chat()?;
            print_sessions(&result.sessions, current.as_deref());
            result
        }
        ChatCommands::Export { id, output } => {
            let result = ctx.api.chat_export(id.as_deref())?;
            if let Some(transcript) = &result.transcript {
                write_transcript(transcript, output.as_deref())?;
            }
            result
        }
    };
    print_messages(&result.messages);
    Ok(())
}

fn print_last_messages(result: &CmdResult) {
    for session in &result.sessions {
        print_last_message(session);
    }
}

fn write_transcript(transcript: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, transcript)?;
            println!("Wrote {}", path.display());
        }
        None => print!("{}", transcript),
    }
    Ok(())
}

/// Checks behind `health`, also used to decide whether the host is online.
fn health_probes(data_dir: &Path) -> DeploymentMonitor {
    DeploymentMonitor::default().with_probe(StoreProbe::new(FileStore::new(data_dir)))
}

fn handle_misc(ctx: &mut AppContext, cmd: MiscCommands) -> Result<()> {
    let result = match cmd {
        MiscCommands::Init => ctx.api.init()?,
        MiscCommands::Export { dir } => {
            let dir = match dir {
                Some(dir) => dir,
                None => std::env::current_dir()?,
            };
            ctx.api.export(&dir, ctx.now)?
        }
        MiscCommands::Health => {
            let result = ctx.api.health(&health_probes(&ctx.data_dir), ctx.now)?;
            if let Some(health) = &result.health {
                print_health(health);
            }
            result
        }
        MiscCommands::Report { message, stack } => {
            let probes = health_probes(&ctx.data_dir);
            ctx.api
                .report_error(&message, stack.as_deref(), &probes, ctx.now)?
        }
        MiscCommands::Config { key, value } => {
            let show_all = key.is_none();
            let action = match (key, value) {
                (None, _) => ConfigAction::ShowAll,
                (Some(key), None) => ConfigAction::ShowKey(key),
                (Some(key), Some(value)) => ConfigAction::Set(key, value),
            };
            let result = ctx.api.config_action(action)?;
            if show_all {
                if let Some(config) = &result.config {
                    print_config(config);
                }
            }
            result
        }
    };
    print_messages(&result.messages);
    Ok(())
}
