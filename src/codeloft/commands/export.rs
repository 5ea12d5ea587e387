use crate::commands::{CmdMessage, CmdResult};
use crate::error::{LoftError, Result};
use crate::model::{FileEntry, Workspace};
use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Write every workspace file into a `.tar.gz` under `dir`.
pub fn run(ws: &Workspace, dir: &Path, now: DateTime<Utc>) -> Result<CmdResult> {
    let entries = ws.entries();
    if entries.is_empty() {
        let mut res = CmdResult::default();
        res.add_message(CmdMessage::info("No files to export."));
        return Ok(res);
    }

    let path = archive_path(dir, now);
    let file = File::create(&path).map_err(LoftError::Io)?;
    write_archive(file, &entries, now)?;

    let mut result = CmdResult::default();
    result.add_message(CmdMessage::success(format!(
        "Exported {} file{} to {}",
        entries.len(),
        if entries.len() == 1 { "" } else { "s" },
        path.display()
    )));
    Ok(result)
}

fn archive_path(dir: &Path, now: DateTime<Utc>) -> PathBuf {
    dir.join(format!("codeloft-{}.tar.gz", now.format("%Y-%m-%d_%H-%M-%S")))
}

fn write_archive<W: Write>(writer: W, entries: &[FileEntry], now: DateTime<Utc>) -> Result<()> {
    let enc = GzEncoder::new(writer, Compression::default());
    let mut tar = tar::Builder::new(enc);

    for entry in entries {
        let name = format!("codeloft/{}", sanitize_path(&entry.filename));
        let mut header = tar::Header::new_gnu();
        header.set_size(entry.content.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(now.timestamp().max(0) as u64);
        header.set_cksum();

        tar.append_data(&mut header, name, entry.content.as_bytes())
            .map_err(LoftError::Io)?;
    }

    tar.into_inner()
        .and_then(|enc| enc.finish())
        .map_err(LoftError::Io)?;
    Ok(())
}

/// Keep folder structure but never escape the archive root.
fn sanitize_path(name: &str) -> String {
    name.split('/')
        .filter(|seg| !seg.is_empty() && *seg != "." && *seg != "..")
        .map(|seg| {
            seg.chars()
                .map(|c| if c.is_control() || c == '\\' { '_' } else { c })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        use chrono::TimeZone;
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn archive_contains_every_file() {
        let entries = vec![
            FileEntry::new("src/main.rs", "fn main() {}\n"),
            FileEntry::new("README.md", "# hi\n"),
        ];
        let mut buf = Vec::new();
        write_archive(&mut buf, &entries, now()).unwrap();
        assert_eq!(&buf[..2], &[0x1f, 0x8b]);

        let mut archive = tar::Archive::new(GzDecoder::new(&buf[..]));
        let mut found = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let path = entry.path().unwrap().display().to_string();
            let mut content = String::new();
            entry.read_to_string(&mut content).unwrap();
            found.push((path, content));
        }
        assert_eq!(
            found,
            vec![
                ("codeloft/src/main.rs".to_string(), "fn main() {}\n".to_string()),
                ("codeloft/README.md".to_string(), "# hi\n".to_string()),
            ]
        );
    }

    #[test]
    fn run_writes_into_directory() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::from_entries(vec![FileEntry::new("a.txt", "a")]);
        let result = run(&ws, dir.path(), now()).unwrap();

        assert!(dir.path().join("codeloft-2024-03-01_12-00-00.tar.gz").exists());
        assert!(result.messages[0].content.contains("1 file "));
    }

    #[test]
    fn sanitize() {
        assert_eq!(sanitize_path("src/app.ts"), "src/app.ts");
        assert_eq!(sanitize_path("../../etc/passwd"), "etc/passwd");
        assert_eq!(sanitize_path("a\\b.txt"), "a_b.txt");
    }
}
