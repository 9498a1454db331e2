use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use zip::write::SimpleFileOptions;

static ARCHIVE_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Zip laid out like a GitHub branch archive of the game repository
pub fn game_archive(version: &str) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    writer.add_directory("Trimp-master/", options).unwrap();
    writer.start_file("Trimp-master/README.md", options).unwrap();
    writer.write_all(b"# Trimps").unwrap();

    writer.add_directory("Trimp-master/docs/", options).unwrap();
    writer.start_file("Trimp-master/docs/index.html", options).unwrap();
    writer.write_all(b"<html><body>Trimps</body></html>").unwrap();
    writer.start_file("Trimp-master/docs/version.json", options).unwrap();
    writer
        .write_all(format!(r#"{{"version": "{}"}}"#, version).as_bytes())
        .unwrap();
    writer.add_directory("Trimp-master/docs/js/", options).unwrap();
    writer.start_file("Trimp-master/docs/js/main.js", options).unwrap();
    writer.write_all(b"var game = {};").unwrap();

    writer.finish().unwrap().into_inner()
}

/// Write archive bytes to a fresh file under `dir`
pub fn write_archive(dir: &Path, bytes: &[u8]) -> PathBuf {
    let n = ARCHIVE_COUNTER.fetch_add(1, Ordering::SeqCst);
    let path = dir.join(format!("archive-{}.zip", n));
    std::fs::write(&path, bytes).unwrap();
    path
}
