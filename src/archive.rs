// Archive backend: zip extraction fallback for hosts without git

use anyhow::{Context, Result, bail};
use std::fs::File;
use std::path::Path;
use zip::ZipArchive;

/// Archive support is compiled in, but the availability snapshot in
/// install results still reports it.
pub fn is_available() -> bool {
    true
}

/// Unpack a zip archive into `dest`, creating it if needed. Entries that
/// would escape `dest` are rejected.
pub fn unzip(zip_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(zip_path)
        .with_context(|| format!("Failed to open archive {}", zip_path.display()))?;
    let mut archive = ZipArchive::new(file).context("Invalid zip file")?;

    std::fs::create_dir_all(dest)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            bail!("Archive entry escapes extraction dir: {}", entry.name());
        };
        let target = dest.join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&target)?;
            std::io::copy(&mut entry, &mut out)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::{FileOptions, ZipWriter};

    fn make_zip(path: &Path) {
        let file = File::create(path).unwrap();
        let mut writer = ZipWriter::new(file);
        let options: FileOptions<'_, ()> =
            FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        writer.add_directory("pkg-master/", options).unwrap();
        writer.start_file("pkg-master/hello.txt", options).unwrap();
        writer.write_all(b"hello").unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn unzip_extracts_tree() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("pkg.zip");
        make_zip(&zip_path);

        let dest = dir.path().join("out");
        unzip(&zip_path, &dest).unwrap();
        let text = std::fs::read_to_string(dest.join("pkg-master/hello.txt")).unwrap();
        assert_eq!(text, "hello");
    }

    #[test]
    fn unzip_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("not.zip");
        std::fs::write(&bogus, b"definitely not a zip").unwrap();
        assert!(unzip(&bogus, &dir.path().join("out")).is_err());
    }
}
