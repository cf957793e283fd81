use crate::areas::index_v5::IndexV5;
use crate::areas::repository::Repository;
use crate::artifacts::index::SIGNATURE;
use crate::artifacts::index::conflict::ConflictKind;
use crate::artifacts::index::directory_entry::disk_name;
use crate::artifacts::index::file_entry::FileEntry;
use anyhow::Context;
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct LsFilesOptions {
    pub file: Option<PathBuf>,
    pub header: bool,
    pub verbose: bool,
    pub directories: bool,
    pub conflicts: bool,
}

fn format_mtime(file: &FileEntry) -> String {
    match chrono::DateTime::from_timestamp(file.mtime as i64, file.mtime_nsec) {
        Some(mtime) => mtime.format("%Y-%m-%d %H:%M:%S%.9f UTC").to_string(),
        None => format!("{}:{}", file.mtime, file.mtime_nsec),
    }
}

impl Repository {
    pub fn ls_files(&self, options: &LsFilesOptions) -> anyhow::Result<()> {
        let path = self.index_v5_path(options.file.as_deref());
        let index =
            IndexV5::load(&path).with_context(|| format!("failed to read {}", path.display()))?;

        if options.header {
            self.list_v5_header(&index)?;
        }
        if options.directories {
            self.list_directories(&index)?;
        }

        let mut writer = self.writer();
        for file in index.files() {
            if options.verbose {
                writeln!(
                    writer,
                    "{} {} {}\t{}",
                    file.mode,
                    file.oid,
                    file.stage(),
                    file.path
                )?;
                writeln!(writer, "  mtime: {}", format_mtime(file))?;
                writeln!(
                    writer,
                    "  statcrc: {:08x}\tflags: {:04x}",
                    file.stat_crc,
                    file.flags.bits()
                )?;
            } else {
                writeln!(writer, "{}", file.path)?;
            }
        }
        drop(writer);

        if options.conflicts {
            self.list_conflicts(&index)?;
        }

        Ok(())
    }

    fn list_v5_header(&self, index: &IndexV5) -> anyhow::Result<()> {
        let header = index.header();
        let mut writer = self.writer();
        writeln!(
            writer,
            "Signature: {}\t\t\tVersion: 5",
            String::from_utf8_lossy(SIGNATURE)
        )?;
        writeln!(writer, "Number of directories: {}", header.directories)?;
        writeln!(writer, "Number of files: {}", header.files)?;
        writeln!(writer, "Offset to file block: {}", header.file_offset)?;
        writeln!(
            writer,
            "Number of extensions: {}",
            header.extension_offsets.len()
        )?;

        Ok(())
    }

    fn list_directories(&self, index: &IndexV5) -> anyhow::Result<()> {
        let mut writer = self.writer();
        for directory in index.directories() {
            let tree = match directory.oid.filter(|_| directory.nentries >= 0) {
                Some(oid) => format!("{oid} ({} entries)", directory.nentries),
                None => "invalid".to_string(),
            };
            writeln!(
                writer,
                "{} {} files, {} subtrees, {} conflicts, tree {}",
                disk_name(&directory.path),
                directory.nfiles,
                directory.nsubtrees,
                directory.nconflicts,
                tree
            )?;
        }

        Ok(())
    }

    fn list_conflicts(&self, index: &IndexV5) -> anyhow::Result<()> {
        let mut writer = self.writer();
        for conflict in index.conflicts() {
            let kind = match conflict.kind {
                ConflictKind::Unmerged => "unmerged",
                ConflictKind::ResolveUndo => "resolve-undo",
            };
            writeln!(writer, "{kind} {}", conflict.path)?;
            for part in &conflict.parts {
                writeln!(writer, "  {} {} {}", part.mode, part.oid, part.stage)?;
            }
        }

        Ok(())
    }
}
