use crate::areas::index_v5::IndexV5;
use crate::areas::legacy_index::LegacyIndex;
use crate::areas::lockfile::Lockfile;
use crate::areas::repository::Repository;
use crate::areas::v5_writer::{self, WriteSummary};
use crate::artifacts::index::SIGNATURE;
use crate::artifacts::index::conflict::STAGES;
use crate::artifacts::index::directory_entry::disk_name;
use anyhow::Context;
use std::io::Write;
use std::path::PathBuf;
use tracing::debug;

/// What `convert` reads, writes and lists
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub header: bool,
    pub entries: bool,
    pub cache_tree: bool,
    pub resolve_undo: bool,
    /// Skip re-reading the written file before it replaces the target
    pub no_verify: bool,
}

impl Repository {
    pub fn convert(&self, options: &ConvertOptions) -> anyhow::Result<WriteSummary> {
        let input = self.legacy_index_path(options.input.as_deref());
        let index = LegacyIndex::load(&input)
            .with_context(|| format!("failed to read index {}", input.display()))?;

        if options.header {
            self.list_legacy_header(&index)?;
        }
        if options.entries {
            self.list_legacy_entries(&index)?;
        }
        if options.cache_tree {
            self.list_cache_tree(&index)?;
        }
        if options.resolve_undo {
            self.list_resolve_undo(&index)?;
        }

        let output = self.index_v5_path(options.output.as_deref());
        let mut lockfile = Lockfile::acquire(&output)
            .with_context(|| format!("failed to lock {}", output.display()))?;
        let summary = v5_writer::write_v5(&index, &mut lockfile)
            .with_context(|| format!("failed to convert {}", input.display()))?;

        if options.no_verify {
            debug!("skipping verification of the written index");
        } else {
            let written = IndexV5::parse(&lockfile.contents()?)
                .context("written index does not read back")?;
            let mismatches = written.verify_against(&index)?;
            if !mismatches.is_empty() {
                anyhow::bail!(
                    "written index does not match {}: {}",
                    input.display(),
                    mismatches.join("; ")
                );
            }
        }
        lockfile.commit()?;

        writeln!(
            self.writer(),
            "Wrote {} ({} directories, {} files, {} conflicts, {} bytes)",
            output.display(),
            summary.directories,
            summary.files,
            summary.conflicts,
            summary.bytes
        )?;

        Ok(summary)
    }

    fn list_legacy_header(&self, index: &LegacyIndex) -> anyhow::Result<()> {
        let mut writer = self.writer();
        writeln!(
            writer,
            "Signature: {}\t\t\tVersion: {}",
            String::from_utf8_lossy(SIGNATURE),
            index.version()
        )?;
        writeln!(writer, "Number of entries: {}", index.header().entries_count)?;

        Ok(())
    }

    /// `git ls-files --stage --debug` layout
    fn list_legacy_entries(&self, index: &LegacyIndex) -> anyhow::Result<()> {
        let mut writer = self.writer();
        for entry in index.entries() {
            let metadata = &entry.metadata;
            writeln!(
                writer,
                "{} {} {}\t{}",
                metadata.mode,
                entry.oid,
                entry.stage(),
                entry.name
            )?;
            writeln!(writer, "  ctime: {}:{}", metadata.ctime, metadata.ctime_nsec)?;
            writeln!(writer, "  mtime: {}:{}", metadata.mtime, metadata.mtime_nsec)?;
            writeln!(writer, "  dev: {}\tino: {}", metadata.dev, metadata.ino)?;
            writeln!(writer, "  uid: {}\tgid: {}", metadata.uid, metadata.gid)?;
            writeln!(
                writer,
                "  size: {}\tflags: {:x}",
                metadata.size,
                entry.flags.bits()
            )?;
        }

        Ok(())
    }

    /// `test-dump-cache-tree` layout
    fn list_cache_tree(&self, index: &LegacyIndex) -> anyhow::Result<()> {
        let mut writer = self.writer();
        for entry in index.cache_tree().entries() {
            match entry.oid.filter(|_| entry.is_valid()) {
                Some(oid) => writeln!(
                    writer,
                    "{} {} ({} entries, {} subtrees)",
                    oid,
                    disk_name(&entry.path),
                    entry.entry_count,
                    entry.subtrees
                )?,
                None => writeln!(
                    writer,
                    "{:<40} {} ({} subtrees)",
                    "invalid",
                    disk_name(&entry.path),
                    entry.subtrees
                )?,
            }
        }

        Ok(())
    }

    fn list_resolve_undo(&self, index: &LegacyIndex) -> anyhow::Result<()> {
        let mut writer = self.writer();
        for record in index.resolve_undo() {
            writeln!(writer, "Path: {}", record.path)?;
            for (stage, slot) in (1..=STAGES).zip(&record.stages) {
                match slot {
                    Some((mode, _)) => writeln!(writer, "Entrymode {stage}: {mode}")?,
                    None => writeln!(writer, "Entrymode {stage}: 0")?,
                }
            }
            for (stage, slot) in (1..=STAGES).zip(&record.stages) {
                if let Some((_, oid)) = slot {
                    writeln!(writer, "Objectnames {stage}: {oid}")?;
                }
            }
        }

        Ok(())
    }
}
