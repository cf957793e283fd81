use crate::areas::index_v5::IndexV5;
use crate::areas::legacy_index::LegacyIndex;
use crate::areas::repository::Repository;
use anyhow::Context;
use colored::Colorize;
use std::io::Write;
use std::path::Path;

impl Repository {
    /// Check that the v5 index holds exactly what converting the legacy
    /// index produces; a mismatch is an error after it has been reported
    pub fn verify(&self, input: Option<&Path>, file: Option<&Path>) -> anyhow::Result<()> {
        let input = self.legacy_index_path(input);
        let file = self.index_v5_path(file);

        let legacy = LegacyIndex::load(&input)
            .with_context(|| format!("failed to read index {}", input.display()))?;
        let index =
            IndexV5::load(&file).with_context(|| format!("failed to read {}", file.display()))?;

        let mismatches = index.verify_against(&legacy)?;
        let mut writer = self.writer();
        if mismatches.is_empty() {
            writeln!(
                writer,
                "{} {} matches {}",
                "OK".green().bold(),
                file.display(),
                input.display()
            )?;
            return Ok(());
        }

        writeln!(
            writer,
            "{} {} does not match {}",
            "FAILED".red().bold(),
            file.display(),
            input.display()
        )?;
        for mismatch in &mismatches {
            writeln!(writer, "  {mismatch}")?;
        }

        anyhow::bail!("{} mismatches", mismatches.len())
    }
}
