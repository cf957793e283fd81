//! Flag words of both index formats
//!
//! Legacy entries carry a 16-bit flags word (plus a second one in version 3
//! when `EXTENDED` is set). The v5 format repacks those bits into one word
//! per file record and a different word per conflict part.

use bitflags::bitflags;

/// Merge stage, bits 12-13 of legacy and v5 file flags
const FILE_STAGE_SHIFT: u16 = 12;
/// Merge stage, bits 13-14 of v5 conflict part flags
const CONFLICT_STAGE_SHIFT: u16 = 13;

bitflags! {
    /// First flags word of a legacy entry
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct EntryFlags: u16 {
        const ASSUME_VALID = 0x8000;
        const EXTENDED = 0x4000;
        const STAGE = 0x3000;
        const NAME_LENGTH = 0x0fff;
    }
}

bitflags! {
    /// Second flags word, present in version 3 entries with `EXTENDED` set
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct ExtendedFlags: u16 {
        const SKIP_WORKTREE = 0x4000;
        const INTENT_TO_ADD = 0x2000;
    }
}

bitflags! {
    /// Flags of a v5 file record
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct FileFlags: u16 {
        const EXTENDED = 0x8000;
        const ASSUME_VALID = 0x4000;
        const STAGE = 0x3000;
        const SKIP_WORKTREE = 0x0800;
        const INTENT_TO_ADD = 0x0400;
    }
}

bitflags! {
    /// Flags of one part of a v5 conflict record
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct ConflictFlags: u16 {
        const CONFLICTED = 0x8000;
        const STAGE = 0x6000;
    }
}

impl EntryFlags {
    pub fn stage(&self) -> u8 {
        ((self.bits() & Self::STAGE.bits()) >> FILE_STAGE_SHIFT) as u8
    }

    pub fn name_length(&self) -> usize {
        (self.bits() & Self::NAME_LENGTH.bits()) as usize
    }

    /// Build the flags word for a name and stage; long names saturate at 0xfff
    pub fn for_entry(name_length: usize, stage: u8) -> Self {
        let length = name_length.min(Self::NAME_LENGTH.bits() as usize) as u16;
        Self::from_bits_retain(length | ((stage as u16) << FILE_STAGE_SHIFT))
    }
}

impl FileFlags {
    pub fn stage(&self) -> u8 {
        ((self.bits() & Self::STAGE.bits()) >> FILE_STAGE_SHIFT) as u8
    }

    pub fn with_stage(self, stage: u8) -> Self {
        let cleared = self.bits() & !Self::STAGE.bits();
        Self::from_bits_retain(cleared | (((stage as u16) << FILE_STAGE_SHIFT) & Self::STAGE.bits()))
    }

    /// Repack legacy flag words into a v5 file flags word
    pub fn from_legacy(flags: EntryFlags, extended: Option<ExtendedFlags>) -> Self {
        let mut result = Self::empty().with_stage(flags.stage());
        if flags.contains(EntryFlags::ASSUME_VALID) {
            result |= Self::ASSUME_VALID;
        }
        if let Some(extended) = extended {
            result |= Self::EXTENDED;
            if extended.contains(ExtendedFlags::SKIP_WORKTREE) {
                result |= Self::SKIP_WORKTREE;
            }
            if extended.contains(ExtendedFlags::INTENT_TO_ADD) {
                result |= Self::INTENT_TO_ADD;
            }
        }

        result
    }
}

impl ConflictFlags {
    pub fn stage(&self) -> u8 {
        ((self.bits() & Self::STAGE.bits()) >> CONFLICT_STAGE_SHIFT) as u8
    }

    pub fn for_stage(stage: u8, conflicted: bool) -> Self {
        let mut flags =
            Self::from_bits_retain(((stage as u16) << CONFLICT_STAGE_SHIFT) & Self::STAGE.bits());
        if conflicted {
            flags |= Self::CONFLICTED;
        }
        flags
    }
}
