//! Context Layout Versions
//!
//! Two context layouts exist under the same name and they are not binary
//! compatible:
//! - `0xFACADE10`: before safe calls; no flag, no result slot
//! - `0xFACADE11`: current; adds `file_base`, the safe-call flag and the
//!   result slot
//!
//! This crate speaks the current layout only. The legacy one is recognised
//! so it can be refused by name.

use thiserror::Error;

#[cfg(any(test, target_pointer_width = "32"))]
use super::ExecContext;

/// Maximum number of argument slots in the context.
pub const ARGC_MAX: usize = 64;

/// Free RAM the loader reserves for a binary.
pub const FREE_RAM_SIZE: usize = 4096;

/// Default execution stack size of a binary.
pub const EXEC_STACKSIZE_DEFAULT: usize = 1024;

/// High bits shared by every layout magic.
pub const MAGIC_NUMBER: u32 = 0xFACA_DE00;

/// Mask selecting the version byte of a magic.
const VERSION_MASK: u32 = 0xFF;

/// Known context layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LayoutVersion {
    /// Pre-safe-call layout
    Legacy = 0x10,
    /// Post-safe-call layout
    SafeCall = 0x11,
}

impl LayoutVersion {
    /// Layout implemented by [`ExecContext`].
    pub const CURRENT: Self = Self::SafeCall;

    /// Full magic-and-version word as stored in the image footer.
    #[inline]
    pub const fn magic(self) -> u32 {
        MAGIC_NUMBER | self as u32
    }

    /// Decode a magic-and-version word.
    pub fn from_magic(magic: u32) -> Result<Self, ContextError> {
        if magic & !VERSION_MASK != MAGIC_NUMBER {
            return Err(ContextError::BadMagic(magic));
        }
        match (magic & VERSION_MASK) as u8 {
            0x10 => Ok(Self::Legacy),
            0x11 => Ok(Self::SafeCall),
            other => Err(ContextError::UnknownVersion(other)),
        }
    }

    /// Accept only the layout this crate was built for.
    pub fn require_current(magic: u32) -> Result<Self, ContextError> {
        let version = Self::from_magic(magic)?;
        if version != Self::CURRENT {
            return Err(ContextError::Incompatible {
                found: version,
                expected: Self::CURRENT,
            });
        }
        Ok(version)
    }
}

/// Layout contract violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    /// High bits do not carry the magic number
    #[error("bad magic number {0:#010x}")]
    BadMagic(u32),
    /// Magic is right but the version byte is unknown
    #[error("unknown context layout version {0:#04x}")]
    UnknownVersion(u8),
    /// Known layout, but not the one this runtime speaks
    #[error("context layout {found:?} is not binary compatible with {expected:?}")]
    Incompatible {
        found: LayoutVersion,
        expected: LayoutVersion,
    },
}

// Wire size of the current layout on the 32-bit devices it is shared with.
#[cfg(target_pointer_width = "32")]
const _: () = assert!(core::mem::size_of::<ExecContext>() == 300);

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::{align_of, offset_of, size_of};

    #[test]
    fn test_magic_values() {
        assert_eq!(LayoutVersion::Legacy.magic(), 0xFACA_DE10);
        assert_eq!(LayoutVersion::SafeCall.magic(), 0xFACA_DE11);
        assert_eq!(LayoutVersion::CURRENT, LayoutVersion::SafeCall);
    }

    #[test]
    fn test_from_magic() {
        assert_eq!(LayoutVersion::from_magic(0xFACA_DE11), Ok(LayoutVersion::SafeCall));
        assert_eq!(LayoutVersion::from_magic(0xFACA_DE10), Ok(LayoutVersion::Legacy));
        assert_eq!(
            LayoutVersion::from_magic(0xFACA_DE12),
            Err(ContextError::UnknownVersion(0x12))
        );
        assert_eq!(
            LayoutVersion::from_magic(0xDEAD_BE11),
            Err(ContextError::BadMagic(0xDEAD_BE11))
        );
    }

    #[test]
    fn test_legacy_layout_refused() {
        assert_eq!(
            LayoutVersion::require_current(0xFACA_DE10),
            Err(ContextError::Incompatible {
                found: LayoutVersion::Legacy,
                expected: LayoutVersion::SafeCall,
            })
        );
        assert!(LayoutVersion::require_current(0xFACA_DE11).is_ok());
    }

    #[test]
    fn test_error_messages() {
        let msg = ContextError::BadMagic(0x1234).to_string();
        assert_eq!(msg, "bad magic number 0x00001234");
        let msg = ContextError::UnknownVersion(0x7).to_string();
        assert_eq!(msg, "unknown context layout version 0x07");
    }

    #[test]
    fn test_context_layout() {
        let word = size_of::<usize>();

        // Offsets are part of the loader contract.
        assert_eq!(offset_of!(ExecContext, bin_base), 0);
        assert_eq!(offset_of!(ExecContext, ram_start), word);
        assert_eq!(offset_of!(ExecContext, ram_end), 2 * word);
        assert_eq!(offset_of!(ExecContext, nvm_start), 3 * word);
        assert_eq!(offset_of!(ExecContext, nvm_end), 4 * word);
        assert_eq!(offset_of!(ExecContext, file_base), 5 * word);
        assert_eq!(offset_of!(ExecContext, is_safe_call), 6 * word);
        assert_eq!(offset_of!(ExecContext, argc), 6 * word + 4);

        let argv = (6 * word + 8).next_multiple_of(word);
        assert_eq!(offset_of!(ExecContext, argv), argv);
        let tables = argv + ARGC_MAX * word;
        assert_eq!(offset_of!(ExecContext, privileged_table), tables);
        assert_eq!(offset_of!(ExecContext, user_table), tables + word);
        assert_eq!(offset_of!(ExecContext, syscall_result), tables + 2 * word);

        assert_eq!(align_of::<ExecContext>(), word);
        assert_eq!(
            size_of::<ExecContext>(),
            (tables + 2 * word + 4).next_multiple_of(word)
        );
    }
}
