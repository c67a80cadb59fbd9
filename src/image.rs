//! Relocatable Image
//!
//! A binary is stored in the host filesystem as one little-endian image:
//!
//! ```text
//! +------------------+ 0
//! | crt0             |
//! +------------------+ crt0_size
//! | binary size      | u32, whole image length
//! | relocation count | u32
//! | relocations      | count * u32
//! +------------------+
//! | partition        | .rom.ram, .rom, GOT
//! | 0xFF padding     | up to a 32-byte MPU boundary
//! +------------------+ len - 28
//! | footer           | 7 * u32
//! +------------------+ len
//! ```
//!
//! The runtime only reads images; building them is the host toolchain's job.

use thiserror::Error;

use crate::context::{ContextError, LayoutVersion};

/// Bytes in one image word.
pub const WORD_SIZE: usize = 4;

/// Footer length.
pub const FOOTER_SIZE: usize = 7 * WORD_SIZE;

/// Binary size word, relocation count and footer.
pub const MINIMAL_SIZE: usize = 2 * WORD_SIZE + FOOTER_SIZE;

/// Images are padded to a multiple of this (ARMv7-M MPU granule).
pub const MPU_ALIGNMENT: usize = 32;

/// Padding byte: the erased state of NOR/NAND flash.
pub const PADDING_BYTE: u8 = 0xFF;

/// Image parse failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("image of {len} bytes is not larger than the minimal {min}")]
    TooShort { len: usize, min: usize },

    #[error("{field} ({value}) is not below the image size {len}")]
    OutOfBounds {
        field: &'static str,
        value: usize,
        len: usize,
    },

    #[error("crt0 size is zero")]
    EmptyCrt0,

    #[error("stored binary size {stored} differs from image size {actual}")]
    SizeMismatch { stored: u32, actual: usize },

    #[error(transparent)]
    Layout(#[from] ContextError),
}

/// The 28-byte trailer, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    /// `.bss` size
    pub ram_size: u32,
    pub got_size: u32,
    /// `.text` size
    pub rom_size: u32,
    /// `.data` size
    pub rom_ram_size: u32,
    /// Offset of `start` in `.rom`
    pub entrypoint: u32,
    pub crt0_size: u32,
    pub magic: u32,
}

impl Footer {
    /// Read and check the footer at the end of `image`.
    pub fn parse(image: &[u8]) -> Result<Self, ImageError> {
        let len = image.len();
        if len <= MINIMAL_SIZE {
            return Err(ImageError::TooShort {
                len,
                min: MINIMAL_SIZE,
            });
        }

        let base = len - FOOTER_SIZE;
        let field = |n: usize| read_word(image, base + n * WORD_SIZE).unwrap_or(0);
        let footer = Self {
            ram_size: field(0),
            got_size: field(1),
            rom_size: field(2),
            rom_ram_size: field(3),
            entrypoint: field(4),
            crt0_size: field(5),
            magic: field(6),
        };

        LayoutVersion::require_current(footer.magic)?;

        if footer.crt0_size == 0 {
            return Err(ImageError::EmptyCrt0);
        }
        for (name, value) in [
            ("crt0 size", footer.crt0_size),
            ("entry point", footer.entrypoint),
            ("rom_ram size", footer.rom_ram_size),
            ("rom size", footer.rom_size),
            ("got size", footer.got_size),
        ] {
            below(name, value as usize, len)?;
        }
        Ok(footer)
    }

    /// Layout the image was built for.
    pub fn layout(&self) -> Result<LayoutVersion, ContextError> {
        LayoutVersion::from_magic(self.magic)
    }
}

/// A parsed image borrowing its bytes.
#[derive(Debug, Clone, Copy)]
pub struct Image<'a> {
    bytes: &'a [u8],
    footer: Footer,
    relocation_count: usize,
}

impl<'a> Image<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, ImageError> {
        let footer = Footer::parse(bytes)?;
        let len = bytes.len();
        let crt0 = footer.crt0_size as usize;

        let stored = read_word(bytes, crt0).ok_or(ImageError::OutOfBounds {
            field: "binary size word",
            value: crt0 + WORD_SIZE,
            len,
        })?;
        if stored as usize != len {
            return Err(ImageError::SizeMismatch {
                stored,
                actual: len,
            });
        }

        let count_at = crt0 + WORD_SIZE;
        let relocation_count = read_word(bytes, count_at).ok_or(ImageError::OutOfBounds {
            field: "relocation count",
            value: count_at + WORD_SIZE,
            len,
        })? as usize;
        let table_size = relocation_count.saturating_mul(WORD_SIZE);
        below("relocation table size", table_size, len)?;
        below(
            "relocation table end",
            count_at + WORD_SIZE + table_size,
            len - FOOTER_SIZE + 1,
        )?;

        Ok(Self {
            bytes,
            footer,
            relocation_count,
        })
    }

    pub fn footer(&self) -> &Footer {
        &self.footer
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Startup code, executed first by the loader.
    pub fn crt0(&self) -> &'a [u8] {
        &self.bytes[..self.footer.crt0_size as usize]
    }

    /// Offsets the loader patches when relocating `.rom.ram`.
    pub fn relocations(&self) -> impl Iterator<Item = u32> + 'a {
        let start = self.footer.crt0_size as usize + 2 * WORD_SIZE;
        let bytes = self.bytes;
        (0..self.relocation_count).filter_map(move |i| read_word(bytes, start + i * WORD_SIZE))
    }

    /// Everything between the relocation table and the footer, padding
    /// included.
    pub fn partition(&self) -> &'a [u8] {
        let start = self.footer.crt0_size as usize
            + 2 * WORD_SIZE
            + self.relocation_count * WORD_SIZE;
        &self.bytes[start..self.bytes.len() - FOOTER_SIZE]
    }

    /// Whether the image length sits on an MPU boundary.
    pub fn is_mpu_aligned(&self) -> bool {
        self.bytes.len() % MPU_ALIGNMENT == 0
    }
}

fn below(field: &'static str, value: usize, len: usize) -> Result<(), ImageError> {
    if value >= len {
        return Err(ImageError::OutOfBounds { field, value, len });
    }
    Ok(())
}

fn read_word(bytes: &[u8], at: usize) -> Option<u32> {
    let word = bytes.get(at..at.checked_add(WORD_SIZE)?)?;
    Some(u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    struct Builder {
        crt0: Vec<u8>,
        relocations: Vec<u32>,
        partition: Vec<u8>,
        magic: u32,
    }

    impl Builder {
        fn new() -> Self {
            Self {
                crt0: vec![0xAA; 12],
                relocations: vec![0x10, 0x24],
                partition: vec![0x55; 30],
                magic: LayoutVersion::CURRENT.magic(),
            }
        }

        fn build(&self) -> Vec<u8> {
            let body = self.crt0.len() + 8 + self.relocations.len() * 4 + self.partition.len();
            let total = (body + FOOTER_SIZE).next_multiple_of(MPU_ALIGNMENT);

            let mut out = self.crt0.clone();
            out.extend((total as u32).to_le_bytes());
            out.extend((self.relocations.len() as u32).to_le_bytes());
            for r in &self.relocations {
                out.extend(r.to_le_bytes());
            }
            out.extend(&self.partition);
            out.resize(total - FOOTER_SIZE, PADDING_BYTE);
            for word in [8u32, 4, 20, 16, 2, self.crt0.len() as u32, self.magic] {
                out.extend(word.to_le_bytes());
            }
            out
        }
    }

    #[test]
    fn test_parse_footer() {
        let bytes = Builder::new().build();
        let footer = Footer::parse(&bytes).unwrap();
        assert_eq!(footer.ram_size, 8);
        assert_eq!(footer.got_size, 4);
        assert_eq!(footer.rom_size, 20);
        assert_eq!(footer.rom_ram_size, 16);
        assert_eq!(footer.entrypoint, 2);
        assert_eq!(footer.crt0_size, 12);
        assert_eq!(footer.layout(), Ok(LayoutVersion::SafeCall));
    }

    #[test]
    fn test_image_sections() {
        let bytes = Builder::new().build();
        let image = Image::parse(&bytes).unwrap();
        assert!(image.is_mpu_aligned());
        assert_eq!(image.crt0(), &[0xAA; 12][..]);
        assert_eq!(image.relocations().collect::<Vec<_>>(), vec![0x10, 0x24]);

        let partition = image.partition();
        assert_eq!(partition.len(), 40);
        assert_eq!(&partition[..30], &[0x55; 30][..]);
        assert!(partition[30..].iter().all(|b| *b == PADDING_BYTE));
    }

    #[test]
    fn test_too_short() {
        let bytes = [0u8; MINIMAL_SIZE];
        assert_eq!(
            Footer::parse(&bytes),
            Err(ImageError::TooShort { len: 36, min: 36 })
        );
    }

    #[test]
    fn test_legacy_layout_refused() {
        let mut builder = Builder::new();
        builder.magic = LayoutVersion::Legacy.magic();
        let bytes = builder.build();
        assert!(matches!(
            Footer::parse(&bytes),
            Err(ImageError::Layout(ContextError::Incompatible { .. }))
        ));
    }

    #[test]
    fn test_bad_magic() {
        let mut builder = Builder::new();
        builder.magic = 0xDEAD_BE11;
        let bytes = builder.build();
        assert_eq!(
            Footer::parse(&bytes),
            Err(ImageError::Layout(ContextError::BadMagic(0xDEAD_BE11)))
        );
    }

    #[test]
    fn test_crt0_out_of_bounds() {
        let mut bytes = Builder::new().build();
        let len = bytes.len();
        bytes[len - 8..len - 4].copy_from_slice(&(len as u32).to_le_bytes());
        assert!(matches!(
            Footer::parse(&bytes),
            Err(ImageError::OutOfBounds { field: "crt0 size", .. })
        ));
    }

    #[test]
    fn test_size_mismatch() {
        let mut bytes = Builder::new().build();
        bytes[12..16].copy_from_slice(&1000u32.to_le_bytes());
        assert_eq!(
            Image::parse(&bytes).unwrap_err(),
            ImageError::SizeMismatch {
                stored: 1000,
                actual: bytes.len()
            }
        );
    }

    #[test]
    fn test_relocation_count_overflow() {
        let mut bytes = Builder::new().build();
        bytes[16..20].copy_from_slice(&0x4000_0000u32.to_le_bytes());
        assert!(matches!(
            Image::parse(&bytes),
            Err(ImageError::OutOfBounds { .. })
        ));
    }
}
