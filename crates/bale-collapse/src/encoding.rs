//! Payload encoding classification.
//!
//! A collapsed object is only valid if every source shares one encoding:
//! concatenated gzip members form a valid multi-member stream, and
//! concatenated plaintext is plaintext, but a mix of the two is garbage.
//! The engine classifies every source and refuses to merge across classes.

/// Leading bytes of a gzip member.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Filename extension for gzip-compressed objects.
pub const GZIP_EXTENSION: &str = ".gz";

/// Payload encoding of one source object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingClass {
    /// A gzip-compressed stream.
    Compressed,
    /// Anything else.
    Plain,
}

impl EncodingClass {
    /// Returns the string name for this class.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Compressed => "compressed",
            Self::Plain => "plain",
        }
    }
}

impl std::fmt::Display for EncodingClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classifies an object from its leading two bytes and (optionally) its name.
///
/// `Compressed` only if the magic bytes are `1f 8b` AND the name, when one
/// is supplied, ends in `.gz`. Objects shorter than two bytes (`magic` is
/// `None`) classify as `Plain`.
#[must_use]
pub fn classify(magic: Option<[u8; 2]>, filename: Option<&str>) -> EncodingClass {
    let magic_matches = magic == Some(GZIP_MAGIC);
    let name_matches = filename.map_or(true, |name| name.ends_with(GZIP_EXTENSION));
    if magic_matches && name_matches {
        EncodingClass::Compressed
    } else {
        EncodingClass::Plain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_magic_and_extension_is_compressed() {
        assert_eq!(
            classify(Some(GZIP_MAGIC), Some("logs/2024-01-01-access.gz")),
            EncodingClass::Compressed
        );
    }

    #[test]
    fn gzip_magic_without_extension_is_plain() {
        // A plaintext log that happens to start with 1f 8b must not drag the
        // whole operation into compressed mode.
        assert_eq!(
            classify(Some(GZIP_MAGIC), Some("logs/2024-01-01-access.log")),
            EncodingClass::Plain
        );
    }

    #[test]
    fn extension_without_magic_is_plain() {
        assert_eq!(
            classify(Some([b'h', b'i']), Some("archive.gz")),
            EncodingClass::Plain
        );
    }

    #[test]
    fn missing_filename_skips_extension_check() {
        assert_eq!(classify(Some(GZIP_MAGIC), None), EncodingClass::Compressed);
        assert_eq!(classify(Some([0, 0]), None), EncodingClass::Plain);
    }

    #[test]
    fn short_objects_are_plain() {
        assert_eq!(classify(None, Some("tiny.gz")), EncodingClass::Plain);
        assert_eq!(classify(None, None), EncodingClass::Plain);
    }
}
