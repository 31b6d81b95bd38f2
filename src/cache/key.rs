// Cache key derivation.
// Builds a human-readable, lossy fingerprint of call arguments and maps it to an entry path.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Key used when the arguments render to an empty string.
pub const EMPTY_KEY: &str = "NA";

/// Characters kept from each mapping key.
const MAPPING_KEY_CHARS: usize = 10;
/// Characters kept from each mapping value or sequence element.
const VALUE_CHARS: usize = 20;
/// Longest file name most filesystems accept, in bytes.
const MAX_FILE_NAME_BYTES: usize = 255;
/// Hex digits of the key digest appended to shortened file names.
const DIGEST_SUFFIX_CHARS: usize = 16;

/// One argument group contributing to a cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPart {
    /// Ordered elements, rendered in order.
    Sequence(Vec<String>),
    /// Key/value pairs, rendered in ascending key order.
    Mapping(BTreeMap<String, String>),
}

/// Arguments of one call: positional values plus keyword values.
///
/// Values are captured through `Display`, which is also what the key is built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallArgs {
    pub positional: Vec<String>,
    pub keyword: BTreeMap<String, String>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Display) -> Self {
        self.positional.push(value.to_string());
        self
    }

    /// Set a keyword argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Display) -> Self {
        self.keyword.insert(name.into(), value.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }

    /// The positional tuple as one sequence, the keywords as one mapping.
    pub fn key_parts(&self) -> [KeyPart; 2] {
        [
            KeyPart::Sequence(self.positional.clone()),
            KeyPart::Mapping(self.keyword.clone()),
        ]
    }

    /// Derive the cache key for these arguments.
    pub fn key(&self) -> String {
        derive_key(&self.key_parts())
    }
}

/// Render argument groups into a cache key.
///
/// Truncation makes this lossy: arguments sharing long prefixes collide.
pub fn derive_key(parts: &[KeyPart]) -> String {
    let mut name = String::new();

    for part in parts {
        match part {
            KeyPart::Mapping(map) => {
                for (key, value) in map {
                    name.extend(key.chars().take(MAPPING_KEY_CHARS));
                    name.extend(value.chars().take(VALUE_CHARS));
                }
            }
            KeyPart::Sequence(items) => {
                for item in items {
                    name.extend(item.chars().take(VALUE_CHARS));
                }
            }
        }
    }

    if name.is_empty() {
        EMPTY_KEY.to_string()
    } else {
        name
    }
}

/// Path of the entry for `key` inside a namespace directory.
///
/// Keys too long for a file name keep a readable prefix and end with a
/// digest of the full key, so distinct keys stay distinct.
pub fn entry_path(namespace_dir: &Path, key: &str) -> PathBuf {
    namespace_dir.join(file_name_for(key))
}

fn file_name_for(key: &str) -> String {
    let name = sanitize_name(key);
    if name.len() <= MAX_FILE_NAME_BYTES {
        return name;
    }

    let digest = format!("{:x}", Sha256::digest(key.as_bytes()));
    let budget = MAX_FILE_NAME_BYTES - DIGEST_SUFFIX_CHARS - 1;
    let mut cut = budget;
    while !name.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}-{}", &name[..cut], &digest[..DIGEST_SUFFIX_CHARS])
}

/// Sanitize a name for use as a single filesystem path component.
/// Replaces problematic characters with underscores. A leading dot is
/// replaced too, since dot-files in a namespace belong to in-flight writes.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .enumerate()
        .map(|(i, c)| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0' => '_',
            '.' if i == 0 => '_',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_args_use_placeholder() {
        assert_eq!(CallArgs::new().key(), "NA");
        assert_eq!(derive_key(&[]), "NA");
        assert_eq!(
            derive_key(&[
                KeyPart::Sequence(Vec::new()),
                KeyPart::Mapping(BTreeMap::new())
            ]),
            "NA"
        );
    }

    #[test]
    fn test_mapping_truncation() {
        let args = CallArgs::new().kwarg("alpha", "x".repeat(30));
        assert_eq!(args.key(), format!("alpha{}", "x".repeat(20)));

        let args = CallArgs::new().kwarg("a_very_long_keyword", "v");
        assert_eq!(args.key(), "a_very_lonv");
    }

    #[test]
    fn test_mapping_sorted_by_key() {
        let args = CallArgs::new().kwarg("b", 2).kwarg("a", 1);
        assert_eq!(args.key(), "a1b2");
    }

    #[test]
    fn test_sequence_in_order() {
        let args = CallArgs::new().arg(1).arg(2).arg("y".repeat(25));
        assert_eq!(args.key(), format!("12{}", "y".repeat(20)));
    }

    #[test]
    fn test_positional_before_keyword() {
        let args = CallArgs::new().kwarg("c", 3).arg(1).arg(2);
        assert_eq!(args.key(), "12c3");
    }

    #[test]
    fn test_truncation_counts_chars() {
        let args = CallArgs::new().arg("é".repeat(25));
        assert_eq!(args.key(), "é".repeat(20));
    }

    #[test]
    fn test_key_is_deterministic() {
        let build = || CallArgs::new().arg("x").kwarg("k", 1.5).kwarg("j", true);
        assert_eq!(build().key(), build().key());
        assert_eq!(build().key(), "xjtruek1.5");
    }

    #[test]
    fn test_truncation_collides() {
        let long = "z".repeat(20);
        let a = CallArgs::new().arg(format!("{long}A"));
        let b = CallArgs::new().arg(format!("{long}B"));
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("simple"), "simple");
        assert_eq!(sanitize_name("with/slash"), "with_slash");
        assert_eq!(sanitize_name("owner:name"), "owner_name");
        assert_eq!(sanitize_name(".."), "_.");
        assert_eq!(sanitize_name(".tmpXYZ"), "_tmpXYZ");
        assert_eq!(sanitize_name("v1.5"), "v1.5");
    }

    #[test]
    fn test_entry_path() {
        let path = entry_path(Path::new("root/ns"), "a/b");
        assert!(path.ends_with("ns/a_b"));
    }

    fn many_kwargs(last: &str) -> CallArgs {
        (0..10).fold(CallArgs::new(), |args, i| {
            let value = if i == 9 { last.to_string() } else { "v".repeat(20) };
            args.kwarg(format!("keyword_{i:02}"), value)
        })
    }

    #[test]
    fn test_long_key_fits_in_file_name() {
        let args = many_kwargs(&"w".repeat(20));
        assert_eq!(args.key().len(), 300);

        let path = entry_path(Path::new("ns"), &args.key());
        let name = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(name.len(), MAX_FILE_NAME_BYTES);
        assert!(args.key().starts_with(&name[..200]));

        // Same key, same file across calls
        assert_eq!(path, entry_path(Path::new("ns"), &args.key()));
    }

    #[test]
    fn test_long_keys_differing_at_the_end_stay_distinct() {
        let a = many_kwargs(&"a".repeat(20));
        let b = many_kwargs(&"b".repeat(20));

        assert_ne!(
            entry_path(Path::new("ns"), &a.key()),
            entry_path(Path::new("ns"), &b.key())
        );
    }

    #[test]
    fn test_long_multibyte_key_cut_on_char_boundary() {
        let key = "é".repeat(200);
        let path = entry_path(Path::new("ns"), &key);
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.len() <= MAX_FILE_NAME_BYTES);
    }
}
