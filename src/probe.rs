//! Try to guess the types of files on disk.

use common_failures::prelude::*;
use std::fs;
use std::io::Read;
use std::path::Path;

/// Internal helper function which looks for "magic" bytes at the start of
/// a file.
fn has_magic(path: &Path, magic: &[u8]) -> Result<bool> {
    let mut f = fs::File::open(path)
        .with_context(|_| format!("could not read {}", path.display()))?;
    let mut bytes = vec![0; magic.len()];
    f.read_exact(&mut bytes)
        .with_context(|_| format!("could not read {}", path.display()))?;
    Ok(magic == &bytes[..])
}

/// Does the specified path appear to point to an `*.idx` file?
pub fn is_idx_file<P: AsRef<Path>>(path: P) -> Result<bool> {
    has_magic(path.as_ref(), b"# VobSub index file")
}

/// Does the specified path appear to point to a `*.sub` file?
///
/// Note that this may (or may not) return false positives for certain
/// MPEG-2 related formats.
pub fn is_sub_file<P: AsRef<Path>>(path: P) -> Result<bool> {
    has_magic(path.as_ref(), &[0x00, 0x00, 0x01, 0xba])
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::process;

    use super::{is_idx_file, is_sub_file};

    #[test]
    fn probe_magic_bytes() {
        let dir = env::temp_dir();
        let idx = dir.join(format!("subdvd-probe-{}.idx", process::id()));
        let sub = dir.join(format!("subdvd-probe-{}.sub", process::id()));
        fs::write(&idx, "# VobSub index file, v7 (do not modify this line!)\n")
            .unwrap();
        fs::write(&sub, [0x00, 0x00, 0x01, 0xba, 0x44, 0x02]).unwrap();
        assert!(is_idx_file(&idx).unwrap());
        assert!(!is_idx_file(&sub).unwrap());
        assert!(is_sub_file(&sub).unwrap());
        assert!(!is_sub_file(&idx).unwrap());
        fs::remove_file(&idx).unwrap();
        fs::remove_file(&sub).unwrap();
    }
}
