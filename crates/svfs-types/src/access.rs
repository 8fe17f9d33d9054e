//! Volume capability flags.

use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// What a volume lets callers do.
    ///
    /// `FETCH` is always granted. The other flags are derived once, when the
    /// volume is constructed, from the capability traits its backend implements.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct VolumeAccess: u8 {
        /// Enumerate and probe entries.
        const FETCH = 1 << 0;
        /// Open and read file contents.
        const READ = 1 << 1;
        /// Create, delete, move, rename, duplicate and write entries.
        const WRITE = 1 << 2;
        /// Subscribe to change events.
        const WATCH = 1 << 3;
    }
}

impl VolumeAccess {
    /// Pure bitwise test: are all of `required` granted?
    pub fn grants(self, required: VolumeAccess) -> bool {
        self.contains(required)
    }
}

impl fmt::Display for VolumeAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let mut first = true;
        for (name, _) in self.iter_names() {
            if !first {
                f.write_str("|")?;
            }
            f.write_str(&name.to_ascii_lowercase())?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grants() {
        let access = VolumeAccess::FETCH | VolumeAccess::READ;
        assert!(access.grants(VolumeAccess::READ));
        assert!(!access.grants(VolumeAccess::WRITE));
        assert!(!access.grants(VolumeAccess::READ | VolumeAccess::WRITE));
    }

    #[test]
    fn test_display() {
        assert_eq!(VolumeAccess::WRITE.to_string(), "write");
        assert_eq!(
            (VolumeAccess::FETCH | VolumeAccess::WATCH).to_string(),
            "fetch|watch"
        );
        assert_eq!(VolumeAccess::empty().to_string(), "none");
    }
}
