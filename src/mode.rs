//! Python-style open modes (`"r"`, `"w+"`, `"xb"`, ...) and their mapping to
//! remote open flags.

use std::{fmt, str::FromStr};

use crate::{
    error::{FsError, Result},
    remote::OpenFlags,
};

const VALID_CHARS: &str = "rwxtab+";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mode {
    mode: String,
}

impl Mode {
    pub fn new(mode: &str) -> Result<Mode> {
        let parsed = Mode { mode: mode.to_owned() };
        parsed.validate()?;
        Ok(parsed)
    }

    fn invalid(&self, message: &str) -> FsError {
        FsError::InvalidMode {
            mode: self.mode.clone(),
            message: message.to_owned(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.mode.is_empty() {
            return Err(self.invalid("mode must not be empty"));
        }
        if let Some(c) = self.mode.chars().find(|c| !VALID_CHARS.contains(*c)) {
            return Err(self.invalid(&format!("unknown mode character {c:?}")));
        }
        if !self.mode.chars().any(|c| "rwxa".contains(c)) {
            return Err(self.invalid("mode must contain one of 'r', 'w', 'x' or 'a'"));
        }
        if self.mode.chars().filter(|c| "rwxa".contains(*c)).count() > 1 {
            return Err(self.invalid("mode must contain only one of 'r', 'w', 'x' or 'a'"));
        }
        if self.has('t') && self.has('b') {
            return Err(self.invalid("mode can't be binary ('b') and text ('t')"));
        }
        Ok(())
    }

    /// Fails unless the mode is usable for a binary file.
    pub fn validate_bin(&self) -> Result<()> {
        if self.has('t') {
            return Err(self.invalid("mode must be binary"));
        }
        Ok(())
    }

    fn has(&self, c: char) -> bool {
        self.mode.contains(c)
    }

    pub fn reading(&self) -> bool {
        self.has('r') || self.has('+')
    }

    pub fn writing(&self) -> bool {
        self.has('w') || self.has('a') || self.has('x') || self.has('+')
    }

    pub fn appending(&self) -> bool {
        self.has('a')
    }

    pub fn updating(&self) -> bool {
        self.has('+')
    }

    pub fn truncate(&self) -> bool {
        self.has('w') || self.has('x')
    }

    pub fn exclusive(&self) -> bool {
        self.has('x')
    }

    pub fn create(&self) -> bool {
        self.has('a') || self.has('w') || self.has('x')
    }

    pub fn binary(&self) -> bool {
        !self.has('t')
    }

    /// The mode with `t` removed and `b` forced.
    pub fn to_platform_bin(&self) -> String {
        let mut mode: String = self.mode.chars().filter(|c| *c != 't' && *c != 'b').collect();
        mode.push('b');
        mode
    }

    pub fn to_open_flags(&self) -> OpenFlags {
        let mut flags = OpenFlags::empty();
        if self.reading() {
            flags |= OpenFlags::READ;
        }
        if self.writing() {
            flags |= OpenFlags::WRITE;
        }
        if self.create() {
            flags |= OpenFlags::CREATE;
        }
        if self.has('w') {
            flags |= OpenFlags::TRUNCATE;
        }
        if self.appending() {
            flags |= OpenFlags::APPEND;
        }
        if self.exclusive() {
            flags |= OpenFlags::EXCLUDE;
        }
        flags
    }
}

impl FromStr for Mode {
    type Err = FsError;

    fn from_str(mode: &str) -> Result<Mode> {
        Mode::new(mode)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_mode() {
        let mode = Mode::new("r").unwrap();
        assert!(mode.reading());
        assert!(!mode.writing());
        assert!(!mode.create());
        assert_eq!(mode.to_open_flags(), OpenFlags::READ);
        assert_eq!(mode.to_platform_bin(), "rb");
    }

    #[test]
    fn write_modes_map_to_flags() {
        assert_eq!(
            Mode::new("w").unwrap().to_open_flags(),
            OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE
        );
        assert_eq!(
            Mode::new("a+").unwrap().to_open_flags(),
            OpenFlags::READ | OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::APPEND
        );
        assert_eq!(
            Mode::new("xb").unwrap().to_open_flags(),
            OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::EXCLUDE
        );
        assert_eq!(
            Mode::new("r+").unwrap().to_open_flags(),
            OpenFlags::READ | OpenFlags::WRITE
        );
    }

    #[test]
    fn invalid_modes_are_rejected() {
        for mode in ["", "q", "rw", "+", "rtb"] {
            assert!(
                matches!(Mode::new(mode), Err(FsError::InvalidMode { .. })),
                "{mode} should be invalid"
            );
        }
        assert!(Mode::new("rt").unwrap().validate_bin().is_err());
        assert!(Mode::new("rb").unwrap().validate_bin().is_ok());
    }
}
