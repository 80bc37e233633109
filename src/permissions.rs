use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// The twelve POSIX permission bits of a mode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Permissions: u32 {
        const SETUID = 0o4000;
        const SETGUID = 0o2000;
        const STICKY = 0o1000;
        const U_R = 0o400;
        const U_W = 0o200;
        const U_X = 0o100;
        const G_R = 0o040;
        const G_W = 0o020;
        const G_X = 0o010;
        const O_R = 0o004;
        const O_W = 0o002;
        const O_X = 0o001;
    }
}

const NAMES: [(Permissions, &str); 12] = [
    (Permissions::U_R, "u_r"),
    (Permissions::U_W, "u_w"),
    (Permissions::U_X, "u_x"),
    (Permissions::G_R, "g_r"),
    (Permissions::G_W, "g_w"),
    (Permissions::G_X, "g_x"),
    (Permissions::O_R, "o_r"),
    (Permissions::O_W, "o_w"),
    (Permissions::O_X, "o_x"),
    (Permissions::SETUID, "setuid"),
    (Permissions::SETGUID, "setguid"),
    (Permissions::STICKY, "sticky"),
];

impl Permissions {
    /// Keeps the permission bits of a full `st_mode`, dropping the file type.
    pub fn from_mode(mode: u32) -> Self {
        Self::from_bits_truncate(mode)
    }

    pub fn mode(&self) -> u32 {
        self.bits()
    }

    pub fn as_names(&self) -> Vec<&'static str> {
        NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }

    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        names
            .into_iter()
            .filter_map(|name| NAMES.iter().find(|(_, known)| *known == name))
            .fold(Self::empty(), |acc, (flag, _)| acc | *flag)
    }
}

impl fmt::Display for Permissions {
    /// `ls`-style rendering, e.g. `rwxr-xr-x`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let triple = |r: Self, w: Self, x: Self, special: Self, set: char, unset: char| {
            let exec = match (self.contains(x), self.contains(special)) {
                (true, true) => set,
                (false, true) => unset,
                (true, false) => 'x',
                (false, false) => '-',
            };
            [
                if self.contains(r) { 'r' } else { '-' },
                if self.contains(w) { 'w' } else { '-' },
                exec,
            ]
        };
        let rendered: String = [
            triple(Self::U_R, Self::U_W, Self::U_X, Self::SETUID, 's', 'S'),
            triple(Self::G_R, Self::G_W, Self::G_X, Self::SETGUID, 's', 'S'),
            triple(Self::O_R, Self::O_W, Self::O_X, Self::STICKY, 't', 'T'),
        ]
        .iter()
        .flatten()
        .collect();
        f.write_str(&rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_mode_strips_type_bits() {
        let permissions = Permissions::from_mode(0o100_644);
        assert_eq!(permissions.mode(), 0o644);
        assert_eq!(permissions.as_names(), vec!["u_r", "u_w", "g_r", "o_r"]);
    }

    #[test]
    fn names_round_trip() {
        let permissions = Permissions::from_names(["u_r", "u_w", "u_x", "sticky", "bogus"]);
        assert_eq!(permissions.mode(), 0o1700);
    }

    #[test]
    fn display() {
        assert_eq!(Permissions::from_mode(0o755).to_string(), "rwxr-xr-x");
        assert_eq!(Permissions::from_mode(0o1777).to_string(), "rwxrwxrwt");
        assert_eq!(Permissions::from_mode(0o4644).to_string(), "rwSr--r--");
    }
}
