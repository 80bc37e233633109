//! Remote platform and locale detection.

use std::{fmt, future::Future};

use tokio::sync::Mutex;

/// Operating system family of the remote host, as guessed from diagnostic
/// commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Linux,
    Darwin,
    FreeBsd,
    Cygwin,
    Win32,
    Unknown,
}

impl Platform {
    /// Classifies the outputs of `uname -s` and `sysinfo`; `None` means the
    /// command failed.
    pub fn classify(uname: Option<&str>, sysinfo: Option<&str>) -> Platform {
        match uname {
            Some("FreeBSD") => Platform::FreeBsd,
            Some("Darwin") => Platform::Darwin,
            Some("Linux") => Platform::Linux,
            Some(uname) if uname.starts_with("CYGWIN") => Platform::Cygwin,
            Some(_) => Platform::Unknown,
            None => match sysinfo {
                Some(sysinfo) if !sysinfo.is_empty() => Platform::Win32,
                _ => Platform::Unknown,
            },
        }
    }

    /// Platforms on which `$LANG` and `getent` are meaningful.
    pub fn is_posix(&self) -> bool {
        matches!(self, Platform::Linux | Platform::Darwin | Platform::FreeBsd)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::Darwin => "darwin",
            Platform::FreeBsd => "freebsd",
            Platform::Cygwin => "cygwin",
            Platform::Win32 => "win32",
            Platform::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extracts the lowercase charset from a `$LANG` value
/// (`en_US.UTF-8@euro` gives `utf-8`).
pub fn parse_locale(lang: &str) -> Option<String> {
    let charset = lang.trim().rsplit('.').next()?;
    let charset = charset.split('@').next().unwrap_or(charset);
    if charset.is_empty() {
        None
    } else {
        Some(charset.to_ascii_lowercase())
    }
}

/// Decodes command output in the remote locale, defaulting to UTF-8.
pub fn decode(bytes: &[u8], locale: Option<&str>) -> String {
    match locale {
        Some("iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" | "l1") => {
            bytes.iter().map(|b| *b as char).collect()
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// A lazily computed value with explicit invalidation.
#[derive(Debug, Default)]
pub struct Memo<T> {
    value: Mutex<Option<T>>,
}

impl<T: Clone> Memo<T> {
    pub fn new() -> Self {
        Self { value: Mutex::new(None) }
    }

    /// Returns the memoized value, running `compute` if there is none yet.
    /// Concurrent callers wait for the first computation instead of repeating it.
    pub async fn get<F, Fut>(&self, compute: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut value = self.value.lock().await;
        if let Some(value) = value.as_ref() {
            return value.clone();
        }
        let computed = compute().await;
        *value = Some(computed.clone());
        computed
    }

    pub async fn invalidate(&self) {
        *self.value.lock().await = None;
    }

    pub async fn peek(&self) -> Option<T> {
        self.value.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn classify_platforms() {
        assert_eq!(Platform::classify(Some("Linux"), None), Platform::Linux);
        assert_eq!(Platform::classify(Some("Darwin"), None), Platform::Darwin);
        assert_eq!(Platform::classify(Some("FreeBSD"), None), Platform::FreeBsd);
        assert_eq!(Platform::classify(Some("CYGWIN_NT-10.0"), None), Platform::Cygwin);
        assert_eq!(Platform::classify(Some("SunOS"), Some("x")), Platform::Unknown);
        assert_eq!(Platform::classify(None, Some("Host Name: WIN")), Platform::Win32);
        assert_eq!(Platform::classify(None, Some("")), Platform::Unknown);
        assert_eq!(Platform::classify(None, None), Platform::Unknown);
        assert!(Platform::Linux.is_posix());
        assert!(!Platform::Cygwin.is_posix());
    }

    #[test]
    fn locale_parsing() {
        assert_eq!(parse_locale("en_US.UTF-8").as_deref(), Some("utf-8"));
        assert_eq!(parse_locale("de_DE.ISO-8859-1@euro").as_deref(), Some("iso-8859-1"));
        assert_eq!(parse_locale("C").as_deref(), Some("c"));
        assert_eq!(parse_locale("").as_deref(), None);
    }

    #[test]
    fn decoding() {
        assert_eq!(decode("héllo".as_bytes(), Some("utf-8")), "héllo");
        assert_eq!(decode(&[0x68, 0xe9], Some("iso-8859-1")), "hé");
        assert_eq!(decode(b"plain", None), "plain");
    }

    #[tokio::test]
    async fn memo_computes_once_until_invalidated() {
        let memo = Memo::new();
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        assert_eq!(memo.get(|| async { 1 }).await, 1);
        assert_eq!(
            memo.get(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                2
            })
            .await,
            1
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        memo.invalidate().await;
        assert_eq!(memo.peek().await, None);
        assert_eq!(memo.get(|| async { 3 }).await, 3);
    }
}
