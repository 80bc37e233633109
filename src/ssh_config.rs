//! A reader for the subset of OpenSSH client configuration this crate uses.
//!
//! Only `Host` blocks are evaluated; `Match` blocks are skipped entirely.
//! As with `ssh`, the first value found for a keyword wins, except for
//! `IdentityFile` which accumulates.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;

static LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<keyword>[A-Za-z][A-Za-z0-9]*)\s*(?:=\s*|\s+)(?P<value>.+?)\s*$")
        .expect("line pattern is valid")
});

/// Options resolved for one host alias.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostConfig {
    pub hostname: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub identity_files: Vec<PathBuf>,
}

#[derive(Debug)]
struct HostPattern {
    regex: Regex,
    negated: bool,
}

impl HostPattern {
    fn parse(pattern: &str) -> Option<HostPattern> {
        let (negated, pattern) = match pattern.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, pattern),
        };
        let mut source = String::from("(?i)^");
        for c in pattern.chars() {
            match c {
                '*' => source.push_str(".*"),
                '?' => source.push('.'),
                other => source.push_str(&regex::escape(&other.to_string())),
            }
        }
        source.push('$');
        match Regex::new(&source) {
            Ok(regex) => Some(HostPattern { regex, negated }),
            Err(err) => {
                warn!("ignoring host pattern {pattern:?}: {err}");
                None
            }
        }
    }
}

#[derive(Debug)]
struct Block {
    patterns: Vec<HostPattern>,
    /// `Match` blocks never apply.
    skipped: bool,
    options: Vec<(String, String)>,
}

impl Block {
    fn matches(&self, host: &str) -> bool {
        if self.skipped {
            return false;
        }
        let mut matched = false;
        for pattern in &self.patterns {
            if pattern.regex.is_match(host) {
                if pattern.negated {
                    return false;
                }
                matched = true;
            }
        }
        matched
    }
}

/// A parsed client configuration file.
#[derive(Debug, Default)]
pub struct SshConfig {
    blocks: Vec<Block>,
}

impl SshConfig {
    pub fn parse(content: &str) -> SshConfig {
        let mut blocks = vec![Block {
            patterns: HostPattern::parse("*").into_iter().collect(),
            skipped: false,
            options: Vec::new(),
        }];

        for (number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some(captures) = LINE.captures(line) else {
                warn!("ignoring unparseable ssh config line {}: {line:?}", number + 1);
                continue;
            };
            let keyword = captures["keyword"].to_ascii_lowercase();
            let value = unquote(&captures["value"]);

            match keyword.as_str() {
                "host" => blocks.push(Block {
                    patterns: value.split_whitespace().filter_map(HostPattern::parse).collect(),
                    skipped: false,
                    options: Vec::new(),
                }),
                "match" => blocks.push(Block {
                    patterns: Vec::new(),
                    skipped: true,
                    options: Vec::new(),
                }),
                _ => {
                    if let Some(block) = blocks.last_mut() {
                        block.options.push((keyword, value.to_owned()));
                    }
                }
            }
        }

        SshConfig { blocks }
    }

    /// Reads `path`; a missing file is an empty configuration.
    pub fn load(path: &Path) -> SshConfig {
        match fs::read_to_string(path) {
            Ok(content) => SshConfig::parse(&content),
            Err(err) if err.kind() == io::ErrorKind::NotFound => SshConfig::default(),
            Err(err) => {
                warn!("could not read ssh config {}: {err}", path.display());
                SshConfig::default()
            }
        }
    }

    pub fn lookup(&self, host: &str) -> HostConfig {
        let mut config = HostConfig::default();
        for block in self.blocks.iter().filter(|block| block.matches(host)) {
            for (keyword, value) in &block.options {
                match keyword.as_str() {
                    "hostname" if config.hostname.is_none() => {
                        config.hostname = Some(expand_tokens(value, host));
                    }
                    "user" if config.user.is_none() => config.user = Some(value.clone()),
                    "port" if config.port.is_none() => match value.parse() {
                        Ok(port) => config.port = Some(port),
                        Err(_) => warn!("ignoring invalid port {value:?} for host {host}"),
                    },
                    "identityfile" => {
                        config
                            .identity_files
                            .push(expand_home(&expand_tokens(value, host)));
                    }
                    _ => {}
                }
            }
        }
        config
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(value)
}

fn expand_tokens(value: &str, host: &str) -> String {
    let mut output = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            output.push(c);
            continue;
        }
        match chars.next() {
            Some('h') => output.push_str(host),
            Some('%') => output.push('%'),
            Some(other) => {
                output.push('%');
                output.push(other);
            }
            None => output.push('%'),
        }
    }
    output
}

/// Expands a leading `~` to the local home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
            home.join(rest.trim_start_matches('/'))
        }
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
# global defaults
IdentityFile /keys/global

Host build
    HostName build.internal
    User ci
    Port 2222

Host *.example.com !secret.example.com
    User=web
    HostName "%h.proxy"

Match host build
    User ignored

Host *
    User fallback
    Port 22
"#;

    #[test]
    fn lookup_uses_first_matching_value() {
        let config = SshConfig::parse(CONFIG);

        let build = config.lookup("build");
        assert_eq!(build.hostname.as_deref(), Some("build.internal"));
        assert_eq!(build.user.as_deref(), Some("ci"));
        assert_eq!(build.port, Some(2222));
        assert_eq!(build.identity_files, vec![PathBuf::from("/keys/global")]);
    }

    #[test]
    fn wildcard_and_negated_patterns() {
        let config = SshConfig::parse(CONFIG);

        let www = config.lookup("www.example.com");
        assert_eq!(www.user.as_deref(), Some("web"));
        assert_eq!(www.hostname.as_deref(), Some("www.example.com.proxy"));

        let secret = config.lookup("secret.example.com");
        assert_eq!(secret.user.as_deref(), Some("fallback"));
        assert_eq!(secret.hostname, None);
        assert_eq!(secret.port, Some(22));
    }

    #[test]
    fn missing_file_is_empty() {
        let config = SshConfig::load(Path::new("/nonexistent/ssh/config"));
        assert_eq!(config.lookup("anything"), HostConfig::default());
    }

    #[test]
    fn tokens() {
        assert_eq!(expand_tokens("%h-%%-%r", "box"), "box-%-%r");
    }
}
