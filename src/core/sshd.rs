//! Key-based editing of `sshd_config` directives.
//!
//! sshd uses the first value it reads for a keyword, and everything after the
//! first `Match` line is conditional. Directives are therefore ensured in the
//! global section, and duplicate active occurrences there are commented out.

use crate::constants;

/// A desired `Keyword value` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub key: String,
    pub value: String,
}

impl Directive {
    pub fn new(key: &str, value: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            value: value.into(),
        }
    }

    fn line(&self) -> String {
        format!("{} {}", self.key, self.value)
    }
}

/// The hardening directives: no password auth, no root login, custom port.
pub fn hardening_directives(ssh_port: u16) -> Vec<Directive> {
    vec![
        Directive::new("PasswordAuthentication", "no"),
        Directive::new("PermitRootLogin", "no"),
        Directive::new("Port", ssh_port.to_string()),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshdEdit {
    pub content: String,
    pub changed: bool,
}

/// Ensure each directive has exactly one active line in the global section.
pub fn apply_directives(content: &str, directives: &[Directive]) -> SshdEdit {
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let mut global_end = lines
        .iter()
        .position(|l| active_keyword(l).is_some_and(|k| k.eq_ignore_ascii_case("Match")))
        .unwrap_or(lines.len());

    for directive in directives {
        let active: Vec<usize> = (0..global_end)
            .filter(|&i| keyword_is(active_keyword(&lines[i]), &directive.key))
            .collect();

        if let Some((&first, rest)) = active.split_first() {
            lines[first] = directive.line();
            for &i in rest {
                lines[i] = format!("# {}: {}", constants::MANAGED_BY, lines[i].trim_start());
            }
        } else if let Some(i) =
            (0..global_end).find(|&i| keyword_is(commented_keyword(&lines[i]), &directive.key))
        {
            lines[i] = directive.line();
        } else {
            lines.insert(global_end, directive.line());
            global_end += 1;
        }
    }

    let mut out = lines.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    SshdEdit {
        changed: out != content,
        content: out,
    }
}

/// Values of every active global-section line for `key`, in file order.
pub fn active_values(content: &str, key: &str) -> Vec<String> {
    let mut values = Vec::new();
    for line in content.lines() {
        match active_keyword(line) {
            Some(k) if k.eq_ignore_ascii_case("Match") => break,
            Some(k) if k.eq_ignore_ascii_case(key) => values.push(value_of(line)),
            _ => {}
        }
    }
    values
}

fn keyword_is(found: Option<&str>, key: &str) -> bool {
    found.is_some_and(|k| k.eq_ignore_ascii_case(key))
}

fn active_keyword(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    first_token(trimmed)
}

fn commented_keyword(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let uncommented = trimmed.strip_prefix('#')?.trim_start();
    first_token(uncommented)
}

fn first_token(s: &str) -> Option<&str> {
    let token = s
        .split(|c: char| c.is_whitespace() || c == '=')
        .next()
        .filter(|t| !t.is_empty())?;
    Some(token)
}

fn value_of(line: &str) -> String {
    let trimmed = line.trim();
    let rest = trimmed
        .find(|c: char| c.is_whitespace() || c == '=')
        .map(|i| &trimmed[i..])
        .unwrap_or("");
    rest.trim_start_matches(|c: char| c.is_whitespace() || c == '=')
        .trim()
        .to_string()
}
