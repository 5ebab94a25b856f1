//! Argument templating.
//!
//! Two kinds of references are recognised inside scenario tokens:
//!
//! - `${VAR}`: a secret or setting taken verbatim from the [`EnvSnapshot`];
//! - `{output_dir}`, `{work_dir}`, `{download_dir}`, `{output_root}`,
//!   `{max_processes}`, `{name}`: paths and values computed for the run.
//!
//! Anything else, including JSON such as `{"split_pdf_page":"true"}`, passes
//! through untouched. Rendering produces both the real value and a display
//! form in which every `${VAR}` expansion is replaced by `***`.

use std::collections::BTreeMap;

use crate::env::EnvSnapshot;
use crate::error::ProcessError;

/// Placeholder names accepted inside `{...}`.
pub const PLACEHOLDERS: &[&str] = &[
    "output_dir",
    "work_dir",
    "download_dir",
    "output_root",
    "max_processes",
    "name",
];

/// Mask substituted for secrets in display strings.
pub const REDACTED: &str = "***";

/// A rendered token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub value: String,
    pub display: String,
}

/// Values available to a template.
#[derive(Debug, Clone)]
pub struct Substitutions<'a> {
    placeholders: BTreeMap<&'static str, String>,
    env: &'a EnvSnapshot,
}

impl<'a> Substitutions<'a> {
    pub fn new(env: &'a EnvSnapshot) -> Self {
        Self {
            placeholders: BTreeMap::new(),
            env,
        }
    }

    /// Bind a placeholder. Names outside [`PLACEHOLDERS`] are ignored.
    pub fn bind(mut self, name: &'static str, value: impl Into<String>) -> Self {
        if PLACEHOLDERS.contains(&name) {
            self.placeholders.insert(name, value.into());
        }
        self
    }

    /// Render one token.
    pub fn render(&self, token: &str) -> Result<Rendered, ProcessError> {
        let mut value = String::with_capacity(token.len());
        let mut display = String::with_capacity(token.len());
        let mut rest = token;

        while let Some(pos) = rest.find(['$', '{']) {
            value.push_str(&rest[..pos]);
            display.push_str(&rest[..pos]);
            let tail = &rest[pos..];

            if let Some((var, consumed)) = parse_secret(tail) {
                let resolved = self.env.get_non_empty(var).ok_or_else(|| {
                    ProcessError::UnresolvedReference {
                        reference: format!("${{{var}}}"),
                        argument: token.to_owned(),
                    }
                })?;
                value.push_str(resolved);
                display.push_str(REDACTED);
                rest = &tail[consumed..];
                continue;
            }

            if let Some((name, consumed)) = parse_placeholder(tail) {
                let resolved = self.placeholders.get(name).ok_or_else(|| {
                    ProcessError::UnresolvedReference {
                        reference: format!("{{{name}}}"),
                        argument: token.to_owned(),
                    }
                })?;
                value.push_str(resolved);
                display.push_str(resolved);
                rest = &tail[consumed..];
                continue;
            }

            let ch_len = tail.chars().next().map_or(1, char::len_utf8);
            value.push_str(&tail[..ch_len]);
            display.push_str(&tail[..ch_len]);
            rest = &tail[ch_len..];
        }

        value.push_str(rest);
        display.push_str(rest);
        Ok(Rendered { value, display })
    }

    /// Render every token of a list.
    pub fn render_all(&self, tokens: &[String]) -> Result<Vec<Rendered>, ProcessError> {
        tokens.iter().map(|t| self.render(t)).collect()
    }
}

/// Names of every `${VAR}` referenced by `token`.
pub fn secret_references(token: &str) -> Vec<String> {
    let mut refs = Vec::new();
    let mut rest = token;
    while let Some(pos) = rest.find('$') {
        let tail = &rest[pos..];
        match parse_secret(tail) {
            Some((var, consumed)) => {
                refs.push(var.to_owned());
                rest = &tail[consumed..];
            }
            None => rest = &tail[1..],
        }
    }
    refs
}

/// `${NAME}` at the start of `s`: returns the name and the bytes consumed.
fn parse_secret(s: &str) -> Option<(&str, usize)> {
    let inner = s.strip_prefix("${")?;
    let end = inner.find('}')?;
    let name = &inner[..end];
    is_env_name(name).then_some((name, end + 3))
}

/// `{placeholder}` at the start of `s`, only for known placeholder names.
fn parse_placeholder(s: &str) -> Option<(&'static str, usize)> {
    let inner = s.strip_prefix('{')?;
    let end = inner.find('}')?;
    let name = &inner[..end];
    PLACEHOLDERS
        .iter()
        .find(|p| **p == name)
        .map(|p| (*p, end + 2))
}

fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
