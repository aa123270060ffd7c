//! C2 — renders a filename from a format pattern and a [`Revision`].
//!
//! Recognised placeholders: `{version}`, `{slug}`, `{message}`, `{author}`, `{epoch}`,
//! `{datetime:<strftime spec>}`. Any other placeholder in the pattern is a user error.

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

use crate::error::{MigraError, MigraResult};
use crate::revision::Revision;

const KNOWN_PLACEHOLDERS: &[&str] = &["version", "slug", "message", "author", "epoch", "datetime"];

/// A 10-character URL-safe alphanumeric hash of `text` (`{slug}`).
pub fn slugify(text: &str, length: usize) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let encoded = URL_SAFE_NO_PAD.encode(digest);
    let alnum: String = encoded.chars().filter(|c| c.is_alphanumeric()).collect();
    if alnum.len() <= length {
        alnum
    } else {
        alnum[..length].to_string()
    }
}

/// Render a filename for `revision` from format pattern `fmt`. The result always ends in
/// `.sql`.
pub fn render_filename(fmt: &str, revision: &Revision) -> MigraResult<String> {
    let version = if revision.revision_id.chars().all(|c| c.is_ascii_digit()) {
        revision
            .revision_id
            .trim_start_matches('0')
            .to_string()
            .then_non_empty(&revision.revision_id)
    } else {
        revision.revision_id.clone()
    };

    let slug = slugify(&revision.message, 10);
    let message = revision.message.replace(' ', "_");
    let author = revision.author.clone().unwrap_or_default();
    let epoch = revision.created_at.timestamp() as f64
        + revision.created_at.timestamp_subsec_nanos() as f64 / 1e9;

    if version.is_empty() && slug.is_empty() && message.is_empty() {
        return Err(MigraError::config(
            "filename pattern requires version, slug, or message, but the revision has none",
        ));
    }

    let values: BTreeMap<&str, String> = BTreeMap::from([
        ("version", version),
        ("slug", slug),
        ("message", message),
        ("author", author),
        ("epoch", format!("{epoch}")),
    ]);

    let rendered = substitute(fmt, &values, revision)?;
    if rendered.ends_with(".sql") {
        Ok(rendered)
    } else {
        Ok(format!("{rendered}.sql"))
    }
}

trait OrFallback {
    fn then_non_empty(self, fallback: &str) -> String;
}

impl OrFallback for String {
    fn then_non_empty(self, fallback: &str) -> String {
        if self.is_empty() { fallback.to_string() } else { self }
    }
}

/// Substitutes `{name}` and `{datetime:<spec>}` placeholders, rejecting anything unrecognised.
fn substitute(fmt: &str, values: &BTreeMap<&str, String>, revision: &Revision) -> MigraResult<String> {
    let mut out = String::with_capacity(fmt.len());
    let mut chars = fmt.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if c != '{' {
            out.push(c);
            continue;
        }

        let mut placeholder = String::new();
        let mut closed = false;
        for (_, c2) in chars.by_ref() {
            if c2 == '}' {
                closed = true;
                break;
            }
            placeholder.push(c2);
        }
        if !closed {
            return Err(MigraError::config(format!(
                "unterminated placeholder in file_format pattern: '{{{placeholder}'"
            )));
        }

        let (name, spec) = match placeholder.split_once(':') {
            Some((n, s)) => (n, Some(s)),
            None => (placeholder.as_str(), None),
        };

        if name == "datetime" {
            let spec = spec.unwrap_or("%Y%m%d_%H%M%S");
            out.push_str(&revision.created_at.format(strftime_to_chrono(spec).as_str()).to_string());
            continue;
        }

        if !KNOWN_PLACEHOLDERS.contains(&name) {
            return Err(MigraError::config(format!(
                "unknown placeholder '{{{name}}}' in file_format pattern"
            )));
        }

        let Some(value) = values.get(name) else {
            return Err(MigraError::config(format!(
                "unknown placeholder '{{{name}}}' in file_format pattern"
            )));
        };
        out.push_str(value);
    }

    Ok(out)
}

/// `chrono`'s `format` uses the same `%`-directive strftime spec the pattern already carries,
/// so this is an identity pass kept as a seam in case a future dialect needs translation.
fn strftime_to_chrono(spec: &str) -> String {
    spec.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn rev(revision_id: &str, message: &str) -> Revision {
        Revision {
            revision_id: revision_id.to_string(),
            down_revision_id: None,
            message: message.to_string(),
            author: Some("ada".to_string()),
            tags: None,
            up_sql: None,
            down_sql: None,
            created_at: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
        }
    }

    #[test]
    fn renders_version_and_datetime() {
        let r = rev("007", "create users");
        let name = render_filename("{version}-{datetime:%Y%m%d_%H%M%S}-{message}", &r).unwrap();
        assert_eq!(name, "7-20260102_030405-create_users.sql");
    }

    #[test]
    fn renders_slug_and_author() {
        let r = rev("abc123", "hello world");
        let name = render_filename("{author}_{slug}", &r).unwrap();
        assert!(name.starts_with("ada_"));
        assert!(name.ends_with(".sql"));
    }

    #[test]
    fn unknown_placeholder_is_user_error() {
        let r = rev("1", "x");
        let err = render_filename("{bogus}", &r).unwrap_err();
        assert!(matches!(err, MigraError::Config(_)));
    }

    #[test]
    fn already_dot_sql_is_not_doubled() {
        let r = rev("1", "x");
        let name = render_filename("{version}.sql", &r).unwrap();
        assert_eq!(name, "1.sql");
    }

    #[test]
    fn non_numeric_version_passed_through() {
        let r = rev("abc123", "x");
        let name = render_filename("{version}", &r).unwrap();
        assert_eq!(name, "abc123.sql");
    }
}
