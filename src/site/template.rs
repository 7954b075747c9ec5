//! `{placeholder}` substitution for request and URL templates.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z0-9_-]+)\}").expect("placeholder pattern is a valid regex")
});

/// Replace every `{name}` in `template` with `lookup(name)`.
///
/// Returns `Err(name)` for the first placeholder `lookup` cannot fill.
/// Braces that do not wrap an identifier (JSON bodies, for instance) are left
/// untouched.
pub fn fill(template: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<String, String> {
    let mut missing = None;
    let filled = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        let name = &caps[1];
        lookup(name).unwrap_or_else(|| {
            missing.get_or_insert_with(|| name.to_string());
            String::new()
        })
    });
    match missing {
        Some(name) => Err(name),
        None => Ok(filled.into_owned()),
    }
}

/// [`fill`] against a fixed list of `(name, value)` pairs.
pub fn fill_vars(template: &str, vars: &[(&str, &str)]) -> Result<String, String> {
    fill(template, |name| {
        vars.iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| (*value).to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_known_placeholders() {
        let out = fill_vars(
            "{base}/api/v2/films/{token}",
            &[("base", "https://xem1080.com"), ("token", "1/episodes/2")],
        );
        assert_eq!(out.unwrap(), "https://xem1080.com/api/v2/films/1/episodes/2");
    }

    #[test]
    fn reports_missing_placeholder() {
        assert_eq!(
            fill_vars("{base}/{nope}", &[("base", "x")]),
            Err("nope".to_string())
        );
    }

    #[test]
    fn leaves_json_braces_alone() {
        assert_eq!(
            fill_vars(r#"{"id": "{token}"}"#, &[("token", "7")]).unwrap(),
            r#"{"id": "7"}"#
        );
    }

    #[test]
    fn accepts_dashed_attribute_names() {
        let out = fill("{data-id}/episodes/{data-episode-id}", |name| match name {
            "data-id" => Some("21975".into()),
            "data-episode-id" => Some("303806".into()),
            _ => None,
        });
        assert_eq!(out.unwrap(), "21975/episodes/303806");
    }
}
