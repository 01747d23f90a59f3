//! Area parameterization - `{{name}}` placeholders in rule text.
//!
//! One rule can serve several areas that differ only by a literal (a provider
//! name, a fallback string). Each area binds its placeholder values; the
//! values are substituted into the rule's pattern and insert text before the
//! rule is compiled for that area.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_-]*)\s*\}\}").expect("placeholder regex is valid")
});

/// Placeholder values for one area.
pub type Params = BTreeMap<String, String>;

/// Names of all placeholders in `text`, in order of appearance.
pub fn placeholders(text: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Replace every placeholder in `text` with `escape(value)`.
///
/// Returns the name of the first placeholder with no bound value as `Err`.
pub fn substitute(
    text: &str,
    params: &Params,
    escape: impl Fn(&str) -> String,
) -> Result<String, String> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(text) {
        let whole = caps.get(0).expect("group 0 always participates");
        let name = &caps[1];
        let value = params.get(name).ok_or_else(|| name.to_string())?;

        out.push_str(&text[last..whole.start()]);
        out.push_str(&escape(value));
        last = whole.end();
    }

    out.push_str(&text[last..]);
    Ok(out)
}

/// Substitute without escaping.
pub fn substitute_literal(text: &str, params: &Params) -> Result<String, String> {
    substitute(text, params, str::to_string)
}
