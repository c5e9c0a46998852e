//! JavaScript snippets evaluated in the page to locate and drive elements.
//!
//! ## Security: JS string encoding
//!
//! Locator values are escaped for JS string context before injection and are
//! only ever placed inside string literals, never in code positions.

use super::{Locator, Readiness};
use serde::Deserialize;

/// Outcome reported by the action snippets.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ScriptOutcome {
    pub success: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// JS expression evaluating to the located element or `null`.
pub fn resolve_expr(locator: &Locator) -> String {
    match locator {
        Locator::Css(selector) => {
            format!("document.querySelector('{}')", sanitize_js_string(selector))
        }
        Locator::Id(id) => format!("document.getElementById('{}')", sanitize_js_string(id)),
        Locator::XPath(xpath) => format!(
            "document.evaluate('{}', document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
            sanitize_js_string(xpath)
        ),
        Locator::LinkText(text) => format!(
            "([...document.querySelectorAll('a')].find(a => a.textContent.trim() === '{}') || null)",
            sanitize_js_string(text)
        ),
    }
}

/// Snippet returning `true` when the element satisfies `readiness`.
pub fn probe(locator: &Locator, readiness: Readiness) -> String {
    let visibility = match readiness {
        Readiness::Present => "",
        Readiness::Clickable => {
            r#"
                    if (el.getClientRects().length === 0) return false;
                    const style = window.getComputedStyle(el);
                    if (style.visibility === 'hidden' || style.display === 'none') return false;
                    if (el.disabled) return false;"#
        }
    };
    format!(
        r#"(() => {{
                    const el = {};
                    if (!el) return false;{}
                    return true;
                }})()"#,
        resolve_expr(locator),
        visibility
    )
}

/// Snippet that scrolls the element into view and clicks it.
pub fn click(locator: &Locator) -> String {
    format!(
        r#"(() => {{
                    const el = {};
                    if (!el) return {{ success: false, reason: "not found" }};
                    el.scrollIntoView({{ block: "center" }});
                    el.click();
                    return {{ success: true }};
                }})()"#,
        resolve_expr(locator)
    )
}

/// Snippet that focuses an input and empties its value.
pub fn focus_and_clear(locator: &Locator) -> String {
    format!(
        r#"(() => {{
                    const el = {};
                    if (!el) return {{ success: false, reason: "not found" }};
                    el.focus();
                    if ('value' in el) {{
                        el.value = '';
                        el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                    }}
                    return {{ success: true }};
                }})()"#,
        resolve_expr(locator)
    )
}

/// Snippet that fires `change` and blurs the element after typing.
pub fn commit_input(locator: &Locator) -> String {
    format!(
        r#"(() => {{
                    const el = {};
                    if (!el) return {{ success: false, reason: "not found" }};
                    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                    el.blur();
                    return {{ success: true }};
                }})()"#,
        resolve_expr(locator)
    )
}

/// Sanitize a string for safe injection into a JavaScript string literal.
///
/// Escapes backslashes, quotes, backticks and line breaks, hex-escapes angle
/// brackets and strips null bytes.
pub fn sanitize_js_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '\\' => result.push_str("\\\\"),
            '\'' => result.push_str("\\'"),
            '"' => result.push_str("\\\""),
            '`' => result.push_str("\\`"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            '\0' => {}
            '<' => result.push_str("\\x3c"),
            '>' => result.push_str("\\x3e"),
            _ => result.push(ch),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_basic() {
        assert_eq!(sanitize_js_string("fromDate"), "fromDate");
        assert_eq!(sanitize_js_string("it's"), "it\\'s");
        assert_eq!(sanitize_js_string("a\"b"), "a\\\"b");
        assert_eq!(sanitize_js_string("abc\0def"), "abcdef");
    }

    #[test]
    fn test_sanitize_keeps_cyrillic() {
        assert_eq!(sanitize_js_string("Срочный рынок"), "Срочный рынок");
    }

    #[test]
    fn test_xpath_quotes_are_escaped() {
        let loc = Locator::XPath(r#"//a[text()="Получить данные в XML"]"#.into());
        let expr = resolve_expr(&loc);
        assert!(expr.contains(r#"//a[text()=\"Получить данные в XML\"]"#));
        assert!(expr.contains("FIRST_ORDERED_NODE_TYPE"));
    }

    #[test]
    fn test_injection_stays_in_literal() {
        let expr = resolve_expr(&Locator::Css("'); alert(1); ('".into()));
        assert!(expr.starts_with("document.querySelector('\\'"));
    }

    #[test]
    fn test_probe_clickable_checks_box_and_disabled() {
        let present = probe(&Locator::Id("tillDate".into()), Readiness::Present);
        let clickable = probe(&Locator::Id("tillDate".into()), Readiness::Clickable);
        assert!(!present.contains("getClientRects"));
        assert!(clickable.contains("getClientRects"));
        assert!(clickable.contains("el.disabled"));
    }

    #[test]
    fn test_outcome_deserializes_without_reason() {
        let ok: ScriptOutcome = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert_eq!(ok, ScriptOutcome { success: true, reason: None });
        let failed: ScriptOutcome =
            serde_json::from_str(r#"{"success": false, "reason": "not found"}"#).unwrap();
        assert_eq!(failed.reason.as_deref(), Some("not found"));
    }
}
