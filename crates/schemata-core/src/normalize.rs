//! Canonical forms of SQL fragments.
//!
//! The catalog reports expressions the way Postgres deparses them
//! (`('ACTIVE'::character varying)::text`, `public.f_unaccent((name)::text)`),
//! which rarely matches how they were written. Both sides are folded into the
//! same canonical text before the differ compares them.

use std::sync::LazyLock;

use regex::Regex;

static CAST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"::(?:character varying|double precision|timestamp with(?:out)? time zone|time with(?:out)? time zone|\x01\d+\x01|[a-z_][a-z0-9_.]*)(?:\(\d+(?:,\s*\d+)?\))?(?:\[\])*"#,
    )
    .expect("cast pattern is valid")
});

static PUBLIC_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bpublic\.").expect("schema pattern is valid"));

static REDUNDANT_PARENS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[^a-z0-9_\x01])\(\s*([a-z_][a-z0-9_.]*|\x01\d+\x01|-?\d+(?:\.\d+)?)\s*\)")
        .expect("parenthesis pattern is valid")
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

static FUNCTION_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z_][a-z0-9_]*)\s*\(").expect("call pattern is valid"));

static SIMPLE_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("identifier pattern is valid"));

/// Returns the canonical form of a SQL expression.
///
/// Outside quoted literals and identifiers: whitespace is collapsed, text is
/// lower-cased, casts are removed, `public.` qualification is dropped and
/// parentheses around single atoms or the whole expression are removed.
/// Quoted identifiers that do not need quoting are unquoted.
#[must_use]
pub fn normalize_expression(input: &str) -> String {
    let (masked, quoted) = mask_quoted(input);

    let mut text = WHITESPACE.replace_all(masked.trim(), " ").to_lowercase();
    text = PUBLIC_PREFIX.replace_all(&text, "").into_owned();
    text = CAST.replace_all(&text, "").into_owned();
    loop {
        let next = REDUNDANT_PARENS.replace_all(&text, "$1$2").into_owned();
        if next == text {
            break;
        }
        text = next;
    }
    text = tidy_punctuation(&text);
    text = strip_outer_parens(&text);

    unmask_quoted(&text, &quoted)
}

/// Returns the canonical form of a function body: surrounding whitespace is
/// trimmed and whitespace runs are collapsed. Nothing else is touched.
#[must_use]
pub fn normalize_body(input: &str) -> String {
    WHITESPACE.replace_all(input.trim(), " ").into_owned()
}

/// Names of functions called in `expression`, in order of appearance.
#[must_use]
pub fn called_functions(expression: &str) -> Vec<String> {
    let (masked, _) = mask_quoted(expression);
    let lowered = masked.to_lowercase();
    let lowered = PUBLIC_PREFIX.replace_all(&lowered, "");
    FUNCTION_CALL
        .captures_iter(&lowered)
        .filter_map(|c| c.get(1))
        .filter(|m| {
            // Skip qualified names other than `public.` and quoted identifiers.
            !lowered[..m.start()]
                .chars()
                .next_back()
                .is_some_and(|p| p == '.' || p == '"' || p.is_ascii_digit())
        })
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Replaces quoted strings and identifiers with `\x01N\x01` markers.
fn mask_quoted(input: &str) -> (String, Vec<String>) {
    let mut masked = String::with_capacity(input.len());
    let mut quoted = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\'' && c != '"' {
            masked.push(c);
            continue;
        }
        let mut token = String::from(c);
        while let Some(next) = chars.next() {
            token.push(next);
            if next == c {
                // Doubled quote is an escaped quote.
                if chars.peek() == Some(&c) {
                    if let Some(escaped) = chars.next() {
                        token.push(escaped);
                    }
                    continue;
                }
                break;
            }
        }
        masked.push('\x01');
        masked.push_str(&quoted.len().to_string());
        masked.push('\x01');
        quoted.push(token);
    }
    (masked, quoted)
}

fn unmask_quoted(input: &str, quoted: &[String]) -> String {
    let mut out = String::with_capacity(input.len());
    let mut parts = input.split('\x01');
    if let Some(first) = parts.next() {
        out.push_str(first);
    }
    let mut in_marker = true;
    for part in parts {
        if in_marker {
            let token = part
                .parse::<usize>()
                .ok()
                .and_then(|i| quoted.get(i))
                .map_or(part, String::as_str);
            out.push_str(&unquote_identifier(token));
        } else {
            out.push_str(part);
        }
        in_marker = !in_marker;
    }
    out
}

fn unquote_identifier(token: &str) -> String {
    if let Some(inner) = token.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
        if SIMPLE_IDENTIFIER.is_match(inner) {
            return inner.to_string();
        }
    }
    token.to_string()
}

fn tidy_punctuation(input: &str) -> String {
    input
        .replace("( ", "(")
        .replace(" )", ")")
        .replace(" ,", ",")
        .replace(',', ", ")
        .replace(",  ", ", ")
}

/// Removes parentheses that enclose the whole expression.
fn strip_outer_parens(input: &str) -> String {
    let mut text = input.trim();
    while text.starts_with('(') && text.ends_with(')') && encloses_all(text) {
        text = text[1..text.len() - 1].trim();
    }
    text.to_string()
}

fn encloses_all(text: &str) -> bool {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 && i != text.len() - 1 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}
