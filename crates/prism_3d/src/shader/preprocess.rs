//! Conditional compilation for shader sources
//!
//! Supports `#ifdef NAME`, `#ifndef NAME`, `#else` and `#endif`, nested to any
//! depth. Defines that carry a value are substituted for whole-word occurrences
//! of their name in the surviving lines.

use rustc_hash::FxHashMap;
use tracing::warn;

/// One open `#ifdef`/`#ifndef`
struct Branch {
    /// Enclosing branches are all active
    parent_active: bool,
    /// The condition of this branch held
    condition: bool,
    in_else: bool,
}

impl Branch {
    fn active(&self) -> bool {
        self.parent_active && (self.condition != self.in_else)
    }
}

/// Resolve directives and substitute valued defines
pub fn preprocess(source: &str, defines: &FxHashMap<String, Option<String>>) -> String {
    let mut out = String::with_capacity(source.len());
    let mut stack: Vec<Branch> = Vec::new();

    for (line_no, line) in source.lines().enumerate() {
        let active = stack.last().map_or(true, Branch::active);
        let trimmed = line.trim_start();

        if let Some(name) = directive(trimmed, "#ifdef") {
            stack.push(Branch {
                parent_active: active,
                condition: defines.contains_key(name),
                in_else: false,
            });
        } else if let Some(name) = directive(trimmed, "#ifndef") {
            stack.push(Branch {
                parent_active: active,
                condition: !defines.contains_key(name),
                in_else: false,
            });
        } else if is_directive(trimmed, "#else") {
            match stack.last_mut() {
                Some(branch) => branch.in_else = true,
                None => warn!(line = line_no + 1, "#else without #ifdef"),
            }
        } else if is_directive(trimmed, "#endif") {
            if stack.pop().is_none() {
                warn!(line = line_no + 1, "#endif without #ifdef");
            }
        } else if active {
            out.push_str(&substitute(line, defines));
            out.push('\n');
        }
    }

    if !stack.is_empty() {
        warn!(open = stack.len(), "unterminated #ifdef in shader source");
    }
    out
}

fn directive<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(keyword)?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    rest.split_whitespace().next()
}

fn is_directive(line: &str, keyword: &str) -> bool {
    line.strip_prefix(keyword)
        .is_some_and(|rest| rest.trim().is_empty() || rest.starts_with(char::is_whitespace))
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Replace whole-word names of valued defines
fn substitute(line: &str, defines: &FxHashMap<String, Option<String>>) -> String {
    if !defines.values().any(Option::is_some) {
        return line.to_string();
    }

    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(start) = rest.find(|c: char| is_word_char(c)) {
        out.push_str(&rest[..start]);
        let word_and_tail = &rest[start..];
        let end = word_and_tail
            .find(|c: char| !is_word_char(c))
            .unwrap_or(word_and_tail.len());
        let word = &word_and_tail[..end];
        match defines.get(word) {
            Some(Some(value)) => out.push_str(value),
            _ => out.push_str(word),
        }
        rest = &word_and_tail[end..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defines(pairs: &[(&str, Option<&str>)]) -> FxHashMap<String, Option<String>> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
            .collect()
    }

    const SOURCE: &str = "a\n#ifdef FOO\nfoo\n#else\nnot_foo\n#endif\nb\n";

    #[test]
    fn test_ifdef_selects_branch() {
        assert_eq!(preprocess(SOURCE, &defines(&[("FOO", None)])), "a\nfoo\nb\n");
        assert_eq!(preprocess(SOURCE, &defines(&[])), "a\nnot_foo\nb\n");
    }

    #[test]
    fn test_ifndef() {
        let source = "#ifndef BAR\nno_bar\n#endif\n";
        assert_eq!(preprocess(source, &defines(&[])), "no_bar\n");
        assert_eq!(preprocess(source, &defines(&[("BAR", None)])), "");
    }

    #[test]
    fn test_nested_branches() {
        let source = "#ifdef A\n#ifdef B\nab\n#else\na\n#endif\n#else\n#ifdef B\nb\n#endif\n#endif\n";
        assert_eq!(preprocess(source, &defines(&[("A", None), ("B", None)])), "ab\n");
        assert_eq!(preprocess(source, &defines(&[("A", None)])), "a\n");
        assert_eq!(preprocess(source, &defines(&[("B", None)])), "b\n");
        assert_eq!(preprocess(source, &defines(&[])), "");
    }

    #[test]
    fn test_value_substitution_is_whole_word() {
        let source = "let n = LIGHT_COUNT + LIGHT_COUNT_MAX;\n";
        let out = preprocess(source, &defines(&[("LIGHT_COUNT", Some("4"))]));
        assert_eq!(out, "let n = 4 + LIGHT_COUNT_MAX;\n");
    }

    #[test]
    fn test_directive_needs_word_boundary() {
        // `#ifdefined` is not a directive and passes through unchanged
        let out = preprocess("#ifdefined X\n", &defines(&[]));
        assert_eq!(out, "#ifdefined X\n");
    }
}
