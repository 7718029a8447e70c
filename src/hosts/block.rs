//! Parsing and rendering of the delimited sc block inside a hosts file.
//!
//! Everything here is a pure function of its inputs; file IO lives in
//! [`super::HostsFile`].

use std::collections::HashSet;

/// Opening marker of the managed block.
pub const BEGIN_MARKER: &str = "# BEGIN SC BLOCK";

/// Closing marker of the managed block.
pub const END_MARKER: &str = "# END SC BLOCK";

/// Marker pairs written by older releases. Always stripped.
pub const LEGACY_MARKERS: &[(&str, &str)] =
    &[("# ---- BEGIN SC BLOCK ----", "# ---- END SC BLOCK ----")];

/// A hosts file cut around the managed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split<'a> {
    /// Content before the begin marker
    pub before: &'a str,
    /// The block itself, markers included, if present
    pub block: Option<&'a str>,
    /// Content after the end marker and its trailing newline
    pub after: &'a str,
}

/// Removes every legacy block (and the newline following its end marker).
///
/// A legacy begin marker without a matching end marker is left untouched.
pub fn strip_legacy(content: &str) -> String {
    let mut content = content.to_string();
    for (begin, end) in LEGACY_MARKERS {
        while let Some(stripped) = strip_first(&content, begin, end) {
            content = stripped;
        }
    }
    content
}

/// Removes the first complete `begin`..`end` region, or `None` if there is
/// none.
fn strip_first(content: &str, begin: &str, end: &str) -> Option<String> {
    let begin_idx = content.find(begin)?;
    let end_rel = content[begin_idx..].find(end)?;
    let tail = skip_newline(&content[begin_idx + end_rel + end.len()..]);
    Some(format!("{}{}", &content[..begin_idx], tail))
}

/// Removes every managed block from `content`, truncated ones included.
fn strip_blocks(content: &str) -> String {
    let mut content = content.to_string();
    loop {
        let parts = split(&content);
        if parts.block.is_none() {
            return content;
        }
        content = format!("{}{}", parts.before, parts.after);
    }
}

/// Splits `content` around the managed block.
///
/// The end marker is searched after the begin marker. A begin marker without
/// an end marker is treated as a block truncated at end of file.
pub fn split(content: &str) -> Split<'_> {
    let Some(begin_idx) = content.find(BEGIN_MARKER) else {
        return Split {
            before: content,
            block: None,
            after: "",
        };
    };

    let before = &content[..begin_idx];
    let rest = &content[begin_idx..];

    match rest.find(END_MARKER) {
        Some(end_rel) => {
            let end_idx = end_rel + END_MARKER.len();
            let after = skip_newline(&rest[end_idx..]);
            let block_len = rest.len() - after.len();
            Split {
                before,
                block: Some(&rest[..block_len]),
                after,
            }
        }
        None => Split {
            before,
            block: Some(rest),
            after: "",
        },
    }
}

/// Renders the managed block for every domain not in `unblocked`.
///
/// Returns an empty string when nothing is blocked.
pub fn render(domains: &[String], unblocked: &HashSet<String>, block_subdomains: bool) -> String {
    let groups: Vec<String> = domains
        .iter()
        .filter(|d| !unblocked.contains(d.as_str()))
        .map(|d| entry_group(d, block_subdomains))
        .collect();

    if groups.is_empty() {
        return String::new();
    }

    format!(
        "{BEGIN_MARKER}\n{}\n{END_MARKER}\n",
        groups.join("\n\n")
    )
}

/// Produces the full new hosts file content for the given state.
pub fn rewrite(
    content: &str,
    domains: &[String],
    unblocked: &HashSet<String>,
    block_subdomains: bool,
) -> String {
    let cleaned = strip_legacy(content);
    let parts = split(&cleaned);
    // Duplicate blocks after the first are dropped so only one remains.
    let after = strip_blocks(parts.after);
    let block = render(domains, unblocked, block_subdomains);

    let mut out = String::with_capacity(parts.before.len() + block.len() + after.len() + 1);
    out.push_str(parts.before);
    if !block.is_empty() && !parts.before.is_empty() && !parts.before.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&block);
    out.push_str(&after);
    out
}

/// Produces the hosts file content with every sc block removed.
pub fn without_block(content: &str) -> String {
    strip_blocks(&strip_legacy(content))
}

fn entry_group(domain: &str, block_subdomains: bool) -> String {
    let mut lines = vec![format!("0.0.0.0 {domain}"), format!("::      {domain}")];
    if block_subdomains {
        lines.push(format!("0.0.0.0 www.{domain}"));
        lines.push(format!("::      www.{domain}"));
    }
    lines.join("\n")
}

fn skip_newline(s: &str) -> &str {
    s.strip_prefix('\n').unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "127.0.0.1 localhost\n::1 localhost\n";

    fn domains(list: &[&str]) -> Vec<String> {
        list.iter().map(|d| d.to_string()).collect()
    }

    fn set(list: &[&str]) -> HashSet<String> {
        list.iter().map(|d| d.to_string()).collect()
    }

    fn entry_lines(content: &str) -> usize {
        content
            .lines()
            .filter(|l| l.starts_with("0.0.0.0 ") || l.starts_with("::      "))
            .count()
    }

    // ------------------------------------------------------------------------
    // Render Tests
    // ------------------------------------------------------------------------

    mod render_tests {
        use super::*;

        #[test]
        fn test_render_with_subdomains() {
            let block = render(&domains(&["a.com"]), &set(&[]), true);
            assert_eq!(
                block,
                "# BEGIN SC BLOCK\n\
                 0.0.0.0 a.com\n\
                 ::      a.com\n\
                 0.0.0.0 www.a.com\n\
                 ::      www.a.com\n\
                 # END SC BLOCK\n"
            );
        }

        #[test]
        fn test_render_groups_separated_by_blank_line() {
            let block = render(&domains(&["a.com", "b.com"]), &set(&[]), false);
            assert_eq!(
                block,
                "# BEGIN SC BLOCK\n\
                 0.0.0.0 a.com\n\
                 ::      a.com\n\
                 \n\
                 0.0.0.0 b.com\n\
                 ::      b.com\n\
                 # END SC BLOCK\n"
            );
        }

        #[test]
        fn test_render_skips_unblocked() {
            let block = render(&domains(&["a.com", "b.com"]), &set(&["a.com"]), true);
            assert!(!block.contains("a.com\n"));
            assert_eq!(entry_lines(&block), 4);
        }

        #[test]
        fn test_render_empty_when_everything_unblocked() {
            let block = render(&domains(&["a.com"]), &set(&["a.com"]), true);
            assert!(block.is_empty());
            assert!(render(&[], &set(&[]), true).is_empty());
        }
    }

    // ------------------------------------------------------------------------
    // Split Tests
    // ------------------------------------------------------------------------

    mod split_tests {
        use super::*;

        #[test]
        fn test_split_without_block() {
            let parts = split(BASE);
            assert_eq!(parts.before, BASE);
            assert_eq!(parts.block, None);
            assert_eq!(parts.after, "");
        }

        #[test]
        fn test_split_consumes_newline_after_end_marker() {
            let content = "head\n# BEGIN SC BLOCK\nx\n# END SC BLOCK\ntail\n";
            let parts = split(content);
            assert_eq!(parts.before, "head\n");
            assert_eq!(parts.block, Some("# BEGIN SC BLOCK\nx\n# END SC BLOCK\n"));
            assert_eq!(parts.after, "tail\n");
        }

        #[test]
        fn test_split_truncated_block_runs_to_eof() {
            let content = "head\n# BEGIN SC BLOCK\n0.0.0.0 a.com\n";
            let parts = split(content);
            assert_eq!(parts.before, "head\n");
            assert_eq!(parts.block, Some("# BEGIN SC BLOCK\n0.0.0.0 a.com\n"));
            assert_eq!(parts.after, "");
        }

        #[test]
        fn test_split_ignores_end_marker_before_begin() {
            let content = "# END SC BLOCK\nhead\n# BEGIN SC BLOCK\nx\n# END SC BLOCK\n";
            let parts = split(content);
            assert_eq!(parts.before, "# END SC BLOCK\nhead\n");
            assert_eq!(parts.after, "");
        }
    }

    // ------------------------------------------------------------------------
    // Rewrite Tests
    // ------------------------------------------------------------------------

    mod rewrite_tests {
        use super::*;

        #[test]
        fn test_rewrite_appends_block() {
            let out = rewrite(BASE, &domains(&["a.com"]), &set(&[]), false);
            assert_eq!(
                out,
                format!("{BASE}# BEGIN SC BLOCK\n0.0.0.0 a.com\n::      a.com\n# END SC BLOCK\n")
            );
        }

        #[test]
        fn test_rewrite_is_idempotent() {
            let list = domains(&["a.com", "b.com"]);
            let unblocked = set(&["b.com"]);
            let once = rewrite(BASE, &list, &unblocked, true);
            let twice = rewrite(&once, &list, &unblocked, true);
            assert_eq!(once, twice);
        }

        #[test]
        fn test_rewrite_preserves_surrounding_content() {
            let content = "head\n# BEGIN SC BLOCK\nold\n# END SC BLOCK\ntail\n";
            let out = rewrite(content, &domains(&["a.com"]), &set(&[]), false);
            assert!(out.starts_with("head\n# BEGIN SC BLOCK\n"));
            assert!(out.ends_with("# END SC BLOCK\ntail\n"));
            assert!(!out.contains("old"));
        }

        #[test]
        fn test_rewrite_strips_legacy_block() {
            let content = format!(
                "{BASE}# ---- BEGIN SC BLOCK ----\n0.0.0.0 old.com\n# ---- END SC BLOCK ----\n"
            );
            let out = rewrite(&content, &domains(&["a.com"]), &set(&[]), false);
            assert!(!out.contains("old.com"));
            assert!(!out.contains("----"));
            assert!(out.starts_with(BASE));
        }

        #[test]
        fn test_rewrite_removes_block_when_nothing_blocked() {
            let content = rewrite(BASE, &domains(&["a.com"]), &set(&[]), true);
            let out = rewrite(&content, &domains(&["a.com"]), &set(&["a.com"]), true);
            assert_eq!(out, BASE);
        }

        #[test]
        fn test_rewrite_inserts_newline_after_unterminated_line() {
            let out = rewrite("127.0.0.1 localhost", &domains(&["a.com"]), &set(&[]), false);
            assert!(out.starts_with("127.0.0.1 localhost\n# BEGIN SC BLOCK\n"));
            let again = rewrite(&out, &domains(&["a.com"]), &set(&[]), false);
            assert_eq!(out, again);
        }

        #[test]
        fn test_rewrite_repairs_truncated_block() {
            let content = format!("{BASE}# BEGIN SC BLOCK\n0.0.0.0 stale.com\n");
            let out = rewrite(&content, &domains(&["a.com"]), &set(&[]), false);
            assert!(!out.contains("stale.com"));
            assert!(out.ends_with("# END SC BLOCK\n"));
        }

        #[test]
        fn test_rewrite_strips_every_legacy_block() {
            let content = format!(
                "{BASE}# ---- BEGIN SC BLOCK ----\n0.0.0.0 x.com\n# ---- END SC BLOCK ----\n\
                 mid\n\
                 # ---- BEGIN SC BLOCK ----\n0.0.0.0 y.com\n# ---- END SC BLOCK ----\n"
            );
            let list = domains(&["a.com"]);

            let once = rewrite(&content, &list, &set(&[]), false);
            let twice = rewrite(&once, &list, &set(&[]), false);

            assert_eq!(once, twice);
            assert!(!once.contains("x.com"));
            assert!(!once.contains("y.com"));
            assert!(once.starts_with(&format!("{BASE}mid\n# BEGIN SC BLOCK\n")));
        }

        #[test]
        fn test_strip_legacy_keeps_unterminated_marker() {
            let content = "# ---- BEGIN SC BLOCK ----\nkeep\n";
            assert_eq!(strip_legacy(content), content);
        }

        #[test]
        fn test_rewrite_collapses_duplicate_blocks() {
            let block = "# BEGIN SC BLOCK\n0.0.0.0 a.com\n::      a.com\n# END SC BLOCK\n";
            let content = format!("{BASE}{block}user line\n{block}");
            let list = domains(&["a.com", "b.com"]);

            let out = rewrite(&content, &list, &set(&["a.com"]), false);

            assert!(!out.contains("a.com"));
            assert_eq!(out.matches(BEGIN_MARKER).count(), 1);
            assert_eq!(out, rewrite(&out, &list, &set(&["a.com"]), false));
            assert!(out.ends_with("# END SC BLOCK\nuser line\n"));
        }

        #[test]
        fn test_without_block_removes_duplicates() {
            let block = "# BEGIN SC BLOCK\n0.0.0.0 a.com\n# END SC BLOCK\n";
            let content = format!("{BASE}{block}last\n{block}");
            assert_eq!(without_block(&content), format!("{BASE}last\n"));
        }

        #[test]
        fn test_without_block() {
            let content = format!("{BASE}# BEGIN SC BLOCK\n0.0.0.0 a.com\n# END SC BLOCK\nlast\n");
            assert_eq!(without_block(&content), format!("{BASE}last\n"));
        }
    }
}
