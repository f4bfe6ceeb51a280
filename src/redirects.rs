//! Redirect helpers for static hosting.
//!
//! A static host cannot evaluate redirect rules at request time, so each
//! enabled [`Redirect`] is projected into every form a host might honor:
//!
//! | Output            | Consumer                                   |
//! |-------------------|--------------------------------------------|
//! | HTML pages        | any host; one per existing site path a rule matches |
//! | `_redirects`      | Netlify-style hosts                        |
//! | `.htaccess`       | Apache `mod_rewrite`                       |
//! | `redirects.js`    | client-side fallback loaded by every page  |
//!
//! Rules whose pattern does not compile are skipped with a warning.

use crate::paths;
use crate::types::{Article, Page, Redirect, Tag};
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use tracing::warn;

/// Written when there are no rules, so the script include never 404s.
pub const EMPTY_REDIRECTS_JS: &str = "// No redirects configured\n";

/// An enabled rule with its compiled pattern.
pub struct CompiledRule<'a> {
    pub rule: &'a Redirect,
    regex: Regex,
}

impl CompiledRule<'_> {
    /// Target for `path`, or `None` when the rule does not match.
    pub fn apply(&self, path: &str) -> Option<String> {
        if !self.regex.is_match(path) {
            return None;
        }
        let replacement = convert_replacement(&self.rule.replacement);
        Some(self.regex.replace(path, replacement.as_str()).into_owned())
    }
}

/// Compile the enabled rules, dropping invalid patterns.
pub fn compile_rules(redirects: &[Redirect]) -> Vec<CompiledRule<'_>> {
    redirects
        .iter()
        .filter(|r| r.enabled)
        .filter_map(|rule| match Regex::new(&rule.regex) {
            Ok(regex) => Some(CompiledRule { rule, regex }),
            Err(e) => {
                warn!(regex = %rule.regex, error = %e, "skipping invalid redirect pattern");
                None
            }
        })
        .collect()
}

/// Backreferences are written `\1`; literal `$` must survive substitution.
fn convert_replacement(replacement: &str) -> String {
    let mut out = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '$' => out.push_str("$$"),
            '\\' if chars.peek().is_some_and(|n| n.is_ascii_digit()) => {
                let mut group = String::new();
                while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                    group.push(d);
                    chars.next();
                }
                out.push_str(&format!("${{{group}}}"));
            }
            _ => out.push(c),
        }
    }
    out
}

/// Every extension-less site path a redirect could shadow.
pub fn collect_site_paths(
    articles: &[&Article],
    pages: &[&Page],
    tags: &[Tag],
    per_page: usize,
    prefix: Option<&str>,
) -> Vec<String> {
    let mut site_paths = vec!["/".to_string()];
    for article in articles {
        match prefix {
            Some(p) => site_paths.push(format!("/{}/{}", p.trim_matches('/'), article.slug)),
            None => site_paths.push(format!("/{}", article.slug)),
        }
    }
    for page in pages.iter().filter(|p| !p.is_redirect()) {
        site_paths.push(format!("/pages/{}", page.slug));
    }
    for tag in tags {
        site_paths.push(format!("/tags/{}", tag.slug));
    }
    let total_pages = articles.len().div_ceil(per_page.max(1));
    for n in 2..=total_pages {
        site_paths.push(format!("/page/{n}"));
    }
    site_paths
}

/// An HTML redirect page to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectPage {
    /// Output-relative file path.
    pub path: String,
    pub target: String,
    pub permanent: bool,
}

/// Pages for site paths matched by a rule. The first matching rule wins per path.
pub fn redirect_pages(rules: &[CompiledRule<'_>], site_paths: &[String]) -> Vec<RedirectPage> {
    let mut seen = HashSet::new();
    let mut pages = Vec::new();
    for rule in rules {
        for site_path in site_paths {
            let Some(target) = rule.apply(site_path) else {
                continue;
            };
            if target.is_empty() || !seen.insert(site_path.as_str()) {
                continue;
            }
            let target = if target.starts_with("http") || target.starts_with('/') {
                target
            } else {
                format!("/{target}")
            };
            pages.push(RedirectPage {
                path: paths::redirect_page_path(site_path),
                target,
                permanent: rule.rule.permanent,
            });
        }
    }
    pages
}

/// Netlify `_redirects` body, or `None` when there are no rules.
pub fn netlify_file(rules: &[CompiledRule<'_>]) -> Option<String> {
    let lines: Vec<String> = rules
        .iter()
        .map(|r| {
            let status = if r.rule.permanent { 301 } else { 302 };
            let pattern = r.rule.regex.strip_prefix('^').unwrap_or(&r.rule.regex);
            let pattern = pattern.strip_suffix('$').unwrap_or(pattern);
            if is_literal_pattern(pattern) {
                format!("{pattern} {} {status}", r.rule.replacement)
            } else {
                format!("/{pattern}/ {} {status}", r.rule.replacement)
            }
        })
        .collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
}

fn is_literal_pattern(pattern: &str) -> bool {
    !pattern.is_empty()
        && !pattern.chars().any(|c| {
            matches!(
                c,
                '$' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\'
            )
        })
}

/// Apache `.htaccess` body, or `None` when there are no rules.
pub fn htaccess_file(rules: &[CompiledRule<'_>]) -> Option<String> {
    if rules.is_empty() {
        return None;
    }
    let mut lines = vec![
        "# Auto-generated redirect rules".to_string(),
        "# Enable RewriteEngine".to_string(),
        "RewriteEngine On".to_string(),
        String::new(),
    ];
    for r in rules {
        let status = if r.rule.permanent { "R=301" } else { "R=302" };
        let pattern = r.rule.regex.replace('\\', "\\\\").replace('$', "\\$");
        lines.push(format!(
            "RewriteRule ^{pattern}$ {} [L,{status}]",
            r.rule.replacement
        ));
    }
    Some(lines.join("\n"))
}

#[derive(Serialize)]
struct ClientRule<'a> {
    regex: &'a str,
    replacement: &'a str,
    permanent: bool,
}

/// Client-side redirect script for every enabled rule.
pub fn redirects_js(redirects: &[Redirect]) -> Result<String, serde_json::Error> {
    let rules: Vec<ClientRule<'_>> = redirects
        .iter()
        .filter(|r| r.enabled)
        .map(|r| ClientRule {
            regex: &r.regex,
            replacement: &r.replacement,
            permanent: r.permanent,
        })
        .collect();
    if rules.is_empty() {
        return Ok(EMPTY_REDIRECTS_JS.to_string());
    }
    let table = serde_json::to_string(&rules)?;
    Ok(format!(
        r#"// Auto-generated redirect rules for static sites
(function() {{
  var redirects = {table};
  var currentPath = window.location.pathname;
  for (var i = 0; i < redirects.length; i++) {{
    var rule = redirects[i];
    try {{
      var regex = new RegExp(rule.regex);
      if (regex.test(currentPath)) {{
        var target = currentPath.replace(regex, rule.replacement);
        if (target !== currentPath) {{
          if (rule.permanent) {{
            window.location.replace(target);
          }} else {{
            window.location.href = target;
          }}
          return;
        }}
      }}
    }} catch (e) {{
      console.warn('Invalid redirect regex:', rule.regex, e);
    }}
  }}
}})();
"#
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(regex: &str, replacement: &str, permanent: bool) -> Redirect {
        Redirect {
            regex: regex.into(),
            replacement: replacement.into(),
            permanent,
            enabled: true,
        }
    }

    #[test]
    fn replacement_backreferences() {
        assert_eq!(convert_replacement(r"/new/\1"), "/new/${1}");
        assert_eq!(convert_replacement("/cost$"), "/cost$$");
        assert_eq!(convert_replacement(r"/a\b"), r"/a\b");
    }

    #[test]
    fn apply_substitutes_groups() {
        let rules = [rule(r"^/old/(.*)$", r"/new/\1", true)];
        let compiled = compile_rules(&rules);
        assert_eq!(compiled[0].apply("/old/post").as_deref(), Some("/new/post"));
        assert_eq!(compiled[0].apply("/other"), None);
    }

    #[test]
    fn invalid_and_disabled_rules_are_skipped() {
        let mut disabled = rule("^/x$", "/y", true);
        disabled.enabled = false;
        let rules = [rule("(unclosed", "/y", true), disabled, rule("^/a$", "/b", true)];
        let compiled = compile_rules(&rules);
        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled[0].rule.regex, "^/a$");
    }

    #[test]
    fn pages_for_matching_site_paths_only() {
        let rules = [
            rule("^/hello$", "goodbye", true),
            rule("^/hello$", "/second", false),
        ];
        let compiled = compile_rules(&rules);
        let site_paths = vec!["/".to_string(), "/hello".to_string(), "/tags/rust".to_string()];
        let pages = redirect_pages(&compiled, &site_paths);
        assert_eq!(
            pages,
            vec![RedirectPage {
                path: "hello.html".into(),
                target: "/goodbye".into(),
                permanent: true,
            }]
        );
    }

    #[test]
    fn site_paths_include_pagination() {
        let tags = vec![Tag {
            id: 1,
            slug: "rust".into(),
            name: "Rust".into(),
        }];
        let site_paths = collect_site_paths(&[], &[], &tags, 20, None);
        assert_eq!(site_paths, vec!["/", "/tags/rust"]);
    }

    #[test]
    fn netlify_literal_and_regex_forms() {
        let rules = [rule("^/old$", "/new", true), rule(r"^/blog/(\d+)$", "/posts/:splat", false)];
        let compiled = compile_rules(&rules);
        assert_eq!(
            netlify_file(&compiled).unwrap(),
            "/old /new 301\n//blog/(\\d+)/ /posts/:splat 302"
        );
        assert_eq!(netlify_file(&[]), None);
    }

    #[test]
    fn htaccess_escapes_pattern() {
        let rules = [rule(r"^/a\.html$", "/b", false)];
        let compiled = compile_rules(&rules);
        let body = htaccess_file(&compiled).unwrap();
        assert!(body.starts_with("# Auto-generated redirect rules\n# Enable RewriteEngine\nRewriteEngine On\n\n"));
        assert!(body.ends_with(r"RewriteRule ^^/a\\.html\$$ /b [L,R=302]"));
        assert_eq!(htaccess_file(&[]), None);
    }

    #[test]
    fn redirects_js_stub_and_table() {
        assert_eq!(redirects_js(&[]).unwrap(), EMPTY_REDIRECTS_JS);
        let js = redirects_js(&[rule("^/a$", "/b", true)]).unwrap();
        assert!(js.contains(r#"var redirects = [{"regex":"^/a$","replacement":"/b","permanent":true}];"#));
        assert!(js.contains("window.location.replace(target)"));
    }
}
