//! Placeholder templates shared by prompts and fallbacks
//!
//! `{name}` substitutes a value. `[...]` marks an optional group that is
//! dropped when any placeholder inside it has no value. A required
//! placeholder without a value makes the whole template unresolvable.
//! Substituted values are never re-scanned for placeholders.

/// Render a template, or `None` when a required placeholder has no value
pub fn render<F>(template: &str, lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::new();
    let mut plain = String::new();
    let mut chars = template.chars();

    while let Some(c) = chars.next() {
        if c != '[' {
            plain.push(c);
            continue;
        }
        let mut group = String::new();
        let mut closed = false;
        for g in chars.by_ref() {
            if g == ']' {
                closed = true;
                break;
            }
            group.push(g);
        }
        if !closed {
            plain.push('[');
            plain.push_str(&group);
            continue;
        }
        out.push_str(&substitute(&plain, &lookup)?);
        plain.clear();
        if let Some(rendered) = substitute(&group, &lookup) {
            out.push_str(&rendered);
        }
    }

    out.push_str(&substitute(&plain, &lookup)?);
    Some(out)
}

/// Placeholder names referenced by a template, in order of appearance
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                names.push(after[..end].to_string());
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    names
}

fn substitute<F>(segment: &str, lookup: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::new();
    let mut chars = segment.chars();

    while let Some(c) = chars.next() {
        if c != '{' {
            out.push(c);
            continue;
        }
        let mut name = String::new();
        let mut closed = false;
        for n in chars.by_ref() {
            if n == '}' {
                closed = true;
                break;
            }
            name.push(n);
        }
        if !closed {
            out.push('{');
            out.push_str(&name);
            continue;
        }
        let value = lookup(name.trim()).filter(|v| !v.trim().is_empty())?;
        out.push_str(&value);
    }

    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "title" => Some("Atlas of Rain".to_string()),
            "contributor_one" => Some("Mara Quell".to_string()),
            "blank" => Some("   ".to_string()),
            "braces" => Some("{title}".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_required_placeholders() {
        assert_eq!(
            render("{contributor_one} wrote {title}.", lookup).as_deref(),
            Some("Mara Quell wrote Atlas of Rain.")
        );
        assert_eq!(render("{missing} wrote {title}.", lookup), None);
        assert_eq!(render("{blank}", lookup), None);
    }

    #[test]
    fn test_optional_groups() {
        assert_eq!(
            render("{title}[ by {contributor_one}][, a work of {subject}].", lookup).as_deref(),
            Some("Atlas of Rain by Mara Quell.")
        );
    }

    #[test]
    fn test_values_not_rescanned() {
        assert_eq!(render("{braces}", lookup).as_deref(), Some("{title}"));
    }

    #[test]
    fn test_unbalanced_markers_are_literal() {
        assert_eq!(render("a [b", lookup).as_deref(), Some("a [b"));
        assert_eq!(render("a {b", lookup).as_deref(), Some("a {b"));
    }

    #[test]
    fn test_placeholders_listed() {
        assert_eq!(
            placeholders("{title}[ by {contributor_one}]"),
            vec!["title".to_string(), "contributor_one".to_string()]
        );
    }
}
