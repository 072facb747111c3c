use colored::Colorize;
use similar::{ChangeTag, TextDiff};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Changed lines between two texts, unchanged lines dropped
pub fn changed_lines(old: &str, new: &str) -> Vec<(ChangeTag, String)> {
    TextDiff::from_lines(old, new)
        .iter_all_changes()
        .filter(|change| change.tag() != ChangeTag::Equal)
        .map(|change| (change.tag(), change.to_string_lossy().trim_end().to_string()))
        .collect()
}

/// Print a line diff between two texts
pub fn diff(old: &str, new: &str) {
    let lines = changed_lines(old, new);
    if lines.is_empty() {
        println!("    {}", "(identical)".dimmed());
        return;
    }
    for (tag, line) in lines {
        match tag {
            ChangeTag::Delete => println!("    {}", format!("- {line}").red()),
            ChangeTag::Insert => println!("    {}", format!("+ {line}").green()),
            ChangeTag::Equal => {}
        }
    }
}

/// Truncate a string for display, keeping the end
pub fn truncate(text: &str, max_len: usize) -> String {
    let len = text.chars().count();
    if len <= max_len {
        text.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let tail: String = text.chars().skip(len - (max_len - 3)).collect();
        format!("...{tail}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_changed_lines() {
        let old = "{\n  \"name\": \"a\",\n  \"path\": \"/\"\n}\n";
        let new = "{\n  \"name\": \"a\",\n  \"path\": \"/ops/\"\n}\n";
        assert_eq!(
            changed_lines(old, new),
            vec![
                (ChangeTag::Delete, "  \"path\": \"/\"".to_string()),
                (ChangeTag::Insert, "  \"path\": \"/ops/\"".to_string()),
            ]
        );
    }

    #[test]
    fn test_changed_lines_identical() {
        assert!(changed_lines("a\nb\n", "a\nb\n").is_empty());
    }

    #[test]
    fn test_truncate_short() {
        assert_eq!(truncate("short", 20), "short");
        assert_eq!(truncate("exact", 5), "exact");
    }

    #[test]
    fn test_truncate_long() {
        assert_eq!(
            truncate("arn:aws:iam::123456789012:user/alice", 15),
            "...2:user/alice"
        );
    }

    #[test]
    fn test_truncate_edge_cases() {
        assert_eq!(truncate("test", 3), "...");
        assert_eq!(truncate("", 10), "");
    }
}
