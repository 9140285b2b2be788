/// `3 projects`, `1 project`, `2 groups skipped` style counts.
pub fn pluralize(count: usize, singular: &str, plural: Option<&str>) -> String {
    if count == 1 {
        return format!("{count} {singular}");
    }

    match plural {
        Some(p) => format!("{count} {p}"),
        None => format!("{count} {singular}s"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pluralize_counts() {
        assert_eq!(pluralize(1, "project", None), "1 project");
        assert_eq!(pluralize(0, "project", None), "0 projects");
        assert_eq!(pluralize(2, "child", Some("children")), "2 children");
    }
}
