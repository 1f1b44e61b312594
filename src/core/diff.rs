/// True when the input carries no diff content at all.
pub fn is_blank(diff: &str) -> bool {
    diff.trim().is_empty()
}

/// Extracts changed-file paths from `diff --git` header lines, in header
/// order, duplicates kept.
///
/// Convention: the third whitespace-separated token of the header, minus its
/// `a/` prefix. Paths containing spaces, rename records, and binary patches
/// are outside the correctness contract.
pub fn changed_files(diff: &str) -> Vec<String> {
    diff.lines()
        .filter(|line| line.starts_with("diff --git "))
        .filter_map(|line| line.split_whitespace().nth(2))
        .map(|token| token.trim_start_matches("a/").to_string())
        .collect()
}
