//! Minimal line diff for plan output.

/// Render the lines that differ between `current` and `desired`.
///
/// Common leading and trailing lines are trimmed; the differing middle is shown
/// as `-` (current) and `+` (desired) lines. Empty when the inputs are equal.
pub fn line_diff(label: &str, current: &str, desired: &str) -> String {
    if current == desired {
        return String::new();
    }
    let old: Vec<&str> = current.lines().collect();
    let new: Vec<&str> = desired.lines().collect();

    let prefix = old.iter().zip(&new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = format!("--- {}\n+++ {} (desired)\n", label, label);
    if prefix > 0 || suffix > 0 {
        out.push_str(&format!(
            "@@ line {} ({} unchanged before, {} after) @@\n",
            prefix + 1,
            prefix,
            suffix
        ));
    }
    for line in &old[prefix..old.len() - suffix] {
        out.push_str(&format!("-{}\n", line));
    }
    for line in &new[prefix..new.len() - suffix] {
        out.push_str(&format!("+{}\n", line));
    }
    out
}
