use dialoguer::console::Style;
use sha2::{Digest, Sha256};

// 256-color codes that stay readable on both dark and light backgrounds.
const PALETTE: &[u8] = &[
    33, 37, 38, 39, 43, 44, 49, 69, 75, 79, 81, 98, 105, 111, 113, 117, 135, 141, 147, 149, 166,
    168, 170, 172, 178, 179, 185, 203, 205, 209, 214, 220,
];

/// Palette color for a job name; identical names always map to the same color.
pub fn job_color(name: &str) -> u8 {
    let digest = Sha256::digest(name.as_bytes());
    PALETTE[usize::from(digest[0]) % PALETTE.len()]
}

/// The `[job-name] ` prefix printed in front of every trace line.
pub fn job_label(name: &str) -> String {
    Style::new()
        .color256(job_color(name))
        .apply_to(format!("[{name}] "))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_is_stable_per_name() {
        assert_eq!(job_color("build"), job_color("build"));
        assert!(PALETTE.contains(&job_color("rspec 1/4")));
    }

    #[test]
    fn label_wraps_name_in_brackets() {
        let label = dialoguer::console::strip_ansi_codes(&job_label("lint")).into_owned();
        assert_eq!(label, "[lint] ");
    }
}
