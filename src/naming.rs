//! Human-readable name generation for projects and peers.

use rand::Rng;

/// Maximum peer name length accepted by the remote tool.
pub const PEER_NAME_MAX: usize = 15;

/// Generates a unique two-word project name such as `happy-dolphin`.
#[must_use]
pub fn project_name() -> String {
    petname::petname(2, "-")
}

/// Generates a peer name tied to `project`, at most [`PEER_NAME_MAX`]
/// characters.
///
/// Format: `<initials>-<word><n>` where the initials come from the project
/// words (`happy-dolphin` -> `hd`), the word is a short petname, and the
/// numeric suffix is sized to whatever room is left.
#[must_use]
pub fn peer_name(project: &str) -> String {
    let initials: String = project
        .split('-')
        .filter_map(|word| word.chars().next())
        .take(4)
        .collect();

    // Petname word lists are dense in the 4-6 character range.
    let word = loop {
        let candidate = petname::petname(1, "-");
        if (4..=6).contains(&candidate.len()) {
            break candidate;
        }
    };

    let used = initials.len() + 1 + word.len();
    let digits = u32::try_from(PEER_NAME_MAX.saturating_sub(used).clamp(1, 4)).unwrap_or(1);
    let max_suffix = 10_u64.saturating_pow(digits) - 1;
    let suffix = rand::thread_rng().gen_range(1..=max_suffix);

    format!("{initials}-{word}{suffix}")
}

#[cfg(test)]
mod tests;
