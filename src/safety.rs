//! Variable safety filtering for user-supplied command and playbook text.
//!
//! A user-supplied command or playbook could try to exfiltrate another
//! host's stored credentials through a template expression such as
//! `{{ ansible_ssh_pass }}`. The filter scans raw text for references to a
//! fixed deny-list of sensitive variable names before anything is allowed to
//! execute.
//!
//! This is text-pattern matching, not a semantic parse: it is a best-effort
//! guard, not a proof of safety.

use once_cell::sync::Lazy;
use regex::Regex;

/// Connection-secret variable names that must never be readable or
/// overridable through user-supplied text. Matching is case-insensitive.
pub const DENY_LIST: &[&str] = &[
    "vars",
    "hostvars",
    "ansible_ssh_pass",
    "ansible_password",
    "ansible_ssh_private_key_file",
    "ansible_private_key_file",
    "ansible_become_pass",
    "ansible_become_password",
    "ansible_enable_pass",
    "ansible_pass",
    "ansible_sudo_pass",
    "ansible_sudo_password",
    "ansible_su_pass",
    "ansible_su_password",
    "vault_password",
];

/// Candidate matcher: any deny-listed name with one character of context on
/// each side, so template punctuation around the name is captured and can be
/// stripped before the membership check. Longer names are tried first so
/// `ansible_become_password` is not truncated to `ansible_become_pass`.
static DENY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    let mut names: Vec<&str> = DENY_LIST.to_vec();
    names.sort_by_key(|name| std::cmp::Reverse(name.len()));
    let alternatives = names.join("|");
    Regex::new(&format!(r"(?i)[\s\S]?({alternatives})[\s\S]?"))
        .expect("invalid deny-list pattern")
});

/// Scans raw user-supplied text for denied variable references.
///
/// Behind a trait so a structured-parse implementation can replace the
/// regex-based one without touching callers.
pub trait SafetyFilter: Send + Sync {
    /// Returns the offending deny-list name, or `None` when the text is
    /// clean.
    fn scan(&self, text: &str) -> Option<String>;
}

/// The default regex-based deny-list filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyListFilter;

impl DenyListFilter {
    /// Create a new filter.
    pub fn new() -> Self {
        Self
    }

    /// Strip template punctuation off a candidate token: surrounding
    /// whitespace, a leading `=` or `{`, and a trailing `}`. This avoids
    /// false negatives when the variable sits inside an expression like
    /// `{{ ansible_ssh_pass }}`.
    fn clean_token(token: &str) -> &str {
        let token = token.trim();
        let token = token
            .strip_prefix('=')
            .or_else(|| token.strip_prefix('{'))
            .unwrap_or(token);
        token.strip_suffix('}').unwrap_or(token)
    }
}

impl SafetyFilter for DenyListFilter {
    fn scan(&self, text: &str) -> Option<String> {
        // "vars:" and "vars_files:" are structural playbook keywords that
        // contain the substring "vars" without being the sensitive
        // identifier; neutralize them before matching.
        let text = text.replace("vars_files:", "+++").replace("vars:", "+++");

        for candidate in DENY_PATTERN.find_iter(&text) {
            let token = Self::clean_token(candidate.as_str());
            let lowered = token.to_lowercase();
            if DENY_LIST.contains(&lowered.as_str()) {
                return Some(lowered);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(text: &str) -> Option<String> {
        DenyListFilter::new().scan(text)
    }

    #[test]
    fn test_bare_denied_name_flagged() {
        assert_eq!(scan("echo ansible_ssh_pass"), Some("ansible_ssh_pass".into()));
    }

    #[test]
    fn test_templated_reference_flagged() {
        assert_eq!(
            scan("{{ ansible_become_pass }}"),
            Some("ansible_become_pass".into())
        );
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(scan("echo {{ Ansible_SSH_Pass }}"), Some("ansible_ssh_pass".into()));
    }

    #[test]
    fn test_vars_keyword_not_flagged() {
        let playbook = "- hosts: all\n  vars:\n    greeting: hi\n  tasks: []\n";
        assert_eq!(scan(playbook), None);
    }

    #[test]
    fn test_vars_files_keyword_not_flagged() {
        assert_eq!(scan("vars_files:\n  - common.yml\n"), None);
    }

    #[test]
    fn test_embedded_substring_not_flagged() {
        // "myvars" contains the substring but is not the identifier itself.
        assert_eq!(scan("echo $myvars_value"), None);
    }

    #[test]
    fn test_benign_prefix_does_not_mask_later_secret() {
        assert_eq!(
            scan("echo myvars; cat {{ ansible_ssh_pass }}"),
            Some("ansible_ssh_pass".into())
        );
    }

    #[test]
    fn test_longest_name_wins() {
        assert_eq!(
            scan("{{ ansible_become_password }}"),
            Some("ansible_become_password".into())
        );
    }

    #[test]
    fn test_clean_text_passes() {
        assert_eq!(scan("uptime && df -h"), None);
        assert_eq!(scan(""), None);
    }
}
