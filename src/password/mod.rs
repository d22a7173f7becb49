//! Password policy validation.
//!
//! Rules are applied independently so every violation is reported in one
//! pass, together with a deterministic 0-100 strength score.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::crypto::{verify_password, Password, PasswordHashString};

/// Configurable strength policy.
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_special: bool,
    /// Longest permitted run of a single repeated character.
    pub max_repeat_run: usize,
    pub min_unique_chars: usize,
    /// How many previous password hashes a new password is checked against.
    pub history_depth: usize,
    pub max_age_days: i64,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 12,
            max_length: 128,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: true,
            max_repeat_run: 3,
            min_unique_chars: 6,
            history_depth: 5,
            max_age_days: 90,
        }
    }
}

/// A single policy violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum PolicyViolation {
    TooShort { min_length: usize, actual_length: usize },
    TooLong { max_length: usize, actual_length: usize },
    MissingUppercase,
    MissingLowercase,
    MissingDigit,
    MissingSpecial,
    RepeatedRun { max_run: usize },
    TooFewUniqueChars { min_unique: usize },
    WeakPassword,
    ContainsUserInfo { field: &'static str },
    ReusedPassword,
}

impl std::fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyViolation::TooShort {
                min_length,
                actual_length,
            } => write!(
                f,
                "Password must be at least {} characters (got {})",
                min_length, actual_length
            ),
            PolicyViolation::TooLong {
                max_length,
                actual_length,
            } => write!(
                f,
                "Password must be at most {} characters (got {})",
                max_length, actual_length
            ),
            PolicyViolation::MissingUppercase => {
                write!(f, "Password must contain at least one uppercase letter")
            }
            PolicyViolation::MissingLowercase => {
                write!(f, "Password must contain at least one lowercase letter")
            }
            PolicyViolation::MissingDigit => {
                write!(f, "Password must contain at least one number")
            }
            PolicyViolation::MissingSpecial => {
                write!(f, "Password must contain at least one special character")
            }
            PolicyViolation::RepeatedRun { max_run } => write!(
                f,
                "Password must not repeat a character more than {} times in a row",
                max_run
            ),
            PolicyViolation::TooFewUniqueChars { min_unique } => write!(
                f,
                "Password must contain at least {} distinct characters",
                min_unique
            ),
            PolicyViolation::WeakPassword => {
                write!(f, "Password is too common")
            }
            PolicyViolation::ContainsUserInfo { field } => {
                write!(f, "Password must not contain your {}", field)
            }
            PolicyViolation::ReusedPassword => {
                write!(f, "Password was used recently")
            }
        }
    }
}

/// Bucketed strength label derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PasswordStrength {
    VeryWeak,
    Weak,
    Fair,
    Strong,
    VeryStrong,
}

/// Result of a password validation pass.
#[derive(Debug, Clone, Serialize)]
pub struct PasswordValidation {
    pub valid: bool,
    pub strength: PasswordStrength,
    pub score: u32,
    pub errors: Vec<PolicyViolation>,
    pub suggestions: Vec<String>,
}

/// Known-subject fields checked for substring containment.
#[derive(Debug, Clone, Default)]
pub struct UserInfo {
    pub username: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub birthdate: Option<String>,
}

/// Fragments shorter than this are ignored to avoid false positives on
/// short substrings.
const MIN_USER_INFO_FRAGMENT: usize = 4;

static WEAK_PASSWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "password",
        "password1",
        "password123",
        "passw0rd",
        "123456",
        "12345678",
        "123456789",
        "1234567890",
        "qwerty",
        "qwerty123",
        "letmein",
        "welcome",
        "welcome1",
        "admin",
        "administrator",
        "iloveyou",
        "monkey",
        "dragon",
        "sunshine",
        "princess",
        "football",
        "baseball",
        "abc123",
        "trustno1",
        "master",
    ]
    .into_iter()
    .collect()
});

const SEQUENCES: [&str; 4] = ["abcdefghijklmnopqrstuvwxyz", "0123456789", "qwertyuiop", "asdfghjkl"];

#[derive(Debug, Clone)]
pub struct PasswordPolicyEngine {
    policy: PasswordPolicy,
}

impl PasswordPolicyEngine {
    pub fn new(policy: PasswordPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PasswordPolicy {
        &self.policy
    }

    /// Validate `password` against the policy, collecting every violation.
    ///
    /// `history` holds the subject's most recent password hashes, newest
    /// first; reuse is detected through hash verification, never plaintext
    /// comparison.
    pub fn validate(
        &self,
        password: &str,
        user_info: Option<&UserInfo>,
        history: Option<&[PasswordHashString]>,
    ) -> PasswordValidation {
        let mut errors = Vec::new();
        let char_count = password.chars().count();

        if char_count < self.policy.min_length {
            errors.push(PolicyViolation::TooShort {
                min_length: self.policy.min_length,
                actual_length: char_count,
            });
        }
        if char_count > self.policy.max_length {
            errors.push(PolicyViolation::TooLong {
                max_length: self.policy.max_length,
                actual_length: char_count,
            });
        }

        if self.policy.require_uppercase && !password.chars().any(|c| c.is_ascii_uppercase()) {
            errors.push(PolicyViolation::MissingUppercase);
        }
        if self.policy.require_lowercase && !password.chars().any(|c| c.is_ascii_lowercase()) {
            errors.push(PolicyViolation::MissingLowercase);
        }
        if self.policy.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            errors.push(PolicyViolation::MissingDigit);
        }
        if self.policy.require_special && !password.chars().any(is_special) {
            errors.push(PolicyViolation::MissingSpecial);
        }

        if longest_run(password) > self.policy.max_repeat_run {
            errors.push(PolicyViolation::RepeatedRun {
                max_run: self.policy.max_repeat_run,
            });
        }

        let unique_chars = password.chars().collect::<HashSet<_>>().len();
        if char_count > 0 && unique_chars < self.policy.min_unique_chars {
            errors.push(PolicyViolation::TooFewUniqueChars {
                min_unique: self.policy.min_unique_chars,
            });
        }

        let lowered = password.to_lowercase();
        let is_weak = WEAK_PASSWORDS.contains(lowered.as_str());
        if is_weak {
            errors.push(PolicyViolation::WeakPassword);
        }

        if let Some(info) = user_info {
            for (field, fragment) in user_fragments(info) {
                if fragment.chars().count() >= MIN_USER_INFO_FRAGMENT
                    && lowered.contains(&fragment)
                {
                    errors.push(PolicyViolation::ContainsUserInfo { field });
                }
            }
        }

        if let Some(history) = history {
            let candidate = Password::new(password.to_string());
            let reused = history
                .iter()
                .take(self.policy.history_depth)
                .any(|hash| verify_password(&candidate, hash).is_ok());
            if reused {
                errors.push(PolicyViolation::ReusedPassword);
            }
        }

        let score = score_password(password, char_count, unique_chars, is_weak);
        let strength = strength_bucket(score);
        let suggestions = errors.iter().map(suggestion_for).collect();

        PasswordValidation {
            valid: errors.is_empty(),
            strength,
            score,
            errors,
            suggestions,
        }
    }
}

fn is_special(c: char) -> bool {
    !c.is_ascii_alphanumeric() && !c.is_whitespace()
}

fn longest_run(password: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut previous = None;
    for c in password.chars() {
        if Some(c) == previous {
            current += 1;
        } else {
            current = 1;
            previous = Some(c);
        }
        longest = longest.max(current);
    }
    longest
}

fn contains_sequence(lowered: &str) -> bool {
    if lowered.chars().count() < 4 {
        return false;
    }
    let chars: Vec<char> = lowered.chars().collect();
    chars.windows(4).any(|w| {
        let fragment: String = w.iter().collect();
        let reversed: String = w.iter().rev().collect();
        SEQUENCES
            .iter()
            .any(|s| s.contains(&fragment) || s.contains(&reversed))
    })
}

/// Deterministic 0-100 composite: length, character classes, uniqueness,
/// minus penalties for weak or sequential passwords.
fn score_password(password: &str, char_count: usize, unique_chars: usize, is_weak: bool) -> u32 {
    if char_count == 0 {
        return 0;
    }

    let length_points = (char_count as u32 * 3).min(40);

    let mut classes = 0u32;
    if password.chars().any(|c| c.is_ascii_uppercase()) {
        classes += 1;
    }
    if password.chars().any(|c| c.is_ascii_lowercase()) {
        classes += 1;
    }
    if password.chars().any(|c| c.is_ascii_digit()) {
        classes += 1;
    }
    if password.chars().any(is_special) {
        classes += 1;
    }
    let class_points = classes * 10;

    let uniqueness_points = ((unique_chars * 20) / char_count) as u32;

    let mut score = length_points + class_points + uniqueness_points;
    if is_weak {
        score = score.saturating_sub(40);
    }
    if contains_sequence(&password.to_lowercase()) {
        score = score.saturating_sub(15);
    }
    score.min(100)
}

fn strength_bucket(score: u32) -> PasswordStrength {
    match score {
        0..=29 => PasswordStrength::VeryWeak,
        30..=49 => PasswordStrength::Weak,
        50..=69 => PasswordStrength::Fair,
        70..=84 => PasswordStrength::Strong,
        _ => PasswordStrength::VeryStrong,
    }
}

fn suggestion_for(violation: &PolicyViolation) -> String {
    match violation {
        PolicyViolation::TooShort { min_length, .. } => {
            format!("Use at least {} characters", min_length)
        }
        PolicyViolation::TooLong { max_length, .. } => {
            format!("Use at most {} characters", max_length)
        }
        PolicyViolation::MissingUppercase => "Add an uppercase letter".to_string(),
        PolicyViolation::MissingLowercase => "Add a lowercase letter".to_string(),
        PolicyViolation::MissingDigit => "Add a number".to_string(),
        PolicyViolation::MissingSpecial => "Add a special character".to_string(),
        PolicyViolation::RepeatedRun { .. } => {
            "Avoid repeating the same character".to_string()
        }
        PolicyViolation::TooFewUniqueChars { .. } => {
            "Use a wider variety of characters".to_string()
        }
        PolicyViolation::WeakPassword => {
            "Avoid common passwords".to_string()
        }
        PolicyViolation::ContainsUserInfo { .. } => {
            "Avoid using personal information".to_string()
        }
        PolicyViolation::ReusedPassword => {
            "Choose a password you have not used before".to_string()
        }
    }
}

fn user_fragments(info: &UserInfo) -> Vec<(&'static str, String)> {
    let mut fragments = Vec::new();
    if let Some(username) = &info.username {
        fragments.push(("username", username.to_lowercase()));
    }
    if let Some(email) = &info.email {
        // Only the local part; the domain is shared by too many users.
        if let Some(local) = email.split('@').next() {
            fragments.push(("email", local.to_lowercase()));
        }
    }
    if let Some(name) = &info.name {
        for part in name.split_whitespace() {
            fragments.push(("name", part.to_lowercase()));
        }
    }
    if let Some(birthdate) = &info.birthdate {
        fragments.push(("birthday", birthdate.replace('-', "")));
        fragments.push(("birthday", birthdate.to_lowercase()));
    }
    fragments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash_password;

    fn engine() -> PasswordPolicyEngine {
        PasswordPolicyEngine::new(PasswordPolicy::default())
    }

    #[test]
    fn test_min_length_boundary() {
        let policy = PasswordPolicy {
            min_length: 12,
            ..PasswordPolicy::default()
        };
        let engine = PasswordPolicyEngine::new(policy);

        // One short of the minimum, all classes present: length is the only
        // violation.
        let result = engine.validate("Vx9!KmPw2a#", None, None);
        assert!(!result.valid);
        assert_eq!(
            result.errors,
            vec![PolicyViolation::TooShort {
                min_length: 12,
                actual_length: 11
            }]
        );

        // At the minimum with all classes: passes.
        let result = engine.validate("Vx9!KmPw2a#Q", None, None);
        assert!(result.valid, "unexpected errors: {:?}", result.errors);
    }

    #[test]
    fn test_all_violations_are_collected() {
        let result = engine().validate("aaaa", None, None);
        assert!(!result.valid);
        assert!(result.errors.contains(&PolicyViolation::TooShort {
            min_length: 12,
            actual_length: 4
        }));
        assert!(result.errors.contains(&PolicyViolation::MissingUppercase));
        assert!(result.errors.contains(&PolicyViolation::MissingDigit));
        assert!(result.errors.contains(&PolicyViolation::MissingSpecial));
        assert!(result
            .errors
            .contains(&PolicyViolation::RepeatedRun { max_run: 3 }));
        assert!(result
            .errors
            .contains(&PolicyViolation::TooFewUniqueChars { min_unique: 6 }));
        assert_eq!(result.suggestions.len(), result.errors.len());
    }

    #[test]
    fn test_weak_password_set() {
        let result = engine().validate("Password123", None, None);
        // Case-insensitive lookup against the weak set.
        assert!(result.errors.contains(&PolicyViolation::WeakPassword));
    }

    #[test]
    fn test_user_info_containment() {
        let info = UserInfo {
            username: Some("alicewonder".to_string()),
            email: Some("alice.w@example.com".to_string()),
            name: Some("Alice Wonder".to_string()),
            birthdate: Some("1990-04-01".to_string()),
        };

        let result = engine().validate("xAlicewonder9!pw", Some(&info), None);
        assert!(result
            .errors
            .contains(&PolicyViolation::ContainsUserInfo { field: "username" }));
    }

    #[test]
    fn test_short_user_fragments_are_ignored() {
        let info = UserInfo {
            username: Some("ab".to_string()),
            ..UserInfo::default()
        };

        // "ab" appears in the password but is below the fragment gate.
        let result = engine().validate("xAbsolute9!pwQz", Some(&info), None);
        assert!(!result
            .errors
            .iter()
            .any(|e| matches!(e, PolicyViolation::ContainsUserInfo { .. })));
    }

    #[test]
    fn test_history_reuse_detected_via_hash() {
        let old = Password::new("OldPassw0rd!xyz".to_string());
        let old_hash = hash_password(&old).expect("hash failed");

        let result = engine().validate("OldPassw0rd!xyz", None, Some(&[old_hash.clone()]));
        assert!(result.errors.contains(&PolicyViolation::ReusedPassword));

        let result = engine().validate("BrandNew9!pwQzX", None, Some(&[old_hash]));
        assert!(!result.errors.contains(&PolicyViolation::ReusedPassword));
    }

    #[test]
    fn test_history_depth_is_respected() {
        let policy = PasswordPolicy {
            history_depth: 1,
            ..PasswordPolicy::default()
        };
        let engine = PasswordPolicyEngine::new(policy);

        let older = hash_password(&Password::new("Older9!pwQzXvBn".to_string())).unwrap();
        let newest = hash_password(&Password::new("Newest9!pwQzXvB".to_string())).unwrap();

        // Only the newest hash is in range at depth 1.
        let result = engine.validate("Older9!pwQzXvBn", None, Some(&[newest, older]));
        assert!(!result.errors.contains(&PolicyViolation::ReusedPassword));
    }

    #[test]
    fn test_score_is_deterministic_and_bucketed() {
        let engine = engine();
        let a = engine.validate("Tr1cky&Unu5ual#Phrase", None, None);
        let b = engine.validate("Tr1cky&Unu5ual#Phrase", None, None);
        assert_eq!(a.score, b.score);
        assert!(a.score >= 85);
        assert_eq!(a.strength, PasswordStrength::VeryStrong);

        let weak = engine.validate("password", None, None);
        assert!(weak.score < 30);
        assert_eq!(weak.strength, PasswordStrength::VeryWeak);
    }

    #[test]
    fn test_sequential_pattern_is_penalized() {
        let engine = engine();
        let sequential = engine.validate("Abcdefg9!pwQz", None, None);
        let scrambled = engine.validate("Agdbecf9!pwQz", None, None);
        assert!(sequential.score < scrambled.score);
    }
}
