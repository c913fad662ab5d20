//! Input predicates for task text and account credentials.
//!
//! Pure functions: no errors, no side effects. Callers turn a failed
//! predicate into the matching `ValidationError`.

use once_cell::sync::Lazy;
use regex::Regex;

pub const TITLE_MAX: usize = 200;
pub const DESCRIPTION_MAX: usize = 2000;
pub const DEFAULT_SANITIZE_MAX: usize = 1000;
pub const EMAIL_MAX: usize = 254;
pub const PASSWORD_MIN: usize = 8;
pub const PASSWORD_MAX: usize = 128;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

/// Trimmed length in [1, TITLE_MAX].
pub fn is_valid_task_title(title: &str) -> bool {
    let len = title.trim().chars().count();
    (1..=TITLE_MAX).contains(&len)
}

/// Absent is fine. Otherwise at most DESCRIPTION_MAX chars, untrimmed.
pub fn is_valid_task_description(description: Option<&str>) -> bool {
    match description {
        None => true,
        Some(d) => d.chars().count() <= DESCRIPTION_MAX,
    }
}

/// Drop NUL characters, trim, then cut to `max_len` chars.
pub fn sanitize_string(input: &str, max_len: usize) -> String {
    let stripped: String = input.chars().filter(|&c| c != '\0').collect();
    let trimmed = stripped.trim();
    // truncation can expose trailing whitespace from the middle of the input
    trimmed.chars().take(max_len).collect::<String>().trim_end().to_string()
}

pub fn sanitize(input: &str) -> String {
    sanitize_string(input, DEFAULT_SANITIZE_MAX)
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= EMAIL_MAX && EMAIL_RE.is_match(email)
}

/// 8..=128 chars with at least one ASCII letter and one ASCII digit.
pub fn is_valid_password(password: &str) -> bool {
    let len = password.chars().count();
    (PASSWORD_MIN..=PASSWORD_MAX).contains(&len)
        && password.chars().any(|c| c.is_ascii_alphabetic())
        && password.chars().any(|c| c.is_ascii_digit())
}

/// Title check with the specific failure reason.
pub fn check_task_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    if !is_valid_task_title(title) {
        return Err(ValidationError::TitleTooLong);
    }
    Ok(())
}

pub fn check_task_description(description: Option<&str>) -> Result<(), ValidationError> {
    if is_valid_task_description(description) {
        Ok(())
    } else {
        Err(ValidationError::DescriptionTooLong)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Title cannot be empty")]
    EmptyTitle,
    #[error("Title must be 200 characters or less")]
    TitleTooLong,
    #[error("Description must be 2000 characters or less")]
    DescriptionTooLong,
    #[error("Invalid email address")]
    InvalidEmail,
    #[error("Password must be at least 8 characters and contain a letter and a number")]
    WeakPassword,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_bounds() {
        assert!(!is_valid_task_title(""));
        assert!(!is_valid_task_title("   \t\n"));
        assert!(is_valid_task_title("a"));
        assert!(is_valid_task_title("  Buy milk  "));
        assert!(is_valid_task_title(&"x".repeat(200)));
        assert!(!is_valid_task_title(&"x".repeat(201)));
        // surrounding whitespace doesn't count against the limit
        assert!(is_valid_task_title(&format!("  {}  ", "x".repeat(200))));
    }

    #[test]
    fn title_counts_chars_not_bytes() {
        assert!(is_valid_task_title(&"é".repeat(200)));
        assert!(!is_valid_task_title(&"é".repeat(201)));
    }

    #[test]
    fn description_bounds() {
        assert!(is_valid_task_description(None));
        assert!(is_valid_task_description(Some("")));
        assert!(is_valid_task_description(Some(&"d".repeat(2000))));
        assert!(!is_valid_task_description(Some(&"d".repeat(2001))));
        // no trimming: whitespace counts
        assert!(!is_valid_task_description(Some(&" ".repeat(2001))));
    }

    #[test]
    fn sanitize_strips_nul_and_trims() {
        assert_eq!(sanitize("  he\0llo \0 "), "hello");
        assert_eq!(sanitize("\0\0"), "");
        assert_eq!(sanitize_string("abcdef", 3), "abc");
    }

    #[test]
    fn sanitize_output_properties() {
        let inputs = [
            "",
            " \0 ",
            "plain",
            "  lead",
            "trail  ",
            "a\0b\0c",
            "word word word word",
            "\t\n mixed \0 whitespace \n\t",
        ];
        for input in inputs {
            for max in [0, 1, 4, 5, 10, 1000] {
                let out = sanitize_string(input, max);
                assert!(!out.contains('\0'), "{input:?}/{max}");
                assert_eq!(out, out.trim(), "{input:?}/{max}");
                assert!(out.chars().count() <= max, "{input:?}/{max}");
            }
        }
    }

    #[test]
    fn sanitize_truncation_does_not_leave_trailing_space() {
        assert_eq!(sanitize_string("ab cd", 3), "ab");
    }

    #[test]
    fn email_format() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("first.last+tag@sub.example.org"));
        assert!(!is_valid_email("user@example"));
        assert!(!is_valid_email("userexample.com"));
        assert!(!is_valid_email("user @example.com"));
        assert!(!is_valid_email(""));
        let long = format!("{}@example.com", "a".repeat(250));
        assert!(!is_valid_email(&long));
    }

    #[test]
    fn password_strength() {
        assert!(is_valid_password("hunter22"));
        assert!(!is_valid_password("short1"));
        assert!(!is_valid_password("allletters"));
        assert!(!is_valid_password("12345678"));
        assert!(!is_valid_password(&format!("a1{}", "x".repeat(127))));
    }

    #[test]
    fn title_check_reasons() {
        assert_eq!(check_task_title(" "), Err(ValidationError::EmptyTitle));
        assert_eq!(check_task_title(&"t".repeat(201)), Err(ValidationError::TitleTooLong));
        assert_eq!(check_task_title("ok"), Ok(()));
        assert_eq!(
            check_task_description(Some(&"d".repeat(2001))),
            Err(ValidationError::DescriptionTooLong)
        );
    }
}
