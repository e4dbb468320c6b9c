//! Input policy for user-facing account fields.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::AuthError;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email regex is valid")
});

const SPECIAL: &str = "!@#$%^&*(),.?\":{}|<>";
const MIN_USERNAME_LEN: usize = 3;

pub fn check_email(email: &str) -> Result<(), AuthError> {
    if EMAIL.is_match(email) {
        Ok(())
    } else {
        Err(AuthError::Policy("invalid email format".into()))
    }
}

pub fn check_username(username: &str) -> Result<(), AuthError> {
    if username.trim().chars().count() < MIN_USERNAME_LEN {
        return Err(AuthError::Policy(format!(
            "username must be at least {MIN_USERNAME_LEN} characters long"
        )));
    }
    Ok(())
}

/// Length plus upper, lower, digit and special character classes.
pub fn check_password(password: &str, min_length: usize) -> Result<(), AuthError> {
    if password.chars().count() < min_length {
        return Err(AuthError::Policy(format!(
            "password must be at least {min_length} characters long"
        )));
    }
    let upper = password.chars().any(|c| c.is_ascii_uppercase());
    let lower = password.chars().any(|c| c.is_ascii_lowercase());
    let digit = password.chars().any(|c| c.is_ascii_digit());
    let special = password.chars().any(|c| SPECIAL.contains(c));
    if !(upper && lower && digit && special) {
        return Err(AuthError::Policy(
            "password must contain uppercase, lowercase, number, and special character".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails() {
        assert!(check_email("alice@example.com").is_ok());
        assert!(check_email("a.b+tag@sub.example.io").is_ok());
        assert!(check_email("alice@example").is_err());
        assert!(check_email("not an email").is_err());
    }

    #[test]
    fn usernames() {
        assert!(check_username("bob").is_ok());
        assert!(check_username(" ab ").is_err());
    }

    #[test]
    fn passwords() {
        assert!(check_password("Str0ng!pw", 8).is_ok());
        assert!(check_password("Sh0rt!", 8).is_err());
        assert!(check_password("alllower1!", 8).is_err());
        assert!(check_password("NoDigits!!", 8).is_err());
        assert!(check_password("NoSpecial12", 8).is_err());
    }
}
