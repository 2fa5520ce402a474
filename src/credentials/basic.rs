//! HTTP Basic credentials (RFC 7617).

use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Builds the `Authorization` value for a Basic profile.
///
/// # Arguments
///
/// * `username` - Profile username
/// * `password` - Profile password
///
/// # Returns
///
/// `"Basic <base64(username:password)>"`.
///
/// # Examples
///
/// ```
/// use collection_replay::credentials::basic::basic_auth;
///
/// assert_eq!(basic_auth("user", "pass123"), "Basic dXNlcjpwYXNzMTIz");
/// ```
pub fn basic_auth(username: &str, password: &str) -> String {
    let credentials = format!("{}:{}", username, password);
    format!("Basic {}", STANDARD.encode(credentials.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(header: &str) -> String {
        let encoded = header.strip_prefix("Basic ").unwrap();
        String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap()
    }

    #[test]
    fn test_basic_auth_simple() {
        assert_eq!(basic_auth("user", "pass"), "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn test_basic_auth_with_colons_in_password() {
        assert_eq!(
            decode(&basic_auth("admin@example.com", "p@ss:w0rd!")),
            "admin@example.com:p@ss:w0rd!"
        );
    }

    #[test]
    fn test_basic_auth_empty_parts() {
        assert_eq!(basic_auth("user", ""), "Basic dXNlcjo=");
        assert_eq!(decode(&basic_auth("", "password")), ":password");
    }

    #[test]
    fn test_basic_auth_unicode() {
        assert_eq!(decode(&basic_auth("用户", "密码🔒")), "用户:密码🔒");
    }
}
