//! Best-effort account e-mail lookup from the private auth file.
//!
//! `auth.json` holds an OpenID `id_token`; its payload carries the `email`
//! claim. The token is never verified or written anywhere, only decoded.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// File in `~/.codex` holding the account's tokens.
pub const AUTH_FILE: &str = "auth.json";

#[derive(Deserialize)]
struct AuthFile {
    tokens: Option<Tokens>,
}

#[derive(Deserialize)]
struct Tokens {
    id_token: Option<String>,
}

#[derive(Deserialize)]
struct Claims {
    email: Option<String>,
}

/// Read the account e-mail from the auth file in `codex_dir`, if any.
pub fn read_email(codex_dir: &Path) -> Option<String> {
    let path = codex_dir.join(AUTH_FILE);
    let content = std::fs::read_to_string(&path).ok()?;
    let auth: AuthFile = match serde_json::from_str(&content) {
        Ok(auth) => auth,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "auth file is not the expected shape");
            return None;
        }
    };
    email_from_id_token(&auth.tokens?.id_token?)
}

/// Extract the `email` claim from an unverified JWT.
pub fn email_from_id_token(token: &str) -> Option<String> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    claims.email.filter(|e| !e.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn token_with(claims: &str) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256"}"#),
            URL_SAFE_NO_PAD.encode(claims)
        )
    }

    #[test]
    fn test_email_from_token() {
        let token = token_with(r#"{"email":"dev@example.com","sub":"123"}"#);
        assert_eq!(email_from_id_token(&token).as_deref(), Some("dev@example.com"));
    }

    #[test]
    fn test_email_missing_or_garbage() {
        assert_eq!(email_from_id_token(&token_with(r#"{"sub":"123"}"#)), None);
        assert_eq!(email_from_id_token("not-a-jwt"), None);
        assert_eq!(email_from_id_token("a.!!!.c"), None);
    }

    #[test]
    fn test_read_email_from_auth_file() {
        let temp = TempDir::new().unwrap();
        let token = token_with(r#"{"email":"ops@example.com"}"#);
        std::fs::write(
            temp.path().join(AUTH_FILE),
            format!(r#"{{"tokens": {{"id_token": "{token}"}}}}"#),
        )
        .unwrap();

        assert_eq!(read_email(temp.path()).as_deref(), Some("ops@example.com"));
    }

    #[test]
    fn test_read_email_api_key_auth() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(AUTH_FILE), r#"{"OPENAI_API_KEY": "sk-test"}"#).unwrap();
        assert_eq!(read_email(temp.path()), None);
        assert_eq!(read_email(&temp.path().join("missing")), None);
    }
}
