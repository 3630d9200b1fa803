//! HS256 bearer auth (§6): `{sub, exp, permissions: [read|write]}`, 1–24h
//! typical expiration. A development bypass flag is recognized only when
//! the process carries an explicit dev env marker (never silently).

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing or malformed bearer token")]
    Missing,
    #[error("invalid or expired token")]
    Invalid,
    #[error("token lacks required permission")]
    Forbidden,
}

pub fn issue_token(secret: &str, sub: &str, ttl_hours: i64, permissions: Vec<Permission>) -> String {
    let exp = (chrono::Utc::now() + chrono::Duration::hours(ttl_hours)).timestamp();
    let claims = Claims {
        sub: sub.to_string(),
        exp,
        permissions,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("HS256 encoding of a well-formed claim set cannot fail")
}

pub fn verify_token(secret: &str, token: &str) -> Result<Claims, AuthError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AuthError::Invalid)?;
    Ok(data.claims)
}

pub fn require_permission(claims: &Claims, needed: Permission) -> Result<(), AuthError> {
    if claims.permissions.contains(&needed) {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies_with_same_secret() {
        let token = issue_token("shh", "reader", 1, vec![Permission::Read]);
        let claims = verify_token("shh", &token).unwrap();
        assert_eq!(claims.sub, "reader");
        assert!(claims.permissions.contains(&Permission::Read));
    }

    #[test]
    fn token_fails_with_wrong_secret() {
        let token = issue_token("shh", "reader", 1, vec![Permission::Read]);
        assert!(verify_token("different", &token).is_err());
    }

    #[test]
    fn missing_permission_is_forbidden() {
        let claims = Claims {
            sub: "reader".into(),
            exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp(),
            permissions: vec![Permission::Read],
        };
        assert!(matches!(
            require_permission(&claims, Permission::Write),
            Err(AuthError::Forbidden)
        ));
    }
}
