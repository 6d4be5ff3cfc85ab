use std::collections::HashSet;
use std::fmt;

use jsonwebtoken::Algorithm;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::Validation;
use serde_json::Map;
use serde_json::Value;

use crate::tier::Tier;
use crate::tier::TierCatalog;

const BEARER: &str = "bearer";

/// The key a caller's request volume is tracked under.
///
/// Verified users and anonymous addresses never share a key, even when a user
/// id happens to look like an address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    User(String),
    Address(String),
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Address(addr) => write!(f, "addr:{addr}"),
        }
    }
}

/// Which claims of a verified token carry the user id and the tier label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimFields {
    pub user_id: String,
    pub tier: String,
}

impl ClaimFields {
    pub fn new(user_id: impl Into<String>, tier: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            tier: tier.into(),
        }
    }

    /// Claim names used by tokens issued at login (`userId` and `plan`).
    pub fn plan_claims() -> Self {
        Self::new("userId", "plan")
    }
}

impl Default for ClaimFields {
    fn default() -> Self {
        Self::new("id", "tier")
    }
}

/// Errors raised while building an [`IdentityResolver`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolverError {
    #[error("credential verification secret must not be empty")]
    EmptySecret,
}

/// Derives `(identity, tier)` for a request from its `Authorization` header and
/// network address.
///
/// Resolution never fails. Credentials that cannot be verified are treated
/// exactly like absent credentials.
#[derive(Clone)]
pub struct IdentityResolver {
    key: DecodingKey,
    validation: Validation,
    fields: ClaimFields,
    catalog: TierCatalog,
}

impl fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("fields", &self.fields)
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}

impl IdentityResolver {
    /// Creates a resolver verifying HMAC signed tokens against `secret`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::EmptySecret`] if `secret` is empty.
    pub fn new(
        secret: &[u8],
        fields: ClaimFields,
        catalog: TierCatalog,
    ) -> Result<Self, ResolverError> {
        if secret.is_empty() {
            return Err(ResolverError::EmptySecret);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.required_spec_claims = HashSet::new();
        validation.validate_aud = false;
        validation.leeway = 0;

        Ok(Self {
            key: DecodingKey::from_secret(secret),
            validation,
            fields,
            catalog,
        })
    }

    pub fn catalog(&self) -> &TierCatalog {
        &self.catalog
    }

    pub fn resolve(&self, authorization: Option<&str>, address: &str) -> (Identity, Tier) {
        if let Some(token) = authorization.and_then(bearer_token) {
            match self.verify(token) {
                Ok(claims) => {
                    if let Some(user_id) = user_id(claims.get(&self.fields.user_id)) {
                        let label = claims.get(&self.fields.tier).and_then(Value::as_str);
                        let tier = self.catalog.resolve(label).clone();
                        return (Identity::User(user_id), tier);
                    }
                    tracing::debug!(
                        claim = %self.fields.user_id,
                        "verified credential carries no user id; treating caller as anonymous"
                    );
                }
                Err(error) => {
                    tracing::debug!(%error, "credential rejected; treating caller as anonymous");
                }
            }
        }

        (
            Identity::Address(address.to_string()),
            self.catalog.guest().clone(),
        )
    }

    fn verify(&self, token: &str) -> jsonwebtoken::errors::Result<Map<String, Value>> {
        jsonwebtoken::decode::<Map<String, Value>>(token, &self.key, &self.validation)
            .map(|data| data.claims)
    }
}

/// Extracts the credential from a `Bearer <token>` header value.
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case(BEARER) {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn user_id(claim: Option<&Value>) -> Option<String> {
    match claim? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::EncodingKey;
    use jsonwebtoken::Header;
    use serde_json::json;

    use super::*;
    use crate::GUEST;

    const SECRET: &[u8] = b"a-shared-secret";
    const ADDRESS: &str = "198.51.100.20";

    fn resolver(fields: ClaimFields) -> IdentityResolver {
        IdentityResolver::new(SECRET, fields, TierCatalog::default()).unwrap()
    }

    fn sign(claims: Value, secret: &[u8]) -> String {
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret),
        )
        .unwrap()
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {token}")
    }

    fn anonymous() -> (Identity, String) {
        (Identity::Address(ADDRESS.to_string()), GUEST.to_string())
    }

    fn resolve(resolver: &IdentityResolver, header: Option<&str>) -> (Identity, String) {
        let (identity, tier) = resolver.resolve(header, ADDRESS);
        (identity, tier.name().to_string())
    }

    #[test]
    fn empty_secret_is_rejected() {
        let err =
            IdentityResolver::new(b"", ClaimFields::default(), TierCatalog::default()).unwrap_err();
        assert_eq!(err, ResolverError::EmptySecret);
    }

    #[test]
    fn missing_credential_is_anonymous() {
        let resolver = resolver(ClaimFields::default());
        assert_eq!(resolve(&resolver, None), anonymous());
        assert_eq!(resolve(&resolver, Some("")), anonymous());
        assert_eq!(resolve(&resolver, Some("Bearer")), anonymous());
        assert_eq!(resolve(&resolver, Some("Bearer    ")), anonymous());
    }

    #[test]
    fn valid_credential_yields_user_and_tier() {
        let resolver = resolver(ClaimFields::default());
        let token = sign(json!({ "id": "u1", "tier": "premium" }), SECRET);

        assert_eq!(
            resolve(&resolver, Some(&bearer(&token))),
            (Identity::User("u1".to_string()), "premium".to_string())
        );
    }

    #[test]
    fn scheme_is_case_insensitive() {
        let resolver = resolver(ClaimFields::default());
        let token = sign(json!({ "id": "u1", "tier": "free" }), SECRET);

        let (identity, _) = resolve(&resolver, Some(&format!("bearer {token}")));
        assert_eq!(identity, Identity::User("u1".to_string()));
    }

    #[test]
    fn other_schemes_are_anonymous() {
        let resolver = resolver(ClaimFields::default());
        let token = sign(json!({ "id": "u1", "tier": "free" }), SECRET);

        assert_eq!(resolve(&resolver, Some(&format!("Basic {token}"))), anonymous());
        assert_eq!(resolve(&resolver, Some(&token)), anonymous());
    }

    #[test]
    fn numeric_user_ids_are_accepted() {
        let resolver = resolver(ClaimFields::default());
        let token = sign(json!({ "id": 42, "tier": "free" }), SECRET);

        assert_eq!(
            resolve(&resolver, Some(&bearer(&token))),
            (Identity::User("42".to_string()), "free".to_string())
        );
    }

    #[test]
    fn unknown_or_missing_tier_label_is_guest() {
        let resolver = resolver(ClaimFields::default());

        let token = sign(json!({ "id": "u1", "tier": "platinum" }), SECRET);
        assert_eq!(
            resolve(&resolver, Some(&bearer(&token))),
            (Identity::User("u1".to_string()), GUEST.to_string())
        );

        let token = sign(json!({ "id": "u1" }), SECRET);
        assert_eq!(
            resolve(&resolver, Some(&bearer(&token))),
            (Identity::User("u1".to_string()), GUEST.to_string())
        );

        let token = sign(json!({ "id": "u1", "tier": 7 }), SECRET);
        assert_eq!(
            resolve(&resolver, Some(&bearer(&token))),
            (Identity::User("u1".to_string()), GUEST.to_string())
        );
    }

    #[test]
    fn bad_signature_falls_back_to_address() {
        let resolver = resolver(ClaimFields::default());
        let token = sign(json!({ "id": "u1", "tier": "premium" }), b"someone-else");

        assert_eq!(resolve(&resolver, Some(&bearer(&token))), anonymous());
    }

    #[test]
    fn expired_credential_falls_back_to_address() {
        let resolver = resolver(ClaimFields::default());
        let token = sign(json!({ "id": "u1", "tier": "premium", "exp": 1 }), SECRET);

        assert_eq!(resolve(&resolver, Some(&bearer(&token))), anonymous());
    }

    #[test]
    fn unexpired_credential_is_accepted() {
        let resolver = resolver(ClaimFields::default());
        let exp = jsonwebtoken::get_current_timestamp() + 3600;
        let token = sign(json!({ "id": "u1", "tier": "free", "exp": exp }), SECRET);

        assert_eq!(
            resolve(&resolver, Some(&bearer(&token))),
            (Identity::User("u1".to_string()), "free".to_string())
        );
    }

    #[test]
    fn malformed_credential_falls_back_to_address() {
        let resolver = resolver(ClaimFields::default());
        assert_eq!(resolve(&resolver, Some("Bearer not.a.jwt")), anonymous());
        assert_eq!(resolve(&resolver, Some("Bearer garbage")), anonymous());
    }

    #[test]
    fn verified_credential_without_user_id_is_anonymous() {
        let resolver = resolver(ClaimFields::default());
        let token = sign(json!({ "userId": "u1", "tier": "premium" }), SECRET);

        assert_eq!(resolve(&resolver, Some(&bearer(&token))), anonymous());
    }

    #[test]
    fn plan_claims_read_login_tokens() {
        let resolver = resolver(ClaimFields::plan_claims());
        let token = sign(json!({ "userId": "7c9e", "plan": "premium" }), SECRET);

        assert_eq!(
            resolve(&resolver, Some(&bearer(&token))),
            (Identity::User("7c9e".to_string()), "premium".to_string())
        );
    }

    #[test]
    fn resolution_is_deterministic() {
        let resolver = resolver(ClaimFields::default());
        let token = sign(json!({ "id": "u1", "tier": "free" }), SECRET);
        let header = bearer(&token);

        let first = resolve(&resolver, Some(&header));
        for _ in 0..5 {
            assert_eq!(resolve(&resolver, Some(&header)), first);
        }
    }

    #[test]
    fn identities_do_not_collide_across_namespaces() {
        let user = Identity::User(ADDRESS.to_string());
        let address = Identity::Address(ADDRESS.to_string());
        assert_ne!(user, address);
        assert_eq!(user.to_string(), format!("user:{ADDRESS}"));
        assert_eq!(address.to_string(), format!("addr:{ADDRESS}"));
    }
}
