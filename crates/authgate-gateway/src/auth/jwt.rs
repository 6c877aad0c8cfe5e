//! JWT token encoding and validation.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use authgate_core::{Principal, TokenSettings};

/// Signing algorithm for every issued token.
pub const ALGORITHM: Algorithm = Algorithm::HS512;

/// Claim key holding the authority list.
pub const CLAIM_AUTHORITIES: &str = "scopes";

/// Claim key holding the embedded user profile.
pub const CLAIM_USER: &str = "user";

/// Token codec errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Principal has no username.
    #[error("Cannot create token without username")]
    MissingUsername,

    /// Principal has no authorities.
    #[error("Cannot create token without authorities")]
    MissingAuthorities,

    /// Token has expired or cannot be parsed.
    #[error("Token expired or malformed: {0}")]
    ExpiredOrMalformed(String),

    /// Token signature, algorithm or issuer does not match.
    #[error("Token invalid: {0}")]
    Invalid(String),

    /// Claims could not be serialized or signed.
    #[error("Token encoding failed: {0}")]
    Encoding(String),
}

/// JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (username).
    pub sub: String,
    /// Issuer.
    pub iss: String,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
    /// Authorities, see [`CLAIM_AUTHORITIES`].
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Embedded profile, see [`CLAIM_USER`].
    #[serde(default)]
    pub user: serde_json::Value,
}

/// Stateless encoder/decoder between principals and signed tokens.
///
/// Safe to share across requests; holds only keys derived at construction.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    lifetime: Duration,
    structure: Validation,
    signature: Validation,
}

impl TokenCodec {
    /// Create a codec from token settings.
    #[must_use]
    pub fn new(settings: &TokenSettings) -> Self {
        let issuer = settings.issuer().to_string();

        // Structure pass: parse only, nothing is trusted yet
        let mut structure = Validation::new(ALGORITHM);
        structure.insecure_disable_signature_validation();
        structure.validate_exp = false;
        structure.required_spec_claims.clear();

        // Signature pass: expiry is checked against the caller's clock instead
        let mut signature = Validation::new(ALGORITHM);
        signature.validate_exp = false;
        signature.required_spec_claims.clear();
        signature.set_issuer(&[issuer.as_str()]);

        Self {
            encoding_key: EncodingKey::from_secret(settings.signing_key()),
            decoding_key: DecodingKey::from_secret(settings.signing_key()),
            issuer,
            lifetime: Duration::from_std(settings.lifetime()).unwrap_or(Duration::MAX),
            structure,
            signature,
        }
    }

    /// Configured issuer.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Encode a token for a principal, embedding `profile` verbatim.
    ///
    /// # Errors
    ///
    /// Returns error if the username is empty or signing fails.
    pub fn encode<P>(&self, profile: &P, principal: &Principal) -> Result<String, TokenError>
    where
        P: Serialize + ?Sized,
    {
        self.encode_at(profile, principal, Utc::now())
    }

    /// Encode a token with an explicit issue time.
    ///
    /// # Errors
    ///
    /// Returns error if the username is empty or signing fails.
    pub fn encode_at<P>(
        &self,
        profile: &P,
        principal: &Principal,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError>
    where
        P: Serialize + ?Sized,
    {
        tracing::trace!(username = %principal.username, "encoding token");

        if principal.username.trim().is_empty() {
            return Err(TokenError::MissingUsername);
        }

        let user =
            serde_json::to_value(profile).map_err(|e| TokenError::Encoding(e.to_string()))?;

        let claims = Claims {
            sub: principal.username.clone(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + self.lifetime).timestamp(),
            scopes: principal.authorities.iter().cloned().collect(),
            user,
        };

        encode(&Header::new(ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    /// Encode a token for a principal verified by the credential check.
    ///
    /// Unlike [`Self::encode`] this refuses principals without authorities.
    ///
    /// # Errors
    ///
    /// Returns error if the username or authorities are missing.
    pub fn encode_verified<P>(
        &self,
        profile: &P,
        principal: &Principal,
    ) -> Result<String, TokenError>
    where
        P: Serialize + ?Sized,
    {
        self.encode_verified_at(profile, principal, Utc::now())
    }

    /// [`Self::encode_verified`] with an explicit issue time.
    ///
    /// # Errors
    ///
    /// Returns error if the username or authorities are missing.
    pub fn encode_verified_at<P>(
        &self,
        profile: &P,
        principal: &Principal,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError>
    where
        P: Serialize + ?Sized,
    {
        if principal.username.trim().is_empty() {
            return Err(TokenError::MissingUsername);
        }
        if principal.authorities.is_empty() {
            return Err(TokenError::MissingAuthorities);
        }
        self.encode_at(profile, principal, now)
    }

    /// Decode and validate a token into a principal.
    ///
    /// # Errors
    ///
    /// Returns `ExpiredOrMalformed` or `Invalid`, see [`Self::decode_claims_at`].
    pub fn decode(&self, token: &str) -> Result<Principal, TokenError> {
        self.decode_at(token, Utc::now())
    }

    /// Decode a token as of `now`.
    ///
    /// # Errors
    ///
    /// Returns `ExpiredOrMalformed` or `Invalid`, see [`Self::decode_claims_at`].
    pub fn decode_at(&self, token: &str, now: DateTime<Utc>) -> Result<Principal, TokenError> {
        let claims = self.decode_claims_at(token, now)?;
        let principal = Principal::new(claims.sub, claims.scopes);
        tracing::debug!(username = %principal.username, "decoded token");
        Ok(principal)
    }

    /// Validate a token as of `now` and return its raw claims.
    ///
    /// Checks run in order: structure, issuer, signature, expiry.
    ///
    /// # Errors
    ///
    /// - `ExpiredOrMalformed` if the token cannot be parsed or `now` is past `exp`.
    /// - `Invalid` if the issuer, algorithm or signature does not match.
    pub fn decode_claims_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        tracing::trace!("decoding token");

        // Header and payload are parsed on their own so a damaged signature
        // segment surfaces from the signature pass instead.
        let mut segments = token.splitn(3, '.');
        let (Some(header), Some(payload), Some(_)) =
            (segments.next(), segments.next(), segments.next())
        else {
            return Err(TokenError::ExpiredOrMalformed("expected three segments".to_string()));
        };

        let unsigned = format!("{header}.{payload}.");
        let unverified = decode::<Claims>(&unsigned, &self.decoding_key, &self.structure)
            .map_err(|e| TokenError::ExpiredOrMalformed(e.to_string()))?
            .claims;

        if unverified.iss != self.issuer {
            tracing::trace!(issuer = %unverified.iss, "token issuer mismatch");
            return Err(TokenError::Invalid("unexpected issuer".to_string()));
        }

        let claims = decode::<Claims>(token, &self.decoding_key, &self.signature)
            .map_err(|e| classify(e.kind()))?
            .claims;

        if now.timestamp() > claims.exp {
            tracing::trace!(exp = claims.exp, "token expired");
            return Err(TokenError::ExpiredOrMalformed("token expired".to_string()));
        }

        if claims.sub.is_empty() {
            return Err(TokenError::ExpiredOrMalformed("token has no subject".to_string()));
        }

        Ok(claims)
    }

    /// Extract token from Authorization header.
    ///
    /// Expects format: "Bearer <token>"
    #[must_use]
    pub fn extract_from_header(header: &str) -> Option<&str> {
        header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

fn classify(kind: &ErrorKind) -> TokenError {
    match kind {
        ErrorKind::InvalidSignature => TokenError::Invalid("signature mismatch".to_string()),
        ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
            TokenError::Invalid("unexpected algorithm".to_string())
        }
        ErrorKind::InvalidIssuer => TokenError::Invalid("unexpected issuer".to_string()),
        ErrorKind::ExpiredSignature => TokenError::ExpiredOrMalformed("token expired".to_string()),
        // Header and payload already parsed, so anything left is the signature
        other => TokenError::Invalid(format!("{other:?}")),
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("issuer", &self.issuer)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use authgate_core::UserProfile;
    use std::collections::BTreeSet;

    const KEY: &[u8] = b"test-signing-key-with-enough-bytes-for-hs512";

    fn codec_with(key: &[u8], issuer: &str) -> TokenCodec {
        TokenCodec::new(&TokenSettings::new(key.to_vec(), issuer, 60).unwrap())
    }

    fn codec() -> TokenCodec {
        codec_with(KEY, "authgate-test")
    }

    fn alice() -> Principal {
        Principal::new("alice", ["ROLE_USER", "ROLE_ADMIN"])
    }

    fn flip_signature(token: &str) -> String {
        let (message, signature) = token.rsplit_once('.').unwrap();
        let mut chars: Vec<char> = signature.chars().collect();
        chars[0] = if chars[0] == 'A' { 'B' } else { 'A' };
        format!("{message}.{}", chars.into_iter().collect::<String>())
    }

    #[test]
    fn test_round_trip() {
        let codec = codec();
        let token = codec.encode_verified(&None::<UserProfile>, &alice()).unwrap();

        assert_eq!(token.split('.').count(), 3);

        let principal = codec.decode(&token).unwrap();
        assert_eq!(principal.username, "alice");
        assert_eq!(
            principal.authorities,
            BTreeSet::from(["ROLE_USER".to_string(), "ROLE_ADMIN".to_string()])
        );
        assert!(principal.profile.is_none());
    }

    #[test]
    fn test_claims_layout() {
        let codec = codec();
        let now = Utc::now();
        let profile = UserProfile::new("alice");
        let token = codec.encode_at(&profile, &alice(), now).unwrap();

        let claims = codec.decode_claims_at(&token, now).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.iss, "authgate-test");
        assert_eq!(claims.iat, now.timestamp());
        assert_eq!(claims.exp, now.timestamp() + 3600);
        assert_eq!(claims.user, serde_json::to_value(&profile).unwrap());

        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::HS512);
    }

    #[test]
    fn test_different_instants_differ() {
        let codec = codec();
        let now = Utc::now();
        let first = codec.encode_at(&(), &alice(), now).unwrap();
        let second = codec
            .encode_at(&(), &alice(), now + Duration::seconds(1))
            .unwrap();
        let again = codec.encode_at(&(), &alice(), now).unwrap();

        assert_ne!(first, second);
        assert_eq!(first, again);
    }

    #[test]
    fn test_expiry_boundary() {
        let codec = codec();
        let issued = Utc::now();
        let token = codec.encode_at(&(), &alice(), issued).unwrap();

        let last_valid = issued + Duration::minutes(60);
        assert!(codec.decode_at(&token, last_valid).is_ok());

        let err = codec
            .decode_at(&token, last_valid + Duration::seconds(1))
            .unwrap_err();
        assert!(matches!(err, TokenError::ExpiredOrMalformed(_)));
    }

    #[test]
    fn test_tampered_signature_is_invalid() {
        let codec = codec();
        let token = codec.encode(&(), &alice()).unwrap();

        let err = codec.decode(&flip_signature(&token)).unwrap_err();
        assert!(matches!(err, TokenError::Invalid(_)));
    }

    #[test]
    fn test_tampered_expired_token_is_invalid_not_expired() {
        let codec = codec();
        let issued = Utc::now() - Duration::days(2);
        let token = codec.encode_at(&(), &alice(), issued).unwrap();

        let err = codec.decode(&flip_signature(&token)).unwrap_err();
        assert!(matches!(err, TokenError::Invalid(_)));

        // Untampered it is merely expired
        let err = codec.decode(&token).unwrap_err();
        assert!(matches!(err, TokenError::ExpiredOrMalformed(_)));
    }

    #[test]
    fn test_any_signature_substitution_is_invalid() {
        let codec = codec();
        let issued = Utc::now() - Duration::days(2);
        let token = codec.encode_at(&(), &alice(), issued).unwrap();
        let (message, signature) = token.rsplit_once('.').unwrap();

        for replacement in (0x21u8..0x7f).map(char::from) {
            let mut chars: Vec<char> = signature.chars().collect();
            if chars[0] == replacement {
                continue;
            }
            chars[0] = replacement;
            let tampered = format!("{message}.{}", chars.into_iter().collect::<String>());

            let err = codec.decode(&tampered).unwrap_err();
            assert!(
                matches!(err, TokenError::Invalid(_)),
                "{replacement:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_extra_segment_is_invalid() {
        let codec = codec();
        let token = codec.encode(&(), &alice()).unwrap();

        let err = codec.decode(&format!("{token}.extra")).unwrap_err();
        assert!(matches!(err, TokenError::Invalid(_)));
    }

    #[test]
    fn test_issuer_mismatch() {
        let foreign = codec_with(KEY, "someone-else");
        let token = foreign.encode(&(), &alice()).unwrap();

        let err = codec().decode(&token).unwrap_err();
        assert!(matches!(err, TokenError::Invalid(_)));
    }

    #[test]
    fn test_wrong_key() {
        let other = codec_with(b"a-completely-different-signing-key", "authgate-test");
        let token = other.encode(&(), &alice()).unwrap();

        let err = codec().decode(&token).unwrap_err();
        assert!(matches!(err, TokenError::Invalid(_)));
    }

    #[test]
    fn test_other_algorithm_rejected() {
        let now = Utc::now();
        let claims = Claims {
            sub: "alice".to_string(),
            iss: "authgate-test".to_string(),
            iat: now.timestamp(),
            exp: now.timestamp() + 60,
            scopes: vec!["ROLE_USER".to_string()],
            user: serde_json::Value::Null,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(KEY),
        )
        .unwrap();

        let err = codec().decode(&token).unwrap_err();
        assert!(matches!(err, TokenError::Invalid(_)));
    }

    #[test]
    fn test_malformed_tokens() {
        let codec = codec();
        for token in ["", "invalid.token.here", "only-one-segment", "a.b"] {
            let err = codec.decode(token).unwrap_err();
            assert!(
                matches!(err, TokenError::ExpiredOrMalformed(_)),
                "{token:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_missing_username() {
        let codec = codec();
        let principal = Principal::new("", ["ROLE_USER"]);

        assert_eq!(
            codec.encode(&(), &principal).unwrap_err(),
            TokenError::MissingUsername
        );
        assert_eq!(
            codec.encode_verified(&(), &principal).unwrap_err(),
            TokenError::MissingUsername
        );
    }

    #[test]
    fn test_missing_authorities() {
        let codec = codec();
        let principal = Principal::new("alice", Vec::<String>::new());

        assert_eq!(
            codec.encode_verified(&(), &principal).unwrap_err(),
            TokenError::MissingAuthorities
        );

        // The plain variant does not require authorities
        let token = codec.encode(&(), &principal).unwrap();
        assert!(codec.decode(&token).unwrap().authorities.is_empty());
    }

    #[test]
    fn test_extract_from_header() {
        assert_eq!(
            TokenCodec::extract_from_header("Bearer abc123"),
            Some("abc123")
        );
        assert_eq!(
            TokenCodec::extract_from_header("bearer abc123"),
            Some("abc123")
        );
        assert_eq!(TokenCodec::extract_from_header("Bearer  "), None);
        assert_eq!(TokenCodec::extract_from_header("abc123"), None);
    }

    #[test]
    fn test_debug_hides_keys() {
        let debug = format!("{:?}", codec());
        assert!(debug.contains("authgate-test"));
        assert!(!debug.contains("test-signing-key"));
    }
}
