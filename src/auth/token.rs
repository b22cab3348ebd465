use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::appresult::ChatError;

use super::{Identity, Role};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub exp: u64,
}

impl Claims {
    fn identity(&self) -> Result<Identity, ChatError> {
        let role = match self.role.as_deref() {
            None | Some("patient") | Some("user") => Role::Patient,
            Some("practitioner") | Some("doctor") => Role::Practitioner,
            Some(other) => return Err(ChatError::UnknownRole(other.to_owned())),
        };
        Ok(Identity { id: self.id, role })
    }
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

/// Verifies HS256 bearer tokens issued by the login service.
#[derive(Clone)]
pub struct Authenticator {
    keys: Arc<Keys>,
}

impl Authenticator {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            keys: Arc::new(Keys {
                encoding: EncodingKey::from_secret(secret),
                decoding: DecodingKey::from_secret(secret),
                validation: Validation::new(Algorithm::HS256),
            }),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Identity, ChatError> {
        let keys = &self.keys;
        let data = jsonwebtoken::decode::<Claims>(token, &keys.decoding, &keys.validation)?;
        data.claims.identity()
    }

    /// Signs a token with the shared secret. Login owns issuance in production;
    /// this is for tooling and tests.
    pub fn issue(&self, claims: &Claims) -> Result<String, ChatError> {
        Ok(jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.keys.encoding)?)
    }
}
