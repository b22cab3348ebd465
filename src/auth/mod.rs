mod caller;
mod token;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use caller::Caller;
pub use token::{Authenticator, Claims};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Practitioner,
}

impl Role {
    pub fn counterpart(self) -> Role {
        match self {
            Role::Patient => Role::Practitioner,
            Role::Practitioner => Role::Patient,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Practitioner => "practitioner",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is on the other end of a request or connection. Fixed once the
/// credential has been verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Login identity id. For practitioners this is not the practitioner record id.
    pub id: i64,
    pub role: Role,
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}#{}", self.role, self.id)
    }
}
