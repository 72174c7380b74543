//! Typed identifiers for EAA objects (`app://uuid`, `con://uuid`, ...).
//!
//! Every object manipulated by the CLI is designated by a moniker made of a
//! scheme naming the object kind and the object UUID as assigned by the EAA
//! backend. Monikers are immutable; equality and hashing follow the string
//! form.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const SEPARATOR: &str = "://";

/// Kind of EAA object a moniker points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Connector,
    Application,
    /// Association between an application and a directory group.
    ApplicationGroup,
    Group,
    User,
    Directory,
    Certificate,
    IdentityProvider,
}

impl ObjectType {
    pub const ALL: [ObjectType; 8] = [
        ObjectType::Connector,
        ObjectType::Application,
        ObjectType::ApplicationGroup,
        ObjectType::Group,
        ObjectType::User,
        ObjectType::Directory,
        ObjectType::Certificate,
        ObjectType::IdentityProvider,
    ];

    /// Scheme string without the `://` separator.
    pub fn scheme(&self) -> &'static str {
        match self {
            ObjectType::Connector => "con",
            ObjectType::Application => "app",
            ObjectType::ApplicationGroup => "appgrp",
            ObjectType::Group => "group",
            ObjectType::User => "user",
            ObjectType::Directory => "dir",
            ObjectType::Certificate => "crt",
            ObjectType::IdentityProvider => "idp",
        }
    }

    /// Full prefix, e.g. `app://`.
    pub fn prefix(&self) -> String {
        format!("{}{}", self.scheme(), SEPARATOR)
    }

    pub fn from_scheme(scheme: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.scheme() == scheme)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// Raised when a string is not a well-formed EAA moniker.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid EAA object identifier {0:?} (expected <scheme>://<uuid> with scheme one of app, appgrp, con, crt, dir, group, idp, user)")]
pub struct InvalidMoniker(pub String);

/// An EAA object moniker, `scheme://uuid`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EaaItem {
    objtype: ObjectType,
    uuid: String,
}

impl EaaItem {
    pub fn new(objtype: ObjectType, uuid: impl Into<String>) -> Self {
        EaaItem {
            objtype,
            uuid: uuid.into(),
        }
    }

    pub fn objtype(&self) -> ObjectType {
        self.objtype
    }

    /// Raw UUID, without the scheme prefix.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Parse a moniker and require a specific object type.
    pub fn parse_typed(s: &str, expected: ObjectType) -> Result<Self, InvalidMoniker> {
        let item: EaaItem = s.parse()?;
        if item.objtype != expected {
            return Err(InvalidMoniker(s.to_string()));
        }
        Ok(item)
    }
}

impl FromStr for EaaItem {
    type Err = InvalidMoniker;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, uuid) = s
            .split_once(SEPARATOR)
            .ok_or_else(|| InvalidMoniker(s.to_string()))?;
        let objtype =
            ObjectType::from_scheme(scheme).ok_or_else(|| InvalidMoniker(s.to_string()))?;
        if uuid.is_empty() {
            return Err(InvalidMoniker(s.to_string()));
        }
        Ok(EaaItem {
            objtype,
            uuid: uuid.to_string(),
        })
    }
}

impl fmt::Display for EaaItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.objtype.scheme(), SEPARATOR, self.uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_application_moniker() {
        let item: EaaItem = "app://mD_Pw1XASpyVJc2JwgICTg".parse().unwrap();
        assert_eq!(item.objtype(), ObjectType::Application);
        assert_eq!(item.uuid(), "mD_Pw1XASpyVJc2JwgICTg");
    }

    #[test]
    fn display_round_trips() {
        for raw in [
            "app://abc",
            "con://123456",
            "appgrp://x-y_z",
            "group://G1",
            "user://u",
            "dir://d",
            "crt://c",
            "idp://i",
        ] {
            let item: EaaItem = raw.parse().unwrap();
            assert_eq!(item.to_string(), raw);
        }
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!("foo://abc".parse::<EaaItem>().is_err());
    }

    #[test]
    fn rejects_missing_separator() {
        assert!("app:abc".parse::<EaaItem>().is_err());
        assert!("justaname".parse::<EaaItem>().is_err());
    }

    #[test]
    fn rejects_empty_uuid() {
        assert!("app://".parse::<EaaItem>().is_err());
    }

    #[test]
    fn equality_follows_string_form() {
        let a: EaaItem = "con://X".parse().unwrap();
        let b = EaaItem::new(ObjectType::Connector, "X");
        assert_eq!(a, b);
    }

    #[test]
    fn typed_parse_enforces_kind() {
        assert!(EaaItem::parse_typed("con://abc", ObjectType::Connector).is_ok());
        assert!(EaaItem::parse_typed("app://abc", ObjectType::Connector).is_err());
    }
}
