//! Data domains, operational record kinds, and accounting entity types.
//!
//! All three are small closed enumerations. Their string forms are stable
//! because they are persisted in session memory and used in cache keys.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A category of data a chat turn may need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Domain {
    /// Internal operational records (projects, clients, payments).
    Conversational,
    /// Records held by the rate-limited accounting service.
    ExternalAccounting,
    /// Off-topic turn: nothing to fetch.
    None,
}

/// An ordered set of domains. Ordered so that routing output and its
/// serialized form are deterministic.
pub type DomainSet = BTreeSet<Domain>;

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversational => "conversational",
            Self::ExternalAccounting => "external-accounting",
            Self::None => "none",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "conversational" => Ok(Self::Conversational),
            "external-accounting" => Ok(Self::ExternalAccounting),
            "none" => Ok(Self::None),
            other => Err(format!("unknown domain '{other}'")),
        }
    }
}

/// Record types served by the operational store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Projects,
    Clients,
    Payments,
}

impl RecordKind {
    /// Every kind, in the order the assembler loads and renders them.
    pub const ALL: [RecordKind; 3] = [Self::Projects, Self::Clients, Self::Payments];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Projects => "projects",
            Self::Clients => "clients",
            Self::Payments => "payments",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity types exposed by the accounting service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Customer,
    Invoice,
}

impl EntityType {
    pub const ALL: [EntityType; 2] = [Self::Customer, Self::Invoice];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Invoice => "invoice",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" | "customers" => Ok(Self::Customer),
            "invoice" | "invoices" => Ok(Self::Invoice),
            other => Err(format!("unknown entity type '{other}'")),
        }
    }
}
