use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/*
 * What to do when a credential with the same logical name already lives
 * in the vault.
 */
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateStrategy {
    /* overwrite user, password and fields on the existing item */
    Edit,

    /* let a human (or an injected policy) decide */
    #[default]
    Ask,

    /* create a second item under the same name */
    Duplicate,

    /* leave the existing item untouched */
    NoAction,
}

impl fmt::Display for DuplicateStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	let name = match self {
	    DuplicateStrategy::Edit => "edit",
	    DuplicateStrategy::Ask => "ask",
	    DuplicateStrategy::Duplicate => "duplicate",
	    DuplicateStrategy::NoAction => "no_action",
	};
	f.write_str(name)
    }
}

impl FromStr for DuplicateStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
	match s {
	    "edit" => Ok(DuplicateStrategy::Edit),
	    "ask" => Ok(DuplicateStrategy::Ask),
	    "duplicate" => Ok(DuplicateStrategy::Duplicate),
	    "no_action" | "no-action" => Ok(DuplicateStrategy::NoAction),
	    other => Err(format!("unknown duplicate strategy '{}': valid values are edit, ask, duplicate, no_action", other)),
	}
    }
}

/* Lock state reported by the vault daemon */
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultStatus {
    Unauthenticated,
    Locked,
    Unlocked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomField {
    pub name: String,
    pub value: String,
}

impl CustomField {
    pub fn new(name: &str, value: &str) -> Self {
	Self{
	    name: name.to_string(),
	    value: value.to_string(),
	}
    }
}

/*
 * A named login held by the vault. Records outlive the cluster, which is
 * the whole reason the refresh branch exists.
 */
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CredentialRecord {

    // assigned by the vault on creation, empty before that
    pub id: String,

    pub name: String,

    // hostname the credential belongs to, used to tell apart apps that
    // share a name prefix
    pub item_url: Option<String>,

    pub user: String,

    pub password: String,

    pub custom_fields: Vec<CustomField>,

    pub org: Option<String>,

    pub collection: Option<String>,
}

impl CredentialRecord {

    pub fn field(&self, name: &str) -> Option<&str> {
	self.custom_fields.iter()
	    .find(|f| f.name == name)
	    .map(|f| f.value.as_str())
    }
}
