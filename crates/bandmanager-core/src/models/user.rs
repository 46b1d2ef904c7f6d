use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(rename = "createdAt")]
    pub created_at: Option<NaiveDateTime>,
    #[serde(rename = "updatedAt")]
    pub updated_at: Option<NaiveDateTime>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }

    /// Permissions granted by the user's roles.
    pub fn role_permissions(&self) -> BTreeSet<Permission> {
        self.roles
            .iter()
            .flat_map(|role| role.permissions().iter().copied())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "ROLE_USER")]
    User,
    #[serde(rename = "ROLE_ADMIN")]
    Admin,
    #[serde(other)]
    Unknown,
}

impl Role {
    pub fn permissions(&self) -> &'static [Permission] {
        use Permission::*;
        match self {
            Role::User => &[
                EntityCreate,
                EntityRead,
                OwnEntityUpdate,
                OwnEntityDelete,
                OwnEntityBulkDelete,
                ImportEntity,
                ReadOwnImport,
            ],
            Role::Admin => &[
                AllEntityUpdate,
                AllEntityDelete,
                AllEntityBulkDelete,
                AllUserRead,
                AllUserUpdate,
                AllUserDelete,
                AllUserBulkDelete,
                ReadAllImport,
            ],
            Role::Unknown => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    EntityCreate,
    EntityRead,
    OwnEntityUpdate,
    AllEntityUpdate,
    OwnEntityDelete,
    AllEntityDelete,
    AllEntityBulkDelete,
    OwnEntityBulkDelete,
    AllUserRead,
    AllUserUpdate,
    AllUserDelete,
    AllUserBulkDelete,
    ImportEntity,
    ReadOwnImport,
    ReadAllImport,
}

impl Permission {
    pub const ALL: [Permission; 15] = [
        Permission::EntityCreate,
        Permission::EntityRead,
        Permission::OwnEntityUpdate,
        Permission::AllEntityUpdate,
        Permission::OwnEntityDelete,
        Permission::AllEntityDelete,
        Permission::AllEntityBulkDelete,
        Permission::OwnEntityBulkDelete,
        Permission::AllUserRead,
        Permission::AllUserUpdate,
        Permission::AllUserDelete,
        Permission::AllUserBulkDelete,
        Permission::ImportEntity,
        Permission::ReadOwnImport,
        Permission::ReadAllImport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::EntityCreate => "ENTITY_CREATE",
            Permission::EntityRead => "ENTITY_READ",
            Permission::OwnEntityUpdate => "OWN_ENTITY_UPDATE",
            Permission::AllEntityUpdate => "ALL_ENTITY_UPDATE",
            Permission::OwnEntityDelete => "OWN_ENTITY_DELETE",
            Permission::AllEntityDelete => "ALL_ENTITY_DELETE",
            Permission::AllEntityBulkDelete => "ALL_ENTITY_BULK_DELETE",
            Permission::OwnEntityBulkDelete => "OWN_ENTITY_BULK_DELETE",
            Permission::AllUserRead => "ALL_USER_READ",
            Permission::AllUserUpdate => "ALL_USER_UPDATE",
            Permission::AllUserDelete => "ALL_USER_DELETE",
            Permission::AllUserBulkDelete => "ALL_USER_BULK_DELETE",
            Permission::ImportEntity => "IMPORT_ENTITY",
            Permission::ReadOwnImport => "READ_OWN_IMPORT",
            Permission::ReadAllImport => "READ_ALL_IMPORT",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown permission: {}", s))
    }
}
