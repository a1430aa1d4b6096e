//! Row-level access control: permission records, principals and level evaluation.

use serde::{Deserialize, Serialize};

use crate::column::{Column, ColumnFlags};
use crate::routes::RouteTable;
use crate::table::{Levels, Table, TableBase};
use crate::table_fields;
use crate::types::{ColumnValue, Datum, SqlType};

/// Who may act on a row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    /// Only the owning principal.
    #[default]
    User = 0,
    /// Any authenticated principal.
    Auth = 1,
    /// Anyone, including anonymous callers.
    All = 2,
}

impl PermissionLevel {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(PermissionLevel::User),
            1 => Some(PermissionLevel::Auth),
            2 => Some(PermissionLevel::All),
            _ => None,
        }
    }
}

impl ColumnValue for PermissionLevel {
    const KIND: &'static str = "permission level";

    fn to_datum(&self) -> Datum {
        Datum::Int(*self as i64)
    }

    fn from_datum(datum: Datum) -> Option<Self> {
        match datum {
            Datum::Int(n) => PermissionLevel::from_code(n),
            _ => None,
        }
    }
}

/// Per-row access-control record. Created once per row at insert.
#[derive(Clone, Debug)]
pub struct Permission {
    base: TableBase,
    authentication: Column<i64>,
    read: Column<PermissionLevel>,
    write: Column<PermissionLevel>,
    delete: Column<PermissionLevel>,
}

impl Permission {
    /// Permission row owned by `owner` with the given levels.
    pub(crate) fn grant(owner: Option<i64>, levels: Levels) -> Self {
        let mut permission = Permission::new();
        permission.authentication.set_value(owner);
        permission.read.set(levels.read);
        permission.write.set(levels.write);
        permission.delete.set(levels.delete);
        permission
    }

    pub fn owner(&self) -> Option<i64> {
        self.authentication.value().copied()
    }

    pub fn read_level(&self) -> Option<PermissionLevel> {
        self.read.value().copied()
    }

    pub fn write_level(&self) -> Option<PermissionLevel> {
        self.write.value().copied()
    }

    pub fn delete_level(&self) -> Option<PermissionLevel> {
        self.delete.value().copied()
    }
}

impl Table for Permission {
    const NAME: &'static str = "Permission";

    fn new() -> Self {
        Permission {
            base: TableBase::new(Self::NAME),
            authentication: Column::named(SqlType::BIGINT, ColumnFlags::NULLABLE, "authentication_id"),
            read: Column::named(SqlType::TINYINT, ColumnFlags::READONLY, "read"),
            write: Column::named(SqlType::TINYINT, ColumnFlags::READONLY, "write"),
            delete: Column::named(SqlType::TINYINT, ColumnFlags::READONLY, "delete"),
        }
    }

    fn check_create_permission(_principal: Option<&Authentication>) -> bool {
        false
    }

    fn configure_routes(routes: &mut RouteTable) {
        routes.get_all = false;
        routes.get_single = false;
        routes.create = false;
        routes.update = false;
        routes.delete = false;
    }

    table_fields!(base; authentication, read, write, delete);
}

/// A principal. Credentials are verified outside this crate.
#[derive(Clone, Debug)]
pub struct Authentication {
    base: TableBase,
    pub username: Column<String>,
    pub email: Column<String>,
    pub password: Column<String>,
    pub deactivated: Column<bool>,
    pub can_read: Column<bool>,
    pub can_write: Column<bool>,
    pub can_delete: Column<bool>,
    pub superuser: Column<bool>,
}

/// Id of the root principal by convention.
pub const ROOT_ID: i64 = 1;

impl Authentication {
    /// Principal `id` holding every capability.
    pub fn principal(id: i64, username: &str) -> Self {
        let mut auth = Authentication::new();
        auth.base.set_id(id);
        auth.username.set(username.to_string());
        auth.email.set(username.to_string());
        auth.deactivated.set(false);
        auth.can_read.set(true);
        auth.can_write.set(true);
        auth.can_delete.set(true);
        auth.superuser.set(false);
        auth
    }

    /// The root principal; bypasses every row-level check.
    pub fn root() -> Self {
        let mut root = Authentication::principal(ROOT_ID, "root");
        root.superuser.set(true);
        root
    }

    pub fn with_capabilities(mut self, read: bool, write: bool, delete: bool) -> Self {
        self.can_read.set(read);
        self.can_write.set(write);
        self.can_delete.set(delete);
        self
    }

    pub fn is_superuser(&self) -> bool {
        self.superuser.value().copied().unwrap_or(false)
    }

    pub fn can_read(&self) -> bool {
        self.can_read.value().copied().unwrap_or(false)
    }

    pub fn can_write(&self) -> bool {
        self.can_write.value().copied().unwrap_or(false)
    }

    pub fn can_delete(&self) -> bool {
        self.can_delete.value().copied().unwrap_or(false)
    }
}

impl Table for Authentication {
    const NAME: &'static str = "Authentication";

    fn new() -> Self {
        Authentication {
            base: TableBase::new(Self::NAME),
            username: Column::new(SqlType::varchar(250), ColumnFlags::NONE),
            email: Column::new(SqlType::varchar(250), ColumnFlags::NONE),
            password: Column::new(SqlType::varchar(64), ColumnFlags::PRIVATE),
            deactivated: Column::new(SqlType::BOOL, ColumnFlags::PRIVATE),
            can_read: Column::named(SqlType::BOOL, ColumnFlags::PRIVATE, "read"),
            can_write: Column::named(SqlType::BOOL, ColumnFlags::PRIVATE, "write"),
            can_delete: Column::named(SqlType::BOOL, ColumnFlags::PRIVATE, "delete"),
            superuser: Column::new(SqlType::BOOL, ColumnFlags::PRIVATE | ColumnFlags::NULLABLE),
        }
    }

    fn configure_routes(routes: &mut RouteTable) {
        routes.create = false;
        routes.update = false;
        routes.delete = false;
    }

    table_fields!(base; username, email, password, deactivated, can_read, can_write, can_delete, superuser);
}

/// Whether `principal` satisfies `level` on a row owned by `owner`.
pub fn evaluate(level: PermissionLevel, owner: Option<i64>, principal: Option<&Authentication>) -> bool {
    match level {
        PermissionLevel::All => true,
        PermissionLevel::Auth => principal.is_some(),
        PermissionLevel::User => match (principal.and_then(Table::id), owner) {
            (Some(id), Some(owner)) => id == owner,
            _ => false,
        },
    }
}

/// Access kind checked against a row's permission record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    Delete,
}

impl Access {
    pub fn verb(self) -> &'static str {
        match self {
            Access::Read => "read",
            Access::Write => "update",
            Access::Delete => "delete",
        }
    }

    /// Capability flag on the principal.
    pub fn allowed_for(self, principal: &Authentication) -> bool {
        match self {
            Access::Read => principal.can_read(),
            Access::Write => principal.can_write(),
            Access::Delete => principal.can_delete(),
        }
    }

    pub fn level(self, permission: &Permission) -> Option<PermissionLevel> {
        match self {
            Access::Read => permission.read_level(),
            Access::Write => permission.write_level(),
            Access::Delete => permission.delete_level(),
        }
    }
}

/// Full permission decision for a non-root principal.
pub fn check(access: Access, permission: Option<&Permission>, principal: Option<&Authentication>) -> bool {
    if principal.is_some_and(|p| !access.allowed_for(p)) {
        return false;
    }
    let Some(permission) = permission else {
        return false;
    };
    match access.level(permission) {
        Some(level) => evaluate(level, permission.owner(), principal),
        None => false,
    }
}
