//! Entity declarations: the `Table` trait, per-row base columns, field discovery and the row codec.

mod codec;
mod layout;

use std::sync::{Arc, OnceLock};

use serde_json::{Map, Value};

use crate::case::to_sql_friendly;
use crate::column::{Column, ColumnFlags, ScalarField};
use crate::error::{ConfigError, EngineError};
use crate::relation::{LoadMode, OneToManyField, OneToOneField, Relation, RelationMany};
use crate::routes::RouteTable;
use crate::security::{Authentication, Permission, PermissionLevel};
use crate::types::{ColumnValue, SqlType};

pub(crate) use layout::assign_names;
pub use layout::{ColumnInfo, ColumnShape, Layout};

/// Flat storage-side representation of a row.
pub type Record = Map<String, Value>;

/// Borrowed, type-erased view of one declared field.
pub enum Field<'a> {
    Scalar(&'a dyn ScalarField),
    OneToOne(&'a dyn OneToOneField),
    OneToMany(&'a dyn OneToManyField),
}

impl Field<'_> {
    pub fn column_name(&self) -> &str {
        match self {
            Field::Scalar(c) => c.column_name(),
            Field::OneToOne(r) => r.column_name(),
            Field::OneToMany(r) => r.column_name(),
        }
    }

    fn set_column_name(&self, name: &str) {
        match self {
            Field::Scalar(c) => c.set_column_name(name),
            Field::OneToOne(r) => r.set_column_name(name),
            Field::OneToMany(r) => r.set_column_name(name),
        }
    }
}

/// Mutable counterpart of [`Field`].
pub enum FieldMut<'a> {
    Scalar(&'a mut dyn ScalarField),
    OneToOne(&'a mut dyn OneToOneField),
    OneToMany(&'a mut dyn OneToManyField),
}

/// Implemented by every kind of field a table may declare.
pub trait AsField {
    fn as_field(&self) -> Field<'_>;

    fn as_field_mut(&mut self) -> FieldMut<'_>;
}

impl<V: ColumnValue> AsField for Column<V> {
    fn as_field(&self) -> Field<'_> {
        Field::Scalar(self)
    }

    fn as_field_mut(&mut self) -> FieldMut<'_> {
        FieldMut::Scalar(self)
    }
}

impl<T: Table> AsField for Relation<T> {
    fn as_field(&self) -> Field<'_> {
        Field::OneToOne(self)
    }

    fn as_field_mut(&mut self) -> FieldMut<'_> {
        FieldMut::OneToOne(self)
    }
}

impl<T: Table> AsField for RelationMany<T> {
    fn as_field(&self) -> Field<'_> {
        Field::OneToMany(self)
    }

    fn as_field_mut(&mut self) -> FieldMut<'_> {
        FieldMut::OneToMany(self)
    }
}

/// Generates the field accessors of a [`Table`] impl.
///
/// The first identifier is the struct's [`TableBase`] field; the rest are the declared
/// columns and relations, in declaration order.
///
/// ```ignore
/// impl Table for Post {
///     const NAME: &'static str = "Post";
///     fn new() -> Self { /* ... */ }
///     table_fields!(base; title, author, views);
/// }
/// ```
#[macro_export]
macro_rules! table_fields {
    ($base:ident $(; $($field:ident),* $(,)?)?) => {
        fn base(&self) -> &$crate::table::TableBase {
            &self.$base
        }

        fn base_mut(&mut self) -> &mut $crate::table::TableBase {
            &mut self.$base
        }

        fn fields(&self) -> ::std::vec::Vec<(&'static str, $crate::table::Field<'_>)> {
            ::std::vec![$($((stringify!($field), $crate::table::AsField::as_field(&self.$field))),*)?]
        }

        fn fields_mut(
            &mut self,
        ) -> (
            &mut $crate::table::TableBase,
            ::std::vec::Vec<(&'static str, $crate::table::FieldMut<'_>)>,
        ) {
            (
                &mut self.$base,
                ::std::vec![$($((stringify!($field), $crate::table::AsField::as_field_mut(&mut self.$field))),*)?],
            )
        }
    };
}

/// Default access levels stamped on the permission row at insert.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Levels {
    pub read: PermissionLevel,
    pub write: PermissionLevel,
    pub delete: PermissionLevel,
}

impl Levels {
    pub fn new(read: PermissionLevel, write: PermissionLevel, delete: PermissionLevel) -> Self {
        Levels { read, write, delete }
    }

    pub fn uniform(level: PermissionLevel) -> Self {
        Levels::new(level, level, level)
    }
}

/// Level overrides for a single insert; unset entries fall back to the table defaults.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LevelOverrides {
    pub read: Option<PermissionLevel>,
    pub write: Option<PermissionLevel>,
    pub delete: Option<PermissionLevel>,
}

impl LevelOverrides {
    pub fn apply(self, defaults: Levels) -> Levels {
        Levels {
            read: self.read.unwrap_or(defaults.read),
            write: self.write.unwrap_or(defaults.write),
            delete: self.delete.unwrap_or(defaults.delete),
        }
    }
}

/// Columns every row carries: the primary key and the permission link.
#[derive(Clone, Debug)]
pub struct TableBase {
    primary_key: Column<i64>,
    permission: Option<Relation<Permission>>,
    levels: Levels,
    layout: OnceLock<Arc<Layout>>,
}

impl TableBase {
    /// Base for a table declared as `type_name`, with USER defaults.
    pub fn new(type_name: &str) -> Self {
        Self::with_levels(type_name, Levels::default())
    }

    pub fn with_levels(type_name: &str, levels: Levels) -> Self {
        let table = to_sql_friendly(type_name);
        let primary_key = Column::named(
            SqlType::BIGINT,
            ColumnFlags::AUTO_INCREMENT | ColumnFlags::READONLY,
            &format!("{}_id", table),
        );
        // Loaded by permission checks only, never nested into client output.
        let permission =
            (table != "permission").then(|| Relation::with_mode(ColumnFlags::READONLY, LoadMode::Lazy));
        TableBase {
            primary_key,
            permission,
            levels,
            layout: OnceLock::new(),
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.primary_key.value().copied()
    }

    pub fn primary_key(&self) -> &Column<i64> {
        &self.primary_key
    }

    pub(crate) fn set_id(&mut self, id: i64) {
        self.primary_key.set(id);
    }

    pub fn permission(&self) -> Option<&Relation<Permission>> {
        self.permission.as_ref()
    }

    pub(crate) fn permission_mut(&mut self) -> Option<&mut Relation<Permission>> {
        self.permission.as_mut()
    }

    pub fn levels(&self) -> Levels {
        self.levels
    }

    fn fields(&self) -> Vec<Field<'_>> {
        let mut out = vec![self.primary_key.as_field()];
        if let Some(permission) = &self.permission {
            out.push(permission.as_field());
        }
        out
    }

    fn fields_mut(&mut self) -> Vec<FieldMut<'_>> {
        let mut out = vec![self.primary_key.as_field_mut()];
        if let Some(permission) = &mut self.permission {
            out.push(permission.as_field_mut());
        }
        out
    }
}

/// A failed row validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Diagnostic {
    CannotBeNull(String),
    WrongType { sql_type: String, column: String },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::CannotBeNull(column) => write!(f, "Column '{}' cannot be null", column),
            Diagnostic::WrongType { sql_type, column } => {
                write!(f, "Wrong type '{}' on column '{}'", sql_type, column)
            }
        }
    }
}

/// An entity type. Implementors hold a [`TableBase`] plus declared fields and use
/// [`table_fields!`](crate::table_fields) for the accessors.
pub trait Table: Clone + Send + Sync + 'static {
    /// Declared type identifier; the table name is derived from it.
    const NAME: &'static str;

    fn new() -> Self;

    fn base(&self) -> &TableBase;

    fn base_mut(&mut self) -> &mut TableBase;

    /// Declared fields in declaration order, keyed by identifier.
    fn fields(&self) -> Vec<(&'static str, Field<'_>)>;

    fn fields_mut(&mut self) -> (&mut TableBase, Vec<(&'static str, FieldMut<'_>)>);

    fn table_name() -> String {
        to_sql_friendly(Self::NAME)
    }

    /// Whether `principal` may create rows of this table.
    fn check_create_permission(principal: Option<&Authentication>) -> bool {
        principal.is_some_and(Authentication::can_write)
    }

    /// Adjusts the route table once, at registration.
    fn configure_routes(_routes: &mut RouteTable) {}

    fn id(&self) -> Option<i64> {
        self.base().id()
    }

    /// Ordered column layout, discovered on first call and cached on this instance.
    fn columns(&self) -> Result<Arc<Layout>, ConfigError> {
        layout::discover(self)
    }

    fn validate(&self) -> Result<Vec<Diagnostic>, ConfigError> {
        codec::validate(self)
    }

    /// Imports wire values into columns. Absent keys are left untouched.
    fn serialize(&mut self, data: &Map<String, Value>) -> Result<(), EngineError> {
        codec::import(self, data, codec::Scope::All)
    }

    /// Like `serialize`, skipping read-only and auto-increment columns.
    fn merge_input(&mut self, data: &Map<String, Value>) -> Result<(), EngineError> {
        codec::import(self, data, codec::Scope::Writable)
    }

    /// Client-facing map: public columns, nested resolved relations.
    fn deserialize(&self) -> Result<Map<String, Value>, EngineError> {
        codec::export(self, codec::Audience::Client)
    }

    /// Storage-side map: every stored column, relation keys only.
    fn to_record(&self) -> Result<Record, EngineError> {
        codec::export(self, codec::Audience::Storage)
    }

    fn from_record(&mut self, record: &Record) -> Result<(), EngineError> {
        codec::import(self, record, codec::Scope::Storage)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::column::KeyColumn;

    #[derive(Clone, Debug)]
    pub struct Author {
        pub base: TableBase,
        pub name: Column<String>,
        pub posts: RelationMany<Post>,
    }

    fn post_author(post: &Post) -> &dyn KeyColumn {
        &post.author
    }

    impl Table for Author {
        const NAME: &'static str = "Author";

        fn new() -> Self {
            Author {
                base: TableBase::new(Self::NAME),
                name: Column::new(SqlType::varchar(40), ColumnFlags::NONE),
                posts: RelationMany::new(post_author),
            }
        }

        table_fields!(base; name, posts);
    }

    #[derive(Clone, Debug)]
    pub struct BlogPost {
        pub base: TableBase,
        pub title: Column<String>,
        pub views: Column<i32>,
        pub editor: Relation<Author>,
    }

    impl Table for BlogPost {
        const NAME: &'static str = "BlogPost";

        fn new() -> Self {
            BlogPost {
                base: TableBase::new(Self::NAME),
                title: Column::new(SqlType::varchar(10), ColumnFlags::NONE),
                views: Column::new(SqlType::INT, ColumnFlags::NULLABLE),
                editor: Relation::with_mode(ColumnFlags::NULLABLE, LoadMode::Lazy),
            }
        }

        table_fields!(base; title, views, editor);
    }

    #[derive(Clone, Debug)]
    pub struct Post {
        pub base: TableBase,
        pub title: Column<String>,
        pub secret: Column<String>,
        pub author: Relation<Author>,
    }

    impl Table for Post {
        const NAME: &'static str = "Post";

        fn new() -> Self {
            Post {
                base: TableBase::new(Self::NAME),
                title: Column::new(SqlType::varchar(10), ColumnFlags::NONE),
                secret: Column::new(SqlType::TEXT, ColumnFlags::PRIVATE | ColumnFlags::NULLABLE),
                author: Relation::new(ColumnFlags::NONE),
            }
        }

        table_fields!(base; title, secret, author);
    }
}
