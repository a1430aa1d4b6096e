//! Row validation and conversion between rows and wire/storage maps.

use serde_json::{Map, Value};

use super::{Diagnostic, Field, FieldMut, Table};
use crate::error::{ConfigError, EngineError, FieldError, ImportError};
use crate::relation::LoadMode;
use crate::types::{Datum, SqlType};

#[derive(Clone, Copy, PartialEq, Eq)]
pub(super) enum Scope {
    /// Client input over every column.
    All,
    /// Client input, protected columns skipped.
    Writable,
    /// Rows read back from the bridge. Stored nulls are kept as is; `validate` reports them.
    Storage,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub(super) enum Audience {
    Client,
    Storage,
}

pub(super) fn validate<T: Table>(row: &T) -> Result<Vec<Diagnostic>, ConfigError> {
    row.columns()?;
    let mut diagnostics = Vec::new();
    for (_, field) in row.fields() {
        match field {
            Field::Scalar(c) => match c.datum() {
                None if !c.flags().is_nullable() => {
                    diagnostics.push(Diagnostic::CannotBeNull(c.column_name().to_string()));
                }
                None => {}
                Some(datum) => {
                    if !c.sql_type().validate(&datum) {
                        diagnostics.push(Diagnostic::WrongType {
                            sql_type: c.sql_type().to_string(),
                            column: c.column_name().to_string(),
                        });
                    }
                }
            },
            Field::OneToOne(r) => {
                if r.key().is_none() && !r.flags().is_nullable() {
                    diagnostics.push(Diagnostic::CannotBeNull(r.column_name().to_string()));
                }
            }
            Field::OneToMany(_) => {}
        }
    }
    Ok(diagnostics)
}

fn null_error(column: &str) -> FieldError {
    FieldError {
        column: column.to_string(),
        error: ImportError::Null(column.to_string()),
    }
}

pub(super) fn import<T: Table>(row: &mut T, data: &Map<String, Value>, scope: Scope) -> Result<(), EngineError> {
    row.columns()?;
    let mut errors = Vec::new();
    let (base, declared) = row.fields_mut();
    let fields = base
        .fields_mut()
        .into_iter()
        .chain(declared.into_iter().map(|(_, f)| f));

    for field in fields {
        match field {
            FieldMut::Scalar(c) => {
                if scope == Scope::Writable && c.flags().is_protected() {
                    continue;
                }
                let Some(wire) = data.get(c.column_name()) else {
                    continue;
                };
                let name = c.column_name().to_string();
                let imported = c.sql_type().import(wire);
                match imported {
                    Ok(None) if scope != Scope::Storage && !c.flags().is_nullable() => {
                        errors.push(null_error(&name))
                    }
                    Ok(datum) => {
                        if c.set_datum(datum).is_err() {
                            errors.push(FieldError {
                                error: ImportError::OutOfRange {
                                    value: wire.to_string(),
                                    sql_type: c.sql_type().to_string(),
                                },
                                column: name,
                            });
                        }
                    }
                    Err(error) => errors.push(FieldError { column: name, error }),
                }
            }
            FieldMut::OneToOne(r) => {
                if scope == Scope::Writable && r.flags().is_protected() {
                    continue;
                }
                let Some(wire) = data.get(r.column_name()) else {
                    continue;
                };
                let name = r.column_name().to_string();
                match SqlType::BIGINT.import(wire) {
                    Ok(Some(Datum::Int(key))) => {
                        if r.set_key(Some(key)).is_err() {
                            errors.push(null_error(&name));
                        }
                    }
                    Ok(_) if scope == Scope::Storage => r.clear_key(),
                    Ok(_) => {
                        if r.set_key(None).is_err() {
                            errors.push(null_error(&name));
                        }
                    }
                    Err(error) => errors.push(FieldError { column: name, error }),
                }
            }
            FieldMut::OneToMany(_) => {}
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(EngineError::Import {
            table: T::table_name(),
            errors,
        })
    }
}

pub(super) fn export<T: Table>(row: &T, audience: Audience) -> Result<Map<String, Value>, EngineError> {
    row.columns()?;
    let client = audience == Audience::Client;
    let mut out = Map::new();
    let declared = row.fields();
    let base = row.base().fields();

    for field in base.iter().chain(declared.iter().map(|(_, f)| f)) {
        match field {
            Field::Scalar(c) => {
                if client && c.flags().is_private() {
                    continue;
                }
                let value = c
                    .datum()
                    .and_then(|d| c.sql_type().export(&d))
                    .unwrap_or(Value::Null);
                out.insert(c.column_name().to_string(), value);
            }
            Field::OneToOne(r) => {
                if client && r.flags().is_private() {
                    continue;
                }
                out.insert(r.column_name().to_string(), r.key().map(Value::from).unwrap_or(Value::Null));
                if client && r.mode() == LoadMode::Direct {
                    if let Some(nested) = r.export_value()? {
                        out.insert(r.ref_name().to_string(), nested);
                    }
                }
            }
            Field::OneToMany(r) => {
                if client {
                    out.insert(r.column_name().to_string(), Value::Array(r.export_values()?));
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::super::fixtures::{Author, BlogPost, Post};
    use super::*;
    use crate::column::ColumnFlags;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    #[test]
    fn validate_accumulates_every_problem() {
        let mut post = BlogPost::new();
        post.title.set("far too long a title".into());
        let diagnostics = post.validate().unwrap();
        assert_eq!(diagnostics, vec![Diagnostic::WrongType {
            sql_type: "VARCHAR(10)".into(),
            column: "title".into(),
        }]);

        let fresh = Post::new();
        let messages: Vec<String> = fresh.validate().unwrap().iter().map(ToString::to_string).collect();
        assert_eq!(
            messages,
            vec!["Column 'title' cannot be null", "Column 'author_id' cannot be null"]
        );
    }

    #[test]
    fn serialize_leaves_absent_keys_and_clears_on_null() {
        let mut post = BlogPost::new();
        post.title.set("kept".into());
        post.views.set(3);
        post.serialize(&map(json!({ "views": null }))).unwrap();
        assert_eq!(post.title.value().map(String::as_str), Some("kept"));
        assert!(post.views.is_null());

        post.serialize(&map(json!({ "views": 12, "author_id": 4 }))).unwrap();
        assert_eq!(post.views.value(), Some(&12));
        assert_eq!(post.editor.key_value(), Some(4));
        assert!(post.editor.is_null());
    }

    #[test]
    fn serialize_reports_all_failures_together() {
        let mut post = BlogPost::new();
        let err = post
            .serialize(&map(json!({ "title": null, "views": "many", "author_id": "x" })))
            .unwrap_err();
        match err {
            EngineError::Import { table, errors } => {
                assert_eq!(table, "blog_post");
                let columns: Vec<&str> = errors.iter().map(|e| e.column.as_str()).collect();
                assert_eq!(columns, vec!["title", "views", "author_id"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn merge_input_skips_protected_columns() {
        let mut post = Post::new();
        post.merge_input(&map(json!({ "post_id": 99, "permission_id": 5, "title": "hi", "author_id": 2 })))
            .unwrap();
        assert_eq!(post.id(), None);
        assert_eq!(post.base.permission().and_then(|p| p.key_value()), None);
        assert_eq!(post.author.key_value(), Some(2));
        assert!(ColumnFlags::READONLY.is_protected());
    }

    #[test]
    fn deserialize_hides_private_columns_and_nests_direct_relations() {
        let mut author = Author::new();
        author.base.set_id(2);
        author.name.set("ada".into());

        let mut post = Post::new();
        post.base.set_id(7);
        post.title.set("hello".into());
        post.secret.set("hidden".into());
        post.author.set_value(author).unwrap();

        let out = Value::Object(post.deserialize().unwrap());
        assert_eq!(out["post_id"], json!(7));
        assert_eq!(out["author_id"], json!(2));
        assert_eq!(out["author"]["name"], json!("ada"));
        assert_eq!(out["author"]["posts"], json!([]));
        assert!(out.get("secret").is_none());
        assert!(out.get("permission").is_none());

        let record = post.to_record().unwrap();
        assert_eq!(record["secret"], json!("hidden"));
        assert!(record.get("author").is_none());
    }

    #[test]
    fn lazy_relation_exports_only_its_key() {
        let mut editor = Author::new();
        editor.base.set_id(5);
        editor.name.set("grace".into());
        let mut post = BlogPost::new();
        post.editor.set_value(editor).unwrap();

        let out = post.deserialize().unwrap();
        assert_eq!(out["author_id"], json!(5));
        assert!(out.get("author").is_none());
    }

    #[test]
    fn record_round_trip_restores_private_values() {
        let mut post = Post::new();
        post.base.set_id(1);
        post.title.set("t".into());
        post.secret.set("s".into());
        post.author.set_key(Some(3)).unwrap();
        let record = post.to_record().unwrap();

        let mut restored = Post::new();
        restored.from_record(&record).unwrap();
        assert_eq!(restored.id(), Some(1));
        assert_eq!(restored.secret.value().map(String::as_str), Some("s"));
        assert_eq!(restored.author.key_value(), Some(3));
        assert_eq!(restored.base.permission().and_then(|p| p.key_value()), None);
    }

    #[test]
    fn stored_nulls_load_into_required_columns() {
        let mut post = Post::new();
        post.base.set_id(4);
        let record = post.to_record().unwrap();
        assert_eq!(record["title"], Value::Null);
        assert_eq!(record["author_id"], Value::Null);

        let mut restored = Post::new();
        restored.author.set_key(Some(9)).unwrap();
        restored.from_record(&record).unwrap();
        assert_eq!(restored.id(), Some(4));
        assert!(restored.title.is_null());
        assert_eq!(restored.author.key_value(), None);
        let messages: Vec<String> = restored.validate().unwrap().iter().map(ToString::to_string).collect();
        assert_eq!(
            messages,
            vec!["Column 'title' cannot be null", "Column 'author_id' cannot be null"]
        );

        let err = Post::new().serialize(&map(json!({ "title": null }))).unwrap_err();
        assert!(matches!(err, EngineError::Import { .. }));
    }
}
