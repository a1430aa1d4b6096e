//! Write-time row validation according to the configured policy.

use crate::config::ValidationPolicy;
use crate::error::EngineError;
use crate::registry::TableMeta;
use crate::table::Table;

pub struct RowValidator;

impl RowValidator {
    /// Rejects `row` with every diagnostic when the policy validates on write.
    pub fn check<T: Table>(policy: ValidationPolicy, table: &TableMeta, row: &T) -> Result<(), EngineError> {
        if policy == ValidationPolicy::OptIn {
            return Ok(());
        }
        Self::validate(table, row)
    }

    /// Validates regardless of policy.
    pub fn validate<T: Table>(table: &TableMeta, row: &T) -> Result<(), EngineError> {
        let diagnostics = row.validate()?;
        if diagnostics.is_empty() {
            return Ok(());
        }
        Err(EngineError::Invalid {
            table: table.full_name.clone(),
            diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::fixtures::Post;

    #[test]
    fn opt_in_never_rejects() {
        let meta = TableMeta::of::<Post>(None).unwrap();
        assert!(RowValidator::check(ValidationPolicy::OptIn, &meta, &Post::new()).is_ok());
    }

    #[test]
    fn on_write_reports_diagnostics() {
        let meta = TableMeta::of::<Post>(None).unwrap();
        let err = RowValidator::check(ValidationPolicy::OnWrite, &meta, &Post::new()).unwrap_err();
        match err {
            EngineError::Invalid { table, diagnostics } => {
                assert_eq!(table, "post");
                assert_eq!(
                    diagnostics.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    vec!["Column 'title' cannot be null", "Column 'author_id' cannot be null"]
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn valid_row_passes() {
        let meta = TableMeta::of::<Post>(None).unwrap();
        let mut post = Post::new();
        post.title.set("hello".into());
        post.author.set_key(Some(1)).unwrap();
        assert!(RowValidator::check(ValidationPolicy::OnWrite, &meta, &post).is_ok());
    }
}
