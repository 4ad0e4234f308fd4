use crate::models::errors::StoreError;
use crate::storage::{SqlValue, UnitOfWork};

/// Upper bound on bound parameters in one SQLite statement.
pub const MAX_BIND_PARAMETERS: usize = 32_766;

/// Rows pending for one table while a block is being handled.
///
/// Nothing touches the database until [`BatchInsert::flush`], which issues multi-row
/// `INSERT`s sharing one placeholder template per row. Rows are split across as few
/// statements as [`MAX_BIND_PARAMETERS`] allows.
#[derive(Debug, Clone)]
pub struct BatchInsert {
    table: &'static str,
    columns: &'static [&'static str],
    rows: Vec<Vec<SqlValue>>,
}

impl BatchInsert {
    pub fn new(table: &'static str, columns: &'static [&'static str]) -> Self {
        Self {
            table,
            columns,
            rows: Vec::new(),
        }
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn push(&mut self, row: Vec<SqlValue>) {
        debug_assert_eq!(
            row.len(),
            self.columns.len(),
            "row width does not match columns of {}",
            self.table
        );
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn rows_per_statement(&self) -> usize {
        (MAX_BIND_PARAMETERS / self.columns.len().max(1)).max(1)
    }

    /// The statements and their flattened arguments. Empty when no rows are pending.
    pub fn statements(&self) -> Vec<(String, Vec<SqlValue>)> {
        let row_template = format!("({})", vec!["?"; self.columns.len()].join(","));

        self.rows
            .chunks(self.rows_per_statement())
            .map(|chunk| {
                let values_clause = vec![row_template.as_str(); chunk.len()].join(",");
                let sql = format!(
                    "INSERT INTO {} ({}) VALUES {}",
                    self.table,
                    self.columns.join(","),
                    values_clause
                );
                let args = chunk.iter().flatten().cloned().collect();
                (sql, args)
            })
            .collect()
    }

    /// Executes the pending rows and returns the number inserted. An empty batch
    /// executes nothing.
    pub async fn flush(self, tx: &mut dyn UnitOfWork) -> Result<u64, StoreError> {
        let mut inserted = 0;
        for (sql, args) in self.statements() {
            inserted += tx.exec(&sql, &args).await?;
        }
        Ok(inserted)
    }
}
