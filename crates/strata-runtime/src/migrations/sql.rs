//! Plain SQL migrations loaded from `.sql` files.

use std::borrow::Cow;
use std::path::Path;

use futures::future::BoxFuture;
use sqlx::Connection;
use strata_core::error::{Result, StrataError};
use strata_core::migration::Migration;
use tracing::debug;

use crate::db::PgPoolConnection;

/// A migration made of SQL text.
#[derive(Debug, Clone)]
pub struct SqlMigration {
    /// Unique name/identifier (e.g., "0001_create_users").
    pub name: String,
    /// SQL to execute.
    pub sql: String,
    /// Run all statements inside one transaction.
    pub transactional: bool,
}

impl SqlMigration {
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
            transactional: true,
        }
    }

    /// Execute statements one by one outside a transaction, as required by
    /// statements like `CREATE INDEX CONCURRENTLY`.
    pub fn without_transaction(mut self) -> Self {
        self.transactional = false;
        self
    }

    /// Executable statements, skipping empty and comment-only fragments.
    pub fn statements(&self) -> Vec<String> {
        split_sql_statements(&self.sql)
    }
}

impl Migration<PgPoolConnection> for SqlMigration {
    fn name(&self) -> Cow<'static, str> {
        Cow::Owned(self.name.clone())
    }

    fn prepare<'a>(&'a self, conn: &'a mut PgPoolConnection) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let statements = self.statements();
            debug!(migration = %self.name, statements = statements.len(), "Executing SQL migration");

            if !self.transactional {
                for statement in &statements {
                    sqlx::query(statement).execute(&mut **conn).await?;
                }
                return Ok(());
            }

            let mut tx = conn.begin().await?;
            for statement in &statements {
                sqlx::query(statement).execute(&mut *tx).await?;
            }
            tx.commit().await?;
            Ok(())
        })
    }
}

/// Lexical context while scanning SQL text.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Scan {
    Code,
    /// `'...'`, with `''` as an escaped quote.
    Literal,
    /// `"..."`, with `""` as an escaped quote.
    Identifier,
    /// `--` up to end of line.
    LineComment,
    /// `/* ... */`, which nests in PostgreSQL.
    BlockComment(usize),
    /// `$tag$ ... $tag$`.
    DollarQuoted(String),
}

/// Split SQL into individual statements.
///
/// Semicolons only terminate a statement in plain code; quoted literals,
/// quoted identifiers, comments and dollar-quoted bodies (PL/pgSQL functions)
/// are kept intact. Fragments holding nothing but whitespace and comments are
/// dropped.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut has_code = false;
    let mut scan = Scan::Code;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);

        match &mut scan {
            Scan::Code => match c {
                ';' => {
                    current.pop();
                    if has_code {
                        statements.push(current.trim().to_string());
                    }
                    current.clear();
                    has_code = false;
                }
                '-' if chars.peek() == Some(&'-') => {
                    current.extend(chars.next());
                    scan = Scan::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    current.extend(chars.next());
                    scan = Scan::BlockComment(1);
                }
                '\'' => {
                    has_code = true;
                    scan = Scan::Literal;
                }
                '"' => {
                    has_code = true;
                    scan = Scan::Identifier;
                }
                '$' => {
                    has_code = true;
                    if let Some(tag) = read_dollar_tag(&mut chars, &mut current) {
                        scan = Scan::DollarQuoted(tag);
                    }
                }
                c if !c.is_whitespace() => has_code = true,
                _ => {}
            },
            Scan::Literal | Scan::Identifier => {
                let quote = if scan == Scan::Literal { '\'' } else { '"' };
                if c == quote {
                    if chars.peek() == Some(&quote) {
                        current.extend(chars.next());
                    } else {
                        scan = Scan::Code;
                    }
                }
            }
            Scan::LineComment => {
                if c == '\n' {
                    scan = Scan::Code;
                }
            }
            Scan::BlockComment(depth) => {
                if c == '*' && chars.peek() == Some(&'/') {
                    current.extend(chars.next());
                    *depth -= 1;
                    if *depth == 0 {
                        scan = Scan::Code;
                    }
                } else if c == '/' && chars.peek() == Some(&'*') {
                    current.extend(chars.next());
                    *depth += 1;
                }
            }
            Scan::DollarQuoted(open) => {
                if c == '$' {
                    let open = open.clone();
                    if let Some(tag) = read_dollar_tag(&mut chars, &mut current) {
                        if tag == open {
                            scan = Scan::Code;
                        }
                    }
                }
            }
        }
    }

    if has_code {
        statements.push(current.trim().to_string());
    }

    statements
}

/// Read the rest of a `$tag$` opener after its first `$`, copying consumed
/// characters into `current`. Returns the full tag, or `None` for positional
/// parameters like `$1` and stray dollar signs.
fn read_dollar_tag(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    current: &mut String,
) -> Option<String> {
    let mut tag = String::from("$");
    while let Some(&c) = chars.peek() {
        if c == '$' {
            chars.next();
            current.push(c);
            tag.push(c);
            return Some(tag);
        }
        let starts_with_digit = tag.len() == 1 && c.is_ascii_digit();
        if starts_with_digit || !(c.is_alphanumeric() || c == '_') {
            return None;
        }
        chars.next();
        current.push(c);
        tag.push(c);
    }
    None
}

/// Load SQL migrations from a directory.
///
/// Files are named like `0001_create_users.sql`; the file stem is the
/// migration identity and files run in file name order. A missing directory
/// yields no migrations.
pub fn load_migrations_from_dir(dir: &Path) -> Result<Vec<SqlMigration>> {
    if !dir.exists() {
        debug!("Migrations directory does not exist: {:?}", dir);
        return Ok(Vec::new());
    }

    let mut migrations = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();

        if path.extension().map(|e| e == "sql").unwrap_or(false) {
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| {
                    StrataError::Config(format!("Invalid migration filename: {:?}", path))
                })?
                .to_string();

            let sql = std::fs::read_to_string(&path)?;
            migrations.push(SqlMigration::new(name, sql));
        }
    }

    migrations.sort_by(|a, b| a.name.cmp(&b.name));

    debug!("Loaded {} SQL migrations from {:?}", migrations.len(), dir);
    Ok(migrations)
}
