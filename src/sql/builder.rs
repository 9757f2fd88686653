//! Builds parameterized SELECT, INSERT, UPDATE, DELETE and COUNT statements
//! for any discovered table. Pure string/parameter assembly: no I/O, no
//! engine branching beyond what [`Dialect`] answers. Values never appear in
//! the SQL text; they ride in `params` behind native placeholders.

use crate::dialect::Dialect;
use crate::sql::value::SqlValue;

/// Comparison operator for a WHERE predicate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
}

impl CmpOp {
    fn sql(&self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "<>",
            CmpOp::Lt => "<",
            CmpOp::Lte => "<=",
            CmpOp::Gt => ">",
            CmpOp::Gte => ">=",
            CmpOp::Like => "LIKE",
        }
    }
}

/// One WHERE predicate over a validated column.
#[derive(Clone, Debug)]
pub enum WherePredicate {
    Cmp {
        column: String,
        op: CmpOp,
        value: SqlValue,
    },
    In {
        column: String,
        values: Vec<SqlValue>,
    },
}

/// One ORDER BY key over a validated column.
#[derive(Clone, Debug)]
pub struct OrderSpec {
    pub column: String,
    pub descending: bool,
}

/// Generated statement plus its bind parameters, in placeholder order.
#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<SqlValue>,
    dialect: Dialect,
}

impl QueryBuf {
    fn new(dialect: Dialect) -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
            dialect,
        }
    }

    /// Append a parameter, returning its placeholder text.
    fn push_param(&mut self, v: SqlValue) -> String {
        self.params.push(v);
        self.dialect.placeholder(self.params.len())
    }
}

/// Per-dialect statement builder for one connection.
#[derive(Clone, Copy, Debug)]
pub struct SqlBuilder {
    pub dialect: Dialect,
}

impl SqlBuilder {
    pub fn new(dialect: Dialect) -> Self {
        SqlBuilder { dialect }
    }

    fn quote(&self, ident: &str) -> String {
        self.dialect.quote(ident)
    }

    fn projection_list(&self, projection: &[String]) -> String {
        projection
            .iter()
            .map(|c| self.quote(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Render predicates into the buffer. Returns `" WHERE ..."` or `""`.
    /// An empty IN list renders the never-matching `1 = 0`.
    fn where_clause(&self, q: &mut QueryBuf, predicates: &[WherePredicate]) -> String {
        if predicates.is_empty() {
            return String::new();
        }
        let mut parts = Vec::with_capacity(predicates.len());
        for pred in predicates {
            match pred {
                WherePredicate::Cmp { column, op, value } => {
                    if *op == CmpOp::Eq && value.is_null() {
                        parts.push(format!("{} IS NULL", self.quote(column)));
                    } else if *op == CmpOp::Ne && value.is_null() {
                        parts.push(format!("{} IS NOT NULL", self.quote(column)));
                    } else {
                        let ph = q.push_param(value.clone());
                        parts.push(format!("{} {} {}", self.quote(column), op.sql(), ph));
                    }
                }
                WherePredicate::In { column, values } => {
                    if values.is_empty() {
                        parts.push("1 = 0".to_string());
                    } else {
                        let placeholders: Vec<String> =
                            values.iter().map(|v| q.push_param(v.clone())).collect();
                        parts.push(format!(
                            "{} IN ({})",
                            self.quote(column),
                            placeholders.join(", ")
                        ));
                    }
                }
            }
        }
        format!(" WHERE {}", parts.join(" AND "))
    }

    fn order_clause(&self, order: &[OrderSpec]) -> String {
        if order.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = order
            .iter()
            .map(|o| {
                format!(
                    "{} {}",
                    self.quote(&o.column),
                    if o.descending { "DESC" } else { "ASC" }
                )
            })
            .collect();
        format!(" ORDER BY {}", parts.join(", "))
    }

    fn limit_offset_clause(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        let mut out = String::new();
        match (limit, offset) {
            (Some(n), _) => out.push_str(&format!(" LIMIT {}", n)),
            (None, Some(_)) => {
                if let Some(filler) = self.dialect.offset_filler_limit() {
                    out.push_str(&format!(" LIMIT {}", filler));
                }
            }
            (None, None) => {}
        }
        if let Some(n) = offset {
            out.push_str(&format!(" OFFSET {}", n));
        }
        out
    }

    /// SELECT with projection, predicates, ORDER BY and LIMIT/OFFSET.
    pub fn select(
        &self,
        table: &str,
        projection: &[String],
        predicates: &[WherePredicate],
        order: &[OrderSpec],
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> QueryBuf {
        let mut q = QueryBuf::new(self.dialect);
        let where_clause = self.where_clause(&mut q, predicates);
        q.sql = format!(
            "SELECT {} FROM {}{}{}{}",
            self.projection_list(projection),
            self.quote(table),
            where_clause,
            self.order_clause(order),
            self.limit_offset_clause(limit, offset),
        );
        q
    }

    /// SELECT COUNT(*); limit/offset are deliberately not part of the contract.
    pub fn count(&self, table: &str, predicates: &[WherePredicate]) -> QueryBuf {
        let mut q = QueryBuf::new(self.dialect);
        let where_clause = self.where_clause(&mut q, predicates);
        q.sql = format!(
            "SELECT COUNT(*) AS {} FROM {}{}",
            self.quote("count"),
            self.quote(table),
            where_clause,
        );
        q
    }

    /// Multi-row INSERT. `rows` must all match `columns` in length and order;
    /// an empty column list renders the dialect's default-values form.
    pub fn insert(
        &self,
        table: &str,
        columns: &[String],
        rows: Vec<Vec<SqlValue>>,
        returning: Option<&[String]>,
    ) -> QueryBuf {
        let mut q = QueryBuf::new(self.dialect);
        let body = if columns.is_empty() {
            match self.dialect {
                Dialect::MySql | Dialect::MariaDb => "() VALUES ()".to_string(),
                Dialect::Postgres | Dialect::Sqlite => "DEFAULT VALUES".to_string(),
            }
        } else {
            let mut tuples = Vec::with_capacity(rows.len());
            for row in rows {
                let placeholders: Vec<String> =
                    row.into_iter().map(|v| q.push_param(v)).collect();
                tuples.push(format!("({})", placeholders.join(", ")));
            }
            format!(
                "({}) VALUES {}",
                self.projection_list(columns),
                tuples.join(", ")
            )
        };
        q.sql = format!("INSERT INTO {} {}", self.quote(table), body);
        if let Some(fields) = returning {
            q.sql.push_str(&format!(" RETURNING {}", self.projection_list(fields)));
        }
        q
    }

    /// UPDATE matching the predicates. SET parameters bind before WHERE
    /// parameters, matching placeholder order.
    pub fn update(
        &self,
        table: &str,
        sets: Vec<(String, SqlValue)>,
        predicates: &[WherePredicate],
        returning: Option<&[String]>,
    ) -> QueryBuf {
        let mut q = QueryBuf::new(self.dialect);
        let set_parts: Vec<String> = sets
            .into_iter()
            .map(|(column, value)| {
                let ph = q.push_param(value);
                format!("{} = {}", self.quote(&column), ph)
            })
            .collect();
        let where_clause = self.where_clause(&mut q, predicates);
        q.sql = format!(
            "UPDATE {} SET {}{}",
            self.quote(table),
            set_parts.join(", "),
            where_clause,
        );
        if let Some(fields) = returning {
            q.sql.push_str(&format!(" RETURNING {}", self.projection_list(fields)));
        }
        q
    }

    /// DELETE matching the predicates, optionally returning the removed rows.
    pub fn delete(
        &self,
        table: &str,
        predicates: &[WherePredicate],
        returning: Option<&[String]>,
    ) -> QueryBuf {
        let mut q = QueryBuf::new(self.dialect);
        let where_clause = self.where_clause(&mut q, predicates);
        q.sql = format!("DELETE FROM {}{}", self.quote(table), where_clause);
        if let Some(fields) = returning {
            q.sql.push_str(&format!(" RETURNING {}", self.projection_list(fields)));
        }
        q
    }
}
