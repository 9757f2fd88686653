//! Entities: the generated CRUD surface for one discovered table. Operations
//! are function values bound to the owning connection and dialect builder;
//! they are the only sanctioned way to touch the underlying table.

use crate::db::Db;
use crate::error::{MapperError, Result};
use crate::hooks::{
    DeleteFn, EntityHooks, FindFn, InsertFn, OpSlot, SaveFn, UpdateManyFn,
};
use crate::inflection;
use crate::schema::{Column, TableInfo};
use crate::sql::{CmpOp, OrderSpec, SqlBuilder, SqlValue, WherePredicate};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

const CREATED_AT: &str = "created_at";
const UPDATED_AT: &str = "updated_at";

/// A row crossing the entity boundary: JSON object keyed by column name.
pub type Record = serde_json::Map<String, Value>;

/// Comparison operator usable in criteria.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    /// Membership test; the condition value is an array of candidates.
    In,
}

/// One criteria predicate over an entity field.
#[derive(Clone, Debug)]
pub struct Condition {
    pub field: String,
    pub op: Operator,
    pub value: Value,
}

impl Condition {
    fn new(field: impl Into<String>, op: Operator, value: Value) -> Self {
        Condition {
            field: field.into(),
            op,
            value,
        }
    }

    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, Operator::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, Operator::Ne, value)
    }

    pub fn lt(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, Operator::Lt, value)
    }

    pub fn lte(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, Operator::Lte, value)
    }

    pub fn gt(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, Operator::Gt, value)
    }

    pub fn gte(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, Operator::Gte, value)
    }

    pub fn like(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, Operator::Like, value)
    }

    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(field, Operator::In, Value::Array(values))
    }
}

/// Conjunction of predicates; empty matches every row.
pub type Criteria = Vec<Condition>;

/// One ORDER BY key.
#[derive(Clone, Debug)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        OrderBy {
            field: field.into(),
            descending: false,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        OrderBy {
            field: field.into(),
            descending: true,
        }
    }
}

/// Arguments for `find`. `fields` of `None` (or empty) projects every
/// non-redacted column.
#[derive(Clone, Debug, Default)]
pub struct FindOptions {
    pub criteria: Criteria,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub order_by: Vec<OrderBy>,
    pub fields: Option<Vec<String>>,
}

/// Arguments for `insert`: one or many records.
#[derive(Clone, Debug, Default)]
pub struct InsertOptions {
    pub inputs: Vec<Record>,
    pub fields: Option<Vec<String>>,
}

impl InsertOptions {
    pub fn one(input: Record) -> Self {
        InsertOptions {
            inputs: vec![input],
            fields: None,
        }
    }

    pub fn many(inputs: Vec<Record>) -> Self {
        InsertOptions {
            inputs,
            fields: None,
        }
    }
}

/// Arguments for `save`: upsert by primary key.
#[derive(Clone, Debug, Default)]
pub struct SaveOptions {
    pub input: Record,
    pub fields: Option<Vec<String>>,
}

impl SaveOptions {
    pub fn new(input: Record) -> Self {
        SaveOptions {
            input,
            fields: None,
        }
    }
}

/// Arguments for `delete`: remove matching rows, returning their pre-deletion
/// projections. Zero matches is an empty result, not an error.
#[derive(Clone, Debug, Default)]
pub struct DeleteOptions {
    pub criteria: Criteria,
    pub fields: Option<Vec<String>>,
}

/// Arguments for `update_many`: apply `changes` to every row matching the
/// criteria, returning the updated rows.
#[derive(Clone, Debug, Default)]
pub struct UpdateManyOptions {
    pub criteria: Criteria,
    pub changes: Record,
    pub fields: Option<Vec<String>>,
}

struct Inner {
    db: Db,
    builder: SqlBuilder,
    table: String,
    singular_name: String,
    columns: Vec<Column>,
    primary_key: Column,
    auto_timestamp: bool,
}

struct Ops {
    find: OpSlot<FindOptions, Vec<Value>>,
    insert: OpSlot<InsertOptions, Vec<Value>>,
    save: OpSlot<SaveOptions, Value>,
    delete: OpSlot<DeleteOptions, Vec<Value>>,
    update_many: OpSlot<UpdateManyOptions, Vec<Value>>,
}

/// The generated representation of one table. Cheap to clone; all clones
/// share the same operation table, so hooks applied through any handle are
/// visible to every caller.
#[derive(Clone)]
pub struct Entity {
    inner: Arc<Inner>,
    ops: Arc<Ops>,
}

impl Entity {
    /// Build the entity for one introspected table. Fails unless exactly one
    /// primary-key column survives column-level redaction.
    pub(crate) fn build(
        db: Db,
        table: TableInfo,
        auto_timestamp: bool,
        ignored_columns: &HashSet<String>,
    ) -> Result<Entity> {
        let columns: Vec<Column> = table
            .columns
            .into_iter()
            .filter(|c| !ignored_columns.contains(&c.name))
            .collect();
        let mut pk_iter = columns.iter().filter(|c| c.is_primary_key);
        let primary_key = match (pk_iter.next(), pk_iter.next()) {
            (Some(pk), None) => pk.clone(),
            _ => return Err(MapperError::MissingPrimaryKey(table.name)),
        };
        let builder = SqlBuilder::new(db.dialect());
        let inner = Arc::new(Inner {
            db,
            builder,
            singular_name: inflection::singularize(&table.name),
            table: table.name,
            columns,
            primary_key,
            auto_timestamp,
        });
        let ops = Ops {
            find: OpSlot::new(default_find(inner.clone())),
            insert: OpSlot::new(default_insert(inner.clone())),
            save: OpSlot::new(default_save(inner.clone())),
            delete: OpSlot::new(default_delete(inner.clone())),
            update_many: OpSlot::new(default_update_many(inner.clone())),
        };
        Ok(Entity {
            inner,
            ops: Arc::new(ops),
        })
    }

    /// Table name as declared in the database.
    pub fn name(&self) -> &str {
        &self.inner.table
    }

    /// Derived singular name; the registry lookup key.
    pub fn singular_name(&self) -> &str {
        &self.inner.singular_name
    }

    /// Columns in introspection order, after column-level redaction.
    pub fn columns(&self) -> &[Column] {
        &self.inner.columns
    }

    pub fn primary_key(&self) -> &Column {
        &self.inner.primary_key
    }

    /// Fetch rows matching the criteria, projected to `fields`.
    pub async fn find(&self, opts: FindOptions) -> Result<Vec<Value>> {
        let f = self.ops.find.get();
        f(opts).await
    }

    /// Insert one or many records; results correspond positionally to the
    /// inputs. There is no cross-record transaction guarantee.
    pub async fn insert(&self, opts: InsertOptions) -> Result<Vec<Value>> {
        let f = self.ops.insert.get();
        f(opts).await
    }

    /// Upsert by primary key: insert when the key is absent, update when
    /// present. Updating a key that matches no row fails with `NotFound`.
    pub async fn save(&self, opts: SaveOptions) -> Result<Value> {
        let f = self.ops.save.get();
        f(opts).await
    }

    /// Delete matching rows and return their pre-deletion projections.
    pub async fn delete(&self, opts: DeleteOptions) -> Result<Vec<Value>> {
        let f = self.ops.delete.get();
        f(opts).await
    }

    /// Apply `changes` to every matching row, returning the updated rows.
    pub async fn update_many(&self, opts: UpdateManyOptions) -> Result<Vec<Value>> {
        let f = self.ops.update_many.get();
        f(opts).await
    }

    /// Count rows matching the criteria. Not hookable.
    pub async fn count(&self, criteria: &Criteria) -> Result<u64> {
        self.inner.do_count(criteria).await
    }

    /// Compose the given hooks onto this entity's operations.
    pub(crate) fn apply_hooks(&self, hooks: &EntityHooks) {
        if let Some(hook) = &hooks.find {
            self.ops.find.compose(hook.clone());
        }
        if let Some(hook) = &hooks.insert {
            self.ops.insert.compose(hook.clone());
        }
        if let Some(hook) = &hooks.save {
            self.ops.save.compose(hook.clone());
        }
        if let Some(hook) = &hooks.delete {
            self.ops.delete.compose(hook.clone());
        }
        if let Some(hook) = &hooks.update_many {
            self.ops.update_many.compose(hook.clone());
        }
    }
}

fn default_find(inner: Arc<Inner>) -> FindFn {
    Arc::new(move |opts| {
        let inner = inner.clone();
        Box::pin(async move { inner.do_find(opts).await })
    })
}

fn default_insert(inner: Arc<Inner>) -> InsertFn {
    Arc::new(move |opts| {
        let inner = inner.clone();
        Box::pin(async move { inner.do_insert(opts).await })
    })
}

fn default_save(inner: Arc<Inner>) -> SaveFn {
    Arc::new(move |opts| {
        let inner = inner.clone();
        Box::pin(async move { inner.do_save(opts).await })
    })
}

fn default_delete(inner: Arc<Inner>) -> DeleteFn {
    Arc::new(move |opts| {
        let inner = inner.clone();
        Box::pin(async move { inner.do_delete(opts).await })
    })
}

fn default_update_many(inner: Arc<Inner>) -> UpdateManyFn {
    Arc::new(move |opts| {
        let inner = inner.clone();
        Box::pin(async move { inner.do_update_many(opts).await })
    })
}

impl Inner {
    fn column(&self, field: &str) -> Result<&Column> {
        self.columns
            .iter()
            .find(|c| c.name == field)
            .ok_or_else(|| MapperError::invalid_field(&self.singular_name, field))
    }

    /// Resolve and validate a projection; `None` or empty means every column.
    fn projection(&self, fields: Option<&[String]>) -> Result<Vec<String>> {
        match fields {
            None => Ok(self.columns.iter().map(|c| c.name.clone()).collect()),
            Some(fields) if fields.is_empty() => {
                Ok(self.columns.iter().map(|c| c.name.clone()).collect())
            }
            Some(fields) => {
                for field in fields {
                    self.column(field)?;
                }
                Ok(fields.to_vec())
            }
        }
    }

    fn predicates(&self, criteria: &Criteria) -> Result<Vec<WherePredicate>> {
        let mut preds = Vec::with_capacity(criteria.len());
        for cond in criteria {
            let col = self.column(&cond.field)?;
            let pred = match cond.op {
                Operator::In => {
                    let values = match &cond.value {
                        Value::Array(items) => items
                            .iter()
                            .map(|v| SqlValue::from_json(&col.sql_type, v))
                            .collect(),
                        single => vec![SqlValue::from_json(&col.sql_type, single)],
                    };
                    WherePredicate::In {
                        column: col.name.clone(),
                        values,
                    }
                }
                op => WherePredicate::Cmp {
                    column: col.name.clone(),
                    op: match op {
                        Operator::Eq => CmpOp::Eq,
                        Operator::Ne => CmpOp::Ne,
                        Operator::Lt => CmpOp::Lt,
                        Operator::Lte => CmpOp::Lte,
                        Operator::Gt => CmpOp::Gt,
                        Operator::Gte => CmpOp::Gte,
                        Operator::Like => CmpOp::Like,
                        Operator::In => unreachable!("handled above"),
                    },
                    value: SqlValue::from_json(&col.sql_type, &cond.value),
                },
            };
            preds.push(pred);
        }
        Ok(preds)
    }

    fn order_specs(&self, order_by: &[OrderBy]) -> Result<Vec<OrderSpec>> {
        order_by
            .iter()
            .map(|o| {
                let col = self.column(&o.field)?;
                Ok(OrderSpec {
                    column: col.name.clone(),
                    descending: o.descending,
                })
            })
            .collect()
    }

    fn pk_predicate(&self, id: &Value) -> WherePredicate {
        WherePredicate::Cmp {
            column: self.primary_key.name.clone(),
            op: CmpOp::Eq,
            value: SqlValue::from_json(&self.primary_key.sql_type, id),
        }
    }

    fn should_stamp_on_insert(&self, col: &Column) -> bool {
        self.auto_timestamp
            && col.sql_type.is_temporal()
            && (col.name == CREATED_AT || col.name == UPDATED_AT)
    }

    /// Column list for an INSERT: union of the records' keys plus timestamp
    /// stamps, in introspection order. Columns no record supplies are omitted
    /// so database defaults apply.
    fn insert_columns(&self, inputs: &[Record]) -> Vec<String> {
        self.columns
            .iter()
            .filter(|col| {
                inputs.iter().any(|i| i.contains_key(&col.name)) || self.should_stamp_on_insert(col)
            })
            .map(|c| c.name.clone())
            .collect()
    }

    fn insert_row(&self, columns: &[String], input: &Record) -> Vec<SqlValue> {
        self.columns
            .iter()
            .filter(|c| columns.contains(&c.name))
            .map(|col| match input.get(&col.name) {
                Some(v) => SqlValue::from_json(&col.sql_type, v),
                None if self.should_stamp_on_insert(col) => SqlValue::now(),
                None => SqlValue::null_for(&col.sql_type),
            })
            .collect()
    }

    async fn do_find(&self, opts: FindOptions) -> Result<Vec<Value>> {
        let projection = self.projection(opts.fields.as_deref())?;
        let preds = self.predicates(&opts.criteria)?;
        let order = self.order_specs(&opts.order_by)?;
        let q = self
            .builder
            .select(&self.table, &projection, &preds, &order, opts.limit, opts.offset);
        self.db.fetch_all(&q.sql, &q.params).await
    }

    async fn do_insert(&self, opts: InsertOptions) -> Result<Vec<Value>> {
        if opts.inputs.is_empty() {
            return Ok(Vec::new());
        }
        let projection = self.projection(opts.fields.as_deref())?;
        for input in &opts.inputs {
            for key in input.keys() {
                self.column(key)?;
            }
        }
        if self.builder.dialect.supports_insert_returning() {
            let columns = self.insert_columns(&opts.inputs);
            if columns.is_empty() {
                // all-defaults records: one DEFAULT VALUES insert per record
                let mut out = Vec::with_capacity(opts.inputs.len());
                for _ in &opts.inputs {
                    let q = self
                        .builder
                        .insert(&self.table, &[], Vec::new(), Some(&projection));
                    match self.db.fetch_optional(&q.sql, &q.params).await? {
                        Some(row) => out.push(row),
                        None => return Err(MapperError::Db(sqlx::Error::RowNotFound)),
                    }
                }
                return Ok(out);
            }
            let rows: Vec<Vec<SqlValue>> = opts
                .inputs
                .iter()
                .map(|input| self.insert_row(&columns, input))
                .collect();
            let q = self
                .builder
                .insert(&self.table, &columns, rows, Some(&projection));
            self.db.fetch_all(&q.sql, &q.params).await
        } else {
            // MySQL: insert record by record and read each row back through
            // the driver-reported generated key; results stay positional
            let mut out = Vec::with_capacity(opts.inputs.len());
            for input in &opts.inputs {
                let columns = self.insert_columns(std::slice::from_ref(input));
                let q = if columns.is_empty() {
                    self.builder.insert(&self.table, &[], Vec::new(), None)
                } else {
                    let row = self.insert_row(&columns, input);
                    self.builder.insert(&self.table, &columns, vec![row], None)
                };
                let exec = self.db.execute(&q.sql, &q.params).await?;
                let key = match input.get(&self.primary_key.name) {
                    Some(v) if !v.is_null() => {
                        SqlValue::from_json(&self.primary_key.sql_type, v)
                    }
                    _ => SqlValue::Int(exec.last_insert_id),
                };
                let pred = [WherePredicate::Cmp {
                    column: self.primary_key.name.clone(),
                    op: CmpOp::Eq,
                    value: key,
                }];
                let sel = self
                    .builder
                    .select(&self.table, &projection, &pred, &[], None, None);
                match self.db.fetch_optional(&sel.sql, &sel.params).await? {
                    Some(row) => out.push(row),
                    None => return Err(MapperError::Db(sqlx::Error::RowNotFound)),
                }
            }
            Ok(out)
        }
    }

    async fn do_save(&self, opts: SaveOptions) -> Result<Value> {
        let pk_name = self.primary_key.name.clone();
        match opts.input.get(&pk_name) {
            None | Some(Value::Null) => {
                let rows = self
                    .do_insert(InsertOptions {
                        inputs: vec![opts.input],
                        fields: opts.fields,
                    })
                    .await?;
                rows.into_iter()
                    .next()
                    .ok_or(MapperError::Db(sqlx::Error::RowNotFound))
            }
            Some(id) => {
                let id = id.clone();
                let projection = self.projection(opts.fields.as_deref())?;
                for key in opts.input.keys() {
                    if *key != pk_name {
                        self.column(key)?;
                    }
                }
                let mut sets: Vec<(String, SqlValue)> = self
                    .columns
                    .iter()
                    .filter(|c| c.name != pk_name)
                    .filter_map(|col| {
                        opts.input
                            .get(&col.name)
                            .map(|v| (col.name.clone(), SqlValue::from_json(&col.sql_type, v)))
                    })
                    .collect();
                self.stamp_updated_at(&opts.input, &mut sets);
                let pred = [self.pk_predicate(&id)];
                let not_found = || {
                    MapperError::NotFound(format!(
                        "{} with {} = {}",
                        self.singular_name, pk_name, id
                    ))
                };
                if sets.is_empty() {
                    // nothing to change: still confirm the row exists
                    let sel = self
                        .builder
                        .select(&self.table, &projection, &pred, &[], None, None);
                    return self
                        .db
                        .fetch_optional(&sel.sql, &sel.params)
                        .await?
                        .ok_or_else(not_found);
                }
                if self.builder.dialect.supports_update_returning() {
                    let q = self
                        .builder
                        .update(&self.table, sets, &pred, Some(&projection));
                    self.db
                        .fetch_optional(&q.sql, &q.params)
                        .await?
                        .ok_or_else(not_found)
                } else {
                    // MySQL/MariaDB: existence is decided by the read-back,
                    // not rows_affected (0 for value-identical updates)
                    let q = self.builder.update(&self.table, sets, &pred, None);
                    self.db.execute(&q.sql, &q.params).await?;
                    let sel = self
                        .builder
                        .select(&self.table, &projection, &pred, &[], None, None);
                    self.db
                        .fetch_optional(&sel.sql, &sel.params)
                        .await?
                        .ok_or_else(not_found)
                }
            }
        }
    }

    async fn do_delete(&self, opts: DeleteOptions) -> Result<Vec<Value>> {
        let projection = self.projection(opts.fields.as_deref())?;
        let preds = self.predicates(&opts.criteria)?;
        if self.builder.dialect.supports_delete_returning() {
            let q = self.builder.delete(&self.table, &preds, Some(&projection));
            self.db.fetch_all(&q.sql, &q.params).await
        } else {
            let sel = self
                .builder
                .select(&self.table, &projection, &preds, &[], None, None);
            let rows = self.db.fetch_all(&sel.sql, &sel.params).await?;
            let q = self.builder.delete(&self.table, &preds, None);
            self.db.execute(&q.sql, &q.params).await?;
            Ok(rows)
        }
    }

    async fn do_update_many(&self, opts: UpdateManyOptions) -> Result<Vec<Value>> {
        let projection = self.projection(opts.fields.as_deref())?;
        let preds = self.predicates(&opts.criteria)?;
        let pk_name = self.primary_key.name.clone();
        let mut sets: Vec<(String, SqlValue)> = Vec::new();
        for (key, value) in &opts.changes {
            if *key == pk_name {
                continue;
            }
            let col = self.column(key)?;
            sets.push((col.name.clone(), SqlValue::from_json(&col.sql_type, value)));
        }
        self.stamp_updated_at(&opts.changes, &mut sets);
        if sets.is_empty() {
            let q = self
                .builder
                .select(&self.table, &projection, &preds, &[], None, None);
            return self.db.fetch_all(&q.sql, &q.params).await;
        }
        if self.builder.dialect.supports_update_returning() {
            let q = self
                .builder
                .update(&self.table, sets, &preds, Some(&projection));
            self.db.fetch_all(&q.sql, &q.params).await
        } else {
            // collect the matching keys, update, then read the rows back
            let key_cols = vec![pk_name.clone()];
            let sel_keys = self
                .builder
                .select(&self.table, &key_cols, &preds, &[], None, None);
            let key_rows = self.db.fetch_all(&sel_keys.sql, &sel_keys.params).await?;
            let keys: Vec<SqlValue> = key_rows
                .iter()
                .filter_map(|row| row.get(&pk_name))
                .map(|v| SqlValue::from_json(&self.primary_key.sql_type, v))
                .collect();
            let q = self.builder.update(&self.table, sets, &preds, None);
            self.db.execute(&q.sql, &q.params).await?;
            if keys.is_empty() {
                return Ok(Vec::new());
            }
            let pred = [WherePredicate::In {
                column: pk_name,
                values: keys,
            }];
            let sel = self
                .builder
                .select(&self.table, &projection, &pred, &[], None, None);
            self.db.fetch_all(&sel.sql, &sel.params).await
        }
    }

    async fn do_count(&self, criteria: &Criteria) -> Result<u64> {
        let preds = self.predicates(criteria)?;
        let q = self.builder.count(&self.table, &preds);
        let row = self
            .db
            .fetch_optional(&q.sql, &q.params)
            .await?
            .ok_or(MapperError::Db(sqlx::Error::RowNotFound))?;
        Ok(row.get("count").and_then(Value::as_u64).unwrap_or(0))
    }

    fn stamp_updated_at(&self, provided: &Record, sets: &mut Vec<(String, SqlValue)>) {
        if !self.auto_timestamp || provided.contains_key(UPDATED_AT) {
            return;
        }
        if let Some(col) = self.columns.iter().find(|c| c.name == UPDATED_AT) {
            if col.sql_type.is_temporal() {
                sets.push((UPDATED_AT.to_string(), SqlValue::now()));
            }
        }
    }
}
