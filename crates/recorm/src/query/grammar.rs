//! Compilation of [`QueryState`] into SQL text plus bindings.
//!
//! Clauses are emitted in a fixed order regardless of the order they were
//! added to the builder, and every placeholder is written by the same
//! [`SqlWriter`] that records its value. The bindings list therefore always
//! lines up with the placeholders in the final string, even when a `having`
//! was added before a `where`.

use crate::adapter::{Dialect, PlaceholderStyle};
use crate::error::{OrmError, OrmResult};
use crate::query::clause::{
    Column, JoinClause, JoinCondition, JoinKind, OrderByClause, QueryState, WhereClause,
};
use crate::raw::{Operand, Raw};
use crate::value::Value;
use std::fmt::Write;

/// SQL text plus the values for its placeholders, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub bindings: Vec<Value>,
}

/// Aggregate functions supported by [`Grammar::compile_aggregate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl Aggregate {
    pub fn as_sql(self) -> &'static str {
        match self {
            Aggregate::Count => "COUNT",
            Aggregate::Sum => "SUM",
            Aggregate::Avg => "AVG",
            Aggregate::Min => "MIN",
            Aggregate::Max => "MAX",
        }
    }
}

/// Column alias used for aggregate results.
pub const AGGREGATE_ALIAS: &str = "aggregate";

/// Accumulates SQL text and bindings side by side.
struct SqlWriter {
    style: PlaceholderStyle,
    sql: String,
    bindings: Vec<Value>,
    error: Option<String>,
}

impl SqlWriter {
    fn new(style: PlaceholderStyle) -> Self {
        Self {
            style,
            sql: String::new(),
            bindings: Vec::new(),
            error: None,
        }
    }

    fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    fn push_bind(&mut self, value: Value) -> &mut Self {
        self.bindings.push(value);
        match self.style {
            PlaceholderStyle::Question => self.sql.push('?'),
            PlaceholderStyle::Numbered => {
                let _ = write!(&mut self.sql, "${}", self.bindings.len());
            }
        }
        self
    }

    fn push_bind_list(&mut self, values: &[Value]) -> &mut Self {
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.push_bind(value.clone());
        }
        self
    }

    fn push_operand(&mut self, operand: &Operand) -> &mut Self {
        match operand {
            Operand::Value(value) => self.push_bind(value.clone()),
            Operand::Raw(raw) => self.push_raw(raw),
        }
    }

    /// Emit a raw fragment, turning each `?` marker (outside quoted strings)
    /// into a placeholder for the fragment's next binding.
    fn push_raw(&mut self, raw: &Raw) -> &mut Self {
        let bindings = raw.bindings();
        if bindings.is_empty() {
            return self.push(raw.sql());
        }

        let mut next = 0;
        let mut in_quote = false;
        for ch in raw.sql().chars() {
            match ch {
                '\'' => {
                    in_quote = !in_quote;
                    self.sql.push(ch);
                }
                '?' if !in_quote && next < bindings.len() => {
                    self.push_bind(bindings[next].clone());
                    next += 1;
                }
                _ => self.sql.push(ch),
            }
        }

        if next != bindings.len() && self.error.is_none() {
            self.error = Some(format!(
                "raw expression `{}` has {} bindings but {} placeholders",
                raw.sql(),
                bindings.len(),
                next
            ));
        }
        self
    }

    fn finish(self) -> OrmResult<CompiledQuery> {
        if let Some(err) = self.error {
            return Err(OrmError::Validation(err));
        }
        Ok(CompiledQuery {
            sql: self.sql,
            bindings: self.bindings,
        })
    }
}

/// Dialect-aware SQL compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grammar {
    dialect: Dialect,
}

impl Grammar {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn writer(&self) -> SqlWriter {
        SqlWriter::new(self.dialect.placeholder_style())
    }

    // ==================== SELECT ====================

    pub fn compile_select(&self, state: &QueryState) -> OrmResult<CompiledQuery> {
        validate(state)?;
        let mut w = self.writer();
        self.write_select(&mut w, state)?;
        w.finish()
    }

    fn write_select(&self, w: &mut SqlWriter, state: &QueryState) -> OrmResult<()> {
        let table = table_of(state)?;

        w.push("SELECT ");
        if state.distinct {
            w.push("DISTINCT ");
        }
        if state.columns.is_empty() {
            w.push("*");
        } else {
            for (i, column) in state.columns.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                match column {
                    Column::Name(name) => w.push(name),
                    Column::Raw(raw) => w.push_raw(raw),
                };
            }
        }
        w.push(" FROM ").push(table);

        for join in &state.joins {
            write_join(w, join);
        }

        if has_clauses(&state.wheres) {
            w.push(" WHERE ");
            write_clauses(w, &state.wheres);
        }

        if !state.groups.is_empty() {
            w.push(" GROUP BY ").push(&state.groups.join(", "));
        }

        if has_clauses(&state.havings) {
            w.push(" HAVING ");
            write_clauses(w, &state.havings);
        }

        if !state.orders.is_empty() {
            w.push(" ORDER BY ");
            for (i, order) in state.orders.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                match order {
                    OrderByClause::Column { column, direction } => {
                        w.push(column).push(" ").push(direction.as_sql());
                    }
                    OrderByClause::Raw(raw) => {
                        w.push_raw(raw);
                    }
                }
            }
        }

        match (state.limit, state.offset) {
            (Some(limit), _) => {
                let _ = write!(&mut w.sql, " LIMIT {limit}");
            }
            // MySQL rejects OFFSET without LIMIT
            (None, Some(_)) if self.dialect == Dialect::MySql => {
                w.push(" LIMIT 18446744073709551615");
            }
            (None, _) => {}
        }
        if let Some(offset) = state.offset {
            let _ = write!(&mut w.sql, " OFFSET {offset}");
        }

        Ok(())
    }

    /// Compile `SELECT FN(column) AS aggregate ...`.
    ///
    /// Selected columns, ordering, limit and offset are dropped; joins,
    /// wheres, groups and havings are kept. A count over a grouped or
    /// distinct query is wrapped in a subquery so it counts result rows.
    pub fn compile_aggregate(
        &self,
        state: &QueryState,
        aggregate: Aggregate,
        column: &str,
    ) -> OrmResult<CompiledQuery> {
        validate(state)?;
        let mut w = self.writer();

        let mut inner = state.clone();
        inner.orders.clear();
        inner.limit = None;
        inner.offset = None;

        let wrap = aggregate == Aggregate::Count
            && (!state.groups.is_empty() || !state.havings.is_empty() || state.distinct);

        if wrap {
            if !state.distinct || inner.columns.is_empty() {
                inner.columns = vec![Column::Raw(Raw::new("1"))];
            }
            let _ = write!(
                &mut w.sql,
                "SELECT {}({}) AS {} FROM (",
                aggregate.as_sql(),
                column,
                AGGREGATE_ALIAS
            );
            self.write_select(&mut w, &inner)?;
            w.push(") AS aggregate_table");
        } else {
            inner.distinct = false;
            inner.columns = vec![Column::Raw(Raw::new(format!(
                "{}({}) AS {}",
                aggregate.as_sql(),
                column,
                AGGREGATE_ALIAS
            )))];
            self.write_select(&mut w, &inner)?;
        }

        w.finish()
    }

    /// Compile `SELECT 1 FROM ... LIMIT 1`.
    pub fn compile_exists(&self, state: &QueryState) -> OrmResult<CompiledQuery> {
        let mut lookup = state.clone();
        lookup.columns = vec![Column::Raw(Raw::new("1"))];
        lookup.distinct = false;
        lookup.orders.clear();
        lookup.limit = Some(1);
        lookup.offset = None;
        self.compile_select(&lookup)
    }

    // ==================== Mutations ====================

    /// Compile a (multi-row) INSERT. Every row must supply one operand per column.
    pub fn compile_insert(
        &self,
        state: &QueryState,
        columns: &[String],
        rows: &[Vec<Operand>],
    ) -> OrmResult<CompiledQuery> {
        validate(state)?;
        let table = table_of(state)?;
        let mut w = self.writer();

        w.push("INSERT INTO ").push(table);
        if columns.is_empty() {
            w.push(" DEFAULT VALUES");
            return w.finish();
        }

        w.push(" (").push(&columns.join(", ")).push(") VALUES ");
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(OrmError::validation(format!(
                    "insert row {} has {} values for {} columns",
                    i,
                    row.len(),
                    columns.len()
                )));
            }
            if i > 0 {
                w.push(", ");
            }
            w.push("(");
            for (j, operand) in row.iter().enumerate() {
                if j > 0 {
                    w.push(", ");
                }
                w.push_operand(operand);
            }
            w.push(")");
        }
        w.finish()
    }

    /// Compile `UPDATE table SET ... WHERE ...`; SET bindings precede WHERE bindings.
    pub fn compile_update(
        &self,
        state: &QueryState,
        values: &[(String, Operand)],
    ) -> OrmResult<CompiledQuery> {
        validate(state)?;
        let table = table_of(state)?;
        if values.is_empty() {
            return Err(OrmError::validation("UPDATE requires at least one column"));
        }
        if !state.joins.is_empty() {
            return Err(OrmError::validation("UPDATE does not support joins"));
        }

        let mut w = self.writer();
        w.push("UPDATE ").push(table).push(" SET ");
        for (i, (column, operand)) in values.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.push(column).push(" = ");
            w.push_operand(operand);
        }
        if has_clauses(&state.wheres) {
            w.push(" WHERE ");
            write_clauses(&mut w, &state.wheres);
        }
        w.finish()
    }

    pub fn compile_delete(&self, state: &QueryState) -> OrmResult<CompiledQuery> {
        validate(state)?;
        let table = table_of(state)?;
        if !state.joins.is_empty() {
            return Err(OrmError::validation("DELETE does not support joins"));
        }

        let mut w = self.writer();
        w.push("DELETE FROM ").push(table);
        if has_clauses(&state.wheres) {
            w.push(" WHERE ");
            write_clauses(&mut w, &state.wheres);
        }
        w.finish()
    }

    pub fn compile_truncate(&self, state: &QueryState) -> OrmResult<CompiledQuery> {
        validate(state)?;
        let table = table_of(state)?;
        let sql = match self.dialect {
            Dialect::Postgres | Dialect::MySql => format!("TRUNCATE TABLE {table}"),
            Dialect::Sqlite | Dialect::Generic => format!("DELETE FROM {table}"),
        };
        Ok(CompiledQuery {
            sql,
            bindings: Vec::new(),
        })
    }
}

fn validate(state: &QueryState) -> OrmResult<()> {
    if let Some(ref err) = state.build_error {
        return Err(OrmError::Validation(err.clone()));
    }
    Ok(())
}

fn table_of(state: &QueryState) -> OrmResult<&str> {
    state
        .table
        .as_deref()
        .ok_or_else(|| OrmError::configuration("no table set on query builder; call from() first"))
}

fn write_join(w: &mut SqlWriter, join: &JoinClause) {
    w.push(" ").push(join.kind.as_sql()).push(" ").push(&join.table);
    if join.kind == JoinKind::Cross || join.conditions.is_empty() {
        return;
    }
    w.push(" ON ");
    for (i, condition) in join.conditions.iter().enumerate() {
        match condition {
            JoinCondition::Columns {
                first,
                operator,
                second,
                boolean,
            } => {
                if i > 0 {
                    w.push(" ").push(boolean.as_sql()).push(" ");
                }
                w.push(first).push(" ").push(&normalize_operator(operator)).push(" ").push(second);
            }
            JoinCondition::Value {
                column,
                operator,
                value,
                boolean,
            } => {
                if i > 0 {
                    w.push(" ").push(boolean.as_sql()).push(" ");
                }
                w.push(column).push(" ").push(&normalize_operator(operator)).push(" ");
                w.push_bind(value.clone());
            }
        }
    }
}

fn is_empty_clause(clause: &WhereClause) -> bool {
    match clause {
        WhereClause::Nested { clauses, .. } => !has_clauses(clauses),
        _ => false,
    }
}

fn has_clauses(clauses: &[WhereClause]) -> bool {
    clauses.iter().any(|c| !is_empty_clause(c))
}

/// Write a clause list; the first emitted clause drops its connector.
fn write_clauses(w: &mut SqlWriter, clauses: &[WhereClause]) {
    let mut first = true;
    for clause in clauses.iter().filter(|c| !is_empty_clause(c)) {
        if !first {
            w.push(" ").push(clause.boolean().as_sql()).push(" ");
        }
        first = false;
        write_clause(w, clause);
    }
}

fn write_clause(w: &mut SqlWriter, clause: &WhereClause) {
    match clause {
        WhereClause::Basic {
            column,
            operator,
            value,
            ..
        } => {
            let op = normalize_operator(operator);
            if value.is_null() && (op == "=" || op == "IS") {
                w.push(column).push(" IS NULL");
            } else if value.is_null() && (op == "!=" || op == "<>" || op == "IS NOT") {
                w.push(column).push(" IS NOT NULL");
            } else {
                w.push(column).push(" ").push(&op).push(" ");
                w.push_operand(value);
            }
        }
        WhereClause::In {
            column,
            values,
            negated,
            ..
        } => {
            if values.is_empty() {
                // nothing is IN an empty set; everything is NOT IN it
                w.push(if *negated { "1 = 1" } else { "0 = 1" });
            } else {
                w.push(column).push(if *negated { " NOT IN (" } else { " IN (" });
                w.push_bind_list(values).push(")");
            }
        }
        WhereClause::Null {
            column, negated, ..
        } => {
            w.push(column).push(if *negated { " IS NOT NULL" } else { " IS NULL" });
        }
        WhereClause::Between {
            column,
            low,
            high,
            negated,
            ..
        } => {
            w.push(column).push(if *negated { " NOT BETWEEN " } else { " BETWEEN " });
            w.push_bind(low.clone()).push(" AND ").push_bind(high.clone());
        }
        WhereClause::Column {
            first,
            operator,
            second,
            ..
        } => {
            w.push(first).push(" ").push(&normalize_operator(operator)).push(" ").push(second);
        }
        WhereClause::Raw { raw, .. } => {
            w.push_raw(raw);
        }
        WhereClause::Nested { clauses, .. } => {
            w.push("(");
            write_clauses(w, clauses);
            w.push(")");
        }
    }
}

fn normalize_operator(operator: &str) -> String {
    operator.trim().to_ascii_uppercase()
}
