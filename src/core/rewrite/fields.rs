//! Warehouse database, table and field remapping
//!
//! Questions embed warehouse identifiers that differ between instances.
//! [`FieldMatcher`] pairs the tables and fields of a source database with
//! those of a destination database; the resulting [`QueryRemap`] rewrites
//! query documents.

use crate::adapters::{DatabaseMetadata, TableMetadata};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

/// A warehouse identifier found in a query without a destination counterpart
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WarehouseRef {
    Table(u64),
    Field(u64),
}

impl fmt::Display for WarehouseRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarehouseRef::Table(id) => write!(f, "table {id}"),
            WarehouseRef::Field(id) => write!(f, "field {id}"),
        }
    }
}

/// Source to destination warehouse identifiers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryRemap {
    databases: HashMap<u64, u64>,
    tables: HashMap<u64, u64>,
    fields: HashMap<u64, u64>,
}

impl QueryRemap {
    pub fn new() -> Self {
        Self::default()
    }

    /// A remap that only changes the database ID
    pub fn database_only(source: u64, destination: u64) -> Self {
        let mut remap = Self::new();
        remap.databases.insert(source, destination);
        remap
    }

    pub fn is_empty(&self) -> bool {
        self.databases.is_empty()
    }

    pub fn database(&self, source: u64) -> Option<u64> {
        self.databases.get(&source).copied()
    }

    pub fn table(&self, source: u64) -> Option<u64> {
        self.tables.get(&source).copied()
    }

    pub fn field(&self, source: u64) -> Option<u64> {
        self.fields.get(&source).copied()
    }

    /// Fold another remap into this one
    pub fn merge(&mut self, other: QueryRemap) {
        self.databases.extend(other.databases);
        self.tables.extend(other.tables);
        self.fields.extend(other.fields);
    }

    /// Rewrite a `dataset_query` document
    ///
    /// Queries on a database outside the remap are left untouched. Returns
    /// the identifiers that had no counterpart; they are left as-is.
    pub fn apply_to_query(&self, query: &mut Value) -> Vec<WarehouseRef> {
        let Some(source) = query.get("database").and_then(Value::as_u64) else {
            return Vec::new();
        };
        let Some(destination) = self.database(source) else {
            return Vec::new();
        };

        if let Some(map) = query.as_object_mut() {
            map.insert("database".to_string(), destination.into());
        }
        self.apply_to_clause(query)
    }

    /// Rewrite field clauses and table IDs anywhere inside a document
    ///
    /// Used for parameter-mapping targets, which carry field clauses without
    /// naming their database.
    pub fn apply_to_clause(&self, value: &mut Value) -> Vec<WarehouseRef> {
        if self.is_empty() {
            return Vec::new();
        }
        let mut unmatched = BTreeSet::new();
        self.remap_value(value, &mut unmatched);
        unmatched.into_iter().collect()
    }

    fn remap_value(&self, value: &mut Value, unmatched: &mut BTreeSet<WarehouseRef>) {
        match value {
            Value::Array(items) => {
                if is_field_clause(items) {
                    self.remap_id(&mut items[1], WarehouseRef::Field, unmatched);
                }
                for item in items.iter_mut() {
                    self.remap_value(item, unmatched);
                }
            }
            Value::Object(map) => {
                for (key, child) in map.iter_mut() {
                    match key.as_str() {
                        "source-table" => self.remap_id(child, WarehouseRef::Table, unmatched),
                        "source-field" => self.remap_id(child, WarehouseRef::Field, unmatched),
                        _ => {}
                    }
                    self.remap_value(child, unmatched);
                }
            }
            _ => {}
        }
    }

    fn remap_id(
        &self,
        value: &mut Value,
        kind: fn(u64) -> WarehouseRef,
        unmatched: &mut BTreeSet<WarehouseRef>,
    ) {
        // `card__N` tables are question references, not warehouse tables
        let Some(source) = value.as_u64() else { return };
        let target = match kind(source) {
            WarehouseRef::Table(id) => self.table(id),
            WarehouseRef::Field(id) => self.field(id),
        };
        match target {
            Some(destination) => *value = destination.into(),
            None => {
                unmatched.insert(kind(source));
            }
        }
    }
}

fn is_field_clause(items: &[Value]) -> bool {
    items.len() >= 2
        && matches!(
            items[0].as_str(),
            Some("field") | Some("field-id")
        )
}

/// Result of matching two databases
#[derive(Debug, Clone, Default)]
pub struct MatchReport {
    pub remap: QueryRemap,
    /// Source tables without a destination counterpart
    pub unmatched_tables: Vec<String>,
    /// Source fields of matched tables without a destination counterpart, as `table.field`
    pub unmatched_fields: Vec<String>,
}

/// Pairs the tables and fields of two warehouse databases
///
/// Tables match by case-insensitive name, preferring the same schema, and
/// fall back to an identical set of field names. Fields match by name
/// within matched tables.
pub struct FieldMatcher<'a> {
    source: &'a DatabaseMetadata,
    destination: &'a DatabaseMetadata,
}

impl<'a> FieldMatcher<'a> {
    pub fn new(source: &'a DatabaseMetadata, destination: &'a DatabaseMetadata) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// Build the remap; with `match_fields` off only the database ID changes
    pub fn build(&self, match_fields: bool) -> MatchReport {
        let mut report = MatchReport {
            remap: QueryRemap::database_only(self.source.id, self.destination.id),
            ..MatchReport::default()
        };
        if !match_fields {
            return report;
        }

        let mut claimed: HashSet<u64> = HashSet::new();
        let mut pending = Vec::new();

        for table in &self.source.tables {
            match self.by_name(table, &claimed) {
                Some(target) => {
                    claimed.insert(target.id);
                    self.pair_tables(table, target, &mut report);
                }
                None => pending.push(table),
            }
        }

        for table in pending {
            match self.by_field_names(table, &claimed) {
                Some(target) => {
                    claimed.insert(target.id);
                    self.pair_tables(table, target, &mut report);
                }
                None => report.unmatched_tables.push(qualified_name(table)),
            }
        }

        report
    }

    fn by_name(&self, table: &TableMetadata, claimed: &HashSet<u64>) -> Option<&'a TableMetadata> {
        let candidates: Vec<&TableMetadata> = self
            .destination
            .tables
            .iter()
            .filter(|t| !claimed.contains(&t.id) && t.name.eq_ignore_ascii_case(&table.name))
            .collect();
        candidates
            .iter()
            .find(|t| t.schema == table.schema)
            .or_else(|| candidates.first())
            .copied()
    }

    fn by_field_names(
        &self,
        table: &TableMetadata,
        claimed: &HashSet<u64>,
    ) -> Option<&'a TableMetadata> {
        let names = field_names(table);
        if names.is_empty() {
            return None;
        }
        let mut candidates = self
            .destination
            .tables
            .iter()
            .filter(|t| !claimed.contains(&t.id) && field_names(t) == names);
        match (candidates.next(), candidates.next()) {
            (Some(only), None) => Some(only),
            _ => None,
        }
    }

    fn pair_tables(&self, source: &TableMetadata, target: &TableMetadata, report: &mut MatchReport) {
        report.remap.tables.insert(source.id, target.id);
        for field in &source.fields {
            let matched = target
                .fields
                .iter()
                .find(|f| f.name == field.name)
                .or_else(|| {
                    target
                        .fields
                        .iter()
                        .find(|f| f.name.eq_ignore_ascii_case(&field.name))
                });
            match matched {
                Some(counterpart) => {
                    report.remap.fields.insert(field.id, counterpart.id);
                }
                None => report
                    .unmatched_fields
                    .push(format!("{}.{}", qualified_name(source), field.name)),
            }
        }
    }
}

fn field_names(table: &TableMetadata) -> BTreeSet<String> {
    table.fields.iter().map(|f| f.name.to_lowercase()).collect()
}

fn qualified_name(table: &TableMetadata) -> String {
    match &table.schema {
        Some(schema) => format!("{schema}.{}", table.name),
        None => table.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::FieldMetadata;
    use serde_json::json;

    fn table(id: u64, name: &str, fields: &[(u64, &str)]) -> TableMetadata {
        TableMetadata {
            id,
            name: name.to_string(),
            schema: Some("public".to_string()),
            fields: fields
                .iter()
                .map(|(id, name)| FieldMetadata {
                    id: *id,
                    name: name.to_string(),
                })
                .collect(),
        }
    }

    fn databases() -> (DatabaseMetadata, DatabaseMetadata) {
        let source = DatabaseMetadata {
            id: 2,
            name: "staging".to_string(),
            tables: vec![
                table(10, "orders", &[(100, "id"), (101, "total"), (102, "legacy")]),
                table(11, "people_v1", &[(110, "id"), (111, "email")]),
                table(12, "audit", &[(120, "at")]),
            ],
        };
        let destination = DatabaseMetadata {
            id: 5,
            name: "prod".to_string(),
            tables: vec![
                table(50, "ORDERS", &[(500, "id"), (501, "total")]),
                table(51, "people", &[(510, "email"), (511, "id")]),
            ],
        };
        (source, destination)
    }

    #[test]
    fn test_matcher_pairs_tables_and_fields() {
        let (source, destination) = databases();
        let report = FieldMatcher::new(&source, &destination).build(true);

        assert_eq!(report.remap.database(2), Some(5));
        assert_eq!(report.remap.table(10), Some(50));
        assert_eq!(report.remap.field(101), Some(501));
        // matched through its field names
        assert_eq!(report.remap.table(11), Some(51));
        assert_eq!(report.remap.field(111), Some(510));

        assert_eq!(report.unmatched_tables, vec!["public.audit".to_string()]);
        assert_eq!(report.unmatched_fields, vec!["public.orders.legacy".to_string()]);
    }

    #[test]
    fn test_matcher_without_fields_only_maps_database() {
        let (source, destination) = databases();
        let report = FieldMatcher::new(&source, &destination).build(false);
        assert_eq!(report.remap.database(2), Some(5));
        assert_eq!(report.remap.table(10), None);
    }

    #[test]
    fn test_apply_to_query_rewrites_warehouse_ids() {
        let (source, destination) = databases();
        let remap = FieldMatcher::new(&source, &destination).build(true).remap;

        let mut query = json!({
            "type": "query",
            "database": 2,
            "query": {
                "source-table": 10,
                "filter": ["=", ["field", 101, null], 5],
                "breakout": [["field", 111, {"source-field": 100}]],
                "joins": [{"source-table": "card__7", "condition": ["=", ["field", 102, null], 1]}]
            }
        });
        let unmatched = remap.apply_to_query(&mut query);

        assert_eq!(query["database"], 5);
        assert_eq!(query["query"]["source-table"], 50);
        assert_eq!(query["query"]["filter"][1], json!(["field", 501, null]));
        assert_eq!(
            query["query"]["breakout"][0],
            json!(["field", 510, {"source-field": 500}])
        );
        assert_eq!(query["query"]["joins"][0]["source-table"], "card__7");
        assert_eq!(unmatched, vec![WarehouseRef::Field(102)]);
    }

    #[test]
    fn test_apply_to_query_skips_other_databases() {
        let remap = QueryRemap::database_only(2, 5);
        let mut query = json!({"database": 3, "query": {"source-table": 10}});
        let before = query.clone();

        assert!(remap.apply_to_query(&mut query).is_empty());
        assert_eq!(query, before);
    }

    #[test]
    fn test_native_template_tag_dimensions() {
        let (source, destination) = databases();
        let remap = FieldMatcher::new(&source, &destination).build(true).remap;
        let mut query = json!({
            "type": "native",
            "database": 2,
            "native": {
                "query": "select * from orders where {{total}}",
                "template-tags": {
                    "total": {"type": "dimension", "dimension": ["field", 101, null]}
                }
            }
        });

        assert!(remap.apply_to_query(&mut query).is_empty());
        assert_eq!(
            query["native"]["template-tags"]["total"]["dimension"],
            json!(["field", 501, null])
        );
    }
}
