//! builds the information needed to turn raw remote rows into typed rows at runtime.
//!
//! A `RowBuilderDescriptor` has one extractor per column, in column order. Each extractor says whether
//! the column is read through an unboxed primitive accessor or kept as a reference value.
//! A nullable column is always read by reference, even when its type is primitive, so that a remote
//! NULL stays distinguishable from zero.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::schema::{RowType, TableId};
use crate::sql_type::{Primitive, SqlType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extraction {
    Primitive(Primitive),
    Reference,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnExtractor {
    pub name: String,
    pub sql_type: SqlType,
    pub extraction: Extraction,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RowBuilderDescriptor {
    pub extractors: Vec<ColumnExtractor>,
}

impl RowBuilderDescriptor {
    pub fn from_row_type(row_type: &RowType) -> RowBuilderDescriptor {
        RowBuilderDescriptor {
            extractors: row_type
                .columns
                .iter()
                .map(|c| ColumnExtractor {
                    name: c.name.clone(),
                    sql_type: c.sql_type,
                    extraction: match (c.nullable, c.sql_type.primitive()) {
                        (false, Some(p)) => Extraction::Primitive(p),
                        _ => Extraction::Reference,
                    },
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.extractors.iter().map(|e| e.name.clone()).collect()
    }
}

/// The identity of a table's declared structure. Two providers may report the same table and version
/// with different columns, so the row type itself is part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaIdentity {
    pub table: TableId,
    pub version: u64,
    pub row_type: RowType,
}

impl SchemaIdentity {
    pub fn new(table: TableId, version: u64, row_type: RowType) -> SchemaIdentity {
        SchemaIdentity {
            table,
            version,
            row_type,
        }
    }
}

/// caches descriptors per schema identity. Safe to share between threads.
#[derive(Debug, Default)]
pub struct DescriptorCache {
    descriptors: RwLock<HashMap<SchemaIdentity, Arc<RowBuilderDescriptor>>>,
}

impl DescriptorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build(&self, id: &SchemaIdentity) -> Arc<RowBuilderDescriptor> {
        if let Some(d) = self.descriptors.read().get(id) {
            return d.clone();
        }
        let mut w = self.descriptors.write();
        w.entry(id.clone())
            .or_insert_with(|| Arc::new(RowBuilderDescriptor::from_row_type(&id.row_type)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.descriptors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.read().is_empty()
    }
}

#[cfg(test)]
use crate::schema::ColumnDef;

#[test]
fn test_from_row_type() {
    use SqlType::*;
    let rt = RowType::new(vec![
        ColumnDef::new("id", Int64, false),
        ColumnDef::new("qty", Int32, false),
        ColumnDef::new("price", Real, false),
        ColumnDef::new("promo", Bool, false),
        ColumnDef::new("name", Text, false),
        ColumnDef::new("discount", Int32, true),
        ColumnDef::new("amount", Decimal, false),
        ColumnDef::new("tags", Any, true),
    ]);
    let d = RowBuilderDescriptor::from_row_type(&rt);
    assert_eq!(d.len(), rt.len());
    assert_eq!(d.column_names(), rt.column_names());
    let actual: Vec<Extraction> = d.extractors.iter().map(|e| e.extraction).collect();
    assert_eq!(
        actual,
        vec![
            Extraction::Primitive(Primitive::Int64),
            Extraction::Primitive(Primitive::Int32),
            Extraction::Primitive(Primitive::Double),
            Extraction::Primitive(Primitive::Bool),
            Extraction::Reference,
            Extraction::Reference,
            Extraction::Reference,
            Extraction::Reference,
        ]
    );
}

#[test]
fn test_cache_per_schema_identity() {
    let cache = DescriptorCache::new();
    let rt1 = RowType::new(vec![ColumnDef::new("a", SqlType::Int64, false)]);
    let rt2 = RowType::new(vec![ColumnDef::new("a", SqlType::Text, false)]);
    let id = SchemaIdentity::new(TableId::new(Some("s"), "t"), 1, rt1);
    let d1 = cache.get_or_build(&id);
    let d1_again = cache.get_or_build(&id);
    assert!(Arc::ptr_eq(&d1, &d1_again));
    assert_eq!(cache.len(), 1);

    let id2 = SchemaIdentity {
        version: 2,
        row_type: rt2,
        ..id
    };
    let d2 = cache.get_or_build(&id2);
    assert_eq!(d2.extractors[0].extraction, Extraction::Reference);
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_cache_rebuilds_when_columns_change_at_same_version() {
    let cache = DescriptorCache::new();
    let table = TableId::new(Some("foodmart"), "sales");
    let not_null = RowType::new(vec![ColumnDef::new("discount", SqlType::Int64, false)]);
    let nullable = RowType::new(vec![ColumnDef::new("discount", SqlType::Int64, true)]);
    let d1 = cache.get_or_build(&SchemaIdentity::new(table.clone(), 0, not_null));
    let d2 = cache.get_or_build(&SchemaIdentity::new(table, 0, nullable));
    assert_eq!(
        d1.extractors[0].extraction,
        Extraction::Primitive(Primitive::Int64)
    );
    assert_eq!(d2.extractors[0].extraction, Extraction::Reference);
    assert_eq!(cache.len(), 2);
}
