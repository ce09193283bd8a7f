use std::fmt;
use std::str::FromStr;

use crate::error::SearchError;

/// The three search indexes backing text-to-SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    SchemaStore,
    ColumnValueStore,
    QueryCache,
}

impl IndexType {
    pub const ALL: [IndexType; 3] = [Self::SchemaStore, Self::ColumnValueStore, Self::QueryCache];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SchemaStore => "text_2_sql_schema_store",
            Self::ColumnValueStore => "text_2_sql_column_value_store",
            Self::QueryCache => "text_2_sql_query_cache",
        }
    }

    /// Stem of the search resource names. Search services only accept
    /// lowercase letters, digits and dashes.
    pub fn resource_stem(&self) -> &'static str {
        match self {
            Self::SchemaStore => "text-2-sql-schema-store",
            Self::ColumnValueStore => "text-2-sql-column-value-store",
            Self::QueryCache => "text-2-sql-query-cache",
        }
    }

    /// Blob folder holding this index's source documents.
    pub fn folder(&self) -> &'static str {
        match self {
            Self::SchemaStore => "schema_store",
            Self::ColumnValueStore => "column_value_store",
            Self::QueryCache => "query_cache",
        }
    }

    /// Source text and target field for the embedding, if the index has one.
    pub fn vector_field(&self) -> Option<(&'static str, &'static str)> {
        match self {
            Self::SchemaStore => Some(("Definition", "DefinitionEmbedding")),
            Self::ColumnValueStore => None,
            Self::QueryCache => Some(("Question", "QuestionEmbedding")),
        }
    }

    pub fn index_name(&self, suffix: Option<&str>) -> String {
        format!("{}-index{}", self.resource_stem(), dash(suffix))
    }

    pub fn indexer_name(&self, suffix: Option<&str>) -> String {
        format!("{}-indexer{}", self.resource_stem(), dash(suffix))
    }

    pub fn data_source_name(&self, suffix: Option<&str>) -> String {
        format!("{}-data-source{}", self.resource_stem(), dash(suffix))
    }

    pub fn skillset_name(&self, suffix: Option<&str>) -> String {
        format!("{}-skillset{}", self.resource_stem(), dash(suffix))
    }
}

fn dash(suffix: Option<&str>) -> String {
    match suffix {
        Some(s) if !s.is_empty() => format!("-{s}"),
        _ => String::new(),
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexType {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| SearchError::UnknownIndexType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_without_suffix() {
        let t = IndexType::SchemaStore;
        assert_eq!(t.index_name(None), "text-2-sql-schema-store-index");
        assert_eq!(t.indexer_name(None), "text-2-sql-schema-store-indexer");
        assert_eq!(t.data_source_name(Some("")), "text-2-sql-schema-store-data-source");
    }

    #[test]
    fn names_with_suffix() {
        let t = IndexType::QueryCache;
        assert_eq!(t.index_name(Some("test")), "text-2-sql-query-cache-index-test");
        assert_eq!(t.skillset_name(Some("test")), "text-2-sql-query-cache-skillset-test");
    }

    #[test]
    fn resource_names_are_valid_for_search() {
        let valid = |name: &str| {
            name.len() <= 128
                && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
                && !name.starts_with('-')
                && !name.ends_with('-')
                && !name.contains("--")
        };
        for t in IndexType::ALL {
            for suffix in [None, Some("ci")] {
                assert!(valid(&t.index_name(suffix)), "{}", t.index_name(suffix));
                assert!(valid(&t.indexer_name(suffix)));
                assert!(valid(&t.data_source_name(suffix)));
                assert!(valid(&t.skillset_name(suffix)));
            }
            // CLI value keeps its original spelling
            assert!(t.as_str().starts_with("text_2_sql_"));
        }
    }

    #[test]
    fn default_config_targets_deployed_indexes() {
        let search = nl2sql_core::Config::for_profile("INDEX_TEST_UNSET").search;
        assert_eq!(search.schema_store_index, IndexType::SchemaStore.index_name(None));
        assert_eq!(search.column_value_store_index, IndexType::ColumnValueStore.index_name(None));
        assert_eq!(search.query_cache_index, IndexType::QueryCache.index_name(None));
    }

    #[test]
    fn parse_round_trip() {
        for t in IndexType::ALL {
            assert_eq!(t.as_str().parse::<IndexType>().unwrap(), t);
        }
        assert!("schema_store".parse::<IndexType>().is_err());
    }
}
