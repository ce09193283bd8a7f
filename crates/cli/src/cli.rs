use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use nl2sql_search::IndexType;

/// Natural-language-to-SQL tooling: build the data dictionary, deploy the
/// search indexes and ask questions.
#[derive(Parser, Debug)]
#[command(name = "nl2sql", version, about = "NL2SQL accelerator tooling")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create or update a search index with its data source, skillset and indexer.
    Deploy(DeployArgs),
    /// Read the configured database and write the data dictionary.
    Dictionary(DictionaryArgs),
    /// Upload a data dictionary directory to blob storage.
    Upload(UploadArgs),
    /// Run one question through the pipeline and print the outcome as JSON.
    Ask(AskArgs),
}

fn parse_index_type(value: &str) -> Result<IndexType, String> {
    value.parse().map_err(|e: nl2sql_search::SearchError| e.to_string())
}

#[derive(clap::Args, Debug)]
pub struct DeployArgs {
    /// text_2_sql_schema_store, text_2_sql_column_value_store or text_2_sql_query_cache
    #[arg(long = "index_type", value_parser = parse_index_type)]
    pub index_type: IndexType,

    /// Delete and recreate the index and indexer
    #[arg(long)]
    pub rebuild: bool,

    /// Appended to every resource name, for parallel or test deployments
    #[arg(long)]
    pub suffix: Option<String>,

    #[arg(
        long = "single_data_dictionary_file",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true"
    )]
    pub single_data_dictionary_file: bool,

    #[arg(
        long = "single_cache_file",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true"
    )]
    pub single_cache_file: bool,

    /// Also create the query cache indexer
    #[arg(
        long = "enable_cache_indexer",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true"
    )]
    pub enable_cache_indexer: bool,
}

impl DeployArgs {
    /// Whether the source blobs for this index are one JSON array.
    pub fn single_file(&self) -> bool {
        match self.index_type {
            IndexType::SchemaStore => self.single_data_dictionary_file,
            IndexType::QueryCache => self.single_cache_file,
            IndexType::ColumnValueStore => false,
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct DictionaryArgs {
    /// Defaults to Text2Sql__DataDictionaryDir
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Only these entities (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub entities: Option<Vec<String>>,

    #[arg(long, value_delimiter = ',')]
    pub excluded_entities: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    pub excluded_schemas: Vec<String>,

    /// Write a single entities.json instead of one file per entity
    #[arg(long)]
    pub single_file: bool,
}

#[derive(clap::Args, Debug)]
pub struct UploadArgs {
    /// Defaults to Text2Sql__DataDictionaryDir
    #[arg(long)]
    pub input_dir: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct AskArgs {
    pub question: String,

    #[arg(long, default_value = "default")]
    pub thread_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("nl2sql").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn deploy_flags_use_snake_case() {
        let cli = parse(&[
            "deploy",
            "--index_type",
            "text_2_sql_query_cache",
            "--rebuild",
            "--suffix",
            "test",
            "--single_cache_file",
            "--enable_cache_indexer",
            "true",
        ]);
        let Command::Deploy(args) = cli.command else {
            panic!("expected deploy");
        };
        assert_eq!(args.index_type, IndexType::QueryCache);
        assert!(args.rebuild);
        assert_eq!(args.suffix.as_deref(), Some("test"));
        assert!(args.single_file());
        assert!(args.enable_cache_indexer);
        assert!(!args.single_data_dictionary_file);
    }

    #[test]
    fn single_file_follows_index_type() {
        let cli = parse(&[
            "deploy",
            "--index_type",
            "text_2_sql_schema_store",
            "--single_cache_file",
        ]);
        let Command::Deploy(args) = cli.command else {
            panic!("expected deploy");
        };
        assert!(!args.rebuild);
        assert!(!args.single_file());
    }

    #[test]
    fn unknown_index_type_rejected() {
        let err = Cli::try_parse_from(["nl2sql", "deploy", "--index_type", "nope"]).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn dictionary_lists_split_on_commas() {
        let cli = parse(&[
            "dictionary",
            "--entities",
            "orders,customers",
            "--excluded-schemas",
            "audit",
            "--single-file",
        ]);
        let Command::Dictionary(args) = cli.command else {
            panic!("expected dictionary");
        };
        assert_eq!(args.entities, Some(vec!["orders".to_string(), "customers".to_string()]));
        assert_eq!(args.excluded_schemas, vec!["audit"]);
        assert!(args.excluded_entities.is_empty());
        assert!(args.single_file);
        assert!(args.output_dir.is_none());
    }

    #[test]
    fn ask_defaults_thread() {
        let cli = parse(&["ask", "how many orders?"]);
        let Command::Ask(args) = cli.command else {
            panic!("expected ask");
        };
        assert_eq!(args.question, "how many orders?");
        assert_eq!(args.thread_id, "default");
    }
}
