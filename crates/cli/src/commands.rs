use anyhow::{Context, Result};
use tracing::info;

use nl2sql_agent::Text2SqlRunner;
use nl2sql_connector::create_connector;
use nl2sql_core::Config;
use nl2sql_dictionary::{CreatorOptions, DataDictionaryCreator};
use nl2sql_search::{BlobUploader, DefinitionSettings, DeployOptions, IndexDeployer, SearchService};

use crate::cli::{AskArgs, DeployArgs, DictionaryArgs, UploadArgs};

pub async fn deploy(config: &Config, args: DeployArgs) -> Result<()> {
    let service = SearchService::from_config(&config.search).context("search service not configured")?;
    let options = DeployOptions {
        index_type: args.index_type,
        rebuild: args.rebuild,
        single_file: args.single_file(),
        enable_cache_indexer: args.enable_cache_indexer,
        suffix: args.suffix,
    };
    let settings = DefinitionSettings::from_config(config, options.suffix.clone());

    let report = IndexDeployer::new(service, settings)
        .deploy(&options)
        .await
        .with_context(|| format!("failed to deploy {}", options.index_type))?;

    for name in &report.deleted {
        println!("deleted {name}");
    }
    for name in &report.created {
        println!("created {name}");
    }
    Ok(())
}

/// Returns the number of entities written.
pub async fn dictionary(config: &Config, args: DictionaryArgs) -> Result<usize> {
    let engine = config.text2sql.require_engine()?;
    let connector = create_connector(engine, config.text2sql.require_connection_string()?)
        .await
        .context("failed to connect to the database")?;

    let output_directory = args
        .output_dir
        .unwrap_or_else(|| config.text2sql.data_dictionary_dir.clone());
    let options = CreatorOptions {
        entities: args.entities,
        excluded_entities: args.excluded_entities,
        excluded_schemas: args.excluded_schemas,
        single_file: args.single_file,
        output_directory: Some(output_directory.clone()),
    };

    let mut creator = DataDictionaryCreator::new(connector, options)?;
    let entities = creator.create_data_dictionary().await?;
    info!(
        entities = entities.len(),
        "Data dictionary written to {}",
        output_directory.display()
    );
    Ok(entities.len())
}

pub async fn upload(config: &Config, args: UploadArgs) -> Result<usize> {
    let input_dir = args
        .input_dir
        .unwrap_or_else(|| config.text2sql.data_dictionary_dir.clone());
    let uploader = BlobUploader::from_config(&config.storage).context("blob storage not configured")?;
    let uploaded = uploader.upload_dictionary(&input_dir).await?;
    println!("uploaded {uploaded} files from {}", input_dir.display());
    Ok(uploaded)
}

pub async fn ask(config: &Config, args: AskArgs) -> Result<()> {
    let runner = Text2SqlRunner::from_config(config).await?;
    let outcome = runner.run(&args.thread_id, &args.question).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
