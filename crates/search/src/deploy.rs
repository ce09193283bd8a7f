use tracing::info;

use crate::definitions::{
    data_source_definition, index_definition, indexer_definition, skillset_definition,
    DefinitionSettings,
};
use crate::error::SearchError;
use crate::index::IndexType;
use crate::service::SearchService;

#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub index_type: IndexType,
    pub rebuild: bool,
    pub suffix: Option<String>,
    /// Source blobs hold one JSON array instead of one document per file.
    pub single_file: bool,
    pub enable_cache_indexer: bool,
}

/// What a deployment touched, in order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeployReport {
    pub deleted: Vec<String>,
    pub created: Vec<String>,
}

/// Creates or updates the index and its indexing pipeline.
pub struct IndexDeployer {
    service: SearchService,
    settings: DefinitionSettings,
}

impl IndexDeployer {
    pub fn new(service: SearchService, settings: DefinitionSettings) -> Self {
        Self { service, settings }
    }

    pub async fn deploy(&self, options: &DeployOptions) -> Result<DeployReport, SearchError> {
        let index_type = options.index_type;
        let suffix = options.suffix.as_deref();
        let mut report = DeployReport::default();

        let settings = DefinitionSettings {
            suffix: options.suffix.clone(),
            ..self.settings.clone()
        };

        if options.rebuild {
            let indexer = index_type.indexer_name(suffix);
            let index = index_type.index_name(suffix);
            info!("Rebuilding: deleting {} and {}", indexer, index);
            self.service.delete(&format!("indexers/{indexer}")).await?;
            self.service.delete(&format!("indexes/{index}")).await?;
            report.deleted.extend([indexer, index]);
        }

        let index = index_definition(index_type, &settings)?;
        let name = index_type.index_name(suffix);
        self.service.put(&format!("indexes/{name}"), &index).await?;
        info!("Index {} created or updated", name);
        report.created.push(name);

        if index_type == IndexType::QueryCache && !options.enable_cache_indexer {
            info!("Cache indexer disabled; query cache is filled at runtime");
            return Ok(report);
        }

        let data_source = data_source_definition(index_type, &settings)?;
        let name = index_type.data_source_name(suffix);
        self.service
            .put(&format!("datasources/{name}"), &data_source)
            .await?;
        info!("Data source {} created or updated", name);
        report.created.push(name);

        if let Some(skillset) = skillset_definition(index_type, &settings)? {
            let name = index_type.skillset_name(suffix);
            self.service.put(&format!("skillsets/{name}"), &skillset).await?;
            info!("Skillset {} created or updated", name);
            report.created.push(name);
        }

        let indexer = indexer_definition(index_type, &settings, options.single_file);
        let name = index_type.indexer_name(suffix);
        self.service.put(&format!("indexers/{name}"), &indexer).await?;
        info!("Indexer {} created or updated", name);
        report.created.push(name);

        Ok(report)
    }
}
