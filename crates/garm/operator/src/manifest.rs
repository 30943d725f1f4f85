//! YAML manifests
//!
//! Declared resources are read from multi-document YAML files, one
//! resource per document, discriminated by `kind`. Objects without a
//! namespace land in `default`.

use crate::error::{OperatorError, OperatorResult};
use garm_store::{Store, StoreError};
use garm_types::{Enterprise, Image, ObjectMeta, Organization, Pool, Repository};
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_NAMESPACE: &str = "default";

/// One declared resource
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind")]
pub enum Manifest {
    Pool(Pool),
    Enterprise(Enterprise),
    Organization(Organization),
    Repository(Repository),
    Image(Image),
}

impl Manifest {
    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Manifest::Pool(p) => &mut p.metadata,
            Manifest::Enterprise(e) => &mut e.metadata,
            Manifest::Organization(o) => &mut o.metadata,
            Manifest::Repository(r) => &mut r.metadata,
            Manifest::Image(i) => &mut i.metadata,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Manifest::Pool(_) => "Pool",
            Manifest::Enterprise(_) => "Enterprise",
            Manifest::Organization(_) => "Organization",
            Manifest::Repository(_) => "Repository",
            Manifest::Image(_) => "Image",
        }
    }
}

/// Parse every document in `input`; `source_name` is used in errors
pub fn parse(input: &str, source_name: &str) -> OperatorResult<Vec<Manifest>> {
    let mut manifests = Vec::new();

    for (index, document) in serde_yaml::Deserializer::from_str(input).enumerate() {
        let error = |e: serde_yaml::Error| OperatorError::Manifest {
            source_name: source_name.to_string(),
            message: format!("document {}: {}", index + 1, e),
        };

        let value = serde_yaml::Value::deserialize(document).map_err(error)?;
        if value.is_null() {
            continue;
        }
        let mut manifest: Manifest = serde_yaml::from_value(value).map_err(error)?;

        let metadata = manifest.metadata_mut();
        if metadata.namespace.is_empty() {
            metadata.namespace = DEFAULT_NAMESPACE.to_string();
        }
        manifests.push(manifest);
    }

    Ok(manifests)
}

/// Load a YAML file, or every `.yaml`/`.yml` file of a directory in name order
pub fn load_path(path: &Path) -> OperatorResult<Vec<Manifest>> {
    if !path.is_dir() {
        let input = std::fs::read_to_string(path)?;
        return parse(&input, &path.display().to_string());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let file = entry?.path();
        let is_yaml = file
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e == "yaml" || e == "yml")
            .unwrap_or(false);
        if is_yaml {
            files.push(file);
        }
    }
    files.sort();

    let mut manifests = Vec::new();
    for file in files {
        manifests.extend(load_path(&file)?);
    }
    Ok(manifests)
}

/// Write manifests into the store; existing pools get their spec replaced
pub async fn apply(store: &dyn Store, manifests: Vec<Manifest>) -> OperatorResult<usize> {
    let count = manifests.len();

    for manifest in manifests {
        tracing::debug!(kind = manifest.kind(), "Applying manifest");
        match manifest {
            Manifest::Pool(pool) => match store.create_pool(pool.clone()).await {
                Ok(()) => {}
                Err(StoreError::Conflict { .. }) => {
                    store.update_pool(&pool).await?;
                }
                Err(e) => return Err(e.into()),
            },
            Manifest::Enterprise(e) => store.put_enterprise(e).await?,
            Manifest::Organization(o) => store.put_organization(o).await?,
            Manifest::Repository(r) => store.put_repository(r).await?,
            Manifest::Image(i) => store.put_image(i).await?,
        }
    }

    Ok(count)
}
