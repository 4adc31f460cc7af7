//! Provides the schemas of the types a Composition refers to.
use std::collections::{HashMap, HashSet};

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{
    Api, Client, ResourceExt,
    api::ListParams,
    core::{GroupVersionKind, gvk::GroupVersion},
};
use serde::Deserialize;
use snafu::{ResultExt, Snafu};
use tracing::{debug, instrument};

use crate::{crd::Composition, schema::Schema};

#[derive(Debug, Snafu)]
pub enum LookupError {
    #[snafu(display("failed to convert schema of version {version:?} of CRD {crd_name:?}"))]
    ConvertSchema {
        source: crate::schema::SchemaError,
        crd_name: String,
        version: String,
    },

    #[snafu(display("failed to deserialize CRD from YAML"))]
    DeserializeCrd { source: serde_yaml::Error },
}

#[derive(Debug, Snafu)]
pub enum FetchError {
    #[snafu(display("failed to list CustomResourceDefinitions"))]
    ListCrds { source: kube::Error },

    #[snafu(display("failed to build schemas from fetched CRDs"))]
    BuildSchemas { source: LookupError },
}

/// Looks up the schema of a type.
pub trait SchemaLookup {
    /// Returns the schema of `gvk`, [`None`] if it is unknown.
    fn schema(&self, gvk: &GroupVersionKind) -> Option<&Schema>;
}

impl<T: SchemaLookup + ?Sized> SchemaLookup for &T {
    fn schema(&self, gvk: &GroupVersionKind) -> Option<&Schema> {
        (**self).schema(gvk)
    }
}

/// A [`SchemaLookup`] backed by an in-memory map.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchemaMap(HashMap<GroupVersionKind, Schema>);

impl SchemaLookup for SchemaMap {
    fn schema(&self, gvk: &GroupVersionKind) -> Option<&Schema> {
        self.0.get(gvk)
    }
}

impl SchemaMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, gvk: GroupVersionKind, schema: Schema) -> Option<Schema> {
        self.0.insert(gvk, schema)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Converts the schema of every served version of every CRD. Versions
    /// without a schema are left out.
    pub fn from_crds<'a>(
        crds: impl IntoIterator<Item = &'a CustomResourceDefinition>,
    ) -> Result<Self, LookupError> {
        let mut schemas = Self::new();

        for crd in crds {
            let spec = &crd.spec;
            for version in spec.versions.iter().filter(|version| version.served) {
                let Some(props) = version
                    .schema
                    .as_ref()
                    .and_then(|validation| validation.open_api_v3_schema.as_ref())
                else {
                    debug!(
                        crd.name = %crd.name_any(),
                        crd.version = %version.name,
                        "CRD version has no schema, skipping"
                    );
                    continue;
                };

                let schema = Schema::try_from(props).context(ConvertSchemaSnafu {
                    crd_name: crd.name_any(),
                    version: &version.name,
                })?;

                let gvk = GroupVersion::gv(&spec.group, &version.name).with_kind(&spec.names.kind);
                schemas.insert(gvk, schema);
            }
        }

        Ok(schemas)
    }

    /// Reads CRDs from a (possibly multi-document) YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, LookupError> {
        let crds = serde_yaml::Deserializer::from_str(yaml)
            .map(CustomResourceDefinition::deserialize)
            .collect::<Result<Vec<_>, _>>()
            .context(DeserializeCrdSnafu)?;

        Self::from_crds(&crds)
    }
}

impl Extend<(GroupVersionKind, Schema)> for SchemaMap {
    fn extend<T: IntoIterator<Item = (GroupVersionKind, Schema)>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

impl IntoIterator for SchemaMap {
    type IntoIter = std::collections::hash_map::IntoIter<GroupVersionKind, Schema>;
    type Item = (GroupVersionKind, Schema);

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<(GroupVersionKind, Schema)> for SchemaMap {
    fn from_iter<T: IntoIterator<Item = (GroupVersionKind, Schema)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Returns the group and kind of every type referenced by `composition`.
fn referenced_group_kinds(composition: &Composition) -> HashSet<(String, String)> {
    let composite = composition
        .spec
        .composite_type_ref
        .group_version_kind()
        .ok();
    let composed = composition
        .spec
        .resources
        .iter()
        .filter_map(|template| template.base_group_version_kind().ok());

    composite
        .into_iter()
        .chain(composed)
        .map(|gvk| (gvk.group, gvk.kind))
        .collect()
}

/// Fetches the schemas of all types referenced by `composition` from the
/// cluster `client` is connected to.
#[instrument(skip_all, fields(composition.name = %composition.name_any()))]
pub async fn fetch_schemas(
    client: Client,
    composition: &Composition,
) -> Result<SchemaMap, FetchError> {
    let referenced = referenced_group_kinds(composition);

    let crds = Api::<CustomResourceDefinition>::all(client)
        .list(&ListParams::default())
        .await
        .context(ListCrdsSnafu)?;

    let relevant = crds.items.iter().filter(|crd| {
        referenced.contains(&(crd.spec.group.clone(), crd.spec.names.kind.clone()))
    });

    let schemas = SchemaMap::from_crds(relevant).context(BuildSchemasSnafu)?;
    debug!(schemas = schemas.len(), "fetched schemas");

    Ok(schemas)
}
