//! Validates a Composition against the CRDs of the types it refers to and
//! prints every problem found.
use std::path::{Path, PathBuf};

use clap::Parser;
use composition_validation::{
    crd::Composition,
    lookup::{self, SchemaMap},
    mode::ValidationMode,
    render::BaseRenderer,
    validator::CompositionValidator,
};
use kube::ResourceExt;
use snafu::{ResultExt, Snafu, ensure};

mod logging;

const APP_NAME: &str = "composition-validate";
const LOG_ENV: &str = "COMPOSITION_VALIDATE_LOG";

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to initialize logging"))]
    InitLogging { source: logging::Error },

    #[snafu(display("failed to read {path:?}"))]
    ReadFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to parse Composition from {path:?}"))]
    ParseComposition {
        source: serde_yaml::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to read CRDs from {path:?}"))]
    ParseCrds {
        source: lookup::LookupError,
        path: PathBuf,
    },

    #[snafu(display("failed to create Kubernetes client"))]
    CreateClient { source: kube::Error },

    #[snafu(display("failed to fetch CRDs from the cluster"))]
    FetchCrds { source: lookup::FetchError },

    #[snafu(display("composition {name:?} is invalid ({count} problems found)"))]
    Invalid { name: String, count: usize },
}

/// Validates a Composition against the CRDs of its composite and composed
/// resources.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// The YAML file containing the Composition.
    #[arg(long, short, env = "COMPOSITION_VALIDATE_COMPOSITION")]
    composition: PathBuf,

    /// YAML files containing CRDs, multiple documents per file are supported.
    #[arg(
        long = "crds",
        env = "COMPOSITION_VALIDATE_CRDS",
        num_args = 1..,
        value_delimiter = ','
    )]
    crds: Vec<PathBuf>,

    /// Fetch the CRDs referenced by the Composition from the current cluster.
    #[arg(long, env = "COMPOSITION_VALIDATE_FROM_CLUSTER")]
    from_cluster: bool,

    /// Overrides the validation mode annotated on the Composition.
    #[arg(long, env = "COMPOSITION_VALIDATE_MODE")]
    mode: Option<ValidationMode>,

    /// Also check the bases of the resource templates against their schema.
    #[arg(long, env = "COMPOSITION_VALIDATE_RENDER")]
    render: bool,
}

async fn read_file(path: &Path) -> Result<String, Error> {
    tokio::fs::read_to_string(path)
        .await
        .context(ReadFileSnafu { path })
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();
    logging::initialize_logging(LOG_ENV, APP_NAME).context(InitLoggingSnafu)?;

    let composition: Composition =
        serde_yaml::from_str(&read_file(&cli.composition).await?).context(
            ParseCompositionSnafu {
                path: &cli.composition,
            },
        )?;

    let mut schemas = SchemaMap::new();
    for path in &cli.crds {
        let crds = SchemaMap::from_yaml(&read_file(path).await?).context(ParseCrdsSnafu { path })?;
        schemas.extend(crds);
    }

    if cli.from_cluster {
        let client = kube::Client::try_default()
            .await
            .context(CreateClientSnafu)?;
        let fetched = lookup::fetch_schemas(client, &composition)
            .await
            .context(FetchCrdsSnafu)?;
        schemas.extend(fetched);
    }
    tracing::debug!(schemas = schemas.len(), "loaded schemas");

    let mut validator = CompositionValidator::default();
    if let Some(mode) = cli.mode {
        validator = validator.with_mode(mode);
    }
    if cli.render {
        validator = validator.with_renderer(BaseRenderer);
    }

    let result = validator.validate(&composition, &schemas);
    let errors = result.err().unwrap_or_default();
    for error in errors.iter() {
        println!("{error}");
    }

    ensure!(
        errors.is_empty(),
        InvalidSnafu {
            name: composition.name_any(),
            count: errors.len(),
        }
    );

    tracing::info!(composition.name = %composition.name_any(), "composition is valid");
    Ok(())
}
