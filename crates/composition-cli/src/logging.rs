use std::{
    io::{Sink, sink},
    path::PathBuf,
};

use snafu::{ResultExt, Snafu};
use tracing::level_filters::LevelFilter;
use tracing_appender::rolling::{InitError, RollingFileAppender, RollingWriter};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{
        MakeWriter,
        writer::{EitherWriter, MakeWriterExt as _},
    },
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to initialize rolling file appender"))]
    InitRollingFileAppender { source: InitError },

    #[snafu(display("unable to set the global default subscriber"))]
    SetGlobalDefaultSubscriber { source: TryInitError },
}

/// Initializes `tracing` logging with the filter read from the environment
/// variable `env`, defaulting to INFO.
///
/// Log output is written to stderr, keeping stdout free for the validation
/// results. It can additionally be copied to a file by setting
/// `{env}_DIRECTORY` to a directory path. This file is rotated regularly.
pub fn initialize_logging(env: &str, app_name: &str) -> Result<(), Error> {
    let filter = EnvFilter::builder()
        .with_env_var(env)
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let file_appender_directory = std::env::var_os(format!("{env}_DIRECTORY")).map(PathBuf::from);
    let file_appender = file_appender_directory
        .as_deref()
        .map(|log_dir| {
            RollingFileAppender::builder()
                .filename_suffix(format!("{app_name}.log"))
                .max_log_files(6)
                .build(log_dir)
        })
        .transpose()
        .context(InitRollingFileAppenderSnafu)?;

    let fmt = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr.and(LogFile::from(file_appender)));
    Registry::default()
        .with(filter)
        .with(fmt)
        .try_init()
        .context(SetGlobalDefaultSubscriberSnafu)?;

    // Logging is only possible once the subscriber is installed
    match file_appender_directory {
        Some(dir) => tracing::info!(directory = %dir.display(), "file logging enabled"),
        None => tracing::debug!("file logging disabled, because no log directory set"),
    }

    Ok(())
}

/// Writes to the rolling log file if one is configured and discards the
/// output otherwise.
enum LogFile {
    Rolling(RollingFileAppender),
    Disabled,
}

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = EitherWriter<RollingWriter<'a>, Sink>;

    fn make_writer(&'a self) -> Self::Writer {
        match self {
            Self::Rolling(appender) => EitherWriter::A(appender.make_writer()),
            Self::Disabled => EitherWriter::B(sink()),
        }
    }
}

impl From<Option<RollingFileAppender>> for LogFile {
    fn from(appender: Option<RollingFileAppender>) -> Self {
        appender.map_or(Self::Disabled, Self::Rolling)
    }
}
