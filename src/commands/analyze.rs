//! btsnoop capture analysis

use std::path::Path;

use fanlight::btsnoop::{run_btsnoop_analysis, OutputFormat};

use super::CommandResult;
use crate::cli::AnalyzeOutputFormat;

impl From<AnalyzeOutputFormat> for OutputFormat {
    fn from(format: AnalyzeOutputFormat) -> Self {
        match format {
            AnalyzeOutputFormat::Text => OutputFormat::Text,
            AnalyzeOutputFormat::Json => OutputFormat::Json,
        }
    }
}

pub fn analyze(
    file: &Path,
    format: AnalyzeOutputFormat,
    filter: Option<&str>,
    stats: bool,
    output: Option<&Path>,
) -> CommandResult {
    run_btsnoop_analysis(file, format.into(), filter, stats, output)?;
    Ok(())
}
