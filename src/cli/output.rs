use serde::Serialize;

use super::commands::{ConfigReport, LoadReport};
use super::OutputFormat;
use crate::resolver::ResolvedTarget;

fn format_optional(format: Option<impl std::fmt::Display>) -> String {
    format.map_or_else(|| "unknown".to_string(), |f| f.to_string())
}

/// Format a resolution result.
pub fn format_resolved(target: &ResolvedTarget, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Text => format!("{} ({})", target.url, format_optional(target.format)),
        _ => format_json(target, format),
    }
}

/// Format a loaded module. Text output is the final source itself.
pub fn format_loaded(report: &LoadReport, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Text => match &report.source {
            Some(source) => source.clone(),
            None => format!(
                "{} ({}): source provided by the host",
                report.url,
                format_optional(report.format)
            ),
        },
        _ => format_json(report, format),
    }
}

/// Format the applicable project configuration, if any.
pub fn format_config(report: Option<&ConfigReport>, format: &OutputFormat) -> String {
    match (report, format) {
        (None, OutputFormat::Text) => "No tsconfig.json applies".to_string(),
        (Some(report), OutputFormat::Text) => {
            let mut output = format!("Config:     {}\n", report.path.display());
            if let Some(base_url) = &report.base_url {
                output.push_str(&format!("Base URL:   {}\n", base_url.display()));
            }
            output.push_str(&format!(
                "In scope:   {}\n",
                if report.includes { "yes" } else { "no" }
            ));
            if !report.paths.is_empty() {
                output.push_str("Paths:\n");
                for mapping in &report.paths {
                    output.push_str(&format!(
                        "  {:<24} -> {}\n",
                        mapping.pattern,
                        mapping.substitutions.join(", ")
                    ));
                }
            }
            if !report.references.is_empty() {
                output.push_str("References:\n");
                for reference in &report.references {
                    output.push_str(&format!("  {}\n", reference.display()));
                }
            }
            output.trim_end().to_string()
        }
        (report, _) => format_json(&report, format),
    }
}

/// Format any serializable value as JSON.
pub fn format_json<T: Serialize>(value: &T, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Compact => serde_json::to_string(value).unwrap_or_default(),
        OutputFormat::Json | OutputFormat::Text => {
            serde_json::to_string_pretty(value).unwrap_or_default()
        }
    }
}
