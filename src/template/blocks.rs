//! The five blocks a bootstrap script is made of.
//!
//! Each block is a pure function of the plan: [`BlockKind::applies`] decides
//! inclusion and [`BlockKind::context`] produces the template data. All values
//! reaching the script are shell-quoted here, templates never quote.

use crate::plan::BootstrapPlan;
use crate::types::settings::BootstrapSettings;
use serde::Serialize;
use serde_json::{json, Value};
use shell_words::quote;
use std::fmt;

use super::generator::GeneratorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BlockKind {
    Header,
    Unpack,
    Environment,
    Retrieval,
    Execution,
}

impl BlockKind {
    /// Rendering order of the script.
    pub const ORDER: [BlockKind; 5] = [
        BlockKind::Header,
        BlockKind::Unpack,
        BlockKind::Environment,
        BlockKind::Retrieval,
        BlockKind::Execution,
    ];

    pub fn template_name(&self) -> &'static str {
        match self {
            BlockKind::Header => "header",
            BlockKind::Unpack => "unpack",
            BlockKind::Environment => "environment",
            BlockKind::Retrieval => "retrieval",
            BlockKind::Execution => "execution",
        }
    }

    pub(crate) fn template_source(&self) -> &'static str {
        match self {
            BlockKind::Header => include_str!("../templates/bootstrap/header.sh.hbs"),
            BlockKind::Unpack => include_str!("../templates/bootstrap/unpack.sh.hbs"),
            BlockKind::Environment => include_str!("../templates/bootstrap/environment.sh.hbs"),
            BlockKind::Retrieval => include_str!("../templates/bootstrap/retrieval.sh.hbs"),
            BlockKind::Execution => include_str!("../templates/bootstrap/execution.sh.hbs"),
        }
    }

    pub fn applies(&self, plan: &BootstrapPlan) -> bool {
        match self {
            BlockKind::Header | BlockKind::Execution => true,
            BlockKind::Unpack => !plan.payload.is_empty(),
            BlockKind::Environment => !plan.env.is_empty() || plan.has_proxy(),
            BlockKind::Retrieval => !plan.locations.is_empty(),
        }
    }

    pub fn context(&self, plan: &BootstrapPlan) -> Result<Value, GeneratorError> {
        let settings = &plan.settings;
        let context = match self {
            BlockKind::Header => json!({
                "version": env!("CARGO_PKG_VERSION"),
                "interpreter": quote(settings.interpreter.as_deref().unwrap_or("")),
                "interpreter_candidates": BootstrapSettings::interpreter_candidates()
                    .iter()
                    .map(|c| quote(c).into_owned())
                    .collect::<Vec<_>>(),
                "exec_dir": quote(plan.exec_dir.as_deref().unwrap_or("")),
                "workdir_prefix": quote(&settings.workdir_prefix),
                "workdir_suffix": quote(&settings.workdir_suffix),
            }),
            BlockKind::Unpack => json!({
                "entries": plan
                    .payload
                    .iter()
                    .map(|entry| json!({
                        "name": quote(&entry.name),
                        "token": entry.token,
                        "failure": quote(&format!("Failed to unpack payload file '{}'", entry.name)),
                    }))
                    .collect::<Vec<_>>(),
            }),
            BlockKind::Environment => json!({
                "vars": plan
                    .env
                    .iter()
                    .map(|(name, value)| json!({ "name": name, "value": quote(value) }))
                    .collect::<Vec<_>>(),
                "proxy_env": if plan.has_proxy() { settings.proxy_env.as_str() } else { "" },
            }),
            BlockKind::Retrieval => {
                let layout = &settings.layout;
                let summary: Vec<String> = plan.locations.iter().map(|l| l.to_string()).collect();
                json!({
                    "summary": quote(&format!("Getting the pilot files from {}", summary.join(","))),
                    "locations": summary.iter().map(|l| quote(l).into_owned()).collect::<Vec<_>>(),
                    "timeout": settings.fetch_timeout_secs,
                    "curl_flags": if settings.validate_certs { "" } else { "--insecure " },
                    "manifest": quote(&layout.manifest),
                    "descriptor": quote(&layout.descriptor),
                    "archive": quote(&layout.archive),
                })
            }
            BlockKind::Execution => {
                let words = plan
                    .option_words()
                    .map_err(|e| GeneratorError::InvalidOptions(format!("{}: {e}", plan.options)))?;
                json!({
                    "stamp_env": settings.stamp_env,
                    "args": words.iter().map(|w| quote(w).into_owned()).collect::<Vec<_>>(),
                    "entry_point": quote(&settings.entry_point),
                    "launch_message": quote(&format!("{} will be called with: ", settings.entry_point)),
                })
            }
        };
        Ok(context)
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.template_name())
    }
}

/// One rendered fragment of the script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptBlock {
    pub kind: BlockKind,
    pub text: String,
}
