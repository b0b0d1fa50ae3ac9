use crate::plan::{BootstrapPlan, PlanError};
use crate::types::config::BootstrapConfig;
use handlebars::Handlebars;
use std::fmt;
use thiserror::Error;

use super::blocks::{BlockKind, ScriptBlock};

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("Plan compilation failed: {0}")]
    Plan(#[from] PlanError),
    #[error("Invalid workload options: {0}")]
    InvalidOptions(String),
    #[error("Template error: {0}")]
    Template(#[from] Box<handlebars::TemplateError>),
    #[error("Render error: {0}")]
    Render(#[from] Box<handlebars::RenderError>),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Final script text. Two scripts are equal exactly when their text is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GeneratedScript {
    content: String,
}

impl GeneratedScript {
    pub fn as_str(&self) -> &str {
        &self.content
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.content.as_bytes()
    }

    pub fn into_string(self) -> String {
        self.content
    }
}

impl fmt::Display for GeneratedScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

/// Renders bootstrap plans into bash scripts, one template per block.
pub struct ScriptAssembler {
    handlebars: Handlebars<'static>,
}

impl ScriptAssembler {
    pub fn new() -> Result<Self, GeneratorError> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_escape_fn(handlebars::no_escape);

        for kind in BlockKind::ORDER {
            handlebars
                .register_template_string(kind.template_name(), kind.template_source())
                .map_err(Box::new)?;
        }

        Ok(Self { handlebars })
    }

    pub fn render_block(
        &self,
        kind: BlockKind,
        plan: &BootstrapPlan,
    ) -> Result<ScriptBlock, GeneratorError> {
        let context = kind.context(plan)?;
        let text = self
            .handlebars
            .render(kind.template_name(), &context)
            .map_err(Box::new)?;
        Ok(ScriptBlock { kind, text })
    }

    /// Blocks that apply to this plan, in script order.
    pub fn blocks(&self, plan: &BootstrapPlan) -> Result<Vec<ScriptBlock>, GeneratorError> {
        BlockKind::ORDER
            .iter()
            .filter(|kind| kind.applies(plan))
            .map(|kind| self.render_block(*kind, plan))
            .collect()
    }

    pub fn assemble(&self, plan: &BootstrapPlan) -> Result<GeneratedScript, GeneratorError> {
        let blocks = self.blocks(plan)?;
        tracing::debug!(
            "Assembled script from blocks: {}",
            blocks
                .iter()
                .map(|b| b.kind.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let content = blocks
            .into_iter()
            .map(|b| b.text)
            .collect::<Vec<_>>()
            .join("\n");
        Ok(GeneratedScript { content })
    }

    /// Compiles and renders a configuration in one step.
    pub fn generate(&self, config: &BootstrapConfig) -> Result<GeneratedScript, GeneratorError> {
        let plan = BootstrapPlan::compile(config)?;
        self.assemble(&plan)
    }
}
