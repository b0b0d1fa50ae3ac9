//! Orders distribution bases into the candidate list the bootstrap walks.

use crate::types::location::LocationSpec;
use crate::types::settings::BootstrapSettings;
use std::path::Path;

/// Builds the prioritized retrieval list for one deployment.
pub struct LocationResolver<'a> {
    settings: &'a BootstrapSettings,
}

impl<'a> LocationResolver<'a> {
    pub fn new(settings: &'a BootstrapSettings) -> Self {
        Self { settings }
    }

    /// Project name derived from the workload options.
    ///
    /// `-l LHCb` yields `lhcbdirac`; without the flag the sentinel is used.
    pub fn project_name(&self, options: &str) -> String {
        let tokens: Vec<&str> = options.split_whitespace().collect();
        tokens
            .iter()
            .position(|t| *t == self.settings.project_flag)
            .and_then(|i| tokens.get(i + 1))
            .map(|vo| format!("{}{}", vo.to_lowercase(), self.settings.project_suffix))
            .unwrap_or_else(|| self.settings.project_sentinel.clone())
    }

    /// Remote bases as given, then each with the layout suffix, then the
    /// local cache roots as last resort. Without cache roots the configured
    /// default cache location, if any, is appended as written.
    pub fn resolve<R, L>(&self, remote: &[R], cache_roots: &[L], options: &str) -> Vec<LocationSpec>
    where
        R: AsRef<str>,
        L: AsRef<str>,
    {
        let suffix = &self.settings.layout.location_suffix;
        let bases: Vec<LocationSpec> = remote
            .iter()
            .map(|r| r.as_ref().trim())
            .filter(|r| !r.is_empty())
            .map(LocationSpec::parse)
            .collect();

        let mut resolved = bases.clone();
        resolved.extend(bases.iter().map(|b| b.join(suffix)));

        if !cache_roots.is_empty() {
            let project = self.project_name(options);
            resolved.extend(cache_roots.iter().map(|root| {
                let root = root.as_ref();
                let root = root.strip_prefix(crate::types::location::FILE_SCHEME).unwrap_or(root);
                LocationSpec::Local(Path::new(root).join(&project).join(suffix))
            }));
        } else if let Some(default) = self.settings.default_cache_location.as_deref() {
            let default = default.trim();
            if !default.is_empty() {
                resolved.push(LocationSpec::parse(default));
            }
        }

        tracing::debug!("Resolved {} candidate locations", resolved.len());
        resolved
    }
}
