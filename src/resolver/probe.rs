use super::{Fallback, Resolve, ResolveContext, ResolvedTarget, ShimResolver};
use crate::error::ResolveError;
use crate::specifier::is_explicit_directory;

/// Extensions tried, in order, for extensionless and directory-index specifiers.
pub const EXTENSIONS: &[&str] = &[".js", ".json", ".ts", ".tsx", ".jsx"];

impl<R: Resolve> ShimResolver<R> {
    /// Retry `specifier` with each of [`EXTENSIONS`] appended.
    ///
    /// On total failure the first attempt's error is returned, labeled with
    /// `specifier` rather than the suffixed candidate. An error outside the
    /// not-found family stops probing immediately.
    pub(crate) fn probe_extensions(
        &self,
        specifier: &str,
        context: &ResolveContext,
    ) -> Result<ResolvedTarget, ResolveError> {
        let mut first_error: Option<ResolveError> = None;

        for ext in EXTENSIONS {
            let candidate = format!("{}{}", specifier, ext);
            match self.resolve_with(&candidate, context, Fallback::Nested) {
                Ok(target) => return Ok(target),
                Err(err) if err.is_recoverable() => {
                    if first_error.is_none() {
                        first_error = Some(err.with_specifier(specifier));
                    }
                }
                Err(err) => return Err(err),
            }
        }

        Err(first_error
            .unwrap_or_else(|| ResolveError::not_found(specifier, context.parent_url.as_ref())))
    }

    /// Resolve a directory through its index file.
    ///
    /// `dir/` is an explicit request and only ever tries `dir/index.*`.
    /// `dir` (which the host refused as a directory import) tries
    /// `dir/index.*` and then `dir.*`. The error names `specifier`, never the
    /// `/index` candidate.
    pub(crate) fn probe_directory(
        &self,
        specifier: &str,
        context: &ResolveContext,
    ) -> Result<ResolvedTarget, ResolveError> {
        let explicit = is_explicit_directory(specifier);
        let index = if explicit {
            format!("{}index", specifier)
        } else {
            format!("{}/index", specifier)
        };

        let err = match self.probe_extensions(&index, context) {
            Ok(target) => return Ok(target),
            Err(err) if !err.is_recoverable() => return Err(err),
            Err(err) => err,
        };

        if !explicit {
            match self.probe_extensions(specifier, context) {
                Ok(target) => return Ok(target),
                Err(nested) if !nested.is_recoverable() => return Err(nested),
                Err(_) => {}
            }
        }

        Err(err.with_specifier(specifier))
    }
}
