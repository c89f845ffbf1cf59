//! The `getFormat`/`transformSource` hook pair used by hosts that predate
//! the single load hook.

use tracing::trace;
use url::Url;

use super::{Load, ShimLoader};
use crate::error::LoadError;
use crate::format::{self, ModuleFormat};

impl<L: Load> ShimLoader<L> {
    /// Decide the format of `url` without reading it. JSON is reported as
    /// module code because [`Self::transform_source`] wraps it.
    pub fn get_format(&self, url: &Url) -> Result<ModuleFormat, LoadError> {
        if url.scheme() != "file" {
            return Ok(ModuleFormat::Dynamic);
        }
        if format::is_json_path(url.path()) || format::is_source_path(url.path()) {
            return Ok(ModuleFormat::Module);
        }
        if let Some(format) = format::classify(url.path()) {
            return Ok(format);
        }
        match url.to_file_path() {
            Ok(path) => Ok(self.session.packages.package_type(&path)?),
            Err(()) => Err(LoadError::UnsupportedUrl { url: url.clone() }),
        }
    }

    /// Rewrite already-read source for `url`.
    pub fn transform_source(
        &self,
        source: &str,
        url: &Url,
        format: ModuleFormat,
    ) -> Result<String, LoadError> {
        self.report(url);

        if format::is_json_path(url.path()) || format::is_source_path(url.path()) {
            return self.transpile(url, source);
        }
        if format == ModuleFormat::Module {
            if let Some(code) = self.rewrite_module(url, source)? {
                return Ok(code);
            }
        }
        trace!(url = %url, %format, "source passed through");
        Ok(source.to_string())
    }
}
