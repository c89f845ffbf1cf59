use semver::{Version, VersionReq};
use serde::Serialize;

/// Features of the host runtime that change how the hooks behave.
///
/// Computed once from the host version so the resolution and load paths
/// only ever test flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HostCapabilities {
    /// `node:`-prefixed builtin specifiers are understood by the host.
    pub supports_node_prefix: bool,
    /// The host calls the single `load` hook instead of `getFormat`/`transformSource`.
    pub supports_load_hook: bool,
    /// Inline `sourceMappingURL` data comments are honored.
    pub supports_inline_source_maps: bool,
}

impl Default for HostCapabilities {
    fn default() -> Self {
        HostCapabilities {
            supports_node_prefix: true,
            supports_load_hook: true,
            supports_inline_source_maps: true,
        }
    }
}

impl HostCapabilities {
    pub fn for_version(version: &Version) -> Self {
        HostCapabilities {
            supports_node_prefix: matches(">=14.13.1", version)
                || matches(">=12.20.0, <13.0.0", version),
            supports_load_hook: matches(">=16.12.0", version),
            supports_inline_source_maps: matches(">=16.6.0", version),
        }
    }

    /// Parse a host version string such as `v16.12.0` or `14.13.1`.
    pub fn parse_version(raw: &str) -> Result<Version, semver::Error> {
        Version::parse(raw.trim().trim_start_matches('v'))
    }
}

fn matches(requirement: &str, version: &Version) -> bool {
    // Requirements are literals above; a parse failure means the flag stays off.
    VersionReq::parse(requirement)
        .map(|req| req.matches(version))
        .unwrap_or(false)
}
