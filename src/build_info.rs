//! Build-time information
//!
//! Metadata captured at compile time by the build script: git commit, build
//! timestamp, cargo configuration and compiler version.

/// Build timestamp (when the binary was compiled)
pub const BUILD_TIMESTAMP: &str = env!("VERGEN_BUILD_TIMESTAMP");

/// Cargo optimization level (0, 1, 2, 3, s, z)
pub const CARGO_OPT_LEVEL: &str = env!("VERGEN_CARGO_OPT_LEVEL");

/// Target triple (e.g., x86_64-unknown-linux-gnu)
pub const CARGO_TARGET_TRIPLE: &str = env!("VERGEN_CARGO_TARGET_TRIPLE");

/// Rust compiler version (e.g., 1.85.0)
pub const RUSTC_SEMVER: &str = env!("VERGEN_RUSTC_SEMVER");

/// Rust channel (stable, beta, or nightly)
pub const RUSTC_CHANNEL: &str = env!("VERGEN_RUSTC_CHANNEL");

/// Git commit the binary was built from, if git was available
pub const GIT_SHA: Option<&str> = option_env!("VERGEN_GIT_SHA");

/// Returns `{crate_version} ({target_triple}-opt{opt_level})`
pub fn version_string() -> String {
    format!(
        "{} ({}-opt{})",
        env!("CARGO_PKG_VERSION"),
        CARGO_TARGET_TRIPLE,
        CARGO_OPT_LEVEL
    )
}

/// Multi-line build summary printed by `--build-info`
pub fn detailed_info() -> String {
    format!(
        "worker-health {}\nCommit: {}\nBuilt: {}\nTarget: {}\nOptimization: {}\nRustc: {} ({})",
        env!("CARGO_PKG_VERSION"),
        GIT_SHA.unwrap_or("unknown"),
        BUILD_TIMESTAMP,
        CARGO_TARGET_TRIPLE,
        CARGO_OPT_LEVEL,
        RUSTC_SEMVER,
        RUSTC_CHANNEL
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_string_mentions_target() {
        let version = version_string();
        assert!(version.starts_with(env!("CARGO_PKG_VERSION")));
        assert!(version.contains(CARGO_TARGET_TRIPLE));
        assert!(detailed_info().contains(RUSTC_SEMVER));
    }
}
