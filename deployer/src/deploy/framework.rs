//! Framework detection from `package.json`

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

/// Install/build/output defaults for a framework
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameworkProfile {
    /// Label persisted on the project
    pub name: &'static str,
    /// Any of these dependency names selects the profile
    pub requires: &'static [&'static str],
    pub install_command: &'static str,
    pub build_command: &'static str,
    pub output_directory: &'static str,
    /// Build-time environment overlay
    pub env: &'static [(&'static str, &'static str)],
}

/// Profile used when nothing matches
pub const GENERIC: FrameworkProfile = FrameworkProfile {
    name: "generic",
    requires: &[],
    install_command: "npm install",
    build_command: "npm run build",
    output_directory: "dist",
    env: &[],
};

/// Ordered rule table; first match wins. Meta-frameworks come before the
/// UI library they build on.
pub static PROFILES: &[FrameworkProfile] = &[
    FrameworkProfile {
        name: "nextjs",
        requires: &["next"],
        install_command: "npm install",
        build_command: "npm run build",
        output_directory: "out",
        env: &[("NEXT_TELEMETRY_DISABLED", "1")],
    },
    FrameworkProfile {
        name: "nuxt",
        requires: &["nuxt", "nuxt3"],
        install_command: "npm install",
        build_command: "npm run generate",
        output_directory: ".output/public",
        env: &[("NUXT_TELEMETRY_DISABLED", "1")],
    },
    FrameworkProfile {
        name: "gatsby",
        requires: &["gatsby"],
        install_command: "npm install",
        build_command: "npm run build",
        output_directory: "public",
        env: &[("GATSBY_TELEMETRY_DISABLED", "1")],
    },
    FrameworkProfile {
        name: "sveltekit",
        requires: &["@sveltejs/kit"],
        install_command: "npm install",
        build_command: "npm run build",
        output_directory: "build",
        env: &[],
    },
    FrameworkProfile {
        name: "astro",
        requires: &["astro"],
        install_command: "npm install",
        build_command: "npm run build",
        output_directory: "dist",
        env: &[("ASTRO_TELEMETRY_DISABLED", "1")],
    },
    FrameworkProfile {
        name: "angular",
        requires: &["@angular/core"],
        install_command: "npm install",
        build_command: "npm run build",
        output_directory: "dist",
        env: &[("NG_CLI_ANALYTICS", "false")],
    },
    FrameworkProfile {
        name: "vue",
        requires: &["vue"],
        install_command: "npm install",
        build_command: "npm run build",
        output_directory: "dist",
        env: &[],
    },
    FrameworkProfile {
        name: "svelte",
        requires: &["svelte"],
        install_command: "npm install",
        build_command: "npm run build",
        output_directory: "dist",
        env: &[],
    },
    FrameworkProfile {
        name: "react",
        requires: &["react-scripts"],
        install_command: "npm install",
        build_command: "npm run build",
        output_directory: "build",
        env: &[("CI", "false")],
    },
    FrameworkProfile {
        name: "react",
        requires: &["react"],
        install_command: "npm install",
        build_command: "npm run build",
        output_directory: "dist",
        env: &[],
    },
    FrameworkProfile {
        name: "vite",
        requires: &["vite"],
        install_command: "npm install",
        build_command: "npm run build",
        output_directory: "dist",
        env: &[],
    },
];

/// Result of classifying a manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    /// `None` when no rule matched
    pub framework: Option<&'static str>,
    pub profile: &'static FrameworkProfile,
}

impl Detection {
    fn generic() -> Self {
        Self {
            framework: None,
            profile: &GENERIC,
        }
    }

    pub fn install_command(&self) -> &'static str {
        self.profile.install_command
    }

    pub fn build_command(&self) -> &'static str {
        self.profile.build_command
    }

    pub fn output_directory(&self) -> &'static str {
        self.profile.output_directory
    }

    pub fn env(&self) -> HashMap<String, String> {
        self.profile
            .env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageManifest {
    #[serde(default)]
    dependencies: HashMap<String, Value>,
    #[serde(default)]
    dev_dependencies: HashMap<String, Value>,
}

impl PackageManifest {
    fn has(&self, name: &str) -> bool {
        self.dependencies.contains_key(name) || self.dev_dependencies.contains_key(name)
    }
}

/// Classify a `package.json` document. Malformed input is "no match".
pub fn detect(manifest: &str) -> Detection {
    let Ok(manifest) = serde_json::from_str::<PackageManifest>(manifest) else {
        return Detection::generic();
    };

    PROFILES
        .iter()
        .find(|profile| profile.requires.iter().any(|dep| manifest.has(dep)))
        .map(|profile| Detection {
            framework: Some(profile.name),
            profile,
        })
        .unwrap_or_else(Detection::generic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_framework_wins_over_library() {
        let detection = detect(r#"{"dependencies":{"react":"^18","next":"14.0.0"}}"#);
        assert_eq!(detection.framework, Some("nextjs"));
        assert_eq!(detection.output_directory(), "out");
        assert_eq!(detection.env().get("NEXT_TELEMETRY_DISABLED").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_dev_dependencies_count() {
        let detection = detect(r#"{"devDependencies":{"vite":"^5"}}"#);
        assert_eq!(detection.framework, Some("vite"));
    }

    #[test]
    fn test_malformed_manifest_is_generic() {
        let detection = detect("{ not json");
        assert_eq!(detection.framework, None);
        assert_eq!(detection.install_command(), "npm install");
        assert_eq!(detection.build_command(), "npm run build");
        assert_eq!(detection.output_directory(), "dist");
    }

    #[test]
    fn test_detect_is_pure() {
        let manifest = r#"{"dependencies":{"vue":"^3"},"devDependencies":{"nuxt":"^3"}}"#;
        assert_eq!(detect(manifest), detect(manifest));
        assert_eq!(detect(manifest).framework, Some("nuxt"));
    }
}
