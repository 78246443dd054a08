//! Framework detection tests

use madahost::deploy::framework::{detect, PROFILES};

fn manifest(deps: &[&str], dev_deps: &[&str]) -> String {
    let to_map = |names: &[&str]| {
        names
            .iter()
            .map(|n| (n.to_string(), serde_json::json!("*")))
            .collect::<serde_json::Map<_, _>>()
    };
    serde_json::json!({
        "name": "site",
        "dependencies": to_map(deps),
        "devDependencies": to_map(dev_deps),
    })
    .to_string()
}

#[test]
fn test_detects_each_framework() {
    let cases = [
        (manifest(&["next", "react"], &[]), "nextjs", "out"),
        (manifest(&["nuxt"], &[]), "nuxt", ".output/public"),
        (manifest(&["gatsby", "react"], &[]), "gatsby", "public"),
        (manifest(&[], &["@sveltejs/kit", "svelte", "vite"]), "sveltekit", "build"),
        (manifest(&["astro"], &[]), "astro", "dist"),
        (manifest(&["@angular/core"], &[]), "angular", "dist"),
        (manifest(&["vue"], &["vite"]), "vue", "dist"),
        (manifest(&["react", "react-scripts"], &[]), "react", "build"),
        (manifest(&["react"], &["vite"]), "react", "dist"),
        (manifest(&[], &["vite"]), "vite", "dist"),
    ];

    for (doc, framework, output) in cases {
        let detection = detect(&doc);
        assert_eq!(detection.framework, Some(framework), "{}", doc);
        assert_eq!(detection.output_directory(), output, "{}", doc);
    }
}

#[test]
fn test_no_dependencies_is_generic() {
    let detection = detect(&manifest(&["lodash"], &["typescript"]));
    assert_eq!(detection.framework, None);
    assert_eq!(detection.build_command(), "npm run build");
}

#[test]
fn test_non_object_manifest_is_generic() {
    assert_eq!(detect("[]").framework, None);
    assert_eq!(detect("").framework, None);
}

#[test]
fn test_profiles_have_commands() {
    for profile in PROFILES {
        assert!(!profile.install_command.is_empty(), "{}", profile.name);
        assert!(!profile.build_command.is_empty(), "{}", profile.name);
        assert!(!profile.output_directory.is_empty(), "{}", profile.name);
    }
}
