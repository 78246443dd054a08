//! Subdomain assignment

/// Longest slug kept from a project name, so the full label stays under 63 chars
const MAX_SLUG_LEN: usize = 48;

/// Lowercase DNS-label slug of a project name: `[a-z0-9-]`, no leading,
/// trailing or doubled dashes. Falls back to `site` when nothing survives.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut dash = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            dash = false;
        } else if !dash && !slug.is_empty() {
            slug.push('-');
            dash = true;
        }
    }

    slug.truncate(MAX_SLUG_LEN);
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "site".to_string()
    } else {
        slug.to_string()
    }
}

/// Six random hex characters
pub fn new_disambiguator() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..6].to_string()
}

/// `<slug>-<disambiguator>.<base-domain>`
pub fn derive_domain(name: &str, disambiguator: &str, base_domain: &str) -> String {
    format!(
        "{}-{}.{}",
        slugify(name),
        disambiguator,
        base_domain.trim_matches('.')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("My Cool Site!"), "my-cool-site");
        assert_eq!(slugify("  --Docs__v2--  "), "docs-v2");
        assert_eq!(slugify("日本"), "site");
    }

    #[test]
    fn test_derive_domain_is_deterministic() {
        let a = derive_domain("Portfolio", "a1b2c3", "madahost.app");
        let b = derive_domain("Portfolio", "a1b2c3", ".madahost.app.");
        assert_eq!(a, "portfolio-a1b2c3.madahost.app");
        assert_eq!(a, b);
    }

    #[test]
    fn test_disambiguator_shape() {
        let d = new_disambiguator();
        assert_eq!(d.len(), 6);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
