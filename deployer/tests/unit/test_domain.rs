//! Subdomain derivation tests

use madahost::deploy::domain::{derive_domain, new_disambiguator, slugify};

#[test]
fn test_domain_shape() {
    let domain = derive_domain("My Portfolio", &new_disambiguator(), "madahost.app");
    let (label, base) = domain.split_once('.').unwrap();

    assert_eq!(base, "madahost.app");
    assert!(label.starts_with("my-portfolio-"));
    assert_eq!(label.len(), "my-portfolio-".len() + 6);
    assert!(label.len() <= 63);
}

#[test]
fn test_disambiguators_differ() {
    assert_ne!(new_disambiguator(), new_disambiguator());
}

#[test]
fn test_long_names_are_truncated() {
    let name = "a".repeat(200);
    let label = format!("{}-abcdef", slugify(&name));
    assert!(label.len() <= 63);
}
