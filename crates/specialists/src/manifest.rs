//! On-disk shape of a specialist manifest: one `specialist.toml` per
//! directory under the specialists root, deserialized straight into
//! `ck_domain::model::SpecialistDescriptor`.

use ck_domain::model::SpecialistDescriptor;

/// Validates a specialist name: `^[a-z0-9]+(-[a-z0-9]+)*$`.
pub fn is_valid_specialist_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    let mut expect_alnum = true;
    for ch in name.chars() {
        if expect_alnum {
            if !ch.is_ascii_lowercase() && !ch.is_ascii_digit() {
                return false;
            }
            expect_alnum = false;
        } else if ch == '-' {
            expect_alnum = true;
        } else if !ch.is_ascii_lowercase() && !ch.is_ascii_digit() {
            return false;
        }
    }
    !expect_alnum || name.len() == 1
}

pub fn parse(content: &str) -> Result<SpecialistDescriptor, toml::de::Error> {
    toml::from_str(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_hyphenated_lowercase() {
        assert!(is_valid_specialist_name("billing-team"));
        assert!(!is_valid_specialist_name("Billing"));
        assert!(!is_valid_specialist_name("-billing"));
        assert!(!is_valid_specialist_name(""));
    }

    #[test]
    fn parses_minimal_manifest() {
        let toml = r#"
            name = "billing-team"
            kind = "team"
            capabilities = ["invoices", "refunds"]
        "#;
        let descriptor = parse(toml).unwrap();
        assert_eq!(descriptor.name, "billing-team");
        assert_eq!(descriptor.capabilities, vec!["invoices", "refunds"]);
    }
}
