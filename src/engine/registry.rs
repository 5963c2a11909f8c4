// * Source Registry
// * Read-only map from a human-readable key to a result URL template

use std::collections::HashSet;
use tracing::warn;
use url::Url;

use crate::config::constants::REG_TOKEN;
use crate::persistence::schema::{RegNo, SourceLink};

/// Source links in insertion order; keys are unique
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    links: Vec<SourceLink>,
}

impl SourceRegistry {
    /// Builds the registry, keeping the first link for any duplicated key
    pub fn new(links: impl IntoIterator<Item = SourceLink>) -> Self {
        let mut seen = HashSet::new();
        let links = links
            .into_iter()
            .filter(|link| {
                let fresh = seen.insert(link.key.clone());
                if !fresh {
                    warn!(key = %link.key, "Duplicate source key ignored");
                }
                fresh
            })
            .collect();
        Self { links }
    }

    pub fn all(&self) -> &[SourceLink] {
        &self.links
    }

    pub fn list_active(&self) -> Vec<&SourceLink> {
        self.links.iter().filter(|link| link.active).collect()
    }

    pub fn get(&self, key: &str) -> Option<&SourceLink> {
        self.links.iter().find(|link| link.key == key)
    }

    /// Template for a key; anything starting with "http" is already a template.
    /// Inactive links still resolve so old batches can be replayed.
    pub fn resolve_template(&self, key_or_template: &str) -> Option<String> {
        let candidate = key_or_template.trim();
        if candidate.is_empty() {
            return None;
        }
        if candidate.starts_with("http") {
            return Some(candidate.to_string());
        }
        self.get(candidate).map(|link| link.url_template.clone())
    }
}

/// Substitutes the decimal registration number for every `{REG}` token
pub fn build_target_url(template: &str, reg_no: RegNo) -> String {
    template.replace(REG_TOKEN, &reg_no.to_string())
}

/// Checks that the template yields an absolute http(s) URL
pub fn validate_template(template: &str) -> Result<Url, url::ParseError> {
    let url = Url::parse(&build_target_url(template, 0))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(url::ParseError::RelativeUrlWithoutBase),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SourceRegistry {
        SourceRegistry::new(vec![
            SourceLink::new("5th Sem", "https://results.example.edu/r5.aspx?Sem=V&RegNo={REG}", true),
            SourceLink::new("Old", "https://results.example.edu/old.aspx?RegNo={REG}", false),
            SourceLink::new("5th Sem", "https://elsewhere.example.edu/?reg={REG}", true),
        ])
    }

    #[test]
    fn test_duplicate_keys_keep_first() {
        let registry = registry();
        assert_eq!(registry.all().len(), 2);
        assert!(registry
            .resolve_template("5th Sem")
            .unwrap()
            .starts_with("https://results.example.edu/r5"));
    }

    #[test]
    fn test_list_active_skips_inactive() {
        let registry = registry();
        let keys: Vec<&str> = registry.list_active().iter().map(|l| l.key.as_str()).collect();
        assert_eq!(keys, vec!["5th Sem"]);
        // * Inactive links still resolve
        assert!(registry.resolve_template("Old").is_some());
    }

    #[test]
    fn test_raw_template_used_verbatim() {
        let raw = "http://portal.example.edu/result?reg={REG}";
        assert_eq!(registry().resolve_template(raw).as_deref(), Some(raw));
    }

    #[test]
    fn test_unknown_key_and_blank_input() {
        assert!(registry().resolve_template("9th Sem").is_none());
        assert!(registry().resolve_template("   ").is_none());
    }

    #[test]
    fn test_build_target_url_no_padding() {
        assert_eq!(
            build_target_url("https://x.edu/r?RegNo={REG}&again={REG}", 22105111001),
            "https://x.edu/r?RegNo=22105111001&again=22105111001"
        );
        assert_eq!(build_target_url("https://x.edu/r?RegNo={REG}", 7), "https://x.edu/r?RegNo=7");
    }

    #[test]
    fn test_validate_template() {
        assert!(validate_template("https://x.edu/r?RegNo={REG}").is_ok());
        assert!(validate_template("not a url {REG}").is_err());
        assert!(validate_template("ftp://x.edu/{REG}").is_err());
    }
}
