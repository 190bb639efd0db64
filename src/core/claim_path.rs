use std::fmt;

use serde_json::Value as Json;
use serde_json_path::JsonPath;

/// A dotted path into a credential document, such as `claim.address.city`.
///
/// Paths are evaluated through a JSONPath query built in bracket notation, so
/// segments may carry any character a JSON member name can. Segments made of
/// digits also address array positions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ClaimPath(Vec<String>);

impl ClaimPath {
    pub fn parse(path: &str) -> Self {
        Self(
            path.split('.')
                .filter(|segment| !segment.is_empty())
                .map(ToOwned::to_owned)
                .collect(),
        )
    }

    /// The `claim` root every credential stores its values under.
    pub fn claim_root() -> Self {
        Self(vec!["claim".to_owned()])
    }

    /// Appends a relative dotted path.
    pub fn join(&self, relative: &str) -> Self {
        let mut segments = self.0.clone();
        segments.extend(Self::parse(relative).0);
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Renders the path as a JSONPath expression, e.g. `$['claim']['address']`.
    pub fn to_json_path_string(&self) -> String {
        let mut expression = String::from("$");
        for segment in &self.0 {
            let name = segment.replace('\\', "\\\\").replace('\'', "\\'");
            if is_index(segment) {
                expression.push_str(&format!("[{segment},'{name}']"));
            } else {
                expression.push_str(&format!("['{name}']"));
            }
        }
        expression
    }

    pub fn to_json_path(&self) -> Result<JsonPath, serde_json_path::ParseError> {
        JsonPath::parse(&self.to_json_path_string())
    }

    /// Every value in `document` located at this path.
    pub fn select<'a>(&self, document: &'a Json) -> Vec<&'a Json> {
        match self.to_json_path() {
            Ok(path) => path.query(document).all(),
            Err(error) => {
                tracing::warn!(path = %self, %error, "claim path is not addressable");
                Vec::new()
            }
        }
    }

    pub fn exists_in(&self, document: &Json) -> bool {
        !self.select(document).is_empty()
    }
}

impl fmt::Display for ClaimPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

fn is_index(segment: &str) -> bool {
    segment == "0"
        || (!segment.starts_with('0')
            && !segment.is_empty()
            && segment.chars().all(|c| c.is_ascii_digit())
            && segment.len() < 16)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_and_joins() {
        let path = ClaimPath::claim_root().join("address.city");
        assert_eq!(path.segments(), ["claim", "address", "city"]);
        assert_eq!(path.to_string(), "claim.address.city");
        assert_eq!(ClaimPath::parse("a..b."), ClaimPath::parse("a.b"));
    }

    #[test]
    fn renders_bracket_notation() {
        let path = ClaimPath::parse("claim.it's.0");
        assert_eq!(path.to_json_path_string(), "$['claim']['it\\'s'][0,'0']");
    }

    #[test]
    fn selects_object_members_and_array_positions() {
        let document = json!({
            "claim": {
                "address": { "city": "Belo Horizonte" },
                "phones": ["+55", "+1"],
                "indexed": { "0": "zero" }
            }
        });

        assert_eq!(
            ClaimPath::parse("claim.address.city").select(&document),
            vec![&json!("Belo Horizonte")]
        );
        assert_eq!(
            ClaimPath::parse("claim.phones.1").select(&document),
            vec![&json!("+1")]
        );
        assert_eq!(
            ClaimPath::parse("claim.indexed.0").select(&document),
            vec![&json!("zero")]
        );
        assert!(!ClaimPath::parse("claim.address.country").exists_in(&document));
    }
}
