use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Prefix for persisted cache keys.
const CACHE_KEY_PREFIX: &str = "analytics_cache_";

/// The entity a set of statistics is computed for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum SubjectId {
    User(String),
    Member(String),
    /// The whole organization
    Organization,
}

impl SubjectId {
    pub fn user(id: impl Into<String>) -> Self {
        SubjectId::User(id.into())
    }

    pub fn member(id: impl Into<String>) -> Self {
        SubjectId::Member(id.into())
    }

    /// Key used for the local key-value store, e.g. `analytics_cache_member_42`
    pub fn cache_key(&self) -> String {
        format!("{}{}", CACHE_KEY_PREFIX, self.slug())
    }

    /// Recover a subject from a persisted cache key
    pub fn from_cache_key(key: &str) -> Option<Self> {
        let slug = key.strip_prefix(CACHE_KEY_PREFIX)?;
        Self::from_slug(slug)
    }

    /// URL path segment for the API scope of this subject
    pub fn api_scope(&self) -> String {
        match self {
            SubjectId::User(id) => format!("users/{}", encode_id(id)),
            SubjectId::Member(id) => format!("members/{}", encode_id(id)),
            SubjectId::Organization => "organization".to_string(),
        }
    }

    fn slug(&self) -> String {
        match self {
            SubjectId::User(id) => format!("user_{}", encode_id(id)),
            SubjectId::Member(id) => format!("member_{}", encode_id(id)),
            SubjectId::Organization => "organization".to_string(),
        }
    }

    fn from_slug(slug: &str) -> Option<Self> {
        if slug == "organization" {
            return Some(SubjectId::Organization);
        }
        if let Some(id) = slug.strip_prefix("user_") {
            return decode_id(id).map(SubjectId::User);
        }
        if let Some(id) = slug.strip_prefix("member_") {
            return decode_id(id).map(SubjectId::Member);
        }
        None
    }
}

/// Percent-encode an id so it is a single URL path segment and a plain
/// file name. Dot-only ids are encoded too, since `.` and `..` are special
/// in both.
fn encode_id(id: &str) -> String {
    let encoded = urlencoding::encode(id).into_owned();
    if !id.is_empty() && id.chars().all(|c| c == '.') {
        encoded.replace('.', "%2E")
    } else {
        encoded
    }
}

fn decode_id(encoded: &str) -> Option<String> {
    if encoded.is_empty() {
        return None;
    }
    urlencoding::decode(encoded).ok().map(|id| id.into_owned())
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectId::User(id) => write!(f, "user:{}", id),
            SubjectId::Member(id) => write!(f, "member:{}", id),
            SubjectId::Organization => write!(f, "org"),
        }
    }
}

/// Parses the CLI form: `user:<id>`, `member:<id>` or `org`.
impl FromStr for SubjectId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("org") || s.eq_ignore_ascii_case("organization") {
            return Ok(SubjectId::Organization);
        }
        match s.split_once(':') {
            Some((kind, id)) if !id.trim().is_empty() => match kind.to_lowercase().as_str() {
                "user" => Ok(SubjectId::user(id.trim())),
                "member" => Ok(SubjectId::member(id.trim())),
                other => Err(format!("Unknown subject kind '{}'", other)),
            },
            _ => Err(format!(
                "Invalid subject '{}' (expected user:<id>, member:<id> or org)",
                s
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_format() {
        assert_eq!(SubjectId::member("42").cache_key(), "analytics_cache_member_42");
        assert_eq!(SubjectId::user("u7").cache_key(), "analytics_cache_user_u7");
        assert_eq!(SubjectId::Organization.cache_key(), "analytics_cache_organization");
    }

    #[test]
    fn test_from_cache_key() {
        assert_eq!(
            SubjectId::from_cache_key("analytics_cache_member_42"),
            Some(SubjectId::member("42"))
        );
        assert_eq!(
            SubjectId::from_cache_key("analytics_cache_organization"),
            Some(SubjectId::Organization)
        );
        assert_eq!(SubjectId::from_cache_key("analytics_cache_member_"), None);
        assert_eq!(SubjectId::from_cache_key("session"), None);
    }

    #[test]
    fn test_parse_cli_form() {
        assert_eq!("member:M1".parse::<SubjectId>(), Ok(SubjectId::member("M1")));
        assert_eq!("USER:9".parse::<SubjectId>(), Ok(SubjectId::user("9")));
        assert_eq!("org".parse::<SubjectId>(), Ok(SubjectId::Organization));
        assert!("member:".parse::<SubjectId>().is_err());
        assert!("family:3".parse::<SubjectId>().is_err());
        assert!("M1".parse::<SubjectId>().is_err());
    }

    #[test]
    fn test_api_scope() {
        assert_eq!(SubjectId::member("M1").api_scope(), "members/M1");
        assert_eq!(SubjectId::Organization.api_scope(), "organization");
    }

    #[test]
    fn test_ids_with_reserved_characters_are_encoded() {
        let odd = SubjectId::member("a/b?c#d");
        assert_eq!(odd.api_scope(), "members/a%2Fb%3Fc%23d");
        assert_eq!(odd.cache_key(), "analytics_cache_member_a%2Fb%3Fc%23d");
        assert_eq!(SubjectId::from_cache_key(&odd.cache_key()), Some(odd));

        let dots = SubjectId::user("..");
        assert_eq!(dots.api_scope(), "users/%2E%2E");
        assert_eq!(SubjectId::from_cache_key(&dots.cache_key()), Some(dots));
    }
}
