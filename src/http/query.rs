//! Query-string helpers.
//!
//! Parsing and serialization use `application/x-www-form-urlencoded` rules:
//! `+` means space and `%XX` is a percent-escaped byte.

use url::form_urlencoded;

/// Splits a request target into path and raw query string.
///
/// ```
/// # use beacon::http::query::split_target;
/// assert_eq!(split_target("/a/b?x=1"), ("/a/b", Some("x=1")));
/// assert_eq!(split_target("/a/b"), ("/a/b", None));
/// ```
pub fn split_target(target: &str) -> (&str, Option<&str>) {
    match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    }
}

/// Decodes a query string into ordered pairs; repeated keys are kept.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Encodes pairs into a query string (no leading `?`).
pub fn serialize_query<K, V>(pairs: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter().map(|(k, v)| (k.as_ref(), v.as_ref())))
        .finish()
}

/// Decodes a single component: `+` becomes a space, `%XX` is unescaped.
///
/// Invalid UTF-8 after unescaping falls back to the input unchanged.
pub fn decode_component(s: &str) -> String {
    let spaced = s.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plus_and_percent() {
        assert_eq!(decode_component("hello%20world"), "hello world");
        assert_eq!(decode_component("a+b%3Dc"), "a b=c");
    }

    #[test]
    fn repeated_keys_are_preserved_in_order() {
        let pairs = parse_query("tag=a&x=1&tag=b");
        assert_eq!(
            pairs,
            vec![
                ("tag".to_string(), "a".to_string()),
                ("x".to_string(), "1".to_string()),
                ("tag".to_string(), "b".to_string()),
            ]
        );
    }

    #[test]
    fn parse_inverts_serialize() {
        let pairs = vec![
            ("name".to_string(), "john".to_string()),
            ("page".to_string(), "2".to_string()),
            ("page".to_string(), "3".to_string()),
        ];
        assert_eq!(parse_query(&serialize_query(&pairs)), pairs);
    }
}
