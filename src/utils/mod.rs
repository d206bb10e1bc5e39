//! Utility functions and helpers.

pub mod http;

use url::form_urlencoded;

/// Collapse runs of whitespace into single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fill `{key}` placeholders in a template.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{key}}}"), value)
    })
}

/// Percent-encode a query string component.
pub fn encode_component(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  강남   피트니스 \n "), "강남 피트니스");
        assert_eq!(collapse_whitespace("   "), "");
    }

    #[test]
    fn test_fill_template() {
        let filled = fill_template(
            "{name} {address} 헬스장",
            &[("name", "강남 피트니스"), ("address", "서울시 강남구")],
        );
        assert_eq!(filled, "강남 피트니스 서울시 강남구 헬스장");
        assert_eq!(fill_template("{name} {address}", &[("name", "짐")]), "짐 {address}");
    }

    #[test]
    fn test_encode_component() {
        assert_eq!(encode_component("a b&c"), "a+b%26c");
        assert_eq!(encode_component("헬스"), "%ED%97%AC%EC%8A%A4");
    }
}
