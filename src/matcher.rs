/// Return the keywords whose lowercase form occurs in `text`.
///
/// `text` is expected to be lowercase already (see [`crate::extract::extract_text`]).
/// Input order is preserved and duplicates in `keywords` are kept.
pub fn match_keywords<'k>(text: &str, keywords: &'k [String]) -> Vec<&'k str> {
    keywords
        .iter()
        .filter(|keyword| text.contains(&keyword.to_lowercase()))
        .map(String::as_str)
        .collect()
}

/// Normalize raw keyword input: trim each entry and drop empties.
pub fn parse_keywords<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .map(|k| k.as_ref().trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

/// Split a comma-separated keyword string, as typed into a single form field.
pub fn split_keywords(raw: &str) -> Vec<String> {
    parse_keywords(raw.split(','))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kws(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn case_insensitive_substring() {
        let keywords = kws(&["Secret", "missing"]);
        assert_eq!(match_keywords("some secret data here", &keywords), vec!["Secret"]);
    }

    #[test]
    fn keeps_input_order_and_duplicates() {
        let keywords = kws(&["login", "admin", "login"]);
        let text = "admin login portal";
        assert_eq!(match_keywords(text, &keywords), vec!["login", "admin", "login"]);
    }

    #[test]
    fn no_keywords_no_matches() {
        assert!(match_keywords("anything", &[]).is_empty());
    }

    #[test]
    fn parse_trims_and_discards_empty() {
        assert_eq!(parse_keywords(["  a ", "", "   ", "b"]), kws(&["a", "b"]));
    }

    #[test]
    fn split_comma_separated() {
        assert_eq!(split_keywords("login, admin,, ,Password "), kws(&["login", "admin", "Password"]));
    }
}
