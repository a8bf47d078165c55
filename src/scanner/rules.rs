//! Re-exports the matching primitive so callers can `use crate::scanner::rules::*`
//! without reaching into `model` directly.

pub use crate::model::MatchRule;

pub fn matches_any(rules: &[MatchRule], name: &str) -> bool {
    rules.iter().any(|r| r.matches_name(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn empty_rule_list_matches_nothing() {
        assert!(!matches_any(&[], "anything.zip"));
    }

    #[test]
    fn one_rule_is_enough() {
        let rules = vec![MatchRule::new(vec!["docx".into()], Regex::new(r"^Report").unwrap())];
        assert!(matches_any(&rules, "Report-final.docx"));
        assert!(!matches_any(&rules, "Report-final.pdf"));
        assert!(!matches_any(&rules, "final.docx"));
    }
}
