//! In-memory model of a CODEOWNERS file.
//!
//! A [`Ruleset`] is an ordered list of [`Rule`]s. Order matters when the
//! ruleset is compiled back to text, but never for equality: two rulesets are
//! equal when they hold the same `(pattern, set of usernames)` pairs.
//!
//! Usernames are stored without the leading `@`; it is added back on
//! [`Ruleset::compile`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Strip a single leading `@` from an owner reference.
pub fn normalize_username(username: &str) -> String {
    username.strip_prefix('@').unwrap_or(username).to_string()
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// A single glob pattern and the owners assigned to it.
///
/// Patterns and usernames are single whitespace-free tokens; a pattern must
/// not be empty or start with `#`. Rules outside that shape compile to text
/// that does not parse back to the same rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rule {
    /// gitignore-style pattern, stored verbatim and never evaluated.
    pub pattern: String,
    /// Owners in canonical form (no leading `@`).
    pub usernames: Vec<String>,
}

impl Rule {
    /// Build a rule, normalizing every username.
    pub fn new<I, S>(pattern: impl Into<String>, usernames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            pattern: pattern.into(),
            usernames: usernames
                .into_iter()
                .map(|u| normalize_username(u.as_ref()))
                .collect(),
        }
    }

    fn sorted_usernames(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.usernames.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pattern)?;
        for username in &self.usernames {
            write!(f, " @{}", username)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Ruleset
// ---------------------------------------------------------------------------

/// The ordered collection of rules making up one CODEOWNERS file.
#[derive(Debug, Clone, Default, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ruleset(pub Vec<Rule>);

impl Ruleset {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self(rules)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, rule: Rule) {
        self.0.push(rule);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.0.iter()
    }

    /// Order-insensitive comparison.
    ///
    /// Both rulesets are reduced to a sorted list of `(pattern, sorted
    /// usernames)` pairs, so rule order and username order are ignored while
    /// duplicate rules still count. Only copies are sorted.
    pub fn equal(&self, other: &Ruleset) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.canonical_pairs() == other.canonical_pairs()
    }

    fn canonical_pairs(&self) -> Vec<(&str, Vec<&str>)> {
        let mut pairs: Vec<(&str, Vec<&str>)> = self
            .0
            .iter()
            .map(|rule| (rule.pattern.as_str(), rule.sorted_usernames()))
            .collect();
        pairs.sort_unstable();
        pairs
    }

    /// Render the ruleset as CODEOWNERS text, one rule per line, in the
    /// current order. Usernames are written in the order they appear.
    ///
    /// `parse(compile(r))` equals `r` only when every pattern is non-empty,
    /// free of whitespace and does not start with `#`, and every username is
    /// free of whitespace. Manifest validation enforces this at the boundary.
    pub fn compile(&self) -> Vec<u8> {
        let mut out = String::new();
        for rule in &self.0 {
            out.push_str(&rule.to_string());
            out.push('\n');
        }
        out.into_bytes()
    }

    /// Parse CODEOWNERS text.
    ///
    /// Blank lines and comment lines (including indented ones) are skipped.
    /// Every other line becomes a rule in file order; the first
    /// whitespace-separated token is the pattern and the rest are owners.
    /// Parsing never fails: a line with only a pattern yields a rule with no
    /// usernames.
    pub fn parse(text: &str) -> Ruleset {
        let mut ruleset = Ruleset::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut tokens = line.split_whitespace();
            let Some(pattern) = tokens.next() else {
                continue;
            };
            ruleset.push(Rule::new(pattern, tokens));
        }
        ruleset
    }

    /// Copy of the ruleset with each rule's usernames sorted. Rule order is
    /// kept.
    pub fn sorted(&self) -> Ruleset {
        Ruleset(
            self.0
                .iter()
                .map(|rule| {
                    let mut usernames = rule.usernames.clone();
                    usernames.sort();
                    Rule {
                        pattern: rule.pattern.clone(),
                        usernames,
                    }
                })
                .collect(),
        )
    }
}

impl PartialEq for Ruleset {
    fn eq(&self, other: &Self) -> bool {
        self.equal(other)
    }
}

impl From<Vec<Rule>> for Ruleset {
    fn from(rules: Vec<Rule>) -> Self {
        Self(rules)
    }
}

impl FromIterator<Rule> for Ruleset {
    fn from_iter<T: IntoIterator<Item = Rule>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Ruleset {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str, usernames: &[&str]) -> Rule {
        Rule::new(pattern, usernames.iter().copied())
    }

    #[test]
    fn test_comparison() {
        let cases: Vec<(&str, Ruleset, Ruleset, bool)> = vec![
            ("empty rulesets", Ruleset::default(), Ruleset::default(), true),
            (
                "one empty ruleset, one non-empty",
                Ruleset::default(),
                Ruleset::new(vec![rule("*", &["someone"])]),
                false,
            ),
            (
                "identical rulesets",
                Ruleset::new(vec![rule("*", &["someone"])]),
                Ruleset::new(vec![rule("*", &["someone"])]),
                true,
            ),
            (
                "different patterns",
                Ruleset::new(vec![rule("*.go", &["someone"])]),
                Ruleset::new(vec![rule("*", &["someone"])]),
                false,
            ),
            (
                "different usernames",
                Ruleset::new(vec![rule("*", &["someone"])]),
                Ruleset::new(vec![rule("*", &["someone-else"])]),
                false,
            ),
            (
                "usernames swapped between patterns",
                Ruleset::new(vec![rule("*", &["someone1"]), rule("*.go", &["someone2"])]),
                Ruleset::new(vec![rule("*", &["someone2"]), rule("*.go", &["someone1"])]),
                false,
            ),
            (
                "rules in differing orders",
                Ruleset::new(vec![rule("*", &["someone"]), rule("*.go", &["someone"])]),
                Ruleset::new(vec![rule("*.go", &["someone"]), rule("*", &["someone"])]),
                true,
            ),
            (
                "rules and usernames in differing orders",
                Ruleset::new(vec![rule("*", &["jim", "bob"]), rule("*.go", &["someone"])]),
                Ruleset::new(vec![rule("*.go", &["someone"]), rule("*", &["bob", "jim"])]),
                true,
            ),
            (
                "duplicate rule counted",
                Ruleset::new(vec![rule("*", &["a"]), rule("*", &["a"])]),
                Ruleset::new(vec![rule("*", &["a"]), rule("*.go", &["a"])]),
                false,
            ),
        ];

        for (name, left, right, expected) in cases {
            assert_eq!(left.equal(&right), expected, "case: {name}");
            assert_eq!(right.equal(&left), expected, "case (reversed): {name}");
        }
    }

    #[test]
    fn test_equal_does_not_reorder_input() {
        let ruleset = Ruleset::new(vec![rule("*", &["zed", "amy"]), rule("a/", &["bob"])]);
        let other = Ruleset::new(vec![rule("a/", &["bob"]), rule("*", &["amy", "zed"])]);
        assert!(ruleset.equal(&other));
        assert_eq!(ruleset.0[0].usernames, vec!["zed", "amy"]);
        assert_eq!(ruleset.0[0].pattern, "*");
    }

    #[test]
    fn test_compile_single_rule() {
        let ruleset = Ruleset::new(vec![rule("*", &["jim", "bob"])]);
        let text = String::from_utf8(ruleset.compile()).unwrap();
        assert_eq!(text, "* @jim @bob\n");
        assert!(text.starts_with("* "));
        assert!(text.contains("@jim"));
        assert!(text.contains("@bob"));
    }

    #[test]
    fn test_compile_preserves_order() {
        let ruleset = Ruleset::new(vec![
            rule("*", &["jim", "bob"]),
            rule("*.go", &["someone", "some-user", "somebody-else"]),
            rule("*.java", &["javaguy123", "javadev"]),
        ]);
        let text = String::from_utf8(ruleset.compile()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "* @jim @bob",
                "*.go @someone @some-user @somebody-else",
                "*.java @javaguy123 @javadev",
            ]
        );
    }

    #[test]
    fn test_compile_empty() {
        assert!(Ruleset::default().compile().is_empty());
    }

    #[test]
    fn test_parse() {
        let ruleset = Ruleset::parse(
            "
# this is an example file

# with blank lines

  # and indented comments

* @user1
*.go @user123 @user456
",
        );

        assert_eq!(ruleset.len(), 2);
        assert_eq!(ruleset.0[0].pattern, "*");
        assert_eq!(ruleset.0[0].usernames, vec!["user1"]);
        assert_eq!(ruleset.0[1].pattern, "*.go");
        assert_eq!(ruleset.0[1].usernames, vec!["user123", "user456"]);
    }

    #[test]
    fn test_parse_comments_only() {
        let ruleset = Ruleset::parse("# header\n\n   \n\t# indented\n");
        assert!(ruleset.is_empty());
    }

    #[test]
    fn test_parse_pattern_without_owners() {
        let ruleset = Ruleset::parse("docs/\n/build/   @ci-team\n");
        assert_eq!(ruleset.len(), 2);
        assert_eq!(ruleset.0[0].pattern, "docs/");
        assert!(ruleset.0[0].usernames.is_empty());
        assert_eq!(ruleset.0[1].usernames, vec!["ci-team"]);
    }

    #[test]
    fn test_parse_mixed_prefixes_and_whitespace() {
        let ruleset = Ruleset::parse("*.rs\t@org/rust-team   maintainer\r\n");
        assert_eq!(ruleset.0[0].usernames, vec!["org/rust-team", "maintainer"]);
    }

    #[test]
    fn test_parse_keeps_duplicates() {
        let ruleset = Ruleset::parse("* @a @a\n");
        assert_eq!(ruleset.0[0].usernames, vec!["a", "a"]);
        let text = String::from_utf8(ruleset.compile()).unwrap();
        assert_eq!(text, "* @a @a\n");
    }

    #[test]
    fn test_round_trip() {
        let rulesets = vec![
            Ruleset::new(vec![rule("*", &["jim"])]),
            Ruleset::new(vec![rule("*", &["jim", "bob"]), rule("*.go", &["someone"])]),
            Ruleset::new(vec![
                rule("/docs/**/*.md", &["org/docs"]),
                rule("src/", &[]),
                rule("*.java", &["javaguy123", "javadev"]),
            ]),
        ];
        for ruleset in rulesets {
            let text = String::from_utf8(ruleset.compile()).unwrap();
            assert!(ruleset.equal(&Ruleset::parse(&text)), "round trip of {text:?}");
        }
    }

    #[test]
    fn test_username_normalization() {
        assert_eq!(normalize_username("@expert"), "expert");
        assert_eq!(normalize_username("expert"), "expert");
        assert_eq!(normalize_username("@@odd"), "@odd");

        let with_at = Ruleset::new(vec![Rule::new("*", ["@expert"])]);
        let without_at = Ruleset::new(vec![Rule::new("*", ["expert"])]);
        assert_eq!(with_at, without_at);
    }

    #[test]
    fn test_sorted_keeps_rule_order() {
        let ruleset = Ruleset::new(vec![rule("b", &["zed", "amy"]), rule("a", &["c", "b"])]);
        let sorted = ruleset.sorted();
        assert_eq!(sorted.0[0].pattern, "b");
        assert_eq!(sorted.0[0].usernames, vec!["amy", "zed"]);
        assert_eq!(sorted.0[1].usernames, vec!["b", "c"]);
    }
}
