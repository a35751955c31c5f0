//! Topic patterns.
//!
//! A pattern is a `/` separated list of levels over `[A-Za-z0-9_@]`, where a
//! level may also be `*` (exactly one level) or `**` (one or more levels).
//! A level mixing text with single `*`s, like `temp*` or `a*b`, is a glob
//! inside one level, its `*`s match any run of characters, possibly empty.
//! Publication topics use the same grammar and are compared level by level,
//! so a literal `*` in a topic is matched by a `*` in a pattern.

use std::fmt::{self, Write};
use std::{ops, str::FromStr};

use crate::error::TopicError;

#[inline]
fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '*' | '/' | '@')
}

#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Clone, Hash)]
pub enum Level {
    Normal(String),
    Partial(String), // text mixed with `*`
    SingleWildcard,  // *
    MultiWildcard,  // **
}

impl Level {
    pub fn parse<T: AsRef<str>>(s: T) -> Result<Level, TopicError> {
        Level::from_str(s.as_ref())
    }

    #[inline]
    pub fn value(&self) -> Option<&str> {
        match *self {
            Level::Normal(ref s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn is_normal(&self) -> bool {
        matches!(*self, Level::Normal(_))
    }

    #[inline]
    pub fn is_wildcard(&self) -> bool {
        !self.is_normal()
    }
}

/// Whether `self`, taken as one level of a target, is matched by a pattern level.
pub(crate) trait MatchLevel {
    fn match_level(&self, level: &Level) -> bool;
}

impl MatchLevel for Level {
    fn match_level(&self, level: &Level) -> bool {
        match *level {
            Level::Normal(ref lhs) => matches!(*self, Level::Normal(ref rhs) if lhs == rhs),
            // the target's `*`s can only land inside the glob's own `*`s
            Level::Partial(ref glob) => match *self {
                Level::Normal(ref rhs) | Level::Partial(ref rhs) => glob_level(glob, rhs),
                Level::SingleWildcard | Level::MultiWildcard => false,
            },
            Level::SingleWildcard => !matches!(*self, Level::MultiWildcard),
            Level::MultiWildcard => true,
        }
    }
}

impl<T: AsRef<str>> MatchLevel for T {
    fn match_level(&self, level: &Level) -> bool {
        match *level {
            Level::Normal(ref lhs) => lhs == self.as_ref(),
            Level::Partial(ref glob) => glob_level(glob, self.as_ref()),
            Level::SingleWildcard | Level::MultiWildcard => true,
        }
    }
}

/// Matches one level against a glob where `*` stands for any run of characters.
fn glob_level(glob: &str, text: &str) -> bool {
    let (g, t) = (glob.as_bytes(), text.as_bytes());
    let (mut gi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while ti < t.len() {
        if gi < g.len() && g[gi] == b'*' {
            backtrack = Some((gi, ti));
            gi += 1;
        } else if gi < g.len() && g[gi] == t[ti] {
            gi += 1;
            ti += 1;
        } else if let Some((star, from)) = backtrack {
            gi = star + 1;
            ti = from + 1;
            backtrack = Some((star, from + 1));
        } else {
            return false;
        }
    }
    g[gi..].iter().all(|&c| c == b'*')
}

fn matches_levels<T: MatchLevel>(pattern: &[Level], target: &[T]) -> bool {
    let Some((first, rest)) = pattern.split_first() else {
        return target.is_empty();
    };
    match first {
        Level::MultiWildcard => (1..=target.len())
            .any(|n| target[..n].iter().all(|t| t.match_level(first)) && matches_levels(rest, &target[n..])),
        _ => match target.split_first() {
            Some((head, tail)) => head.match_level(first) && matches_levels(rest, tail),
            None => false,
        },
    }
}

/// A validated topic pattern.
#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Clone, Hash)]
pub struct Topic(Vec<Level>);

impl Topic {
    #[inline]
    pub fn levels(&self) -> &Vec<Level> {
        &self.0
    }

    /// Matches a publication topic given as a string, invalid topics never match.
    pub fn matches_str<S: AsRef<str> + ?Sized>(&self, topic: &S) -> bool {
        is_valid_pattern(topic.as_ref()) && self.matches_split(topic.as_ref())
    }

    /// Matches a topic that is already known to be valid.
    #[inline]
    pub(crate) fn matches_split(&self, topic: &str) -> bool {
        let target = topic.split('/').collect::<Vec<_>>();
        matches_levels(&self.0, &target)
    }

    /// Whether every topic matched by `other` is also matched by `self`.
    ///
    /// `*` covers any single level, `**` covers one or more levels of any
    /// kind, a glob level covers the levels it matches and a literal only
    /// covers itself.
    pub fn covers(&self, other: &Topic) -> bool {
        matches_levels(&self.0, &other.0)
    }
}

impl ops::Deref for Topic {
    type Target = Vec<Level>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromStr for Level {
    type Err = TopicError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, TopicError> {
        match s {
            "*" => Ok(Level::SingleWildcard),
            "**" => Ok(Level::MultiWildcard),
            "" => Err(TopicError::InvalidLevel(s.into(), "empty level")),
            _ if !s.chars().all(is_allowed_char) || s.contains('/') => {
                Err(TopicError::InvalidLevel(s.into(), "forbidden character"))
            }
            _ if s.contains("**") => Err(TopicError::InvalidLevel(s.into(), "`**` must fill a whole level")),
            _ if s.contains('*') => Ok(Level::Partial(String::from(s))),
            _ => Ok(Level::Normal(String::from(s))),
        }
    }
}

impl FromStr for Topic {
    type Err = TopicError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, TopicError> {
        if s.is_empty() {
            return Err(TopicError::InvalidTopic(s.into(), "empty topic"));
        }
        if !s.chars().all(is_allowed_char) {
            return Err(TopicError::InvalidTopic(s.into(), "forbidden character"));
        }
        if s.starts_with('/') || s.ends_with('/') {
            return Err(TopicError::InvalidTopic(s.into(), "leading or trailing separator"));
        }
        if s.contains("//") {
            return Err(TopicError::InvalidTopic(s.into(), "empty level"));
        }
        if s.chars().all(|c| c == '*' || c == '/') {
            return Err(TopicError::InvalidTopic(s.into(), "only wildcards"));
        }
        s.split('/').map(Level::from_str).collect::<Result<Vec<_>, TopicError>>().map(Topic)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Level::Normal(ref s) | Level::Partial(ref s) => f.write_str(s.as_str()),
            Level::SingleWildcard => f.write_char('*'),
            Level::MultiWildcard => f.write_str("**"),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;

        for level in &self.0 {
            if first {
                first = false;
            } else {
                f.write_char('/')?;
            }

            level.fmt(f)?;
        }

        Ok(())
    }
}

#[inline]
pub fn is_valid_pattern(pattern: &str) -> bool {
    pattern.parse::<Topic>().is_ok()
}

/// Matches `topic` against `pattern`, false when either one is invalid.
pub fn matches(pattern: &str, topic: &str) -> bool {
    match pattern.parse::<Topic>() {
        Ok(pattern) => pattern.matches_str(topic),
        Err(_) => false,
    }
}

/// Reduces a set of patterns to the ones not covered by another pattern of the set.
///
/// Invalid patterns and exact duplicates are dropped, the result keeps the
/// order of first occurrence.
pub fn deduplicate_overlapping<S: AsRef<str>>(topics: &[S]) -> Vec<String> {
    let mut unique: Vec<(&str, Topic)> = Vec::with_capacity(topics.len());
    for t in topics {
        let t = t.as_ref();
        if unique.iter().any(|(s, _)| *s == t) {
            continue;
        }
        if let Ok(parsed) = t.parse::<Topic>() {
            unique.push((t, parsed));
        }
    }

    unique
        .iter()
        .enumerate()
        .filter(|(i, (_, p))| {
            !unique.iter().enumerate().any(|(j, (_, q))| {
                // of two patterns covering each other only the first survives
                j != *i && q.covers(p) && (j < *i || !p.covers(q))
            })
        })
        .map(|(_, (s, _))| s.to_string())
        .collect()
}

/// Top-level difference between two pattern sets, as `(removed, added)`.
pub fn diff_overlapping<S: AsRef<str>, T: AsRef<str>>(old: &[S], new: &[T]) -> (Vec<String>, Vec<String>) {
    let old = deduplicate_overlapping(old);
    let new = deduplicate_overlapping(new);
    let removed = old.iter().filter(|t| !new.contains(t)).cloned().collect();
    let added = new.iter().filter(|t| !old.contains(t)).cloned().collect();
    (removed, added)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level() {
        assert_eq!(Level::parse("sport").unwrap(), Level::Normal("sport".into()));
        assert_eq!(Level::parse("*").unwrap(), Level::SingleWildcard);
        assert_eq!(Level::parse("**").unwrap(), Level::MultiWildcard);
        assert_eq!(Level::parse("sp*rt").unwrap(), Level::Partial("sp*rt".into()));
        assert!(Level::parse("sp*rt").unwrap().is_wildcard());
        assert!(Level::parse("***").is_err());
        assert!(Level::parse("a**").is_err());
        assert!(Level::parse("").is_err());
        assert!(Level::parse("a-b").is_err());
        assert_eq!(Level::parse("x").unwrap().value(), Some("x"));
        assert!(Level::MultiWildcard.is_wildcard());
    }

    #[test]
    fn test_valid_pattern() {
        for t in [
            "topic", "topic/level", "topic/*", "topic/**", "a/*/b/**", "user@home/_x/9", "topic/a*", "sensor*/x",
            "*a*/b",
        ] {
            assert!(is_valid_pattern(t), "{t}");
        }
        for t in [
            "", "/topic", "topic/", "topic//sub", "*", "**", "*/**", "topic/***", "topic/a**", "topic/lev el",
            "topic/#", "topic/+", "tópico",
        ] {
            assert!(!is_valid_pattern(t), "{t}");
        }
    }

    #[test]
    fn test_display() {
        let t: Topic = "a/*/b/**".parse().unwrap();
        assert_eq!(t.to_string(), "a/*/b/**");
        assert_eq!(t.levels().len(), 4);
    }

    #[test]
    fn test_matches() {
        assert!(matches("topic/*", "topic/level"));
        assert!(!matches("topic/*", "topic/level/sublevel"));
        assert!(matches("topic/**/sublevel", "topic/level/something/sublevel"));
        assert!(!matches("topic/**/sublevel/**", "topic/level/something/x/other"));
        assert!(matches("topic/**/sublevel/**", "topic/level/sublevel/x/other"));
        assert!(!matches("topic/**", "topic"));
        assert!(matches("topic", "topic"));
        // globs inside one level
        assert!(matches("sensor*", "sensor1"));
        assert!(matches("sensor*", "sensor"));
        assert!(matches("sensors/temp*/c", "sensors/temperature/c"));
        assert!(matches("s*n*r", "sensor"));
        assert!(!matches("sensor*", "sensor1/x"));
        assert!(!matches("sensor*", "probe1"));
        assert!(!matches("a*b", "ab/b"));
        assert!(!matches("topic", "topic2"));
        // literal comparison of target levels
        assert!(matches("topic/*", "topic/*"));
        assert!(!matches("topic/level", "topic/*"));
        // invalid sides never match
        assert!(!matches("topic/", "topic/level"));
        assert!(!matches("topic/*", "topic//level"));
    }

    #[test]
    fn test_covers() {
        let t = |s: &str| s.parse::<Topic>().unwrap();
        assert!(t("a/*").covers(&t("a/b")));
        assert!(t("a/*").covers(&t("a/*")));
        assert!(!t("a/*").covers(&t("a/**")));
        assert!(t("a/**").covers(&t("a/*/c/**")));
        assert!(!t("a/b").covers(&t("a/*")));
        assert!(!t("a/**/c").covers(&t("a/**")));
        assert!(!t("a/**/**").covers(&t("a/**")));
        assert!(t("a/**").covers(&t("a/**/**")));
        assert!(t("a/*").covers(&t("a/b*")));
        assert!(t("a/b*").covers(&t("a/b1")));
        assert!(t("a/b*").covers(&t("a/bc*")));
        assert!(t("a/*c*").covers(&t("a/bc*")));
        assert!(!t("a/bc*").covers(&t("a/b*")));
        assert!(!t("a/b*").covers(&t("a/*")));
        assert!(!t("a/b*").covers(&t("a/**")));
    }

    #[test]
    fn test_deduplicate_overlapping() {
        assert_eq!(deduplicate_overlapping(&["topic1/*", "topic1/level", "topic2"]), vec!["topic1/*", "topic2"]);
        assert_eq!(deduplicate_overlapping(&["topic1/*/something/**", "topic1/**", "topic1/level"]), vec![
            "topic1/**"
        ]);
        assert_eq!(deduplicate_overlapping(&["b", "a", "b", "bad/"]), vec!["b", "a"]);
        assert_eq!(deduplicate_overlapping(&["s/temp1", "s/temp*", "s/te*", "s/humidity"]), vec![
            "s/te*",
            "s/humidity"
        ]);
        assert!(deduplicate_overlapping::<&str>(&[]).is_empty());
    }

    #[test]
    fn test_diff_overlapping() {
        let (removed, added) = diff_overlapping(&["topic1", "topic2", "topic3"], &["topic2", "topic3", "topic4"]);
        assert_eq!(removed, vec!["topic1"]);
        assert_eq!(added, vec!["topic4"]);

        let (removed, added) = diff_overlapping::<&str, _>(&[], &["a/b", "a/*", "c"]);
        assert!(removed.is_empty());
        assert_eq!(added, vec!["a/*", "c"]);

        let (removed, added) = diff_overlapping(&["t/s1", "t/s2"], &["t/s1", "t/s2", "t/*"]);
        assert_eq!(removed, vec!["t/s1", "t/s2"]);
        assert_eq!(added, vec!["t/*"]);
    }
}
