//! Classification of forward-file lines into directives.
//!
//! Each comma separated token on a non-comment line is run through an
//! ordered rule table built once from the configuration; the first rule
//! whose predicate matches decides the directive. The order is fixed:
//! path, vacation, filter, other pipe, and finally address.

use lazy_static::lazy_static;
use regex::Regex;

use crate::config::pattern::compile_pattern;
use crate::config::AutorespondConfig;
use crate::errors::CoreError;

/// One classified piece of a forward file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// `# forward: addr`, a forward address that was switched off.
    DisabledForward(String),
    /// Any other comment line. Not carried into regenerated files.
    Comment(String),
    /// Local delivery to a path; `to_trash` when it ends in the trash folder.
    PathKeep { path: String, to_trash: bool },
    /// Invocation of the vacation program with its `-a` aliases.
    Vacation { aliases: Vec<String> },
    /// Invocation of the mail filter, i.e. a filtered local keep.
    Filter(String),
    /// Some other piped command; dropped when the file is regenerated.
    PipeOther(String),
    ForwardAddress(String),
}

lazy_static! {
    static ref RX_DISABLED_FORWARD: Regex = Regex::new(r"^# forward: *([^ ].*)").unwrap();
    static ref RX_PATH: Regex = Regex::new(r"^[./\\]\S+").unwrap();
    static ref RX_PIPE: Regex = Regex::new(r#"^"?\|"#).unwrap();
}

type Predicate = Box<dyn Fn(&str) -> bool>;
type Constructor = Box<dyn Fn(&str) -> Directive>;

struct Rule {
    name: &'static str,
    matches: Predicate,
    build: Constructor,
}

/// Turns forward-file lines into [`Directive`]s.
pub struct Classifier {
    rules: Vec<Rule>,
}

impl Classifier {
    /// Compile the configured patterns into the rule table.
    pub fn from_config(config: &AutorespondConfig) -> Result<Self, CoreError> {
        let mut vacation = vec![compile_pattern(&config.vacation_pattern)?];
        if let Some(pcre) = config.vacation_pcre.as_deref().filter(|p| !p.is_empty()) {
            vacation.push(compile_pattern(pcre)?);
        }
        let aliases = compile_pattern(&config.vacation_aliases_pat)?;
        let filter = compile_pattern(&config.filter_pattern)?;
        let trash_folder = config.trash_folder.clone();

        let rules = vec![
            Rule {
                name: "path",
                matches: Box::new(|token: &str| RX_PATH.is_match(token)),
                build: Box::new(move |token: &str| {
                    let path = RX_PATH
                        .find(token)
                        .map_or(token, |m| m.as_str())
                        .to_string();
                    let to_trash = !trash_folder.is_empty() && path.ends_with(&trash_folder);
                    Directive::PathKeep { path, to_trash }
                }),
            },
            Rule {
                name: "vacation",
                matches: Box::new(move |token: &str| {
                    vacation.iter().any(|re| re.is_match(token))
                }),
                build: Box::new(move |token: &str| Directive::Vacation {
                    aliases: aliases
                        .captures_iter(token)
                        .filter_map(|caps| caps.get(1))
                        .map(|m| m.as_str().to_string())
                        .collect(),
                }),
            },
            Rule {
                name: "filter",
                matches: Box::new(move |token: &str| filter.is_match(token)),
                build: Box::new(|token: &str| Directive::Filter(token.to_string())),
            },
            Rule {
                name: "pipe",
                matches: Box::new(|token: &str| RX_PIPE.is_match(token)),
                build: Box::new(|token: &str| Directive::PipeOther(token.to_string())),
            },
        ];

        Ok(Self { rules })
    }

    /// Classify one line. Blank lines yield nothing; a comment yields one
    /// directive; anything else one directive per non-empty token.
    pub fn classify_line(&self, line: &str) -> Vec<Directive> {
        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }
        if let Some(caps) = RX_DISABLED_FORWARD.captures(line) {
            let addr = caps.get(1).map_or("", |m| m.as_str());
            return vec![Directive::DisabledForward(addr.to_string())];
        }
        if line.starts_with('#') {
            return vec![Directive::Comment(line.to_string())];
        }
        line.split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| self.classify_token(token))
            .collect()
    }

    /// Classify a single token by the first matching rule.
    pub fn classify_token(&self, token: &str) -> Directive {
        self.rules
            .iter()
            .find(|rule| (rule.matches)(token))
            .map(|rule| (rule.build)(token))
            .unwrap_or_else(|| Directive::ForwardAddress(token.to_string()))
    }

    /// Name of the rule that would decide `token`, `"address"` for the
    /// fallback.
    pub fn rule_for(&self, token: &str) -> &'static str {
        self.rules
            .iter()
            .find(|rule| (rule.matches)(token))
            .map_or("address", |rule| rule.name)
    }
}
