use serde::{Deserialize, Serialize};

use super::directive::{Classifier, Directive};

/// How a local copy of incoming mail is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeepType {
    /// Piped through the configured filter program.
    Filtered,
    /// Delivered straight to the inbox.
    Unfiltered,
}

/// What a forward file asks for, accumulated over all of its lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ForwardState {
    /// Live forward addresses, in file order.
    pub addresses: Vec<String>,
    /// Addresses from `# forward:` comments, in file order.
    pub disabled: Vec<String>,
    /// The last keep directive seen.
    pub keep: Option<KeepType>,
    pub vacation: bool,
    /// Aliases of the last vacation invocation that named any.
    pub aliases: Vec<String>,
    pub trash: bool,
}

impl ForwardState {
    pub fn parse<S: AsRef<str>>(lines: &[S], classifier: &Classifier) -> Self {
        let mut state = Self::default();
        for line in lines {
            for directive in classifier.classify_line(line.as_ref()) {
                state.absorb(directive);
            }
        }
        state
    }

    fn absorb(&mut self, directive: Directive) {
        match directive {
            Directive::DisabledForward(addr) => self.disabled.push(addr),
            Directive::PathKeep { to_trash: true, .. } => self.trash = true,
            Directive::PathKeep { to_trash: false, .. } => {
                self.keep = Some(KeepType::Unfiltered)
            }
            Directive::Vacation { aliases } => {
                self.vacation = true;
                if !aliases.is_empty() {
                    self.aliases = aliases;
                }
            }
            Directive::Filter(_) => self.keep = Some(KeepType::Filtered),
            Directive::ForwardAddress(addr) => self.addresses.push(addr),
            Directive::Comment(_) | Directive::PipeOther(_) => {}
        }
    }

    /// Whether mail is currently forwarded.
    pub fn forwarding(&self) -> bool {
        !self.addresses.is_empty()
    }

    /// The addresses to offer: the live ones, or the disabled ones when
    /// nothing is forwarded.
    pub fn candidate_addresses(&self) -> Vec<&str> {
        let source = if self.addresses.is_empty() {
            &self.disabled
        } else {
            &self.addresses
        };
        source.iter().map(String::as_str).collect()
    }

    /// The keep choice to present.
    ///
    /// With `keep_by_default`, a file that neither forwards nor keeps mail
    /// presents an unfiltered keep, so that turning on a vacation reply does
    /// not silently stop local delivery.
    pub fn effective_keep(&self, keep_by_default: bool) -> Option<KeepType> {
        if self.keep.is_none() && !self.forwarding() && keep_by_default {
            Some(KeepType::Unfiltered)
        } else {
            self.keep
        }
    }
}
