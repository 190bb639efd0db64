use serde::Serialize;

use crate::{core::scope_request::ResolutionMode, credential::Credential};

/// The outcome of resolving a request against a candidate set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResolutionResult<'a> {
    /// Every credential satisfying an item, concatenated over items.
    /// Credentials matching several items appear several times.
    Strict(Vec<&'a Credential>),
    Simple(Partition<'a>),
}

impl<'a> ResolutionResult<'a> {
    pub fn mode(&self) -> ResolutionMode {
        match self {
            Self::Strict(_) => ResolutionMode::Strict,
            Self::Simple(_) => ResolutionMode::Simple,
        }
    }

    pub fn credentials(&self) -> &[&'a Credential] {
        match self {
            Self::Strict(credentials) => credentials,
            Self::Simple(partition) => &partition.credentials,
        }
    }

    /// Always empty in strict mode.
    pub fn failed_constraints(&self) -> &[&'a Credential] {
        match self {
            Self::Strict(_) => &[],
            Self::Simple(partition) => &partition.failed_constraints,
        }
    }
}

/// Simple mode output: credentials passing their item, and credentials that
/// failed some constraint along the way.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Partition<'a> {
    pub credentials: Vec<&'a Credential>,
    pub failed_constraints: Vec<&'a Credential>,
}

/// State threaded through per-item resolution.
#[derive(Debug)]
pub struct ResolutionAccumulator<'a> {
    mode: ResolutionMode,
    credentials: Vec<&'a Credential>,
    failed_constraints: Vec<&'a Credential>,
}

impl<'a> ResolutionAccumulator<'a> {
    pub fn new(mode: ResolutionMode) -> Self {
        Self {
            mode,
            credentials: Vec::new(),
            failed_constraints: Vec::new(),
        }
    }

    pub fn mode(&self) -> ResolutionMode {
        self.mode
    }

    /// Strict mode: append an item's matches as they are.
    pub fn extend(&mut self, matched: Vec<&'a Credential>) {
        self.credentials.extend(matched);
    }

    /// Records candidates failing a simple-mode step; each is recorded once.
    pub fn record_failures(&mut self, failing: Vec<&'a Credential>) {
        for credential in failing {
            if !contains(&self.failed_constraints, credential) {
                self.failed_constraints.push(credential);
            }
        }
    }

    /// Candidates from `passing` that have not failed anywhere so far.
    pub fn without_failures(&self, passing: Vec<&'a Credential>) -> Vec<&'a Credential> {
        passing
            .into_iter()
            .filter(|credential| !contains(&self.failed_constraints, credential))
            .collect()
    }

    /// Simple mode: append an item's final passing set, skipping credentials
    /// already accepted.
    pub fn accept(&mut self, passing: Vec<&'a Credential>) {
        for credential in passing {
            if !contains(&self.credentials, credential) {
                self.credentials.push(credential);
            }
        }
    }

    pub fn into_result(self) -> ResolutionResult<'a> {
        match self.mode {
            ResolutionMode::Strict => ResolutionResult::Strict(self.credentials),
            ResolutionMode::Simple => ResolutionResult::Simple(Partition {
                credentials: self.credentials,
                failed_constraints: self.failed_constraints,
            }),
        }
    }
}

/// Identity, not equality: two distinct candidates with equal documents are
/// tracked separately.
fn contains(list: &[&Credential], credential: &Credential) -> bool {
    list.iter().any(|entry| std::ptr::eq(*entry, credential))
}
