use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct InstrumentSet(Vec<String>);

impl InstrumentSet {
    pub fn try_new<I, S>(tickers: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for (idx, raw) in tickers.into_iter().enumerate() {
            let ticker = raw.as_ref().trim();
            if ticker.is_empty() {
                return Err(EngineError::invalid_input(format!(
                    "instrument #{} is empty",
                    idx + 1
                )));
            }
            if !seen.insert(ticker.to_string()) {
                return Err(EngineError::invalid_input(format!(
                    "duplicate instrument: {ticker}"
                )));
            }
            out.push(ticker.to_string());
        }

        if out.is_empty() {
            return Err(EngineError::invalid_input("instrument list must be non-empty"));
        }
        Ok(Self(out))
    }

    pub fn parse_csv(input: &str) -> Result<Self, EngineError> {
        if input.trim().is_empty() {
            return Err(EngineError::invalid_input("instrument list must be non-empty"));
        }
        Self::try_new(input.split(','))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn position(&self, ticker: &str) -> Option<usize> {
        self.0.iter().position(|t| t == ticker)
    }
}

impl TryFrom<Vec<String>> for InstrumentSet {
    type Error = EngineError;

    fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}

impl From<InstrumentSet> for Vec<String> {
    fn from(value: InstrumentSet) -> Self {
        value.0
    }
}

impl<'a> IntoIterator for &'a InstrumentSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RiskScore(pub i64);

impl RiskScore {
    pub fn parse(input: &str) -> Result<Self, EngineError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(EngineError::invalid_input("risk score is required"));
        }
        trimmed
            .parse::<i64>()
            .map(RiskScore)
            .map_err(|_| EngineError::invalid_input(format!("risk score must be an integer (got {trimmed:?})")))
    }

    pub fn value(self) -> i64 {
        self.0
    }
}
