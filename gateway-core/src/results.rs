//! # Result Aggregator
//!
//! Collects the JSON texts produced during one call's lifetime, in arrival
//! order. Not synchronized on its own: the dispatcher consumes the response
//! stream sequentially, so only one appender ever exists per call.
//!
//! There is no size bound; a pathological server stream accumulates in memory.
//! That is an accepted resource-management limitation, not something to
//! silently cap.

/// An ordered, append-only sequence of JSON-encoded response texts.
#[derive(Debug, Default)]
pub struct CallResults {
    results: Vec<String>,
}

impl CallResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, json_text: String) {
        self.results.push(json_text);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn as_list(&self) -> &[String] {
        &self.results
    }

    /// Renders the collected responses as one JSON value.
    ///
    /// Exactly one collected item renders as that single value; any other count
    /// (including zero, a valid terminal state for an empty server stream)
    /// renders as an array preserving arrival order.
    pub fn into_json(self) -> Result<serde_json::Value, serde_json::Error> {
        if self.results.len() == 1 {
            return serde_json::from_str(&self.results[0]);
        }
        self.results
            .iter()
            .map(|text| serde_json::from_str(text))
            .collect::<Result<Vec<serde_json::Value>, _>>()
            .map(serde_json::Value::Array)
    }
}
