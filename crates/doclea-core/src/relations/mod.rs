//! Relation detectors (§4.H memory↔memory, §4.I memory↔code)
//!
//! Both detectors share the same candidate → dedupe → threshold-partition
//! shape: concurrent candidate sources feed a dedupe-by-target pass, then
//! candidates at or above `auto_approve_threshold` materialize directly,
//! candidates in `[suggestion_threshold, auto_approve_threshold)` become a
//! pending suggestion, and anything below is discarded.

pub mod cross_layer;
pub mod memory_memory;

pub use cross_layer::{detect_cross_layer_from_code, detect_cross_layer_from_memory, CrossLayerDetectorConfig};
pub use memory_memory::{detect_memory_relations, RelationDetectorConfig};

/// Tokenizes free text into a lowercase, de-duplicated keyword set:
/// splits on non-alphanumeric characters, drops anything shorter than 3
/// characters (stopword-ish filter without a stopword list).
pub(crate) fn extract_keywords(text: &str) -> Vec<String> {
    use std::collections::BTreeSet;
    let set: BTreeSet<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() >= 3)
        .collect();
    set.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_keywords_lowercases_and_drops_short_words() {
        let keywords = extract_keywords("The Quick fox, a B12 issue!");
        assert!(keywords.contains(&"quick".to_string()));
        assert!(keywords.contains(&"issue".to_string()));
        assert!(!keywords.contains(&"a".to_string()));
    }
}
