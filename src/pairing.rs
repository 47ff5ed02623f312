//! Pairing engine: every unordered pair of participants exactly once.

use thiserror::Error;

use crate::registry::ModelHandle;

#[derive(Debug, Error)]
pub enum PairingError {
    /// Fewer than two participants; a head-to-head run cannot start.
    #[error("insufficient participants: need at least 2, have {available}")]
    InsufficientParticipants { available: usize },
}

/// All 2-combinations `(handles[i], handles[j])` for `i < j`, in input order.
///
/// Pure and deterministic: the same input ordering always yields the same
/// output ordering, which is what makes run fixtures reproducible. Never
/// pairs a handle with itself and never emits the same unordered pair twice.
pub fn all_pairs(handles: &[ModelHandle]) -> Result<Vec<(ModelHandle, ModelHandle)>, PairingError> {
    if handles.len() < 2 {
        return Err(PairingError::InsufficientParticipants {
            available: handles.len(),
        });
    }

    let mut pairs = Vec::with_capacity(handles.len() * (handles.len() - 1) / 2);
    for i in 0..handles.len() {
        for j in (i + 1)..handles.len() {
            pairs.push((handles[i].clone(), handles[j].clone()));
        }
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{ChatBackend, ChatResponse, Message, ProviderError};
    use std::collections::HashSet;
    use std::sync::Arc;

    struct InertBackend;

    #[async_trait::async_trait]
    impl ChatBackend for InertBackend {
        async fn complete_chat(
            &self,
            _conversation: &[Message],
        ) -> Result<ChatResponse, ProviderError> {
            Err(ProviderError::config("inert"))
        }

        fn provider(&self) -> &'static str {
            "test"
        }

        fn model_id(&self) -> &str {
            "inert"
        }
    }

    fn handles(names: &[&str]) -> Vec<ModelHandle> {
        names
            .iter()
            .map(|n| ModelHandle::new(*n, Arc::new(InertBackend)))
            .collect()
    }

    #[test]
    fn fewer_than_two_fails() {
        assert!(matches!(
            all_pairs(&handles(&[])),
            Err(PairingError::InsufficientParticipants { available: 0 })
        ));
        assert!(matches!(
            all_pairs(&handles(&["a"])),
            Err(PairingError::InsufficientParticipants { available: 1 })
        ));
    }

    #[test]
    fn three_handles_give_three_ordered_pairs() {
        let pairs = all_pairs(&handles(&["a", "b", "c"])).unwrap();
        let names: Vec<(String, String)> = pairs
            .iter()
            .map(|(x, y)| (x.name().to_string(), y.name().to_string()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("a".into(), "b".into()),
                ("a".into(), "c".into()),
                ("b".into(), "c".into())
            ]
        );
    }

    #[test]
    fn pair_count_distinctness_and_no_self_pairs() {
        for n in 2..=8 {
            let names: Vec<String> = (0..n).map(|i| format!("m{i}")).collect();
            let name_refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
            let pairs = all_pairs(&handles(&name_refs)).unwrap();

            assert_eq!(pairs.len(), n * (n - 1) / 2);

            let mut seen = HashSet::new();
            for (x, y) in &pairs {
                assert_ne!(x.name(), y.name(), "self-pair at n={n}");
                let mut unordered = [x.name(), y.name()];
                unordered.sort();
                assert!(
                    seen.insert(unordered),
                    "duplicate unordered pair at n={n}"
                );
            }
        }
    }

    #[test]
    fn output_is_identical_across_repeated_calls() {
        let hs = handles(&["x", "y", "z", "w"]);
        let first: Vec<(String, String)> = all_pairs(&hs)
            .unwrap()
            .iter()
            .map(|(a, b)| (a.name().into(), b.name().into()))
            .collect();
        for _ in 0..3 {
            let again: Vec<(String, String)> = all_pairs(&hs)
                .unwrap()
                .iter()
                .map(|(a, b)| (a.name().into(), b.name().into()))
                .collect();
            assert_eq!(first, again);
        }
    }
}
