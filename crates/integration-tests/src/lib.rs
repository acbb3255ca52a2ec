//! Cross-crate behaviour tests live under `tests/`.
