//! Cross-module scenario tests.
//!
//! Per-module unit tests live beside the code they cover; the scenarios
//! here drive whole-system behavior through the real context switcher and
//! are therefore gated to targets that have one.
