//! Integration test harness and end-to-end tests live under `tests/`.
