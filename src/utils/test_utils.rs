//! Deterministic helpers for ledger tests.
