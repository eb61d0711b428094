//! Integration tests for the binding pass
//!
//! This test suite validates:
//! - Complete request and response passes against realistic policies
//! - Failure attribution to the violated assertion
//! - Header layout, signature coverage and endorsement properties
//! - Signatures verifiable with the signer's certificate

pub mod test_utils;

#[cfg(test)]
mod binding_flow_tests;

#[cfg(test)]
mod header_invariant_tests;
