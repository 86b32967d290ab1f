//! Command line front end for the browser harness.

pub mod cli;
