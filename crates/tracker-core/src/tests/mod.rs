//! Tracker scenario tests
