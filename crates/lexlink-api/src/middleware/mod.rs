//! Request middleware shared by every authenticated route.

pub mod metrics;
