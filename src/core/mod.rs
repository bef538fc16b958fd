pub mod allocation;
pub mod matrix;
pub mod reconciliation;
pub mod regional_targets;
pub mod sectors;
pub mod units;
