pub mod epoch_millis;
mod versioned;

pub use versioned::{VersionToken, Versioned};
