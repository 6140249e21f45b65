pub mod creation;
pub mod destroy;
pub mod modification;
pub mod query;
pub mod transform;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod scenarios;

pub use destroy::Destroy;
pub use transform::{Transform, Transformation};
